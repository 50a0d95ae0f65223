//! 予測ソース（画像分類モデル）
//!
//! モデルはグローバルに持たず、`ModelHandle::load` で得たハンドルを
//! 明示的に渡す。テストでは `PredictionSource` を実装した代替を使う。

pub mod fetch;
pub mod preprocess;

use crate::error::{Result, ScanError};
use fetch::{resolve_model_dir, METADATA_FILE, MODEL_FILE};
use image::DynamicImage;
use leaf_scan_common::Prediction;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use preprocess::{preprocess, to_probabilities, InputLayout};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_IMAGE_SIZE: u32 = 224;

/// 1フレームを分類する
pub trait PredictionSource {
    /// クラスごとの予測（ラベル順）
    fn predict(&mut self, frame: &DynamicImage) -> Result<Vec<Prediction>>;

    fn class_labels(&self) -> &[String];
}

impl<P: PredictionSource + ?Sized> PredictionSource for Box<P> {
    fn predict(&mut self, frame: &DynamicImage) -> Result<Vec<Prediction>> {
        (**self).predict(frame)
    }

    fn class_labels(&self) -> &[String] {
        (**self).class_labels()
    }
}

/// metadata.json（Teachable Machine の書き出し形式）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub labels: Vec<String>,

    #[serde(default = "default_image_size")]
    pub image_size: u32,

    #[serde(default)]
    pub model_name: Option<String>,

    #[serde(default)]
    pub input_layout: InputLayout,
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

impl ModelMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScanError::ModelLoad(format!("{} を読み込めません: {}", path.display(), e)))?;
        let metadata: ModelMetadata = serde_json::from_str(&content)
            .map_err(|e| ScanError::ModelLoad(format!("{} のパースに失敗: {}", path.display(), e)))?;

        if metadata.labels.is_empty() {
            return Err(ScanError::ModelLoad("metadata.json の labels が空です".into()));
        }
        if metadata.image_size == 0 {
            return Err(ScanError::ModelLoad("metadata.json の imageSize が不正です".into()));
        }
        Ok(metadata)
    }
}

/// 読み込み済みモデル
pub struct ModelHandle {
    session: Session,
    metadata: ModelMetadata,
}

impl ModelHandle {
    /// ベースURLからモデルを読み込む
    ///
    /// 失敗はセッション致命的（呼び出し側でブロッキング表示する）。
    pub async fn load(model_url: &str, cache_dir: &Path) -> Result<Self> {
        let dir = resolve_model_dir(model_url, cache_dir).await?;
        let metadata = ModelMetadata::load(&dir.join(METADATA_FILE))?;
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(ScanError::ModelLoad(format!(
                "モデルファイルが見つかりません: {}",
                model_path.display()
            )));
        }

        let session = tokio::task::spawn_blocking(move || -> Result<Session> {
            let _ = ort::init().with_name("leaf-scan").commit();

            Session::builder()
                .map_err(|e| ScanError::ModelLoad(format!("セッション作成失敗: {}", e)))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| ScanError::ModelLoad(format!("最適化レベル設定失敗: {}", e)))?
                .with_intra_threads(2)
                .map_err(|e| ScanError::ModelLoad(format!("スレッド数設定失敗: {}", e)))?
                .commit_from_file(&model_path)
                .map_err(|e| ScanError::ModelLoad(format!("ONNXモデル読み込み失敗: {}", e)))
        })
        .await
        .map_err(|e| ScanError::ModelLoad(format!("モデル読み込みタスク失敗: {}", e)))??;

        info!(
            model = metadata.model_name.as_deref().unwrap_or("unnamed"),
            classes = metadata.labels.len(),
            image_size = metadata.image_size,
            "モデルを読み込みました"
        );

        Ok(Self { session, metadata })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// ONNXセッションを解放
    pub fn close(self) {
        info!("モデルを解放しました");
        drop(self.session);
    }
}

/// 先頭の入力名（入力のないモデルは推論エラー）
fn first_input_name<'a>(mut names: impl Iterator<Item = &'a str>) -> Result<String> {
    names
        .next()
        .map(str::to_string)
        .ok_or_else(|| ScanError::Inference("モデル入力がありません".into()))
}

impl PredictionSource for ModelHandle {
    fn predict(&mut self, frame: &DynamicImage) -> Result<Vec<Prediction>> {
        let input = preprocess(frame, self.metadata.image_size, self.metadata.input_layout);
        let input_name = first_input_name(self.session.inputs().iter().map(|i| i.name()))?;

        let input_tensor =
            Value::from_array(input).map_err(|e| ScanError::Inference(format!("テンソル作成失敗: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| ScanError::Inference(format!("推論失敗: {}", e)))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| ScanError::Inference("モデル出力がありません".into()))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| ScanError::Inference(format!("出力テンソル取得失敗: {}", e)))?;

        let raw: Vec<f32> = data.iter().copied().collect();
        if raw.len() != self.metadata.labels.len() {
            return Err(ScanError::Inference(format!(
                "出力数 {} がクラス数 {} と一致しません",
                raw.len(),
                self.metadata.labels.len()
            )));
        }

        let predictions: Vec<Prediction> = self
            .metadata
            .labels
            .iter()
            .zip(to_probabilities(&raw))
            .map(|(label, probability)| Prediction::new(label.clone(), probability))
            .collect();

        debug!(?predictions, "推論完了");
        Ok(predictions)
    }

    fn class_labels(&self) -> &[String] {
        &self.metadata.labels
    }
}
