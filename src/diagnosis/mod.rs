//! リモートAI診断
//!
//! 検出済みラベルと撮影フレームを生成AIへ送り、構造化された診断を得る。
//! 失敗は呼び出し側に伝播させず、固定のフォールバック診断に置き換える。

mod gemini;

pub use gemini::GeminiClient;

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use leaf_scan_common::{fallback_diagnosis, Diagnosis};
use std::io::Cursor;
use tracing::warn;

/// エンコード済みフレーム（Base64）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub mime_type: String,
    pub data: String,
}

impl EncodedFrame {
    /// PNG にエンコード
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| ScanError::ImageLoad(format!("PNGエンコード失敗: {}", e)))?;
        Ok(Self {
            mime_type: "image/png".into(),
            data: STANDARD.encode(buf.into_inner()),
        })
    }

    /// Data URL（"data:image/png;base64,..."）から作成
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let data = extract_base64_from_data_url(data_url)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| ScanError::ImageLoad("Invalid base64 image data".into()))?;
        Ok(Self {
            mime_type: extract_mime_type_from_data_url(data_url).to_string(),
            data: data.to_string(),
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Data URLからBase64データ部分を抽出
pub fn extract_base64_from_data_url(data_url: &str) -> Option<&str> {
    data_url.split(',').nth(1)
}

/// Data URLからMIMEタイプを抽出（失敗時は image/png）
pub fn extract_mime_type_from_data_url(data_url: &str) -> &str {
    data_url
        .split(':')
        .nth(1)
        .and_then(|s| s.split(';').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("image/png")
}

/// リモート診断アダプタ
#[async_trait]
pub trait DiagnosisAdapter {
    /// 1回のユーザー操作につき1回だけ呼ぶ（リトライ・キューなし）
    async fn request_diagnosis(&self, frame: &EncodedFrame, label: &str) -> Result<Diagnosis>;

    /// 画像中で最も目立つ物体の名前
    async fn identify_object(&self, frame: &EncodedFrame) -> Result<String>;
}

/// 診断を要求し、失敗時はフォールバック診断を返す
pub async fn request_diagnosis_or_fallback<A>(adapter: &A, frame: &EncodedFrame, label: &str) -> Diagnosis
where
    A: DiagnosisAdapter + ?Sized,
{
    match adapter.request_diagnosis(frame, label).await {
        Ok(diagnosis) => diagnosis,
        Err(e) => {
            warn!(error = %e, label, "リモート診断に失敗したためフォールバックを使用します");
            fallback_diagnosis(label)
        }
    }
}

/// 物体識別（失敗時は空文字列）
pub async fn identify_object_or_empty<A>(adapter: &A, frame: &EncodedFrame) -> String
where
    A: DiagnosisAdapter + ?Sized,
{
    match adapter.identify_object(frame).await {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "物体識別に失敗しました");
            String::new()
        }
    }
}
