use crate::error::{Result, ScanError};
use leaf_scan_common::controller::{
    DEFAULT_ANALYZING_DELAY, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_HOLD_DURATION, DEFAULT_INSTRUCTION,
};
use leaf_scan_common::{BackgroundClass, ClassTaxonomy, ControllerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const API_KEY_ENV_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub api_key: Option<String>,
    /// 生成AIモデル名
    pub model: String,
    pub api_base_url: String,
    /// 分類モデルのベースURL（http(s)/file/ローカルディレクトリ）
    pub model_url: String,
    pub confidence_threshold: f32,
    pub hold_duration_ms: u64,
    pub analyzing_delay_ms: u64,
    pub still_analysis_delay_ms: u64,
    pub background_class: Option<BackgroundClass>,
    pub healthy_marker: String,
    pub instruction: String,
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-3-flash-preview".into(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model_url: "./model/".into(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            hold_duration_ms: DEFAULT_HOLD_DURATION.as_millis() as u64,
            analyzing_delay_ms: DEFAULT_ANALYZING_DELAY.as_millis() as u64,
            still_analysis_delay_ms: 1000,
            background_class: None,
            healthy_marker: "healthy".into(),
            instruction: DEFAULT_INSTRUCTION.into(),
            timeout_seconds: 60,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ScanError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("leaf-scan").join("config.json"))
    }

    /// ダウンロードしたモデルの保存先
    pub fn model_cache_dir() -> Result<PathBuf> {
        let base = dirs::cache_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| ScanError::Config("キャッシュディレクトリが見つかりません".into()))?;
        Ok(base.join("leaf-scan").join("models"))
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ScanError::Config(format!(
                "confidenceThreshold は 0.0〜1.0 で指定してください: {}",
                self.confidence_threshold
            )));
        }
        if self.healthy_marker.trim().is_empty() {
            return Err(ScanError::Config("healthyMarker が空です".into()));
        }
        Ok(())
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        for var in API_KEY_ENV_VARS {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Ok(key);
                }
            }
        }

        self.api_key.clone().ok_or(ScanError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_millis(self.hold_duration_ms)
    }

    pub fn analyzing_delay(&self) -> Duration {
        Duration::from_millis(self.analyzing_delay_ms)
    }

    pub fn still_analysis_delay(&self) -> Duration {
        Duration::from_millis(self.still_analysis_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// モデルのラベル一覧から分類体系を構築
    pub fn taxonomy(&self, labels: Vec<String>) -> Result<ClassTaxonomy> {
        Ok(ClassTaxonomy::new(
            labels,
            self.background_class.as_ref(),
            self.healthy_marker.clone(),
        )?)
    }

    pub fn controller_config(&self, taxonomy: ClassTaxonomy) -> ControllerConfig {
        ControllerConfig::new(taxonomy)
            .with_confidence_threshold(self.confidence_threshold)
            .with_hold_duration(self.hold_duration())
            .with_analyzing_delay(self.analyzing_delay())
            .with_instruction(self.instruction.clone())
    }

    /// 表示用にマスクしたAPIキー
    pub fn masked_api_key(&self) -> String {
        match self.get_api_key() {
            Ok(key) if key.chars().count() > 4 => {
                let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
                format!("****{}", tail)
            }
            Ok(_) => "****".into(),
            Err(_) => "未設定".into(),
        }
    }
}
