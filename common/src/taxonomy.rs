//! クラス分類体系
//!
//! モデル読み込み時に一度だけ確定し、セッション中は変更しない。
//! 背景クラスは設定で名前または位置を明示する（推測しない）。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// 背景（環境）クラスの指定方法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundClass {
    /// ラベル名で指定
    Name(String),
    /// ラベル配列の位置で指定（旧来の固定インデックス）
    Position(usize),
}

/// ラベルが健康クラスを表すか（大文字小文字を無視した部分一致）
pub fn label_is_healthy(label: &str, healthy_marker: &str) -> bool {
    !healthy_marker.is_empty() && label.to_lowercase().contains(&healthy_marker.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTaxonomy {
    labels: Vec<String>,
    background: Option<String>,
    healthy_marker: String,
}

impl ClassTaxonomy {
    /// ラベル一覧と設定から分類体系を構築
    ///
    /// 指定された背景クラスがラベルに存在しない場合は設定エラー。
    pub fn new(
        labels: Vec<String>,
        background: Option<&BackgroundClass>,
        healthy_marker: impl Into<String>,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Config("クラスラベルが空です".into()));
        }

        let background = match background {
            None => None,
            Some(BackgroundClass::Name(name)) => {
                if !labels.iter().any(|l| l == name) {
                    return Err(Error::Config(format!(
                        "背景クラス '{}' がラベルに存在しません: {:?}",
                        name, labels
                    )));
                }
                Some(name.clone())
            }
            Some(BackgroundClass::Position(index)) => {
                let label = labels.get(*index).ok_or_else(|| {
                    Error::Config(format!(
                        "背景クラスの位置 {} が範囲外です（クラス数 {}）",
                        index,
                        labels.len()
                    ))
                })?;
                Some(label.clone())
            }
        };

        Ok(Self {
            labels,
            background,
            healthy_marker: healthy_marker.into(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn background_label(&self) -> Option<&str> {
        self.background.as_deref()
    }

    pub fn healthy_marker(&self) -> &str {
        &self.healthy_marker
    }

    pub fn is_background(&self, label: &str) -> bool {
        self.background.as_deref() == Some(label)
    }

    pub fn is_healthy(&self, label: &str) -> bool {
        label_is_healthy(label, &self.healthy_marker)
    }
}
