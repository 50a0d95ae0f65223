//! スキャン結果・診断結果の型定義
//!
//! CLIと共通ロジックで共有される型:
//! - Prediction: 1フレームの分類結果（クラスごと）
//! - DetectionResult: スキャンセッションの確定結果
//! - Diagnosis / Remedy: リモートAI診断の構造化結果

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// 確率の許容誤差（モデル出力の丸め誤差を吸収する）
const PROBABILITY_EPSILON: f32 = 1e-4;

/// 1クラス分の予測
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "className", alias = "label")]
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// 予測セットの境界検証
///
/// 空でないこと、全確率が有限かつ [0, 1] に収まることを確認する。
/// 許容誤差内のはみ出しは丸めて返す。
pub fn validate_predictions(predictions: Vec<Prediction>) -> Result<Vec<Prediction>> {
    if predictions.is_empty() {
        return Err(Error::InvalidPredictions("予測セットが空です".into()));
    }

    predictions
        .into_iter()
        .map(|p| {
            if !p.probability.is_finite()
                || p.probability < -PROBABILITY_EPSILON
                || p.probability > 1.0 + PROBABILITY_EPSILON
            {
                return Err(Error::InvalidPredictions(format!(
                    "確率が範囲外です: {} = {}",
                    p.label, p.probability
                )));
            }
            Ok(Prediction {
                probability: p.probability.clamp(0.0, 1.0),
                ..p
            })
        })
        .collect()
}

/// 最大確率の予測を返す（同率は入力順で先のもの）
pub fn top_prediction(predictions: &[Prediction]) -> Option<&Prediction> {
    let mut iter = predictions.iter();
    let mut best = iter.next()?;
    for p in iter {
        if p.probability > best.probability {
            best = p;
        }
    }
    Some(best)
}

/// スキャンセッションの確定結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: String,
}

/// 対処法の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemedyKind {
    Organic,
    Chemical,
}

impl RemedyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemedyKind::Organic => "organic",
            RemedyKind::Chemical => "chemical",
        }
    }
}

impl std::str::FromStr for RemedyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "organic" => Ok(RemedyKind::Organic),
            "chemical" => Ok(RemedyKind::Chemical),
            _ => Err(format!("Unknown remedy type: {}. Use organic or chemical", s)),
        }
    }
}

impl<'de> Deserialize<'de> for RemedyKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for RemedyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 対処法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remedy {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RemedyKind,
    pub action: String,
}

/// リモートAI診断結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub diagnosis: String,
    pub advice: String,

    #[serde(default)]
    pub remedies: Vec<Remedy>,

    #[serde(default)]
    pub product_match: String,
}

impl Diagnosis {
    /// 診断名に健康マーカーが含まれるか
    pub fn is_healthy(&self, healthy_marker: &str) -> bool {
        crate::taxonomy::label_is_healthy(&self.diagnosis, healthy_marker)
    }
}
