//! プロンプト生成モジュール
//!
//! リモートAI診断で使うプロンプト:
//! - build_diagnosis_prompt: 検出ラベルに応じた農学者プロンプト
//! - build_identify_prompt: 物体識別プロンプト

use crate::taxonomy::label_is_healthy;

/// 健康な葉に対する診断名
pub const HEALTHY_DIAGNOSIS: &str = "Healthy Crop";

/// 物体識別が空応答のときの名前
pub const UNKNOWN_OBJECT: &str = "Unknown Object";

/// 診断プロンプト生成
///
/// 健康ラベルなら称賛のみ（対処法なし）、それ以外は症状の重さを評価し
/// 有機・化学の対処法を1つずつ求める。
pub fn build_diagnosis_prompt(label: &str, healthy_marker: &str) -> String {
    if label_is_healthy(label, healthy_marker) {
        format!(
            r#"You are a friendly AI Agronomist. This tomato leaf looks healthy.
Return a JSON object with:
- diagnosis: "{HEALTHY_DIAGNOSIS}"
- advice: A short, happy sentence praising the farmer's care.
- remedies: [] (empty array)
- productMatch: "N/A"
"#
        )
    } else {
        format!(
            r#"You are an expert AI Agronomist. This tomato leaf has been flagged as "{label}" (likely Tomato Blight).
Analyze the visual severity.
Return a JSON object with:
- diagnosis: A clear, human-readable medical name for the issue.
- advice: A 1-2 sentence spoken-style advice for the farmer on what to do immediately.
- remedies: An array of 2 objects (one organic, one chemical) with fields: "name" (e.g. Neem Oil), "type" (organic/chemical), "action" (e.g. Spray every 7 days).
- productMatch: A generic name of a product they should buy (e.g. "Copper Fungicide").

Ensure the tone is helpful and calm, not alarming.
"#
        )
    }
}

/// 物体識別プロンプト生成
pub fn build_identify_prompt() -> &'static str {
    r#"Identify the single most prominent object in this image. Return only the object name (e.g. "Water Bottle"). Keep it concise (1-3 words)."#
}
