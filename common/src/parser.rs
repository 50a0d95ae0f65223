//! APIレスポンスパーサー
//!
//! 生成AIのレスポンスからJSONを抽出し、診断結果として検証する。
//! 形が不正なレスポンスは信用せずエラーにする（呼び出し側でフォールバック）。

use crate::error::{Error, Result};
use crate::prompts::UNKNOWN_OBJECT;
use crate::types::Diagnosis;

/// フォールバック時の助言
pub const FALLBACK_ADVICE: &str =
    "I'm having trouble connecting to the lab, but please inspect this plant manually.";

/// フォールバック時の推奨製品
pub const FALLBACK_PRODUCT: &str = "Consult Local Expert";

/// APIレスポンスからJSONオブジェクト部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 生の {...} オブジェクト
/// 3. エラー
///
/// # Examples
/// ```
/// use leaf_scan_common::extract_json;
///
/// let response = "result: {\"diagnosis\": \"Early Blight\"}";
/// let json = extract_json(response).unwrap();
/// assert!(json.starts_with('{'));
/// ```
pub fn extract_json(response: &str) -> Result<&str> {
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            let end = start + end_offset;
            return Ok(response[start..end].trim());
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end >= start {
                return Ok(&response[start..=end]);
            }
        }
    }

    Err(Error::Parse("JSONが見つかりません".into()))
}

/// 診断レスポンスをパース
///
/// # Returns
/// * `Ok(Diagnosis)` - パース・検証成功
/// * `Err` - JSONが見つからない、型が合わない、診断名が空
pub fn parse_diagnosis(response: &str) -> Result<Diagnosis> {
    let json_str = extract_json(response)?;
    let diagnosis: Diagnosis = serde_json::from_str(json_str.trim())
        .map_err(|e| Error::Parse(format!("診断 JSONパースエラー: {}", e)))?;

    if diagnosis.diagnosis.trim().is_empty() {
        return Err(Error::Parse("診断名が空です".into()));
    }

    Ok(diagnosis)
}

/// リモート診断失敗時の固定値
pub fn fallback_diagnosis(label: &str) -> Diagnosis {
    Diagnosis {
        diagnosis: label.to_string(),
        advice: FALLBACK_ADVICE.to_string(),
        remedies: Vec::new(),
        product_match: FALLBACK_PRODUCT.to_string(),
    }
}

/// 物体識別レスポンスを整形（空なら Unknown Object）
pub fn parse_identify_response(response: &str) -> String {
    let name = response.trim().trim_matches('"').trim();
    if name.is_empty() {
        UNKNOWN_OBJECT.to_string()
    } else {
        name.to_string()
    }
}
