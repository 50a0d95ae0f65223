//! Gemini API連携

use super::{DiagnosisAdapter, EncodedFrame};
use crate::config::Config;
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use leaf_scan_common::{build_diagnosis_prompt, build_identify_prompt, parse_diagnosis, parse_identify_response, Diagnosis};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Gemini APIリクエスト
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

/// Gemini APIレスポンス
#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    /// 先頭候補の最初のテキスト
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.as_deref()))
    }

    /// 識別結果（テキストがなければ Unknown Object）
    fn object_name(&self) -> String {
        parse_identify_response(self.text().unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: ResponseContent,
}

#[derive(Deserialize, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// Gemini クライアント
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    healthy_marker: String,
}

impl GeminiClient {
    /// 設定から作成（APIキー未設定はエラー）
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.get_api_key()?;
        Self::new(
            api_key,
            config.model.clone(),
            config.api_base_url.clone(),
            config.healthy_marker.clone(),
            config.timeout(),
        )
    }

    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        healthy_marker: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ScanError::MissingApiKey);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            healthy_marker,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Gemini API呼び出し（共通処理）
    async fn call_gemini_api(&self, request: &GeminiRequest) -> Result<GeminiResponse> {
        debug!(model = %self.model, "Gemini API 呼び出し");
        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::ApiCall(format!("API error: {} {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ScanError::ApiParse(format!("レスポンスのパースに失敗: {}", e)))
    }

    fn image_request(prompt: String, frame: &EncodedFrame, json: bool) -> GeminiRequest {
        let parts = vec![
            Part::Text { text: prompt },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: frame.mime_type.clone(),
                    data: frame.data.clone(),
                },
            },
        ];
        GeminiRequest {
            contents: vec![Content { parts }],
            generation_config: json.then(|| GenerationConfig {
                response_mime_type: "application/json".to_string(),
            }),
        }
    }
}

#[async_trait]
impl DiagnosisAdapter for GeminiClient {
    async fn request_diagnosis(&self, frame: &EncodedFrame, label: &str) -> Result<Diagnosis> {
        let prompt = build_diagnosis_prompt(label, &self.healthy_marker);
        let request = Self::image_request(prompt, frame, true);
        let response = self.call_gemini_api(&request).await?;
        let text = response.text().ok_or_else(|| ScanError::ApiParse("Empty response".into()))?;
        let diagnosis = parse_diagnosis(text)?;
        info!(label, diagnosis = %diagnosis.diagnosis, "診断を受信しました");
        Ok(diagnosis)
    }

    async fn identify_object(&self, frame: &EncodedFrame) -> Result<String> {
        let request = Self::image_request(build_identify_prompt().to_string(), frame, false);
        let response = self.call_gemini_api(&request).await?;
        Ok(response.object_name())
    }
}
