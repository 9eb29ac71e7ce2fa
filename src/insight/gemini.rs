//! Google Gemini multimodal insight provider.
//!
//! Sends the recording inline with a fixed instruction and a response
//! schema, so the model's only valid answer is the insight JSON.

use super::{parse_insight_json, Insight, InsightError, InsightProvider, DEFAULT_INSIGHT_TIMEOUT};
use crate::note::AudioPayload;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for insight extraction
pub const DEFAULT_INSIGHT_MODEL: &str = "gemini-3-flash-preview";

const INSIGHT_INSTRUCTION: &str = "Transcribe this audio precisely. Then, provide a concise \
    summary, a list of action items, and any key decisions mentioned. Format the output as a \
    structured JSON object.";

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
    #[serde(rename = "responseJsonSchema")]
    response_json_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    message: String,
}

/// Schema the model's response must satisfy. All four fields are required
/// and nothing else is allowed, which keeps parsing strict on our side.
fn insight_response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "transcript": {
                "type": "string",
                "description": "Precise transcription of the audio"
            },
            "summary": {
                "type": "string",
                "description": "Concise summary of the recording"
            },
            "actionItems": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Action items mentioned in the recording"
            },
            "keyDecisions": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Key decisions mentioned in the recording"
            }
        },
        "required": ["transcript", "summary", "actionItems", "keyDecisions"],
        "additionalProperties": false
    })
}

/// Strip an accidental "models/" prefix so both spellings work in config.
fn normalize_model_name(model: &str) -> String {
    let trimmed = model.trim();
    trimmed
        .strip_prefix("models/")
        .unwrap_or(trimmed)
        .to_string()
}

fn extract_text(response: &GenerateContentResponse) -> Result<String, InsightError> {
    let candidate = response
        .candidates
        .first()
        .ok_or(InsightError::EmptyResponse)?;

    let text: String = candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(InsightError::EmptyResponse);
    }

    Ok(text)
}

/// Gemini-backed insight provider
pub struct GeminiInsightClient {
    client: Client,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl GeminiInsightClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_INSIGHT_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: normalize_model_name(model),
            timeout: DEFAULT_INSIGHT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl InsightProvider for GeminiInsightClient {
    async fn extract(&self, audio: &AudioPayload) -> Result<Insight, InsightError> {
        if self.api_key.trim().is_empty() {
            return Err(InsightError::NoApiKey);
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: audio.mime_type.clone(),
                            data: STANDARD.encode(&audio.bytes),
                        }),
                    },
                    Part {
                        text: Some(INSIGHT_INSTRUCTION.to_string()),
                        inline_data: None,
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_json_schema: insight_response_schema(),
            },
        };

        let url = format!("{}/models/{}:generateContent", GEMINI_API_ROOT, self.model);
        log::info!(
            "Requesting insight from {} ({} audio bytes)",
            self.model,
            audio.bytes.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.trim())
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InsightError::Timeout(self.timeout)
                } else {
                    InsightError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorResponse>(&error_text)
                .map(|parsed| parsed.error.message)
                .unwrap_or(error_text);
            return Err(InsightError::Api(format!(
                "Gemini API error ({}): {}",
                status, message
            )));
        }

        let response_json: GenerateContentResponse = response.json().await?;
        let text = extract_text(&response_json)?;

        parse_insight_json(&text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model_name() {
        assert_eq!(normalize_model_name("gemini-3-flash-preview"), "gemini-3-flash-preview");
        assert_eq!(normalize_model_name("models/gemini-3-flash-preview"), "gemini-3-flash-preview");
        assert_eq!(normalize_model_name("  gemini-3-flash-preview  "), "gemini-3-flash-preview");
    }

    #[test]
    fn test_schema_requires_all_fields() {
        let schema = insight_response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();

        assert_eq!(
            required,
            vec!["transcript", "summary", "actionItems", "keyDecisions"]
        );
        assert_eq!(schema["additionalProperties"], serde_json::json!(false));
    }

    #[test]
    fn test_extract_text_with_no_candidates() {
        let response = GenerateContentResponse { candidates: vec![] };
        assert!(matches!(
            extract_text(&response),
            Err(InsightError::EmptyResponse)
        ));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(CandidateContent {
                    parts: vec![
                        ResponsePart {
                            text: Some("{\"transcript\"".to_string()),
                        },
                        ResponsePart {
                            text: Some(": \"hi\"}".to_string()),
                        },
                    ],
                }),
            }],
        };
        assert_eq!(extract_text(&response).unwrap(), "{\"transcript\": \"hi\"}");
    }
}
