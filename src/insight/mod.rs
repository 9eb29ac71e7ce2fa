//! Insight extraction from recorded audio.
//!
//! A provider takes the finished recording and returns the structured
//! insight: transcript, summary, action items, and key decisions.

use crate::note::AudioPayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod gemini;

pub use gemini::{GeminiInsightClient, DEFAULT_INSIGHT_MODEL};

/// Default timeout for insight requests
pub const DEFAULT_INSIGHT_TIMEOUT: Duration = Duration::from_secs(60);

/// Structured insight extracted from one recording.
///
/// All four fields are required. A response that omits any of them is a
/// schema violation, never defaulted on the client side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub transcript: String,
    pub summary: String,
    #[serde(rename = "actionItems")]
    pub action_items: Vec<String>,
    #[serde(rename = "keyDecisions")]
    pub key_decisions: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("No response from AI")]
    EmptyResponse,

    #[error("Response did not match the insight schema: {0}")]
    SchemaViolation(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No API key configured")]
    NoApiKey,
}

/// Trait for insight providers
#[async_trait]
pub trait InsightProvider: Send + Sync {
    /// Extract a structured insight from a finished recording.
    async fn extract(&self, audio: &AudioPayload) -> Result<Insight, InsightError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Model identifier in use
    fn model(&self) -> &str;
}

/// Parse a model response strictly against the insight shape.
pub fn parse_insight_json(text: &str) -> Result<Insight, InsightError> {
    serde_json::from_str(text).map_err(|e| InsightError::SchemaViolation(e.to_string()))
}
