use crate::insight::DEFAULT_INSIGHT_MODEL;
use crate::speech::{DEFAULT_SPEECH_MODEL, DEFAULT_VOICE};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: String,
    pub insight_model: String,
    pub speech_model: String,
    /// Prebuilt voice used when speaking summaries
    pub voice: String,
    /// Longest recording kept in the capture buffer, in seconds
    pub max_duration_secs: f32,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            insight_model: DEFAULT_INSIGHT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            max_duration_secs: 300.0,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment (`GEMINI_API_KEY`).
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            ..Self::default()
        }
    }
}
