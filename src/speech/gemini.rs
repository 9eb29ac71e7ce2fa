//! Google Gemini TTS speech provider.
//!
//! The service returns base64 PCM16 at 24 kHz mono inside the usual
//! generateContent response shape, with audio requested via the AUDIO
//! response modality.

use super::{
    decode_pcm16le, SpeechError, SpeechProvider, SynthesizedSpeech, DEFAULT_SPEECH_TIMEOUT,
    SPEECH_CHANNELS, SPEECH_SAMPLE_RATE,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for speech synthesis
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Kore";

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
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<String>,
    #[serde(rename = "speechConfig")]
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
struct SpeechConfig {
    #[serde(rename = "voiceConfig")]
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
struct VoiceConfig {
    #[serde(rename = "prebuiltVoiceConfig")]
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
struct PrebuiltVoiceConfig {
    #[serde(rename = "voiceName")]
    voice_name: String,
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
    #[serde(default, rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorBody,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    message: String,
}

/// Strip an accidental "models/" prefix so both spellings work in config.
fn normalize_model_name(model: &str) -> String {
    let trimmed = model.trim();
    trimmed
        .strip_prefix("models/")
        .unwrap_or(trimmed)
        .to_string()
}

fn speech_prompt(text: &str) -> String {
    format!("Read this summary clearly: {}", text)
}

fn extract_audio_b64(response: GenerateContentResponse) -> Result<String, SpeechError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.inline_data)
        .and_then(|inline| inline.data)
        .filter(|data| !data.is_empty())
        .ok_or(SpeechError::NoAudio)
}

/// Gemini-backed speech provider
pub struct GeminiSpeechClient {
    client: Client,
    api_key: String,
    model: String,
    voice: String,
    timeout: Duration,
}

impl GeminiSpeechClient {
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_SPEECH_MODEL)
    }

    pub fn with_model(api_key: String, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: normalize_model_name(model),
            voice: DEFAULT_VOICE.to_string(),
            timeout: DEFAULT_SPEECH_TIMEOUT,
        }
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = voice.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SpeechProvider for GeminiSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, SpeechError> {
        if self.api_key.trim().is_empty() {
            return Err(SpeechError::NoApiKey);
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: speech_prompt(text),
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                },
            },
        };

        let url = format!("{}/models/{}:generateContent", GEMINI_API_ROOT, self.model);
        log::info!(
            "Requesting speech from {} (voice {}, {} chars)",
            self.model,
            self.voice,
            text.len()
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
                    SpeechError::Timeout(self.timeout)
                } else {
                    SpeechError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorResponse>(&error_text)
                .map(|parsed| parsed.error.message)
                .unwrap_or(error_text);
            return Err(SpeechError::Api(format!(
                "Gemini API error ({}): {}",
                status, message
            )));
        }

        let response_json: GenerateContentResponse = response.json().await?;
        let audio_b64 = extract_audio_b64(response_json)?;
        let pcm_bytes = STANDARD
            .decode(audio_b64)
            .map_err(|e| SpeechError::Api(format!("Invalid base64 audio payload: {}", e)))?;

        let samples = decode_pcm16le(&pcm_bytes);
        if samples.is_empty() {
            return Err(SpeechError::NoAudio);
        }

        let speech = SynthesizedSpeech {
            samples,
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: SPEECH_CHANNELS,
        };
        log::info!(
            "Synthesized {:.1}s of speech ({} samples)",
            speech.duration_secs(),
            speech.samples.len()
        );

        Ok(speech)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
