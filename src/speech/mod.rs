//! Speech synthesis of note summaries.
//!
//! A provider turns summary text into raw PCM samples ready for playback.

use async_trait::async_trait;
use std::time::Duration;

mod gemini;

pub use gemini::{GeminiSpeechClient, DEFAULT_SPEECH_MODEL, DEFAULT_VOICE};

/// Default timeout for synthesis requests
pub const DEFAULT_SPEECH_TIMEOUT: Duration = Duration::from_secs(60);

/// Sample rate of synthesized speech (fixed by the TTS service)
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Synthesized speech is always mono
pub const SPEECH_CHANNELS: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Failed to generate speech: the service returned no audio")]
    NoAudio,

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// Decoded speech, ready to hand to an audio sink.
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SynthesizedSpeech {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

/// Decode little-endian signed 16-bit PCM into f32 samples.
///
/// Every byte pair becomes one sample in [-1.0, 1.0); a trailing odd byte
/// is ignored. No resampling or channel mixing happens here.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Trait for speech synthesis providers
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize the given text as speech.
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, SpeechError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Model identifier in use
    fn model(&self) -> &str;
}
