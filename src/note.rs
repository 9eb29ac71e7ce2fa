use crate::insight::Insight;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Finalized audio from one recording session.
#[derive(Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Complete WAV container bytes
    pub bytes: Vec<u8>,
    /// IANA media type of `bytes`
    pub mime_type: String,
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of the take in seconds
    pub duration_secs: f32,
}

impl AudioPayload {
    /// Wrap WAV-encoded bytes in a payload.
    pub fn wav(bytes: Vec<u8>, sample_rate: u32, channels: u16, duration_secs: f32) -> Self {
        Self {
            bytes,
            mime_type: "audio/wav".to_string(),
            sample_rate,
            channels,
            duration_secs,
        }
    }
}

impl fmt::Debug for AudioPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Byte content is never useful in logs; print its size instead.
        f.debug_struct("AudioPayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs)
            .finish()
    }
}

/// A finished voice note held in memory.
///
/// Notes live only for the current session; a reset discards them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceNote {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub audio: AudioPayload,
    pub insight: Option<Insight>,
}

impl VoiceNote {
    pub fn new(audio: AudioPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            audio,
            insight: None,
        }
    }

    pub fn with_insight(mut self, insight: Insight) -> Self {
        self.insight = Some(insight);
        self
    }
}
