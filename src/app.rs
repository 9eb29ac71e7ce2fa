//! Engine orchestration.
//!
//! `NoteEngine` wires the capture controller, the insight and speech
//! providers, and the state model behind one cloneable handle. The model's
//! mutex is never held across an await; async results re-acquire it and
//! check the attempt counter before applying anything.

use crate::capture::{CaptureController, CaptureError};
use crate::config::EngineConfig;
use crate::insight::{GeminiInsightClient, InsightError, InsightProvider};
use crate::machine::{NoteEvent, NoteModel, Phase};
use crate::note::{AudioPayload, VoiceNote};
use crate::playback;
use crate::speech::{GeminiSpeechClient, SpeechError, SpeechProvider};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Insight error: {0}")]
    Insight(#[from] InsightError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("No completed note to speak")]
    NoCompletedNote,

    #[error("Speech synthesis already in progress")]
    SynthesisPending,

    #[error("State lock poisoned: {0}")]
    Lock(String),
}

struct EngineInner {
    model: NoteModel,
    capture: CaptureController,
    synthesis_pending: bool,
}

/// Shared engine handle. Clones refer to the same underlying state.
#[derive(Clone)]
pub struct NoteEngine {
    inner: Arc<Mutex<EngineInner>>,
    insight: Arc<dyn InsightProvider>,
    speech: Arc<dyn SpeechProvider>,
}

impl NoteEngine {
    /// Build an engine backed by the Gemini providers from the config.
    pub fn new(config: EngineConfig) -> Self {
        let insight = Arc::new(
            GeminiInsightClient::with_model(config.api_key.clone(), &config.insight_model)
                .with_timeout(config.request_timeout),
        );
        let speech = Arc::new(
            GeminiSpeechClient::with_model(config.api_key.clone(), &config.speech_model)
                .with_voice(&config.voice)
                .with_timeout(config.request_timeout),
        );
        Self::with_providers(config, insight, speech)
    }

    /// Build an engine with explicit providers.
    pub fn with_providers(
        config: EngineConfig,
        insight: Arc<dyn InsightProvider>,
        speech: Arc<dyn SpeechProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                model: NoteModel::default(),
                capture: CaptureController::new(config.max_duration_secs),
                synthesis_pending: false,
            })),
            insight,
            speech,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineInner>, EngineError> {
        self.inner.lock().map_err(|e| EngineError::Lock(e.to_string()))
    }

    /// Start a new recording attempt.
    ///
    /// Only legal from Idle; a completed note or pending error must be
    /// reset first. Blocks until the capture stream is confirmed live, so
    /// the permission prompt is part of this call.
    pub fn start_recording(&self) -> Result<(), EngineError> {
        let mut inner = self.lock()?;

        if !inner.model.phase().can_start_recording() {
            return Err(EngineError::AlreadyRecording);
        }

        let attempt = inner.model.bump_attempt();

        match inner.capture.start() {
            Ok(()) => {
                inner.model.apply(NoteEvent::RecordStarted);
                log::info!("Recording started (attempt {})", attempt);
                Ok(())
            }
            Err(e) => {
                inner.model.apply(NoteEvent::CaptureFailed(e.to_string()));
                Err(EngineError::Capture(e))
            }
        }
    }

    /// Stop the recording and run insight extraction on the result.
    ///
    /// Returns the completed note, or `Ok(None)` when the attempt was
    /// superseded by a reset or a newer recording while the request was in
    /// flight (its result is discarded, state untouched).
    pub async fn stop_and_process(&self) -> Result<Option<VoiceNote>, EngineError> {
        let (payload, attempt) = {
            let mut inner = self.lock()?;

            if !inner.model.phase().can_stop_recording() {
                return Err(EngineError::NotRecording);
            }

            let payload = match inner.capture.stop() {
                Ok(payload) => payload,
                Err(e) => {
                    inner.model.apply(NoteEvent::CaptureFailed(e.to_string()));
                    return Err(EngineError::Capture(e));
                }
            };

            inner.model.apply(NoteEvent::RecordStopped);
            (payload, inner.model.attempt())
        };

        self.process(payload, attempt).await
    }

    /// Insight half of an attempt. The lock is released while the request
    /// is in flight and re-acquired to apply the outcome.
    async fn process(
        &self,
        payload: AudioPayload,
        attempt: u64,
    ) -> Result<Option<VoiceNote>, EngineError> {
        log::info!(
            "Processing {:.1}s of audio with {} ({})",
            payload.duration_secs,
            self.insight.name(),
            self.insight.model()
        );

        let result = self.insight.extract(&payload).await;

        let mut inner = self.lock()?;
        if inner.model.attempt() != attempt {
            log::info!("Discarding stale insight result (attempt {})", attempt);
            return Ok(None);
        }

        match result {
            Ok(insight) => {
                let note = VoiceNote::new(payload).with_insight(insight);
                inner.model.apply(NoteEvent::InsightReady(note.clone()));
                Ok(Some(note))
            }
            Err(e) => {
                inner.model.apply(NoteEvent::ProcessingFailed(e.to_string()));
                Err(EngineError::Insight(e))
            }
        }
    }

    /// Discard the current note or error and return to Idle.
    ///
    /// A live recording is abandoned and the device released. Results of
    /// requests still in flight will be discarded when they resolve.
    pub fn reset(&self) -> Result<(), EngineError> {
        let mut inner = self.lock()?;

        if inner.capture.is_recording() {
            log::info!("Abandoning live recording on reset");
            inner.capture.abandon();
        }

        inner.model.bump_attempt();
        inner.model.apply(NoteEvent::Reset);
        inner.synthesis_pending = false;

        Ok(())
    }

    /// Speak the completed note's summary.
    ///
    /// Rejected while a previous synthesis or its playback is still
    /// pending. A reset during the request suppresses the playback.
    pub async fn play_summary(&self) -> Result<(), EngineError> {
        let (summary, attempt) = {
            let mut inner = self.lock()?;

            if inner.model.phase() != Phase::Completed {
                return Err(EngineError::NoCompletedNote);
            }
            let summary = inner
                .model
                .note()
                .and_then(|note| note.insight.as_ref())
                .map(|insight| insight.summary.clone())
                .ok_or(EngineError::NoCompletedNote)?;

            if inner.synthesis_pending {
                return Err(EngineError::SynthesisPending);
            }
            inner.synthesis_pending = true;

            (summary, inner.model.attempt())
        };

        log::info!("Speaking summary with {} ({})", self.speech.name(), self.speech.model());
        let synth_result = self.speech.synthesize(&summary).await;

        let speech = {
            let mut inner = self.lock()?;

            if inner.model.attempt() != attempt {
                // The pending flag now belongs to a newer attempt, if any.
                log::info!("Discarding stale speech for attempt {}", attempt);
                return Ok(());
            }

            match synth_result {
                Ok(speech) => speech,
                Err(e) => {
                    inner.synthesis_pending = false;
                    return Err(EngineError::Speech(e));
                }
            }
        };

        // rodio blocks for the duration of playback.
        let play_result = tokio::task::spawn_blocking(move || playback::play_blocking(&speech))
            .await
            .map_err(|e| SpeechError::Playback(e.to_string()))
            .and_then(|r| r);

        {
            let mut inner = self.lock()?;
            if inner.model.attempt() == attempt {
                inner.synthesis_pending = false;
            }
        }

        play_result.map_err(EngineError::Speech)
    }

    pub fn phase(&self) -> Result<Phase, EngineError> {
        Ok(self.lock()?.model.phase())
    }

    /// Non-blocking phase read for UI polling; `None` while the lock is
    /// held elsewhere (for example during stream startup).
    pub fn try_phase(&self) -> Option<Phase> {
        self.inner.try_lock().ok().map(|inner| inner.model.phase())
    }

    pub fn current_note(&self) -> Result<Option<VoiceNote>, EngineError> {
        Ok(self.lock()?.model.note().cloned())
    }

    pub fn last_error(&self) -> Result<Option<String>, EngineError> {
        Ok(self.lock()?.model.error().map(str::to_string))
    }

    /// Seconds of audio captured so far, for the recording-time display.
    pub fn recording_elapsed_secs(&self) -> Result<f32, EngineError> {
        Ok(self.lock()?.capture.elapsed_secs())
    }

    pub fn synthesis_pending(&self) -> Result<bool, EngineError> {
        Ok(self.lock()?.synthesis_pending)
    }

    /// Drive an attempt through processing without the capture device.
    #[cfg(test)]
    pub(crate) async fn process_payload(
        &self,
        payload: AudioPayload,
    ) -> Result<Option<VoiceNote>, EngineError> {
        let attempt = {
            let mut inner = self.lock()?;
            let attempt = inner.model.bump_attempt();
            inner.model.apply(NoteEvent::RecordStarted);
            inner.model.apply(NoteEvent::RecordStopped);
            attempt
        };
        self.process(payload, attempt).await
    }
}
