//! Note lifecycle state machine.
//!
//! Every transition runs through a single reducer so the legal-transition
//! table lives in one place. Events that are not legal in the current phase
//! leave the model untouched.

use crate::note::VoiceNote;
use serde::Serialize;

/// Lifecycle phase of the note engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Ready to start a new recording
    #[default]
    Idle,
    /// Microphone is live and capturing
    Recording,
    /// Awaiting the remote insight result
    Processing,
    /// A finished note with its insight is available
    Completed,
    /// The last attempt failed (recoverable)
    Error,
}

impl Phase {
    /// Check if this phase allows starting a new recording
    pub fn can_start_recording(&self) -> bool {
        matches!(self, Phase::Idle)
    }

    /// Check if this phase allows stopping a recording
    pub fn can_stop_recording(&self) -> bool {
        matches!(self, Phase::Recording)
    }
}

/// Events that drive the note lifecycle
#[derive(Debug)]
pub enum NoteEvent {
    /// A new recording attempt has begun
    RecordStarted,
    /// Microphone acquisition or capture failed
    CaptureFailed(String),
    /// Recording finished; processing has begun
    RecordStopped,
    /// Insight extraction finished for the current attempt
    InsightReady(VoiceNote),
    /// Insight extraction failed for the current attempt
    ProcessingFailed(String),
    /// Discard the current note or error and return to idle
    Reset,
}

/// The engine's complete observable state.
///
/// Outside Idle and Recording, at most one of note and error is set:
/// Completed keeps the note, Error keeps the message, Reset clears both.
#[derive(Debug, Default)]
pub struct NoteModel {
    phase: Phase,
    note: Option<VoiceNote>,
    error: Option<String>,
    attempt: u64,
}

impl NoteModel {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn note(&self) -> Option<&VoiceNote> {
        self.note.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Generation counter for the current attempt.
    ///
    /// Async work snapshots this before awaiting and applies its outcome only
    /// while the snapshot still matches, so results of abandoned attempts are
    /// discarded instead of overwriting newer state.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Begin a new generation, invalidating any in-flight results.
    pub fn bump_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.attempt
    }

    /// Apply one event, returning the phase it produced.
    pub fn apply(&mut self, event: NoteEvent) -> Phase {
        match (self.phase, event) {
            (Phase::Idle, NoteEvent::RecordStarted) => {
                self.error = None;
                self.phase = Phase::Recording;
            }
            (Phase::Recording, NoteEvent::RecordStopped) => {
                self.phase = Phase::Processing;
            }
            // From Idle when acquisition fails before the stream goes live,
            // from Recording when the device fails mid-session.
            (Phase::Idle | Phase::Recording, NoteEvent::CaptureFailed(message)) => {
                self.note = None;
                self.error = Some(message);
                self.phase = Phase::Error;
            }
            (Phase::Processing, NoteEvent::InsightReady(note)) => {
                self.note = Some(note);
                self.error = None;
                self.phase = Phase::Completed;
            }
            (Phase::Processing, NoteEvent::ProcessingFailed(message)) => {
                self.note = None;
                self.error = Some(message);
                self.phase = Phase::Error;
            }
            (_, NoteEvent::Reset) => {
                self.note = None;
                self.error = None;
                self.phase = Phase::Idle;
            }
            (phase, event) => {
                log::debug!("Ignoring {:?} in phase {:?}", event, phase);
            }
        }

        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::AudioPayload;

    fn note() -> VoiceNote {
        VoiceNote::new(AudioPayload::wav(vec![0u8; 64], 16000, 1, 0.01))
    }

    #[test]
    fn test_phase_guards() {
        assert!(Phase::Idle.can_start_recording());
        assert!(!Phase::Recording.can_start_recording());
        assert!(!Phase::Processing.can_start_recording());
        assert!(!Phase::Completed.can_start_recording());
        assert!(!Phase::Error.can_start_recording());

        assert!(Phase::Recording.can_stop_recording());
        assert!(!Phase::Idle.can_stop_recording());
        assert!(!Phase::Processing.can_stop_recording());
    }

    #[test]
    fn test_happy_path_trace() {
        let mut model = NoteModel::default();
        assert_eq!(model.phase(), Phase::Idle);

        assert_eq!(model.apply(NoteEvent::RecordStarted), Phase::Recording);
        assert_eq!(model.apply(NoteEvent::RecordStopped), Phase::Processing);
        assert_eq!(model.apply(NoteEvent::InsightReady(note())), Phase::Completed);

        assert!(model.note().is_some());
        assert!(model.error().is_none());
    }

    #[test]
    fn test_processing_failure_trace() {
        let mut model = NoteModel::default();
        model.apply(NoteEvent::RecordStarted);
        model.apply(NoteEvent::RecordStopped);

        assert_eq!(
            model.apply(NoteEvent::ProcessingFailed("No response from AI".to_string())),
            Phase::Error
        );
        assert_eq!(model.error(), Some("No response from AI"));
        assert!(model.note().is_none());
    }

    #[test]
    fn test_capture_failure_while_recording() {
        let mut model = NoteModel::default();
        model.apply(NoteEvent::RecordStarted);

        assert_eq!(
            model.apply(NoteEvent::CaptureFailed("no microphone".to_string())),
            Phase::Error
        );
        assert_eq!(model.error(), Some("no microphone"));
    }

    #[test]
    fn test_capture_failure_before_the_stream_goes_live() {
        // Acquisition failures arrive while still Idle.
        let mut model = NoteModel::default();

        assert_eq!(
            model.apply(NoteEvent::CaptureFailed("permission denied".to_string())),
            Phase::Error
        );
        assert_eq!(model.error(), Some("permission denied"));
        assert!(model.note().is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let reach_completed = |model: &mut NoteModel| {
            model.apply(NoteEvent::RecordStarted);
            model.apply(NoteEvent::RecordStopped);
            model.apply(NoteEvent::InsightReady(note()));
        };
        let reach_error = |model: &mut NoteModel| {
            model.apply(NoteEvent::RecordStarted);
            model.apply(NoteEvent::CaptureFailed("busy".to_string()));
        };
        let reach_processing = |model: &mut NoteModel| {
            model.apply(NoteEvent::RecordStarted);
            model.apply(NoteEvent::RecordStopped);
        };

        let builders: [fn(&mut NoteModel); 3] = [reach_completed, reach_error, reach_processing];
        for build in builders {
            let mut model = NoteModel::default();
            build(&mut model);

            assert_eq!(model.apply(NoteEvent::Reset), Phase::Idle);
            assert!(model.note().is_none());
            assert!(model.error().is_none());
        }
    }

    #[test]
    fn test_illegal_events_are_ignored() {
        let mut model = NoteModel::default();

        // Nothing to stop yet.
        assert_eq!(model.apply(NoteEvent::RecordStopped), Phase::Idle);

        // A result arriving outside Processing changes nothing.
        assert_eq!(model.apply(NoteEvent::InsightReady(note())), Phase::Idle);
        assert!(model.note().is_none());

        model.apply(NoteEvent::RecordStarted);
        assert_eq!(model.apply(NoteEvent::RecordStarted), Phase::Recording);
    }

    #[test]
    fn test_starting_clears_prior_error() {
        let mut model = NoteModel::default();
        model.apply(NoteEvent::RecordStarted);
        model.apply(NoteEvent::CaptureFailed("busy".to_string()));
        model.apply(NoteEvent::Reset);

        model.apply(NoteEvent::RecordStarted);
        assert_eq!(model.phase(), Phase::Recording);
        assert!(model.error().is_none());
    }

    #[test]
    fn test_attempt_counter_moves_forward() {
        let mut model = NoteModel::default();
        let first = model.bump_attempt();
        let second = model.bump_attempt();
        assert!(second > first);
        assert_eq!(model.attempt(), second);
    }
}
