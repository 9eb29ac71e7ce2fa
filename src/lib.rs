//! Voice-note engine: record microphone audio, extract a structured insight
//! (transcript, summary, action items, key decisions) through a remote
//! multimodal model, and optionally speak the summary back.
//!
//! `NoteEngine` is the entry point; a presentation layer drives it through
//! four actions (start, stop-and-process, reset, play-summary) and renders
//! the current `Phase`.

pub mod app;
pub mod capture;
pub mod config;
pub mod insight;
pub mod machine;
pub mod note;
pub mod playback;
pub mod speech;

#[cfg(test)]
mod tests;

pub use app::{EngineError, NoteEngine};
pub use capture::CaptureError;
pub use config::EngineConfig;
pub use insight::{Insight, InsightError, InsightProvider};
pub use machine::{NoteEvent, NoteModel, Phase};
pub use note::{AudioPayload, VoiceNote};
pub use speech::{SpeechError, SpeechProvider, SynthesizedSpeech};
