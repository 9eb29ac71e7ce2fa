//! Microphone capture.
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! that is controlled over a channel. Samples land in a shared buffer as
//! f32 chunks; stopping encodes the buffer to WAV in memory.

use crate::note::AudioPayload;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long to wait for the capture stream to come up before assuming the
/// permission prompt was dismissed or ignored.
const STREAM_READY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Permission denied. Please allow microphone access and try again.")]
    PermissionDenied,

    #[error("Permission prompt was dismissed. Please allow microphone access when prompted.")]
    PermissionDismissed,

    #[error("No microphone found. Please connect a microphone and try again.")]
    DeviceNotFound,

    #[error("Microphone is already in use by another application.")]
    DeviceBusy,

    #[error("Microphone access is blocked by the system security policy.")]
    InsecureContext,

    #[error("Could not start recording: {0}")]
    UnsupportedEnvironment(String),

    #[error("Failed to encode audio: {0}")]
    Encoding(String),
}

/// Map a backend failure description onto the capture error taxonomy.
///
/// Backends word the same failure differently, so this matches on the
/// fragments observed across platforms. Anything unrecognized stays
/// `UnsupportedEnvironment` with the original text preserved.
pub fn classify_backend_failure(description: &str) -> CaptureError {
    let lowered = description.to_lowercase();

    let contains_any = |needles: &[&str]| needles.iter().any(|n| lowered.contains(n));

    if contains_any(&[
        "notallowed",
        "permissiondenied",
        "permission denied",
        "access denied",
        "not permitted",
        "privileges",
    ]) {
        CaptureError::PermissionDenied
    } else if lowered.contains("dismissed") {
        CaptureError::PermissionDismissed
    } else if contains_any(&["notfound", "devicesnotfound", "no device", "no such device"]) {
        CaptureError::DeviceNotFound
    } else if contains_any(&["notreadable", "trackstart", "in use", "busy"]) {
        CaptureError::DeviceBusy
    } else if contains_any(&["secure context", "security policy", "entitlement", "tcc"]) {
        CaptureError::InsecureContext
    } else {
        CaptureError::UnsupportedEnvironment(description.to_string())
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::BuildStreamError::StreamConfigNotSupported
            | cpal::BuildStreamError::InvalidArgument
            | cpal::BuildStreamError::StreamIdOverflow => {
                CaptureError::UnsupportedEnvironment(err.to_string())
            }
            cpal::BuildStreamError::BackendSpecific { err } => {
                classify_backend_failure(&err.description)
            }
        }
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::PlayStreamError::BackendSpecific { err } => {
                classify_backend_failure(&err.description)
            }
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::DeviceNotFound,
            cpal::DefaultStreamConfigError::StreamTypeNotSupported => {
                CaptureError::UnsupportedEnvironment(err.to_string())
            }
            cpal::DefaultStreamConfigError::BackendSpecific { err } => {
                classify_backend_failure(&err.description)
            }
        }
    }
}

/// Captured samples, stored as the chunks the stream callback delivered.
struct ChunkBuffer {
    chunks: VecDeque<Vec<f32>>,
    total_samples: usize,
    sample_rate: u32,
    channels: u16,
    max_samples: usize,
}

impl ChunkBuffer {
    fn new(sample_rate: u32, channels: u16, max_duration_secs: f32) -> Self {
        let max_samples = (sample_rate as f32 * channels as f32 * max_duration_secs) as usize;
        Self {
            chunks: VecDeque::new(),
            total_samples: 0,
            sample_rate,
            channels,
            max_samples,
        }
    }

    fn push(&mut self, chunk: Vec<f32>) {
        self.total_samples += chunk.len();
        self.chunks.push_back(chunk);

        // Trim whole chunks from the front once over the cap, so a runaway
        // session keeps the most recent audio instead of growing unbounded.
        while self.total_samples > self.max_samples {
            match self.chunks.pop_front() {
                Some(oldest) => self.total_samples -= oldest.len(),
                None => break,
            }
        }
    }

    fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.total_samples as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.total_samples = 0;
    }

    /// Encode the buffered samples as a 16-bit PCM WAV file in memory.
    fn to_wav_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;

            for chunk in &self.chunks {
                for &sample in chunk {
                    let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    writer
                        .write_sample(clamped)
                        .map_err(|e| CaptureError::Encoding(e.to_string()))?;
                }
            }

            writer
                .finalize()
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

enum CaptureCommand {
    Stop,
}

struct CaptureHandle {
    command_tx: mpsc::Sender<CaptureCommand>,
    thread_handle: thread::JoinHandle<()>,
}

/// Owns the capture thread and the sample buffer for one recording at a time.
pub struct CaptureController {
    buffer: Arc<Mutex<ChunkBuffer>>,
    handle: Option<CaptureHandle>,
    sample_rate: u32,
    channels: u16,
    max_duration_secs: f32,
}

impl CaptureController {
    pub fn new(max_duration_secs: f32) -> Self {
        Self {
            // Replaced with the device's real format when a stream starts.
            buffer: Arc::new(Mutex::new(ChunkBuffer::new(44_100, 1, max_duration_secs))),
            handle: None,
            sample_rate: 44_100,
            channels: 1,
            max_duration_secs,
        }
    }

    /// Open the default input device and start capturing into a fresh buffer.
    ///
    /// Blocks until the stream is confirmed live or the startup fails. If no
    /// confirmation arrives within `STREAM_READY_TIMEOUT` the attempt is
    /// treated as a dismissed permission prompt; the detached thread shuts
    /// itself down once its command channel disconnects.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        // A leftover stream from a previous attempt holds the device.
        self.abandon();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::DeviceNotFound)?;
        let supported = device.default_input_config()?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let sample_format = supported.sample_format();
        log::info!(
            "Starting capture: {} Hz, {} channel(s), {:?}",
            sample_rate,
            channels,
            sample_format
        );

        self.sample_rate = sample_rate;
        self.channels = channels;
        self.buffer = Arc::new(Mutex::new(ChunkBuffer::new(
            sample_rate,
            channels,
            self.max_duration_secs,
        )));

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let buffer = Arc::clone(&self.buffer);
        let config: cpal::StreamConfig = supported.into();
        let thread_handle = thread::spawn(move || {
            run_capture_thread(device, config, sample_format, buffer, command_rx, ready_tx);
        });

        match ready_rx.recv_timeout(STREAM_READY_TIMEOUT) {
            Ok(Ok(())) => {
                self.handle = Some(CaptureHandle {
                    command_tx,
                    thread_handle,
                });
                log::info!("Capture stream live");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread_handle.join();
                Err(CaptureError::UnsupportedEnvironment(
                    "capture thread exited before the stream started".to_string(),
                ))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Dropping command_tx disconnects the thread's receiver, so it
                // exits on its own whenever the stream finally comes up.
                Err(CaptureError::PermissionDismissed)
            }
        }
    }

    /// Stop capturing and return the recording as an in-memory WAV payload.
    pub fn stop(&mut self) -> Result<AudioPayload, CaptureError> {
        self.release();

        let buffer = self
            .buffer
            .lock()
            .map_err(|_| CaptureError::Encoding("poisoned capture buffer".to_string()))?;
        let duration_secs = buffer.duration_secs();
        let bytes = buffer.to_wav_bytes()?;

        log::info!(
            "Captured {:.1}s of audio ({} WAV bytes)",
            duration_secs,
            bytes.len()
        );

        Ok(AudioPayload::wav(
            bytes,
            self.sample_rate,
            self.channels,
            duration_secs,
        ))
    }

    /// Stop capturing and discard whatever was buffered.
    pub fn abandon(&mut self) {
        self.release();
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::info!("Releasing microphone");
            let _ = handle.command_tx.send(CaptureCommand::Stop);
            let _ = handle.thread_handle.join();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.handle.is_some()
    }

    /// Seconds of audio buffered so far, for recording-time display.
    pub fn elapsed_secs(&self) -> f32 {
        self.buffer
            .lock()
            .map(|buffer| buffer.duration_secs())
            .unwrap_or(0.0)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_capture_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    buffer: Arc<Mutex<ChunkBuffer>>,
    command_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: mpsc::Sender<Result<(), CaptureError>>,
) {
    use cpal::Sample;

    let err_fn = |err| {
        log::error!("Audio stream error: {}", err);
    };

    let build_result = match sample_format {
        SampleFormat::F32 => {
            let buffer = buffer.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(data.to_vec());
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let buffer = buffer.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(samples);
                    }
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let buffer = buffer.clone();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|&s| s.to_float_sample()).collect();
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(samples);
                    }
                },
                err_fn,
                None,
            )
        }
        _ => {
            let _ = ready_tx.send(Err(CaptureError::UnsupportedEnvironment(format!(
                "Unsupported sample format: {:?}",
                sample_format
            ))));
            return;
        }
    };

    let stream = match build_result {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    loop {
        match command_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(CaptureCommand::Stop) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Stream drops here, releasing the device.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_accumulates_samples() {
        let mut buffer = ChunkBuffer::new(16000, 1, 300.0);
        assert_eq!(buffer.duration_secs(), 0.0);

        buffer.push(vec![0.0; 16000]);
        buffer.push(vec![0.0; 8000]);

        assert!((buffer.duration_secs() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_buffer_trims_oldest_chunks_past_cap() {
        // Cap of one second at 1 kHz mono: 1000 samples.
        let mut buffer = ChunkBuffer::new(1000, 1, 1.0);

        buffer.push(vec![0.1; 600]);
        buffer.push(vec![0.2; 600]);
        assert!(buffer.total_samples <= 1000);

        // Oldest chunk is gone; the newest survives.
        assert_eq!(buffer.chunks.len(), 1);
        assert_eq!(buffer.chunks[0][0], 0.2);
    }

    #[test]
    fn test_buffer_clear() {
        let mut buffer = ChunkBuffer::new(16000, 1, 300.0);
        buffer.push(vec![0.5; 4096]);
        buffer.clear();

        assert_eq!(buffer.duration_secs(), 0.0);
        assert!(buffer.chunks.is_empty());
    }

    #[test]
    fn test_wav_encoding_produces_riff_header() {
        let mut buffer = ChunkBuffer::new(16000, 1, 300.0);
        buffer.push(vec![0.0; 1600]);

        let wav_bytes = buffer.to_wav_bytes().unwrap();
        assert_eq!(&wav_bytes[0..4], b"RIFF");
        assert_eq!(&wav_bytes[8..12], b"WAVE");
        // 44-byte header plus two bytes per sample.
        assert_eq!(wav_bytes.len(), 44 + 1600 * 2);
    }

    #[test]
    fn test_wav_encoding_clamps_out_of_range_samples() {
        let mut buffer = ChunkBuffer::new(16000, 1, 300.0);
        buffer.push(vec![2.0, -2.0]);

        let wav_bytes = buffer.to_wav_bytes().unwrap();
        let first = i16::from_le_bytes([wav_bytes[44], wav_bytes[45]]);
        let second = i16::from_le_bytes([wav_bytes[46], wav_bytes[47]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = classify_backend_failure("NotAllowedError: Permission denied by system");
        assert!(matches!(err, CaptureError::PermissionDenied));
        assert!(err.to_string().contains("Permission denied"));
    }

    #[test]
    fn test_classify_device_busy() {
        assert!(matches!(
            classify_backend_failure("Device or resource busy"),
            CaptureError::DeviceBusy
        ));
        assert!(matches!(
            classify_backend_failure("NotReadableError: could not start audio source"),
            CaptureError::DeviceBusy
        ));
    }

    #[test]
    fn test_classify_device_not_found() {
        assert!(matches!(
            classify_backend_failure("no such device"),
            CaptureError::DeviceNotFound
        ));
    }

    #[test]
    fn test_classify_unknown_text_is_preserved() {
        match classify_backend_failure("ALSA function snd_pcm_open returned -22") {
            CaptureError::UnsupportedEnvironment(text) => {
                assert!(text.contains("snd_pcm_open"));
            }
            other => panic!("expected UnsupportedEnvironment, got {:?}", other),
        }
    }

    #[test]
    fn test_controller_initial_state() {
        let controller = CaptureController::new(300.0);
        assert!(!controller.is_recording());
        assert_eq!(controller.elapsed_secs(), 0.0);
    }
}
