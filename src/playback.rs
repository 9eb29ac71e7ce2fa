use crate::speech::{SpeechError, SynthesizedSpeech};
use rodio::buffer::SamplesBuffer;
use rodio::OutputStreamBuilder;
use std::time::Duration;

/// Play synthesized speech on the default output device, blocking until done.
pub fn play_blocking(speech: &SynthesizedSpeech) -> Result<(), SpeechError> {
    let stream = OutputStreamBuilder::open_default_stream()
        .map_err(|e| SpeechError::Playback(e.to_string()))?;

    // Some backends clip the end of playback if the stream drops exactly at
    // the nominal duration, so hold it open a little longer.
    const TAIL_PAD: Duration = Duration::from_millis(250);
    let duration = Duration::from_secs_f32(speech.duration_secs());

    let source = SamplesBuffer::new(speech.channels, speech.sample_rate, speech.samples.clone());
    stream.mixer().add(source);

    std::thread::sleep(duration + TAIL_PAD);

    Ok(())
}
