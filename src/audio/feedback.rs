//! Audio feedback module
//!
//! Provides audio cues (beeps) for recording lifecycle events. Sounds
//! are generated programmatically to avoid shipping binary assets.
//!
//! rodio's OutputStream is not Send, so playback runs on a dedicated
//! thread; the rest of the daemon holds a cheap cloneable handle and
//! fires cues through a channel. A saturated channel drops cues rather
//! than blocking the hotkey path.

use crate::config::AudioFeedbackConfig;
use crossbeam_channel::{bounded, Sender};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::io::Cursor;
use std::thread;

/// Sound cue types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    /// Recording started
    RecordingStart,
    /// Recording stopped
    RecordingStop,
    /// Recording is about to hit the duration limit
    Warning,
    /// Transcription produced no recognizable speech
    NoSpeech,
    /// Something went wrong (recorder failure, auto-stop)
    Error,
}

/// Cloneable handle for firing sound cues from any thread
#[derive(Clone)]
pub struct FeedbackHandle {
    tx: Sender<SoundCue>,
}

impl FeedbackHandle {
    /// Fire-and-forget: never blocks, drops the cue when playback is behind
    pub fn play(&self, cue: SoundCue) {
        let _ = self.tx.try_send(cue);
    }
}

/// Pre-rendered WAV data for each cue
struct SoundTheme {
    start: Vec<u8>,
    stop: Vec<u8>,
    warning: Vec<u8>,
    no_speech: Vec<u8>,
    error: Vec<u8>,
}

impl SoundTheme {
    fn data(&self, cue: SoundCue) -> &[u8] {
        match cue {
            SoundCue::RecordingStart => &self.start,
            SoundCue::RecordingStop => &self.stop,
            SoundCue::Warning => &self.warning,
            SoundCue::NoSpeech => &self.no_speech,
            SoundCue::Error => &self.error,
        }
    }
}

/// Start the playback thread and return a handle to it.
///
/// Returns None when feedback is disabled. If no audio output is
/// available the handle still works; cues are logged and discarded.
pub fn spawn(config: &AudioFeedbackConfig) -> Option<FeedbackHandle> {
    if !config.enabled {
        return None;
    }

    let (tx, rx) = bounded::<SoundCue>(16);
    let volume = config.volume;

    let spawn_result = thread::Builder::new()
        .name("taptype-feedback".into())
        .spawn(move || {
            let theme = generate_theme();

            let stream = match OutputStream::try_default() {
                Ok(pair) => Some(pair),
                Err(e) => {
                    tracing::warn!("No audio output for feedback sounds: {}", e);
                    None
                }
            };

            // Exits when all handles are dropped
            while let Ok(cue) = rx.recv() {
                let Some((_stream, handle)) = stream.as_ref() else {
                    tracing::debug!("Discarding sound cue {:?} (no output)", cue);
                    continue;
                };

                let cursor = Cursor::new(theme.data(cue).to_vec());
                let source = match Decoder::new(cursor) {
                    Ok(s) => s.amplify(volume),
                    Err(e) => {
                        tracing::warn!("Failed to decode feedback sound: {}", e);
                        continue;
                    }
                };

                match Sink::try_new(handle) {
                    Ok(sink) => {
                        sink.append(source);
                        sink.detach(); // Let it play in the background
                    }
                    Err(e) => tracing::warn!("Failed to play feedback sound: {}", e),
                }
            }

            tracing::debug!("Feedback playback thread stopped");
        });

    if let Err(e) = spawn_result {
        tracing::warn!("Failed to start feedback thread: {}", e);
        return None;
    }

    Some(FeedbackHandle { tx })
}

// === Sound Generation ===

/// Generate a simple WAV file with a sine wave tone
fn generate_tone_wav(frequency: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    let sample_rate = 44100u32;
    let num_samples = (sample_rate * duration_ms / 1000) as usize;
    let fade_samples = (sample_rate * fade_ms / 1000) as usize;

    let mut samples: Vec<i16> = Vec::with_capacity(num_samples);

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let mut amplitude = (2.0 * std::f32::consts::PI * frequency * t).sin();

        // Fade in/out envelope
        if i < fade_samples {
            amplitude *= i as f32 / fade_samples as f32;
        } else if i >= num_samples - fade_samples {
            amplitude *= (num_samples - i) as f32 / fade_samples as f32;
        }

        samples.push((amplitude * 16000.0) as i16);
    }

    encode_wav(&samples, sample_rate)
}

/// Generate a two-tone sound (rising or falling)
fn generate_two_tone_wav(freq1: f32, freq2: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    let sample_rate = 44100u32;
    let num_samples = (sample_rate * duration_ms / 1000) as usize;
    let fade_samples = (sample_rate * fade_ms / 1000) as usize;
    let half_samples = num_samples / 2;

    let mut samples: Vec<i16> = Vec::with_capacity(num_samples);

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let freq = if i < half_samples { freq1 } else { freq2 };
        let mut amplitude = (2.0 * std::f32::consts::PI * freq * t).sin();

        if i < fade_samples {
            amplitude *= i as f32 / fade_samples as f32;
        } else if i >= num_samples - fade_samples {
            amplitude *= (num_samples - i) as f32 / fade_samples as f32;
        }

        samples.push((amplitude * 16000.0) as i16);
    }

    encode_wav(&samples, sample_rate)
}

/// Encode samples as WAV format
fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut wav = Vec::new();

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    let file_size = (36 + samples.len() * 2) as u32;
    wav.extend_from_slice(&file_size.to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

fn generate_theme() -> SoundTheme {
    SoundTheme {
        // Rising two-tone: 440Hz -> 880Hz (recording begins)
        start: generate_two_tone_wav(440.0, 880.0, 150, 20),
        // Falling two-tone: 880Hz -> 440Hz (completion)
        stop: generate_two_tone_wav(880.0, 440.0, 150, 20),
        // Insistent mid tone, long enough to notice mid-dictation
        warning: generate_two_tone_wav(660.0, 660.0, 300, 30),
        // Soft low click for "nothing heard"
        no_speech: generate_tone_wav(500.0, 80, 10),
        // Low descending warning tone
        error: generate_two_tone_wav(300.0, 200.0, 200, 30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_tone_wav() {
        let wav = generate_tone_wav(440.0, 100, 10);
        assert!(wav.len() > 44); // Larger than header
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_theme_has_all_cues() {
        let theme = generate_theme();
        for cue in [
            SoundCue::RecordingStart,
            SoundCue::RecordingStop,
            SoundCue::Warning,
            SoundCue::NoSpeech,
            SoundCue::Error,
        ] {
            assert!(!theme.data(cue).is_empty());
        }
    }

    #[test]
    fn test_disabled_feedback_yields_no_handle() {
        let config = AudioFeedbackConfig {
            enabled: false,
            volume: 0.7,
        };
        assert!(spawn(&config).is_none());
    }
}
