//! Audio capture module
//!
//! Provides audio recording capabilities using cpal, which works with
//! PipeWire, PulseAudio, and ALSA backends.

pub mod cpal_recorder;
pub mod feedback;

use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::state::AudioBuffer;

/// Trait for audio recorder implementations
///
/// `start` must only return Ok once the capture stream is actually
/// running; the daemon stays Idle when it fails. `stop` always returns
/// the buffer it has (possibly empty) rather than an error, so the
/// hotkey-release path never has to distinguish failure modes.
pub trait Recorder: Send {
    /// Whether an input device is present at all
    fn is_available(&self) -> bool;

    /// Start capturing audio
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop capturing and return the recorded samples (mono, f32,
    /// resampled to the configured rate). Empty when nothing was captured.
    fn stop(&mut self) -> AudioBuffer;
}

/// Factory function to create the audio recorder
pub fn create_recorder(config: &AudioConfig) -> Result<Box<dyn Recorder>, AudioError> {
    Ok(Box::new(cpal_recorder::CpalRecorder::new(config)))
}
