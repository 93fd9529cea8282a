//! Daemon state machine
//!
//! The daemon is a two-state machine: Idle → Recording → Idle.
//! Transcription happens off the state machine, on the worker thread,
//! so a finished recording never blocks the next hotkey press.

use std::time::Instant;

use crate::window::WindowContext;

/// Audio samples collected during recording (f32, mono)
pub type AudioBuffer = Vec<f32>;

/// Coarse daemon state, guarded by the controller mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Waiting for a hotkey press
    Idle,
    /// Hotkey active, capturing audio
    Recording,
}

/// Per-recording bookkeeping, created on each Idle → Recording transition
#[derive(Debug)]
pub struct RecordingSession {
    /// When recording started (monotonic)
    pub started_at: Instant,
    /// Window that had focus when recording began, if we could tell
    pub window: Option<WindowContext>,
    /// Whether the approaching-limit warning already fired for this session
    pub warned: bool,
}

impl RecordingSession {
    pub fn begin(window: Option<WindowContext>) -> Self {
        Self {
            started_at: Instant::now(),
            window,
            warned: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_not_warned() {
        let session = RecordingSession::begin(None);
        assert!(!session.warned);
        assert!(session.window.is_none());
    }
}
