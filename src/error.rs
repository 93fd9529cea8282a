//! Error types for taptype
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the taptype application
#[derive(Error, Debug)]
pub enum TaptypeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio capture error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Daemon supervision error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Hotkey backend not supported on this platform: {0}")]
    NotSupported(String),

    #[error("evdev error: {0}")]
    Evdev(String),
}

/// Errors related to audio capture
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device found. Check your microphone.")]
    NoInputDevice,

    #[error("Audio connection failed: {0}")]
    Connection(String),

    #[error("Audio device not found: '{0}'. List devices with: pactl list sources short")]
    DeviceNotFound(String),

    #[error("Audio stream error: {0}")]
    StreamError(String),
}

/// Errors related to speech-to-text transcription
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Model not found: {0}\n  Download a ggml model into the taptype models directory.")]
    ModelNotFound(String),

    #[error("Whisper initialization failed: {0}")]
    InitFailed(String),

    #[error("Transcription failed: {0}")]
    InferenceFailed(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Errors related to text output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("wtype not found in PATH. Install via your package manager.")]
    WtypeNotFound,

    #[error("ydotool not found in PATH. Install via your package manager.")]
    YdotoolNotFound,

    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("Text injection failed: {0}")]
    InjectionFailed(String),

    #[error("All output methods failed. Ensure wtype, ydotool, or wl-copy is available.")]
    AllMethodsFailed,
}

/// Errors related to managing the daemon process from the CLI
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Daemon already running with PID {0}")]
    AlreadyRunning(i32),

    #[error("PID file error: {0}")]
    PidFile(String),

    #[error("Failed to launch background daemon: {0}")]
    SpawnFailed(String),

    #[error("Permission denied signaling PID {0}. Is the daemon owned by another user?")]
    PermissionDenied(i32),

    #[error("Background mode not supported on this platform")]
    Unsupported,
}

/// Result type alias using TaptypeError
pub type Result<T> = std::result::Result<T, TaptypeError>;

#[cfg(target_os = "linux")]
impl From<evdev::Error> for HotkeyError {
    fn from(e: evdev::Error) -> Self {
        HotkeyError::Evdev(e.to_string())
    }
}
