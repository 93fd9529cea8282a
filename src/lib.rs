//! Taptype: hotkey-driven speech-to-text for Linux desktops
//!
//! Core functionality:
//! - Hotkey detection via evdev (kernel-level, compositor-agnostic)
//! - Audio capture via cpal (PipeWire, PulseAudio, ALSA)
//! - Local transcription with whisper.cpp (in-process or whisper-cli)
//! - Text delivery via a wtype/ydotool/clipboard fallback chain
//! - Process supervision: PID records, backgrounding, stop escalation
//!
//! The daemon holds a two-state machine (idle or recording) driven by
//! hotkey events, with a bounded queue feeding a single transcription
//! worker thread so recording is never blocked by inference.

pub mod audio;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod hotkey;
pub mod notification;
pub mod output;
pub mod state;
pub mod supervisor;
pub mod transcribe;
pub mod window;
pub mod worker;

pub use config::Config;
pub use error::{Result, TaptypeError};
pub use state::DaemonState;
