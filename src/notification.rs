//! Status observation and desktop notifications
//!
//! The daemon reports lifecycle events through the [`StatusObserver`]
//! trait; the daemon never depends on an observer being present. The
//! shipped implementation sends desktop notifications via notify-send
//! (libnotify). Notifications are best-effort: failures are logged at
//! debug level and never propagate.

use std::process::{Command, Stdio};

use crate::config::NotificationConfig;

/// Receives daemon lifecycle events. All methods default to no-ops so
/// implementors only override what they care about.
pub trait StatusObserver: Send + Sync {
    fn on_recording_start(&self) {}
    fn on_recording_stop(&self) {}
    fn on_transcription_complete(&self, _text: &str) {}
    fn on_no_speech(&self) {}
}

/// Desktop-notification observer backed by notify-send
pub struct DesktopNotifier {
    config: NotificationConfig,
}

impl DesktopNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }
}

impl StatusObserver for DesktopNotifier {
    fn on_transcription_complete(&self, text: &str) {
        if !self.config.on_transcription {
            return;
        }
        let preview: String = if text.chars().count() > 120 {
            format!("{}...", text.chars().take(120).collect::<String>())
        } else {
            text.to_string()
        };
        send("Taptype", &preview);
    }

    fn on_no_speech(&self) {
        if self.config.on_no_speech {
            send("Taptype", "No speech detected");
        }
    }
}

/// Send a desktop notification with the given title and body.
///
/// Failures are logged but never propagate (notifications are best-effort).
pub fn send(title: &str, body: &str) {
    let result = Command::new("notify-send")
        .args(["--app-name=Taptype", "--expire-time=2000", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}
