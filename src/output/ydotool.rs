//! ydotool-based text output
//!
//! Uses ydotool to simulate keyboard input. Works on X11, Wayland, and
//! even TTYs, but needs the ydotoold daemon running.

use super::{OutputSink, ProbeCache};
use crate::error::OutputError;
use crate::window::{self, WindowContext};
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// ydotool-based text output
pub struct YdotoolSink {
    probe: Mutex<ProbeCache>,
}

impl YdotoolSink {
    pub fn new() -> Self {
        Self {
            probe: Mutex::new(ProbeCache::new()),
        }
    }
}

impl Default for YdotoolSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for YdotoolSink {
    fn deliver(&self, text: &str, window: Option<&WindowContext>) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        if let Some(win) = window {
            if !window::restore_focus(win) {
                tracing::debug!("Could not restore focus to {:?}, typing anyway", win.title);
            }
        }

        let mut cmd = Command::new("ydotool");
        cmd.arg("type");

        // The -- ensures text starting with - isn't treated as an option
        cmd.arg("--").arg(text);

        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::YdotoolNotFound
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OutputError::InjectionFailed(format!(
                "ydotool exited with error: {}",
                stderr.trim()
            )));
        }

        Ok(())
    }

    fn is_available(&self) -> bool {
        let mut probe = match self.probe.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        probe.check(|| {
            if which::which("ydotool").is_err() {
                return false;
            }

            // Check the daemon is up by typing an empty string
            Command::new("ydotool")
                .args(["type", ""])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }

    fn name(&self) -> &'static str {
        "ydotool"
    }
}
