//! wtype-based text output
//!
//! Uses wtype to simulate keyboard input on Wayland. This is the preferred
//! method on Wayland because:
//! - No daemon required (unlike ydotool)
//! - Better Unicode/CJK support
//!
//! Requires:
//! - wtype installed
//! - Running on Wayland (WAYLAND_DISPLAY set)

use super::{OutputSink, ProbeCache};
use crate::error::OutputError;
use crate::window::{self, WindowContext};
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// wtype-based text output
pub struct WtypeSink {
    probe: Mutex<ProbeCache>,
}

impl WtypeSink {
    pub fn new() -> Self {
        Self {
            probe: Mutex::new(ProbeCache::new()),
        }
    }
}

impl Default for WtypeSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for WtypeSink {
    fn deliver(&self, text: &str, window: Option<&WindowContext>) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        if let Some(win) = window {
            if !window::restore_focus(win) {
                tracing::debug!("Could not restore focus to {:?}, typing anyway", win.title);
            }
        }

        let output = Command::new("wtype")
            .arg("--")
            .arg(text)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::WtypeNotFound
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OutputError::InjectionFailed(format!(
                "wtype exited with error: {}",
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
            // wtype only works under Wayland
            std::env::var("WAYLAND_DISPLAY").is_ok() && which::which("wtype").is_ok()
        })
    }

    fn name(&self) -> &'static str {
        "wtype"
    }
}
