//! Clipboard-based text output
//!
//! Uses wl-copy to copy text to the Wayland clipboard.
//! This is the most reliable fallback as it works on all Wayland compositors.
//!
//! Requires: wl-clipboard package installed

use super::{OutputSink, ProbeCache};
use crate::error::OutputError;
use crate::window::WindowContext;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// Clipboard-based text output
pub struct ClipboardSink {
    probe: Mutex<ProbeCache>,
}

impl ClipboardSink {
    pub fn new() -> Self {
        Self {
            probe: Mutex::new(ProbeCache::new()),
        }
    }
}

impl Default for ClipboardSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for ClipboardSink {
    fn deliver(&self, text: &str, _window: Option<&WindowContext>) -> Result<(), OutputError> {
        if text.is_empty() {
            return Ok(());
        }

        // Spawn wl-copy with stdin pipe
        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::WlCopyNotFound
                } else {
                    OutputError::InjectionFailed(e.to_string())
                }
            })?;

        // Write text to stdin and close it to signal EOF
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| OutputError::InjectionFailed(e.to_string()))?;
        }

        let status = child
            .wait()
            .map_err(|e| OutputError::InjectionFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::InjectionFailed(
                "wl-copy exited with error".to_string(),
            ));
        }

        tracing::info!("Text copied to clipboard ({} chars)", text.chars().count());
        Ok(())
    }

    fn is_available(&self) -> bool {
        let mut probe = match self.probe.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        probe.check(|| which::which("wl-copy").is_ok())
    }

    fn name(&self) -> &'static str {
        "wl-copy"
    }
}
