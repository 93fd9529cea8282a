//! Focused-window capture and restore
//!
//! Best-effort: on X11 we shell out to xdotool to remember which window
//! had focus when recording started, so text can land where the user was
//! typing even if focus moved during transcription. On Wayland (or when
//! xdotool is missing) every call degrades to None and output goes to
//! whatever window is focused at delivery time.

use std::process::Command;

/// Identity of the window that was focused when recording began
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowContext {
    /// X11 window id as printed by xdotool
    pub id: String,
    /// Window title, for logging only
    pub title: String,
}

/// Capture the currently focused window, if the desktop lets us
pub fn active_window() -> Option<WindowContext> {
    let id = run_xdotool(&["getactivewindow"])?;
    let title = run_xdotool(&["getwindowname", &id]).unwrap_or_default();

    tracing::debug!("Captured focused window {} ({:?})", id, title);
    Some(WindowContext { id, title })
}

/// Re-focus the given window. Returns false if focus could not be restored.
pub fn restore_focus(window: &WindowContext) -> bool {
    match Command::new("xdotool")
        .args(["windowactivate", "--sync", &window.id])
        .output()
    {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            tracing::debug!(
                "xdotool windowactivate failed for {}: {}",
                window.id,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            tracing::debug!("Failed to run xdotool: {}", e);
            false
        }
    }
}

fn run_xdotool(args: &[&str]) -> Option<String> {
    let output = Command::new("xdotool").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
