//! Hotkey detection module
//!
//! On Linux, provides kernel-level key event detection using evdev.
//! This approach works on all Wayland compositors because it
//! operates at the Linux input subsystem level.
//!
//! Requires the user to be in the 'input' group.

#[cfg(target_os = "linux")]
pub mod evdev_listener;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use std::sync::Arc;

/// Callback invoked from the listener thread
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

/// Recording actions the listener can trigger.
///
/// In push-to-talk mode the listener fires `on_activate` on key press
/// and `on_deactivate` on release. In toggle mode each press fires
/// `on_toggle`; the daemon decides whether that means start or stop,
/// so an auto-stopped recording cannot desynchronize the toggle.
pub struct HotkeyCallbacks {
    pub on_activate: HotkeyCallback,
    pub on_deactivate: HotkeyCallback,
    pub on_toggle: HotkeyCallback,
}

/// Trait for hotkey detection implementations
pub trait HotkeyListener: Send {
    /// Start listening for hotkey events, dispatching to the callbacks
    fn start(&mut self, callbacks: HotkeyCallbacks) -> Result<(), HotkeyError>;

    /// Stop listening and join the listener thread
    fn stop(&mut self);
}

/// Factory function to create the appropriate hotkey listener
///
/// On Linux, uses evdev for kernel-level key event detection.
#[cfg(target_os = "linux")]
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(evdev_listener::EvdevListener::new(config)?))
}

#[cfg(not(target_os = "linux"))]
pub fn create_listener(_config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Err(HotkeyError::NotSupported(
        "Built-in hotkey detection requires Linux evdev".to_string(),
    ))
}
