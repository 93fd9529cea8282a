//! Text output module
//!
//! Provides text output via keyboard simulation or clipboard.
//!
//! Fallback chain for `mode = "type"` and `mode = "auto"`:
//! 1. wtype - Wayland-native, best Unicode/CJK support, no daemon needed
//! 2. ydotool - Works on X11/Wayland/TTY, requires daemon
//! 3. clipboard - Universal fallback via wl-copy

pub mod clipboard;
pub mod wtype;
pub mod ydotool;

use crate::config::{OutputConfig, OutputMode};
use crate::error::OutputError;
use crate::window::WindowContext;
use std::time::{Duration, Instant};

/// Trait for text output implementations
pub trait OutputSink: Send {
    /// Deliver text (type it or copy to clipboard). The window context,
    /// when present, is where focus should be restored before typing.
    fn deliver(&self, text: &str, window: Option<&WindowContext>) -> Result<(), OutputError>;

    /// Check if this output method is available
    fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Cached result of a binary-availability probe.
///
/// `which` hits the filesystem, and delivery may probe several tools per
/// transcription, so results are remembered with a timestamp and
/// re-checked only after the TTL expires.
pub(crate) struct ProbeCache {
    checked_at: Option<Instant>,
    available: bool,
}

impl ProbeCache {
    const TTL: Duration = Duration::from_secs(30);

    pub(crate) fn new() -> Self {
        Self {
            checked_at: None,
            available: false,
        }
    }

    pub(crate) fn check(&mut self, probe: impl FnOnce() -> bool) -> bool {
        let stale = match self.checked_at {
            None => true,
            Some(at) => at.elapsed() >= Self::TTL,
        };
        if stale {
            self.available = probe();
            self.checked_at = Some(Instant::now());
        }
        self.available
    }
}

/// Factory function that returns a fallback chain of output methods
pub fn create_sink_chain(config: &OutputConfig) -> Vec<Box<dyn OutputSink>> {
    let mut chain: Vec<Box<dyn OutputSink>> = Vec::new();

    match config.mode {
        OutputMode::Type | OutputMode::Auto => {
            // Primary: wtype for Wayland (best Unicode/CJK support, no daemon)
            chain.push(Box::new(wtype::WtypeSink::new()));

            // Fallback: ydotool (works on X11/TTY, requires daemon)
            chain.push(Box::new(ydotool::YdotoolSink::new()));

            // Last resort: clipboard. Auto mode always falls back; in
            // explicit type mode the user can disable it.
            if config.mode == OutputMode::Auto || config.fallback_to_clipboard {
                chain.push(Box::new(clipboard::ClipboardSink::new()));
            }
        }
        OutputMode::Clipboard => {
            chain.push(Box::new(clipboard::ClipboardSink::new()));
        }
    }

    chain
}

/// Try each output method in the chain until one succeeds
pub fn deliver_with_fallback(
    chain: &[Box<dyn OutputSink>],
    text: &str,
    window: Option<&WindowContext>,
) -> Result<(), OutputError> {
    for sink in chain {
        if !sink.is_available() {
            tracing::debug!("{} not available, trying next", sink.name());
            continue;
        }

        match sink.deliver(text, window) {
            Ok(()) => {
                tracing::debug!("Text output via {}", sink.name());
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("{} failed: {}, trying next", sink.name(), e);
            }
        }
    }

    Err(OutputError::AllMethodsFailed)
}

/// Describe how the configured mode would resolve right now (for status)
pub fn resolved_mode(config: &OutputConfig) -> String {
    match config.mode {
        OutputMode::Type => "type".to_string(),
        OutputMode::Clipboard => "clipboard".to_string(),
        OutputMode::Auto => {
            let injection_ready =
                wtype::WtypeSink::new().is_available() || ydotool::YdotoolSink::new().is_available();
            if injection_ready {
                "auto (type)".to_string()
            } else {
                "auto (clipboard)".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_probe_cache_caches_within_ttl() {
        let calls = AtomicUsize::new(0);
        let mut cache = ProbeCache::new();

        assert!(cache.check(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        }));
        assert!(cache.check(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            false
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chain_for_clipboard_mode() {
        let config = OutputConfig {
            mode: OutputMode::Clipboard,
            fallback_to_clipboard: true,
            notification: Default::default(),
        };
        let chain = create_sink_chain(&config);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "wl-copy");
    }

    #[test]
    fn test_chain_for_type_mode_without_fallback() {
        let config = OutputConfig {
            mode: OutputMode::Type,
            fallback_to_clipboard: false,
            notification: Default::default(),
        };
        let chain = create_sink_chain(&config);
        let names: Vec<_> = chain.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["wtype", "ydotool"]);
    }

    #[test]
    fn test_auto_mode_always_has_clipboard_fallback() {
        let config = OutputConfig {
            mode: OutputMode::Auto,
            fallback_to_clipboard: false,
            notification: Default::default(),
        };
        let chain = create_sink_chain(&config);
        let names: Vec<_> = chain.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["wtype", "ydotool", "wl-copy"]);
    }
}
