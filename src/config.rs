//! Configuration loading and types for taptype
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/taptype/config.toml)
//! 3. Environment variables (TAPTYPE_*)
//! 4. CLI arguments (highest priority)

use crate::error::TaptypeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Taptype Configuration
#
# Location: ~/.config/taptype/config.toml
# All settings can be overridden via CLI flags

[hotkey]
# Key that controls recording
# Common choices: SCROLLLOCK, PAUSE, RIGHTALT, F13-F24
# Use `evtest` to find key names for your keyboard
key = "SCROLLLOCK"

# Optional modifier keys that must also be held
# Example: modifiers = ["LEFTCTRL", "LEFTALT"]
modifiers = []

# Activation mode: "push_to_talk" or "toggle"
# - push_to_talk: Hold hotkey to record, release to transcribe (default)
# - toggle: Press hotkey once to start recording, press again to stop
# mode = "push_to_talk"

[audio]
# Audio input device ("default" uses system default)
# List devices with: pactl list sources short
device = "default"

# Sample rate in Hz (whisper expects 16000)
sample_rate = 16000

# Maximum recording duration in seconds (safety limit).
# When this is above 30, a warning sound plays 30 seconds before the limit.
max_duration_secs = 60

[audio.feedback]
# Audio feedback sounds (beeps for start/stop/warning/error)
enabled = true

# Volume level (0.0 to 1.0)
volume = 0.7

[engine]
# Transcription backend: "whisper" (in-process) or "whisper_cli" (subprocess)
# backend = "whisper"

# Model to use for transcription
# Options: tiny, tiny.en, base, base.en, small, small.en, medium, medium.en, large-v3, large-v3-turbo
# .en models are English-only but faster and more accurate for English
# Or provide absolute path to a custom .bin model file
model = "base.en"

# Language for transcription
# Use "en" for English, "auto" for auto-detection
language = "en"

# Translate non-English speech to English
translate = false

# Number of CPU threads for inference (omit for auto-detection)
# threads = 4

# Path to the whisper-cli binary (whisper_cli backend only; omit to search PATH)
# cli_path = "/usr/local/bin/whisper-cli"

[output]
# Primary output mode: "type", "clipboard", or "auto"
# - type: Simulates keyboard input at cursor position (requires wtype or ydotool)
# - clipboard: Copies text to clipboard (requires wl-copy)
# - auto: Type when an injection tool is available, clipboard otherwise
mode = "auto"

# Fall back to clipboard if typing fails
fallback_to_clipboard = true

[output.notification]
# Desktop notification with transcribed text after transcription completes
on_transcription = false

# Desktop notification when no speech was detected
on_no_speech = false
"#;

/// Hotkey activation mode
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Hold key to record, release to stop (default)
    #[default]
    PushToTalk,
    /// Press once to start recording, press again to stop
    Toggle,
}

/// Root configuration structure
///
/// Every section and field is optional in the file; anything missing
/// falls back to the built-in default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    /// Examples: "SCROLLLOCK", "RIGHTALT", "PAUSE", "F24"
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Optional modifier keys that must also be held
    /// Examples: ["LEFTCTRL"], ["LEFTALT", "LEFTSHIFT"]
    #[serde(default)]
    pub modifiers: Vec<String>,

    /// Activation mode: push_to_talk (hold to record) or toggle (press to start/stop)
    #[serde(default)]
    pub mode: ActivationMode,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            modifiers: vec![],
            mode: ActivationMode::default(),
        }
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    /// PipeWire/PulseAudio device name, or "default"
    #[serde(default = "default_device")]
    pub device: String,

    /// Sample rate in Hz (whisper expects 16000)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum recording duration in seconds (safety limit)
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u32,

    /// Audio feedback settings
    #[serde(default)]
    pub feedback: AudioFeedbackConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            max_duration_secs: default_max_duration_secs(),
            feedback: AudioFeedbackConfig::default(),
        }
    }
}

impl AudioConfig {
    /// Maximum recording duration as a Duration
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_duration_secs))
    }
}

/// Audio feedback configuration for sound cues
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioFeedbackConfig {
    /// Enable audio feedback sounds
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Volume level (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

impl Default for AudioFeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
        }
    }
}

/// Transcription backend selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineBackend {
    /// In-process whisper.cpp via whisper-rs (default)
    #[default]
    Whisper,
    /// Shell out to a whisper-cli binary
    WhisperCli,
}

/// Speech-to-text engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Which backend performs transcription
    #[serde(default)]
    pub backend: EngineBackend,

    /// Model name: tiny, base, small, medium, large-v3, large-v3-turbo
    /// Can also be an absolute path to a .bin file
    #[serde(default = "default_model")]
    pub model: String,

    /// Language code (en, es, fr, auto, etc.)
    #[serde(default = "default_language")]
    pub language: String,

    /// Translate to English if source language is not English
    #[serde(default)]
    pub translate: bool,

    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,

    /// Explicit whisper-cli binary path (whisper_cli backend only)
    #[serde(default)]
    pub cli_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            model: default_model(),
            language: default_language(),
            translate: false,
            threads: None,
            cli_path: None,
        }
    }
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Notify with transcribed text after transcription completes
    #[serde(default)]
    pub on_transcription: bool,

    /// Notify when a recording produced no recognizable speech
    #[serde(default)]
    pub on_no_speech: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            on_transcription: false,
            on_no_speech: false,
        }
    }
}

/// Text output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Primary output mode
    #[serde(default = "default_output_mode")]
    pub mode: OutputMode,

    /// Fall back to clipboard if typing fails
    #[serde(default = "default_true")]
    pub fallback_to_clipboard: bool,

    /// Notification settings
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: default_output_mode(),
            fallback_to_clipboard: true,
            notification: NotificationConfig::default(),
        }
    }
}

/// Output mode selection
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Simulate keyboard input (requires wtype or ydotool)
    Type,
    /// Copy to clipboard (requires wl-copy)
    Clipboard,
    /// Type when an injection tool is present, clipboard otherwise
    Auto,
}

fn default_hotkey_key() -> String {
    "SCROLLLOCK".to_string()
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_max_duration_secs() -> u32 {
    60
}

fn default_model() -> String {
    "base.en".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_output_mode() -> OutputMode {
    OutputMode::Auto
}

fn default_volume() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            audio: AudioConfig::default(),
            engine: EngineConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "taptype")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "taptype")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (for models)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "taptype")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Get the models directory path
    pub fn models_dir() -> PathBuf {
        Self::data_dir().join("models")
    }

    /// Ensure all required directories exist
    /// Creates: config dir, data dir, and models dir
    pub fn ensure_directories() -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let models_dir = Self::models_dir();
        std::fs::create_dir_all(&models_dir)?;
        tracing::debug!("Ensured models directory exists: {:?}", models_dir);

        Ok(())
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<(), TaptypeError> {
        if self.hotkey.key.trim().is_empty() {
            return Err(TaptypeError::Config("hotkey.key must not be empty".into()));
        }
        if self.audio.sample_rate == 0 {
            return Err(TaptypeError::Config(
                "audio.sample_rate must be greater than zero".into(),
            ));
        }
        if self.audio.max_duration_secs == 0 {
            return Err(TaptypeError::Config(
                "audio.max_duration_secs must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.audio.feedback.volume) {
            return Err(TaptypeError::Config(
                "audio.feedback.volume must be between 0.0 and 1.0".into(),
            ));
        }
        if self.engine.model.trim().is_empty() {
            return Err(TaptypeError::Config("engine.model must not be empty".into()));
        }
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, TaptypeError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TaptypeError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| TaptypeError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(key) = std::env::var("TAPTYPE_HOTKEY") {
        config.hotkey.key = key;
    }
    if let Ok(model) = std::env::var("TAPTYPE_MODEL") {
        config.engine.model = model;
    }
    if let Ok(mode) = std::env::var("TAPTYPE_OUTPUT_MODE") {
        config.output.mode = match mode.to_lowercase().as_str() {
            "clipboard" => OutputMode::Clipboard,
            "type" => OutputMode::Type,
            _ => OutputMode::Auto,
        };
    }

    Ok(config)
}

/// Write the commented default config to the given path
pub fn write_default_config(path: &Path) -> Result<(), TaptypeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| TaptypeError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| TaptypeError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert_eq!(config.hotkey.mode, ActivationMode::PushToTalk);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.max_duration_secs, 60);
        assert!(config.audio.feedback.enabled);
        assert_eq!(config.engine.backend, EngineBackend::Whisper);
        assert_eq!(config.engine.model, "base.en");
        assert_eq!(config.output.mode, OutputMode::Auto);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.hotkey.key, "SCROLLLOCK");
        assert!(config.audio.feedback.enabled);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            [hotkey]
            key = "PAUSE"
            modifiers = ["LEFTCTRL"]
            mode = "toggle"

            [audio]
            device = "default"
            sample_rate = 16000
            max_duration_secs = 30

            [engine]
            backend = "whisper_cli"
            model = "small.en"
            language = "en"

            [output]
            mode = "clipboard"

            [output.notification]
            on_transcription = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.hotkey.key, "PAUSE");
        assert_eq!(config.hotkey.modifiers, vec!["LEFTCTRL"]);
        assert_eq!(config.hotkey.mode, ActivationMode::Toggle);
        assert_eq!(config.audio.max_duration_secs, 30);
        assert_eq!(config.engine.backend, EngineBackend::WhisperCli);
        assert_eq!(config.output.mode, OutputMode::Clipboard);
        assert!(config.output.notification.on_transcription);
        assert!(!config.output.notification.on_no_speech);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("[hotkey]\nkey = \"PAUSE\"\n").unwrap();
        assert_eq!(config.hotkey.key, "PAUSE");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.engine.model, "base.en");
        assert_eq!(config.output.mode, OutputMode::Auto);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = Config::default();
        config.audio.max_duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let mut config = Config::default();
        config.audio.feedback.volume = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_duration_helper() {
        let config = Config::default();
        assert_eq!(config.audio.max_duration(), Duration::from_secs(60));
    }
}
