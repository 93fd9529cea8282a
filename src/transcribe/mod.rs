//! Speech-to-text transcription module
//!
//! Provides transcription via:
//! - Local whisper.cpp inference (whisper-rs crate)
//! - A whisper-cli subprocess, for setups where linking whisper.cpp
//!   in-process is undesirable

pub mod cli;
pub mod whisper;

use crate::config::{EngineBackend, EngineConfig};
use crate::error::TranscribeError;
use std::path::PathBuf;

/// Trait for speech-to-text implementations
///
/// Engines are constructed cheaply; the expensive model load happens in
/// `load_model` so the daemon can fail fast at startup and `status` can
/// check availability without paying the load cost.
pub trait Engine: Send {
    /// Backend name, for status output
    fn name(&self) -> &'static str;

    /// Whether the engine could run right now (model file present, binary on PATH)
    fn is_available(&self) -> bool;

    /// Load the model. Must be called before `transcribe`.
    fn load_model(&mut self) -> Result<(), TranscribeError>;

    /// Transcribe audio samples to text
    /// Input: f32 samples, mono, at the given sample rate
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String, TranscribeError>;
}

/// Factory function to create the engine for the configured backend
pub fn create_engine(config: &EngineConfig) -> Result<Box<dyn Engine>, TranscribeError> {
    tracing::info!(
        "Creating engine: backend={:?}, model={}",
        config.backend,
        config.model
    );

    match config.backend {
        EngineBackend::Whisper => Ok(Box::new(whisper::WhisperEngine::new(config)?)),
        EngineBackend::WhisperCli => Ok(Box::new(cli::CliEngine::new(config)?)),
    }
}

/// Resolve a model name or path to an on-disk ggml model file
pub fn resolve_model_path(model: &str) -> Result<PathBuf, TranscribeError> {
    // If it's already an absolute path, use it directly
    let path = PathBuf::from(model);
    if path.is_absolute() && path.exists() {
        return Ok(path);
    }

    let model_filename = model_filename(model)?;

    // Look in the data directory
    let models_dir = crate::config::Config::models_dir();
    let model_path = models_dir.join(model_filename);

    if model_path.exists() {
        return Ok(model_path);
    }

    // Also check current directory
    let local_path = PathBuf::from(model_filename);
    if local_path.exists() {
        return Ok(local_path);
    }

    Err(TranscribeError::ModelNotFound(format!(
        "{} (looked in {:?})",
        model, models_dir
    )))
}

/// Map model names to ggml file names
fn model_filename(model: &str) -> Result<&str, TranscribeError> {
    let filename = match model {
        "tiny" => "ggml-tiny.bin",
        "tiny.en" => "ggml-tiny.en.bin",
        "base" => "ggml-base.bin",
        "base.en" => "ggml-base.en.bin",
        "small" => "ggml-small.bin",
        "small.en" => "ggml-small.en.bin",
        "medium" => "ggml-medium.bin",
        "medium.en" => "ggml-medium.en.bin",
        "large" | "large-v1" => "ggml-large-v1.bin",
        "large-v2" => "ggml-large-v2.bin",
        "large-v3" => "ggml-large-v3.bin",
        "large-v3-turbo" => "ggml-large-v3-turbo.bin",
        // If it looks like a filename, use it as-is
        other if other.ends_with(".bin") => other,
        other => {
            return Err(TranscribeError::ModelNotFound(format!(
                "Unknown model: '{}'. Valid models: tiny, base, small, medium, large-v3, large-v3-turbo",
                other
            )));
        }
    };
    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_filename_known_names() {
        assert_eq!(model_filename("base.en").unwrap(), "ggml-base.en.bin");
        assert_eq!(
            model_filename("large-v3-turbo").unwrap(),
            "ggml-large-v3-turbo.bin"
        );
        assert_eq!(model_filename("custom-model.bin").unwrap(), "custom-model.bin");
    }

    #[test]
    fn test_model_filename_unknown_name() {
        assert!(model_filename("gigantic").is_err());
    }
}
