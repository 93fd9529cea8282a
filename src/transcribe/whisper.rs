//! Whisper-based speech-to-text transcription
//!
//! Uses whisper.cpp via the whisper-rs crate for fast, local transcription.

use super::{resolve_model_path, Engine};
use crate::config::EngineConfig;
use crate::error::TranscribeError;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// In-process whisper.cpp engine
pub struct WhisperEngine {
    /// Whisper context (holds the model once loaded)
    ctx: Option<WhisperContext>,
    /// Model name or path from config
    model: String,
    /// Language for transcription
    language: String,
    /// Whether to translate to English
    translate: bool,
    /// Number of threads to use
    threads: usize,
}

impl WhisperEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, TranscribeError> {
        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Self {
            ctx: None,
            model: config.model.clone(),
            language: config.language.clone(),
            translate: config.translate,
            threads,
        })
    }
}

impl Engine for WhisperEngine {
    fn name(&self) -> &'static str {
        "whisper"
    }

    fn is_available(&self) -> bool {
        resolve_model_path(&self.model).is_ok()
    }

    fn load_model(&mut self) -> Result<(), TranscribeError> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let model_path = resolve_model_path(&self.model)?;

        tracing::info!("Loading whisper model from {:?}", model_path);
        let start = std::time::Instant::now();

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| TranscribeError::ModelNotFound("Invalid path".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| TranscribeError::InitFailed(e.to_string()))?;

        tracing::info!("Model loaded in {:.2}s", start.elapsed().as_secs_f32());

        self.ctx = Some(ctx);
        Ok(())
    }

    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::AudioFormat(
                "Empty audio buffer".to_string(),
            ));
        }

        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| TranscribeError::InitFailed("Model not loaded".to_string()))?;

        let duration_secs = samples.len() as f32 / sample_rate as f32;
        tracing::debug!(
            "Transcribing {:.2}s of audio ({} samples)",
            duration_secs,
            samples.len()
        );

        let start = std::time::Instant::now();

        // Create state for this transcription
        let mut state = ctx
            .create_state()
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        // Configure parameters
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.language));
        }

        params.set_translate(self.translate);
        params.set_n_threads(self.threads as i32);

        // Suppress console output from whisper.cpp
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        // Skip blank/non-speech tokens
        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        // For short recordings, use single segment mode
        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }

        // Run inference
        state
            .full(params, samples)
            .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?;

        // Collect all segments using iterator API
        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(
                segment
                    .to_str()
                    .map_err(|e| TranscribeError::InferenceFailed(e.to_string()))?,
            );
        }

        let result = text.trim().to_string();

        tracing::info!(
            "Transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            if result.chars().count() > 50 {
                format!("{}...", result.chars().take(50).collect::<String>())
            } else {
                result.clone()
            }
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcribe_without_load_fails() {
        let engine = WhisperEngine::new(&crate::config::Config::default().engine).unwrap();
        let samples = vec![0.0f32; 16000];
        assert!(engine.transcribe(&samples, 16000).is_err());
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let engine = WhisperEngine::new(&crate::config::Config::default().engine).unwrap();
        assert!(engine.transcribe(&[], 16000).is_err());
    }
}
