//! whisper-cli subprocess engine
//!
//! Shells out to a whisper.cpp `whisper-cli` binary instead of linking
//! whisper in-process. Audio goes out as a temp WAV file; the result
//! comes back via whisper-cli's JSON output.

use super::{resolve_model_path, Engine};
use crate::config::EngineConfig;
use crate::error::TranscribeError;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// JSON shape written by `whisper-cli --output-json`
#[derive(Debug, Deserialize)]
struct WhisperCliOutput {
    transcription: Vec<CliSegment>,
}

#[derive(Debug, Deserialize)]
struct CliSegment {
    text: String,
}

/// Subprocess-based whisper engine
pub struct CliEngine {
    cli_path: PathBuf,
    model: String,
    model_path: Option<PathBuf>,
    language: String,
    translate: bool,
    threads: usize,
}

impl CliEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, TranscribeError> {
        let cli_path = resolve_cli_path(config.cli_path.as_deref())?;
        let threads = config.threads.unwrap_or_else(|| num_cpus::get().min(4));

        Ok(Self {
            cli_path,
            model: config.model.clone(),
            model_path: None,
            language: config.language.clone(),
            translate: config.translate,
            threads,
        })
    }

    /// Write samples to a temp WAV file (16-bit PCM, mono)
    fn write_temp_wav(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<tempfile::NamedTempFile, TranscribeError> {
        let temp_file = tempfile::Builder::new()
            .prefix("taptype_audio_")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| {
                TranscribeError::AudioFormat(format!("Failed to create temp file: {}", e))
            })?;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(temp_file.path(), spec)
            .map_err(|e| TranscribeError::AudioFormat(format!("Failed to create WAV: {}", e)))?;

        for &sample in samples {
            let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| TranscribeError::AudioFormat(format!("Failed to write WAV: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| TranscribeError::AudioFormat(format!("Failed to finalize WAV: {}", e)))?;

        Ok(temp_file)
    }
}

impl Engine for CliEngine {
    fn name(&self) -> &'static str {
        "whisper_cli"
    }

    fn is_available(&self) -> bool {
        self.cli_path.exists() && resolve_model_path(&self.model).is_ok()
    }

    fn load_model(&mut self) -> Result<(), TranscribeError> {
        // No in-process model; just verify the file exists up front so
        // startup fails fast instead of the first transcription.
        let path = resolve_model_path(&self.model)?;
        tracing::info!("Using whisper-cli {:?} with model {:?}", self.cli_path, path);
        self.model_path = Some(path);
        Ok(())
    }

    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::AudioFormat(
                "Empty audio buffer".to_string(),
            ));
        }

        let model_path = self
            .model_path
            .as_ref()
            .ok_or_else(|| TranscribeError::InitFailed("Model not loaded".to_string()))?;

        let duration_secs = samples.len() as f32 / sample_rate as f32;
        tracing::debug!(
            "Transcribing {:.2}s of audio ({} samples) via whisper-cli",
            duration_secs,
            samples.len()
        );

        let start = std::time::Instant::now();

        let temp_wav = self.write_temp_wav(samples, sample_rate)?;

        // Temp base path for JSON output (whisper-cli adds .json)
        let temp_json = tempfile::Builder::new()
            .prefix("taptype_out_")
            .suffix("")
            .tempfile()
            .map_err(|e| {
                TranscribeError::InferenceFailed(format!("Failed to create temp file: {}", e))
            })?;

        let output_base = temp_json
            .path()
            .to_str()
            .ok_or_else(|| TranscribeError::InferenceFailed("Invalid temp path".to_string()))?;

        let mut cmd = Command::new(&self.cli_path);
        cmd.arg("--model")
            .arg(model_path)
            .arg("--file")
            .arg(temp_wav.path())
            .arg("--output-json")
            .arg("--output-file")
            .arg(output_base)
            .arg("--threads")
            .arg(self.threads.to_string())
            .arg("--no-prints"); // Suppress progress output

        // Set language (skip if auto-detect)
        if self.language != "auto" {
            cmd.arg("--language").arg(&self.language);
        }

        if self.translate {
            cmd.arg("--translate");
        }

        tracing::debug!("Running whisper-cli: {:?}", cmd);

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                TranscribeError::InferenceFailed(format!("Failed to run whisper-cli: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscribeError::InferenceFailed(format!(
                "whisper-cli failed: {}",
                stderr
            )));
        }

        let json_path = format!("{}.json", output_base);
        let json_content = std::fs::read_to_string(&json_path)
            .map_err(|e| TranscribeError::InferenceFailed(format!("Failed to read output: {}", e)))?;

        let _ = std::fs::remove_file(&json_path);

        let result: WhisperCliOutput = serde_json::from_str(&json_content).map_err(|e| {
            TranscribeError::InferenceFailed(format!("Failed to parse JSON output: {}", e))
        })?;

        let text: String = result
            .transcription
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string();

        tracing::info!(
            "Transcription completed in {:.2}s: {:?}",
            start.elapsed().as_secs_f32(),
            if text.chars().count() > 50 {
                format!("{}...", text.chars().take(50).collect::<String>())
            } else {
                text.clone()
            }
        );

        Ok(text)
    }
}

/// Resolve the whisper-cli binary path
fn resolve_cli_path(configured_path: Option<&str>) -> Result<PathBuf, TranscribeError> {
    // If explicitly configured, use that
    if let Some(path) = configured_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        return Err(TranscribeError::InitFailed(format!(
            "Configured whisper-cli path not found: {}",
            path
        )));
    }

    // Check PATH, then local whisper.cpp build layouts
    let candidates = [
        which::which("whisper-cli").ok(),
        which::which("whisper").ok(),
        Some(PathBuf::from("./whisper-cli")),
        Some(PathBuf::from("./build/bin/whisper-cli")),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(TranscribeError::InitFailed(
        "whisper-cli not found. Install whisper.cpp or set engine.cli_path".to_string(),
    ))
}
