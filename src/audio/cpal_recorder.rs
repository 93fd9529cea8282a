//! cpal-based audio recorder
//!
//! Uses the cpal crate for cross-platform audio input.
//! Works with PipeWire, PulseAudio, and ALSA backends.
//!
//! Note: cpal::Stream is not Send, so the stream lives on a dedicated
//! capture thread and the recorder talks to it via channels. `start`
//! blocks until the thread confirms the stream is playing, so the
//! daemon only enters Recording when capture really began.

use super::Recorder;
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::state::AudioBuffer;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// How long to wait for the capture thread to confirm startup or hand
/// back samples before giving up on it.
const THREAD_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Commands sent to the audio capture thread
enum CaptureCommand {
    Stop(mpsc::Sender<Vec<f32>>),
}

/// cpal-based recorder implementation
pub struct CpalRecorder {
    config: AudioConfig,
    /// Command sender to the capture thread (Some while recording)
    cmd_tx: Option<mpsc::Sender<CaptureCommand>>,
    /// Handle to the capture thread
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl CpalRecorder {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            config: config.clone(),
            cmd_tx: None,
            thread_handle: None,
        }
    }
}

/// Find an audio input device by name with flexible matching.
///
/// Matching strategy (in order): exact, case-insensitive exact, then
/// case-insensitive substring. This lets users give either full cpal
/// device names or PipeWire/PulseAudio short names.
fn find_audio_device(host: &cpal::Host, device_name: &str) -> Result<cpal::Device, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| AudioError::Connection(e.to_string()))?
        .collect();

    let search_lower = device_name.to_lowercase();

    let matched_name = devices
        .iter()
        .filter_map(|d| d.name().ok())
        .find(|name| name == device_name)
        .or_else(|| {
            devices
                .iter()
                .filter_map(|d| d.name().ok())
                .find(|name| name.to_lowercase() == search_lower)
        })
        .or_else(|| {
            devices
                .iter()
                .filter_map(|d| d.name().ok())
                .find(|name| name.to_lowercase().contains(&search_lower))
        });

    match matched_name {
        Some(name) => {
            tracing::debug!("Found audio device: {} (searched for: {})", name, device_name);
            devices
                .into_iter()
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(device_name.to_string()))
        }
        None => Err(AudioError::DeviceNotFound(device_name.to_string())),
    }
}

impl Recorder for CpalRecorder {
    fn is_available(&self) -> bool {
        use cpal::traits::HostTrait;
        cpal::default_host().default_input_device().is_some()
    }

    fn start(&mut self) -> Result<(), AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        if self.cmd_tx.is_some() {
            tracing::debug!("Recorder already started");
            return Ok(());
        }

        let host = cpal::default_host();

        let device = if self.config.device == "default" {
            host.default_input_device()
                .ok_or(AudioError::NoInputDevice)?
        } else {
            find_audio_device(&host, &self.config.device)?
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| AudioError::Connection(e.to_string()))?;

        let source_sample_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels() as usize;
        let target_sample_rate = self.config.sample_rate;
        let sample_format = supported_config.sample_format();

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}",
            source_sample_rate,
            source_channels,
            sample_format
        );

        let (cmd_tx, cmd_rx) = mpsc::channel::<CaptureCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

        let samples = Arc::new(Mutex::new(Vec::<f32>::new()));
        let samples_clone = samples.clone();

        let thread_handle = thread::Builder::new()
            .name("taptype-capture".into())
            .spawn(move || {
                let stream_config = cpal::StreamConfig {
                    channels: supported_config.channels(),
                    sample_rate: supported_config.sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                };

                let err_fn = |err| tracing::error!("Audio stream error: {}", err);

                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => build_stream::<f32>(
                        &device,
                        &stream_config,
                        samples_clone.clone(),
                        source_channels,
                        target_sample_rate,
                        err_fn,
                    ),
                    cpal::SampleFormat::I16 => build_stream::<i16>(
                        &device,
                        &stream_config,
                        samples_clone.clone(),
                        source_channels,
                        target_sample_rate,
                        err_fn,
                    ),
                    cpal::SampleFormat::U16 => build_stream::<u16>(
                        &device,
                        &stream_config,
                        samples_clone.clone(),
                        source_channels,
                        target_sample_rate,
                        err_fn,
                    ),
                    format => Err(AudioError::StreamError(format!(
                        "Unsupported sample format: {:?}",
                        format
                    ))),
                };

                let stream = match stream_result {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok(()));
                tracing::debug!("Audio capture thread started");

                // Wait for stop command
                if let Ok(CaptureCommand::Stop(response_tx)) = cmd_rx.recv() {
                    drop(stream);

                    let collected = match samples_clone.lock() {
                        Ok(guard) => guard.clone(),
                        Err(_) => Vec::new(),
                    };
                    let _ = response_tx.send(collected);
                }

                tracing::debug!("Audio capture thread stopped");
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        // Wait for the stream to come up before reporting success
        match ready_rx.recv_timeout(THREAD_REPLY_TIMEOUT) {
            Ok(Ok(())) => {
                self.cmd_tx = Some(cmd_tx);
                self.thread_handle = Some(thread_handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                drop(cmd_tx);
                let _ = thread_handle.join();
                Err(AudioError::StreamError(
                    "Timed out waiting for audio stream to start".to_string(),
                ))
            }
        }
    }

    fn stop(&mut self) -> AudioBuffer {
        // Samples are already mono and resampled by the stream callback
        let samples = if let Some(cmd_tx) = self.cmd_tx.take() {
            let (response_tx, response_rx) = mpsc::channel();

            if cmd_tx.send(CaptureCommand::Stop(response_tx)).is_ok() {
                match response_rx.recv_timeout(THREAD_REPLY_TIMEOUT) {
                    Ok(samples) => samples,
                    Err(_) => {
                        tracing::warn!("Capture thread did not hand back samples in time");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        let duration_secs = samples.len() as f32 / self.config.sample_rate as f32;
        tracing::debug!(
            "Audio capture stopped: {} samples ({:.2}s)",
            samples.len(),
            duration_secs
        );

        samples
    }
}

/// Build an input stream for a specific sample type
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    source_channels: usize,
    target_rate: u32,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    use cpal::traits::DeviceTrait;

    let source_rate = config.sample_rate.0;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Convert to f32 and mix to mono
                let mono_f32: Vec<f32> = data
                    .chunks(source_channels)
                    .map(|frame| {
                        let sum: f32 = frame
                            .iter()
                            .map(|&s| <f32 as cpal::FromSample<T>>::from_sample_(s))
                            .sum();
                        sum / source_channels as f32
                    })
                    .collect();

                // Resample if needed
                let resampled = if source_rate != target_rate {
                    resample(&mono_f32, source_rate, target_rate)
                } else {
                    mono_f32
                };

                if let Ok(mut guard) = samples.lock() {
                    guard.extend_from_slice(&resampled);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok(stream)
}

/// Linear interpolation resampling
/// For better quality, consider using the `rubato` crate
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else {
            samples.get(idx).copied().unwrap_or(0.0)
        };

        output.push(sample);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![1.0, 2.0, 3.0, 4.0];
        let result = resample(&samples, 16000, 16000);
        assert_eq!(result, samples);
    }

    #[test]
    fn test_resample_downsample() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let result = resample(&samples, 48000, 16000);
        // 48000 -> 16000 is 3:1 ratio, so 8 samples -> ~3 samples
        assert!(result.len() >= 2 && result.len() <= 4);
    }

    #[test]
    fn test_resample_upsample() {
        let samples = vec![1.0, 2.0];
        let result = resample(&samples, 8000, 16000);
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_resample_empty() {
        let samples: Vec<f32> = vec![];
        let result = resample(&samples, 48000, 16000);
        assert!(result.is_empty());
    }

    #[test]
    fn test_stop_without_start_returns_empty() {
        let mut recorder = CpalRecorder::new(&crate::config::Config::default().audio);
        assert!(recorder.stop().is_empty());
    }
}
