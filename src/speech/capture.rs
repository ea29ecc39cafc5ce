//! Microphone capture via cpal.
//!
//! Captures at the device's native sample rate, downsamples to the
//! configured rate (default 16kHz) mono, and hands back the finished take as
//! a WAV payload ready for the transcription endpoint.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use crate::config::AudioConfig;
use crate::error::{EngineError, Result};

/// Capture lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No take in progress.
    Idle,
    /// Microphone open, samples accumulating.
    Recording,
}

/// A finished microphone take.
#[derive(Debug, Clone)]
pub struct AudioRecording {
    /// 16-bit mono WAV payload.
    pub wav: Vec<u8>,
    /// Sample rate of the payload.
    pub sample_rate: u32,
    /// Wall-clock length of the take.
    pub duration: Duration,
}

/// Push-to-talk microphone seam.
///
/// One take at a time: `start` opens the device, `stop` closes it and
/// returns the accumulated audio.
pub trait Recorder {
    /// Begin a take.
    ///
    /// # Errors
    ///
    /// Fails when a take is already in progress or the device cannot be
    /// opened.
    fn start(&mut self) -> Result<()>;

    /// End the take and return the captured audio.
    ///
    /// # Errors
    ///
    /// Fails when no take is in progress.
    fn stop(&mut self) -> Result<AudioRecording>;

    /// Current capture state.
    fn state(&self) -> CaptureState;
}

/// An open cpal input stream and its accumulating sample buffer.
struct ActiveTake {
    // Held only to keep the device open; dropped on stop.
    _stream: cpal::Stream,
    samples: Arc<Mutex<Vec<f32>>>,
    started_at: Instant,
}

/// [`Recorder`] backed by the system microphone.
pub struct CpalRecorder {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    take: Option<ActiveTake>,
}

impl CpalRecorder {
    /// Open the configured (or default) input device.
    ///
    /// Uses the device's native configuration and downsamples in software.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedDevice`] when no usable input
    /// device exists.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.input_device {
            host.input_devices()
                .map_err(|e| EngineError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    EngineError::UnsupportedDevice(format!("input device '{name}' not found"))
                })?
        } else {
            host.default_input_device().ok_or_else(|| {
                EngineError::UnsupportedDevice("no default input device".into())
            })?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device.default_input_config().map_err(|e| {
            EngineError::UnsupportedDevice(format!("no default input config: {e}"))
        })?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.input_sample_rate,
            take: None,
        })
    }

    /// List available input devices.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Audio`] if devices cannot be enumerated.
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| EngineError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl Recorder for CpalRecorder {
    fn start(&mut self) -> Result<()> {
        if self.take.is_some() {
            return Err(EngineError::Audio("recording already in progress".into()));
        }

        let native_rate = self.stream_config.sample_rate;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let samples: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&samples);

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let resampled = if native_rate != target_rate {
                        downsample(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&resampled);
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(map_build_error)?;

        stream
            .play()
            .map_err(|e| EngineError::Audio(format!("failed to start input stream: {e}")))?;

        debug!(
            "capture started: native {}Hz -> target {}Hz",
            native_rate, target_rate
        );
        self.take = Some(ActiveTake {
            _stream: stream,
            samples,
            started_at: Instant::now(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioRecording> {
        let take = self
            .take
            .take()
            .ok_or_else(|| EngineError::Audio("no recording in progress".into()))?;

        let duration = take.started_at.elapsed();
        drop(take._stream);
        let samples = take
            .samples
            .lock()
            .map_err(|e| EngineError::Audio(format!("capture buffer lock poisoned: {e}")))?
            .clone();

        debug!(samples = samples.len(), ?duration, "capture stopped");
        let wav = encode_wav(&samples, self.target_sample_rate)?;
        Ok(AudioRecording {
            wav,
            sample_rate: self.target_sample_rate,
            duration,
        })
    }

    fn state(&self) -> CaptureState {
        if self.take.is_some() {
            CaptureState::Recording
        } else {
            CaptureState::Idle
        }
    }
}

/// Map cpal stream construction failures onto the engine error taxonomy.
fn map_build_error(err: cpal::BuildStreamError) -> EngineError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            EngineError::UnsupportedDevice("input device disappeared".into())
        }
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("permission") {
                EngineError::PermissionDenied(message)
            } else {
                EngineError::Audio(format!("failed to build input stream: {message}"))
            }
        }
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV payload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut payload = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut payload, spec)
            .map_err(|e| EngineError::Audio(format!("failed to write WAV header: {e}")))?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| EngineError::Audio(format!("failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| EngineError::Audio(format!("failed to finalize WAV: {e}")))?;
    }
    Ok(payload.into_inner())
}

/// Convert interleaved multi-channel audio to mono by averaging channels.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation downsampler.
///
/// Sufficient for speech (48kHz -> 16kHz); speech energy sits below 8kHz so
/// no anti-alias filter is needed.
fn downsample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] as f64 * (1.0 - frac) + samples[idx + 1] as f64 * frac
        } else {
            samples[idx.min(samples.len() - 1)] as f64
        };

        output.push(sample as f32);
    }

    output
}
