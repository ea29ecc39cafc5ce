//! Speaker playback via cpal.
//!
//! Playback is non-blocking: `play` starts the stream and returns, so the
//! orchestrator can preempt it. Starting a new utterance while one is
//! playing drops the old stream first.

use std::sync::{Arc, Mutex};

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::config::AudioConfig;
use crate::error::{EngineError, Result};

/// Speaker output seam.
pub trait AudioSink {
    /// Begin playing `samples`, preempting any utterance in progress.
    ///
    /// # Errors
    ///
    /// Fails when the output stream cannot be created or started.
    fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Whether an utterance is still playing.
    fn is_active(&self) -> bool;

    /// Stop playback immediately. No-op when idle. Idempotent.
    fn stop(&mut self);
}

/// Progress of the utterance currently on the device.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

struct ActiveUtterance {
    // Held only to keep the device playing; dropped on stop.
    _stream: cpal::Stream,
    buffer: Arc<Mutex<PlaybackBuffer>>,
}

/// [`AudioSink`] backed by the system speakers.
pub struct CpalSink {
    device: cpal::Device,
    current: Option<ActiveUtterance>,
}

impl CpalSink {
    /// Open the configured (or default) output device.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedDevice`] when no usable output
    /// device exists.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| EngineError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    EngineError::UnsupportedDevice(format!("output device '{name}' not found"))
                })?
        } else {
            host.default_output_device().ok_or_else(|| {
                EngineError::UnsupportedDevice("no default output device".into())
            })?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        Ok(Self {
            device,
            current: None,
        })
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Audio`] if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
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

impl AudioSink for CpalSink {
    fn play(&mut self, samples: &[f32], sample_rate: u32) -> Result<()> {
        self.stop();

        let stream_config = StreamConfig {
            channels: 1,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::new(Mutex::new(PlaybackBuffer {
            samples: samples.to_vec(),
            position: 0,
            finished: false,
        }));
        let feed = Arc::clone(&buffer);

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut buf = match feed.lock() {
                        Ok(b) => b,
                        Err(_) => return,
                    };
                    for sample in data.iter_mut() {
                        if buf.position < buf.samples.len() {
                            *sample = buf.samples[buf.position];
                            buf.position += 1;
                        } else {
                            *sample = 0.0;
                            buf.finished = true;
                        }
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                },
                None,
            )
            .map_err(|e| EngineError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| EngineError::Audio(format!("failed to start output stream: {e}")))?;

        self.current = Some(ActiveUtterance {
            _stream: stream,
            buffer,
        });
        Ok(())
    }

    fn is_active(&self) -> bool {
        match &self.current {
            Some(utterance) => utterance
                .buffer
                .lock()
                .map(|buf| !buf.finished)
                .unwrap_or(false),
            None => false,
        }
    }

    fn stop(&mut self) {
        self.current = None;
    }
}
