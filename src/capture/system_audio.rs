//! System audio capture via loopback
//!
//! Captures the audio being played to the default output device and
//! exposes it as an `AudioSource` of 16-bit PCM. The cpal stream is
//! not `Send`, so it lives on its own thread; samples cross into the
//! pipeline through a bounded ring buffer.

use crate::encoder::traits::AudioSource;
use crate::utils::error::{RecordingError, RecordingResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Get the default output device for loopback capture
fn get_default_output_device() -> Option<Device> {
    let host = cpal::default_host();
    host.default_output_device()
}

/// Check if system audio capture is available on this machine.
pub fn is_available() -> bool {
    get_default_output_device().is_some()
}

struct RingBuffer {
    data: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

/// Loopback capture of the default output device.
pub struct SystemAudioSource {
    ring: Arc<RingBuffer>,
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
    sample_rate: u32,
    channels: u16,
}

impl SystemAudioSource {
    /// Open the default output device in loopback mode and start the
    /// capture stream.
    pub fn open() -> RecordingResult<Self> {
        let device = get_default_output_device().ok_or_else(|| {
            RecordingError::DeviceNotFound("No default output device".to_string())
        })?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let config = device.default_output_config().map_err(|e| {
            RecordingError::Configuration(format!("Failed to get audio config: {}", e))
        })?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        // Cap buffered PCM at one second; older data is dropped first.
        let max_buffered = sample_rate as usize * channels as usize * 2;

        let ring = Arc::new(RingBuffer {
            data: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        });
        let running = Arc::new(AtomicBool::new(true));

        // The stream has to be built and kept alive on its own thread.
        let thread = {
            let ring = ring.clone();
            let running = running.clone();
            std::thread::spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_output_device() {
                    Some(d) => d,
                    None => {
                        tracing::error!("Failed to get default output device");
                        return;
                    }
                };

                let stream_config = StreamConfig {
                    channels,
                    sample_rate: cpal::SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream = {
                    let ring = ring.clone();
                    device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let mut buf = ring.data.lock();
                            for &sample in data {
                                let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                                buf.extend(clamped.to_le_bytes());
                            }
                            while buf.len() > max_buffered {
                                buf.pop_front();
                            }
                            drop(buf);
                            ring.ready.notify_one();
                        },
                        |err| tracing::error!("System audio stream error: {}", err),
                        None,
                    )
                };

                let stream = match stream {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!("Failed to build loopback stream: {}", e);
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    tracing::error!("Failed to start audio stream: {}", e);
                    return;
                }

                tracing::info!("System audio loopback stream started");
                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(100));
                }
                tracing::info!("System audio stream stopped");
            })
        };

        tracing::info!(
            "System audio source opened: {} ({}Hz, {}ch)",
            device_name,
            sample_rate,
            channels
        );

        Ok(Self {
            ring,
            running,
            thread: Some(thread),
            sample_rate,
            channels,
        })
    }
}

impl AudioSource for SystemAudioSource {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> RecordingResult<usize> {
        let mut data = self.ring.data.lock();
        if data.is_empty() {
            let _ = self.ring.ready.wait_for(&mut data, timeout);
        }

        let n = buf.len().min(data.len());
        for byte in buf.iter_mut().take(n) {
            // Non-empty up to n by construction.
            *byte = data.pop_front().unwrap_or(0);
        }
        Ok(n)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.ring.data.lock().clear();
        tracing::debug!("System audio source closed");
    }
}

impl Drop for SystemAudioSource {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.close();
        }
    }
}
