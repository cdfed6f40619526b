//! Microphone capture over CPAL.
//!
//! Captures mono f32 audio at the session input rate and hands it out in
//! fixed-size frames ready for [`encode_realtime_frame`]. Falls back to the
//! device's native format with software conversion when the preferred
//! config is refused or silently delivers nothing.
//!
//! [`encode_realtime_frame`]: crate::session::pcm::encode_realtime_frame

use crate::config::PlaybackConfig;
use crate::error::{LiveloopError, Result};
use crate::session::live::AudioSource;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probing triggers noisy ALSA/JACK/PipeWire messages on stderr; they
/// are harmless but drown out real output.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` on file descriptor 2. Safe as long as no
/// other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device names that route through the desktop sound server and therefore
/// respect the user's input selection.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// Lists usable input devices, preferred ones first.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| LiveloopError::AudioCapture {
        message: format!("Failed to enumerate input devices: {e}"),
    })?;

    let mut preferred = Vec::new();
    let mut rest = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                preferred.push(name);
            } else {
                rest.push(name);
            }
        }
    }
    preferred.extend(rest);
    Ok(preferred)
}

/// The best default input device, preferring the desktop sound server over
/// raw ALSA devices.
fn best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| LiveloopError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the owning CpalAudioSource,
/// which serializes access; it never crosses threads mid-call.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture at the session input rate, mono f32.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<f32>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
    frame_samples: usize,
}

impl CpalAudioSource {
    /// Opens the named device, or the best default when `device_name` is
    /// `None`.
    pub fn new(device_name: Option<&str>, config: &PlaybackConfig) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            if let Some(name) = device_name {
                let host = cpal::default_host();
                let devices = host
                    .input_devices()
                    .map_err(|e| LiveloopError::AudioCapture {
                        message: format!("Failed to enumerate devices: {e}"),
                    })?;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        return Ok(dev);
                    }
                }
                Err(LiveloopError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                best_default_device()
            }
        })?;

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: config.input_sample_rate,
            frame_samples: config.mic_frame_samples,
        })
    }

    /// Builds a stream at the preferred config (f32, mono, session rate).
    ///
    /// PipeWire and PulseAudio convert transparently; raw ALSA devices that
    /// refuse the config fall through to [`build_stream_native`].
    ///
    /// [`build_stream_native`]: Self::build_stream_native
    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            warn!("audio stream error: {err}");
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Builds a stream at the device's native config with software channel
    /// mixing and resampling down to the session rate.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| LiveloopError::AudioCapture {
                    message: format!("Failed to query default input config: {e}"),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        info!(
            "capturing at native format ({native_channels}ch/{native_rate}Hz/{:?}), converting in software",
            default_config.sample_format(),
        );

        let err_callback = |err| {
            warn!("audio stream error: {err}");
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted =
                            convert_to_mono(data, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| LiveloopError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {e}"),
                }),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let floats: Vec<f32> =
                            data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let converted =
                            convert_to_mono(&floats, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| LiveloopError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {e}"),
                }),
            fmt => Err(LiveloopError::AudioCapture {
                message: format!("Unsupported native sample format: {fmt:?}"),
            }),
        }
    }
}

/// Mixes multi-channel audio to mono and resamples to the target rate with
/// linear interpolation.
fn convert_to_mono(
    samples: &[f32],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let mono: Vec<f32> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if source_rate == target_rate || mono.is_empty() {
        return mono;
    }

    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = (mono.len() as f64 / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = mono[idx];
        let b = mono.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| LiveloopError::AudioCapture {
            message: format!("Failed to start audio stream: {e}"),
        })?;

        // Some PipeWire-ALSA setups accept a non-native config but never
        // fire the data callback; detect that and retry at native format
        std::thread::sleep(std::time::Duration::from_millis(200));
        let stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }
            let native = self.build_stream_native()?;
            native.play().map_err(|e| LiveloopError::AudioCapture {
                message: format!("Failed to start native audio stream: {e}"),
            })?;
            native
        } else {
            stream
        };

        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| LiveloopError::AudioCapture {
                message: "audio buffer lock poisoned".to_string(),
            })?;
        if buffer.len() < self.frame_samples {
            return Ok(Vec::new());
        }
        Ok(buffer.drain(..self.frame_samples).collect())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.0.pause()
        {
            warn!("failed to pause capture stream: {e}");
        }
    }
}
