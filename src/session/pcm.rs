//! PCM transport codec.
//!
//! Outbound microphone audio travels as base64-encoded 16-bit little-endian
//! PCM at 16kHz mono; inbound synthesized audio arrives the same way at
//! 24kHz mono and is decoded into per-channel f32 buffers for playback.

use crate::defaults;
use crate::error::{LiveloopError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

/// One outbound realtime PCM frame, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeBlob {
    /// Base64-encoded 16-bit little-endian PCM.
    pub data: String,
    pub mime_type: String,
}

/// Decoded audio ready for scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    /// De-interleaved samples, one `Vec<f32>` per channel.
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Frames per channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// First channel, the only one for mono streams.
    pub fn mono(&self) -> &[f32] {
        self.channels.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encodes captured f32 samples as an outbound realtime frame.
pub fn encode_realtime_frame(samples: &[f32]) -> RealtimeBlob {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    RealtimeBlob {
        data: BASE64_STANDARD.encode(&bytes),
        mime_type: defaults::INPUT_MIME_TYPE.to_string(),
    }
}

/// Decodes a base64 payload into raw PCM bytes.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(data)
        .map_err(|e| LiveloopError::AudioDecode {
            message: format!("invalid base64: {e}"),
        })
}

/// Decodes raw 16-bit little-endian PCM bytes into per-channel f32 buffers.
pub fn decode_audio_data(bytes: &[u8], sample_rate: u32, num_channels: u16) -> Result<AudioBuffer> {
    if num_channels == 0 {
        return Err(LiveloopError::AudioDecode {
            message: "zero channels".to_string(),
        });
    }
    if bytes.len() % 2 != 0 {
        return Err(LiveloopError::AudioDecode {
            message: format!("odd byte length {}", bytes.len()),
        });
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let num_channels = num_channels as usize;
    if samples.len() % num_channels != 0 {
        return Err(LiveloopError::AudioDecode {
            message: format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                num_channels
            ),
        });
    }

    let frame_count = samples.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(frame_count); num_channels];
    for (i, &sample) in samples.iter().enumerate() {
        channels[i % num_channels].push(i16_to_f32(sample));
    }

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}

/// Decodes an inbound base64 audio chunk in one step.
pub fn decode_base64_audio(data: &str, sample_rate: u32, num_channels: u16) -> Result<AudioBuffer> {
    decode_audio_data(&decode_base64(data)?, sample_rate, num_channels)
}
