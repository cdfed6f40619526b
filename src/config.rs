use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub adaptive: AdaptiveConfig,
    pub input: InputConfig,
    pub playback: PlaybackConfig,
}

/// Adaptive quality configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Frame rate floor below which the renderer counts as throttling.
    pub fps_threshold: f64,
    /// Rolling frame-time window capacity.
    pub frame_window: usize,
    /// Emit metrics once every this many frames.
    pub emit_interval: u64,
    /// Target interval between sampled frames (ms).
    pub frame_interval_ms: u64,
    /// Memory ceiling (MB); usage above this counts as throttling.
    pub memory_ceiling_mb: f64,
    /// Sustained-throttling window before a downgrade fires (ms).
    pub degrade_grace_ms: u64,
}

/// Pointer/touch input configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Minimum interval between accepted pointer events (ms).
    pub debounce_time_ms: u64,
    /// Minimum displacement (device pixels) between accepted events.
    pub distance_threshold: f64,
}

/// Streaming playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Microphone input sample rate (Hz).
    pub input_sample_rate: u32,
    /// Playback output sample rate (Hz).
    pub output_sample_rate: u32,
    /// Lead time when the cursor has fallen behind the clock (seconds).
    pub lead_secs: f64,
    /// Samples per microphone frame sent to the transport.
    pub mic_frame_samples: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            fps_threshold: defaults::FPS_THRESHOLD,
            frame_window: defaults::FRAME_WINDOW,
            emit_interval: defaults::METRICS_EMIT_INTERVAL,
            frame_interval_ms: defaults::FRAME_INTERVAL_MS,
            memory_ceiling_mb: defaults::MEMORY_CEILING_MB,
            degrade_grace_ms: defaults::DEGRADE_GRACE_MS,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            debounce_time_ms: defaults::DEBOUNCE_TIME_MS,
            distance_threshold: defaults::DISTANCE_THRESHOLD,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: defaults::INPUT_SAMPLE_RATE,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            lead_secs: defaults::PLAYBACK_LEAD_SECS,
            mic_frame_samples: defaults::MIC_FRAME_SAMPLES,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file is missing
    ///
    /// Invalid TOML is still an error; only a missing file falls back.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LIVELOOP_FPS_THRESHOLD → adaptive.fps_threshold
    /// - LIVELOOP_DEGRADE_GRACE_MS → adaptive.degrade_grace_ms
    /// - LIVELOOP_DEBOUNCE_MS → input.debounce_time_ms
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LIVELOOP_FPS_THRESHOLD")
            && let Ok(parsed) = v.parse::<f64>()
        {
            self.adaptive.fps_threshold = parsed;
        }
        if let Ok(v) = std::env::var("LIVELOOP_DEGRADE_GRACE_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.adaptive.degrade_grace_ms = parsed;
        }
        if let Ok(v) = std::env::var("LIVELOOP_DEBOUNCE_MS")
            && let Ok(parsed) = v.parse::<u64>()
        {
            self.input.debounce_time_ms = parsed;
        }
        self
    }

    /// Basic sanity checks on loaded values.
    fn validate(&self) -> anyhow::Result<()> {
        if self.adaptive.fps_threshold <= 0.0 {
            anyhow::bail!("adaptive.fps_threshold must be positive");
        }
        if self.adaptive.frame_window == 0 {
            anyhow::bail!("adaptive.frame_window must be at least 1");
        }
        if self.playback.input_sample_rate == 0 || self.playback.output_sample_rate == 0 {
            anyhow::bail!("playback sample rates must be positive");
        }
        if self.playback.lead_secs < 0.0 {
            anyhow::bail!("playback.lead_secs must not be negative");
        }
        Ok(())
    }

    /// Default config file location (`~/.config/liveloop/config.toml`).
    #[cfg(feature = "config-paths")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("liveloop").join("config.toml"))
    }

    #[cfg(not(feature = "config-paths"))]
    pub fn default_path() -> Option<PathBuf> {
        None
    }
}
