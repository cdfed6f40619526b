//! Default configuration constants for liveloop.
//!
//! Shared constants used across configuration types to ensure consistency
//! and eliminate duplication.

/// Microphone input sample rate in Hz.
///
/// 16kHz mono is the rate the streaming speech service expects for inbound
/// PCM frames.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Playback output sample rate in Hz.
///
/// The streaming speech service delivers synthesized audio at 24kHz mono.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Number of samples captured per microphone frame sent to the transport.
pub const MIC_FRAME_SAMPLES: usize = 4096;

/// MIME type attached to outbound realtime PCM frames.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Frame rate floor below which the renderer counts as throttling.
pub const FPS_THRESHOLD: f64 = 30.0;

/// Capacity of the rolling frame-time window, in samples.
///
/// One second of history at 60 fps. Old samples are evicted first.
pub const FRAME_WINDOW: usize = 60;

/// Metrics are emitted to subscribers once every this many frames.
pub const METRICS_EMIT_INTERVAL: u64 = 60;

/// Target interval between sampled frames for the self-driving monitor loop.
pub const FRAME_INTERVAL_MS: u64 = 16;

/// Memory ceiling in MB; sustained usage above this counts as throttling.
pub const MEMORY_CEILING_MB: f64 = 100.0;

/// How long throttling must persist before a tier downgrade fires.
///
/// 3 seconds debounces transient hitches (asset loads, GC pauses) so a
/// one-time stall does not cost permanent quality.
pub const DEGRADE_GRACE_MS: u64 = 3_000;

/// Minimum interval between accepted pointer events.
///
/// 16ms matches one frame at 60fps; faster input cannot affect the
/// simulation anyway.
pub const DEBOUNCE_TIME_MS: u64 = 16;

/// Minimum pointer displacement (in device pixels) for an event to be
/// accepted once a baseline position exists.
pub const DISTANCE_THRESHOLD: f64 = 10.0;

/// Lead time added when the playback cursor has fallen behind the audio
/// clock, in seconds.
///
/// Scheduling exactly at "now" risks starting in the past once decode
/// latency is accounted for; 100ms of headroom keeps the first chunk of a
/// resumed stream intact.
pub const PLAYBACK_LEAD_SECS: f64 = 0.1;

/// Memory floor in GB below which a device is always low tier.
pub const LOW_MEMORY_GB: f64 = 4.0;

/// Memory in GB required (when known) for the high tier on desktop.
pub const HIGH_MEMORY_GB: f64 = 8.0;

/// Parallelism required for the high tier on desktop-class devices.
pub const HIGH_PARALLELISM_DESKTOP: usize = 8;

/// Parallelism required for the high tier on mobile/tablet devices.
pub const HIGH_PARALLELISM_MOBILE: usize = 6;

/// Parallelism at or below which a device is always low tier.
pub const LOW_PARALLELISM: usize = 2;

/// Parallelism at or below which a device counts as low power.
pub const LOW_POWER_PARALLELISM: usize = 4;

/// Parallelism assumed when probing fails or reports nothing.
pub const FALLBACK_PARALLELISM: usize = 4;
