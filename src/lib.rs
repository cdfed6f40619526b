//! liveloop - Adaptive realtime media pipeline
//!
//! Device capability probing, tiered quality selection with runtime
//! degradation, input gesture debouncing, and a live voice session with
//! ordered message delivery and gapless audio playback.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod adaptive;
pub mod capability;
pub mod config;
pub mod defaults;
pub mod error;
pub mod input;
pub mod render;
pub mod session;

// Capability probing and tier selection
pub use capability::{CapabilityProfile, DeviceClass, QualityTier, detect, select_tier};

// Runtime adaptation
pub use adaptive::{AdaptiveController, ControllerState, PerformanceMetrics, PerformanceMonitor};

// Input gating
pub use input::TouchDebouncer;

// Render strategy selection
pub use render::{RenderStrategy, StrategyRegistry};

// Live session
pub use session::{AudioScheduler, LiveSession, LiveTransport, SessionStatus};

// Error handling
pub use error::{LiveloopError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
