//! Device capability probing and quality tier selection.
//!
//! Probing runs once at startup and produces an immutable
//! [`CapabilityProfile`]; the profile feeds the deterministic tier selector.
//! Probe failures never propagate — they degrade to a conservative default
//! profile so callers always get an answer.

pub mod probe;
pub mod profile;
pub mod tier;

pub use probe::{
    EnvironmentProbe, GraphicsProbe, GraphicsSupport, HostEnvironment, MotionSubscription,
    MotionWatcher, NoGraphics, detect, detect_with,
};
pub use profile::{CapabilityProfile, DeviceClass, select_tier};
pub use tier::QualityTier;
