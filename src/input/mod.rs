//! Pointer/touch input rate limiting and best-effort haptics.

pub mod debounce;
pub mod haptics;

pub use debounce::{TouchDebouncer, Velocity};
pub use haptics::{HapticSink, NullHaptics, trigger_haptic};
