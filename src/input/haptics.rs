//! Best-effort haptic feedback.
//!
//! Haptics are a fire-and-forget side effect gated by platform support;
//! failures are absorbed and logged, never surfaced to callers.

use crate::error::Result;
use log::debug;

/// Platform haptics backend.
pub trait HapticSink: Send + Sync {
    /// Whether this platform can vibrate at all.
    fn is_supported(&self) -> bool;

    /// Plays a vibration pattern of on-durations in milliseconds.
    fn vibrate(&self, pattern: &[u64]) -> Result<()>;
}

/// Backend for platforms without haptics. Reports unsupported; `vibrate`
/// is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHaptics;

impl HapticSink for NullHaptics {
    fn is_supported(&self) -> bool {
        false
    }

    fn vibrate(&self, _pattern: &[u64]) -> Result<()> {
        Ok(())
    }
}

/// Triggers haptic feedback if supported. Errors are absorbed.
pub fn trigger_haptic(sink: &dyn HapticSink, pattern: &[u64]) {
    if !sink.is_supported() {
        return;
    }
    if let Err(e) = sink.vibrate(pattern) {
        debug!("haptic feedback failed: {e}");
    }
}
