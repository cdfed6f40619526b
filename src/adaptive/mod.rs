//! Performance monitoring and automatic quality degradation.
//!
//! The monitor samples frame intervals and fans metrics out over channels;
//! the controller owns the active quality tier and downgrades it after
//! sustained throttling. Downgrades are one-directional — recovery requires
//! an explicit reset.

pub mod controller;
pub mod monitor;

pub use controller::{
    AdaptiveController, ChangeReason, ControllerState, TierChange, spawn_degradation_loop,
};
pub use monitor::{MonitorConfig, PerformanceMetrics, PerformanceMonitor};
