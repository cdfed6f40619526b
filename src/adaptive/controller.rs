//! Quality tier ownership and automatic degradation policy.

use crate::adaptive::monitor::{PerformanceMetrics, PerformanceMonitor};
use crate::capability::{CapabilityProfile, QualityTier, select_tier};
use crate::config::AdaptiveConfig;
use log::warn;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Uninitialized,
    Active(QualityTier),
    /// Unrecoverable rendering-context failure; externally reported as
    /// `Low`/fallback, the failed tier is not re-attempted this session.
    Errored,
}

/// Why a tier notification fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Initial,
    Forced,
    Degraded,
    Errored,
    Reset,
}

/// Payload delivered to the tier-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierChange {
    pub tier: QualityTier,
    pub reason: ChangeReason,
}

/// Owns the active quality tier.
///
/// The tier is a single-writer value: initial selection, sustained-throttling
/// downgrades, and explicit overrides all go through this controller.
/// Automatic transitions only move downward; `reset` is the only way back up.
pub struct AdaptiveController {
    config: AdaptiveConfig,
    profile: CapabilityProfile,
    state: ControllerState,
    forced: bool,
    reduced_motion: bool,
    throttle_since: Option<Instant>,
    on_change: Option<Box<dyn Fn(TierChange) + Send>>,
}

impl AdaptiveController {
    pub fn new(profile: CapabilityProfile, config: AdaptiveConfig) -> Self {
        let reduced_motion = profile.prefers_reduced_motion;
        Self {
            config,
            profile,
            state: ControllerState::Uninitialized,
            forced: false,
            reduced_motion,
            throttle_since: None,
            on_change: None,
        }
    }

    /// Registers the transition notification. Every state transition invokes
    /// it with the new tier.
    pub fn set_on_change(&mut self, on_change: Box<dyn Fn(TierChange) + Send>) {
        self.on_change = on_change.into();
    }

    /// First start: selects the tier from the stored profile, or pins the
    /// forced tier when one is supplied. A forced tier short-circuits the
    /// automatic pipeline entirely — monitoring must not be started.
    pub fn start(&mut self, force: Option<QualityTier>) -> QualityTier {
        match self.state {
            ControllerState::Active(tier) => return tier,
            // An errored controller stays on the floor until an explicit
            // reset; start() must not re-run selection past the failure
            ControllerState::Errored => return self.effective_tier(),
            ControllerState::Uninitialized => {}
        }
        let (tier, reason) = match force {
            Some(tier) => {
                self.forced = true;
                (tier, ChangeReason::Forced)
            }
            None => (select_tier(&self.profile), ChangeReason::Initial),
        };
        self.transition(ControllerState::Active(tier), tier, reason);
        tier
    }

    /// Whether the degradation loop should run at all.
    ///
    /// Forced tiers are pinned, the floor tier cannot degrade further, and
    /// an errored controller never retries.
    pub fn monitoring_enabled(&self) -> bool {
        !self.forced
            && matches!(self.state, ControllerState::Active(tier) if !tier.is_floor())
    }

    /// Feeds one metrics report into the degradation policy.
    ///
    /// Throttling must persist for the full grace window before a downgrade
    /// fires; recovery inside the window cancels the pending downgrade, so a
    /// transient hitch (one-time asset load) costs nothing. Returns the new
    /// tier when a downgrade fired.
    pub fn handle_metrics(
        &mut self,
        metrics: &PerformanceMetrics,
        now: Instant,
    ) -> Option<QualityTier> {
        let ControllerState::Active(tier) = self.state else {
            return None;
        };
        if self.forced || tier.is_floor() {
            return None;
        }

        let over_memory = metrics
            .memory_usage_mb
            .is_some_and(|mb| mb > self.config.memory_ceiling_mb);

        if metrics.is_throttling || over_memory {
            let since = *self.throttle_since.get_or_insert(now);
            if now.duration_since(since) >= Duration::from_millis(self.config.degrade_grace_ms) {
                let next = tier.downgrade();
                warn!(
                    "sustained throttling ({:.0}fps), degrading {} -> {}",
                    metrics.fps, tier, next
                );
                self.throttle_since = None;
                self.transition(ControllerState::Active(next), next, ChangeReason::Degraded);
                return Some(next);
            }
        } else {
            self.throttle_since = None;
        }
        None
    }

    /// Unrecoverable rendering-context failure.
    pub fn report_render_failure(&mut self, message: &str) {
        warn!("render context lost: {message}");
        self.throttle_since = None;
        self.transition(ControllerState::Errored, QualityTier::Low, ChangeReason::Errored);
    }

    /// Live accessibility change: switches the active path to the
    /// non-animated fallback without re-detection.
    pub fn set_reduced_motion(&mut self, prefers_reduced_motion: bool) {
        self.reduced_motion = prefers_reduced_motion;
    }

    /// Explicit recovery: re-selects the tier from the stored profile and
    /// clears the errored state. The only path that can raise the tier.
    pub fn reset(&mut self) -> QualityTier {
        self.forced = false;
        self.throttle_since = None;
        let tier = select_tier(&self.profile);
        self.transition(ControllerState::Active(tier), tier, ChangeReason::Reset);
        tier
    }

    /// Tier reported to the rendering layer.
    ///
    /// Errored and uninitialized controllers report the floor tier.
    pub fn effective_tier(&self) -> QualityTier {
        match self.state {
            ControllerState::Active(tier) => tier,
            ControllerState::Uninitialized | ControllerState::Errored => QualityTier::Low,
        }
    }

    /// True when the rendering layer must use the static/no-animation path
    /// regardless of tier.
    pub fn fallback_active(&self) -> bool {
        self.reduced_motion
            || !self.profile.has_graphics
            || matches!(self.state, ControllerState::Errored)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    fn transition(&mut self, state: ControllerState, tier: QualityTier, reason: ChangeReason) {
        self.state = state;
        if let Some(on_change) = &self.on_change {
            on_change(TierChange { tier, reason });
        }
    }
}

/// Subscribes a controller to a monitor and drives the degradation policy
/// on a background thread.
///
/// The loop exits when the monitor stops (channel disconnect) or when no
/// further degradation is possible.
pub fn spawn_degradation_loop(
    controller: Arc<Mutex<AdaptiveController>>,
    monitor: &PerformanceMonitor,
) -> thread::JoinHandle<()> {
    let rx = monitor.subscribe();
    thread::spawn(move || {
        for metrics in rx.iter() {
            let Ok(mut ctrl) = controller.lock() else {
                break;
            };
            if !ctrl.monitoring_enabled() {
                break;
            }
            ctrl.handle_metrics(&metrics, Instant::now());
            if ctrl.effective_tier().is_floor() {
                break;
            }
        }
    })
}
