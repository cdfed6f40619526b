//! Environment probing behind swappable traits.
//!
//! The host implementation reads real hardware info (sysinfo, num_cpus);
//! tests substitute deterministic probes. `detect` never fails: each failing
//! probe degrades to the matching field of
//! [`CapabilityProfile::conservative_default`].

use crate::capability::profile::{CapabilityProfile, DeviceClass, select_tier};
use crate::defaults;
use crate::error::Result;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Ambient environment info: hardware estimates and user preferences.
pub trait EnvironmentProbe {
    /// Best-effort device classification. Heuristic; may misclassify.
    fn device_class(&self) -> Result<DeviceClass>;
    /// Estimated logical parallelism.
    fn parallelism(&self) -> Result<usize>;
    /// Estimated total memory in GB, `None` when unreported.
    fn memory_gb(&self) -> Result<Option<f64>>;
    /// Accessibility preference for reduced motion.
    fn prefers_reduced_motion(&self) -> bool;
    /// Display pixel density.
    fn pixel_ratio(&self) -> f64;
}

/// Result of probing one graphics tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsSupport {
    pub compressed_textures: bool,
    pub max_texture_size: Option<u32>,
}

/// Graphics-acceleration probing, supplied by the rendering layer.
///
/// Probing order is fixed: advanced tier first, baseline as fallback.
/// Absence of both means the rendering layer cannot run at all.
pub trait GraphicsProbe {
    /// Probe the advanced graphics tier.
    fn probe_advanced(&self) -> Result<GraphicsSupport>;
    /// Probe the baseline graphics tier.
    fn probe_baseline(&self) -> Result<GraphicsSupport>;
}

/// Graphics probe for headless or unsupported hosts: both tiers absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGraphics;

impl GraphicsProbe for NoGraphics {
    fn probe_advanced(&self) -> Result<GraphicsSupport> {
        Err(crate::error::LiveloopError::Detection {
            message: "no graphics backend".to_string(),
        })
    }

    fn probe_baseline(&self) -> Result<GraphicsSupport> {
        Err(crate::error::LiveloopError::Detection {
            message: "no graphics backend".to_string(),
        })
    }
}

/// Real host probe backed by num_cpus and sysinfo.
///
/// Device class comes from the platform identifier plus a
/// `LIVELOOP_DEVICE_CLASS` override (`mobile`/`tablet`/`desktop`) for
/// embedded deployments where the platform string lies.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostEnvironment;

impl EnvironmentProbe for HostEnvironment {
    fn device_class(&self) -> Result<DeviceClass> {
        if let Ok(forced) = std::env::var("LIVELOOP_DEVICE_CLASS") {
            return Ok(match forced.to_lowercase().as_str() {
                "mobile" => DeviceClass::Mobile,
                "tablet" => DeviceClass::Tablet,
                _ => DeviceClass::Desktop,
            });
        }
        Ok(match std::env::consts::OS {
            "android" | "ios" => DeviceClass::Mobile,
            _ => DeviceClass::Desktop,
        })
    }

    fn parallelism(&self) -> Result<usize> {
        let n = num_cpus::get();
        if n == 0 {
            return Err(crate::error::LiveloopError::Detection {
                message: "cpu count unavailable".to_string(),
            });
        }
        Ok(n)
    }

    fn memory_gb(&self) -> Result<Option<f64>> {
        let mut sys = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();
        let bytes = sys.total_memory();
        if bytes == 0 {
            return Ok(None);
        }
        Ok(Some(bytes as f64 / (1024.0 * 1024.0 * 1024.0)))
    }

    fn prefers_reduced_motion(&self) -> bool {
        // No portable desktop signal; honor an explicit opt-in.
        std::env::var("LIVELOOP_REDUCED_MOTION")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn pixel_ratio(&self) -> f64 {
        1.0
    }
}

/// Probes the host and derives a capability profile.
///
/// Synchronous, no side effects beyond reading ambient environment info.
/// Never fails: probe errors are logged and absorbed field by field using
/// the conservative default profile's values.
pub fn detect(graphics: &dyn GraphicsProbe) -> CapabilityProfile {
    detect_with(&HostEnvironment, graphics)
}

/// [`detect`] with an explicit environment probe, for tests and embedders.
pub fn detect_with(env: &dyn EnvironmentProbe, graphics: &dyn GraphicsProbe) -> CapabilityProfile {
    let fallback = CapabilityProfile::conservative_default();

    let device_class = match env.device_class() {
        Ok(class) => class,
        Err(e) => {
            warn!("device classification failed, assuming {:?}: {e}", fallback.device_class);
            fallback.device_class
        }
    };
    let parallelism = match env.parallelism() {
        Ok(n) => n,
        Err(e) => {
            warn!("parallelism probe failed, assuming {}: {e}", fallback.parallelism);
            fallback.parallelism
        }
    };
    let memory_gb = match env.memory_gb() {
        Ok(mem) => mem,
        Err(e) => {
            warn!("memory probe failed, treating as unknown: {e}");
            fallback.memory_gb
        }
    };

    // Advanced tier first, baseline as fallback
    let (has_graphics, has_advanced, support) = match graphics.probe_advanced() {
        Ok(support) => (true, true, Some(support)),
        Err(_) => match graphics.probe_baseline() {
            Ok(support) => (true, false, Some(support)),
            Err(e) => {
                debug!("graphics unavailable: {e}");
                (false, false, None)
            }
        },
    };

    let mut profile = CapabilityProfile {
        device_class,
        is_low_power: parallelism <= defaults::LOW_POWER_PARALLELISM,
        prefers_reduced_motion: env.prefers_reduced_motion(),
        has_graphics,
        has_advanced_graphics: has_advanced,
        supports_compressed_textures: support
            .as_ref()
            .map(|s| s.compressed_textures)
            .unwrap_or(false),
        memory_gb,
        parallelism,
        pixel_ratio: env.pixel_ratio(),
        max_texture_size: support.and_then(|s| s.max_texture_size),
        recommended_tier: crate::capability::QualityTier::Medium,
    };
    profile.recommended_tier = select_tier(&profile);
    profile
}

/// Live reduced-motion preference changes, observable without re-detection.
///
/// Hosts publish changes; subscribers hold a guard that unsubscribes on
/// drop, so handler lifetimes follow the owning component.
#[derive(Clone, Default)]
pub struct MotionWatcher {
    subscribers: Arc<Mutex<HashMap<u64, Box<dyn Fn(bool) + Send>>>>,
    next_id: Arc<AtomicU64>,
}

impl MotionWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a change handler; dropping the returned guard removes it.
    pub fn subscribe(&self, on_change: Box<dyn Fn(bool) + Send>) -> MotionSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.insert(id, on_change);
        }
        MotionSubscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Publishes a preference change to all live subscribers.
    pub fn publish(&self, prefers_reduced_motion: bool) {
        if let Ok(subs) = self.subscribers.lock() {
            for handler in subs.values() {
                handler(prefers_reduced_motion);
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Subscription guard returned by [`MotionWatcher::subscribe`].
pub struct MotionSubscription {
    id: u64,
    subscribers: std::sync::Weak<Mutex<HashMap<u64, Box<dyn Fn(bool) + Send>>>>,
}

impl Drop for MotionSubscription {
    fn drop(&mut self) {
        if let Some(subs) = self.subscribers.upgrade()
            && let Ok(mut subs) = subs.lock()
        {
            subs.remove(&self.id);
        }
    }
}
