//! Capability profile and the deterministic tier selection rules.

use crate::capability::tier::QualityTier;
use crate::defaults;

/// Coarse device classification derived from best-effort platform signals.
///
/// Classification is advisory, not authoritative — the signals behind it
/// (platform strings, core counts) can misclassify unusual hardware. The
/// tier selector treats it as one input among several.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub fn is_mobile(self) -> bool {
        self == DeviceClass::Mobile
    }

    pub fn is_tablet(self) -> bool {
        self == DeviceClass::Tablet
    }

    pub fn is_desktop(self) -> bool {
        self == DeviceClass::Desktop
    }
}

/// Immutable snapshot of the execution environment, created once per session.
///
/// A new profile replaces the old one on explicit re-detection; the struct
/// itself is never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityProfile {
    pub device_class: DeviceClass,
    /// Low parallelism hardware; always true for <= 4 logical cores.
    pub is_low_power: bool,
    /// Accessibility preference read at detection time.
    pub prefers_reduced_motion: bool,
    /// Baseline graphics acceleration is available at all.
    pub has_graphics: bool,
    /// The advanced graphics tier is available.
    pub has_advanced_graphics: bool,
    /// Compressed-texture support on the advanced tier.
    pub supports_compressed_textures: bool,
    /// Estimated memory in GB, `None` when the platform does not report it.
    pub memory_gb: Option<f64>,
    /// Estimated logical parallelism.
    pub parallelism: usize,
    /// Display pixel density.
    pub pixel_ratio: f64,
    /// Largest supported texture edge, when graphics probing reported one.
    pub max_texture_size: Option<u32>,
    /// Tier derived from the fields above via [`select_tier`].
    pub recommended_tier: QualityTier,
}

impl CapabilityProfile {
    /// Conservative default used when probing fails or is unavailable:
    /// desktop class, medium tier, no graphics acceleration assumed.
    pub fn conservative_default() -> Self {
        let mut profile = Self {
            device_class: DeviceClass::Desktop,
            is_low_power: false,
            prefers_reduced_motion: false,
            has_graphics: false,
            has_advanced_graphics: false,
            supports_compressed_textures: false,
            memory_gb: None,
            parallelism: defaults::FALLBACK_PARALLELISM,
            pixel_ratio: 1.0,
            max_texture_size: None,
            recommended_tier: QualityTier::Medium,
        };
        profile.recommended_tier = select_tier(&profile);
        profile
    }

    /// True when the rendering layer cannot run at all and the controller
    /// must use the static fallback up-front.
    pub fn requires_static_fallback(&self) -> bool {
        !self.has_graphics || self.prefers_reduced_motion
    }
}

/// Maps a capability profile to a quality tier.
///
/// Rules are evaluated in fixed order, first match wins — no scoring or
/// weighting. Deterministic and total: every profile maps to exactly one
/// tier.
pub fn select_tier(profile: &CapabilityProfile) -> QualityTier {
    let mobile = profile.device_class.is_mobile();
    let tablet = profile.device_class.is_tablet();

    // Low tier: budget mobile devices and constrained hardware
    if mobile && profile.is_low_power {
        return QualityTier::Low;
    }
    if let Some(memory) = profile.memory_gb
        && memory < defaults::LOW_MEMORY_GB
    {
        return QualityTier::Low;
    }
    if profile.parallelism <= defaults::LOW_PARALLELISM {
        return QualityTier::Low;
    }
    if mobile && !profile.has_advanced_graphics {
        return QualityTier::Low;
    }

    // High tier: desktops and high-end mobile/tablets
    if profile.device_class.is_desktop()
        && profile.parallelism >= defaults::HIGH_PARALLELISM_DESKTOP
        && profile
            .memory_gb
            .is_none_or(|memory| memory >= defaults::HIGH_MEMORY_GB)
    {
        return QualityTier::High;
    }
    if (mobile || tablet)
        && profile.parallelism >= defaults::HIGH_PARALLELISM_MOBILE
        && profile.has_advanced_graphics
    {
        return QualityTier::High;
    }

    // Medium tier: everything else
    QualityTier::Medium
}
