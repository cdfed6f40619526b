//! Render strategy trait and tier-keyed registry.

use crate::capability::QualityTier;
use crate::error::{LiveloopError, Result};
use std::collections::HashMap;

/// One interchangeable rendering implementation.
///
/// Implementations share the same mount/unmount contract so the controller
/// can swap them when the tier changes. `unmount` must be safe to call on a
/// strategy that never mounted or already unmounted.
pub trait RenderStrategy: Send {
    fn mount(&mut self) -> Result<()>;
    fn unmount(&mut self);
    fn name(&self) -> &'static str;
}

/// Non-animated fallback used when graphics are unavailable, reduced motion
/// is requested, or the render context was lost.
#[derive(Debug, Default)]
pub struct StaticFallback {
    mounted: bool,
}

impl RenderStrategy for StaticFallback {
    fn mount(&mut self) -> Result<()> {
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) {
        self.mounted = false;
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

impl std::fmt::Debug for dyn RenderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStrategy")
            .field("name", &self.name())
            .finish()
    }
}

type StrategyFactory = Box<dyn Fn() -> Box<dyn RenderStrategy> + Send + Sync>;

/// Lookup table mapping quality tiers to strategy factories.
///
/// Selection walks down from the requested tier to the nearest registered
/// one, so a caller that only registers `medium` still serves `high`
/// requests with its best available implementation.
#[derive(Default)]
pub struct StrategyRegistry {
    factories: HashMap<QualityTier, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory for a tier, replacing any previous one.
    pub fn register<F>(&mut self, tier: QualityTier, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn RenderStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(tier, Box::new(factory));
        self
    }

    /// Instantiates the strategy for a tier, falling back down tiers when
    /// the exact one is missing.
    pub fn select(&self, tier: QualityTier) -> Result<Box<dyn RenderStrategy>> {
        let mut candidate = tier;
        loop {
            if let Some(factory) = self.factories.get(&candidate) {
                return Ok(factory());
            }
            if candidate.is_floor() {
                return Err(LiveloopError::NoStrategy {
                    tier: tier.to_string(),
                });
            }
            candidate = candidate.downgrade();
        }
    }

    pub fn is_registered(&self, tier: QualityTier) -> bool {
        self.factories.contains_key(&tier)
    }
}
