//! Discrete quality tiers for the rendering layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality level controlling simulation and render fidelity.
///
/// Totally ordered: `Low < Medium < High`. Automatic transitions only move
/// downward; recovery requires an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Returns the next tier down, saturating at `Low`.
    pub fn downgrade(self) -> QualityTier {
        match self {
            QualityTier::High => QualityTier::Medium,
            QualityTier::Medium | QualityTier::Low => QualityTier::Low,
        }
    }

    /// Returns true when no further automatic degradation is possible.
    pub fn is_floor(self) -> bool {
        self == QualityTier::Low
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
