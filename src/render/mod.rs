//! Tier-keyed render strategy selection.
//!
//! Rendering itself lives outside this crate; this module only defines the
//! mount/unmount contract and the lookup table that replaces tier
//! conditionals scattered through rendering code.

pub mod strategy;

pub use strategy::{RenderStrategy, StaticFallback, StrategyRegistry};
