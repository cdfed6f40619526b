//! Pointer event debouncing by time and spatial distance.
//!
//! Physics loops drown in noisy pointer samples; the debouncer gates events
//! first by a minimum interval, then by a minimum displacement from the last
//! accepted position.

use crate::config::InputConfig;
use std::time::{Duration, Instant};

/// Velocity derived from accepted pointer events, in pixels per millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
}

/// Rate-limits pointer/touch events by time and distance.
///
/// The distance gate only applies once a baseline position exists: the very
/// first event after construction or [`reset`](TouchDebouncer::reset) always
/// passes. The baseline is tracked as `Option<Instant>` rather than a zero
/// timestamp, so "never touched" cannot be confused with a real time value.
pub struct TouchDebouncer {
    debounce_time: Duration,
    distance_threshold: f64,
    last_accepted: Option<Instant>,
    position: (f64, f64),
    velocity: Velocity,
}

impl TouchDebouncer {
    pub fn new(config: &InputConfig) -> Self {
        Self {
            debounce_time: Duration::from_millis(config.debounce_time_ms),
            distance_threshold: config.distance_threshold,
            last_accepted: None,
            position: (0.0, 0.0),
            velocity: Velocity::default(),
        }
    }

    /// Decides whether an event at (x, y) should reach the physics loop.
    ///
    /// On acceptance, updates the stored position/time and derives velocity
    /// as displacement over elapsed time.
    pub fn should_process(&mut self, x: f64, y: f64) -> bool {
        self.should_process_at(x, y, Instant::now())
    }

    fn should_process_at(&mut self, x: f64, y: f64, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            let elapsed = now.duration_since(last);

            // Time gate
            if elapsed < self.debounce_time {
                return false;
            }

            // Distance gate
            let dx = x - self.position.0;
            let dy = y - self.position.1;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < self.distance_threshold {
                return false;
            }

            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            if elapsed_ms > 0.0 {
                self.velocity = Velocity {
                    x: dx / elapsed_ms,
                    y: dy / elapsed_ms,
                };
            }
        }

        self.position = (x, y);
        self.last_accepted = Some(now);
        true
    }

    /// Velocity measured across the last two accepted events.
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Clears all stored state; the next event is unconditionally accepted.
    ///
    /// Call when a drag gesture ends so the next gesture starts fresh.
    pub fn reset(&mut self) {
        self.last_accepted = None;
        self.position = (0.0, 0.0);
        self.velocity = Velocity::default();
    }
}
