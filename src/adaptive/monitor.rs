//! Frame-rate sampling with periodic metrics emission.
//!
//! Keeps a fixed-capacity rolling window of frame intervals and emits
//! derived metrics to subscriber channels every N frames. Frames can come
//! from the internal interval loop or be pushed by an external render loop
//! via [`PerformanceMonitor::record_frame`].

use crate::config::AdaptiveConfig;
use crate::defaults;
use log::warn;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

/// Derived performance metrics, computed on demand and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    /// Frames per second derived from the average frame time.
    pub fps: f64,
    /// Average frame interval over the rolling window (ms).
    pub avg_frame_time_ms: f64,
    /// Total frames recorded since the monitor started.
    pub frame_count: u64,
    /// True when fps has fallen below the configured threshold.
    pub is_throttling: bool,
    /// Resident memory of this process in MB, when the platform reports it.
    pub memory_usage_mb: Option<f64>,
}

/// Configuration for the performance monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Frame rate floor below which `is_throttling` is set.
    pub fps_threshold: f64,
    /// Rolling window capacity; oldest samples evicted first.
    pub frame_window: usize,
    /// Emit metrics once every this many frames.
    pub emit_interval: u64,
    /// Interval between samples for the self-driving loop (ms).
    pub frame_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fps_threshold: defaults::FPS_THRESHOLD,
            frame_window: defaults::FRAME_WINDOW,
            emit_interval: defaults::METRICS_EMIT_INTERVAL,
            frame_interval_ms: defaults::FRAME_INTERVAL_MS,
        }
    }
}

impl MonitorConfig {
    /// Creates monitor configuration from app config.
    pub fn from_config(config: &AdaptiveConfig) -> Self {
        Self {
            fps_threshold: config.fps_threshold,
            frame_window: config.frame_window,
            emit_interval: config.emit_interval,
            frame_interval_ms: config.frame_interval_ms,
        }
    }
}

struct MonitorInner {
    frame_times: VecDeque<f64>,
    frame_count: u64,
    last_frame: Option<Instant>,
    subscribers: Vec<crossbeam_channel::Sender<PerformanceMetrics>>,
}

impl MonitorInner {
    fn new(window: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(window),
            frame_count: 0,
            last_frame: None,
            subscribers: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.frame_times.clear();
        self.frame_count = 0;
        self.last_frame = None;
    }

    fn metrics(&self, config: &MonitorConfig) -> PerformanceMetrics {
        let avg_frame_time_ms = if self.frame_times.is_empty() {
            // No samples yet: assume nominal 60fps rather than dividing by zero
            1000.0 / 60.0
        } else {
            self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64
        };
        let fps = 1000.0 / avg_frame_time_ms;
        PerformanceMetrics {
            fps,
            avg_frame_time_ms,
            frame_count: self.frame_count,
            is_throttling: fps < config.fps_threshold,
            memory_usage_mb: process_memory_mb(),
        }
    }
}

/// Samples wall-clock frame intervals and reports periodic metrics.
///
/// `start` is idempotent; `stop` cancels the sampling loop and disconnects
/// every subscriber channel, so no metrics are delivered after `stop`
/// returns.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    inner: Arc<Mutex<MonitorInner>>,
    running: Arc<AtomicBool>,
    sampler: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let window = config.frame_window;
        Self {
            config,
            inner: Arc::new(Mutex::new(MonitorInner::new(window))),
            running: Arc::new(AtomicBool::new(false)),
            sampler: Mutex::new(None),
        }
    }

    fn lock_sampler(&self) -> std::sync::MutexGuard<'_, Option<thread::JoinHandle<()>>> {
        match self.sampler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a metrics subscriber.
    ///
    /// The channel disconnects when the monitor stops; a subscriber that
    /// drops its receiver is pruned on the next emission.
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<PerformanceMetrics> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.push(tx);
        }
        rx
    }

    /// Starts the self-driving sampling loop. No-op if already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.reset();
        }

        let inner = self.inner.clone();
        let running = self.running.clone();
        let config = self.config.clone();
        let interval = Duration::from_millis(config.frame_interval_ms);

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                record_frame_at(&inner, &config, Instant::now());
                thread::sleep(interval);
            }
        });
        *self.lock_sampler() = Some(handle);
    }

    /// Records one frame boundary from an external render loop.
    ///
    /// Ignored while the monitor is stopped, which also guarantees no
    /// subscriber sees a metric emitted after `stop`.
    pub fn record_frame(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        record_frame_at(&self.inner, &self.config, Instant::now());
    }

    /// Stops sampling and disconnects all subscribers.
    ///
    /// Joins the sampling thread, so a `start` issued after `stop` returns
    /// can never race an old loop still inside its sleep.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut inner) = self.inner.lock() {
            // Dropping the senders disconnects every receiver
            inner.subscribers.clear();
            inner.last_frame = None;
        }
        let handle = self.lock_sampler().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("sampling thread panicked");
        }
    }

    /// True while the sampling loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current metrics, computed on demand from the rolling window.
    pub fn metrics(&self) -> PerformanceMetrics {
        match self.inner.lock() {
            Ok(inner) => inner.metrics(&self.config),
            Err(_) => MonitorInner::new(self.config.frame_window).metrics(&self.config),
        }
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_frame_at(inner: &Mutex<MonitorInner>, config: &MonitorConfig, now: Instant) {
    let Ok(mut inner) = inner.lock() else {
        return;
    };

    if let Some(last) = inner.last_frame {
        let delta_ms = now.duration_since(last).as_secs_f64() * 1000.0;
        if inner.frame_times.len() == config.frame_window {
            inner.frame_times.pop_front();
        }
        inner.frame_times.push_back(delta_ms);
    }
    inner.last_frame = Some(now);
    inner.frame_count += 1;

    if inner.frame_count % config.emit_interval == 0 {
        let metrics = inner.metrics(config);
        // Channel sends under the lock are fine: no user code runs here
        inner
            .subscribers
            .retain(|tx| tx.send(metrics.clone()).is_ok());
    }
}

/// Resident memory of the current process in MB, best effort.
fn process_memory_mb() -> Option<f64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    let bytes = sys.process(pid)?.memory();
    if bytes == 0 {
        return None;
    }
    Some(bytes as f64 / (1024.0 * 1024.0))
}
