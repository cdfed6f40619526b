//! Integration tests for the probe -> select -> degrade pipeline.

use liveloop::adaptive::{
    AdaptiveController, ControllerState, MonitorConfig, PerformanceMonitor, TierChange,
    spawn_degradation_loop,
};
use liveloop::capability::{
    DeviceClass, EnvironmentProbe, GraphicsProbe, GraphicsSupport, NoGraphics, QualityTier,
    detect_with,
};
use liveloop::config::AdaptiveConfig;
use liveloop::error::{LiveloopError, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct DesktopEnv;

impl EnvironmentProbe for DesktopEnv {
    fn device_class(&self) -> Result<DeviceClass> {
        Ok(DeviceClass::Desktop)
    }
    fn parallelism(&self) -> Result<usize> {
        Ok(16)
    }
    fn memory_gb(&self) -> Result<Option<f64>> {
        Ok(Some(32.0))
    }
    fn prefers_reduced_motion(&self) -> bool {
        false
    }
    fn pixel_ratio(&self) -> f64 {
        1.0
    }
}

struct AdvancedGraphics;

impl GraphicsProbe for AdvancedGraphics {
    fn probe_advanced(&self) -> Result<GraphicsSupport> {
        Ok(GraphicsSupport {
            compressed_textures: true,
            max_texture_size: Some(16384),
        })
    }
    fn probe_baseline(&self) -> Result<GraphicsSupport> {
        Ok(GraphicsSupport {
            compressed_textures: false,
            max_texture_size: Some(4096),
        })
    }
}

struct BrokenGraphics;

impl GraphicsProbe for BrokenGraphics {
    fn probe_advanced(&self) -> Result<GraphicsSupport> {
        Err(LiveloopError::Detection {
            message: "context creation failed".to_string(),
        })
    }
    fn probe_baseline(&self) -> Result<GraphicsSupport> {
        Err(LiveloopError::Detection {
            message: "context creation failed".to_string(),
        })
    }
}

#[test]
fn probe_to_controller_reaches_high_tier() {
    let profile = detect_with(&DesktopEnv, &AdvancedGraphics);
    assert_eq!(profile.recommended_tier, QualityTier::High);

    let mut controller = AdaptiveController::new(profile, AdaptiveConfig::default());
    assert_eq!(controller.start(None), QualityTier::High);
    assert_eq!(controller.state(), ControllerState::Active(QualityTier::High));
}

#[test]
fn headless_host_runs_in_static_fallback() {
    let profile = detect_with(&DesktopEnv, &BrokenGraphics);
    assert!(profile.requires_static_fallback());

    let mut controller = AdaptiveController::new(profile, AdaptiveConfig::default());
    controller.start(None);
    assert!(controller.fallback_active());
}

#[test]
fn sustained_throttling_degrades_through_the_whole_pipeline() {
    let profile = detect_with(&DesktopEnv, &AdvancedGraphics);
    let config = AdaptiveConfig {
        degrade_grace_ms: 25,
        ..AdaptiveConfig::default()
    };

    let changes: Arc<Mutex<Vec<TierChange>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = changes.clone();
    let mut controller = AdaptiveController::new(profile, config);
    controller.set_on_change(Box::new(move |change| {
        seen.lock().unwrap().push(change);
    }));
    controller.start(None);
    let controller = Arc::new(Mutex::new(controller));

    // Impossible threshold: every emission reports throttling
    let monitor = PerformanceMonitor::new(MonitorConfig {
        fps_threshold: 100_000.0,
        frame_window: 4,
        emit_interval: 2,
        frame_interval_ms: 5,
    });
    let handle = spawn_degradation_loop(controller.clone(), &monitor);
    monitor.start();

    // Long enough for two grace windows to elapse
    std::thread::sleep(Duration::from_millis(400));
    monitor.stop();
    handle.join().unwrap();

    let tier = controller.lock().unwrap().effective_tier();
    assert_eq!(tier, QualityTier::Low, "expected degradation to the floor");

    // Tiers in the notification stream only ever step downward
    let changes = changes.lock().unwrap();
    let tiers: Vec<QualityTier> = changes.iter().map(|c| c.tier).collect();
    for pair in tiers.windows(2) {
        assert!(pair[1] <= pair[0], "tier rose without reset: {tiers:?}");
    }
}

#[test]
fn healthy_metrics_never_move_the_tier() {
    let profile = detect_with(&DesktopEnv, &AdvancedGraphics);
    let config = AdaptiveConfig {
        degrade_grace_ms: 25,
        ..AdaptiveConfig::default()
    };
    let mut controller = AdaptiveController::new(profile, config);
    controller.start(None);
    let controller = Arc::new(Mutex::new(controller));

    // Threshold of zero: nothing ever counts as throttling
    let monitor = PerformanceMonitor::new(MonitorConfig {
        fps_threshold: 0.0,
        frame_window: 4,
        emit_interval: 2,
        frame_interval_ms: 5,
    });
    let handle = spawn_degradation_loop(controller.clone(), &monitor);
    monitor.start();
    std::thread::sleep(Duration::from_millis(200));
    monitor.stop();
    handle.join().unwrap();

    assert_eq!(
        controller.lock().unwrap().effective_tier(),
        QualityTier::High
    );
}

#[test]
fn render_failure_then_reset_recovers_the_probed_tier() {
    let profile = detect_with(&DesktopEnv, &AdvancedGraphics);
    let mut controller = AdaptiveController::new(profile, AdaptiveConfig::default());
    controller.start(None);

    controller.report_render_failure("context lost");
    assert_eq!(controller.effective_tier(), QualityTier::Low);
    assert!(controller.fallback_active());

    assert_eq!(controller.reset(), QualityTier::High);
    assert!(!controller.fallback_active());
}

#[test]
fn no_graphics_probe_is_usable_as_default() {
    // NoGraphics is the probe embedders pass when they have no renderer
    let profile = detect_with(&DesktopEnv, &NoGraphics);
    assert!(!profile.has_graphics);
    assert_eq!(profile.max_texture_size, None);
}
