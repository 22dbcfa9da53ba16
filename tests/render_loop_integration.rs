//! Integration tests for the render loop.
//!
//! These run the real render thread against the simulated device, so no
//! keyboard is needed. Timing-dependent checks poll with a generous timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use keylight::config::Config;
use keylight::effect::{EffectLibrary, EffectRenderer, ResolvedEffect, DEFAULT_EFFECTS_TOML};
use keylight::renderer::handle;
use keylight::{
    ColorDirective, LayoutDescription, LoopState, RenderLoop, RenderTarget, RgbaColor,
    SimulatedDevice,
};

const FPS: u32 = 200;

/// Poll `cond` until it holds or two seconds pass
fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ── Bootstrap ──

#[test]
fn unchanged_keys_are_never_sent() {
    let device = SimulatedDevice::with_colors(vec![RgbaColor::GREEN; 10]);
    let probe = device.probe();
    let mut lp = RenderLoop::new(device, FPS).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    lp.add_renderer(handle(move |_: Duration, t: &mut RenderTarget| {
        counter.fetch_add(1, Ordering::SeqCst);
        t.fill(RgbaColor::GREEN);
    }));

    lp.start().unwrap();
    assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 5));
    lp.stop();

    assert_eq!(probe.read_count(), 1);
    assert_eq!(probe.apply_count(), 0);
    assert_eq!(probe.commit_count(), 0);
}

#[test]
fn bootstrap_failure_stops_before_rendering() {
    let device = SimulatedDevice::new(4);
    let probe = device.probe();
    probe.fail_reads(true);

    let mut lp = RenderLoop::new(device, FPS).unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ticks);
    lp.add_renderer(handle(move |_: Duration, _: &mut RenderTarget| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    lp.start().unwrap();
    lp.wait();
    assert_eq!(lp.state(), LoopState::Stopped);
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
    assert_eq!(probe.apply_count(), 0);
}

// ── Rendering ──

#[test]
fn changed_keys_are_sent_as_runs() {
    let device = SimulatedDevice::new(20);
    let probe = device.probe();
    let mut lp = RenderLoop::new(device, FPS).unwrap();
    lp.add_renderer(handle(EffectRenderer::with_keys(
        ResolvedEffect::solid(RgbaColor::RED),
        vec![3, 4, 5, 9],
    )));

    lp.start().unwrap();
    assert!(wait_until(|| probe.colors()[9] == RgbaColor::RED));
    // A few more ticks with nothing new to send
    std::thread::sleep(Duration::from_millis(30));
    lp.stop();

    assert_eq!(
        probe.batches(),
        vec![vec![
            ColorDirective::new(3, 5, RgbaColor::RED),
            ColorDirective::single(9, RgbaColor::RED),
        ]]
    );
}

#[test]
fn renderers_can_be_swapped_while_running() {
    let device = SimulatedDevice::new(8);
    let probe = device.probe();
    let mut lp = RenderLoop::new(device, FPS).unwrap();

    let red = handle(EffectRenderer::with_keys(
        ResolvedEffect::solid(RgbaColor::RED),
        vec![0],
    ));
    lp.add_renderer(Arc::clone(&red));
    lp.start().unwrap();
    assert!(wait_until(|| probe.colors()[0] == RgbaColor::RED));

    {
        let mut lock = lp.acquire_renderer_lock();
        let renderers = lock.renderers();
        renderers.clear();
        renderers.push(handle(EffectRenderer::with_keys(
            ResolvedEffect::solid(RgbaColor::BLUE),
            vec![0],
        )));
    }
    assert!(wait_until(|| probe.colors()[0] == RgbaColor::BLUE));
    assert!(!lp.remove_renderer(&red));
    lp.stop();
}

#[test]
fn device_failure_stops_the_loop() {
    let device = SimulatedDevice::new(6);
    let probe = device.probe();
    probe.fail_commit(true);

    let mut lp = RenderLoop::new(device, FPS).unwrap();
    lp.add_renderer(handle(EffectRenderer::new(ResolvedEffect::solid(
        RgbaColor::WHITE,
    ))));
    lp.start().unwrap();
    lp.wait();

    assert_eq!(lp.state(), LoopState::Stopped);
    assert_eq!(probe.apply_count(), 1);
    assert_eq!(probe.commit_count(), 1);
    assert!(probe.colors().iter().all(|&c| c == RgbaColor::BLACK));
}

#[test]
fn invalid_rate_is_rejected_at_start() {
    let mut lp = RenderLoop::new(SimulatedDevice::new(1), 0).unwrap();
    assert!(lp.start().is_err());
}

// ── Config + layout ──

#[test]
fn configured_renderers_paint_layout_keys() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/layouts/compact.toml");
    let layout = LayoutDescription::from_path(path.as_ref()).unwrap();
    let library = EffectLibrary::from_toml(DEFAULT_EFFECTS_TOML).unwrap();
    let config = Config::from_toml(
        r##"
[[renderers]]
effect = "solid"
vars = { color = "#102030" }

[[renderers]]
effect = "solid"
keys = ["W", "A", "S", "D"]
vars = { color = "orange" }
"##,
    )
    .unwrap();

    let renderers = config
        .build_renderers(&library, Some(&layout), layout.len())
        .unwrap();
    let device = SimulatedDevice::new(layout.len());
    let probe = device.probe();
    let mut lp = RenderLoop::new(device, FPS).unwrap();
    for r in renderers {
        lp.add_renderer(r);
    }

    let orange = RgbaColor::rgb(255, 165, 0);
    let base = RgbaColor::rgb(0x10, 0x20, 0x30);
    lp.start().unwrap();
    assert!(wait_until(|| probe.colors()[20] == orange));
    lp.stop();

    let colors = probe.colors();
    for key in ["w", "a", "s", "d"] {
        assert_eq!(colors[layout.find(key).unwrap().index], orange, "{key}");
    }
    assert_eq!(colors[layout.find("esc").unwrap().index], base);
    assert_eq!(colors[layout.find("pgdn").unwrap().index], base);
}

#[test]
fn power_budget_settles_with_partial_coverage() {
    let library = EffectLibrary::from_toml(DEFAULT_EFFECTS_TOML).unwrap();
    let config = Config::from_toml(
        r#"
power_budget_ma = 30

[[renderers]]
effect = "solid"
keys = [0]
vars = { color = "white" }
"#,
    )
    .unwrap();
    let renderers = config.build_renderers(&library, None, 4).unwrap();

    let device = SimulatedDevice::with_colors(vec![RgbaColor::WHITE; 4]);
    let record = device.probe();
    let mut lp = RenderLoop::new(device, FPS).unwrap();
    for r in renderers {
        lp.add_renderer(r);
    }

    let grey = RgbaColor::rgb(127, 127, 127);
    lp.start().unwrap();
    assert!(wait_until(|| record.colors()[0] == grey));
    // Identical frames from here on
    std::thread::sleep(Duration::from_millis(100));
    lp.stop();

    assert_eq!(
        record.colors(),
        vec![grey, RgbaColor::BLACK, RgbaColor::BLACK, RgbaColor::BLACK]
    );
    assert_eq!(record.commit_count(), 1);
}
