use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use keylight::config::{Config, DeviceKind};
use keylight::effect::{self, EffectLibrary, EffectRenderer};
use keylight::layout::LayoutDescription;
use keylight::renderer::{handle, RendererHandle};
use keylight::{Device, LoopState, RenderLoop, SimulatedDevice, TerminalDevice};

/// How often the main thread checks for Ctrl-C and the deadline
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run the render loop with the configured renderers.
pub fn run(
    mut config: Config,
    fps: Option<u32>,
    device: Option<DeviceKind>,
    seconds: Option<f64>,
) -> Result<()> {
    if let Some(fps) = fps {
        config.fps = fps;
    }
    if let Some(device) = device {
        config.device = device;
    }
    let deadline = seconds.map(run_deadline).transpose()?;

    let layout = config.load_layout()?;
    let key_count = layout.as_ref().map_or(config.key_count, LayoutDescription::len);
    let library = config.load_effects()?;
    let mut renderers = config.build_renderers(&library, layout.as_ref(), key_count)?;
    if config.renderers.is_empty() {
        // Below the power limiter, if there is one
        let limiter = usize::from(config.power_budget_ma > 0);
        renderers.insert(renderers.len() - limiter, default_renderer(&library)?);
    }

    match config.device {
        DeviceKind::Simulated => drive(
            SimulatedDevice::new(key_count),
            &config,
            renderers,
            deadline,
        ),
        DeviceKind::Terminal => {
            let device = match &layout {
                Some(layout) => TerminalDevice::open_with_labels(layout.labels(), config.columns),
                None => TerminalDevice::open(key_count, config.columns),
            }
            .context("open terminal preview")?;
            drive(device, &config, renderers, deadline)
        }
    }
}

/// Instant `seconds` from now
fn run_deadline(seconds: f64) -> Result<Instant> {
    if seconds <= 0.0 {
        bail!("invalid duration: {seconds} seconds");
    }
    Duration::try_from_secs_f64(seconds)
        .ok()
        .and_then(|d| Instant::now().checked_add(d))
        .with_context(|| format!("invalid duration: {seconds} seconds"))
}

/// Rainbow over every key, used when no renderer is configured
fn default_renderer(library: &EffectLibrary) -> Result<RendererHandle> {
    let def = library
        .get("rainbow")
        .context("no renderers configured and the library has no \"rainbow\" effect")?;
    info!("no renderers configured, using rainbow");
    let resolved = effect::resolve(def, &BTreeMap::new())?;
    Ok(handle(EffectRenderer::new(resolved)))
}

fn drive<D: Device + 'static>(
    device: D,
    config: &Config,
    renderers: Vec<RendererHandle>,
    deadline: Option<Instant>,
) -> Result<()> {
    let name = device.name().to_string();
    let mut render_loop = RenderLoop::new(device, config.fps)?;
    {
        let mut lock = render_loop.acquire_renderer_lock();
        lock.renderers().extend(renderers);
    }
    render_loop.start()?;
    info!(device = %name, fps = config.fps, "running, Ctrl+C to stop");

    let running = super::setup_interrupt_handler();
    while running.load(Ordering::SeqCst) && render_loop.state() != LoopState::Stopped {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let failed = render_loop.state() == LoopState::Stopped;
    // Releases the device, which restores the terminal
    render_loop.stop();
    drop(render_loop);

    if failed {
        warn!(device = %name, "render loop stopped on its own");
        bail!("render loop on {name} stopped after a device error");
    }
    info!("stopped");
    Ok(())
}
