//! Device render loop.
//!
//! A `RenderLoop` runs a list of [`Renderer`]s on every tick and sends the
//! resulting frame to a [`Device`], transmitting only the keys that changed.
//!
//! ```text
//! tick:  lock list ─► renderers paint scratch ─► unlock
//!                                                  │
//!        swap(known, scratch) ◄─ apply + commit ◄─ diff(known, scratch)
//! ```
//!
//! The loop takes the device by value: nothing else can write to it while
//! the loop exists. The two frame buffers live on the render thread only.
//! The renderer list is the one piece of shared state, guarded by a mutex
//! that is never held across device I/O.

use std::sync::Arc;
use std::time::Duration;

use keylight_device::{ColorDirective, Device, DeviceError};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace};

use crate::animation::{Animation, AnimationLoop, LoopState};
use crate::error::{AllocationError, StartError};
use crate::render_target::{RenderTarget, ALIGN_COLORS};
use crate::renderer::{same_renderer, RendererHandle};

type RendererList = Vec<RendererHandle>;

/// Scoped lock over a loop's renderer list.
///
/// While it is held no tick can start compositing, and a tick in progress
/// has already finished with the list. Changes made through it are seen
/// whole by the next tick.
pub struct RendererLock<'a> {
    guard: MutexGuard<'a, RendererList>,
}

impl RendererLock<'_> {
    /// The ordered renderer list; later entries paint over earlier ones
    pub fn renderers(&mut self) -> &mut Vec<RendererHandle> {
        &mut self.guard
    }
}

/// Runs renderers periodically and keeps a device in sync with their output
pub struct RenderLoop {
    renderers: Arc<Mutex<RendererList>>,
    pending: Option<RenderTask>,
    animation: Option<AnimationLoop>,
    key_count: usize,
    fps: u32,
}

impl RenderLoop {
    /// Build a loop for `device`, ticking at `fps` once started.
    ///
    /// The device is owned by the loop from now on and dropped with it.
    pub fn new<D: Device + 'static>(device: D, fps: u32) -> Result<Self, AllocationError> {
        let renderers = Arc::new(Mutex::new(RendererList::new()));
        let task = RenderTask::new(Box::new(device), Arc::clone(&renderers))?;
        let key_count = task.state.len();
        Ok(Self {
            renderers,
            pending: Some(task),
            animation: None,
            key_count,
            fps,
        })
    }

    /// Create a render target matching the layout of `device`
    pub fn render_target_for(device: &dyn Device) -> Result<RenderTarget, AllocationError> {
        RenderTarget::new(device.key_count())
    }

    /// Lock the renderer list.
    ///
    /// Must be held to read or change the list from outside the loop.
    pub fn acquire_renderer_lock(&self) -> RendererLock<'_> {
        RendererLock {
            guard: self.renderers.lock(),
        }
    }

    /// Append a renderer; it runs from the next tick on
    pub fn add_renderer(&self, renderer: RendererHandle) {
        self.acquire_renderer_lock().renderers().push(renderer);
    }

    /// Unregister a renderer. Returns false if it was not registered.
    pub fn remove_renderer(&self, renderer: &RendererHandle) -> bool {
        let mut lock = self.acquire_renderer_lock();
        let list = lock.renderers();
        match list.iter().position(|r| same_renderer(r, renderer)) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of registered renderers
    pub fn renderer_count(&self) -> usize {
        self.renderers.lock().len()
    }

    /// Number of keys on the device
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Target tick rate
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Start ticking on a dedicated thread.
    ///
    /// The device state is read once on that thread before the first tick.
    pub fn start(&mut self) -> Result<(), StartError> {
        let task = self.pending.take().ok_or(StartError::AlreadyStarted)?;
        info!(
            device = task.device.name(),
            keys = self.key_count,
            fps = self.fps,
            "starting render loop"
        );
        self.animation = Some(AnimationLoop::start(task, self.fps)?);
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        match &self.animation {
            Some(animation) => animation.state(),
            None if self.pending.is_some() => LoopState::Constructed,
            None => LoopState::Stopped,
        }
    }

    /// Stop ticking and wait for the render thread. The device is released.
    pub fn stop(&mut self) {
        self.pending = None;
        if let Some(mut animation) = self.animation.take() {
            animation.stop();
        }
    }

    /// Wait until the loop stops by itself (device failure)
    pub fn wait(&mut self) {
        if let Some(animation) = self.animation.as_mut() {
            animation.wait();
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything a tick touches. Lives on the render thread once started.
struct RenderTask {
    device: Box<dyn Device>,
    renderers: Arc<Mutex<RendererList>>,
    /// What the device is believed to show
    state: RenderTarget,
    /// Frame being rendered
    buffer: RenderTarget,
    /// Reused between ticks
    directives: Vec<ColorDirective>,
}

impl RenderTask {
    fn new(
        device: Box<dyn Device>,
        renderers: Arc<Mutex<RendererList>>,
    ) -> Result<Self, AllocationError> {
        let state = RenderLoop::render_target_for(device.as_ref())?;
        let buffer = RenderLoop::render_target_for(device.as_ref())?;
        Ok(Self {
            device,
            renderers,
            state,
            buffer,
            directives: Vec::new(),
        })
    }

    /// Read current LED colors into both buffers
    fn load_device_state(&mut self) -> Result<(), DeviceError> {
        let colors = self.device.read_current_state()?;
        if colors.len() != self.state.len() {
            return Err(DeviceError::StateLength {
                expected: self.state.len(),
                actual: colors.len(),
            });
        }
        self.state.copy_from_slice(&colors);
        self.buffer.copy_from_slice(&colors);
        Ok(())
    }

    fn submit(&mut self) -> Result<(), DeviceError> {
        self.device.apply_directives(&self.directives)?;
        self.device.commit()
    }
}

impl Animation for RenderTask {
    fn on_start(&mut self) -> bool {
        match self.load_device_state() {
            Ok(()) => {
                debug!(keys = self.state.len(), "loaded device state");
                true
            }
            Err(e) => {
                error!(device = self.device.name(), error = %e, "failed to read device state");
                false
            }
        }
    }

    fn render(&mut self, elapsed: Duration) -> bool {
        {
            let renderers = self.renderers.lock();
            for renderer in renderers.iter() {
                renderer.lock().render(elapsed, &mut self.buffer);
            }
        }

        diff(&self.state, &self.buffer, &mut self.directives);

        if !self.directives.is_empty() {
            trace!(directives = self.directives.len(), "sending frame");
            if let Err(e) = self.submit() {
                // The device may now be half-updated; resending would not fix that
                let first = self.directives.first().map_or(0, |d| d.first);
                let last = self.directives.last().map_or(0, |d| d.last);
                error!(
                    device = self.device.name(),
                    directives = self.directives.len(),
                    first_key = first,
                    last_key = last,
                    error = %e,
                    "LED update failed, stopping render loop"
                );
                return false;
            }
        }

        std::mem::swap(&mut self.state, &mut self.buffer);
        true
    }
}

/// Compute the directives that turn `known` into `next`.
///
/// Each directive covers a maximal run of consecutive keys that changed and
/// whose new colors are all equal. `out` is cleared first.
pub fn diff(known: &RenderTarget, next: &RenderTarget, out: &mut Vec<ColorDirective>) {
    out.clear();
    let len = known.len().min(next.len());
    let mut index = 0;

    while index < len {
        // Whole unchanged blocks are skipped in one comparison
        if index % ALIGN_COLORS == 0 && index + ALIGN_COLORS <= len {
            let block = index / ALIGN_COLORS;
            if known.blocks()[block] == next.blocks()[block] {
                index += ALIGN_COLORS;
                continue;
            }
        }

        let color = next[index];
        if color == known[index] {
            index += 1;
            continue;
        }

        let first = index;
        index += 1;
        while index < len && next[index] == color && known[index] != color {
            index += 1;
        }
        out.push(ColorDirective::new(first, index - 1, color));
    }
}
