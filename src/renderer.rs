//! Renderer trait and shared renderer handles

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::render_target::RenderTarget;

/// A visual effect painted into a [`RenderTarget`] once per tick.
///
/// Renderers run in registration order, so a later renderer overwrites the
/// keys an earlier one painted. A renderer should only write the keys it
/// controls and repaint them on every call: the target is not cleared
/// between ticks and holds stale data from an older frame.
pub trait Renderer: Send {
    /// Paint the effect, `elapsed` being the time since the previous tick
    fn render(&mut self, elapsed: Duration, target: &mut RenderTarget);
}

impl<F> Renderer for F
where
    F: FnMut(Duration, &mut RenderTarget) + Send,
{
    fn render(&mut self, elapsed: Duration, target: &mut RenderTarget) {
        self(elapsed, target)
    }
}

/// Shared handle to a registered renderer.
///
/// The render loop only holds clones of the handle; whoever registered the
/// renderer keeps theirs to reconfigure it or to unregister it later.
pub type RendererHandle = Arc<Mutex<dyn Renderer>>;

/// Wrap a renderer in a [`RendererHandle`]
pub fn handle<R: Renderer + 'static>(renderer: R) -> RendererHandle {
    Arc::new(Mutex::new(renderer))
}

/// True if both handles point at the same renderer
pub fn same_renderer(a: &RendererHandle, b: &RendererHandle) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
