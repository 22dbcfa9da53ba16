//! keylight: per-key RGB keyboard lighting engine
//!
//! Renderers paint per-key colors into a [`RenderTarget`]; a [`RenderLoop`]
//! runs them periodically and sends only the keys that changed to a
//! [`Device`] as [`ColorDirective`]s.

pub mod animation;
pub mod config;
pub mod effect;
pub mod error;
pub mod layout;
pub mod power;
pub mod render_loop;
pub mod render_target;
pub mod renderer;

pub use animation::{Animation, AnimationLoop, LoopState};
pub use error::{AllocationError, ConfigError, EffectError, LayoutError, StartError};
pub use layout::LayoutDescription;
pub use render_loop::{diff, RenderLoop, RendererLock};
pub use render_target::RenderTarget;
pub use renderer::{Renderer, RendererHandle};

pub use keylight_device::{
    ColorDirective, Device, DeviceError, RgbaColor, SimulatedDevice, SimulatedProbe,
    TerminalDevice,
};
