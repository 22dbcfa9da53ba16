use std::time::Duration;

use crate::render_target::RenderTarget;
use crate::renderer::Renderer;

use super::ResolvedEffect;

/// Paints a resolved effect onto a set of keys.
///
/// The effect clock advances by the elapsed time of each tick, so a stalled
/// loop resumes the animation where it left off.
#[derive(Debug, Clone)]
pub struct EffectRenderer {
    effect: ResolvedEffect,
    /// `None` paints every key
    keys: Option<Vec<usize>>,
    clock: Duration,
}

impl EffectRenderer {
    /// Render `effect` on every key
    pub fn new(effect: ResolvedEffect) -> Self {
        Self {
            effect,
            keys: None,
            clock: Duration::ZERO,
        }
    }

    /// Render `effect` on the given key indices only.
    /// Indices past the end of the target are skipped.
    pub fn with_keys(effect: ResolvedEffect, keys: Vec<usize>) -> Self {
        Self {
            keys: Some(keys),
            ..Self::new(effect)
        }
    }

    pub fn effect(&self) -> &ResolvedEffect {
        &self.effect
    }

    /// Swap the effect and restart its clock
    pub fn set_effect(&mut self, effect: ResolvedEffect) {
        self.effect = effect;
        self.clock = Duration::ZERO;
    }

    /// Time the effect has been running
    pub fn clock(&self) -> Duration {
        self.clock
    }
}

impl Renderer for EffectRenderer {
    fn render(&mut self, elapsed: Duration, target: &mut RenderTarget) {
        self.clock += elapsed;
        let color = self.effect.evaluate(self.clock.as_secs_f64() * 1000.0);
        match &self.keys {
            None => target.fill(color),
            Some(keys) => {
                for &key in keys {
                    if let Some(slot) = target.get_mut(key) {
                        *slot = color;
                    }
                }
            }
        }
    }
}
