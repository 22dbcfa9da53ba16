//! LED current limiting.
//!
//! WS2812-style model: each channel draws [`MA_PER_CHANNEL`] mA at value 255,
//! so a key draws `(R + G + B) / 255 * MA_PER_CHANNEL`. When the frame's
//! estimate exceeds the budget, every key is scaled down by the same factor.

use std::time::Duration;

use keylight_device::RgbaColor;
use tracing::debug;

use crate::render_target::RenderTarget;
use crate::renderer::Renderer;

/// Estimated current per channel at full brightness (value 255)
pub const MA_PER_CHANNEL: f32 = 20.0;

/// Estimated current draw of `colors` in milliamps
pub fn estimate_ma(colors: &[RgbaColor]) -> f32 {
    let ma_per_unit = MA_PER_CHANNEL / 255.0;
    colors
        .iter()
        .map(|c| (c.r as f32 + c.g as f32 + c.b as f32) * ma_per_unit)
        .sum()
}

/// Scale `colors` to stay within `budget_ma`; 0 means unlimited.
/// Returns `(estimated_ma_before_scaling, was_scaled)`.
pub fn apply_power_budget(colors: &mut [RgbaColor], budget_ma: u32) -> (f32, bool) {
    let total_ma = estimate_ma(colors);
    if budget_ma == 0 || total_ma <= budget_ma as f32 {
        return (total_ma, false);
    }

    let factor = budget_ma as f32 / total_ma;
    for color in colors.iter_mut() {
        *color = color.scale(factor);
    }
    (total_ma, true)
}

/// Renderer that caps the frame painted by the renderers before it.
///
/// Register it last so it sees the whole frame. It scales the target in
/// place, so every key must be repainted on each tick before it runs.
#[derive(Debug, Clone, Copy)]
pub struct PowerBudget {
    budget_ma: u32,
    limiting: bool,
}

impl PowerBudget {
    pub fn new(budget_ma: u32) -> Self {
        Self {
            budget_ma,
            limiting: false,
        }
    }

    pub fn budget_ma(&self) -> u32 {
        self.budget_ma
    }
}

impl Renderer for PowerBudget {
    fn render(&mut self, _elapsed: Duration, target: &mut RenderTarget) {
        let (estimate, scaled) = apply_power_budget(target, self.budget_ma);
        if scaled != self.limiting {
            debug!(
                estimate_ma = estimate,
                budget_ma = self.budget_ma,
                limiting = scaled,
                "power budget"
            );
            self.limiting = scaled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate() {
        let colors = [RgbaColor::WHITE, RgbaColor::RED, RgbaColor::BLACK];
        assert!((estimate_ma(&colors) - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_under_budget_untouched() {
        let mut colors = [RgbaColor::RED; 4];
        let (total, scaled) = apply_power_budget(&mut colors, 100);
        assert!(!scaled);
        assert!((total - 80.0).abs() < 0.01);
        assert!(colors.iter().all(|&c| c == RgbaColor::RED));
    }

    #[test]
    fn test_over_budget_scaled() {
        let mut colors = [RgbaColor::WHITE; 10];
        let (total, scaled) = apply_power_budget(&mut colors, 300);
        assert!(scaled);
        assert!((total - 600.0).abs() < 0.01);
        assert!(estimate_ma(&colors) <= 300.0);
        assert_eq!(colors[0].a, 255);
    }

    #[test]
    fn test_zero_budget_unlimited() {
        let mut colors = [RgbaColor::WHITE; 100];
        assert!(!apply_power_budget(&mut colors, 0).1);
        assert_eq!(colors[0], RgbaColor::WHITE);
    }

    #[test]
    fn test_renderer_caps_frame() {
        let mut target = RenderTarget::new(20).unwrap();
        target.fill(RgbaColor::WHITE);
        PowerBudget::new(120).render(Duration::ZERO, &mut target);
        assert!(estimate_ma(&target) <= 120.0);
        assert!(target[0].r > 0);
    }
}
