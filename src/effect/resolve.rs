//! Variable binding and evaluation of effect definitions

use std::collections::BTreeMap;

use keyframe::functions as ease;
use keyframe::EasingFunction;
use keylight_device::RgbaColor;
use tracing::warn;

use super::EffectDef;
use crate::error::EffectError;

/// Brightness curve between two keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Keep the previous value until the next keyframe
    Hold,
    EaseIn,
    EaseOut,
    EaseInOut,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
}

impl Easing {
    /// Look an easing up by its TOML name.
    ///
    /// Expo curves are not available and map to their quint counterparts.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Linear" => Self::Linear,
            "Hold" | "Step" => Self::Hold,
            "EaseIn" | "EaseInQuad" => Self::EaseIn,
            "EaseOut" | "EaseOutQuad" => Self::EaseOut,
            "EaseInOut" | "EaseInOutQuad" => Self::EaseInOut,
            "EaseInCubic" => Self::EaseInCubic,
            "EaseOutCubic" => Self::EaseOutCubic,
            "EaseInOutCubic" => Self::EaseInOutCubic,
            "EaseInQuart" => Self::EaseInQuart,
            "EaseOutQuart" => Self::EaseOutQuart,
            "EaseInOutQuart" => Self::EaseInOutQuart,
            "EaseInQuint" | "EaseInExpo" => Self::EaseInQuint,
            "EaseOutQuint" | "EaseOutExpo" => Self::EaseOutQuint,
            "EaseInOutQuint" | "EaseInOutExpo" => Self::EaseInOutQuint,
            _ => return None,
        })
    }

    /// Eased progress for `t` in [0, 1]
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::Hold => 0.0,
            Self::EaseIn => ease::EaseIn.y(t),
            Self::EaseOut => ease::EaseOut.y(t),
            Self::EaseInOut => ease::EaseInOut.y(t),
            Self::EaseInCubic => ease::EaseInCubic.y(t),
            Self::EaseOutCubic => ease::EaseOutCubic.y(t),
            Self::EaseInOutCubic => ease::EaseInOutCubic.y(t),
            Self::EaseInQuart => ease::EaseInQuart.y(t),
            Self::EaseOutQuart => ease::EaseOutQuart.y(t),
            Self::EaseInOutQuart => ease::EaseInOutQuart.y(t),
            Self::EaseInQuint => ease::EaseInQuint.y(t),
            Self::EaseOutQuint => ease::EaseOutQuint.y(t),
            Self::EaseInOutQuint => ease::EaseInOutQuint.y(t),
        }
    }
}

/// A keyframe with its color bound
#[derive(Debug, Clone)]
pub struct ResolvedKeyframe {
    pub t_ms: f64,
    pub color: RgbaColor,
    pub brightness: f64,
    pub easing: Easing,
}

/// Effect ready to be evaluated at any point in time.
///
/// Keyframed effects loop with a period equal to the time of their last
/// keyframe. A zero period means the effect is constant.
#[derive(Debug, Clone)]
pub struct ResolvedEffect {
    pub name: String,
    pub keyframes: Vec<ResolvedKeyframe>,
    pub duration_ms: f64,
    pub is_rainbow: bool,
    pub rainbow_speed: f32,
}

impl ResolvedEffect {
    /// A constant color
    pub fn solid(color: RgbaColor) -> Self {
        Self {
            name: "solid".into(),
            keyframes: vec![ResolvedKeyframe {
                t_ms: 0.0,
                color,
                brightness: 1.0,
                easing: Easing::Linear,
            }],
            duration_ms: 0.0,
            is_rainbow: false,
            rainbow_speed: 1.0,
        }
    }

    /// Color of the effect `elapsed_ms` after it started
    pub fn evaluate(&self, elapsed_ms: f64) -> RgbaColor {
        if self.is_rainbow {
            let cycle = if self.duration_ms > 0.0 {
                (elapsed_ms % self.duration_ms) / self.duration_ms
            } else {
                0.0
            };
            let hue = (cycle * 360.0 * self.rainbow_speed as f64) as f32;
            let brightness = self.brightness_at(elapsed_ms);
            return RgbaColor::from_hsv(hue, 1.0, brightness as f32);
        }

        match self.keyframes.as_slice() {
            [] => RgbaColor::BLACK,
            [only] => only.color.scale(only.brightness as f32),
            _ => {
                let color = self.color_at(elapsed_ms);
                color.scale(self.brightness_at(elapsed_ms) as f32)
            }
        }
    }

    /// Position within the cycle plus the keyframes around it and local progress
    fn locate(&self, elapsed_ms: f64) -> Option<(&ResolvedKeyframe, &ResolvedKeyframe, f64)> {
        let first = self.keyframes.first()?;
        if self.duration_ms <= 0.0 {
            return Some((first, first, 0.0));
        }

        let t = elapsed_ms.rem_euclid(self.duration_ms);
        let next = self
            .keyframes
            .iter()
            .position(|kf| t < kf.t_ms)
            .unwrap_or(self.keyframes.len());
        if next == 0 || next == self.keyframes.len() {
            let kf = if next == 0 { first } else { &self.keyframes[next - 1] };
            return Some((kf, kf, 0.0));
        }

        let (a, b) = (&self.keyframes[next - 1], &self.keyframes[next]);
        let span = b.t_ms - a.t_ms;
        if span <= 0.0 {
            return Some((a, a, 0.0));
        }
        Some((a, b, ((t - a.t_ms) / span).clamp(0.0, 1.0)))
    }

    fn brightness_at(&self, elapsed_ms: f64) -> f64 {
        match self.locate(elapsed_ms) {
            None => 1.0,
            Some((a, b, progress)) => {
                a.brightness + (b.brightness - a.brightness) * a.easing.apply(progress)
            }
        }
    }

    fn color_at(&self, elapsed_ms: f64) -> RgbaColor {
        match self.locate(elapsed_ms) {
            None => RgbaColor::BLACK,
            Some((a, b, progress)) => RgbaColor::lerp(a.color, b.color, progress as f32),
        }
    }
}

/// Bind the variables of `def` and build an evaluable effect.
///
/// `vars` maps variable names (without `$`) to color strings.
pub fn resolve(
    def: &EffectDef,
    vars: &BTreeMap<String, String>,
) -> Result<ResolvedEffect, EffectError> {
    let is_rainbow = def.mode.as_deref() == Some("rainbow");
    let rainbow_speed = def.speed.unwrap_or(1.0);

    if def.keyframes.is_empty() {
        let color = resolve_color(None, def.color.as_deref(), vars)?;
        return Ok(ResolvedEffect {
            name: def.name.clone(),
            is_rainbow,
            rainbow_speed,
            ..ResolvedEffect::solid(color)
        });
    }

    let mut keyframes: Vec<ResolvedKeyframe> = Vec::with_capacity(def.keyframes.len());
    for kf in &def.keyframes {
        if let Some(prev) = keyframes.last() {
            if kf.t < prev.t_ms {
                return Err(EffectError::KeyframeOrder {
                    effect: def.name.clone(),
                    previous: prev.t_ms,
                    at: kf.t,
                });
            }
        }
        let easing = Easing::from_name(&kf.easing).unwrap_or_else(|| {
            warn!(effect = %def.name, easing = %kf.easing, "unknown easing, using Linear");
            Easing::Linear
        });
        keyframes.push(ResolvedKeyframe {
            t_ms: kf.t,
            color: resolve_color(kf.color.as_deref(), def.color.as_deref(), vars)?,
            brightness: kf.v.clamp(0.0, 1.0),
            easing,
        });
    }

    let duration_ms = keyframes.last().map_or(0.0, |kf| kf.t_ms);
    Ok(ResolvedEffect {
        name: def.name.clone(),
        keyframes,
        duration_ms,
        is_rainbow,
        rainbow_speed,
    })
}

/// Per-keyframe color, else effect color, else black
fn resolve_color(
    kf_color: Option<&str>,
    effect_color: Option<&str>,
    vars: &BTreeMap<String, String>,
) -> Result<RgbaColor, EffectError> {
    let Some(s) = kf_color.or(effect_color) else {
        return Ok(RgbaColor::BLACK);
    };

    let (context, value) = match s.strip_prefix('$') {
        Some(var) => {
            let value = vars
                .get(var)
                .ok_or_else(|| EffectError::UnresolvedVariable(var.to_string()))?;
            (format!("${var}"), value.as_str())
        }
        None => ("color".to_string(), s),
    };
    RgbaColor::parse(value).ok_or_else(|| EffectError::InvalidColor {
        context,
        value: value.to_string(),
    })
}

/// Variables an effect references, in order of first use
pub fn required_variables(def: &EffectDef) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    let colors = def
        .color
        .iter()
        .chain(def.keyframes.iter().filter_map(|kf| kf.color.as_ref()));
    for color in colors {
        if let Some(name) = color.strip_prefix('$') {
            if !vars.iter().any(|v| v == name) {
                vars.push(name.to_string());
            }
        }
    }
    vars
}
