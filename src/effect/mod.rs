//! Keyframe-based LED effects.
//!
//! Effects are defined in TOML with keyframes that specify time, brightness,
//! easing and an optional color. Colors may be `$name` variables so one
//! definition serves as a template; they are bound when the effect is
//! resolved for a renderer.
//!
//! # Example TOML
//!
//! ```toml
//! [breathe]
//! color = "$color"
//! keyframes = [
//!     { t = 0,    v = 0.0, easing = "EaseInOut" },
//!     { t = 1000, v = 1.0, easing = "EaseInOut" },
//!     { t = 2000, v = 0.0 },
//! ]
//! ```

mod renderer;
mod resolve;

pub use renderer::EffectRenderer;
pub use resolve::{required_variables, resolve, Easing, ResolvedEffect, ResolvedKeyframe};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EffectError;

// ── TOML definition types ────────────────────────────────────────────

/// Effect definition as loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDef {
    #[serde(skip)]
    pub name: String,
    /// Default color or `$variable` name.
    pub color: Option<String>,
    #[serde(default)]
    pub keyframes: Vec<KeyframeDef>,
    /// Special mode (only "rainbow" is known).
    pub mode: Option<String>,
    /// Hue turns per cycle in rainbow mode.
    pub speed: Option<f32>,
    pub description: Option<String>,
}

/// A single keyframe in an effect definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyframeDef {
    /// Time in ms from the start of the cycle.
    pub t: f64,
    /// Brightness 0.0-1.0.
    pub v: f64,
    /// Per-keyframe color override (literal or `$variable`).
    pub color: Option<String>,
    /// Easing towards the *next* keyframe.
    #[serde(default = "default_easing")]
    pub easing: String,
}

fn default_easing() -> String {
    "Linear".to_string()
}

/// Named collection of effects.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EffectLibrary {
    #[serde(flatten)]
    pub effects: BTreeMap<String, EffectDef>,
}

impl EffectLibrary {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, EffectError> {
        let content = std::fs::read_to_string(path).map_err(|source| EffectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, EffectError> {
        let mut lib: EffectLibrary = toml::from_str(content)?;
        for (name, def) in &mut lib.effects {
            def.name = name.clone();
        }
        Ok(lib)
    }

    /// The built-in effects
    pub fn builtin() -> Self {
        // DEFAULT_EFFECTS_TOML is covered by tests
        Self::from_toml(DEFAULT_EFFECTS_TOML).unwrap_or_default()
    }

    /// Load the user's library, writing the built-in one first if there is none.
    pub fn load_default() -> Result<Self, EffectError> {
        let path = default_effects_path();
        if !path.exists() {
            let io_err = |source| EffectError::Io {
                path: path.clone(),
                source,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            std::fs::write(&path, DEFAULT_EFFECTS_TOML).map_err(io_err)?;
            info!(path = %path.display(), "created default effects library");
        }
        Self::load(&path)
    }

    /// Get an effect by name.
    pub fn get(&self, name: &str) -> Option<&EffectDef> {
        self.effects.get(name)
    }

    /// All effect names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.effects.keys().map(|s| s.as_str()).collect()
    }
}

/// Path of the user's effects library
pub fn default_effects_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("keylight")
        .join("effects.toml")
}

// ── Built-in effects ─────────────────────────────────────────────────

pub const DEFAULT_EFFECTS_TOML: &str = r##"# keylight effects library
# Each section defines a named effect with keyframes.
# Colors can be literals ("red", "#FF0000") or variables ("$color").
# Variables are bound per renderer in config.toml (vars = { color = "red" }).

[breathe]
color = "$color"
description = "Smooth fade in/out"
keyframes = [
    { t = 0,    v = 0.0, easing = "EaseInOut" },
    { t = 1000, v = 1.0, easing = "EaseInOut" },
    { t = 2000, v = 0.0 },
]

[flash]
color = "$color"
description = "On/off blink"
keyframes = [
    { t = 0,    v = 1.0, easing = "Hold" },
    { t = 500,  v = 0.0, easing = "Hold" },
    { t = 1000, v = 1.0 },
]

[pulse]
color = "$color"
description = "Quick flash then slow fade"
keyframes = [
    { t = 0,   v = 0.0, easing = "EaseOutQuad" },
    { t = 80,  v = 1.0, easing = "EaseInQuint" },
    { t = 800, v = 0.0 },
]

[solid]
color = "$color"
description = "Constant color"

[off]
color = "black"
description = "All LEDs off"

[police]
description = "Red/blue alternating flash"
keyframes = [
    { t = 0,   color = "red",  v = 1.0, easing = "Hold" },
    { t = 200, color = "blue", v = 1.0, easing = "Hold" },
    { t = 400, color = "red",  v = 1.0 },
]

[rainbow]
mode = "rainbow"
speed = 1.0
description = "Hue rotation"
keyframes = [
    { t = 0,    v = 1.0 },
    { t = 3000, v = 1.0 },
]
"##;
