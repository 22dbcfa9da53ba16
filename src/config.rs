//! Daemon configuration
//!
//! Loaded from `~/.config/keylight/config.toml`. A missing file yields the
//! defaults. Renderer entries name an effect from the effect library and
//! the keys it paints, either by glyph (needs a layout) or by index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use keylight_device::RgbaColor;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::effect::{self, EffectLibrary, EffectRenderer, ResolvedEffect};
use crate::error::ConfigError;
use crate::layout::LayoutDescription;
use crate::power::PowerBudget;
use crate::renderer::{handle, RendererHandle};

/// Which device the daemon drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Live preview in the terminal
    #[default]
    Terminal,
    /// In-memory device, no output
    Simulated,
}

/// A key named in a renderer entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    /// Buffer index
    Index(usize),
    /// Glyph from the layout, case-insensitive
    Name(String),
}

/// One `[[renderers]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Effect name in the library
    pub effect: String,
    /// Keys to paint; empty paints all
    #[serde(default)]
    pub keys: Vec<KeySpec>,
    /// Values for the effect's `$variables`
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Render loop tick rate
    pub fps: u32,
    pub device: DeviceKind,
    /// Key count when no layout is configured
    pub key_count: usize,
    /// Terminal preview grid width
    pub columns: usize,
    /// Layout file path or name searched in the data directories
    pub layout: Option<String>,
    /// Effects library; defaults to `~/.config/keylight/effects.toml`
    pub effects: Option<PathBuf>,
    /// Frame current limit in mA; 0 disables the limiter
    pub power_budget_ma: u32,
    pub renderers: Vec<RendererConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fps: 30,
            device: DeviceKind::Terminal,
            key_count: 96,
            columns: 16,
            layout: None,
            effects: None,
            power_budget_ma: 0,
            renderers: Vec::new(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keylight")
            .join("config.toml")
    }

    /// Load config from a file, or return the defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The configured layout, if any
    pub fn load_layout(&self) -> Result<Option<LayoutDescription>, ConfigError> {
        match &self.layout {
            Some(name) => Ok(Some(LayoutDescription::load_file(name)?)),
            None => Ok(None),
        }
    }

    /// The configured effect library
    pub fn load_effects(&self) -> Result<EffectLibrary, ConfigError> {
        let library = match &self.effects {
            Some(path) => EffectLibrary::load(path)?,
            None => EffectLibrary::load_default()?,
        };
        Ok(library)
    }

    /// Build the renderer stack described by `[[renderers]]`, in order, with
    /// the power limiter last when a budget is set.
    ///
    /// The limiter scales the frame in place, so with a budget every key must
    /// be repainted each tick: a black backdrop goes under the configured
    /// renderers.
    pub fn build_renderers(
        &self,
        library: &EffectLibrary,
        layout: Option<&LayoutDescription>,
        key_count: usize,
    ) -> Result<Vec<RendererHandle>, ConfigError> {
        let mut renderers = Vec::with_capacity(self.renderers.len() + 2);
        if self.power_budget_ma > 0 {
            renderers.push(handle(EffectRenderer::new(ResolvedEffect::solid(
                RgbaColor::BLACK,
            ))));
        }
        for entry in &self.renderers {
            let def = library
                .get(&entry.effect)
                .ok_or_else(|| ConfigError::UnknownEffect(entry.effect.clone()))?;
            let resolved = effect::resolve(def, &entry.vars)?;
            let renderer = match resolve_keys(&entry.keys, layout, key_count)? {
                Some(keys) => EffectRenderer::with_keys(resolved, keys),
                None => EffectRenderer::new(resolved),
            };
            debug!(effect = %entry.effect, keys = entry.keys.len(), "configured renderer");
            renderers.push(handle(renderer));
        }

        if self.power_budget_ma > 0 {
            info!(budget_ma = self.power_budget_ma, "power budget enabled");
            renderers.push(handle(PowerBudget::new(self.power_budget_ma)));
        }
        Ok(renderers)
    }
}

/// Map key specs to buffer indices; an empty list means every key
pub fn resolve_keys(
    specs: &[KeySpec],
    layout: Option<&LayoutDescription>,
    key_count: usize,
) -> Result<Option<Vec<usize>>, ConfigError> {
    if specs.is_empty() {
        return Ok(None);
    }

    let mut keys = Vec::with_capacity(specs.len());
    for spec in specs {
        let index = match spec {
            KeySpec::Index(index) => *index,
            KeySpec::Name(name) => match layout.and_then(|l| l.find(name)) {
                Some(key) => key.index,
                None => name
                    .parse::<usize>()
                    .map_err(|_| ConfigError::UnknownKey(name.clone()))?,
            },
        };
        if index >= key_count {
            return Err(ConfigError::KeyOutOfRange { index, key_count });
        }
        keys.push(index);
    }
    Ok(Some(keys))
}
