//! Error types for the render engine, layouts and configuration

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

/// A color buffer could not be allocated
#[derive(Error, Debug)]
#[error("Failed to allocate color buffer for {size} keys ({bytes} bytes)")]
pub struct AllocationError {
    pub size: usize,
    pub bytes: usize,
    #[source]
    pub source: Option<TryReserveError>,
}

/// Errors from starting an animation or render loop
#[derive(Error, Debug)]
pub enum StartError {
    #[error("Invalid tick rate {0} fps (expected 1-{max})", max = crate::animation::MAX_FPS)]
    InvalidRate(u32),

    #[error("Loop already started")]
    AlreadyStarted,

    #[error("Failed to start render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors from loading a layout description
#[derive(Error, Debug)]
pub enum LayoutError {
    /// The document is malformed; `line` is 1-based
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layout not found: {0}")]
    NotFound(String),
}

impl LayoutError {
    /// Source line for parse errors
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Parse { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Errors from loading or resolving effects
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid effect library: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unresolved variable: ${0}")]
    UnresolvedVariable(String),

    #[error("Invalid color for {context}: {value}")]
    InvalidColor { context: String, value: String },

    #[error("Effect {effect}: keyframe times must not decrease ({at} ms after {previous} ms)")]
    KeyframeOrder {
        effect: String,
        previous: f64,
        at: f64,
    },
}

/// Errors from loading the daemon configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Key index {index} out of range for {key_count} keys")]
    KeyOutOfRange { index: usize, key_count: usize },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
