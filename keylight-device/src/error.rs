//! Device error types

use thiserror::Error;

/// Errors from reading or writing keyboard LED state
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Current LED state could not be read back
    #[error("Failed to read device state: {0}")]
    Read(String),

    /// Device returned a state of the wrong length
    #[error("Device reported {actual} colors, expected {expected}")]
    StateLength { expected: usize, actual: usize },

    /// A directive batch was rejected
    #[error("Failed to apply {count} directive(s): {reason}")]
    Apply { count: usize, reason: String },

    /// Directive addresses keys the device does not have
    #[error("Directive for keys {first}..={last} exceeds key count {key_count}")]
    OutOfRange {
        first: usize,
        last: usize,
        key_count: usize,
    },

    /// Applied directives could not be committed to the LEDs
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Terminal output error (preview device)
    #[error("Terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}
