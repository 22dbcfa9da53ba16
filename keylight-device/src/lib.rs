//! Device abstraction for per-key RGB keyboard lighting
//!
//! A render loop talks to the keyboard only through the [`Device`] trait:
//!
//! ```text
//! [RenderLoop]                   ← diffs frames, emits ColorDirective batches
//!      |
//! [dyn Device]                   ← apply_directives + commit
//!      |
//! [SimulatedDevice / TerminalDevice / hardware backend]
//! ```
//!
//! Hardware backends (HID, dongle, ...) live outside this crate and only need
//! to implement the trait.

pub mod color;
pub mod error;
pub mod simulated;
pub mod terminal;

pub use color::RgbaColor;
pub use error::DeviceError;
pub use simulated::{SimulatedDevice, SimulatedProbe};
pub use terminal::TerminalDevice;

/// A contiguous run of keys that all switch to the same color.
///
/// `first` and `last` are inclusive key indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorDirective {
    pub first: usize,
    pub last: usize,
    pub color: RgbaColor,
}

impl ColorDirective {
    pub fn new(first: usize, last: usize, color: RgbaColor) -> Self {
        debug_assert!(first <= last);
        Self { first, last, color }
    }

    /// Directive for a single key
    pub fn single(index: usize, color: RgbaColor) -> Self {
        Self::new(index, index, color)
    }

    /// Number of keys covered
    pub fn span(&self) -> usize {
        self.last - self.first + 1
    }

    /// Key indices covered by this directive
    pub fn keys(&self) -> std::ops::RangeInclusive<usize> {
        self.first..=self.last
    }
}

/// A keyboard whose per-key LEDs can be read and written.
///
/// A render loop assumes it is the only writer: nothing else may call
/// `apply_directives` or `commit` while a loop owns the device.
pub trait Device: Send {
    /// Human-readable name for logs
    fn name(&self) -> &str {
        "device"
    }

    /// Number of addressable keys
    fn key_count(&self) -> usize;

    /// Read the colors currently shown, one per key
    fn read_current_state(&mut self) -> Result<Vec<RgbaColor>, DeviceError>;

    /// Stage a batch of directives, in order
    fn apply_directives(&mut self, directives: &[ColorDirective]) -> Result<(), DeviceError>;

    /// Make staged directives visible
    fn commit(&mut self) -> Result<(), DeviceError>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn key_count(&self) -> usize {
        (**self).key_count()
    }

    fn read_current_state(&mut self) -> Result<Vec<RgbaColor>, DeviceError> {
        (**self).read_current_state()
    }

    fn apply_directives(&mut self, directives: &[ColorDirective]) -> Result<(), DeviceError> {
        (**self).apply_directives(directives)
    }

    fn commit(&mut self) -> Result<(), DeviceError> {
        (**self).commit()
    }
}

/// Check a directive batch against a key count.
///
/// Backends call this before touching hardware so a bad batch fails as a
/// whole instead of half-applied.
pub fn check_directives(
    directives: &[ColorDirective],
    key_count: usize,
) -> Result<(), DeviceError> {
    match directives.iter().find(|d| d.last >= key_count || d.first > d.last) {
        Some(d) => Err(DeviceError::OutOfRange {
            first: d.first,
            last: d.last,
            key_count,
        }),
        None => Ok(()),
    }
}
