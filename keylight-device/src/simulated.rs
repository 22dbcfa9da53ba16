//! In-memory keyboard for tests and dry runs.
//!
//! `SimulatedDevice` keeps a color per key and records every committed batch.
//! A `SimulatedProbe` shares that record so a test can inspect the device
//! after it has been moved into a render loop, and can inject failures.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{check_directives, ColorDirective, Device, DeviceError, RgbaColor};

#[derive(Debug, Default)]
struct SimState {
    colors: Vec<RgbaColor>,
    staged: Vec<ColorDirective>,
    batches: Vec<Vec<ColorDirective>>,
    reads: usize,
    apply_calls: usize,
    commit_calls: usize,
    fail_read: bool,
    fail_apply: bool,
    fail_commit: bool,
}

/// Simulated keyboard
pub struct SimulatedDevice {
    name: String,
    key_count: usize,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    /// Create a device with `key_count` keys, all black
    pub fn new(key_count: usize) -> Self {
        Self::with_colors(vec![RgbaColor::BLACK; key_count])
    }

    /// Create a device whose LEDs already show `colors`
    pub fn with_colors(colors: Vec<RgbaColor>) -> Self {
        let key_count = colors.len();
        Self {
            name: format!("simulated ({key_count} keys)"),
            key_count,
            state: Arc::new(Mutex::new(SimState {
                colors,
                ..SimState::default()
            })),
        }
    }

    /// Handle for inspecting this device from elsewhere
    pub fn probe(&self) -> SimulatedProbe {
        SimulatedProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Device for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn key_count(&self) -> usize {
        self.key_count
    }

    fn read_current_state(&mut self) -> Result<Vec<RgbaColor>, DeviceError> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.fail_read {
            return Err(DeviceError::Read("simulated read failure".into()));
        }
        Ok(state.colors.clone())
    }

    fn apply_directives(&mut self, directives: &[ColorDirective]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.apply_calls += 1;
        if state.fail_apply {
            return Err(DeviceError::Apply {
                count: directives.len(),
                reason: "simulated apply failure".into(),
            });
        }
        check_directives(directives, self.key_count)?;
        state.staged.extend_from_slice(directives);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.commit_calls += 1;
        if state.fail_commit {
            state.staged.clear();
            return Err(DeviceError::Commit("simulated commit failure".into()));
        }

        let batch = std::mem::take(&mut state.staged);
        for directive in &batch {
            for key in directive.keys() {
                state.colors[key] = directive.color;
            }
        }
        trace!(directives = batch.len(), "simulated commit");
        state.batches.push(batch);
        Ok(())
    }
}

/// Shared view of a [`SimulatedDevice`]
#[derive(Clone)]
pub struct SimulatedProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedProbe {
    /// Colors currently shown
    pub fn colors(&self) -> Vec<RgbaColor> {
        self.state.lock().colors.clone()
    }

    /// Every successfully committed batch, oldest first
    pub fn batches(&self) -> Vec<Vec<ColorDirective>> {
        self.state.lock().batches.clone()
    }

    /// Total directives across all committed batches
    pub fn directive_count(&self) -> usize {
        self.state.lock().batches.iter().map(Vec::len).sum()
    }

    /// Number of `read_current_state` calls
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Number of `apply_directives` calls, failed ones included
    pub fn apply_count(&self) -> usize {
        self.state.lock().apply_calls
    }

    /// Number of `commit` calls, failed ones included
    pub fn commit_count(&self) -> usize {
        self.state.lock().commit_calls
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_read = fail;
    }

    pub fn fail_apply(&self, fail: bool) {
        self.state.lock().fail_apply = fail;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.state.lock().fail_commit = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_applies_staged_batch() {
        let mut dev = SimulatedDevice::new(4);
        let probe = dev.probe();

        dev.apply_directives(&[ColorDirective::new(1, 2, RgbaColor::RED)])
            .unwrap();
        // Nothing visible until commit
        assert_eq!(probe.colors()[1], RgbaColor::BLACK);

        dev.commit().unwrap();
        assert_eq!(
            probe.colors(),
            vec![
                RgbaColor::BLACK,
                RgbaColor::RED,
                RgbaColor::RED,
                RgbaColor::BLACK
            ]
        );
        assert_eq!(probe.batches().len(), 1);
        assert_eq!(probe.directive_count(), 1);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut dev = SimulatedDevice::new(4);
        let err = dev
            .apply_directives(&[ColorDirective::new(2, 4, RgbaColor::RED)])
            .unwrap_err();
        assert!(matches!(err, DeviceError::OutOfRange { .. }));
    }

    #[test]
    fn test_injected_failures() {
        let mut dev = SimulatedDevice::with_colors(vec![RgbaColor::GREEN; 3]);
        let probe = dev.probe();

        probe.fail_reads(true);
        assert!(dev.read_current_state().is_err());
        probe.fail_reads(false);
        assert_eq!(dev.read_current_state().unwrap(), vec![RgbaColor::GREEN; 3]);

        probe.fail_commit(true);
        dev.apply_directives(&[ColorDirective::single(0, RgbaColor::RED)])
            .unwrap();
        assert!(dev.commit().is_err());
        assert_eq!(probe.colors()[0], RgbaColor::GREEN);
        assert_eq!(probe.commit_count(), 1);
        assert!(probe.batches().is_empty());
    }
}
