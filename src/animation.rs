//! Periodic animation thread.
//!
//! `AnimationLoop` runs an [`Animation`] on a dedicated thread at a fixed
//! rate. Each tick gets the time elapsed since the previous one and returns
//! whether to keep going. Ticks never overlap. Once the animation returns
//! `false`, or a stop is requested, the thread exits for good.
//!
//! The thread runs a current-thread `tokio` runtime: ticks come from
//! `tokio::time::interval` with missed ticks skipped, and a stop request
//! wakes the thread through a `Notify`.
//!
//! ```text
//! start() ──► on_start() ──► render(0) ──► tick ──► render(dt) ──► ...
//!                 │false          │false                   │false / stop
//!                 ▼               ▼                        ▼
//!              Stopped         Stopped                  Stopped
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::StartError;

/// Highest accepted tick rate
pub const MAX_FPS: u32 = 1000;

/// Work driven by an [`AnimationLoop`]
pub trait Animation: Send + 'static {
    /// Called once on the animation thread before the first tick.
    /// Returning `false` stops the loop without ticking.
    fn on_start(&mut self) -> bool {
        true
    }

    /// Run one tick. Returning `false` stops the loop.
    fn render(&mut self, elapsed: Duration) -> bool;
}

/// Lifecycle of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Created, thread not started
    Constructed = 0,
    /// Thread started and ticking
    Running = 1,
    /// Thread finished; terminal
    Stopped = 2,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Constructed,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// State shared between the handle and the animation thread
struct Shared {
    stop_requested: AtomicBool,
    stop: Notify,
    state: AtomicU8,
}

impl Shared {
    fn set_state(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn stopped(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Handle to a running animation thread.
///
/// Dropping the handle stops the thread and waits for it.
pub struct AnimationLoop {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    fps: u32,
}

impl AnimationLoop {
    /// Spawn the animation thread and start ticking at `fps`.
    pub fn start<A: Animation>(animation: A, fps: u32) -> Result<Self, StartError> {
        let period = tick_period(fps)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let shared = Arc::new(Shared {
            stop_requested: AtomicBool::new(false),
            stop: Notify::new(),
            state: AtomicU8::new(LoopState::Constructed as u8),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("render-loop".into())
            .spawn(move || run_thread(runtime, animation, period, &thread_shared))?;

        Ok(Self {
            shared,
            thread: Some(thread),
            fps,
        })
    }

    /// Target tick rate
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// True until the thread has stopped
    pub fn is_running(&self) -> bool {
        self.state() != LoopState::Stopped
    }

    /// Ask the thread to stop after the tick in progress, without waiting.
    pub fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        // Stores a permit if the thread is not waiting yet
        self.shared.stop.notify_one();
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to stop on its own (animation returned `false`).
    pub fn wait(&mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("render thread panicked");
            }
        }
    }
}

impl Drop for AnimationLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Duration of one tick at `fps`
pub fn tick_period(fps: u32) -> Result<Duration, StartError> {
    if fps == 0 || fps > MAX_FPS {
        return Err(StartError::InvalidRate(fps));
    }
    Ok(Duration::from_nanos(1_000_000_000 / u64::from(fps)))
}

/// Marks the loop stopped when the thread exits, panics included
struct StoppedOnExit<'a>(&'a Shared);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_state(LoopState::Stopped);
    }
}

fn run_thread<A: Animation>(runtime: Runtime, animation: A, period: Duration, shared: &Shared) {
    shared.set_state(LoopState::Running);
    let _exit = StoppedOnExit(shared);
    runtime.block_on(run(animation, period, shared));
}

async fn run<A: Animation>(mut animation: A, period: Duration, shared: &Shared) {
    if shared.stopped() || !animation.on_start() {
        debug!("animation did not start");
        return;
    }

    info!(period_ms = period.as_secs_f64() * 1000.0, "animation started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;
    let mut last: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            () = shared.stop.notified() => break,
            _ = interval.tick() => {
                let now = Instant::now();
                let elapsed = last.map_or(Duration::ZERO, |last| now - last);
                last = Some(now);

                ticks += 1;
                if !animation.render(elapsed) {
                    debug!(ticks, "animation requested stop");
                    break;
                }
            }
        }
    }

    info!(ticks, "animation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct Counter {
        ticks: Arc<AtomicUsize>,
        limit: usize,
        elapsed: Arc<parking_lot::Mutex<Vec<Duration>>>,
    }

    impl Animation for Counter {
        fn render(&mut self, elapsed: Duration) -> bool {
            self.elapsed.lock().push(elapsed);
            self.ticks.fetch_add(1, Ordering::SeqCst) + 1 < self.limit
        }
    }

    fn counter(limit: usize) -> (Counter, Arc<AtomicUsize>, Arc<parking_lot::Mutex<Vec<Duration>>>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let elapsed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        (
            Counter {
                ticks: Arc::clone(&ticks),
                limit,
                elapsed: Arc::clone(&elapsed),
            },
            ticks,
            elapsed,
        )
    }

    #[test]
    fn test_stops_when_animation_returns_false() {
        let (anim, ticks, elapsed) = counter(3);
        let mut lp = AnimationLoop::start(anim, 200).unwrap();
        lp.wait();

        assert_eq!(lp.state(), LoopState::Stopped);
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        let elapsed = elapsed.lock();
        assert_eq!(elapsed[0], Duration::ZERO);
        assert!(elapsed[1] > Duration::ZERO);
    }

    #[test]
    fn test_stop_cancels_running_loop() {
        let (anim, ticks, _) = counter(usize::MAX);
        let mut lp = AnimationLoop::start(anim, 1).unwrap();

        // At 1 fps the thread spends almost all its time waiting for a tick
        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        lp.stop();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(lp.state(), LoopState::Stopped);
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_start_false_never_ticks() {
        struct Refuses(Arc<AtomicUsize>);
        impl Animation for Refuses {
            fn on_start(&mut self) -> bool {
                false
            }
            fn render(&mut self, _: Duration) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                true
            }
        }

        let ticks = Arc::new(AtomicUsize::new(0));
        let mut lp = AnimationLoop::start(Refuses(Arc::clone(&ticks)), 100).unwrap();
        lp.wait();
        assert_eq!(lp.state(), LoopState::Stopped);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_rate() {
        let (anim, _, _) = counter(1);
        assert!(matches!(
            AnimationLoop::start(anim, 0),
            Err(StartError::InvalidRate(0))
        ));
        assert!(tick_period(MAX_FPS + 1).is_err());
        assert_eq!(tick_period(50).unwrap(), Duration::from_millis(20));
    }
}
