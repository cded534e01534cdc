use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Monotonic tick counter with a fixed frequency.
pub trait TimeSource {
    /// Current tick count. Never decreases.
    fn counter(&self) -> u64;

    /// Ticks per second.
    fn frequency(&self) -> u64;
}

/// Converts a tick delta into a `Duration` without going through floats.
pub fn ticks_to_duration(ticks: u64, frequency: u64) -> Duration {
    if frequency == 0 {
        return Duration::ZERO;
    }
    let nanos = ticks as u128 * NANOS_PER_SEC as u128 / frequency as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Time source backed by `Instant`, in nanoseconds.
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn counter(&self) -> u64 {
        self.origin.elapsed().as_nanos().min(u64::MAX as u128) as u64
    }

    fn frequency(&self) -> u64 {
        NANOS_PER_SEC
    }
}

/// Hand-driven time source.
///
/// Clones share the same counter, so a test can keep one clone and advance
/// the clock that owns the other.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    ticks: Rc<Cell<u64>>,
    frequency: u64,
}

impl ManualTimeSource {
    /// Nanosecond resolution.
    pub fn new() -> Self {
        Self::with_frequency(NANOS_PER_SEC)
    }

    pub fn with_frequency(frequency: u64) -> Self {
        debug_assert!(frequency > 0);
        Self { ticks: Rc::new(Cell::new(0)), frequency }
    }

    pub fn advance_ticks(&self, ticks: u64) {
        self.ticks.set(self.ticks.get().saturating_add(ticks));
    }

    pub fn advance(&self, by: Duration) {
        let ticks = by.as_nanos() * self.frequency as u128 / NANOS_PER_SEC as u128;
        self.advance_ticks(ticks.min(u64::MAX as u128) as u64);
    }

    /// Advances by `secs`, rounded to the nearest nanosecond.
    pub fn advance_secs(&self, secs: f64) {
        let nanos = (secs.max(0.0) * NANOS_PER_SEC as f64).round() as u64;
        self.advance(Duration::from_nanos(nanos));
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn counter(&self) -> u64 {
        self.ticks.get()
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }
}
