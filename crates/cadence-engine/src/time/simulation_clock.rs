use std::time::Duration;

use crate::core::AppControl;

use super::source::{SystemTimeSource, TimeSource, ticks_to_duration};

/// Fixed-step clock parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    /// Simulation step.
    pub dt: Duration,

    /// Upper bound on the real time credited for one frame.
    ///
    /// Stops a long stall (debugger, minimized window) from queueing an
    /// unbounded number of updates.
    pub max_frame_time: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            dt: Duration::from_millis(10),       // 0.01s
            max_frame_time: Duration::from_millis(250), // 0.25s
        }
    }
}

/// Smallest accepted fixed step.
pub const MIN_STEP: Duration = Duration::from_nanos(1);

/// Time passed to one fixed update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StepTime {
    /// Fixed step.
    pub dt: Duration,

    /// Simulation time at the start of this step.
    pub t: Duration,

    /// Monotonic step counter.
    pub step_index: u64,
}

impl StepTime {
    pub fn dt_secs(&self) -> f64 {
        self.dt.as_secs_f64()
    }

    pub fn t_secs(&self) -> f64 {
        self.t.as_secs_f64()
    }
}

/// Outcome of one clock tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Measured frame time before clamping.
    pub frame_time: Duration,

    /// Whether `frame_time` exceeded the clamp.
    pub clamped: bool,

    /// Fixed updates run this tick.
    pub steps: u32,

    /// Quit was signalled before or during the batch.
    pub quit_requested: bool,
}

impl TickReport {
    /// A frame is drawn only after at least one update, and never after quit.
    pub fn should_render(&self) -> bool {
        self.steps > 0 && !self.quit_requested
    }
}

/// Fixed-timestep accumulator.
///
/// Real time from the [`TimeSource`] is clamped and accumulated; every full
/// `dt` in the accumulator runs one update. Time is kept as `Duration`, so
/// step counts are exact integers of nanoseconds.
#[derive(Debug)]
pub struct SimulationClock<S: TimeSource = SystemTimeSource> {
    source: S,
    config: ClockConfig,
    last: u64,
    accumulator: Duration,
    t: Duration,
    step_index: u64,
}

impl SimulationClock<SystemTimeSource> {
    /// Clock over the system monotonic timer with default parameters.
    pub fn system() -> Self {
        Self::new(SystemTimeSource::new(), ClockConfig::default())
    }
}

impl<S: TimeSource> SimulationClock<S> {
    /// A zero `dt` is raised to one nanosecond and `max_frame_time` to at
    /// least one step.
    pub fn new(source: S, mut config: ClockConfig) -> Self {
        if config.dt.is_zero() {
            log::warn!("zero fixed step raised to {:?}", MIN_STEP);
            config.dt = MIN_STEP;
        }
        config.max_frame_time = config.max_frame_time.max(config.dt);
        let last = source.counter();
        Self {
            source,
            config,
            last,
            accumulator: Duration::ZERO,
            t: Duration::ZERO,
            step_index: 0,
        }
    }

    pub fn config(&self) -> ClockConfig {
        self.config
    }

    pub fn dt(&self) -> Duration {
        self.config.dt
    }

    /// Unsimulated time carried to the next tick. Always `< dt` after a
    /// batch that was not interrupted by quit.
    pub fn accumulator(&self) -> Duration {
        self.accumulator
    }

    /// Total simulated time.
    pub fn t(&self) -> Duration {
        self.t
    }

    /// Fraction of a step left in the accumulator, for render interpolation.
    pub fn alpha(&self) -> f64 {
        self.accumulator.as_secs_f64() / self.config.dt.as_secs_f64()
    }

    pub fn steps_run(&self) -> u64 {
        self.step_index
    }

    /// Resets the time baseline.
    ///
    /// Useful after surface reconfigure events or when resuming from suspension.
    pub fn reset(&mut self) {
        self.last = self.source.counter();
    }

    /// Reads the time source and returns the time since the previous sample.
    pub fn sample_frame_time(&mut self) -> Duration {
        let now = self.source.counter();
        let ticks = now.saturating_sub(self.last);
        self.last = now;
        ticks_to_duration(ticks, self.source.frequency())
    }

    /// Adds `frame_time`, clamped to `max_frame_time`, to the accumulator.
    /// Returns the amount actually added.
    pub fn accumulate(&mut self, frame_time: Duration) -> Duration {
        let credited = frame_time.min(self.config.max_frame_time);
        if credited < frame_time {
            log::trace!(
                "frame time {:?} clamped to {:?}",
                frame_time,
                self.config.max_frame_time
            );
        }
        self.accumulator += credited;
        credited
    }

    /// Runs fixed updates while a full step is accumulated.
    ///
    /// `quit` is polled before each update; an update returning
    /// [`AppControl::Exit`] also ends the batch. Returns the number of
    /// updates run and whether quit was requested.
    pub fn run_steps(
        &mut self,
        mut quit: impl FnMut() -> bool,
        mut update: impl FnMut(StepTime) -> AppControl,
    ) -> (u32, bool) {
        let dt = self.config.dt;
        let mut steps = 0;
        while self.accumulator >= dt {
            if quit() {
                return (steps, true);
            }
            let control = update(StepTime { dt, t: self.t, step_index: self.step_index });
            self.t += dt;
            self.accumulator -= dt;
            self.step_index += 1;
            steps = steps.saturating_add(1);
            if control == AppControl::Exit {
                return (steps, true);
            }
        }
        (steps, false)
    }

    /// One loop iteration: sample, clamp, accumulate, then run the batch.
    pub fn tick(
        &mut self,
        mut quit: impl FnMut() -> bool,
        update: impl FnMut(StepTime) -> AppControl,
    ) -> TickReport {
        let frame_time = self.sample_frame_time();
        let clamped = frame_time > self.config.max_frame_time;
        if quit() {
            return TickReport { frame_time, clamped, steps: 0, quit_requested: true };
        }
        self.accumulate(frame_time);
        let (steps, quit_requested) = self.run_steps(quit, update);
        TickReport { frame_time, clamped, steps, quit_requested }
    }
}
