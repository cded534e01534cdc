//! Runs the sample against the recording device with simulated time.

use std::time::Duration;

use anyhow::{Result, bail};
use cadence_engine::core::{AppControl, Application, LoopStats};
use cadence_engine::device::RecordingDevice;
use cadence_engine::device::recording::Violation;
use cadence_engine::staging;
use cadence_engine::time::{ClockConfig, ManualTimeSource, SimulationClock};

use crate::scene::{self, SceneConfig};

/// Extra loop iterations allowed on top of the per-frame budget.
const SLACK_TICKS: u64 = 16;

/// Iterations one frame may need before the interval counts as too short.
const MAX_TICKS_PER_FRAME: u128 = 1_000_000;

/// Options of a headless run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlessOptions {
    /// Stop after this many rendered frames.
    pub frames: u64,
    /// Simulated wall time between loop iterations.
    pub frame_interval: Duration,
    pub clock: ClockConfig,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            frames: 120,
            frame_interval: Duration::from_micros(16_667),
            clock: ClockConfig::default(),
        }
    }
}

/// Outcome of a headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessReport {
    pub stats: LoopStats,
    pub submitted: u64,
    pub presented: u64,
    pub resources_created: usize,
    pub resources_destroyed: usize,
    pub violations: Vec<Violation>,
}

/// Builds the scene on a [`RecordingDevice`], runs the loop for the
/// requested number of frames, then tears everything down.
///
/// Fails if the device observed any contract violation, or if the frames
/// are not rendered within twice the iterations the step size calls for.
pub fn run(scene: &SceneConfig, options: HeadlessOptions) -> Result<HeadlessReport> {
    let time = ManualTimeSource::new();
    let clock = SimulationClock::new(time.clone(), options.clock);
    let max_ticks = tick_budget(clock.dt(), options.frame_interval, options.frames)?;
    let device = RecordingDevice::new().require_staging(true);
    let mut app = Application::build(device, clock, |d, g| scene::build(d, g, scene))?;
    let resources_created = app.graph().len();

    while app.stats().frames_rendered < options.frames {
        if app.stats().ticks >= max_ticks {
            let rendered = app.stats().frames_rendered;
            app.close()?;
            bail!("only {rendered} of {} frames rendered in {max_ticks} iterations", options.frames);
        }
        time.advance(options.frame_interval);
        if app.frame(|| false)? == AppControl::Exit {
            break;
        }
    }

    let stats = app.stats();
    let (submitted, presented) = (app.device().submitted_count(), app.device().present_count());
    let device = app.close()?;
    let report = HeadlessReport {
        stats,
        submitted,
        presented,
        resources_created,
        resources_destroyed: device.destroyed().len(),
        violations: device.violations().to_vec(),
    };
    log::info!(
        "headless run: {} updates, {} frames, {} presents, {} resources",
        stats.updates,
        stats.frames_rendered,
        presented,
        resources_created
    );

    if staging::live_scopes() != 0 {
        bail!("{} staging scopes still open after shutdown", staging::live_scopes());
    }
    if let Some(first) = report.violations.first() {
        bail!("{} device contract violations, first: {first:?}", report.violations.len());
    }
    Ok(report)
}

/// Loop iterations allowed for `frames` frames when each iteration advances
/// time by `interval` and a frame needs one step of `dt`.
fn tick_budget(dt: Duration, interval: Duration, frames: u64) -> Result<u64> {
    if interval.is_zero() {
        bail!("headless frame interval must be non-zero");
    }
    let per_frame = dt.as_nanos().div_ceil(interval.as_nanos());
    if per_frame > MAX_TICKS_PER_FRAME {
        bail!("frame interval {interval:?} is too short for a {dt:?} step");
    }
    // per_frame fits in u64 after the check above.
    Ok((per_frame as u64).saturating_mul(2).saturating_mul(frames).saturating_add(SLACK_TICKS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_run_renders_and_tears_down() {
        let scene = SceneConfig::procedural(8, 8);
        let options = HeadlessOptions { frames: 3, ..HeadlessOptions::default() };
        let report = run(&scene, options).unwrap();
        assert_eq!(report.stats.frames_rendered, 3);
        assert_eq!(report.presented, 3);
        assert_eq!(report.resources_destroyed, report.resources_created);
    }

    #[test]
    fn intervals_shorter_than_the_step_still_finish() {
        let scene = SceneConfig::procedural(8, 8);
        let options = HeadlessOptions {
            frames: 2,
            frame_interval: Duration::from_millis(1),
            ..HeadlessOptions::default()
        };
        let report = run(&scene, options).unwrap();
        assert_eq!(report.stats.frames_rendered, 2);
        assert!(report.stats.ticks >= 20);
    }

    #[test]
    fn zero_interval_is_an_error() {
        let scene = SceneConfig::procedural(8, 8);
        let options = HeadlessOptions { frame_interval: Duration::ZERO, ..HeadlessOptions::default() };
        let err = run(&scene, options).unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn interval_far_below_the_step_is_an_error() {
        let scene = SceneConfig::procedural(8, 8);
        let options = HeadlessOptions {
            frames: 1,
            frame_interval: Duration::from_nanos(1),
            clock: ClockConfig {
                dt: Duration::from_secs(3600),
                max_frame_time: Duration::from_secs(3600),
            },
        };
        let err = run(&scene, options).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn budget_scales_with_frames_and_step_ratio() {
        let ms = Duration::from_millis;
        assert_eq!(tick_budget(ms(10), ms(16), 120).unwrap(), 240 + SLACK_TICKS);
        assert_eq!(tick_budget(ms(10), ms(1), 3).unwrap(), 60 + SLACK_TICKS);
        assert_eq!(tick_budget(ms(10), ms(3), 1).unwrap(), 8 + SLACK_TICKS);
        assert_eq!(tick_budget(ms(10), ms(16), u64::MAX).unwrap(), u64::MAX);
    }
}
