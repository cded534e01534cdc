//! Time subsystem.
//!
//! Provides the fixed-timestep simulation clock without coupling to the runtime.
//! Intended usage:
//! - one `SimulationClock` per application loop
//! - call `tick()` once per loop iteration; render only when the report says so

mod simulation_clock;
mod source;

pub use simulation_clock::{ClockConfig, MIN_STEP, SimulationClock, StepTime, TickReport};
pub use source::{ManualTimeSource, SystemTimeSource, TimeSource, ticks_to_duration};
