//! Core engine-facing contracts.
//!
//! Ties the simulation clock to the frame renderer. The loop owns the
//! device, the resource graph, and the simulation; platform code only feeds
//! it quit requests and redraw ticks.

mod app;
mod run_loop;

pub use app::{AppControl, EventSource, Simulation};
pub use run_loop::{Application, LoopStats};
