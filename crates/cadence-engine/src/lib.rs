//! Cadence engine crate.
//!
//! Frame orchestration over a handle-based GPU device: a fixed-timestep
//! clock, a dependency-ordered resource graph, a typestate command recorder,
//! and scoped staging of data handed to the device.

pub mod config;
pub mod core;
pub mod device;
pub mod frame;
pub mod logging;
pub mod resource;
pub mod staging;
pub mod time;
pub mod window;
