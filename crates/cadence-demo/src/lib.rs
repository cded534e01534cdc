//! Raymarch sample for the cadence engine.
//!
//! A hexagon grid is raymarched into an offscreen target every frame the
//! fixed-step clock produces at least one update, then presented. The same
//! scene runs in a window on wgpu or headless on the recording device.

pub mod assets;
pub mod config;
pub mod headless;
pub mod scene;
