//! Window + runtime loop.
//!
//! Owns the `winit` event loop and window, and drives an
//! [`Application`](crate::core::Application) over the wgpu backend.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
