//! GPU device abstraction.
//!
//! This module is responsible for:
//! - the handle-based [`Device`] trait and its descriptor types
//! - the wgpu backend ([`WgpuDevice`]) bound to a window surface
//! - a headless recording backend ([`RecordingDevice`]) that validates call order

mod api;
mod coverage;
mod error;
mod gpu;
mod handle;
pub mod recording;
mod types;

pub use api::Device;
pub(crate) use coverage::TexelCoverage;
pub use error::{DeviceError, SurfaceErrorAction};
pub use gpu::{GpuInit, WgpuDevice};
pub use handle::{
    BufferHandle, ColorTargetHandle, CommandBufferHandle, DepthStencilTargetHandle,
    FramebufferHandle, GraphicsPipelineHandle, HandleAllocator, RenderPassHandle, ResourceHandle,
    ResourceKind, SamplerHandle, ShaderModuleHandle, TextureHandle,
};
pub use recording::RecordingDevice;
pub use types::*;
