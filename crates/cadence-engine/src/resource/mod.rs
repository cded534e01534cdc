//! GPU resource dependency graph.
//!
//! Creation happens in dependency order (shader modules, textures and
//! buffers, render pass, targets, framebuffer, pipeline, samplers). The graph
//! validates each request against what already exists and tears everything
//! down in reverse creation order.

mod error;
mod graph;

pub use error::{CreationError, DestroyError};
pub use graph::{
    BufferInfo, ColorTargetInfo, DepthStencilTargetInfo, FramebufferInfo, PipelineInfo,
    RenderPassInfo, ResourceGraph, TextureInfo,
};
