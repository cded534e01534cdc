use crate::device::{
    BufferHandle, Color, CommandBufferHandle, DepthStencilValue, FramebufferHandle,
    GraphicsPipelineHandle, Rect, RenderPassHandle, SamplerHandle, TextureHandle,
};

use super::present::PresentPlan;

/// Per-frame inputs.
///
/// Built by the simulation each frame and borrowed by the renderer for the
/// duration of one `render` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext<'a> {
    /// Swap image the command buffer targets.
    pub swap_index: u32,
    /// Applied to every color target.
    pub clear_color: Color,
    /// Used when the render pass has a depth-stencil target.
    pub depth_stencil_clear: DepthStencilValue,
    /// `None` renders the whole framebuffer.
    pub render_area: Option<Rect>,
    /// One uniform block for the vertex stage.
    pub vertex_params: Option<&'a [u8]>,
    /// One uniform block for the fragment stage.
    pub fragment_params: Option<&'a [u8]>,
}

impl Default for FrameContext<'_> {
    fn default() -> Self {
        Self {
            swap_index: 0,
            clear_color: Color::new(0.0, 0.0, 0.0, 1.0),
            depth_stencil_clear: DepthStencilValue::default(),
            render_area: None,
            vertex_params: None,
            fragment_params: None,
        }
    }
}

/// The fixed shape of a frame: what is drawn, with what, and where it goes.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub pipeline: GraphicsPipelineHandle,
    /// Bound from binding 0, with byte offsets.
    pub vertex_buffers: Vec<(BufferHandle, u64)>,
    /// Fragment sampler slots in order.
    pub fragment_samplers: Vec<(TextureHandle, SamplerHandle)>,
    pub vertex_start: u32,
    pub primitive_count: u32,
    pub present: Option<PresentPlan>,
}

/// Summary of one submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub command_buffer: CommandBufferHandle,
    pub draws: u32,
    pub param_bytes: usize,
    pub presented: bool,
}
