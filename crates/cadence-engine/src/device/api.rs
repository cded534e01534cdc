use super::error::DeviceError;
use super::handle::{
    BufferHandle, ColorTargetHandle, CommandBufferHandle, DepthStencilTargetHandle,
    FramebufferHandle, GraphicsPipelineHandle, RenderPassHandle, ResourceHandle, SamplerHandle,
    ShaderModuleHandle, TextureHandle,
};
use super::types::{
    BufferDesc, DepthFormat, DrawPrimitives, Filter, FramebufferDesc, GraphicsPipelineDesc, Rect,
    RenderPassBegin, RenderPassDesc, SampleCount, SamplerDesc, ShaderModuleDesc, ShaderStage,
    TextureDesc, TextureSlice,
};

/// Handle-based GPU device.
///
/// The device owns every resource it creates; callers hold handles only.
/// Slices and descriptor references passed in are read during the call and
/// never retained.
///
/// Command buffer calls follow a fixed order (acquire, begin pass, bind
/// pipeline, push parameters, bind, draw, end pass, present, submit). The
/// order is enforced by [`crate::frame::CommandRecorder`]; backends may also
/// check it and report [`DeviceError::Sequencing`].
pub trait Device {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    // ── creation ──────────────────────────────────────────────────────────

    fn create_shader_module(
        &mut self,
        desc: &ShaderModuleDesc<'_>,
    ) -> Result<ShaderModuleHandle, DeviceError>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, DeviceError>;

    /// Writes `data` into `slice`. Data is tightly packed rows.
    fn set_texture_data(&mut self, slice: &TextureSlice, data: &[u8]) -> Result<(), DeviceError>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError>;

    fn set_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    fn create_render_pass(
        &mut self,
        desc: &RenderPassDesc<'_>,
    ) -> Result<RenderPassHandle, DeviceError>;

    fn create_color_target(
        &mut self,
        samples: SampleCount,
        slice: &TextureSlice,
    ) -> Result<ColorTargetHandle, DeviceError>;

    fn create_depth_stencil_target(
        &mut self,
        width: u32,
        height: u32,
        format: DepthFormat,
    ) -> Result<DepthStencilTargetHandle, DeviceError>;

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDesc<'_>,
    ) -> Result<FramebufferHandle, DeviceError>;

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<GraphicsPipelineHandle, DeviceError>;

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError>;

    /// Releases a resource. The handle is invalid afterwards.
    fn destroy(&mut self, resource: ResourceHandle) -> Result<(), DeviceError>;

    // ── per-frame ─────────────────────────────────────────────────────────

    fn acquire_command_buffer(
        &mut self,
        swap_index: u32,
    ) -> Result<CommandBufferHandle, DeviceError>;

    fn begin_render_pass(
        &mut self,
        command_buffer: CommandBufferHandle,
        begin: &RenderPassBegin<'_>,
    ) -> Result<(), DeviceError>;

    fn bind_graphics_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        pipeline: GraphicsPipelineHandle,
    ) -> Result<(), DeviceError>;

    /// Uploads `element_count` uniform blocks for `stage` and returns the
    /// offset to pass to the next draw.
    fn push_shader_params(
        &mut self,
        command_buffer: CommandBufferHandle,
        stage: ShaderStage,
        data: &[u8],
        element_count: u32,
    ) -> Result<u32, DeviceError>;

    /// `buffers` and `offsets` have equal length.
    fn bind_vertex_buffers(
        &mut self,
        command_buffer: CommandBufferHandle,
        first_binding: u32,
        buffers: &[BufferHandle],
        offsets: &[u64],
    ) -> Result<(), DeviceError>;

    /// `textures` and `samplers` have equal length; entry `i` fills sampler slot `i`.
    fn bind_fragment_samplers(
        &mut self,
        command_buffer: CommandBufferHandle,
        textures: &[TextureHandle],
        samplers: &[SamplerHandle],
    ) -> Result<(), DeviceError>;

    fn draw_primitives(
        &mut self,
        command_buffer: CommandBufferHandle,
        draw: &DrawPrimitives,
    ) -> Result<(), DeviceError>;

    fn end_render_pass(&mut self, command_buffer: CommandBufferHandle) -> Result<(), DeviceError>;

    /// Enqueues `source` for presentation into `destination` of the swap
    /// image (full image when `None`). Negative extents flip the image.
    fn queue_present(
        &mut self,
        command_buffer: CommandBufferHandle,
        source: &TextureSlice,
        destination: Option<&Rect>,
        filter: Filter,
    ) -> Result<(), DeviceError>;

    /// Executes the recorded command buffers. They cannot be used afterwards.
    fn submit(&mut self, command_buffers: &[CommandBufferHandle]) -> Result<(), DeviceError>;

    /// Drops an acquired command buffer without executing it.
    fn discard_command_buffer(&mut self, command_buffer: CommandBufferHandle) {
        let _ = command_buffer;
    }

    /// Blocks until submitted work has finished.
    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}
