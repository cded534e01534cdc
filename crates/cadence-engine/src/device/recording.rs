//! Headless device that records every call and checks the device contract.
//!
//! `RecordingDevice` keeps a copy of each descriptor it needs for later
//! checks, a log of every call, and a list of contract violations. Calls that
//! break sequencing fail with [`DeviceError::Sequencing`]; violations are also
//! recorded so tests can assert on them after the fact.

use std::collections::HashMap;

use crate::staging;

use super::api::Device;
use super::coverage::TexelCoverage;
use super::error::DeviceError;
use super::handle::{
    BufferHandle, ColorTargetHandle, CommandBufferHandle, DepthStencilTargetHandle,
    FramebufferHandle, GraphicsPipelineHandle, HandleAllocator, RenderPassHandle, ResourceHandle,
    ResourceKind, SamplerHandle, ShaderModuleHandle, TextureHandle,
};
use super::types::{
    BufferDesc, BufferUsage, Color, ColorTargetDescription, DepthFormat, DrawPrimitives, Filter,
    FramebufferDesc, GraphicsPipelineDesc, Rect, RenderPassBegin, RenderPassDesc, SampleCount,
    SamplerDesc, ShaderCode, ShaderModuleDesc, ShaderStage, TextureDesc, TextureSlice,
    TextureUsage, VertexBinding,
};

/// Uniform slot alignment used for parameter offsets.
pub const PARAM_ALIGNMENT: u32 = 256;

/// One logged device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateShaderModule { module: ShaderModuleHandle, byte_len: usize },
    CreateTexture { texture: TextureHandle, width: u32, height: u32 },
    SetTextureData { texture: TextureHandle, len: usize },
    CreateBuffer { buffer: BufferHandle, size: u64 },
    SetBufferData { buffer: BufferHandle, offset: u64, len: usize },
    CreateRenderPass { render_pass: RenderPassHandle },
    CreateColorTarget { target: ColorTargetHandle, texture: TextureHandle },
    CreateDepthStencilTarget { target: DepthStencilTargetHandle },
    CreateFramebuffer { framebuffer: FramebufferHandle },
    CreateGraphicsPipeline { pipeline: GraphicsPipelineHandle },
    CreateSampler { sampler: SamplerHandle },
    Destroy(ResourceHandle),
    AcquireCommandBuffer { command_buffer: CommandBufferHandle, swap_index: u32 },
    BeginRenderPass {
        command_buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        render_area: Rect,
        clear_colors: Vec<Color>,
    },
    BindGraphicsPipeline { command_buffer: CommandBufferHandle, pipeline: GraphicsPipelineHandle },
    PushShaderParams {
        command_buffer: CommandBufferHandle,
        stage: ShaderStage,
        len: usize,
        offset: u32,
    },
    BindVertexBuffers {
        command_buffer: CommandBufferHandle,
        first_binding: u32,
        buffers: Vec<BufferHandle>,
        offsets: Vec<u64>,
    },
    BindFragmentSamplers {
        command_buffer: CommandBufferHandle,
        textures: Vec<TextureHandle>,
        samplers: Vec<SamplerHandle>,
    },
    DrawPrimitives { command_buffer: CommandBufferHandle, draw: DrawPrimitives },
    EndRenderPass { command_buffer: CommandBufferHandle },
    QueuePresent {
        command_buffer: CommandBufferHandle,
        source: TextureSlice,
        destination: Option<Rect>,
        filter: Filter,
    },
    Submit { command_buffers: Vec<CommandBufferHandle> },
    Discard { command_buffer: CommandBufferHandle },
}

impl Command {
    /// Command buffer the call was recorded into, if any.
    pub fn command_buffer(&self) -> Option<CommandBufferHandle> {
        match self {
            Command::AcquireCommandBuffer { command_buffer, .. }
            | Command::BeginRenderPass { command_buffer, .. }
            | Command::BindGraphicsPipeline { command_buffer, .. }
            | Command::PushShaderParams { command_buffer, .. }
            | Command::BindVertexBuffers { command_buffer, .. }
            | Command::BindFragmentSamplers { command_buffer, .. }
            | Command::DrawPrimitives { command_buffer, .. }
            | Command::EndRenderPass { command_buffer }
            | Command::QueuePresent { command_buffer, .. }
            | Command::Discard { command_buffer } => Some(*command_buffer),
            _ => None,
        }
    }
}

/// A broken contract observed by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Call issued in the wrong command-buffer phase.
    Sequencing { call: &'static str, detail: String },
    /// A resource was bound for reading before it was fully uploaded.
    NotUploaded(ResourceHandle),
    /// Bound resource count differs from what the pipeline declares.
    BindingCount { call: &'static str, expected: usize, actual: usize },
    /// Slice data arrived while no staging scope was open.
    DataOutsideStagingScope { call: &'static str },
}

/// Call that can be made to fail once.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FailPoint {
    Create(ResourceKind),
    Upload,
    Acquire,
    Draw,
    Present,
    Submit,
}

#[derive(Debug, Clone)]
enum Record {
    ShaderModule,
    Texture {
        width: u32,
        height: u32,
        mip_levels: u32,
        usage: TextureUsage,
        coverage: TexelCoverage,
    },
    /// `written` is the end of the contiguous written prefix.
    Buffer { size: u64, usage: BufferUsage, written: u64 },
    RenderPass { color_targets: Vec<ColorTargetDescription>, has_depth_stencil: bool },
    ColorTarget,
    DepthStencilTarget,
    Framebuffer { render_pass: RenderPassHandle },
    GraphicsPipeline {
        render_pass: RenderPassHandle,
        vertex_bindings: Vec<VertexBinding>,
        vertex_uniform_size: u64,
        fragment_uniform_size: u64,
        fragment_sampler_count: u32,
    },
    Sampler,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    Recording,
    InPass,
    PassEnded,
}

#[derive(Debug)]
struct CommandBufferState {
    phase: Phase,
    pass_count: u32,
    pipeline: Option<GraphicsPipelineHandle>,
    vertex_buffers: Vec<BufferHandle>,
    fragment_textures: Vec<TextureHandle>,
    pushed_vertex: u32,
    pushed_fragment: u32,
}

impl CommandBufferState {
    fn new() -> Self {
        Self {
            phase: Phase::Recording,
            pass_count: 0,
            pipeline: None,
            vertex_buffers: Vec::new(),
            fragment_textures: Vec::new(),
            pushed_vertex: 0,
            pushed_fragment: 0,
        }
    }
}

/// Device backend that performs no GPU work.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    ids: HandleAllocator,
    records: HashMap<ResourceHandle, Record>,
    command_buffers: HashMap<CommandBufferHandle, CommandBufferState>,
    log: Vec<Command>,
    violations: Vec<Violation>,
    destroyed: Vec<ResourceHandle>,
    failures: Vec<(FailPoint, DeviceError)>,
    require_staging: bool,
    submitted: u64,
    presented: u64,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation whenever slice data arrives outside a staging scope.
    pub fn require_staging(mut self, enabled: bool) -> Self {
        self.require_staging = enabled;
        self
    }

    /// Makes the next call matching `point` fail with `error`.
    pub fn fail_next(&mut self, point: FailPoint, error: DeviceError) {
        self.failures.push((point, error));
    }

    pub fn log(&self) -> &[Command] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Destroyed resources, in destruction order.
    pub fn destroyed(&self) -> &[ResourceHandle] {
        &self.destroyed
    }

    pub fn is_live(&self, resource: ResourceHandle) -> bool {
        self.records.contains_key(&resource)
    }

    pub fn live_resources(&self) -> usize {
        self.records.len()
    }

    /// Command buffers acquired and not yet submitted or discarded.
    pub fn pending_command_buffers(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn submitted_count(&self) -> u64 {
        self.submitted
    }

    pub fn present_count(&self) -> u64 {
        self.presented
    }

    /// Logged calls recorded into `command_buffer`.
    pub fn commands_for(&self, command_buffer: CommandBufferHandle) -> Vec<&Command> {
        self.log
            .iter()
            .filter(|c| c.command_buffer() == Some(command_buffer))
            .collect()
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn take_failure(&mut self, point: FailPoint) -> Result<(), DeviceError> {
        match self.failures.iter().position(|(p, _)| *p == point) {
            Some(i) => Err(self.failures.remove(i).1),
            None => Ok(()),
        }
    }

    fn check_staged(&mut self, call: &'static str) {
        if self.require_staging && staging::live_scopes() == 0 {
            self.violations.push(Violation::DataOutsideStagingScope { call });
        }
    }

    fn register(&mut self, handle: ResourceHandle, record: Record) {
        log::trace!("recording device: created {handle}");
        self.records.insert(handle, record);
    }

    fn record(&self, handle: ResourceHandle) -> Result<&Record, DeviceError> {
        self.records.get(&handle).ok_or(DeviceError::InvalidHandle(handle))
    }

    fn sequencing(&mut self, call: &'static str, detail: impl Into<String>) -> DeviceError {
        let detail = detail.into();
        self.violations.push(Violation::Sequencing { call, detail: detail.clone() });
        DeviceError::Sequencing(format!("{call}: {detail}"))
    }

    fn command_buffer(
        &mut self,
        command_buffer: CommandBufferHandle,
    ) -> Result<&mut CommandBufferState, DeviceError> {
        self.command_buffers
            .get_mut(&command_buffer)
            .ok_or(DeviceError::InvalidCommandBuffer(command_buffer.raw().get()))
    }

    /// Fails unless `command_buffer` is in `phase`.
    fn expect_phase(
        &mut self,
        command_buffer: CommandBufferHandle,
        phase: Phase,
        call: &'static str,
    ) -> Result<(), DeviceError> {
        let actual = self.command_buffer(command_buffer)?.phase;
        if actual != phase {
            return Err(self.sequencing(call, format!("expected {phase:?}, found {actual:?}")));
        }
        Ok(())
    }

    fn bound_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        call: &'static str,
    ) -> Result<GraphicsPipelineHandle, DeviceError> {
        match self.command_buffer(command_buffer)?.pipeline {
            Some(p) => Ok(p),
            None => Err(self.sequencing(call, "no graphics pipeline bound")),
        }
    }

    fn require_uploaded(&mut self, resource: ResourceHandle) -> Result<(), DeviceError> {
        let uploaded = match self.record(resource)? {
            Record::Texture { coverage, usage, .. } => {
                coverage.is_complete() || !usage.contains(TextureUsage::SAMPLER)
            }
            Record::Buffer { size, written, .. } => written >= size,
            _ => true,
        };
        if !uploaded {
            self.violations.push(Violation::NotUploaded(resource));
            return Err(DeviceError::Validation(format!("{resource} read before upload")));
        }
        Ok(())
    }

    fn count_mismatch(&mut self, call: &'static str, expected: usize, actual: usize) -> DeviceError {
        self.violations.push(Violation::BindingCount { call, expected, actual });
        DeviceError::Validation(format!("{call}: expected {expected} bindings, got {actual}"))
    }
}

fn aligned(len: usize) -> u32 {
    let len = len as u32;
    len.div_ceil(PARAM_ALIGNMENT).max(1) * PARAM_ALIGNMENT
}

impl Device for RecordingDevice {
    fn backend_name(&self) -> &'static str {
        "recording"
    }

    fn create_shader_module(
        &mut self,
        desc: &ShaderModuleDesc<'_>,
    ) -> Result<ShaderModuleHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::ShaderModule))?;
        self.check_staged("create_shader_module");
        let byte_len = desc.code.byte_len();
        match desc.code {
            ShaderCode::SpirV(bytes) if bytes.is_empty() || bytes.len() % 4 != 0 => {
                return Err(DeviceError::Validation(format!(
                    "SPIR-V length {} is not a positive multiple of 4",
                    bytes.len()
                )));
            }
            _ => {}
        }
        let module = ShaderModuleHandle::from_raw(self.ids.next_raw());
        self.register(module.into(), Record::ShaderModule);
        self.log.push(Command::CreateShaderModule { module, byte_len });
        Ok(module)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::Texture))?;
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(DeviceError::Validation("texture has zero extent".into()));
        }
        let texture = TextureHandle::from_raw(self.ids.next_raw());
        self.register(
            texture.into(),
            Record::Texture {
                width: desc.width,
                height: desc.height,
                mip_levels: desc.mip_levels,
                usage: desc.usage,
                coverage: TexelCoverage::new(desc.width, desc.height),
            },
        );
        self.log.push(Command::CreateTexture { texture, width: desc.width, height: desc.height });
        Ok(texture)
    }

    fn set_texture_data(&mut self, slice: &TextureSlice, data: &[u8]) -> Result<(), DeviceError> {
        self.take_failure(FailPoint::Upload)?;
        self.check_staged("set_texture_data");
        let handle = ResourceHandle::from(slice.texture);
        let Some(Record::Texture { width, height, mip_levels, coverage, .. }) =
            self.records.get_mut(&handle)
        else {
            return Err(DeviceError::InvalidHandle(handle));
        };
        if slice.level >= *mip_levels {
            return Err(DeviceError::Validation(format!(
                "upload to level {} of {handle} with {mip_levels} levels",
                slice.level
            )));
        }
        let level_w = width.checked_shr(slice.level).unwrap_or(0).max(1);
        let level_h = height.checked_shr(slice.level).unwrap_or(0).max(1);
        let Some((x, y, w, h)) = slice.rect.texel_region(level_w, level_h) else {
            return Err(DeviceError::Validation(format!(
                "upload region {:?} outside {level_w}x{level_h} level of {handle}",
                slice.rect
            )));
        };
        if slice.level == 0 {
            coverage.add(x, y, w, h);
        }
        self.log.push(Command::SetTextureData { texture: slice.texture, len: data.len() });
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::Buffer))?;
        if desc.size == 0 {
            return Err(DeviceError::Validation("buffer has zero size".into()));
        }
        let buffer = BufferHandle::from_raw(self.ids.next_raw());
        self.register(
            buffer.into(),
            Record::Buffer { size: desc.size, usage: desc.usage, written: 0 },
        );
        self.log.push(Command::CreateBuffer { buffer, size: desc.size });
        Ok(buffer)
    }

    fn set_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        self.take_failure(FailPoint::Upload)?;
        self.check_staged("set_buffer_data");
        let handle = ResourceHandle::from(buffer);
        let Some(Record::Buffer { size, written, .. }) = self.records.get_mut(&handle) else {
            return Err(DeviceError::InvalidHandle(handle));
        };
        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > *size) {
            return Err(DeviceError::Validation(format!(
                "write of {} bytes at {offset} overflows {handle} ({size} bytes)",
                data.len()
            )));
        }
        if offset <= *written {
            *written = (*written).max(offset + data.len() as u64);
        }
        self.log.push(Command::SetBufferData { buffer, offset, len: data.len() });
        Ok(())
    }

    fn create_render_pass(
        &mut self,
        desc: &RenderPassDesc<'_>,
    ) -> Result<RenderPassHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::RenderPass))?;
        self.check_staged("create_render_pass");
        let render_pass = RenderPassHandle::from_raw(self.ids.next_raw());
        self.register(
            render_pass.into(),
            Record::RenderPass {
                color_targets: desc.color_targets.to_vec(),
                has_depth_stencil: desc.depth_stencil.is_some(),
            },
        );
        self.log.push(Command::CreateRenderPass { render_pass });
        Ok(render_pass)
    }

    fn create_color_target(
        &mut self,
        samples: SampleCount,
        slice: &TextureSlice,
    ) -> Result<ColorTargetHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::ColorTarget))?;
        match self.record(slice.texture.into())? {
            Record::Texture { usage, .. } if usage.contains(TextureUsage::COLOR_TARGET) => {}
            _ => {
                return Err(DeviceError::Validation(format!(
                    "{} lacks color-target usage",
                    ResourceHandle::from(slice.texture)
                )));
            }
        }
        let target = ColorTargetHandle::from_raw(self.ids.next_raw());
        self.register(target.into(), Record::ColorTarget);
        self.log.push(Command::CreateColorTarget { target, texture: slice.texture });
        Ok(target)
    }

    fn create_depth_stencil_target(
        &mut self,
        width: u32,
        height: u32,
        format: DepthFormat,
    ) -> Result<DepthStencilTargetHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::DepthStencilTarget))?;
        if width == 0 || height == 0 {
            return Err(DeviceError::Validation("depth-stencil target has zero extent".into()));
        }
        let target = DepthStencilTargetHandle::from_raw(self.ids.next_raw());
        log::trace!("recording device: depth-stencil format {format:?}");
        self.register(target.into(), Record::DepthStencilTarget);
        self.log.push(Command::CreateDepthStencilTarget { target });
        Ok(target)
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDesc<'_>,
    ) -> Result<FramebufferHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::Framebuffer))?;
        self.check_staged("create_framebuffer");
        let (expected, has_depth) = match self.record(desc.render_pass.into())? {
            Record::RenderPass { color_targets, has_depth_stencil } => {
                (color_targets.len(), *has_depth_stencil)
            }
            _ => return Err(DeviceError::InvalidHandle(desc.render_pass.into())),
        };
        if expected != desc.color_targets.len() {
            return Err(self.count_mismatch("create_framebuffer", expected, desc.color_targets.len()));
        }
        if has_depth != desc.depth_stencil_target.is_some() {
            return Err(DeviceError::Validation(
                "framebuffer depth-stencil attachment does not match render pass".into(),
            ));
        }
        for target in desc.color_targets {
            self.record((*target).into())?;
        }
        if let Some(ds) = desc.depth_stencil_target {
            self.record(ds.into())?;
        }
        let framebuffer = FramebufferHandle::from_raw(self.ids.next_raw());
        self.register(framebuffer.into(), Record::Framebuffer { render_pass: desc.render_pass });
        self.log.push(Command::CreateFramebuffer { framebuffer });
        Ok(framebuffer)
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<GraphicsPipelineHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::GraphicsPipeline))?;
        self.check_staged("create_graphics_pipeline");
        self.record(desc.render_pass.into())?;
        self.record(desc.vertex_shader.module.into())?;
        self.record(desc.fragment_shader.module.into())?;
        let pipeline = GraphicsPipelineHandle::from_raw(self.ids.next_raw());
        self.register(
            pipeline.into(),
            Record::GraphicsPipeline {
                render_pass: desc.render_pass,
                vertex_bindings: desc.vertex_input_state.bindings.to_vec(),
                vertex_uniform_size: desc.vertex_shader.uniform_buffer_size,
                fragment_uniform_size: desc.fragment_shader.uniform_buffer_size,
                fragment_sampler_count: desc.layout.fragment_sampler_binding_count,
            },
        );
        self.log.push(Command::CreateGraphicsPipeline { pipeline });
        Ok(pipeline)
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError> {
        self.take_failure(FailPoint::Create(ResourceKind::Sampler))?;
        if desc.min_lod > desc.max_lod {
            return Err(DeviceError::Validation("sampler min_lod exceeds max_lod".into()));
        }
        let sampler = SamplerHandle::from_raw(self.ids.next_raw());
        self.register(sampler.into(), Record::Sampler);
        self.log.push(Command::CreateSampler { sampler });
        Ok(sampler)
    }

    fn destroy(&mut self, resource: ResourceHandle) -> Result<(), DeviceError> {
        if self.records.remove(&resource).is_none() {
            return Err(DeviceError::InvalidHandle(resource));
        }
        log::trace!("recording device: destroyed {resource}");
        self.destroyed.push(resource);
        self.log.push(Command::Destroy(resource));
        Ok(())
    }

    fn acquire_command_buffer(
        &mut self,
        swap_index: u32,
    ) -> Result<CommandBufferHandle, DeviceError> {
        self.take_failure(FailPoint::Acquire)?;
        let command_buffer = CommandBufferHandle::from_raw(self.ids.next_raw());
        self.command_buffers.insert(command_buffer, CommandBufferState::new());
        self.log.push(Command::AcquireCommandBuffer { command_buffer, swap_index });
        Ok(command_buffer)
    }

    fn begin_render_pass(
        &mut self,
        command_buffer: CommandBufferHandle,
        begin: &RenderPassBegin<'_>,
    ) -> Result<(), DeviceError> {
        self.check_staged("begin_render_pass");
        self.expect_phase(command_buffer, Phase::Recording, "begin_render_pass")?;
        if self.command_buffer(command_buffer)?.pass_count > 0 {
            return Err(self.sequencing("begin_render_pass", "render pass already recorded"));
        }
        match self.record(begin.framebuffer.into())? {
            Record::Framebuffer { render_pass } if *render_pass == begin.render_pass => {}
            _ => {
                return Err(DeviceError::Validation(
                    "framebuffer was not created for this render pass".into(),
                ));
            }
        }
        let state = self.command_buffer(command_buffer)?;
        state.phase = Phase::InPass;
        state.pass_count += 1;
        self.log.push(Command::BeginRenderPass {
            command_buffer,
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            render_area: begin.render_area,
            clear_colors: begin.color_clear_values.to_vec(),
        });
        Ok(())
    }

    fn bind_graphics_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        pipeline: GraphicsPipelineHandle,
    ) -> Result<(), DeviceError> {
        self.expect_phase(command_buffer, Phase::InPass, "bind_graphics_pipeline")?;
        self.record(pipeline.into())?;
        let state = self.command_buffer(command_buffer)?;
        state.pipeline = Some(pipeline);
        state.vertex_buffers.clear();
        state.fragment_textures.clear();
        self.log.push(Command::BindGraphicsPipeline { command_buffer, pipeline });
        Ok(())
    }

    fn push_shader_params(
        &mut self,
        command_buffer: CommandBufferHandle,
        stage: ShaderStage,
        data: &[u8],
        element_count: u32,
    ) -> Result<u32, DeviceError> {
        self.check_staged("push_shader_params");
        self.expect_phase(command_buffer, Phase::InPass, "push_shader_params")?;
        let pipeline = self.bound_pipeline(command_buffer, "push_shader_params")?;
        let declared = match self.record(pipeline.into())? {
            Record::GraphicsPipeline { vertex_uniform_size, fragment_uniform_size, .. } => {
                match stage {
                    ShaderStage::Vertex => *vertex_uniform_size,
                    ShaderStage::Fragment => *fragment_uniform_size,
                }
            }
            _ => return Err(DeviceError::InvalidHandle(pipeline.into())),
        };
        let expected = declared * element_count as u64;
        if declared == 0 || data.len() as u64 != expected {
            return Err(DeviceError::Validation(format!(
                "{stage:?} parameters are {} bytes, pipeline expects {expected}",
                data.len()
            )));
        }
        let state = self.command_buffer(command_buffer)?;
        let cursor = match stage {
            ShaderStage::Vertex => &mut state.pushed_vertex,
            ShaderStage::Fragment => &mut state.pushed_fragment,
        };
        let offset = *cursor;
        *cursor += aligned(data.len());
        self.log.push(Command::PushShaderParams { command_buffer, stage, len: data.len(), offset });
        Ok(offset)
    }

    fn bind_vertex_buffers(
        &mut self,
        command_buffer: CommandBufferHandle,
        first_binding: u32,
        buffers: &[BufferHandle],
        offsets: &[u64],
    ) -> Result<(), DeviceError> {
        self.check_staged("bind_vertex_buffers");
        self.expect_phase(command_buffer, Phase::InPass, "bind_vertex_buffers")?;
        let pipeline = self.bound_pipeline(command_buffer, "bind_vertex_buffers")?;
        if buffers.is_empty() || buffers.len() != offsets.len() {
            return Err(self.count_mismatch("bind_vertex_buffers", buffers.len(), offsets.len()));
        }
        let declared = match self.record(pipeline.into())? {
            Record::GraphicsPipeline { vertex_bindings, .. } => vertex_bindings.len(),
            _ => return Err(DeviceError::InvalidHandle(pipeline.into())),
        };
        let end = (first_binding as usize).saturating_add(buffers.len());
        if end > declared {
            return Err(self.count_mismatch("bind_vertex_buffers", declared, end));
        }
        for buffer in buffers {
            match self.record((*buffer).into())? {
                Record::Buffer { usage, .. } if usage.contains(BufferUsage::VERTEX) => {}
                _ => {
                    return Err(DeviceError::Validation(format!(
                        "{} lacks vertex usage",
                        ResourceHandle::from(*buffer)
                    )));
                }
            }
        }
        let state = self.command_buffer(command_buffer)?;
        let first = first_binding as usize;
        if state.vertex_buffers.len() < first + buffers.len() {
            state.vertex_buffers.resize(first + buffers.len(), buffers[0]);
        }
        state.vertex_buffers[first..first + buffers.len()].copy_from_slice(buffers);
        self.log.push(Command::BindVertexBuffers {
            command_buffer,
            first_binding,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
        Ok(())
    }

    fn bind_fragment_samplers(
        &mut self,
        command_buffer: CommandBufferHandle,
        textures: &[TextureHandle],
        samplers: &[SamplerHandle],
    ) -> Result<(), DeviceError> {
        self.check_staged("bind_fragment_samplers");
        self.expect_phase(command_buffer, Phase::InPass, "bind_fragment_samplers")?;
        self.bound_pipeline(command_buffer, "bind_fragment_samplers")?;
        if textures.len() != samplers.len() {
            return Err(self.count_mismatch("bind_fragment_samplers", textures.len(), samplers.len()));
        }
        for texture in textures {
            self.record((*texture).into())?;
        }
        for sampler in samplers {
            self.record((*sampler).into())?;
        }
        self.command_buffer(command_buffer)?.fragment_textures = textures.to_vec();
        self.log.push(Command::BindFragmentSamplers {
            command_buffer,
            textures: textures.to_vec(),
            samplers: samplers.to_vec(),
        });
        Ok(())
    }

    fn draw_primitives(
        &mut self,
        command_buffer: CommandBufferHandle,
        draw: &DrawPrimitives,
    ) -> Result<(), DeviceError> {
        self.take_failure(FailPoint::Draw)?;
        self.expect_phase(command_buffer, Phase::InPass, "draw_primitives")?;
        let pipeline = self.bound_pipeline(command_buffer, "draw_primitives")?;
        let (binding_count, sampler_count) = match self.record(pipeline.into())? {
            Record::GraphicsPipeline { vertex_bindings, fragment_sampler_count, .. } => {
                (vertex_bindings.len(), *fragment_sampler_count as usize)
            }
            _ => return Err(DeviceError::InvalidHandle(pipeline.into())),
        };
        let state = self.command_buffer(command_buffer)?;
        let buffers = state.vertex_buffers.clone();
        let textures = state.fragment_textures.clone();
        if buffers.len() != binding_count {
            return Err(self.count_mismatch("draw_primitives", binding_count, buffers.len()));
        }
        if textures.len() != sampler_count {
            return Err(self.count_mismatch("draw_primitives", sampler_count, textures.len()));
        }
        for buffer in buffers {
            self.require_uploaded(buffer.into())?;
        }
        for texture in textures {
            self.require_uploaded(texture.into())?;
        }
        self.log.push(Command::DrawPrimitives { command_buffer, draw: *draw });
        Ok(())
    }

    fn end_render_pass(&mut self, command_buffer: CommandBufferHandle) -> Result<(), DeviceError> {
        self.expect_phase(command_buffer, Phase::InPass, "end_render_pass")?;
        let state = self.command_buffer(command_buffer)?;
        state.phase = Phase::PassEnded;
        state.pipeline = None;
        self.log.push(Command::EndRenderPass { command_buffer });
        Ok(())
    }

    fn queue_present(
        &mut self,
        command_buffer: CommandBufferHandle,
        source: &TextureSlice,
        destination: Option<&Rect>,
        filter: Filter,
    ) -> Result<(), DeviceError> {
        self.take_failure(FailPoint::Present)?;
        self.expect_phase(command_buffer, Phase::PassEnded, "queue_present")?;
        self.record(source.texture.into())?;
        self.log.push(Command::QueuePresent {
            command_buffer,
            source: *source,
            destination: destination.copied(),
            filter,
        });
        Ok(())
    }

    fn submit(&mut self, command_buffers: &[CommandBufferHandle]) -> Result<(), DeviceError> {
        for cb in command_buffers {
            self.expect_phase(*cb, Phase::PassEnded, "submit")?;
        }
        let injected = self.take_failure(FailPoint::Submit);
        // A failed submission still consumes the command buffers.
        for cb in command_buffers {
            self.command_buffers.remove(cb);
        }
        injected?;
        self.submitted += command_buffers.len() as u64;
        let presents = self
            .log
            .iter()
            .filter(|c| {
                matches!(c, Command::QueuePresent { command_buffer, .. }
                    if command_buffers.contains(command_buffer))
            })
            .count();
        self.presented += presents as u64;
        self.log.push(Command::Submit { command_buffers: command_buffers.to_vec() });
        Ok(())
    }

    fn discard_command_buffer(&mut self, command_buffer: CommandBufferHandle) {
        if self.command_buffers.remove(&command_buffer).is_some() {
            self.log.push(Command::Discard { command_buffer });
        }
    }
}
