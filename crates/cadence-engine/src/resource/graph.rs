use std::collections::HashMap;

use bytemuck::Pod;

use crate::device::{
    BufferDesc, BufferHandle, BufferUsage, ColorFormat, ColorTargetDescription, ColorTargetHandle,
    DepthFormat, DepthStencilTargetDescription, DepthStencilTargetHandle, Device,
    FramebufferDesc, FramebufferHandle, GraphicsPipelineDesc, GraphicsPipelineHandle,
    PrimitiveType, RenderPassDesc, RenderPassHandle, ResourceHandle, ResourceKind, SampleCount,
    SamplerDesc, SamplerHandle, ShaderCode, ShaderModuleDesc, ShaderModuleHandle, ShaderStage,
    TexelCoverage, TextureDesc, TextureHandle, TextureSlice, TextureUsage, VertexBinding,
};
use crate::staging;

use super::error::{CreationError, DestroyError};

// ── resource info ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub format: ColorFormat,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub usage: TextureUsage,
    /// Every texel of mip level 0 has been written.
    pub uploaded: bool,
    coverage: TexelCoverage,
}

impl TextureInfo {
    /// Byte length of a full level-0 upload.
    pub fn level0_len(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferInfo {
    pub usage: BufferUsage,
    pub size: u64,
    /// Declared vertex stride, for vertex buffers.
    pub vertex_stride: Option<u32>,
    /// End of the contiguous written prefix.
    pub written: u64,
}

impl BufferInfo {
    /// True once every byte has been written.
    pub fn uploaded(&self) -> bool {
        self.written >= self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassInfo {
    pub color_targets: Vec<ColorTargetDescription>,
    pub depth_stencil: Option<DepthStencilTargetDescription>,
}

impl RenderPassInfo {
    pub fn sample_count(&self) -> SampleCount {
        self.color_targets.first().map(|c| c.samples).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorTargetInfo {
    pub texture: TextureHandle,
    pub format: ColorFormat,
    pub samples: SampleCount,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilTargetInfo {
    pub format: DepthFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferInfo {
    pub render_pass: RenderPassHandle,
    pub width: u32,
    pub height: u32,
    pub color_targets: Vec<ColorTargetHandle>,
    pub depth_stencil_target: Option<DepthStencilTargetHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInfo {
    pub render_pass: RenderPassHandle,
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_uniform_size: u64,
    pub fragment_uniform_size: u64,
    pub vertex_sampler_count: u32,
    pub fragment_sampler_count: u32,
    pub primitive_type: PrimitiveType,
}

impl PipelineInfo {
    /// Uniform block size declared for `stage`.
    pub fn uniform_size(&self, stage: ShaderStage) -> u64 {
        match stage {
            ShaderStage::Vertex => self.vertex_uniform_size,
            ShaderStage::Fragment => self.fragment_uniform_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Info {
    ShaderModule,
    Texture(TextureInfo),
    Buffer(BufferInfo),
    RenderPass(RenderPassInfo),
    ColorTarget(ColorTargetInfo),
    DepthStencilTarget(DepthStencilTargetInfo),
    Framebuffer(FramebufferInfo),
    GraphicsPipeline(PipelineInfo),
    Sampler,
}

#[derive(Debug)]
struct Entry {
    label: &'static str,
    info: Info,
    dependencies: Vec<ResourceHandle>,
}

fn label_of(label: Option<&'static str>) -> &'static str {
    label.unwrap_or("unnamed")
}

/// Ordered registry of the GPU objects an application creates.
///
/// Every creation goes through the graph: it validates the request against
/// the objects it already knows, stages descriptor data for the device call,
/// and records the new handle with its dependencies. Destruction refuses to
/// release a resource while a live resource still depends on it, and
/// [`teardown`](Self::teardown) releases everything in reverse creation order.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    entries: HashMap<ResourceHandle, Entry>,
    order: Vec<ResourceHandle>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, resource: impl Into<ResourceHandle>) -> bool {
        let resource: ResourceHandle = resource.into();
        self.entries.contains_key(&resource)
    }

    pub fn label(&self, resource: impl Into<ResourceHandle>) -> Option<&'static str> {
        let resource: ResourceHandle = resource.into();
        self.entries.get(&resource).map(|e| e.label)
    }

    /// Live resources in creation order.
    pub fn creation_order(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.order.iter().copied().filter(|h| self.entries.contains_key(h))
    }

    /// Live resources that `resource` was created against.
    pub fn dependencies(&self, resource: impl Into<ResourceHandle>) -> &[ResourceHandle] {
        let resource: ResourceHandle = resource.into();
        self.entries
            .get(&resource)
            .map(|e| e.dependencies.as_slice())
            .unwrap_or(&[])
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&TextureInfo> {
        match self.entries.get(&ResourceHandle::from(texture)).map(|e| &e.info) {
            Some(Info::Texture(info)) => Some(info),
            _ => None,
        }
    }

    pub fn buffer(&self, buffer: BufferHandle) -> Option<&BufferInfo> {
        match self.entries.get(&ResourceHandle::from(buffer)).map(|e| &e.info) {
            Some(Info::Buffer(info)) => Some(info),
            _ => None,
        }
    }

    pub fn render_pass(&self, render_pass: RenderPassHandle) -> Option<&RenderPassInfo> {
        match self.entries.get(&ResourceHandle::from(render_pass)).map(|e| &e.info) {
            Some(Info::RenderPass(info)) => Some(info),
            _ => None,
        }
    }

    pub fn color_target(&self, target: ColorTargetHandle) -> Option<&ColorTargetInfo> {
        match self.entries.get(&ResourceHandle::from(target)).map(|e| &e.info) {
            Some(Info::ColorTarget(info)) => Some(info),
            _ => None,
        }
    }

    pub fn depth_stencil_target(
        &self,
        target: DepthStencilTargetHandle,
    ) -> Option<&DepthStencilTargetInfo> {
        match self.entries.get(&ResourceHandle::from(target)).map(|e| &e.info) {
            Some(Info::DepthStencilTarget(info)) => Some(info),
            _ => None,
        }
    }

    pub fn framebuffer(&self, framebuffer: FramebufferHandle) -> Option<&FramebufferInfo> {
        match self.entries.get(&ResourceHandle::from(framebuffer)).map(|e| &e.info) {
            Some(Info::Framebuffer(info)) => Some(info),
            _ => None,
        }
    }

    pub fn pipeline(&self, pipeline: GraphicsPipelineHandle) -> Option<&PipelineInfo> {
        match self.entries.get(&ResourceHandle::from(pipeline)).map(|e| &e.info) {
            Some(Info::GraphicsPipeline(info)) => Some(info),
            _ => None,
        }
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn insert(
        &mut self,
        handle: ResourceHandle,
        label: &'static str,
        info: Info,
        dependencies: Vec<ResourceHandle>,
    ) {
        log::debug!("created {handle} `{label}`");
        self.order.push(handle);
        self.entries.insert(handle, Entry { label, info, dependencies });
    }

    fn require(
        &self,
        kind: ResourceKind,
        label: &'static str,
        dependency: impl Into<ResourceHandle>,
    ) -> Result<(), CreationError> {
        let dependency = dependency.into();
        if self.entries.contains_key(&dependency) {
            Ok(())
        } else {
            Err(CreationError::MissingDependency { kind, label, dependency })
        }
    }

    fn invalid(kind: ResourceKind, label: &'static str, detail: impl Into<String>) -> CreationError {
        CreationError::InvalidDescriptor { kind, label, detail: detail.into() }
    }

    // ── shader modules ────────────────────────────────────────────────────

    pub fn create_shader_module<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &ShaderModuleDesc<'_>,
    ) -> Result<ShaderModuleHandle, CreationError> {
        let kind = ResourceKind::ShaderModule;
        let label = label_of(desc.label);
        match desc.code {
            ShaderCode::SpirV(bytes) if bytes.is_empty() || bytes.len() % 4 != 0 => {
                return Err(Self::invalid(
                    kind,
                    label,
                    format!("SPIR-V length {} is not a positive multiple of 4", bytes.len()),
                ));
            }
            ShaderCode::Wgsl("") => return Err(Self::invalid(kind, label, "empty WGSL source")),
            _ => {}
        }

        let module = staging::stage(desc, |d| device.create_shader_module(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        self.insert(module.into(), label, Info::ShaderModule, Vec::new());
        Ok(module)
    }

    // ── textures ──────────────────────────────────────────────────────────

    pub fn create_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &TextureDesc,
    ) -> Result<TextureHandle, CreationError> {
        let kind = ResourceKind::Texture;
        let label = label_of(desc.label);
        if desc.width == 0 || desc.height == 0 {
            return Err(Self::invalid(kind, label, "zero extent"));
        }
        if desc.mip_levels == 0 {
            return Err(Self::invalid(kind, label, "zero mip levels"));
        }
        if desc.usage.is_empty() {
            return Err(Self::invalid(kind, label, "no usage flags"));
        }

        let texture = staging::stage(desc, |d| device.create_texture(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = TextureInfo {
            format: desc.format,
            width: desc.width,
            height: desc.height,
            mip_levels: desc.mip_levels,
            usage: desc.usage,
            uploaded: false,
            coverage: TexelCoverage::new(desc.width, desc.height),
        };
        self.insert(texture.into(), label, Info::Texture(info), Vec::new());
        Ok(texture)
    }

    /// Uploads tightly packed pixels for the whole of mip level 0.
    pub fn upload_texture<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        texture: TextureHandle,
        pixels: &[u8],
    ) -> Result<(), CreationError> {
        let resource = ResourceHandle::from(texture);
        let Some(Info::Texture(info)) = self.entries.get(&resource).map(|e| &e.info) else {
            return Err(CreationError::MissingDependency {
                kind: ResourceKind::Texture,
                label: "upload",
                dependency: resource,
            });
        };
        let expected = info.level0_len();
        if pixels.len() as u64 != expected {
            return Err(CreationError::UploadSize { resource, expected, actual: pixels.len() as u64 });
        }
        let slice = TextureSlice::whole(texture, info.width, info.height);
        self.upload_texture_region(device, &slice, pixels)
    }

    /// Uploads tightly packed pixels into `slice`.
    pub fn upload_texture_region<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        slice: &TextureSlice,
        pixels: &[u8],
    ) -> Result<(), CreationError> {
        let resource = ResourceHandle::from(slice.texture);
        let label = self.label(resource).unwrap_or("unnamed");
        let Some(Entry { info: Info::Texture(info), .. }) = self.entries.get_mut(&resource) else {
            return Err(CreationError::MissingDependency {
                kind: ResourceKind::Texture,
                label: "upload",
                dependency: resource,
            });
        };
        let level_w = info.width.checked_shr(slice.level).unwrap_or(0).max(1);
        let level_h = info.height.checked_shr(slice.level).unwrap_or(0).max(1);
        let region = slice.rect.texel_region(level_w, level_h);
        let Some((x, y, w, h)) = region.filter(|_| slice.level < info.mip_levels) else {
            return Err(Self::invalid(
                ResourceKind::Texture,
                label,
                format!(
                    "upload region {:?} at level {} is outside the texture",
                    slice.rect, slice.level
                ),
            ));
        };
        let expected = w as u64 * h as u64 * info.format.bytes_per_pixel() as u64;
        if pixels.len() as u64 != expected {
            return Err(CreationError::UploadSize { resource, expected, actual: pixels.len() as u64 });
        }

        staging::stage(pixels, |p| device.set_texture_data(slice, p.get())).map_err(|source| {
            CreationError::Device { kind: ResourceKind::Texture, label, source }
        })?;
        if slice.level == 0 {
            info.coverage.add(x, y, w, h);
            info.uploaded = info.coverage.is_complete();
        }
        log::debug!("uploaded {} bytes to {resource}", pixels.len());
        Ok(())
    }

    // ── buffers ───────────────────────────────────────────────────────────

    pub fn create_buffer<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &BufferDesc,
    ) -> Result<BufferHandle, CreationError> {
        self.create_buffer_inner(device, desc, None)
    }

    /// Creates a vertex buffer whose contents are laid out with `stride`.
    pub fn create_vertex_buffer<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &BufferDesc,
        stride: u32,
    ) -> Result<BufferHandle, CreationError> {
        let label = label_of(desc.label);
        if !desc.usage.contains(BufferUsage::VERTEX) {
            return Err(Self::invalid(ResourceKind::Buffer, label, "vertex buffer without vertex usage"));
        }
        if stride == 0 {
            return Err(Self::invalid(ResourceKind::Buffer, label, "zero vertex stride"));
        }
        self.create_buffer_inner(device, desc, Some(stride))
    }

    fn create_buffer_inner<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &BufferDesc,
        vertex_stride: Option<u32>,
    ) -> Result<BufferHandle, CreationError> {
        let kind = ResourceKind::Buffer;
        let label = label_of(desc.label);
        if desc.size == 0 {
            return Err(Self::invalid(kind, label, "zero size"));
        }
        if desc.usage.is_empty() {
            return Err(Self::invalid(kind, label, "no usage flags"));
        }

        let buffer = staging::stage(desc, |d| device.create_buffer(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = BufferInfo { usage: desc.usage, size: desc.size, vertex_stride, written: 0 };
        self.insert(buffer.into(), label, Info::Buffer(info), Vec::new());
        Ok(buffer)
    }

    /// Writes `data` at `offset`.
    pub fn upload_buffer<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), CreationError> {
        let resource = ResourceHandle::from(buffer);
        let label = self.label(resource).unwrap_or("unnamed");
        let Some(Entry { info: Info::Buffer(info), .. }) = self.entries.get_mut(&resource) else {
            return Err(CreationError::MissingDependency {
                kind: ResourceKind::Buffer,
                label: "upload",
                dependency: resource,
            });
        };
        let len = data.len() as u64;
        let end = offset.checked_add(len);
        if end.is_none_or(|end| end > info.size) {
            return Err(CreationError::BufferOverflow { buffer: resource, offset, len, size: info.size });
        }

        staging::stage(data, |d| device.set_buffer_data(buffer, offset, d.get())).map_err(
            |source| CreationError::Device { kind: ResourceKind::Buffer, label, source },
        )?;
        if offset <= info.written {
            info.written = info.written.max(offset + len);
        }
        log::debug!("uploaded {len} bytes to {resource} at offset {offset}");
        Ok(())
    }

    /// Writes a slice of plain-old-data values starting at offset 0.
    pub fn upload_buffer_pod<D: Device + ?Sized, T: Pod>(
        &mut self,
        device: &mut D,
        buffer: BufferHandle,
        values: &[T],
    ) -> Result<(), CreationError> {
        staging::stage_slice_bytes(values, |bytes| {
            self.upload_buffer(device, buffer, 0, bytes.get())
        })
    }

    // ── render passes & targets ───────────────────────────────────────────

    pub fn create_render_pass<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &RenderPassDesc<'_>,
    ) -> Result<RenderPassHandle, CreationError> {
        let kind = ResourceKind::RenderPass;
        let label = label_of(desc.label);
        if desc.color_targets.is_empty() && desc.depth_stencil.is_none() {
            return Err(Self::invalid(kind, label, "no attachments"));
        }
        if let Some(first) = desc.color_targets.first() {
            if desc.color_targets.iter().any(|c| c.samples != first.samples) {
                return Err(Self::invalid(kind, label, "color targets disagree on sample count"));
            }
        }

        let render_pass = staging::stage(desc, |d| device.create_render_pass(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = RenderPassInfo {
            color_targets: desc.color_targets.to_vec(),
            depth_stencil: desc.depth_stencil,
        };
        self.insert(render_pass.into(), label, Info::RenderPass(info), Vec::new());
        Ok(render_pass)
    }

    /// Creates a color target over `slice`. The texture needs color-target usage.
    pub fn create_color_target<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        samples: SampleCount,
        slice: &TextureSlice,
    ) -> Result<ColorTargetHandle, CreationError> {
        let kind = ResourceKind::ColorTarget;
        let label = self.label(slice.texture).unwrap_or("unnamed");
        let Some(texture) = self.texture(slice.texture).cloned() else {
            return Err(CreationError::MissingDependency {
                kind,
                label,
                dependency: slice.texture.into(),
            });
        };
        if !texture.usage.contains(TextureUsage::COLOR_TARGET) {
            return Err(CreationError::WrongUsage {
                resource: slice.texture.into(),
                required: "color-target",
            });
        }
        let region = slice.rect.texel_region(texture.width, texture.height);
        let Some((_, _, width, height)) = region.filter(|_| slice.level < texture.mip_levels)
        else {
            return Err(Self::invalid(
                kind,
                label,
                format!("slice {:?} outside the texture", slice.rect),
            ));
        };

        let target = staging::stage(slice, |s| device.create_color_target(samples, s.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = ColorTargetInfo {
            texture: slice.texture,
            format: texture.format,
            samples,
            width,
            height,
        };
        self.insert(target.into(), label, Info::ColorTarget(info), vec![slice.texture.into()]);
        Ok(target)
    }

    pub fn create_depth_stencil_target<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
        format: DepthFormat,
    ) -> Result<DepthStencilTargetHandle, CreationError> {
        let kind = ResourceKind::DepthStencilTarget;
        let label = "depth-stencil";
        if width == 0 || height == 0 {
            return Err(Self::invalid(kind, label, "zero extent"));
        }

        let target = device
            .create_depth_stencil_target(width, height, format)
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = DepthStencilTargetInfo { format, width, height };
        self.insert(target.into(), label, Info::DepthStencilTarget(info), Vec::new());
        Ok(target)
    }

    // ── framebuffers ──────────────────────────────────────────────────────

    pub fn create_framebuffer<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &FramebufferDesc<'_>,
    ) -> Result<FramebufferHandle, CreationError> {
        let kind = ResourceKind::Framebuffer;
        let label = label_of(desc.label);
        let mismatch = |detail: String| CreationError::AttachmentMismatch { label, detail };

        self.require(kind, label, desc.render_pass)?;
        let pass = self.render_pass(desc.render_pass).cloned().ok_or(
            CreationError::MissingDependency { kind, label, dependency: desc.render_pass.into() },
        )?;
        if desc.width == 0 || desc.height == 0 {
            return Err(Self::invalid(kind, label, "zero extent"));
        }

        if desc.color_targets.len() != pass.color_targets.len() {
            return Err(mismatch(format!(
                "{} color targets bound, render pass declares {}",
                desc.color_targets.len(),
                pass.color_targets.len()
            )));
        }
        let mut dependencies = vec![ResourceHandle::from(desc.render_pass)];
        for (slot, (target, expected)) in
            desc.color_targets.iter().zip(&pass.color_targets).enumerate()
        {
            self.require(kind, label, *target)?;
            let Some(info) = self.color_target(*target) else {
                return Err(CreationError::MissingDependency {
                    kind,
                    label,
                    dependency: (*target).into(),
                });
            };
            if info.format != expected.format {
                return Err(mismatch(format!(
                    "slot {slot} is {:?}, render pass expects {:?}",
                    info.format, expected.format
                )));
            }
            if info.samples != expected.samples {
                return Err(mismatch(format!(
                    "slot {slot} samples {}x, render pass expects {}x",
                    info.samples.count(),
                    expected.samples.count()
                )));
            }
            if info.width < desc.width || info.height < desc.height {
                return Err(mismatch(format!(
                    "slot {slot} is {}x{}, smaller than the framebuffer",
                    info.width, info.height
                )));
            }
            dependencies.push((*target).into());
        }

        match (desc.depth_stencil_target, pass.depth_stencil) {
            (None, None) => {}
            (Some(target), Some(expected)) => {
                self.require(kind, label, target)?;
                let Some(info) = self.depth_stencil_target(target) else {
                    return Err(CreationError::MissingDependency {
                        kind,
                        label,
                        dependency: target.into(),
                    });
                };
                if info.format != expected.format {
                    return Err(mismatch(format!(
                        "depth-stencil target is {:?}, render pass expects {:?}",
                        info.format, expected.format
                    )));
                }
                dependencies.push(target.into());
            }
            (Some(_), None) => {
                return Err(mismatch("depth-stencil target bound to a pass without one".into()));
            }
            (None, Some(_)) => {
                return Err(mismatch("render pass requires a depth-stencil target".into()));
            }
        }

        let framebuffer = staging::stage(desc, |d| device.create_framebuffer(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = FramebufferInfo {
            render_pass: desc.render_pass,
            width: desc.width,
            height: desc.height,
            color_targets: desc.color_targets.to_vec(),
            depth_stencil_target: desc.depth_stencil_target,
        };
        self.insert(framebuffer.into(), label, Info::Framebuffer(info), dependencies);
        Ok(framebuffer)
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    pub fn create_graphics_pipeline<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<GraphicsPipelineHandle, CreationError> {
        let kind = ResourceKind::GraphicsPipeline;
        let label = label_of(desc.label);

        self.require(kind, label, desc.render_pass)?;
        self.require(kind, label, desc.vertex_shader.module)?;
        self.require(kind, label, desc.fragment_shader.module)?;
        let pass = self.render_pass(desc.render_pass).cloned().ok_or(
            CreationError::MissingDependency { kind, label, dependency: desc.render_pass.into() },
        )?;

        let targets = desc.color_blend_state.targets.len();
        if targets != pass.color_targets.len() {
            return Err(CreationError::BlendTargetCount {
                label,
                expected: pass.color_targets.len(),
                actual: targets,
            });
        }
        if desc.multisample_state.count != pass.sample_count() {
            return Err(CreationError::SampleCountMismatch {
                label,
                pass: pass.sample_count().count(),
                pipeline: desc.multisample_state.count.count(),
            });
        }
        for stage in [&desc.vertex_shader, &desc.fragment_shader] {
            if stage.entry_point.is_empty() {
                return Err(Self::invalid(kind, label, "empty shader entry point"));
            }
        }

        let input = &desc.vertex_input_state;
        for (i, binding) in input.bindings.iter().enumerate() {
            if binding.stride == 0 {
                return Err(Self::invalid(
                    kind,
                    label,
                    format!("vertex binding {} has zero stride", binding.binding),
                ));
            }
            if input.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                return Err(Self::invalid(
                    kind,
                    label,
                    format!("vertex binding {} declared twice", binding.binding),
                ));
            }
        }
        for (i, attr) in input.attributes.iter().enumerate() {
            let vertex_error =
                |detail: String| CreationError::VertexAttribute { label, location: attr.location, detail };
            if input.attributes[..i].iter().any(|a| a.location == attr.location) {
                return Err(vertex_error("location declared twice".into()));
            }
            let Some(binding) = input.bindings.iter().find(|b| b.binding == attr.binding) else {
                return Err(vertex_error(format!("references undeclared binding {}", attr.binding)));
            };
            let end = attr.offset.checked_add(attr.format.size_bytes());
            if end.is_none_or(|end| end > binding.stride) {
                return Err(vertex_error(format!(
                    "{:?} at offset {} overflows stride {}",
                    attr.format, attr.offset, binding.stride
                )));
            }
        }

        let pipeline = staging::stage(desc, |d| device.create_graphics_pipeline(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        let info = PipelineInfo {
            render_pass: desc.render_pass,
            vertex_bindings: input.bindings.to_vec(),
            vertex_uniform_size: desc.vertex_shader.uniform_buffer_size,
            fragment_uniform_size: desc.fragment_shader.uniform_buffer_size,
            vertex_sampler_count: desc.layout.vertex_sampler_binding_count,
            fragment_sampler_count: desc.layout.fragment_sampler_binding_count,
            primitive_type: desc.primitive_type,
        };
        let mut dependencies = vec![
            ResourceHandle::from(desc.render_pass),
            desc.vertex_shader.module.into(),
        ];
        if desc.fragment_shader.module != desc.vertex_shader.module {
            dependencies.push(desc.fragment_shader.module.into());
        }
        self.insert(pipeline.into(), label, Info::GraphicsPipeline(info), dependencies);
        Ok(pipeline)
    }

    // ── samplers ──────────────────────────────────────────────────────────

    pub fn create_sampler<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        desc: &SamplerDesc,
    ) -> Result<SamplerHandle, CreationError> {
        let kind = ResourceKind::Sampler;
        let label = label_of(desc.label);
        if desc.min_lod > desc.max_lod {
            return Err(Self::invalid(kind, label, "min_lod exceeds max_lod"));
        }
        if desc.anisotropy_enable && desc.max_anisotropy < 1.0 {
            return Err(Self::invalid(kind, label, "anisotropy enabled with max below 1"));
        }

        let sampler = staging::stage(desc, |d| device.create_sampler(d.get()))
            .map_err(|source| CreationError::Device { kind, label, source })?;
        self.insert(sampler.into(), label, Info::Sampler, Vec::new());
        Ok(sampler)
    }

    // ── destruction ───────────────────────────────────────────────────────

    /// First live resource that depends on `resource`.
    pub fn dependent_of(&self, resource: ResourceHandle) -> Option<ResourceHandle> {
        self.order
            .iter()
            .copied()
            .filter(|h| *h != resource)
            .find(|h| {
                self.entries
                    .get(h)
                    .is_some_and(|e| e.dependencies.contains(&resource))
            })
    }

    /// Destroys one resource. Fails while another live resource depends on it.
    pub fn destroy<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        resource: impl Into<ResourceHandle>,
    ) -> Result<(), DestroyError> {
        let resource: ResourceHandle = resource.into();
        if !self.entries.contains_key(&resource) {
            return Err(DestroyError::Unknown(resource));
        }
        if let Some(dependent) = self.dependent_of(resource) {
            return Err(DestroyError::InUse { resource, dependent });
        }
        self.release(device, resource)
    }

    fn release<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        resource: ResourceHandle,
    ) -> Result<(), DestroyError> {
        // The entry is dropped even when the device reports failure; the
        // handle is unusable either way.
        let entry = self.entries.remove(&resource);
        self.order.retain(|h| *h != resource);
        let result = device
            .destroy(resource)
            .map_err(|source| DestroyError::Device { resource, source });
        if let Some(entry) = entry {
            log::debug!("destroyed {resource} `{}`", entry.label);
        }
        result
    }

    /// Destroys every live resource in reverse creation order.
    ///
    /// Continues past device failures and returns the first one.
    pub fn teardown<D: Device + ?Sized>(&mut self, device: &mut D) -> Result<(), DestroyError> {
        let mut first_error = None;
        let order: Vec<ResourceHandle> = self.order.iter().rev().copied().collect();
        log::debug!("tearing down {} resources", order.len());
        for resource in order {
            if let Err(e) = self.release(device, resource) {
                log::warn!("teardown: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{FailPoint, RecordingDevice};
    use crate::device::{
        ColorBlendState, ColorTargetBlendState, DepthStencilState, DeviceError, LoadOp, LogicOp,
        MultisampleState, PipelineLayoutDesc, RasterizerState, Rect, ShaderStageState, StoreOp,
        VertexAttribute, VertexElementFormat, VertexInputRate, VertexInputState, ViewportState,
    };

    const SPIRV: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0, 0, 0, 0];

    fn color_desc() -> ColorTargetDescription {
        ColorTargetDescription {
            format: ColorFormat::R8G8B8A8,
            samples: SampleCount::One,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }
    }

    fn texture_desc(usage: TextureUsage) -> TextureDesc {
        TextureDesc {
            label: Some("tex"),
            format: ColorFormat::R8G8B8A8,
            width: 4,
            height: 2,
            mip_levels: 1,
            usage,
        }
    }

    fn module(graph: &mut ResourceGraph, device: &mut RecordingDevice) -> ShaderModuleHandle {
        graph
            .create_shader_module(device, &ShaderModuleDesc { label: Some("m"), code: ShaderCode::SpirV(&SPIRV) })
            .unwrap()
    }

    fn pass(graph: &mut ResourceGraph, device: &mut RecordingDevice) -> RenderPassHandle {
        let targets = [color_desc()];
        graph
            .create_render_pass(
                device,
                &RenderPassDesc { label: Some("pass"), color_targets: &targets, depth_stencil: None },
            )
            .unwrap()
    }

    fn pipeline_desc<'a>(
        pass: RenderPassHandle,
        module: ShaderModuleHandle,
        blend: &'a [ColorTargetBlendState],
        bindings: &'a [VertexBinding],
        attributes: &'a [VertexAttribute],
    ) -> GraphicsPipelineDesc<'a> {
        GraphicsPipelineDesc {
            label: Some("pipeline"),
            color_blend_state: ColorBlendState {
                logic_op_enable: false,
                logic_op: LogicOp::NoOp,
                blend_constants: [0.0; 4],
                targets: blend,
            },
            depth_stencil_state: DepthStencilState::disabled(),
            vertex_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 0 },
            fragment_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 16 },
            multisample_state: MultisampleState::default(),
            layout: PipelineLayoutDesc::default(),
            rasterizer_state: RasterizerState::default(),
            primitive_type: PrimitiveType::TriangleList,
            vertex_input_state: VertexInputState { bindings, attributes },
            viewport_state: ViewportState { viewports: &[], scissors: &[] },
            render_pass: pass,
        }
    }

    const BINDINGS: [VertexBinding; 1] =
        [VertexBinding { binding: 0, stride: 20, input_rate: VertexInputRate::Vertex }];
    const ATTRIBUTES: [VertexAttribute; 2] = [
        VertexAttribute { location: 0, binding: 0, format: VertexElementFormat::Vector3, offset: 0 },
        VertexAttribute { location: 1, binding: 0, format: VertexElementFormat::Vector2, offset: 12 },
    ];

    // ── creation order ────────────────────────────────────────────────────

    #[test]
    fn pipeline_before_render_pass_fails() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let m = module(&mut graph, &mut device);

        // A pass from another device/graph is unknown here.
        let mut other = ResourceGraph::new();
        let foreign = pass(&mut other, &mut RecordingDevice::new());

        let blend = [ColorTargetBlendState::opaque()];
        let err = graph
            .create_graphics_pipeline(&mut device, &pipeline_desc(foreign, m, &blend, &BINDINGS, &ATTRIBUTES))
            .unwrap_err();
        assert_eq!(
            err,
            CreationError::MissingDependency {
                kind: ResourceKind::GraphicsPipeline,
                label: "pipeline",
                dependency: foreign.into(),
            }
        );
    }

    #[test]
    fn pipeline_validates_blend_targets_and_attributes() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let m = module(&mut graph, &mut device);
        let p = pass(&mut graph, &mut device);

        let err = graph
            .create_graphics_pipeline(&mut device, &pipeline_desc(p, m, &[], &BINDINGS, &ATTRIBUTES))
            .unwrap_err();
        assert!(matches!(err, CreationError::BlendTargetCount { expected: 1, actual: 0, .. }));

        let blend = [ColorTargetBlendState::opaque()];
        let overflowing = [VertexAttribute {
            location: 0,
            binding: 0,
            format: VertexElementFormat::Vector3,
            offset: 12,
        }];
        let err = graph
            .create_graphics_pipeline(&mut device, &pipeline_desc(p, m, &blend, &BINDINGS, &overflowing))
            .unwrap_err();
        assert!(matches!(err, CreationError::VertexAttribute { location: 0, .. }));

        let wrapping = [VertexAttribute {
            location: 0,
            binding: 0,
            format: VertexElementFormat::Vector2,
            offset: u32::MAX,
        }];
        let err = graph
            .create_graphics_pipeline(&mut device, &pipeline_desc(p, m, &blend, &BINDINGS, &wrapping))
            .unwrap_err();
        assert!(matches!(err, CreationError::VertexAttribute { location: 0, .. }));

        let stray = [VertexAttribute {
            location: 0,
            binding: 3,
            format: VertexElementFormat::Single,
            offset: 0,
        }];
        let err = graph
            .create_graphics_pipeline(&mut device, &pipeline_desc(p, m, &blend, &BINDINGS, &stray))
            .unwrap_err();
        assert!(matches!(err, CreationError::VertexAttribute { .. }));

        let pipeline = graph
            .create_graphics_pipeline(&mut device, &pipeline_desc(p, m, &blend, &BINDINGS, &ATTRIBUTES))
            .unwrap();
        assert_eq!(graph.pipeline(pipeline).unwrap().vertex_bindings[0].stride, 20);
    }

    #[test]
    fn shader_module_length_must_be_word_aligned() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let err = graph
            .create_shader_module(
                &mut device,
                &ShaderModuleDesc { label: None, code: ShaderCode::SpirV(&SPIRV[..6]) },
            )
            .unwrap_err();
        assert!(matches!(err, CreationError::InvalidDescriptor { .. }));
        assert_eq!(device.live_resources(), 0);
    }

    // ── uploads ───────────────────────────────────────────────────────────

    #[test]
    fn texture_upload_size_must_match_extent() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let tex = graph.create_texture(&mut device, &texture_desc(TextureUsage::SAMPLER)).unwrap();

        let err = graph.upload_texture(&mut device, tex, &[0u8; 31]).unwrap_err();
        assert!(matches!(err, CreationError::UploadSize { expected: 32, actual: 31, .. }));
        assert!(!graph.texture(tex).unwrap().uploaded);

        graph.upload_texture(&mut device, tex, &[0u8; 32]).unwrap();
        assert!(graph.texture(tex).unwrap().uploaded);
    }

    #[test]
    fn texture_is_uploaded_only_once_level0_is_covered() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let tex = graph.create_texture(&mut device, &texture_desc(TextureUsage::SAMPLER)).unwrap();
        let region = |rect: Rect| TextureSlice { rect, ..TextureSlice::whole(tex, 4, 2) };

        graph.upload_texture_region(&mut device, &region(Rect::new(0, 0, 1, 1)), &[0u8; 4]).unwrap();
        assert!(!graph.texture(tex).unwrap().uploaded);
        graph.upload_texture_region(&mut device, &region(Rect::new(0, 1, 4, 1)), &[0u8; 16]).unwrap();
        assert!(!graph.texture(tex).unwrap().uploaded);
        graph.upload_texture_region(&mut device, &region(Rect::new(1, 0, 3, 1)), &[0u8; 12]).unwrap();
        assert!(graph.texture(tex).unwrap().uploaded);
    }

    #[test]
    fn upload_to_a_smaller_mip_does_not_complete_level0() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let desc = TextureDesc { mip_levels: 2, ..texture_desc(TextureUsage::SAMPLER) };
        let tex = graph.create_texture(&mut device, &desc).unwrap();
        let level1 = TextureSlice { rect: Rect::from_size(2, 1), level: 1, ..TextureSlice::whole(tex, 4, 2) };
        graph.upload_texture_region(&mut device, &level1, &[0u8; 8]).unwrap();
        assert!(!graph.texture(tex).unwrap().uploaded);
    }

    #[test]
    fn extreme_upload_regions_are_rejected() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let tex = graph.create_texture(&mut device, &texture_desc(TextureUsage::SAMPLER)).unwrap();
        for rect in [
            Rect::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX),
            Rect::new(1, 0, i32::MAX, 1),
            Rect::new(i32::MIN, 0, i32::MIN, 1),
        ] {
            let slice = TextureSlice { rect, ..TextureSlice::whole(tex, 4, 2) };
            let err = graph.upload_texture_region(&mut device, &slice, &[0u8; 4]).unwrap_err();
            assert!(matches!(err, CreationError::InvalidDescriptor { .. }), "{rect:?}: {err:?}");
        }
        let deep = TextureSlice { level: 40, ..TextureSlice::whole(tex, 1, 1) };
        assert!(graph.upload_texture_region(&mut device, &deep, &[0u8; 4]).is_err());
        assert!(!graph.texture(tex).unwrap().uploaded);
    }

    #[test]
    fn buffer_upload_tracks_contiguous_prefix() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let desc = BufferDesc { label: Some("vb"), usage: BufferUsage::VERTEX, size: 60 };
        let vb = graph.create_vertex_buffer(&mut device, &desc, 20).unwrap();

        graph.upload_buffer(&mut device, vb, 40, &[0u8; 20]).unwrap();
        assert!(!graph.buffer(vb).unwrap().uploaded());
        graph.upload_buffer(&mut device, vb, 0, &[0u8; 40]).unwrap();
        assert_eq!(graph.buffer(vb).unwrap().written, 40);
        graph.upload_buffer(&mut device, vb, 20, &[0u8; 40]).unwrap();
        assert!(graph.buffer(vb).unwrap().uploaded());

        let err = graph.upload_buffer(&mut device, vb, 50, &[0u8; 20]).unwrap_err();
        assert!(matches!(err, CreationError::BufferOverflow { offset: 50, len: 20, size: 60, .. }));
    }

    // ── targets & framebuffers ────────────────────────────────────────────

    #[test]
    fn color_target_requires_color_target_usage() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let tex = graph.create_texture(&mut device, &texture_desc(TextureUsage::SAMPLER)).unwrap();
        let err = graph
            .create_color_target(&mut device, SampleCount::One, &TextureSlice::whole(tex, 4, 2))
            .unwrap_err();
        assert_eq!(
            err,
            CreationError::WrongUsage { resource: tex.into(), required: "color-target" }
        );
    }

    #[test]
    fn framebuffer_attachment_count_must_match_pass() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let p = pass(&mut graph, &mut device);
        let err = graph
            .create_framebuffer(
                &mut device,
                &FramebufferDesc {
                    label: Some("fb"),
                    width: 4,
                    height: 2,
                    render_pass: p,
                    color_targets: &[],
                    depth_stencil_target: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, CreationError::AttachmentMismatch { label: "fb", .. }));
    }

    #[test]
    fn framebuffer_requires_depth_when_pass_declares_it() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let targets = [color_desc()];
        let depth = DepthStencilTargetDescription {
            format: DepthFormat::D32SfloatS8Uint,
            load_op: LoadOp::Clear,
            store_op: StoreOp::DontCare,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
        };
        let p = graph
            .create_render_pass(
                &mut device,
                &RenderPassDesc { label: None, color_targets: &targets, depth_stencil: Some(depth) },
            )
            .unwrap();
        let tex = graph
            .create_texture(&mut device, &texture_desc(TextureUsage::COLOR_TARGET))
            .unwrap();
        let color = graph
            .create_color_target(&mut device, SampleCount::One, &TextureSlice::whole(tex, 4, 2))
            .unwrap();
        let mut desc = FramebufferDesc {
            label: Some("fb"),
            width: 4,
            height: 2,
            render_pass: p,
            color_targets: &[color],
            depth_stencil_target: None,
        };
        assert!(graph.create_framebuffer(&mut device, &desc).is_err());

        let wrong = graph
            .create_depth_stencil_target(&mut device, 4, 2, DepthFormat::D16Unorm)
            .unwrap();
        desc.depth_stencil_target = Some(wrong);
        assert!(matches!(
            graph.create_framebuffer(&mut device, &desc),
            Err(CreationError::AttachmentMismatch { .. })
        ));

        let ds = graph
            .create_depth_stencil_target(&mut device, 4, 2, DepthFormat::D32SfloatS8Uint)
            .unwrap();
        desc.depth_stencil_target = Some(ds);
        let fb = graph.create_framebuffer(&mut device, &desc).unwrap();
        let expected = [
            ResourceHandle::from(p),
            ResourceHandle::from(color),
            ResourceHandle::from(ds),
        ];
        assert_eq!(graph.dependencies(fb), &expected);
    }

    // ── destruction ───────────────────────────────────────────────────────

    #[test]
    fn destroy_refuses_referenced_target() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let p = pass(&mut graph, &mut device);
        let tex = graph
            .create_texture(&mut device, &texture_desc(TextureUsage::COLOR_TARGET))
            .unwrap();
        let color = graph
            .create_color_target(&mut device, SampleCount::One, &TextureSlice::whole(tex, 4, 2))
            .unwrap();
        let fb = graph
            .create_framebuffer(
                &mut device,
                &FramebufferDesc {
                    label: Some("fb"),
                    width: 4,
                    height: 2,
                    render_pass: p,
                    color_targets: &[color],
                    depth_stencil_target: None,
                },
            )
            .unwrap();

        assert_eq!(
            graph.destroy(&mut device, color),
            Err(DestroyError::InUse { resource: color.into(), dependent: fb.into() })
        );
        graph.destroy(&mut device, fb).unwrap();
        graph.destroy(&mut device, color).unwrap();
        assert_eq!(graph.destroy(&mut device, color), Err(DestroyError::Unknown(color.into())));
    }

    #[test]
    fn teardown_runs_in_reverse_creation_order() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let m = module(&mut graph, &mut device);
        let tex = graph.create_texture(&mut device, &texture_desc(TextureUsage::SAMPLER)).unwrap();
        let p = pass(&mut graph, &mut device);
        let expected: Vec<ResourceHandle> = vec![p.into(), tex.into(), m.into()];

        graph.teardown(&mut device).unwrap();
        assert_eq!(device.destroyed(), expected.as_slice());
        assert!(graph.is_empty());
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn device_failure_keeps_earlier_resources_registered() {
        let mut device = RecordingDevice::new();
        let mut graph = ResourceGraph::new();
        let m = module(&mut graph, &mut device);
        device.fail_next(FailPoint::Create(ResourceKind::RenderPass), DeviceError::OutOfMemory);
        let targets = [color_desc()];
        let err = graph
            .create_render_pass(
                &mut device,
                &RenderPassDesc { label: Some("pass"), color_targets: &targets, depth_stencil: None },
            )
            .unwrap_err();
        assert_eq!(
            err,
            CreationError::Device {
                kind: ResourceKind::RenderPass,
                label: "pass",
                source: DeviceError::OutOfMemory,
            }
        );
        assert_eq!(graph.creation_order().collect::<Vec<_>>(), vec![ResourceHandle::from(m)]);
        graph.teardown(&mut device).unwrap();
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    fn creation_calls_are_staged() {
        let mut device = RecordingDevice::new().require_staging(true);
        let mut graph = ResourceGraph::new();
        module(&mut graph, &mut device);
        let p = pass(&mut graph, &mut device);
        let tex = graph
            .create_texture(&mut device, &texture_desc(TextureUsage::SAMPLER | TextureUsage::COLOR_TARGET))
            .unwrap();
        graph.upload_texture(&mut device, tex, &[7u8; 32]).unwrap();
        let color = graph
            .create_color_target(&mut device, SampleCount::One, &TextureSlice::whole(tex, 4, 2))
            .unwrap();
        graph
            .create_framebuffer(
                &mut device,
                &FramebufferDesc {
                    label: None,
                    width: 4,
                    height: 2,
                    render_pass: p,
                    color_targets: &[color],
                    depth_stencil_target: None,
                },
            )
            .unwrap();
        assert!(device.violations().is_empty());
        assert_eq!(staging::live_scopes(), 0);
    }
}
