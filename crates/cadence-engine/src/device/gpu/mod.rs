//! wgpu backend bound to a window surface.
//!
//! Creation calls map directly onto wgpu objects. Per-frame calls are
//! recorded into a command list and replayed into a single encoder at
//! [`submit`](Device::submit), where the swap image is acquired if the list
//! presents.
//!
//! Shaders see a fixed bind group layout (see `bindings`): vertex uniforms in
//! group 0, fragment uniforms in group 1, fragment samplers in group 2 with
//! the texture at binding `2i` and its sampler at `2i + 1`.

mod bindings;
mod context;
mod convert;
mod present;
mod replay;

use std::collections::HashMap;
use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use self::bindings::Bindings;
use self::context::GpuContext;
use self::present::Blitter;
use self::replay::{CommandList, Phase, Recorded, SwapImage};

use super::api::Device;
use super::error::DeviceError;
use super::handle::{
    BufferHandle, ColorTargetHandle, CommandBufferHandle, DepthStencilTargetHandle,
    FramebufferHandle, GraphicsPipelineHandle, HandleAllocator, RenderPassHandle, ResourceHandle,
    SamplerHandle, ShaderModuleHandle, TextureHandle,
};
use super::types::{
    BufferDesc, BufferUsage, ColorFormat, ColorTargetDescription, DepthFormat,
    DepthStencilTargetDescription, DrawPrimitives, Filter, FramebufferDesc, GraphicsPipelineDesc,
    PrimitiveType, Rect, RenderPassBegin, RenderPassDesc, SampleCount, SamplerAddressMode,
    SamplerDesc, ShaderCode, ShaderModuleDesc, ShaderStage, TextureDesc, TextureSlice,
    TextureUsage, Viewport,
};

pub use self::context::GpuInit;

const SPIRV_MAGIC: u32 = 0x0723_0203;

struct TextureEntry {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: ColorFormat,
    width: u32,
    height: u32,
    mip_levels: u32,
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    size: u64,
}

struct PassEntry {
    label: Option<&'static str>,
    colors: Vec<ColorTargetDescription>,
    depth: Option<DepthStencilTargetDescription>,
}

struct ColorTargetEntry {
    /// Multisampled attachment when samples > 1, otherwise the texture slice.
    view: wgpu::TextureView,
    resolve: Option<wgpu::TextureView>,
    _msaa: Option<wgpu::Texture>,
    samples: SampleCount,
}

struct DepthTargetEntry {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: DepthFormat,
}

struct FramebufferEntry {
    render_pass: RenderPassHandle,
    colors: Vec<ColorTargetHandle>,
    depth: Option<DepthStencilTargetHandle>,
    width: u32,
    height: u32,
}

struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
    vertex_uniform_size: u64,
    fragment_uniform_size: u64,
    fragment_sampler_count: u32,
    primitive_type: PrimitiveType,
    viewport: Option<Viewport>,
    scissor: Option<Rect>,
    blend_constant: wgpu::Color,
    stencil_reference: u32,
}

enum Resource {
    ShaderModule(wgpu::ShaderModule),
    Texture(TextureEntry),
    Buffer(BufferEntry),
    RenderPass(PassEntry),
    ColorTarget(ColorTargetEntry),
    DepthStencilTarget(DepthTargetEntry),
    Framebuffer(FramebufferEntry),
    GraphicsPipeline(PipelineEntry),
    Sampler(wgpu::Sampler),
}

macro_rules! lookup {
    ($name:ident, $handle:ty, $variant:ident, $entry:ty) => {
        fn $name(&self, handle: $handle) -> Result<&$entry, DeviceError> {
            let key: ResourceHandle = handle.into();
            match self.resources.get(&key) {
                Some(Resource::$variant(entry)) => Ok(entry),
                _ => Err(DeviceError::InvalidHandle(key)),
            }
        }
    };
}

/// [`Device`] implementation over wgpu.
pub struct WgpuDevice {
    ctx: GpuContext,
    ids: HandleAllocator,
    resources: HashMap<ResourceHandle, Resource>,
    lists: HashMap<CommandBufferHandle, CommandList>,
    bindings: Bindings,
    blitter: Blitter,
}

impl WgpuDevice {
    /// Creates the device and configures the window's surface.
    pub async fn new(window: Arc<Window>, init: GpuInit) -> anyhow::Result<Self> {
        let ctx = GpuContext::new(window, init).await?;
        let bindings = Bindings::new(&ctx.device);
        let blitter = Blitter::new(&ctx.device, ctx.surface_format());
        Ok(Self {
            ctx,
            ids: HandleAllocator::new(),
            resources: HashMap::new(),
            lists: HashMap::new(),
            bindings,
            blitter,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        self.ctx.window()
    }

    /// Current swap image size in physical pixels.
    pub fn surface_size(&self) -> PhysicalSize<u32> {
        self.ctx.size()
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.ctx.surface_format()
    }

    /// Reconfigures the surface for a new window size.
    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        log::debug!("surface resized to {}x{}", size.width, size.height);
        self.ctx.resize(size);
    }

    lookup!(render_pass, RenderPassHandle, RenderPass, PassEntry);
    lookup!(texture, TextureHandle, Texture, TextureEntry);
    lookup!(buffer, BufferHandle, Buffer, BufferEntry);
    lookup!(shader_module, ShaderModuleHandle, ShaderModule, wgpu::ShaderModule);
    lookup!(color_target, ColorTargetHandle, ColorTarget, ColorTargetEntry);
    lookup!(depth_target, DepthStencilTargetHandle, DepthStencilTarget, DepthTargetEntry);
    lookup!(framebuffer, FramebufferHandle, Framebuffer, FramebufferEntry);
    lookup!(pipeline, GraphicsPipelineHandle, GraphicsPipeline, PipelineEntry);
    lookup!(sampler, SamplerHandle, Sampler, wgpu::Sampler);

    fn insert(&mut self, handle: ResourceHandle, resource: Resource) {
        log::trace!("wgpu device: created {handle}");
        self.resources.insert(handle, resource);
    }

    fn list_mut(&mut self, command_buffer: CommandBufferHandle) -> Result<&mut CommandList, DeviceError> {
        self.lists
            .get_mut(&command_buffer)
            .ok_or(DeviceError::InvalidCommandBuffer(command_buffer.raw().get()))
    }

    /// Bound pipeline of a command list in a render pass.
    fn pass_pipeline(
        &self,
        command_buffer: CommandBufferHandle,
        call: &'static str,
    ) -> Result<&PipelineEntry, DeviceError> {
        let list = self
            .lists
            .get(&command_buffer)
            .ok_or(DeviceError::InvalidCommandBuffer(command_buffer.raw().get()))?;
        list.expect(Phase::InPass, call)?;
        self.pipeline(list.bound_pipeline(call)?)
    }

    fn vertex_buffers(
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<Vec<(u64, wgpu::VertexStepMode, Vec<wgpu::VertexAttribute>)>, DeviceError> {
        let input = &desc.vertex_input_state;
        let mut bindings = input.bindings.to_vec();
        bindings.sort_by_key(|b| b.binding);
        if bindings.iter().zip(0u32..).any(|(b, i)| b.binding != i) {
            return Err(DeviceError::Unsupported(
                "vertex bindings must be numbered contiguously from 0".into(),
            ));
        }
        if let Some(a) = input.attributes.iter().find(|a| a.binding as usize >= bindings.len()) {
            return Err(DeviceError::Validation(format!(
                "vertex attribute {} uses undeclared binding {}",
                a.location, a.binding
            )));
        }
        Ok(bindings
            .iter()
            .map(|b| {
                let attributes = input
                    .attributes
                    .iter()
                    .filter(|a| a.binding == b.binding)
                    .map(|a| wgpu::VertexAttribute {
                        format: convert::vertex_format(a.format),
                        offset: a.offset as u64,
                        shader_location: a.location,
                    })
                    .collect();
                (b.stride as u64, convert::step_mode(b.input_rate), attributes)
            })
            .collect())
    }
}

impl Device for WgpuDevice {
    fn backend_name(&self) -> &'static str {
        "wgpu"
    }

    fn create_shader_module(
        &mut self,
        desc: &ShaderModuleDesc<'_>,
    ) -> Result<ShaderModuleHandle, DeviceError> {
        let source = match desc.code {
            ShaderCode::SpirV(bytes) => {
                let magic = bytes.get(..4).map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
                if bytes.len() % 4 != 0 || magic != Some(SPIRV_MAGIC) {
                    return Err(DeviceError::Validation(
                        "shader code is not little-endian SPIR-V".into(),
                    ));
                }
                wgpu::util::make_spirv(bytes)
            }
            ShaderCode::Wgsl(src) => wgpu::ShaderSource::Wgsl(src.into()),
        };
        let module = self
            .ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor { label: desc.label, source });
        let handle = ShaderModuleHandle::from_raw(self.ids.next_raw());
        self.insert(handle.into(), Resource::ShaderModule(module));
        Ok(handle)
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, DeviceError> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(DeviceError::Validation(format!(
                "texture {}x{} with {} mip levels",
                desc.width, desc.height, desc.mip_levels
            )));
        }
        if desc.usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
            return Err(DeviceError::Unsupported(
                "color textures cannot be depth-stencil targets".into(),
            ));
        }
        let mut usage = wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC;
        // Presentation samples the source texture, so color targets are
        // always bindable.
        if desc.usage.intersects(TextureUsage::SAMPLER | TextureUsage::COLOR_TARGET) {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if desc.usage.contains(TextureUsage::COLOR_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::color_format(desc.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = TextureHandle::from_raw(self.ids.next_raw());
        self.insert(
            handle.into(),
            Resource::Texture(TextureEntry {
                texture,
                view,
                format: desc.format,
                width: desc.width,
                height: desc.height,
                mip_levels: desc.mip_levels,
            }),
        );
        Ok(handle)
    }

    fn set_texture_data(&mut self, slice: &TextureSlice, data: &[u8]) -> Result<(), DeviceError> {
        let entry = self.texture(slice.texture)?;
        if slice.level >= entry.mip_levels || slice.layer != 0 {
            return Err(DeviceError::Validation(format!(
                "texture level {} layer {} out of range",
                slice.level, slice.layer
            )));
        }
        let level_w = entry.width.checked_shr(slice.level).unwrap_or(0).max(1);
        let level_h = entry.height.checked_shr(slice.level).unwrap_or(0).max(1);
        let Some((x, y, w, h)) = slice.rect.texel_region(level_w, level_h) else {
            return Err(DeviceError::Validation(format!(
                "upload rect {:?} outside {level_w}x{level_h} level",
                slice.rect
            )));
        };
        let bytes_per_row = w * entry.format.bytes_per_pixel();
        let expected = bytes_per_row as usize * h as usize;
        if data.len() != expected {
            return Err(DeviceError::Validation(format!(
                "texture upload is {} bytes, region needs {expected}",
                data.len()
            )));
        }
        self.ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: slice.level,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
        if desc.size == 0 {
            return Err(DeviceError::Validation("buffer size is 0".into()));
        }
        let mut usage = wgpu::BufferUsages::COPY_DST;
        if desc.usage.contains(BufferUsage::VERTEX) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        if desc.usage.contains(BufferUsage::INDEX) {
            usage |= wgpu::BufferUsages::INDEX;
        }
        let size = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label,
            size,
            usage,
            mapped_at_creation: false,
        });
        let handle = BufferHandle::from_raw(self.ids.next_raw());
        self.insert(handle.into(), Resource::Buffer(BufferEntry { buffer, size: desc.size }));
        Ok(handle)
    }

    fn set_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let entry = self.buffer(buffer)?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(DeviceError::Validation(format!(
                "buffer write offset {offset} is not 4-byte aligned"
            )));
        }
        if offset.checked_add(data.len() as u64).is_none_or(|end| end > entry.size) {
            return Err(DeviceError::Validation(format!(
                "buffer write of {} bytes at {offset} exceeds size {}",
                data.len(),
                entry.size
            )));
        }
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.ctx.queue.write_buffer(&entry.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(4), 0);
            self.ctx.queue.write_buffer(&entry.buffer, offset, &padded);
        }
        Ok(())
    }

    fn create_render_pass(
        &mut self,
        desc: &RenderPassDesc<'_>,
    ) -> Result<RenderPassHandle, DeviceError> {
        if desc.color_targets.is_empty() && desc.depth_stencil.is_none() {
            return Err(DeviceError::Validation("render pass has no attachments".into()));
        }
        let handle = RenderPassHandle::from_raw(self.ids.next_raw());
        self.insert(
            handle.into(),
            Resource::RenderPass(PassEntry {
                label: desc.label,
                colors: desc.color_targets.to_vec(),
                depth: desc.depth_stencil,
            }),
        );
        Ok(handle)
    }

    fn create_color_target(
        &mut self,
        samples: SampleCount,
        slice: &TextureSlice,
    ) -> Result<ColorTargetHandle, DeviceError> {
        let entry = self.texture(slice.texture)?;
        if slice.level >= entry.mip_levels || slice.layer != 0 {
            return Err(DeviceError::Validation(format!(
                "color target level {} layer {} out of range",
                slice.level, slice.layer
            )));
        }
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("cadence color target"),
            base_mip_level: slice.level,
            mip_level_count: Some(1),
            ..Default::default()
        });
        let target = if samples == SampleCount::One {
            ColorTargetEntry { view, resolve: None, _msaa: None, samples }
        } else {
            let msaa = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("cadence msaa color target"),
                size: wgpu::Extent3d {
                    width: entry.width.checked_shr(slice.level).unwrap_or(0).max(1),
                    height: entry.height.checked_shr(slice.level).unwrap_or(0).max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: samples.count(),
                dimension: wgpu::TextureDimension::D2,
                format: convert::color_format(entry.format),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let msaa_view = msaa.create_view(&wgpu::TextureViewDescriptor::default());
            ColorTargetEntry { view: msaa_view, resolve: Some(view), _msaa: Some(msaa), samples }
        };
        let handle = ColorTargetHandle::from_raw(self.ids.next_raw());
        self.insert(handle.into(), Resource::ColorTarget(target));
        Ok(handle)
    }

    fn create_depth_stencil_target(
        &mut self,
        width: u32,
        height: u32,
        format: DepthFormat,
    ) -> Result<DepthStencilTargetHandle, DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::Validation("depth target has zero size".into()));
        }
        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("cadence depth target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert::depth_format(format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let handle = DepthStencilTargetHandle::from_raw(self.ids.next_raw());
        self.insert(
            handle.into(),
            Resource::DepthStencilTarget(DepthTargetEntry { _texture: texture, view, format }),
        );
        Ok(handle)
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDesc<'_>,
    ) -> Result<FramebufferHandle, DeviceError> {
        let pass = self.render_pass(desc.render_pass)?;
        if pass.colors.len() != desc.color_targets.len()
            || pass.depth.is_some() != desc.depth_stencil_target.is_some()
        {
            return Err(DeviceError::Validation(
                "framebuffer attachments do not match the render pass".into(),
            ));
        }
        for (handle, expected) in desc.color_targets.iter().zip(&pass.colors) {
            let target = self.color_target(*handle)?;
            if target.samples != expected.samples {
                return Err(DeviceError::Validation(format!(
                    "color target has {:?} samples, render pass expects {:?}",
                    target.samples, expected.samples
                )));
            }
        }
        if let Some(depth) = desc.depth_stencil_target {
            self.depth_target(depth)?;
            if pass.colors.iter().any(|c| c.samples != SampleCount::One) {
                return Err(DeviceError::Unsupported(
                    "depth targets are single-sampled".into(),
                ));
            }
        }
        let handle = FramebufferHandle::from_raw(self.ids.next_raw());
        self.insert(
            handle.into(),
            Resource::Framebuffer(FramebufferEntry {
                render_pass: desc.render_pass,
                colors: desc.color_targets.to_vec(),
                depth: desc.depth_stencil_target,
                width: desc.width,
                height: desc.height,
            }),
        );
        Ok(handle)
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<GraphicsPipelineHandle, DeviceError> {
        if desc.layout.vertex_sampler_binding_count > 0 {
            return Err(DeviceError::Unsupported("vertex stage samplers".into()));
        }
        let blend = &desc.color_blend_state;
        if blend.logic_op_enable {
            return Err(DeviceError::Unsupported("color logic ops".into()));
        }
        let vertex_uniform_size = desc.vertex_shader.uniform_buffer_size;
        let fragment_uniform_size = desc.fragment_shader.uniform_buffer_size;
        let fragment_sampler_count = desc.layout.fragment_sampler_binding_count;
        let layout = self.bindings.pipeline_layout(
            &self.ctx.device,
            vertex_uniform_size,
            fragment_uniform_size,
            fragment_sampler_count,
        );
        let pass = self.render_pass(desc.render_pass)?;
        if blend.targets.len() != pass.colors.len() {
            return Err(DeviceError::Validation(format!(
                "{} blend states for {} color targets",
                blend.targets.len(),
                pass.colors.len()
            )));
        }
        let vertex_module = self.shader_module(desc.vertex_shader.module)?;
        let fragment_module = self.shader_module(desc.fragment_shader.module)?;
        let features = self.ctx.features();
        let raster = &desc.rasterizer_state;
        if raster.line_width != 1.0 {
            log::debug!("line width {} ignored", raster.line_width);
        }

        let targets: Vec<Option<wgpu::ColorTargetState>> = pass
            .colors
            .iter()
            .zip(blend.targets)
            .map(|(color, state)| {
                Some(wgpu::ColorTargetState {
                    format: convert::color_format(color.format),
                    blend: convert::blend_state(state),
                    write_mask: convert::color_writes(state.write_mask),
                })
            })
            .collect();

        let ds = &desc.depth_stencil_state;
        let depth_stencil = pass.depth.map(|target| wgpu::DepthStencilState {
            format: convert::depth_format(target.format),
            depth_write_enabled: ds.depth_test_enable && ds.depth_write_enable,
            depth_compare: if ds.depth_test_enable {
                convert::compare(ds.compare_op)
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: if ds.stencil_test_enable {
                wgpu::StencilState {
                    front: convert::stencil_face(&ds.front_stencil),
                    back: convert::stencil_face(&ds.back_stencil),
                    read_mask: ds.front_stencil.compare_mask,
                    write_mask: ds.front_stencil.write_mask,
                }
            } else {
                wgpu::StencilState::default()
            },
            bias: if raster.depth_bias_enable {
                wgpu::DepthBiasState {
                    constant: raster.depth_bias_constant_factor as i32,
                    slope_scale: raster.depth_bias_slope_factor,
                    clamp: raster.depth_bias_clamp,
                }
            } else {
                wgpu::DepthBiasState::default()
            },
        });

        let primitive = wgpu::PrimitiveState {
            topology: convert::topology(desc.primitive_type),
            strip_index_format: None,
            front_face: convert::front_face(raster.front_face),
            cull_mode: convert::cull_mode(raster.cull_mode)?,
            polygon_mode: convert::polygon_mode(raster.fill_mode, features)?,
            unclipped_depth: raster.depth_clamp_enable
                && features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            conservative: false,
        };

        let vertex_buffers = Self::vertex_buffers(desc)?;
        let buffer_layouts: Vec<wgpu::VertexBufferLayout<'_>> = vertex_buffers
            .iter()
            .map(|(stride, step_mode, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: *step_mode,
                attributes,
            })
            .collect();

        let pipeline = self.ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: desc.label,
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some(desc.vertex_shader.entry_point),
                compilation_options: Default::default(),
                buffers: &buffer_layouts,
            },
            fragment: Some(wgpu::FragmentState {
                module: fragment_module,
                entry_point: Some(desc.fragment_shader.entry_point),
                compilation_options: Default::default(),
                targets: &targets,
            }),
            primitive,
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: desc.multisample_state.count.count(),
                mask: desc.multisample_state.sample_mask as u64,
                alpha_to_coverage_enabled: false,
            },
            multiview_mask: None,
            cache: None,
        });

        let [r, g, b, a] = blend.blend_constants.map(f64::from);
        let entry = PipelineEntry {
            pipeline,
            vertex_uniform_size,
            fragment_uniform_size,
            fragment_sampler_count,
            primitive_type: desc.primitive_type,
            viewport: desc.viewport_state.viewports.first().copied(),
            scissor: desc.viewport_state.scissors.first().copied(),
            blend_constant: wgpu::Color { r, g, b, a },
            stencil_reference: ds.front_stencil.reference,
        };
        let handle = GraphicsPipelineHandle::from_raw(self.ids.next_raw());
        self.insert(handle.into(), Resource::GraphicsPipeline(entry));
        Ok(handle)
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError> {
        if desc.min_lod > desc.max_lod {
            return Err(DeviceError::Validation("sampler min_lod exceeds max_lod".into()));
        }
        if desc.compare_enable {
            return Err(DeviceError::Unsupported("comparison samplers".into()));
        }
        let features = self.ctx.features();
        let modes = [desc.address_mode_u, desc.address_mode_v, desc.address_mode_w];
        let uses_border = modes.contains(&SamplerAddressMode::ClampToBorder)
            && features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let all_linear = desc.min_filter == Filter::Linear && desc.mag_filter == Filter::Linear;
        // wgpu only accepts anisotropy with linear filtering everywhere.
        let anisotropy_clamp = if desc.anisotropy_enable && all_linear {
            (desc.max_anisotropy as u16).clamp(1, 16)
        } else {
            1
        };
        let sampler = self.ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label,
            address_mode_u: convert::address_mode(desc.address_mode_u, features),
            address_mode_v: convert::address_mode(desc.address_mode_v, features),
            address_mode_w: convert::address_mode(desc.address_mode_w, features),
            mag_filter: convert::filter(desc.mag_filter),
            min_filter: convert::filter(desc.min_filter),
            mipmap_filter: if anisotropy_clamp > 1 {
                wgpu::MipmapFilterMode::Linear
            } else {
                convert::mipmap_filter(desc.mipmap_mode)
            },
            lod_min_clamp: desc.min_lod,
            lod_max_clamp: desc.max_lod,
            compare: None,
            anisotropy_clamp,
            border_color: uses_border.then(|| convert::border_color(desc.border_color)),
        });
        let handle = SamplerHandle::from_raw(self.ids.next_raw());
        self.insert(handle.into(), Resource::Sampler(sampler));
        Ok(handle)
    }

    fn destroy(&mut self, resource: ResourceHandle) -> Result<(), DeviceError> {
        match self.resources.remove(&resource) {
            Some(Resource::Texture(entry)) => entry.texture.destroy(),
            Some(Resource::Buffer(entry)) => entry.buffer.destroy(),
            Some(_) => {}
            None => return Err(DeviceError::InvalidHandle(resource)),
        }
        log::trace!("wgpu device: destroyed {resource}");
        Ok(())
    }

    fn acquire_command_buffer(
        &mut self,
        swap_index: u32,
    ) -> Result<CommandBufferHandle, DeviceError> {
        if self.lists.is_empty() {
            self.bindings.reset_rings();
        }
        let command_buffer = CommandBufferHandle::from_raw(self.ids.next_raw());
        self.lists.insert(command_buffer, CommandList::new(swap_index));
        Ok(command_buffer)
    }

    fn begin_render_pass(
        &mut self,
        command_buffer: CommandBufferHandle,
        begin: &RenderPassBegin<'_>,
    ) -> Result<(), DeviceError> {
        let framebuffer = self.framebuffer(begin.framebuffer)?;
        if framebuffer.render_pass != begin.render_pass {
            return Err(DeviceError::Validation(
                "framebuffer was not created for this render pass".into(),
            ));
        }
        let list = self.list_mut(command_buffer)?;
        list.expect(Phase::Recording, "begin_render_pass")?;
        if list.passes > 0 {
            return Err(DeviceError::Sequencing("render pass already recorded".into()));
        }
        list.phase = Phase::InPass;
        list.passes += 1;
        list.commands.push(Recorded::BeginPass {
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            render_area: begin.render_area,
            clear_colors: begin.color_clear_values.to_vec(),
            depth_clear: begin.depth_stencil_clear_value.unwrap_or_default(),
        });
        Ok(())
    }

    fn bind_graphics_pipeline(
        &mut self,
        command_buffer: CommandBufferHandle,
        pipeline: GraphicsPipelineHandle,
    ) -> Result<(), DeviceError> {
        self.pipeline(pipeline)?;
        let list = self.list_mut(command_buffer)?;
        list.expect(Phase::InPass, "bind_graphics_pipeline")?;
        list.pipeline = Some(pipeline);
        list.commands.push(Recorded::BindPipeline(pipeline));
        Ok(())
    }

    fn push_shader_params(
        &mut self,
        command_buffer: CommandBufferHandle,
        stage: ShaderStage,
        data: &[u8],
        element_count: u32,
    ) -> Result<u32, DeviceError> {
        let pipeline = self.pass_pipeline(command_buffer, "push_shader_params")?;
        let declared = match stage {
            ShaderStage::Vertex => pipeline.vertex_uniform_size,
            ShaderStage::Fragment => pipeline.fragment_uniform_size,
        };
        let expected = declared * element_count as u64;
        if declared == 0 || data.len() as u64 != expected {
            return Err(DeviceError::Validation(format!(
                "{stage:?} parameters are {} bytes, pipeline expects {expected}",
                data.len()
            )));
        }
        self.bindings.ring_mut(stage).push(&self.ctx.queue, data)
    }

    fn bind_vertex_buffers(
        &mut self,
        command_buffer: CommandBufferHandle,
        first_binding: u32,
        buffers: &[BufferHandle],
        offsets: &[u64],
    ) -> Result<(), DeviceError> {
        self.pass_pipeline(command_buffer, "bind_vertex_buffers")?;
        if buffers.is_empty() || buffers.len() != offsets.len() {
            return Err(DeviceError::Validation(format!(
                "bind_vertex_buffers got {} buffers and {} offsets",
                buffers.len(),
                offsets.len()
            )));
        }
        for (buffer, offset) in buffers.iter().zip(offsets) {
            let entry = self.buffer(*buffer)?;
            if *offset > entry.size {
                return Err(DeviceError::Validation(format!(
                    "vertex buffer offset {offset} exceeds size {}",
                    entry.size
                )));
            }
        }
        self.list_mut(command_buffer)?.commands.push(Recorded::BindVertexBuffers {
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
        let pipeline = self.pass_pipeline(command_buffer, "bind_fragment_samplers")?;
        let expected = pipeline.fragment_sampler_count as usize;
        if textures.len() != samplers.len() || textures.len() != expected {
            return Err(DeviceError::Validation(format!(
                "pipeline declares {expected} fragment samplers, got {} textures and {} samplers",
                textures.len(),
                samplers.len()
            )));
        }
        for (texture, sampler) in textures.iter().zip(samplers) {
            self.texture(*texture)?;
            self.sampler(*sampler)?;
        }
        self.list_mut(command_buffer)?.commands.push(Recorded::BindFragmentSamplers {
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
        self.pass_pipeline(command_buffer, "draw_primitives")?;
        self.list_mut(command_buffer)?.commands.push(Recorded::Draw(*draw));
        Ok(())
    }

    fn end_render_pass(&mut self, command_buffer: CommandBufferHandle) -> Result<(), DeviceError> {
        let list = self.list_mut(command_buffer)?;
        list.expect(Phase::InPass, "end_render_pass")?;
        list.phase = Phase::PassEnded;
        list.pipeline = None;
        list.commands.push(Recorded::EndPass);
        Ok(())
    }

    fn queue_present(
        &mut self,
        command_buffer: CommandBufferHandle,
        source: &TextureSlice,
        destination: Option<&Rect>,
        filter: Filter,
    ) -> Result<(), DeviceError> {
        self.texture(source.texture)?;
        let list = self.list_mut(command_buffer)?;
        list.expect(Phase::PassEnded, "queue_present")?;
        list.commands.push(Recorded::Present {
            source: *source,
            destination: destination.copied(),
            filter,
        });
        Ok(())
    }

    fn submit(&mut self, command_buffers: &[CommandBufferHandle]) -> Result<(), DeviceError> {
        for cb in command_buffers {
            let list = self
                .lists
                .get(cb)
                .ok_or(DeviceError::InvalidCommandBuffer(cb.raw().get()))?;
            list.expect(Phase::PassEnded, "submit")?;
        }
        // Submission consumes the lists whether or not it succeeds.
        let lists: Vec<CommandList> =
            command_buffers.iter().filter_map(|cb| self.lists.remove(cb)).collect();

        let frame = if lists.iter().any(CommandList::presents) {
            Some(self.ctx.acquire().map_err(|action| DeviceError::Surface { action })?)
        } else {
            None
        };
        let view = frame
            .as_ref()
            .map(|f| f.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let swap = frame.as_ref().zip(view.as_ref()).map(|(f, view)| SwapImage {
            view,
            width: f.texture.width(),
            height: f.texture.height(),
        });

        let mut presented = false;
        let encoded = lists
            .iter()
            .map(|list| {
                log::trace!("encoding command list for swap index {}", list.swap_index);
                self.encode(list, swap.as_ref(), &mut presented)
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;
        self.ctx.queue.submit(encoded);

        if let Some(frame) = frame {
            if presented {
                self.ctx.window().pre_present_notify();
                frame.present();
            } else {
                log::debug!("nothing was blitted; dropping the swap image");
            }
        }
        Ok(())
    }

    fn discard_command_buffer(&mut self, command_buffer: CommandBufferHandle) {
        if self.lists.remove(&command_buffer).is_some() {
            log::trace!("wgpu device: discarded command buffer #{}", command_buffer.raw());
        }
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.ctx
            .device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| DeviceError::Validation(format!("device poll failed: {e}")))
    }
}
