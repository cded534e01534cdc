//! The raymarch scene: one fullscreen triangle into an offscreen color
//! target, shaded by a fragment program that samples two textures, then
//! presented to the swap image.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use cadence_engine::core::{AppControl, Simulation};
use cadence_engine::device::{
    BufferDesc, BufferUsage, Color, ColorBlendState, ColorFormat, ColorTargetBlendState,
    ColorTargetDescription, DepthFormat, DepthStencilState, DepthStencilTargetDescription,
    DepthStencilValue, Device, Filter, FramebufferDesc, GraphicsPipelineDesc, LoadOp, LogicOp,
    MultisampleState, PipelineLayoutDesc, PrimitiveType, RasterizerState, Rect, RenderPassDesc,
    SampleCount, SamplerAddressMode, SamplerDesc, SamplerMipmapMode, ShaderModuleDesc,
    ShaderStageState, StoreOp, TextureDesc, TextureHandle, TextureSlice, TextureUsage,
    VertexAttribute, VertexBinding, VertexElementFormat, VertexInputRate, VertexInputState,
    Viewport, ViewportState,
};
use cadence_engine::frame::{FrameContext, FramePlan, FrameRenderer, PresentPlan, PresentTransform};
use cadence_engine::resource::ResourceGraph;
use cadence_engine::time::StepTime;

use crate::assets::{Rgba8Image, ShaderAsset};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Covers the viewport; the parts outside clip space are discarded.
pub const FULLSCREEN_TRIANGLE: [Vertex; 3] = [
    Vertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
    Vertex { position: [3.0, -1.0, 0.0], uv: [1.0, 1.0] },
    Vertex { position: [-1.0, 3.0, 0.0], uv: [0.0, 0.0] },
];

pub const VERTEX_STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

/// Fragment uniform block, 16 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct RaymarchUniforms {
    pub time: f32,
    pub padding: f32,
    pub resolution: [f32; 2],
}

impl RaymarchUniforms {
    pub fn new(width: u32, height: u32) -> Self {
        Self { time: 0.0, padding: 0.0, resolution: [width as f32, height as f32] }
    }
}

/// Everything the scene is built from.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub width: u32,
    pub height: u32,
    pub clear_color: Color,
    pub swap_index: u32,
    pub present_transform: PresentTransform,
    pub present_filter: Filter,
    pub wood: Rgba8Image,
    pub noise: Rgba8Image,
    pub vertex_shader: ShaderAsset,
    pub fragment_shader: ShaderAsset,
}

impl SceneConfig {
    /// Built-in shaders and generated textures.
    pub fn procedural(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            clear_color: Color::from_rgba8(100, 149, 237, 255),
            swap_index: 0,
            present_transform: PresentTransform::Identity,
            present_filter: Filter::Nearest,
            wood: Rgba8Image::wood_grain(256),
            noise: Rgba8Image::value_noise(128, 0x5eed),
            vertex_shader: ShaderAsset::passthrough_vertex(),
            fragment_shader: ShaderAsset::hexagon_grid_fragment(),
        }
    }
}

/// Simulation state of the sample: the shader clock.
#[derive(Debug, Clone)]
pub struct Raymarch {
    uniforms: RaymarchUniforms,
    clear_color: Color,
    swap_index: u32,
    exit_after: Option<u64>,
    updates: u64,
}

impl Raymarch {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            uniforms: RaymarchUniforms::new(config.width, config.height),
            clear_color: config.clear_color,
            swap_index: config.swap_index,
            exit_after: None,
            updates: 0,
        }
    }

    /// Ends the loop after `updates` fixed steps.
    pub fn exit_after(mut self, updates: u64) -> Self {
        self.exit_after = Some(updates);
        self
    }

    pub fn uniforms(&self) -> &RaymarchUniforms {
        &self.uniforms
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl Simulation for Raymarch {
    fn update(&mut self, step: StepTime) -> AppControl {
        self.uniforms.time = step.t_secs() as f32;
        self.updates += 1;
        match self.exit_after {
            Some(limit) if self.updates >= limit => AppControl::Exit,
            _ => AppControl::Continue,
        }
    }

    fn frame_context(&self) -> FrameContext<'_> {
        FrameContext {
            swap_index: self.swap_index,
            clear_color: self.clear_color,
            depth_stencil_clear: DepthStencilValue { depth: 1.0, stencil: 0 },
            render_area: None,
            vertex_params: None,
            fragment_params: Some(bytemuck::bytes_of(&self.uniforms)),
        }
    }
}

/// Creates the scene's resources in dependency order and returns the
/// renderer for it.
pub fn build<D: Device + ?Sized>(
    device: &mut D,
    graph: &mut ResourceGraph,
    config: &SceneConfig,
) -> Result<(FrameRenderer, Raymarch)> {
    let (width, height) = (config.width, config.height);

    // ── shaders ───────────────────────────────────────────────────────────
    let vertex_module = graph
        .create_shader_module(
            device,
            &ShaderModuleDesc { label: Some("passthrough vs"), code: config.vertex_shader.code() },
        )
        .context("vertex shader")?;
    let fragment_module = graph
        .create_shader_module(
            device,
            &ShaderModuleDesc { label: Some("hexagon grid fs"), code: config.fragment_shader.code() },
        )
        .context("fragment shader")?;

    // ── textures ──────────────────────────────────────────────────────────
    let wood = sampled_texture(device, graph, "woodgrain", &config.wood)?;
    let noise = sampled_texture(device, graph, "noise", &config.noise)?;

    // ── geometry ──────────────────────────────────────────────────────────
    let vertex_buffer = graph.create_vertex_buffer(
        device,
        &BufferDesc {
            label: Some("fullscreen triangle"),
            usage: BufferUsage::VERTEX,
            size: std::mem::size_of_val(&FULLSCREEN_TRIANGLE) as u64,
        },
        VERTEX_STRIDE,
    )?;
    graph.upload_buffer_pod(device, vertex_buffer, &FULLSCREEN_TRIANGLE)?;

    // ── render pass & targets ─────────────────────────────────────────────
    let color_targets = [ColorTargetDescription {
        format: ColorFormat::R8G8B8A8,
        samples: SampleCount::One,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
    }];
    let render_pass = graph.create_render_pass(
        device,
        &RenderPassDesc {
            label: Some("main pass"),
            color_targets: &color_targets,
            depth_stencil: Some(DepthStencilTargetDescription {
                format: DepthFormat::D32SfloatS8Uint,
                load_op: LoadOp::Clear,
                store_op: StoreOp::DontCare,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
            }),
        },
    )?;

    let color_texture = graph.create_texture(
        device,
        &TextureDesc {
            label: Some("main color"),
            format: ColorFormat::R8G8B8A8,
            width,
            height,
            mip_levels: 1,
            usage: TextureUsage::COLOR_TARGET,
        },
    )?;
    let color_slice = TextureSlice::whole(color_texture, width, height);
    let color_target = graph.create_color_target(device, SampleCount::One, &color_slice)?;
    let depth_target =
        graph.create_depth_stencil_target(device, width, height, DepthFormat::D32SfloatS8Uint)?;
    let framebuffer = graph.create_framebuffer(
        device,
        &FramebufferDesc {
            label: Some("main framebuffer"),
            width,
            height,
            render_pass,
            color_targets: &[color_target],
            depth_stencil_target: Some(depth_target),
        },
    )?;

    // ── pipeline ──────────────────────────────────────────────────────────
    let blend = [ColorTargetBlendState::opaque()];
    let bindings = [VertexBinding { binding: 0, stride: VERTEX_STRIDE, input_rate: VertexInputRate::Vertex }];
    let attributes = [
        VertexAttribute { location: 0, binding: 0, format: VertexElementFormat::Vector3, offset: 0 },
        VertexAttribute { location: 1, binding: 0, format: VertexElementFormat::Vector2, offset: 12 },
    ];
    let viewports = [Viewport::from_size(width, height)];
    let scissors = [Rect::from_size(width, height)];
    let pipeline = graph.create_graphics_pipeline(
        device,
        &GraphicsPipelineDesc {
            label: Some("raymarch"),
            color_blend_state: ColorBlendState {
                logic_op_enable: false,
                logic_op: LogicOp::NoOp,
                blend_constants: [0.0; 4],
                targets: &blend,
            },
            depth_stencil_state: DepthStencilState::disabled(),
            vertex_shader: ShaderStageState {
                module: vertex_module,
                entry_point: &config.vertex_shader.entry_point,
                uniform_buffer_size: 0,
            },
            fragment_shader: ShaderStageState {
                module: fragment_module,
                entry_point: &config.fragment_shader.entry_point,
                uniform_buffer_size: std::mem::size_of::<RaymarchUniforms>() as u64,
            },
            multisample_state: MultisampleState::default(),
            layout: PipelineLayoutDesc {
                vertex_sampler_binding_count: 0,
                fragment_sampler_binding_count: 2,
            },
            rasterizer_state: RasterizerState::default(),
            primitive_type: PrimitiveType::TriangleList,
            vertex_input_state: VertexInputState { bindings: &bindings, attributes: &attributes },
            viewport_state: ViewportState { viewports: &viewports, scissors: &scissors },
            render_pass,
        },
    )?;

    let sampler = graph.create_sampler(
        device,
        &SamplerDesc {
            label: Some("repeat linear"),
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Linear,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            max_lod: 1.0,
            ..SamplerDesc::default()
        },
    )?;

    let plan = FramePlan {
        render_pass,
        framebuffer,
        pipeline,
        vertex_buffers: vec![(vertex_buffer, 0)],
        fragment_samplers: vec![(wood, sampler), (noise, sampler)],
        vertex_start: 0,
        primitive_count: 1,
        present: Some(PresentPlan {
            source: color_slice,
            transform: config.present_transform,
            filter: config.present_filter,
        }),
    };
    let renderer = FrameRenderer::new(plan, graph)?;
    log::info!("raymarch scene ready: {width}x{height}, {} resources", graph.len());
    Ok((renderer, Raymarch::new(config)))
}

fn sampled_texture<D: Device + ?Sized>(
    device: &mut D,
    graph: &mut ResourceGraph,
    label: &'static str,
    image: &Rgba8Image,
) -> Result<TextureHandle> {
    let texture = graph.create_texture(
        device,
        &TextureDesc {
            label: Some(label),
            format: ColorFormat::R8G8B8A8,
            width: image.width,
            height: image.height,
            mip_levels: 1,
            usage: TextureUsage::SAMPLER,
        },
    )?;
    graph
        .upload_texture(device, texture, &image.pixels)
        .with_context(|| format!("uploading {label}"))?;
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_five_floats() {
        assert_eq!(VERTEX_STRIDE, 20);
        assert_eq!(std::mem::size_of_val(&FULLSCREEN_TRIANGLE), 60);
    }

    #[test]
    fn uniform_block_is_sixteen_bytes() {
        let u = RaymarchUniforms::new(1280, 720);
        assert_eq!(bytemuck::bytes_of(&u).len(), 16);
        assert_eq!(u.resolution, [1280.0, 720.0]);
    }

    #[test]
    fn update_tracks_step_start_time() {
        let mut sim = Raymarch::new(&SceneConfig::procedural(4, 4));
        let step = StepTime {
            dt: std::time::Duration::from_millis(10),
            t: std::time::Duration::from_millis(30),
            step_index: 3,
        };
        assert_eq!(sim.update(step), AppControl::Continue);
        assert!((sim.uniforms().time - 0.03).abs() < 1e-6);

        let ctx = sim.frame_context();
        assert_eq!(ctx.fragment_params.map(<[u8]>::len), Some(16));
        assert_eq!(ctx.vertex_params, None);
    }

    #[test]
    fn exit_after_limit() {
        let mut sim = Raymarch::new(&SceneConfig::procedural(4, 4)).exit_after(2);
        let step = StepTime { dt: std::time::Duration::from_millis(10), t: Default::default(), step_index: 0 };
        assert_eq!(sim.update(step), AppControl::Continue);
        assert_eq!(sim.update(step), AppControl::Exit);
    }
}
