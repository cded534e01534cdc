//! Fullscreen-triangle scene shared by the integration tests: two sampled
//! textures, a 20-byte vertex layout, a depth-stencil target, and a present
//! back to the swap image.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use cadence_engine::core::{AppControl, Application, Simulation};
use cadence_engine::device::{
    BufferDesc, BufferUsage, Color, ColorBlendState, ColorFormat, ColorTargetBlendState,
    ColorTargetDescription, DepthFormat, DepthStencilState, DepthStencilTargetDescription, Filter,
    FramebufferDesc, GraphicsPipelineDesc, LoadOp, LogicOp, MultisampleState, PipelineLayoutDesc,
    PrimitiveType, RasterizerState, Rect, RecordingDevice, RenderPassDesc, SampleCount,
    SamplerDesc, ShaderCode, ShaderModuleDesc, ShaderStageState, StoreOp, TextureDesc,
    TextureUsage, TextureSlice, VertexAttribute, VertexBinding, VertexElementFormat,
    VertexInputRate, VertexInputState, Viewport, ViewportState,
};
use cadence_engine::frame::{FrameContext, FramePlan, FrameRenderer, PresentPlan, PresentTransform};
use cadence_engine::resource::ResourceGraph;
use cadence_engine::time::{ClockConfig, ManualTimeSource, SimulationClock, StepTime};

pub const SPIRV: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 36;
pub const STRIDE: u32 = 20;

/// Shader clock: 16 bytes of fragment parameters.
#[derive(Debug, Default)]
pub struct Clocked {
    pub params: [f32; 4],
    pub updates: u64,
    pub step_starts: Vec<Duration>,
}

impl Simulation for Clocked {
    fn update(&mut self, step: StepTime) -> AppControl {
        self.params[0] = step.t_secs() as f32;
        self.updates += 1;
        self.step_starts.push(step.t);
        AppControl::Continue
    }

    fn frame_context(&self) -> FrameContext<'_> {
        FrameContext {
            clear_color: Color::from_rgba8(100, 149, 237, 255),
            fragment_params: Some(bytemuck::cast_slice(&self.params)),
            ..FrameContext::default()
        }
    }
}

/// Builds the scene. `buffer_stride` is the stride the vertex buffer is
/// created with; the pipeline always expects [`STRIDE`].
pub fn build(
    device: &mut RecordingDevice,
    graph: &mut ResourceGraph,
    buffer_stride: u32,
) -> Result<(FrameRenderer, Clocked)> {
    let vs = graph.create_shader_module(
        device,
        &ShaderModuleDesc { label: Some("passthrough"), code: ShaderCode::SpirV(&SPIRV) },
    )?;
    let fs = graph.create_shader_module(
        device,
        &ShaderModuleDesc { label: Some("raymarch"), code: ShaderCode::SpirV(&SPIRV) },
    )?;

    let mut textures = Vec::new();
    for label in ["wood", "noise"] {
        let texture = graph.create_texture(
            device,
            &TextureDesc {
                label: Some(label),
                format: ColorFormat::R8G8B8A8,
                width: 4,
                height: 4,
                mip_levels: 1,
                usage: TextureUsage::SAMPLER,
            },
        )?;
        graph.upload_texture(device, texture, &[200u8; 64])?;
        textures.push(texture);
    }

    let vb = graph.create_vertex_buffer(
        device,
        &BufferDesc { label: Some("triangle"), usage: BufferUsage::VERTEX, size: 60 },
        buffer_stride,
    )?;
    let vertices: [f32; 15] =
        [-1.0, -1.0, 0.0, 0.0, 1.0, 3.0, -1.0, 0.0, 1.0, 1.0, -1.0, 3.0, 0.0, 0.0, 0.0];
    graph.upload_buffer_pod(device, vb, &vertices)?;

    let color_targets = [ColorTargetDescription {
        format: ColorFormat::R8G8B8A8,
        samples: SampleCount::One,
        load_op: LoadOp::Clear,
        store_op: StoreOp::Store,
    }];
    let render_pass = graph.create_render_pass(
        device,
        &RenderPassDesc {
            label: Some("main"),
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
            width: WIDTH,
            height: HEIGHT,
            mip_levels: 1,
            usage: TextureUsage::COLOR_TARGET,
        },
    )?;
    let slice = TextureSlice::whole(color_texture, WIDTH, HEIGHT);
    let color = graph.create_color_target(device, SampleCount::One, &slice)?;
    let depth =
        graph.create_depth_stencil_target(device, WIDTH, HEIGHT, DepthFormat::D32SfloatS8Uint)?;
    let framebuffer = graph.create_framebuffer(
        device,
        &FramebufferDesc {
            label: Some("main"),
            width: WIDTH,
            height: HEIGHT,
            render_pass,
            color_targets: &[color],
            depth_stencil_target: Some(depth),
        },
    )?;

    let blend = [ColorTargetBlendState::opaque()];
    let bindings = [VertexBinding { binding: 0, stride: STRIDE, input_rate: VertexInputRate::Vertex }];
    let attributes = [
        VertexAttribute { location: 0, binding: 0, format: VertexElementFormat::Vector3, offset: 0 },
        VertexAttribute { location: 1, binding: 0, format: VertexElementFormat::Vector2, offset: 12 },
    ];
    let viewports = [Viewport::from_size(WIDTH, HEIGHT)];
    let scissors = [Rect::from_size(WIDTH, HEIGHT)];
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
            vertex_shader: ShaderStageState { module: vs, entry_point: "main", uniform_buffer_size: 0 },
            fragment_shader: ShaderStageState { module: fs, entry_point: "main", uniform_buffer_size: 16 },
            multisample_state: MultisampleState::default(),
            layout: PipelineLayoutDesc { vertex_sampler_binding_count: 0, fragment_sampler_binding_count: 2 },
            rasterizer_state: RasterizerState::default(),
            primitive_type: PrimitiveType::TriangleList,
            vertex_input_state: VertexInputState { bindings: &bindings, attributes: &attributes },
            viewport_state: ViewportState { viewports: &viewports, scissors: &scissors },
            render_pass,
        },
    )?;
    let sampler = graph.create_sampler(device, &SamplerDesc { label: Some("repeat"), ..SamplerDesc::default() })?;

    let plan = FramePlan {
        render_pass,
        framebuffer,
        pipeline,
        vertex_buffers: vec![(vb, 0)],
        fragment_samplers: textures.iter().map(|t| (*t, sampler)).collect(),
        vertex_start: 0,
        primitive_count: 1,
        present: Some(PresentPlan {
            source: slice,
            transform: PresentTransform::FlipVertical,
            filter: Filter::Nearest,
        }),
    };
    Ok((FrameRenderer::new(plan, graph)?, Clocked::default()))
}

pub type TestApp = Application<RecordingDevice, Clocked, ManualTimeSource>;

/// Application over a staging-checked recording device and a manual clock
/// with the default 10 ms step.
pub fn app() -> (ManualTimeSource, TestApp) {
    let time = ManualTimeSource::new();
    let clock = SimulationClock::new(time.clone(), ClockConfig::default());
    let device = RecordingDevice::new().require_staging(true);
    let app = Application::build(device, clock, |d, g| build(d, g, STRIDE)).unwrap();
    (time, app)
}
