mod common;

use std::num::NonZeroU64;

use cadence_engine::core::Application;
use cadence_engine::device::recording::FailPoint;
use cadence_engine::device::{
    ColorBlendState, ColorTargetBlendState, DepthStencilState, DeviceError, GraphicsPipelineDesc,
    LogicOp, MultisampleState, PipelineLayoutDesc, PrimitiveType, RasterizerState,
    RecordingDevice, RenderPassHandle, ResourceHandle, ResourceKind, ShaderCode,
    ShaderModuleDesc, ShaderStageState, VertexInputState, ViewportState,
};
use cadence_engine::frame::{FrameContext, FrameError};
use cadence_engine::resource::{CreationError, DestroyError, ResourceGraph};
use cadence_engine::time::{ClockConfig, ManualTimeSource, SimulationClock};

// ── creation order ────────────────────────────────────────────────────────

#[test]
fn pipeline_needs_its_render_pass_first() {
    let mut device = RecordingDevice::new();
    let mut graph = ResourceGraph::new();
    let module = graph
        .create_shader_module(
            &mut device,
            &ShaderModuleDesc { label: None, code: ShaderCode::SpirV(&common::SPIRV) },
        )
        .unwrap();
    let missing_pass = RenderPassHandle::from_raw(NonZeroU64::new(999).unwrap());
    let blend = [ColorTargetBlendState::opaque()];

    let err = graph
        .create_graphics_pipeline(
            &mut device,
            &GraphicsPipelineDesc {
                label: Some("early"),
                color_blend_state: ColorBlendState {
                    logic_op_enable: false,
                    logic_op: LogicOp::NoOp,
                    blend_constants: [0.0; 4],
                    targets: &blend,
                },
                depth_stencil_state: DepthStencilState::disabled(),
                vertex_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 0 },
                fragment_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 0 },
                multisample_state: MultisampleState::default(),
                layout: PipelineLayoutDesc::default(),
                rasterizer_state: RasterizerState::default(),
                primitive_type: PrimitiveType::TriangleList,
                vertex_input_state: VertexInputState { bindings: &[], attributes: &[] },
                viewport_state: ViewportState { viewports: &[], scissors: &[] },
                render_pass: missing_pass,
            },
        )
        .unwrap_err();

    assert_eq!(
        err,
        CreationError::MissingDependency {
            kind: ResourceKind::GraphicsPipeline,
            label: "early",
            dependency: missing_pass.into(),
        }
    );
    assert_eq!(graph.len(), 1);
}

#[test]
fn failed_setup_releases_what_was_created() {
    let mut device = RecordingDevice::new();
    device.fail_next(FailPoint::Create(ResourceKind::Sampler), DeviceError::Injected("sampler"));
    let clock = SimulationClock::new(ManualTimeSource::new(), ClockConfig::default());

    let result = Application::build(device, clock, |d, g| common::build(d, g, common::STRIDE));
    let err = result.err().expect("setup should fail");
    assert!(format!("{err:#}").contains("sampler"), "{err:#}");
}

// ── layout checks ─────────────────────────────────────────────────────────

#[test]
fn vertex_buffer_with_other_stride_is_a_layout_mismatch() {
    let mut device = RecordingDevice::new().require_staging(true);
    let mut graph = ResourceGraph::new();
    let (mut renderer, sim) = common::build(&mut device, &mut graph, 16).unwrap();

    let params = [0u8; 16];
    let ctx = FrameContext { fragment_params: Some(&params), ..FrameContext::default() };
    let err = renderer.render(&mut device, &graph, &ctx).unwrap_err();

    assert_eq!(err, FrameError::VertexLayoutMismatch { binding: 0, expected: 20, actual: Some(16) });
    assert_eq!(device.pending_command_buffers(), 0);
    assert_eq!(sim.updates, 0);
}

#[test]
fn wrong_param_size_is_rejected() {
    let mut device = RecordingDevice::new();
    let mut graph = ResourceGraph::new();
    let (mut renderer, _) = common::build(&mut device, &mut graph, common::STRIDE).unwrap();

    let params = [0u8; 4];
    let ctx = FrameContext { fragment_params: Some(&params), ..FrameContext::default() };
    assert!(matches!(
        renderer.render(&mut device, &graph, &ctx),
        Err(FrameError::ParamSize { expected: 16, actual: 4, .. })
    ));
}

// ── teardown ──────────────────────────────────────────────────────────────

#[test]
fn resources_with_dependents_cannot_be_destroyed() {
    let mut device = RecordingDevice::new();
    let mut graph = ResourceGraph::new();
    let (renderer, _) = common::build(&mut device, &mut graph, common::STRIDE).unwrap();
    let pass = renderer.plan().render_pass;

    let err = graph.destroy(&mut device, pass).unwrap_err();
    assert!(matches!(err, DestroyError::InUse { resource, .. } if resource == ResourceHandle::from(pass)));

    graph.teardown(&mut device).unwrap();
    assert!(graph.is_empty());
    assert_eq!(device.live_resources(), 0);
    assert_eq!(graph.destroy(&mut device, pass), Err(DestroyError::Unknown(pass.into())));
}

#[test]
fn dependents_go_before_their_dependencies() {
    let mut device = RecordingDevice::new();
    let mut graph = ResourceGraph::new();
    let (renderer, _) = common::build(&mut device, &mut graph, common::STRIDE).unwrap();
    let plan = renderer.plan().clone();
    graph.teardown(&mut device).unwrap();

    let position = |h: ResourceHandle| device.destroyed().iter().position(|d| *d == h).unwrap();
    assert!(position(plan.pipeline.into()) < position(plan.render_pass.into()));
    assert!(position(plan.framebuffer.into()) < position(plan.render_pass.into()));
}
