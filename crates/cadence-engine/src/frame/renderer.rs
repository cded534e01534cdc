use crate::device::{Device, RenderPassBegin, ResourceHandle, ShaderStage};
use crate::resource::ResourceGraph;

use super::context::{FrameContext, FramePlan, FrameStats};
use super::error::FrameError;
use super::recorder::{CommandRecorder, DrawArgs};

/// Records and submits one command buffer per frame from a fixed plan.
#[derive(Debug, Clone)]
pub struct FrameRenderer {
    plan: FramePlan,
    frames: u64,
}

impl FrameRenderer {
    /// Checks that every resource the plan names exists in `graph`.
    pub fn new(plan: FramePlan, graph: &ResourceGraph) -> Result<Self, FrameError> {
        let mut required: Vec<ResourceHandle> = vec![
            plan.render_pass.into(),
            plan.framebuffer.into(),
            plan.pipeline.into(),
        ];
        required.extend(plan.vertex_buffers.iter().map(|(b, _)| ResourceHandle::from(*b)));
        for (t, s) in &plan.fragment_samplers {
            required.push((*t).into());
            required.push((*s).into());
        }
        if let Some(present) = &plan.present {
            required.push(present.source.texture.into());
        }
        if let Some(missing) = required.into_iter().find(|h| !graph.contains(*h)) {
            return Err(FrameError::UnknownResource(missing));
        }
        Ok(Self { plan, frames: 0 })
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    /// Frames submitted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Records the plan with this frame's inputs and submits it.
    ///
    /// On error the command buffer is discarded and the device stays usable.
    pub fn render<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        graph: &ResourceGraph,
        ctx: &FrameContext<'_>,
    ) -> Result<FrameStats, FrameError> {
        let plan = &self.plan;
        let framebuffer = graph
            .framebuffer(plan.framebuffer)
            .ok_or(FrameError::UnknownResource(plan.framebuffer.into()))?;
        let has_depth = framebuffer.depth_stencil_target.is_some();
        let render_area = ctx
            .render_area
            .unwrap_or(crate::device::Rect::from_size(framebuffer.width, framebuffer.height));
        let clear_values = vec![ctx.clear_color; framebuffer.color_targets.len()];

        let recorder = CommandRecorder::acquire(device, graph, ctx.swap_index)?;
        let mut pass = recorder
            .begin_render_pass(&RenderPassBegin {
                render_pass: plan.render_pass,
                framebuffer: plan.framebuffer,
                render_area,
                color_clear_values: &clear_values,
                depth_stencil_clear_value: has_depth.then_some(ctx.depth_stencil_clear),
            })?
            .bind_pipeline(plan.pipeline)?;

        let vertex = ctx
            .vertex_params
            .map(|p| pass.push_shader_params(ShaderStage::Vertex, p))
            .transpose()?;
        let fragment = ctx
            .fragment_params
            .map(|p| pass.push_shader_params(ShaderStage::Fragment, p))
            .transpose()?;
        if !plan.vertex_buffers.is_empty() {
            pass.bind_vertex_buffers(0, &plan.vertex_buffers)?;
        }
        if !plan.fragment_samplers.is_empty() {
            pass.bind_fragment_samplers(&plan.fragment_samplers)?;
        }
        pass.draw(
            DrawArgs { vertex_start: plan.vertex_start, primitive_count: plan.primitive_count },
            vertex,
            fragment,
        )?;

        let mut ended = pass.end_render_pass()?;
        if let Some(present) = &plan.present {
            ended.queue_present(&present.source, Some(present.destination()), present.filter)?;
        }
        let stats = ended.submit()?;
        self.frames += 1;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::recording::{Command, FailPoint, RecordingDevice};
    use crate::device::{
        BufferDesc, BufferUsage, ColorBlendState, ColorFormat, ColorTargetBlendState,
        ColorTargetDescription, DepthStencilState, DeviceError, Filter, FramebufferDesc, LoadOp,
        LogicOp, MultisampleState, PipelineLayoutDesc, PrimitiveType, RasterizerState, Rect,
        RenderPassDesc, SampleCount, SamplerDesc, ShaderCode, ShaderModuleDesc, ShaderStageState,
        StoreOp, SurfaceErrorAction, TextureDesc, TextureSlice, TextureUsage, VertexAttribute,
        VertexBinding, VertexElementFormat, VertexInputRate, VertexInputState, ViewportState,
    };
    use crate::frame::{FrameErrorAction, PresentPlan, PresentTransform};

    const SPIRV: [u8; 4] = [0x03, 0x02, 0x23, 0x07];

    struct Scene {
        device: RecordingDevice,
        graph: ResourceGraph,
        plan: FramePlan,
    }

    /// One pass, one pipeline with a 20-byte vertex layout and one fragment
    /// sampler, a 16-byte fragment uniform block.
    fn scene(buffer_stride: u32) -> Scene {
        let mut device = RecordingDevice::new().require_staging(true);
        let mut graph = ResourceGraph::new();
        let d = &mut device;

        let module = graph
            .create_shader_module(d, &ShaderModuleDesc { label: None, code: ShaderCode::SpirV(&SPIRV) })
            .unwrap();
        let target_tex = graph
            .create_texture(
                d,
                &TextureDesc {
                    label: Some("color"),
                    format: ColorFormat::R8G8B8A8,
                    width: 8,
                    height: 8,
                    mip_levels: 1,
                    usage: TextureUsage::COLOR_TARGET | TextureUsage::SAMPLER,
                },
            )
            .unwrap();
        let image = graph
            .create_texture(
                d,
                &TextureDesc {
                    label: Some("image"),
                    format: ColorFormat::R8G8B8A8,
                    width: 2,
                    height: 2,
                    mip_levels: 1,
                    usage: TextureUsage::SAMPLER,
                },
            )
            .unwrap();
        graph.upload_texture(d, image, &[255u8; 16]).unwrap();
        let vb = graph
            .create_vertex_buffer(
                d,
                &BufferDesc { label: Some("vb"), usage: BufferUsage::VERTEX, size: 60 },
                buffer_stride,
            )
            .unwrap();
        graph.upload_buffer(d, vb, 0, &[0u8; 60]).unwrap();

        let targets = [ColorTargetDescription {
            format: ColorFormat::R8G8B8A8,
            samples: SampleCount::One,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }];
        let render_pass = graph
            .create_render_pass(d, &RenderPassDesc { label: None, color_targets: &targets, depth_stencil: None })
            .unwrap();
        let color = graph
            .create_color_target(d, SampleCount::One, &TextureSlice::whole(target_tex, 8, 8))
            .unwrap();
        let framebuffer = graph
            .create_framebuffer(
                d,
                &FramebufferDesc {
                    label: None,
                    width: 8,
                    height: 8,
                    render_pass,
                    color_targets: &[color],
                    depth_stencil_target: None,
                },
            )
            .unwrap();

        let blend = [ColorTargetBlendState::opaque()];
        let bindings = [VertexBinding { binding: 0, stride: 20, input_rate: VertexInputRate::Vertex }];
        let attributes = [
            VertexAttribute { location: 0, binding: 0, format: VertexElementFormat::Vector3, offset: 0 },
            VertexAttribute { location: 1, binding: 0, format: VertexElementFormat::Vector2, offset: 12 },
        ];
        let pipeline = graph
            .create_graphics_pipeline(
                d,
                &crate::device::GraphicsPipelineDesc {
                    label: None,
                    color_blend_state: ColorBlendState {
                        logic_op_enable: false,
                        logic_op: LogicOp::NoOp,
                        blend_constants: [0.0; 4],
                        targets: &blend,
                    },
                    depth_stencil_state: DepthStencilState::disabled(),
                    vertex_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 0 },
                    fragment_shader: ShaderStageState {
                        module,
                        entry_point: "main",
                        uniform_buffer_size: 16,
                    },
                    multisample_state: MultisampleState::default(),
                    layout: PipelineLayoutDesc {
                        vertex_sampler_binding_count: 0,
                        fragment_sampler_binding_count: 1,
                    },
                    rasterizer_state: RasterizerState::default(),
                    primitive_type: PrimitiveType::TriangleList,
                    vertex_input_state: VertexInputState { bindings: &bindings, attributes: &attributes },
                    viewport_state: ViewportState { viewports: &[], scissors: &[] },
                    render_pass,
                },
            )
            .unwrap();
        let sampler = graph.create_sampler(d, &SamplerDesc::default()).unwrap();

        let plan = FramePlan {
            render_pass,
            framebuffer,
            pipeline,
            vertex_buffers: vec![(vb, 0)],
            fragment_samplers: vec![(image, sampler)],
            vertex_start: 0,
            primitive_count: 1,
            present: Some(PresentPlan {
                source: TextureSlice::whole(target_tex, 8, 8),
                transform: PresentTransform::FlipVertical,
                filter: Filter::Nearest,
            }),
        };
        Scene { device, graph, plan }
    }

    fn uniforms() -> [u8; 16] {
        [0u8; 16]
    }

    // ── happy path ────────────────────────────────────────────────────────

    #[test]
    fn frame_records_calls_in_order() {
        let Scene { mut device, graph, plan } = scene(20);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        device.clear_log();

        let params = uniforms();
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };
        let stats = renderer.render(&mut device, &graph, &ctx).unwrap();

        let kinds: Vec<&str> = device
            .log()
            .iter()
            .map(|c| match c {
                Command::AcquireCommandBuffer { .. } => "acquire",
                Command::BeginRenderPass { .. } => "begin",
                Command::BindGraphicsPipeline { .. } => "pipeline",
                Command::PushShaderParams { .. } => "push",
                Command::BindVertexBuffers { .. } => "vertex",
                Command::BindFragmentSamplers { .. } => "samplers",
                Command::DrawPrimitives { .. } => "draw",
                Command::EndRenderPass { .. } => "end",
                Command::QueuePresent { .. } => "present",
                Command::Submit { .. } => "submit",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            ["acquire", "begin", "pipeline", "push", "vertex", "samplers", "draw", "end", "present", "submit"]
        );
        assert_eq!(stats.draws, 1);
        assert!(stats.presented);
        assert_eq!(renderer.frames(), 1);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn present_destination_is_flipped() {
        let Scene { mut device, graph, plan } = scene(20);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        let params = uniforms();
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };
        renderer.render(&mut device, &graph, &ctx).unwrap();

        let dest = device.log().iter().find_map(|c| match c {
            Command::QueuePresent { destination, .. } => *destination,
            _ => None,
        });
        assert_eq!(dest, Some(Rect::new(0, 8, 8, -8)));
    }

    #[test]
    fn frame_commands_share_one_command_buffer() {
        let Scene { mut device, graph, plan } = scene(20);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        device.clear_log();
        let params = uniforms();
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };
        renderer.render(&mut device, &graph, &ctx).unwrap();

        let cb = device
            .log()
            .iter()
            .find_map(|c| match c {
                Command::AcquireCommandBuffer { command_buffer, .. } => Some(*command_buffer),
                _ => None,
            })
            .unwrap();
        // Everything from acquire up to present; submit names its buffers separately.
        assert_eq!(device.commands_for(cb).len(), 9);
    }

    // ── validation ────────────────────────────────────────────────────────

    #[test]
    fn stride_mismatch_is_a_layout_error() {
        let Scene { mut device, graph, plan } = scene(24);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        let params = uniforms();
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };

        let err = renderer.render(&mut device, &graph, &ctx).unwrap_err();
        assert_eq!(
            err,
            FrameError::VertexLayoutMismatch { binding: 0, expected: 20, actual: Some(24) }
        );
        // The half-recorded command buffer was discarded.
        assert_eq!(device.pending_command_buffers(), 0);
        assert!(device.log().iter().any(|c| matches!(c, Command::Discard { .. })));
    }

    #[test]
    fn wrong_param_size_is_rejected() {
        let Scene { mut device, graph, plan } = scene(20);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        let params = [0u8; 4];
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };
        assert_eq!(
            renderer.render(&mut device, &graph, &ctx),
            Err(FrameError::ParamSize { stage: ShaderStage::Fragment, expected: 16, actual: 4 })
        );
    }

    #[test]
    fn missing_fragment_params_is_rejected() {
        let Scene { mut device, graph, plan } = scene(20);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        let err = renderer.render(&mut device, &graph, &FrameContext::default()).unwrap_err();
        assert_eq!(err, FrameError::MissingParams { stage: ShaderStage::Fragment });
    }

    #[test]
    fn partially_uploaded_texture_is_not_sampled() {
        let Scene { mut device, mut graph, mut plan } = scene(20);
        let tile = graph
            .create_texture(
                &mut device,
                &TextureDesc {
                    label: Some("tile"),
                    format: ColorFormat::R8G8B8A8,
                    width: 4,
                    height: 2,
                    mip_levels: 1,
                    usage: TextureUsage::SAMPLER,
                },
            )
            .unwrap();
        let corner = TextureSlice { rect: Rect::from_size(1, 1), ..TextureSlice::whole(tile, 4, 2) };
        graph.upload_texture_region(&mut device, &corner, &[255u8; 4]).unwrap();
        plan.fragment_samplers[0].0 = tile;

        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        let params = uniforms();
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };
        assert_eq!(
            renderer.render(&mut device, &graph, &ctx),
            Err(FrameError::NotUploaded(tile.into()))
        );
        assert_eq!(device.pending_command_buffers(), 0);
    }

    #[test]
    fn vertex_binding_past_u32_range_is_a_count_error() {
        let Scene { mut device, graph, plan } = scene(20);
        let clear = [crate::device::Color::default()];
        let begin = RenderPassBegin {
            render_pass: plan.render_pass,
            framebuffer: plan.framebuffer,
            render_area: Rect::from_size(8, 8),
            color_clear_values: &clear,
            depth_stencil_clear_value: None,
        };
        let mut pass = CommandRecorder::acquire(&mut device, &graph, 0)
            .unwrap()
            .begin_render_pass(&begin)
            .unwrap()
            .bind_pipeline(plan.pipeline)
            .unwrap();
        let (vb, _) = plan.vertex_buffers[0];
        let err = pass.bind_vertex_buffers(u32::MAX, &[(vb, 0), (vb, 0)]).unwrap_err();
        assert!(matches!(err, FrameError::BindingCount { what: "vertex buffers", expected: 1, .. }));
    }

    // ── recorder ──────────────────────────────────────────────────────────

    #[test]
    fn param_offset_from_another_command_buffer_is_rejected() {
        let Scene { mut device, graph, plan } = scene(20);
        let params = uniforms();
        let clear = [crate::device::Color::default()];
        let begin = RenderPassBegin {
            render_pass: plan.render_pass,
            framebuffer: plan.framebuffer,
            render_area: Rect::from_size(8, 8),
            color_clear_values: &clear,
            depth_stencil_clear_value: None,
        };

        let stale = {
            let mut pass = CommandRecorder::acquire(&mut device, &graph, 0)
                .unwrap()
                .begin_render_pass(&begin)
                .unwrap()
                .bind_pipeline(plan.pipeline)
                .unwrap();
            pass.push_shader_params(ShaderStage::Fragment, &params).unwrap()
        };

        let mut pass = CommandRecorder::acquire(&mut device, &graph, 0)
            .unwrap()
            .begin_render_pass(&begin)
            .unwrap()
            .bind_pipeline(plan.pipeline)
            .unwrap();
        pass.bind_vertex_buffers(0, &plan.vertex_buffers).unwrap();
        pass.bind_fragment_samplers(&plan.fragment_samplers).unwrap();
        let err = pass
            .draw(DrawArgs { vertex_start: 0, primitive_count: 1 }, None, Some(stale))
            .unwrap_err();
        assert_eq!(err, FrameError::ForeignParamOffset { stage: ShaderStage::Fragment });
    }

    #[test]
    fn empty_pass_can_be_submitted() {
        let Scene { mut device, graph, plan } = scene(20);
        let clear = [crate::device::Color::default()];
        let stats = CommandRecorder::acquire(&mut device, &graph, 1)
            .unwrap()
            .begin_render_pass(&RenderPassBegin {
                render_pass: plan.render_pass,
                framebuffer: plan.framebuffer,
                render_area: Rect::from_size(8, 8),
                color_clear_values: &clear,
                depth_stencil_clear_value: None,
            })
            .unwrap()
            .end_render_pass()
            .unwrap()
            .submit()
            .unwrap();
        assert_eq!(stats.draws, 0);
        assert!(!stats.presented);
        assert_eq!(device.submitted_count(), 1);
    }

    // ── device failures ───────────────────────────────────────────────────

    #[test]
    fn transient_submit_failure_skips_frame_and_keeps_device_usable() {
        let Scene { mut device, graph, plan } = scene(20);
        let mut renderer = FrameRenderer::new(plan, &graph).unwrap();
        let params = uniforms();
        let ctx = FrameContext { fragment_params: Some(&params), ..Default::default() };

        device.fail_next(
            FailPoint::Submit,
            DeviceError::Surface { action: SurfaceErrorAction::SkipFrame },
        );
        let err = renderer.render(&mut device, &graph, &ctx).unwrap_err();
        assert_eq!(err.default_action(), FrameErrorAction::SkipFrame);
        assert_eq!(device.pending_command_buffers(), 0);

        renderer.render(&mut device, &graph, &ctx).unwrap();
        assert_eq!(device.submitted_count(), 1);
    }

    #[test]
    fn plan_with_unknown_resource_is_rejected() {
        let Scene { graph, mut plan, .. } = scene(20);
        let mut other = ResourceGraph::new();
        let mut other_device = RecordingDevice::new();
        for _ in 0..32 {
            other
                .create_sampler(&mut other_device, &SamplerDesc::default())
                .unwrap();
        }
        let foreign = other
            .create_sampler(&mut other_device, &SamplerDesc::default())
            .unwrap();
        plan.fragment_samplers[0].1 = foreign;
        assert_eq!(
            FrameRenderer::new(plan, &graph).unwrap_err(),
            FrameError::UnknownResource(foreign.into())
        );
    }
}
