use anyhow::{Context, Result};

use crate::device::Device;
use crate::frame::{FrameError, FrameErrorAction, FrameRenderer};
use crate::resource::{DestroyError, ResourceGraph};
use crate::time::{SimulationClock, SystemTimeSource, TimeSource};

use super::app::{AppControl, EventSource, Simulation};

/// Counters kept by the application loop.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LoopStats {
    /// Loop iterations.
    pub ticks: u64,
    /// Fixed updates run.
    pub updates: u64,
    /// Frames recorded and submitted.
    pub frames_rendered: u64,
    /// Frames dropped after a transient failure.
    pub frames_skipped: u64,
}

/// Fixed-step loop over one device.
///
/// Each iteration advances the clock, runs the due updates, and renders one
/// frame if at least one update ran and quit was not requested.
pub struct Application<D: Device, S: Simulation, T: TimeSource = SystemTimeSource> {
    device: D,
    graph: ResourceGraph,
    renderer: FrameRenderer,
    clock: SimulationClock<T>,
    sim: S,
    stats: LoopStats,
}

impl<D: Device, S: Simulation, T: TimeSource> Application<D, S, T> {
    pub fn new(
        device: D,
        graph: ResourceGraph,
        renderer: FrameRenderer,
        clock: SimulationClock<T>,
        sim: S,
    ) -> Self {
        Self { device, graph, renderer, clock, sim, stats: LoopStats::default() }
    }

    /// Creates resources with `setup` and assembles the loop.
    ///
    /// If `setup` fails, everything it created is torn down before the error
    /// is returned.
    pub fn build<F>(mut device: D, clock: SimulationClock<T>, setup: F) -> Result<Self>
    where
        F: FnOnce(&mut D, &mut ResourceGraph) -> Result<(FrameRenderer, S)>,
    {
        let (graph, renderer, sim) = create_resources(&mut device, setup)?;
        log::info!("{} resources created on {} backend", graph.len(), device.backend_name());
        Ok(Self::new(device, graph, renderer, clock, sim))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn renderer(&self) -> &FrameRenderer {
        &self.renderer
    }

    pub fn clock(&self) -> &SimulationClock<T> {
        &self.clock
    }

    pub fn simulation(&self) -> &S {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Drops the time elapsed since the last tick, e.g. after a stall.
    pub fn reset_clock(&mut self) {
        self.clock.reset();
    }

    /// One loop iteration.
    ///
    /// `quit` is polled before the update batch, between updates, and before
    /// drawing. A frame failure the simulation classifies as
    /// [`FrameErrorAction::SkipFrame`] is logged and the loop continues.
    pub fn frame(&mut self, mut quit: impl FnMut() -> bool) -> Result<AppControl, FrameError> {
        let Self { device, graph, renderer, clock, sim, stats } = self;
        stats.ticks += 1;

        let report = clock.tick(&mut quit, |step| sim.update(step));
        stats.updates += report.steps as u64;
        if report.clamped {
            log::debug!("frame time {:?} exceeded the clamp", report.frame_time);
        }
        if report.quit_requested {
            return Ok(AppControl::Exit);
        }
        if !report.should_render() {
            return Ok(AppControl::Continue);
        }
        if quit() {
            return Ok(AppControl::Exit);
        }

        let result = {
            let ctx = sim.frame_context();
            renderer.render(device, graph, &ctx)
        };
        match result {
            Ok(frame) => {
                stats.frames_rendered += 1;
                log::trace!(
                    "frame {} submitted: {} draws, {} param bytes",
                    renderer.frames(),
                    frame.draws,
                    frame.param_bytes
                );
                Ok(AppControl::Continue)
            }
            Err(err) => match sim.on_frame_error(&err) {
                FrameErrorAction::SkipFrame => {
                    stats.frames_skipped += 1;
                    log::warn!("frame skipped: {err}");
                    Ok(AppControl::Continue)
                }
                FrameErrorAction::Fatal => {
                    log::error!("frame failed: {err}");
                    Err(err)
                }
            },
        }
    }

    /// Runs until `events` requests quit or a simulation update returns
    /// [`AppControl::Exit`].
    pub fn run(&mut self, events: &mut impl EventSource) -> Result<LoopStats, FrameError> {
        while self.frame(|| events.poll_quit())? == AppControl::Continue {}
        log::info!(
            "loop finished after {} updates, {} frames ({} skipped)",
            self.stats.updates,
            self.stats.frames_rendered,
            self.stats.frames_skipped
        );
        Ok(self.stats)
    }

    /// Waits for the device, destroys every resource in reverse creation
    /// order, and hands the device back.
    pub fn shutdown(mut self) -> Result<D, DestroyError> {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("wait_idle before teardown failed: {e}");
        }
        self.graph.teardown(&mut self.device)?;
        log::debug!("shutdown complete");
        Ok(self.device)
    }

    /// Like [`shutdown`](Self::shutdown), for callers at the `anyhow` edge.
    pub fn close(self) -> Result<D> {
        self.shutdown().context("failed to release GPU resources")
    }
}

/// Runs `setup` against a fresh graph, releasing whatever it created on
/// `device` if it fails.
fn create_resources<D, S, F>(device: &mut D, setup: F) -> Result<(ResourceGraph, FrameRenderer, S)>
where
    D: Device,
    F: FnOnce(&mut D, &mut ResourceGraph) -> Result<(FrameRenderer, S)>,
{
    let mut graph = ResourceGraph::new();
    match setup(device, &mut graph) {
        Ok((renderer, sim)) => Ok((graph, renderer, sim)),
        Err(e) => {
            log::error!("setup failed: {e:#}");
            if let Err(teardown) = graph.teardown(device) {
                log::warn!("teardown after failed setup: {teardown}");
            }
            Err(e.context("failed to create frame resources"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::device::recording::{Command, FailPoint, RecordingDevice};
    use crate::device::{
        ColorBlendState, ColorFormat, ColorTargetBlendState, ColorTargetDescription,
        DepthStencilState, DeviceError, FramebufferDesc, GraphicsPipelineDesc, LoadOp, LogicOp,
        MultisampleState, PipelineLayoutDesc, PrimitiveType, RasterizerState, RenderPassDesc,
        ResourceHandle, SampleCount, ShaderCode, ShaderModuleDesc, ShaderStageState, StoreOp,
        SurfaceErrorAction, TextureDesc, TextureSlice, TextureUsage, VertexInputState, ViewportState,
    };
    use crate::frame::{FrameContext, FramePlan};
    use crate::time::{ClockConfig, ManualTimeSource, StepTime};

    #[derive(Default)]
    struct Counter {
        updates: u32,
        exit_after: Option<u32>,
        params: [u8; 16],
        fatal_errors: bool,
    }

    impl Simulation for Counter {
        fn update(&mut self, step: StepTime) -> AppControl {
            self.updates += 1;
            self.params[..4].copy_from_slice(&(step.t_secs() as f32).to_le_bytes());
            match self.exit_after {
                Some(n) if self.updates >= n => AppControl::Exit,
                _ => AppControl::Continue,
            }
        }

        fn frame_context(&self) -> FrameContext<'_> {
            FrameContext { fragment_params: Some(&self.params), ..Default::default() }
        }

        fn on_frame_error(&mut self, err: &FrameError) -> FrameErrorAction {
            if self.fatal_errors { FrameErrorAction::Fatal } else { err.default_action() }
        }
    }

    fn setup(
        device: &mut RecordingDevice,
        graph: &mut ResourceGraph,
    ) -> Result<(FrameRenderer, Counter)> {
        let spirv = [0x03u8, 0x02, 0x23, 0x07];
        let module = graph.create_shader_module(
            device,
            &ShaderModuleDesc { label: Some("shader"), code: ShaderCode::SpirV(&spirv) },
        )?;
        let texture = graph.create_texture(
            device,
            &TextureDesc {
                label: Some("target"),
                format: ColorFormat::R8G8B8A8,
                width: 4,
                height: 4,
                mip_levels: 1,
                usage: TextureUsage::COLOR_TARGET,
            },
        )?;
        let targets = [ColorTargetDescription {
            format: ColorFormat::R8G8B8A8,
            samples: SampleCount::One,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }];
        let render_pass = graph.create_render_pass(
            device,
            &RenderPassDesc { label: None, color_targets: &targets, depth_stencil: None },
        )?;
        let color = graph.create_color_target(device, SampleCount::One, &TextureSlice::whole(texture, 4, 4))?;
        let framebuffer = graph.create_framebuffer(
            device,
            &FramebufferDesc {
                label: None,
                width: 4,
                height: 4,
                render_pass,
                color_targets: &[color],
                depth_stencil_target: None,
            },
        )?;
        let blend = [ColorTargetBlendState::opaque()];
        let pipeline = graph.create_graphics_pipeline(
            device,
            &GraphicsPipelineDesc {
                label: Some("fullscreen"),
                color_blend_state: ColorBlendState {
                    logic_op_enable: false,
                    logic_op: LogicOp::NoOp,
                    blend_constants: [0.0; 4],
                    targets: &blend,
                },
                depth_stencil_state: DepthStencilState::disabled(),
                vertex_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 0 },
                fragment_shader: ShaderStageState { module, entry_point: "main", uniform_buffer_size: 16 },
                multisample_state: MultisampleState::default(),
                layout: PipelineLayoutDesc::default(),
                rasterizer_state: RasterizerState::default(),
                primitive_type: PrimitiveType::TriangleList,
                vertex_input_state: VertexInputState { bindings: &[], attributes: &[] },
                viewport_state: ViewportState { viewports: &[], scissors: &[] },
                render_pass,
            },
        )?;
        let plan = FramePlan {
            render_pass,
            framebuffer,
            pipeline,
            vertex_buffers: Vec::new(),
            fragment_samplers: Vec::new(),
            vertex_start: 0,
            primitive_count: 1,
            present: None,
        };
        Ok((FrameRenderer::new(plan, graph)?, Counter::default()))
    }

    fn app() -> (ManualTimeSource, Application<RecordingDevice, Counter, ManualTimeSource>) {
        let src = ManualTimeSource::new();
        let clock = SimulationClock::new(src.clone(), ClockConfig::default());
        let app = Application::build(RecordingDevice::new().require_staging(true), clock, setup)
            .unwrap();
        (src, app)
    }

    // ── render cadence ────────────────────────────────────────────────────

    #[test]
    fn renders_only_after_an_update() {
        let (src, mut app) = app();

        src.advance(Duration::from_millis(5));
        assert_eq!(app.frame(|| false).unwrap(), AppControl::Continue);
        assert_eq!(app.stats().frames_rendered, 0);

        src.advance(Duration::from_millis(5));
        app.frame(|| false).unwrap();
        assert_eq!(app.stats().updates, 1);
        assert_eq!(app.stats().frames_rendered, 1);
        assert_eq!(app.device().submitted_count(), 1);
    }

    #[test]
    fn long_stall_runs_many_updates_but_one_frame() {
        let (src, mut app) = app();
        src.advance(Duration::from_millis(500));
        app.frame(|| false).unwrap();
        assert_eq!(app.stats().updates, 25);
        assert_eq!(app.stats().frames_rendered, 1);
        assert_eq!(app.simulation().updates, 25);
    }

    // ── quit ──────────────────────────────────────────────────────────────

    #[test]
    fn quit_before_draw_skips_rendering() {
        let (src, mut app) = app();
        src.advance(Duration::from_millis(20));
        // Polls: before the batch, before each of two updates, then before drawing.
        let mut polls = 0;
        let control = app
            .frame(|| {
                polls += 1;
                polls == 4
            })
            .unwrap();
        assert_eq!(control, AppControl::Exit);
        assert_eq!(app.stats().updates, 2);
        assert_eq!(app.stats().frames_rendered, 0);
        assert_eq!(app.device().pending_command_buffers(), 0);
    }

    #[test]
    fn run_stops_when_the_simulation_exits() {
        let (src, mut app) = app();
        app.simulation_mut().exit_after = Some(3);
        src.advance(Duration::from_millis(50));
        let stats = app.run(&mut || false).unwrap();
        assert_eq!(stats.updates, 3);
        // The tick that exits does not render.
        assert_eq!(stats.frames_rendered, 0);
        assert_eq!(app.clock().accumulator(), Duration::from_millis(20));
    }

    // ── failures ──────────────────────────────────────────────────────────

    #[test]
    fn transient_failure_skips_one_frame() {
        let (src, mut app) = app();
        app.device_mut().fail_next(
            FailPoint::Acquire,
            DeviceError::Surface { action: SurfaceErrorAction::SkipFrame },
        );

        src.advance(Duration::from_millis(10));
        assert_eq!(app.frame(|| false).unwrap(), AppControl::Continue);
        src.advance(Duration::from_millis(10));
        app.frame(|| false).unwrap();

        let stats = app.stats();
        assert_eq!((stats.frames_skipped, stats.frames_rendered), (1, 1));
    }

    #[test]
    fn fatal_failure_is_returned() {
        let (src, mut app) = app();
        app.simulation_mut().fatal_errors = true;
        app.device_mut().fail_next(FailPoint::Draw, DeviceError::OutOfMemory);
        src.advance(Duration::from_millis(10));
        let err = app.frame(|| false).unwrap_err();
        assert_eq!(err, FrameError::Device { call: "draw_primitives", source: DeviceError::OutOfMemory });
        assert_eq!(app.device().pending_command_buffers(), 0);
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn shutdown_releases_everything() {
        let (src, mut app) = app();
        src.advance(Duration::from_millis(10));
        app.frame(|| false).unwrap();
        let created: Vec<_> = app.graph().creation_order().collect();

        let device = app.shutdown().unwrap();
        assert_eq!(device.live_resources(), 0);
        let reversed: Vec<_> = created.into_iter().rev().collect();
        assert_eq!(device.destroyed(), reversed.as_slice());
    }

    #[test]
    fn failed_setup_tears_down_partial_graph() {
        let mut device = RecordingDevice::new();
        device.fail_next(
            FailPoint::Create(crate::device::ResourceKind::GraphicsPipeline),
            DeviceError::Injected("pipeline"),
        );
        let err = create_resources(&mut device, setup).err().unwrap();
        assert!(format!("{err:#}").contains("failed to create frame resources"));

        let created: Vec<ResourceHandle> = device
            .log()
            .iter()
            .filter_map(|c| match c {
                Command::CreateShaderModule { module, .. } => Some((*module).into()),
                Command::CreateTexture { texture, .. } => Some((*texture).into()),
                Command::CreateRenderPass { render_pass } => Some((*render_pass).into()),
                Command::CreateColorTarget { target, .. } => Some((*target).into()),
                Command::CreateFramebuffer { framebuffer } => Some((*framebuffer).into()),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 5);
        assert_eq!(device.live_resources(), 0);

        let destroyed: Vec<ResourceHandle> = device
            .log()
            .iter()
            .filter_map(|c| match c {
                Command::Destroy(resource) => Some(*resource),
                _ => None,
            })
            .collect();
        let reversed: Vec<_> = created.into_iter().rev().collect();
        assert_eq!(destroyed, reversed);
        assert_eq!(device.destroyed(), reversed.as_slice());
    }

    #[test]
    fn failed_build_reports_setup_error() {
        let mut device = RecordingDevice::new();
        device.fail_next(
            FailPoint::Create(crate::device::ResourceKind::GraphicsPipeline),
            DeviceError::Injected("pipeline"),
        );
        let clock = SimulationClock::new(ManualTimeSource::new(), ClockConfig::default());
        assert!(Application::build(device, clock, setup).is_err());
    }

    #[test]
    fn reset_clock_discards_setup_time() {
        let (src, mut app) = app();
        src.advance(Duration::from_millis(200));
        app.reset_clock();
        app.frame(|| false).unwrap();
        assert_eq!(app.stats().updates, 0);

        src.advance(Duration::from_millis(20));
        app.frame(|| false).unwrap();
        assert_eq!(app.stats().updates, 2);
    }

    #[test]
    fn frames_carry_the_latest_update() {
        let (src, mut app) = app();
        src.advance(Duration::from_millis(30));
        app.frame(|| false).unwrap();
        let pushes = app
            .device()
            .log()
            .iter()
            .filter(|c| matches!(c, Command::PushShaderParams { .. }))
            .count();
        assert_eq!(pushes, 1);
        // Third update starts at t = 0.02.
        let t = f32::from_le_bytes(app.simulation().params[..4].try_into().unwrap());
        assert!((t - 0.02).abs() < 1e-6);
    }
}
