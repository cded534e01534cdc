use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::core::{AppControl, Application, LoopStats, Simulation};
use crate::device::{GpuInit, WgpuDevice};
use crate::frame::FrameRenderer;
use crate::resource::ResourceGraph;
use crate::time::{ClockConfig, SimulationClock, SystemTimeSource};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "cadence".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Entry point for the windowed loop.
pub struct Runtime;

impl Runtime {
    /// Opens a window, creates the device, runs `setup`, and drives the
    /// fixed-step loop until the window closes, Escape is pressed, or the
    /// simulation exits. Resources are torn down before returning.
    pub fn run<S, F>(
        config: RuntimeConfig,
        gpu_init: GpuInit,
        clock: ClockConfig,
        setup: F,
    ) -> Result<LoopStats>
    where
        S: Simulation + 'static,
        F: FnOnce(&mut WgpuDevice, &mut ResourceGraph) -> Result<(FrameRenderer, S)> + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            gpu_init,
            clock,
            setup: Some(setup),
            window: None,
            app: None,
            quit_requested: false,
            error: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        let stats = state.app.as_ref().map(|app| app.stats()).unwrap_or_default();
        if let Some(app) = state.app.take() {
            app.close()?;
        }
        if let Some(err) = state.error {
            return Err(err);
        }
        log::info!(
            "runtime finished: {} updates, {} frames rendered, {} skipped",
            stats.updates,
            stats.frames_rendered,
            stats.frames_skipped
        );
        Ok(stats)
    }
}

struct AppState<S, F>
where
    S: Simulation,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    clock: ClockConfig,
    setup: Option<F>,

    window: Option<Arc<Window>>,
    app: Option<Application<WgpuDevice, S>>,

    quit_requested: bool,
    error: Option<anyhow::Error>,
}

impl<S, F> AppState<S, F>
where
    S: Simulation,
    F: FnOnce(&mut WgpuDevice, &mut ResourceGraph) -> Result<(FrameRenderer, S)>,
{
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);

        let device = pollster::block_on(WgpuDevice::new(window.clone(), self.gpu_init.clone()))
            .context("GPU initialization failed")?;
        let setup = self.setup.take().ok_or_else(|| anyhow!("runtime started twice"))?;
        let clock = SimulationClock::new(SystemTimeSource::new(), self.clock);
        let mut app = Application::build(device, clock, setup)?;
        // Asset loading during setup is not simulation time.
        app.reset_clock();

        window.request_redraw();
        self.window = Some(window);
        self.app = Some(app);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }
}

impl<S, F> ApplicationHandler for AppState<S, F>
where
    S: Simulation,
    F: FnOnce(&mut WgpuDevice, &mut ResourceGraph) -> Result<(FrameRenderer, S)>,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.app.is_some() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.quit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw; the clock decides whether a frame is due.
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(app) = self.app.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                log::debug!("quit requested");
                self.quit_requested = true;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                app.device_mut().resize(size);
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = app.device().window().inner_size();
                app.device_mut().resize(size);
            }

            WindowEvent::RedrawRequested => {
                let quit = self.quit_requested;
                match app.frame(|| quit) {
                    Ok(AppControl::Continue) => {}
                    Ok(AppControl::Exit) => {
                        self.quit_requested = true;
                        event_loop.exit();
                    }
                    Err(err) => {
                        let err = anyhow::Error::new(err).context("frame failed");
                        self.fail(event_loop, err);
                    }
                }
            }

            _ => {}
        }
    }
}
