use crate::frame::{FrameContext, FrameError, FrameErrorAction};
use crate::time::StepTime;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Simulation state driven by the application loop.
pub trait Simulation {
    /// Advances the simulation by one fixed step.
    fn update(&mut self, step: StepTime) -> AppControl;

    /// Inputs for the frame about to be recorded. Called after the updates it observes.
    fn frame_context(&self) -> FrameContext<'_>;

    /// Decides whether a failed frame is skipped or ends the loop.
    fn on_frame_error(&mut self, err: &FrameError) -> FrameErrorAction {
        err.default_action()
    }
}

/// Source of quit requests (window close, input, frame budget).
pub trait EventSource {
    /// Returns `true` once quit has been requested.
    fn poll_quit(&mut self) -> bool;
}

impl<F: FnMut() -> bool> EventSource for F {
    fn poll_quit(&mut self) -> bool {
        self()
    }
}
