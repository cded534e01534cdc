//! Per-frame command recording.
//!
//! [`CommandRecorder`] enforces the call order of one command buffer in its
//! types; [`FrameRenderer`] drives it from a fixed [`FramePlan`] each frame.

mod context;
mod error;
mod present;
mod recorder;
mod renderer;

pub use context::{FrameContext, FramePlan, FrameStats};
pub use error::{FrameError, FrameErrorAction};
pub use present::{PresentPlan, PresentTransform};
pub use recorder::{
    Acquired, CommandRecorder, DrawArgs, InRenderPass, ParamOffset, PassEnded, PipelineBound,
};
pub use renderer::FrameRenderer;
