use super::handle::ResourceHandle;

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Failure reported by a device backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("unknown or destroyed {0}")]
    InvalidHandle(ResourceHandle),

    #[error("unknown or already submitted command buffer #{0}")]
    InvalidCommandBuffer(u64),

    #[error("device out of memory")]
    OutOfMemory,

    #[error("unsupported by backend: {0}")]
    Unsupported(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("command sequencing violated: {0}")]
    Sequencing(String),

    #[error("surface unavailable ({action:?})")]
    Surface { action: SurfaceErrorAction },

    #[error("injected failure: {0}")]
    Injected(&'static str),
}

impl DeviceError {
    /// True when the device stays usable and only the current frame is lost.
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Surface { action } => *action != SurfaceErrorAction::Fatal,
            _ => false,
        }
    }
}
