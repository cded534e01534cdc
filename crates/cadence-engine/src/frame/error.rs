use crate::device::{DeviceError, ResourceHandle, ShaderStage};

/// What the application loop does after a failed frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameErrorAction {
    /// Drop this frame; the device stays valid for the next one.
    SkipFrame,
    /// Stop the loop and shut down.
    Fatal,
}

/// Failure while recording or submitting a frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("device failed during {call}")]
    Device {
        call: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("frame references unknown or destroyed {0}")]
    UnknownResource(ResourceHandle),

    #[error("{what}: pipeline expects {expected}, got {actual}")]
    BindingCount {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("vertex binding {binding}: pipeline stride is {expected}, buffer declares {actual:?}")]
    VertexLayoutMismatch {
        binding: u32,
        expected: u32,
        actual: Option<u32>,
    },

    #[error("{stage:?} parameters are {actual} bytes, pipeline declares {expected}")]
    ParamSize {
        stage: ShaderStage,
        expected: u64,
        actual: u64,
    },

    #[error("draw is missing {stage:?} parameters")]
    MissingParams { stage: ShaderStage },

    #[error("{stage:?} parameter offset belongs to another command buffer or stage")]
    ForeignParamOffset { stage: ShaderStage },

    #[error("{0} bound for reading before upload")]
    NotUploaded(ResourceHandle),

    #[error("{resource} lacks {required} usage")]
    WrongUsage {
        resource: ResourceHandle,
        required: &'static str,
    },

    #[error("{resource} was created for {expected}, not the active {actual}")]
    RenderPassMismatch {
        resource: ResourceHandle,
        expected: ResourceHandle,
        actual: ResourceHandle,
    },

    #[error("render pass begin supplies {actual} clear values for {expected} color targets")]
    ClearValueCount { expected: usize, actual: usize },
}

impl FrameError {
    pub(crate) fn device(call: &'static str) -> impl FnOnce(DeviceError) -> FrameError {
        move |source| FrameError::Device { call, source }
    }

    /// Transient device errors skip the frame; everything else is fatal.
    pub fn default_action(&self) -> FrameErrorAction {
        match self {
            FrameError::Device { source, .. } if source.is_transient() => {
                FrameErrorAction::SkipFrame
            }
            _ => FrameErrorAction::Fatal,
        }
    }
}
