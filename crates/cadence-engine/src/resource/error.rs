use crate::device::{DeviceError, ResourceHandle, ResourceKind};

/// Failure to create or upload a resource.
///
/// `label` is the descriptor label, or `"unnamed"`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CreationError {
    #[error("{kind} `{label}` depends on unknown or destroyed {dependency}")]
    MissingDependency {
        kind: ResourceKind,
        label: &'static str,
        dependency: ResourceHandle,
    },

    #[error("framebuffer `{label}` does not match its render pass: {detail}")]
    AttachmentMismatch { label: &'static str, detail: String },

    #[error("pipeline `{label}` has {actual} blend targets, render pass has {expected} color targets")]
    BlendTargetCount {
        label: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("pipeline `{label}` samples {pipeline}x, render pass samples {pass}x")]
    SampleCountMismatch {
        label: &'static str,
        pass: u32,
        pipeline: u32,
    },

    #[error("pipeline `{label}` vertex attribute at location {location}: {detail}")]
    VertexAttribute {
        label: &'static str,
        location: u32,
        detail: String,
    },

    #[error("upload to {resource} is {actual} bytes, expected {expected}")]
    UploadSize {
        resource: ResourceHandle,
        expected: u64,
        actual: u64,
    },

    #[error("write of {len} bytes at offset {offset} overflows {buffer} ({size} bytes)")]
    BufferOverflow {
        buffer: ResourceHandle,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("{resource} lacks {required} usage")]
    WrongUsage {
        resource: ResourceHandle,
        required: &'static str,
    },

    #[error("invalid {kind} `{label}`: {detail}")]
    InvalidDescriptor {
        kind: ResourceKind,
        label: &'static str,
        detail: String,
    },

    #[error("device failed to create {kind} `{label}`")]
    Device {
        kind: ResourceKind,
        label: &'static str,
        #[source]
        source: DeviceError,
    },
}

/// Failure to destroy a resource.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DestroyError {
    #[error("unknown or already destroyed {0}")]
    Unknown(ResourceHandle),

    #[error("{resource} is still referenced by {dependent}")]
    InUse {
        resource: ResourceHandle,
        dependent: ResourceHandle,
    },

    #[error("device failed to destroy {resource}")]
    Device {
        resource: ResourceHandle,
        #[source]
        source: DeviceError,
    },
}
