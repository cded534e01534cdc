use std::fmt;
use std::num::NonZeroU64;

/// Kind of device-owned resource. Used for diagnostics and teardown.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    ShaderModule,
    Texture,
    Buffer,
    RenderPass,
    ColorTarget,
    DepthStencilTarget,
    Framebuffer,
    GraphicsPipeline,
    Sampler,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::ShaderModule => "shader module",
            ResourceKind::Texture => "texture",
            ResourceKind::Buffer => "buffer",
            ResourceKind::RenderPass => "render pass",
            ResourceKind::ColorTarget => "color target",
            ResourceKind::DepthStencilTarget => "depth-stencil target",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::GraphicsPipeline => "graphics pipeline",
            ResourceKind::Sampler => "sampler",
        };
        f.write_str(name)
    }
}

macro_rules! resource_handles {
    ($($(#[$meta:meta])* $name:ident => $kind:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
            pub struct $name(NonZeroU64);

            impl $name {
                /// Wraps a backend-issued raw id.
                #[inline]
                pub const fn from_raw(raw: NonZeroU64) -> Self {
                    Self(raw)
                }

                #[inline]
                pub const fn raw(self) -> NonZeroU64 {
                    self.0
                }
            }

            impl From<$name> for ResourceHandle {
                #[inline]
                fn from(handle: $name) -> Self {
                    ResourceHandle::$kind(handle)
                }
            }
        )*

        /// Any device-owned resource handle.
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub enum ResourceHandle {
            $($kind($name),)*
        }

        impl ResourceHandle {
            pub fn kind(self) -> ResourceKind {
                match self {
                    $(ResourceHandle::$kind(_) => ResourceKind::$kind,)*
                }
            }

            pub fn raw(self) -> NonZeroU64 {
                match self {
                    $(ResourceHandle::$kind(h) => h.raw(),)*
                }
            }
        }
    };
}

resource_handles! {
    /// Compiled shader code.
    ShaderModuleHandle => ShaderModule;
    TextureHandle => Texture;
    BufferHandle => Buffer;
    RenderPassHandle => RenderPass;
    /// Render target view over a texture slice.
    ColorTargetHandle => ColorTarget;
    DepthStencilTargetHandle => DepthStencilTarget;
    FramebufferHandle => Framebuffer;
    GraphicsPipelineHandle => GraphicsPipeline;
    SamplerHandle => Sampler;
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind(), self.raw())
    }
}

/// Transient, single-use command buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CommandBufferHandle(NonZeroU64);

impl CommandBufferHandle {
    #[inline]
    pub const fn from_raw(raw: NonZeroU64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> NonZeroU64 {
        self.0
    }
}

/// Monotonic raw-id source for backends. Ids are never reused.
#[derive(Debug)]
pub struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_raw(&mut self) -> NonZeroU64 {
        let raw = NonZeroU64::new(self.next).unwrap_or(NonZeroU64::MIN);
        self.next = self.next.wrapping_add(1).max(1);
        raw
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_starts_at_one_and_increments() {
        let mut ids = HandleAllocator::new();
        assert_eq!(ids.next_raw().get(), 1);
        assert_eq!(ids.next_raw().get(), 2);
        assert_eq!(ids.next_raw().get(), 3);
    }

    #[test]
    fn resource_handle_reports_kind() {
        let mut ids = HandleAllocator::new();
        let pass = RenderPassHandle::from_raw(ids.next_raw());
        let handle: ResourceHandle = pass.into();
        assert_eq!(handle.kind(), ResourceKind::RenderPass);
        assert_eq!(handle.to_string(), "render pass #1");
    }
}
