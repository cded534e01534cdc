//! Mappings from device-API state to wgpu state.

use crate::device::{
    BlendFactor, BlendOp, BorderColor, Color, ColorComponents, ColorFormat,
    ColorTargetBlendState, CompareOp, CullMode, DepthFormat, DeviceError, FillMode, Filter,
    FrontFace, LoadOp, PresentMode, PrimitiveType, SamplerAddressMode, SamplerMipmapMode,
    StencilOp, StencilOpState, StoreOp, VertexElementFormat, VertexInputRate,
};

pub(super) fn present_mode(mode: PresentMode) -> wgpu::PresentMode {
    match mode {
        PresentMode::Immediate => wgpu::PresentMode::Immediate,
        PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
        PresentMode::Fifo => wgpu::PresentMode::Fifo,
        PresentMode::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
    }
}

pub(super) fn color_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::R8G8B8A8 => wgpu::TextureFormat::Rgba8Unorm,
        ColorFormat::B8G8R8A8 => wgpu::TextureFormat::Bgra8Unorm,
        ColorFormat::R16G16B16A16Sfloat => wgpu::TextureFormat::Rgba16Float,
        ColorFormat::R32Sfloat => wgpu::TextureFormat::R32Float,
    }
}

/// wgpu has no 16-bit depth with stencil and gates 32-bit float depth with
/// stencil behind a feature; both stencil formats map to `Depth24PlusStencil8`.
pub(super) fn depth_format(format: DepthFormat) -> wgpu::TextureFormat {
    match format {
        DepthFormat::D16Unorm => wgpu::TextureFormat::Depth16Unorm,
        DepthFormat::D32Sfloat => wgpu::TextureFormat::Depth32Float,
        DepthFormat::D16UnormS8Uint | DepthFormat::D32SfloatS8Uint => {
            wgpu::TextureFormat::Depth24PlusStencil8
        }
    }
}

pub(super) fn color(c: Color) -> wgpu::Color {
    wgpu::Color { r: c.r as f64, g: c.g as f64, b: c.b as f64, a: c.a as f64 }
}

pub(super) fn load_op<V>(op: LoadOp, clear: V) -> wgpu::LoadOp<V> {
    match op {
        LoadOp::Load => wgpu::LoadOp::Load,
        // Clearing is the portable stand-in for an undefined initial value.
        LoadOp::Clear | LoadOp::DontCare => wgpu::LoadOp::Clear(clear),
    }
}

pub(super) fn store_op(op: StoreOp) -> wgpu::StoreOp {
    match op {
        StoreOp::Store => wgpu::StoreOp::Store,
        StoreOp::DontCare => wgpu::StoreOp::Discard,
    }
}

fn blend_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

fn blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
        BlendOp::Min => wgpu::BlendOperation::Min,
        BlendOp::Max => wgpu::BlendOperation::Max,
    }
}

pub(super) fn blend_state(state: &ColorTargetBlendState) -> Option<wgpu::BlendState> {
    state.blend_enable.then(|| wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_color_factor),
            dst_factor: blend_factor(state.dst_color_factor),
            operation: blend_op(state.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_alpha_factor),
            dst_factor: blend_factor(state.dst_alpha_factor),
            operation: blend_op(state.alpha_op),
        },
    })
}

pub(super) fn color_writes(mask: ColorComponents) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    if mask.contains(ColorComponents::R) {
        writes |= wgpu::ColorWrites::RED;
    }
    if mask.contains(ColorComponents::G) {
        writes |= wgpu::ColorWrites::GREEN;
    }
    if mask.contains(ColorComponents::B) {
        writes |= wgpu::ColorWrites::BLUE;
    }
    if mask.contains(ColorComponents::A) {
        writes |= wgpu::ColorWrites::ALPHA;
    }
    writes
}

pub(super) fn compare(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::LessOrEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareOp::GreaterOrEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrementAndClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrementAndClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementAndWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementAndWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

pub(super) fn stencil_face(state: &StencilOpState) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: compare(state.compare_op),
        fail_op: stencil_op(state.fail_op),
        depth_fail_op: stencil_op(state.depth_fail_op),
        pass_op: stencil_op(state.pass_op),
    }
}

pub(super) fn cull_mode(mode: CullMode) -> Result<Option<wgpu::Face>, DeviceError> {
    match mode {
        CullMode::None => Ok(None),
        CullMode::Front => Ok(Some(wgpu::Face::Front)),
        CullMode::Back => Ok(Some(wgpu::Face::Back)),
        CullMode::FrontAndBack => Err(DeviceError::Unsupported("culling both faces".into())),
    }
}

pub(super) fn front_face(face: FrontFace) -> wgpu::FrontFace {
    match face {
        FrontFace::CounterClockwise => wgpu::FrontFace::Ccw,
        FrontFace::Clockwise => wgpu::FrontFace::Cw,
    }
}

pub(super) fn polygon_mode(
    mode: FillMode,
    features: wgpu::Features,
) -> Result<wgpu::PolygonMode, DeviceError> {
    match mode {
        FillMode::Fill => Ok(wgpu::PolygonMode::Fill),
        FillMode::Line if features.contains(wgpu::Features::POLYGON_MODE_LINE) => {
            Ok(wgpu::PolygonMode::Line)
        }
        FillMode::Line => Err(DeviceError::Unsupported("line fill mode".into())),
    }
}

pub(super) fn topology(primitive: PrimitiveType) -> wgpu::PrimitiveTopology {
    match primitive {
        PrimitiveType::PointList => wgpu::PrimitiveTopology::PointList,
        PrimitiveType::LineList => wgpu::PrimitiveTopology::LineList,
        PrimitiveType::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        PrimitiveType::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        PrimitiveType::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub(super) fn vertex_format(format: VertexElementFormat) -> wgpu::VertexFormat {
    match format {
        VertexElementFormat::Uint => wgpu::VertexFormat::Uint32,
        VertexElementFormat::Single => wgpu::VertexFormat::Float32,
        VertexElementFormat::Vector2 => wgpu::VertexFormat::Float32x2,
        VertexElementFormat::Vector3 => wgpu::VertexFormat::Float32x3,
        VertexElementFormat::Vector4 => wgpu::VertexFormat::Float32x4,
        VertexElementFormat::Color => wgpu::VertexFormat::Unorm8x4,
        VertexElementFormat::Byte4 => wgpu::VertexFormat::Uint8x4,
        VertexElementFormat::Short2 => wgpu::VertexFormat::Sint16x2,
        VertexElementFormat::Short4 => wgpu::VertexFormat::Sint16x4,
        VertexElementFormat::HalfVector2 => wgpu::VertexFormat::Float16x2,
        VertexElementFormat::HalfVector4 => wgpu::VertexFormat::Float16x4,
    }
}

pub(super) fn step_mode(rate: VertexInputRate) -> wgpu::VertexStepMode {
    match rate {
        VertexInputRate::Vertex => wgpu::VertexStepMode::Vertex,
        VertexInputRate::Instance => wgpu::VertexStepMode::Instance,
    }
}

pub(super) fn filter(f: Filter) -> wgpu::FilterMode {
    match f {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

pub(super) fn mipmap_filter(mode: SamplerMipmapMode) -> wgpu::MipmapFilterMode {
    match mode {
        SamplerMipmapMode::Nearest => wgpu::MipmapFilterMode::Nearest,
        SamplerMipmapMode::Linear => wgpu::MipmapFilterMode::Linear,
    }
}

/// Clamp-to-border needs a device feature; without it edges are clamped.
pub(super) fn address_mode(mode: SamplerAddressMode, features: wgpu::Features) -> wgpu::AddressMode {
    match mode {
        SamplerAddressMode::Repeat => wgpu::AddressMode::Repeat,
        SamplerAddressMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        SamplerAddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        SamplerAddressMode::ClampToBorder
            if features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER) =>
        {
            wgpu::AddressMode::ClampToBorder
        }
        SamplerAddressMode::ClampToBorder => wgpu::AddressMode::ClampToEdge,
    }
}

pub(super) fn border_color(color: BorderColor) -> wgpu::SamplerBorderColor {
    match color {
        BorderColor::FloatTransparentBlack | BorderColor::IntTransparentBlack => {
            wgpu::SamplerBorderColor::TransparentBlack
        }
        BorderColor::FloatOpaqueBlack | BorderColor::IntOpaqueBlack => {
            wgpu::SamplerBorderColor::OpaqueBlack
        }
        BorderColor::FloatOpaqueWhite | BorderColor::IntOpaqueWhite => {
            wgpu::SamplerBorderColor::OpaqueWhite
        }
    }
}
