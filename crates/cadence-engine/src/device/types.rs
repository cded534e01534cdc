//! Descriptor and state types consumed by [`Device`](super::Device).
//!
//! Descriptors that carry variable-length arrays borrow them (`&'a [T]`); the
//! borrow is the stable address the device may read for the duration of the
//! call and no longer.

use serde::Deserialize;

use super::handle::{
    ColorTargetHandle, DepthStencilTargetHandle, FramebufferHandle, RenderPassHandle,
    ShaderModuleHandle, TextureHandle,
};

// ── presentation ──────────────────────────────────────────────────────────

/// Swap behavior requested at device creation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,
    Mailbox,
    #[default]
    Fifo,
    FifoRelaxed,
}

// ── formats ───────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ColorFormat {
    R8G8B8A8,
    B8G8R8A8,
    R16G16B16A16Sfloat,
    R32Sfloat,
}

impl ColorFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorFormat::R8G8B8A8 | ColorFormat::B8G8R8A8 | ColorFormat::R32Sfloat => 4,
            ColorFormat::R16G16B16A16Sfloat => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DepthFormat {
    D16Unorm,
    D32Sfloat,
    D16UnormS8Uint,
    D32SfloatS8Uint,
}

impl DepthFormat {
    pub const fn has_stencil(self) -> bool {
        matches!(self, DepthFormat::D16UnormS8Uint | DepthFormat::D32SfloatS8Uint)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Readable through a sampler in shaders.
        const SAMPLER = 1 << 0;
        /// Usable as a color target.
        const COLOR_TARGET = 1 << 1;
        const DEPTH_STENCIL_TARGET = 1 << 2;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
    }
}

// ── geometry ──────────────────────────────────────────────────────────────

/// Integer rectangle. Width/height may be negative where a backend accepts
/// flipped regions (presentation destinations).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    #[inline]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Normalizes so width/height are non-negative.
    pub fn normalized(self) -> Self {
        let (x0, x1) = span(self.x, self.w);
        let (y0, y1) = span(self.y, self.h);
        Self::new(saturate(x0), saturate(y0), saturate(x1 - x0), saturate(y1 - y0))
    }

    /// Clips to `[0, width) x [0, height)`. Returns `None` for an empty result.
    pub fn clamp_to(self, width: u32, height: u32) -> Option<Self> {
        let (x0, x1) = span(self.x, self.w);
        let (y0, y1) = span(self.y, self.h);
        let (x0, y0) = (x0.max(0), y0.max(0));
        let x1 = x1.min(width as i64);
        let y1 = y1.min(height as i64);
        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some(Self::new(saturate(x0), saturate(y0), saturate(x1 - x0), saturate(y1 - y0)))
        }
    }

    /// `(x, y, w, h)` in texels when the normalized rectangle is non-empty
    /// and lies entirely inside `width x height`.
    pub fn texel_region(self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (x0, x1) = span(self.x, self.w);
        let (y0, y1) = span(self.y, self.h);
        let inside = x0 >= 0
            && y0 >= 0
            && x1 > x0
            && y1 > y0
            && x1 <= width as i64
            && y1 <= height as i64;
        inside.then(|| (x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Ordered `[start, end)` of one axis, widened so it cannot overflow.
fn span(origin: i32, extent: i32) -> (i64, i64) {
    let (a, b) = (origin as i64, origin as i64 + extent as i64);
    (a.min(b), a.max(b))
}

fn saturate(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Region of one mip level / layer of a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureSlice {
    pub texture: TextureHandle,
    pub rect: Rect,
    pub depth: u32,
    pub layer: u32,
    pub level: u32,
}

impl TextureSlice {
    /// Full level-0 slice of a `width x height` texture.
    pub const fn whole(texture: TextureHandle, width: u32, height: u32) -> Self {
        Self {
            texture,
            rect: Rect::from_size(width, height),
            depth: 0,
            layer: 0,
            level: 0,
        }
    }
}

// ── clear values ──────────────────────────────────────────────────────────

/// Linear RGBA color in `[0, 1]`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// From 8-bit channels.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    pub const fn from_array(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DepthStencilValue {
    pub depth: f32,
    pub stencil: u32,
}

impl Default for DepthStencilValue {
    fn default() -> Self {
        Self { depth: 1.0, stencil: 0 }
    }
}

// ── shader modules ────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone)]
pub enum ShaderCode<'a> {
    /// SPIR-V words as little-endian bytes; length must be a multiple of 4.
    SpirV(&'a [u8]),
    Wgsl(&'a str),
}

impl ShaderCode<'_> {
    pub fn byte_len(&self) -> usize {
        match self {
            ShaderCode::SpirV(bytes) => bytes.len(),
            ShaderCode::Wgsl(src) => src.len(),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct ShaderModuleDesc<'a> {
    pub label: Option<&'static str>,
    pub code: ShaderCode<'a>,
}

// ── textures & buffers ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub label: Option<&'static str>,
    pub format: ColorFormat,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub usage: TextureUsage,
}

#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub label: Option<&'static str>,
    pub usage: BufferUsage,
    pub size: u64,
}

// ── render pass ───────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum SampleCount {
    #[default]
    One,
    Two,
    Four,
    Eight,
}

impl SampleCount {
    pub const fn count(self) -> u32 {
        match self {
            SampleCount::One => 1,
            SampleCount::Two => 2,
            SampleCount::Four => 4,
            SampleCount::Eight => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ColorTargetDescription {
    pub format: ColorFormat,
    pub samples: SampleCount,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DepthStencilTargetDescription {
    pub format: DepthFormat,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
}

#[derive(Debug, Copy, Clone)]
pub struct RenderPassDesc<'a> {
    pub label: Option<&'static str>,
    pub color_targets: &'a [ColorTargetDescription],
    pub depth_stencil: Option<DepthStencilTargetDescription>,
}

#[derive(Debug, Copy, Clone)]
pub struct FramebufferDesc<'a> {
    pub label: Option<&'static str>,
    pub width: u32,
    pub height: u32,
    pub render_pass: RenderPassHandle,
    /// Must follow the render pass attachment order.
    pub color_targets: &'a [ColorTargetHandle],
    pub depth_stencil_target: Option<DepthStencilTargetHandle>,
}

/// Arguments for beginning a render pass on a command buffer.
#[derive(Debug, Copy, Clone)]
pub struct RenderPassBegin<'a> {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub render_area: Rect,
    pub color_clear_values: &'a [Color],
    pub depth_stencil_clear_value: Option<DepthStencilValue>,
}

// ── pipeline state ────────────────────────────────────────────────────────

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorComponents: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ColorTargetBlendState {
    pub blend_enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorComponents,
}

impl ColorTargetBlendState {
    /// Blending disabled, all channels written.
    pub const fn opaque() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorComponents::all(),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogicOp {
    Clear,
    And,
    Copy,
    NoOp,
    Xor,
    Or,
    Set,
}

#[derive(Debug, Copy, Clone)]
pub struct ColorBlendState<'a> {
    pub logic_op_enable: bool,
    pub logic_op: LogicOp,
    pub blend_constants: [f32; 4],
    /// One entry per render pass color target.
    pub targets: &'a [ColorTargetBlendState],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl StencilOpState {
    pub const fn disabled() -> Self {
        Self {
            fail_op: StencilOp::Zero,
            pass_op: StencilOp::Zero,
            depth_fail_op: StencilOp::Zero,
            compare_op: CompareOp::Never,
            compare_mask: 0,
            write_mask: 0,
            reference: 0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub compare_op: CompareOp,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front_stencil: StencilOpState,
    pub back_stencil: StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl DepthStencilState {
    /// Depth and stencil testing off.
    pub const fn disabled() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            compare_op: CompareOp::Never,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            front_stencil: StencilOpState::disabled(),
            back_stencil: StencilOpState::disabled(),
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Copy, Clone)]
pub struct ShaderStageState<'a> {
    pub module: ShaderModuleHandle,
    pub entry_point: &'a str,
    /// Size in bytes of one uniform block pushed for this stage; 0 for none.
    pub uniform_buffer_size: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MultisampleState {
    pub count: SampleCount,
    pub sample_mask: u32,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self { count: SampleCount::One, sample_mask: u32::MAX }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct PipelineLayoutDesc {
    pub vertex_sampler_binding_count: u32,
    pub fragment_sampler_binding_count: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FillMode {
    Fill,
    Line,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RasterizerState {
    pub depth_clamp_enable: bool,
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            depth_clamp_enable: false,
            fill_mode: FillMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            depth_bias_enable: false,
            depth_bias_constant_factor: 0.0,
            depth_bias_clamp: 0.0,
            depth_bias_slope_factor: 0.0,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum PrimitiveType {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveType {
    /// Vertices consumed by `primitive_count` primitives.
    pub const fn vertex_count(self, primitive_count: u32) -> u32 {
        if primitive_count == 0 {
            return 0;
        }
        match self {
            PrimitiveType::PointList => primitive_count,
            PrimitiveType::LineList => primitive_count.saturating_mul(2),
            PrimitiveType::LineStrip => primitive_count.saturating_add(1),
            PrimitiveType::TriangleList => primitive_count.saturating_mul(3),
            PrimitiveType::TriangleStrip => primitive_count.saturating_add(2),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VertexElementFormat {
    Uint,
    Single,
    Vector2,
    Vector3,
    Vector4,
    /// Four unsigned normalized bytes.
    Color,
    Byte4,
    Short2,
    Short4,
    HalfVector2,
    HalfVector4,
}

impl VertexElementFormat {
    pub const fn size_bytes(self) -> u32 {
        match self {
            VertexElementFormat::Uint
            | VertexElementFormat::Single
            | VertexElementFormat::Color
            | VertexElementFormat::Byte4
            | VertexElementFormat::Short2
            | VertexElementFormat::HalfVector2 => 4,
            VertexElementFormat::Vector2
            | VertexElementFormat::Short4
            | VertexElementFormat::HalfVector4 => 8,
            VertexElementFormat::Vector3 => 12,
            VertexElementFormat::Vector4 => 16,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexElementFormat,
    pub offset: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct VertexInputState<'a> {
    pub bindings: &'a [VertexBinding],
    pub attributes: &'a [VertexAttribute],
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            w: width as f32,
            h: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct ViewportState<'a> {
    pub viewports: &'a [Viewport],
    pub scissors: &'a [Rect],
}

#[derive(Debug, Copy, Clone)]
pub struct GraphicsPipelineDesc<'a> {
    pub label: Option<&'static str>,
    pub color_blend_state: ColorBlendState<'a>,
    pub depth_stencil_state: DepthStencilState,
    pub vertex_shader: ShaderStageState<'a>,
    pub fragment_shader: ShaderStageState<'a>,
    pub multisample_state: MultisampleState,
    pub layout: PipelineLayoutDesc,
    pub rasterizer_state: RasterizerState,
    pub primitive_type: PrimitiveType,
    pub vertex_input_state: VertexInputState<'a>,
    pub viewport_state: ViewportState<'a>,
    pub render_pass: RenderPassHandle,
}

// ── samplers ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SamplerMipmapMode {
    Nearest,
    Linear,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SamplerAddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BorderColor {
    FloatTransparentBlack,
    IntTransparentBlack,
    FloatOpaqueBlack,
    IntOpaqueBlack,
    FloatOpaqueWhite,
    IntOpaqueWhite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub label: Option<&'static str>,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_mode: SamplerMipmapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: CompareOp,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            label: None,
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Linear,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 0.0,
            compare_enable: false,
            compare_op: CompareOp::Never,
            min_lod: 0.0,
            max_lod: 1.0,
            border_color: BorderColor::IntOpaqueBlack,
        }
    }
}

// ── draws ─────────────────────────────────────────────────────────────────

/// Non-indexed draw. Parameter offsets come from the preceding pushes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawPrimitives {
    pub vertex_start: u32,
    pub primitive_count: u32,
    pub vertex_param_offset: u32,
    pub fragment_param_offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_count_per_topology() {
        assert_eq!(PrimitiveType::TriangleList.vertex_count(1), 3);
        assert_eq!(PrimitiveType::TriangleStrip.vertex_count(2), 4);
        assert_eq!(PrimitiveType::LineStrip.vertex_count(3), 4);
        assert_eq!(PrimitiveType::PointList.vertex_count(0), 0);
    }

    #[test]
    fn rect_normalizes_flipped_height() {
        let flipped = Rect::new(0, 720, 1280, -720);
        assert_eq!(flipped.normalized(), Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn rect_clamp_discards_outside() {
        assert_eq!(Rect::new(-10, -10, 5, 5).clamp_to(100, 100), None);
        assert_eq!(
            Rect::new(-10, 0, 50, 200).clamp_to(100, 100),
            Some(Rect::new(0, 0, 40, 100))
        );
    }

    #[test]
    fn extreme_rects_do_not_overflow() {
        let huge = Rect::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX);
        assert_eq!(huge.texel_region(64, 64), None);
        assert_eq!(huge.clamp_to(64, 64), None);
        assert_eq!(Rect::new(i32::MIN, 0, i32::MIN, 1).normalized().x, i32::MIN);
        assert_eq!(Rect::new(1, 1, i32::MAX, 1).clamp_to(64, 64), Some(Rect::new(1, 1, 63, 1)));
    }

    #[test]
    fn texel_region_accepts_flipped_rects_inside() {
        assert_eq!(Rect::new(0, 4, 4, -4).texel_region(4, 4), Some((0, 0, 4, 4)));
        assert_eq!(Rect::new(3, 0, 2, 1).texel_region(4, 4), None);
        assert_eq!(Rect::new(0, 0, 0, 1).texel_region(4, 4), None);
    }

    #[test]
    fn vertex_element_sizes_match_float_layout() {
        // position (3 floats) + uv (2 floats) = 20 bytes
        let stride = VertexElementFormat::Vector3.size_bytes()
            + VertexElementFormat::Vector2.size_bytes();
        assert_eq!(stride, 20);
    }
}
