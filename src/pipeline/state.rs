//! Fixed-Function State
//!
//! Blend, depth, stencil, cull and primitive state with packed integer keys.
//! Each state object exposes a `key()` that is stable across instances: two
//! objects with the same effective settings produce the same key, whatever
//! their identity. The keys are words of the render pipeline hash input.
//!
//! Enumerations are closed and map to `wgpu` through exhaustive matches.

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendEquation {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::BlendOperation {
        match self {
            Self::Add => wgpu::BlendOperation::Add,
            Self::Subtract => wgpu::BlendOperation::Subtract,
            Self::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            Self::Min => wgpu::BlendOperation::Min,
            Self::Max => wgpu::BlendOperation::Max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
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
    SrcAlphaSaturated,
    Constant,
    OneMinusConstant,
}

impl BlendFactor {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::BlendFactor {
        match self {
            Self::Zero => wgpu::BlendFactor::Zero,
            Self::One => wgpu::BlendFactor::One,
            Self::SrcColor => wgpu::BlendFactor::Src,
            Self::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
            Self::DstColor => wgpu::BlendFactor::Dst,
            Self::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
            Self::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
            Self::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
            Self::DstAlpha => wgpu::BlendFactor::DstAlpha,
            Self::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
            Self::SrcAlphaSaturated => wgpu::BlendFactor::SrcAlphaSaturated,
            Self::Constant => wgpu::BlendFactor::Constant,
            Self::OneMinusConstant => wgpu::BlendFactor::OneMinusConstant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl CompareFunc {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::CompareFunction {
        match self {
            Self::Never => wgpu::CompareFunction::Never,
            Self::Less => wgpu::CompareFunction::Less,
            Self::Equal => wgpu::CompareFunction::Equal,
            Self::LessEqual => wgpu::CompareFunction::LessEqual,
            Self::Greater => wgpu::CompareFunction::Greater,
            Self::NotEqual => wgpu::CompareFunction::NotEqual,
            Self::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            Self::Always => wgpu::CompareFunction::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Invert,
    IncrementClamp,
    DecrementClamp,
    IncrementWrap,
    DecrementWrap,
}

impl StencilOp {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::StencilOperation {
        match self {
            Self::Keep => wgpu::StencilOperation::Keep,
            Self::Zero => wgpu::StencilOperation::Zero,
            Self::Replace => wgpu::StencilOperation::Replace,
            Self::Invert => wgpu::StencilOperation::Invert,
            Self::IncrementClamp => wgpu::StencilOperation::IncrementClamp,
            Self::DecrementClamp => wgpu::StencilOperation::DecrementClamp,
            Self::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
            Self::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

impl CullMode {
    #[must_use]
    pub fn to_wgpu(self) -> Option<wgpu::Face> {
        match self {
            Self::None => None,
            Self::Back => Some(wgpu::Face::Back),
            Self::Front => Some(wgpu::Face::Front),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

impl FrontFace {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::FrontFace {
        match self {
            Self::Ccw => wgpu::FrontFace::Ccw,
            Self::Cw => wgpu::FrontFace::Cw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl PrimitiveType {
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            Self::Points => wgpu::PrimitiveTopology::PointList,
            Self::Lines => wgpu::PrimitiveTopology::LineList,
            Self::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Self::Triangles => wgpu::PrimitiveTopology::TriangleList,
            Self::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_strip(self) -> bool {
        matches!(self, Self::LineStrip | Self::TriangleStrip)
    }
}

// ─── Blend ───────────────────────────────────────────────────────────────────

/// Color blending and write mask of the first color target.
///
/// Key layout (bits): `enabled:1 | color_op:3 | color_src:4 | color_dst:4 |
/// alpha_op:3 | alpha_src:4 | alpha_dst:4 | write_mask:4`. Disabled blending
/// zeroes every equation field so all disabled states share one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub color_op: BlendEquation,
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub alpha_op: BlendEquation,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
    pub write_mask: wgpu::ColorWrites,
}

impl Default for BlendState {
    fn default() -> Self {
        Self::NONE
    }
}

impl BlendState {
    /// Blending off, all channels written.
    pub const NONE: Self = Self {
        enabled: false,
        color_op: BlendEquation::Add,
        color_src: BlendFactor::One,
        color_dst: BlendFactor::Zero,
        alpha_op: BlendEquation::Add,
        alpha_src: BlendFactor::One,
        alpha_dst: BlendFactor::Zero,
        write_mask: wgpu::ColorWrites::ALL,
    };

    /// Straight alpha blending.
    pub const ALPHA: Self = Self {
        enabled: true,
        color_op: BlendEquation::Add,
        color_src: BlendFactor::SrcAlpha,
        color_dst: BlendFactor::OneMinusSrcAlpha,
        alpha_op: BlendEquation::Add,
        alpha_src: BlendFactor::One,
        alpha_dst: BlendFactor::OneMinusSrcAlpha,
        write_mask: wgpu::ColorWrites::ALL,
    };

    pub const PREMULTIPLIED: Self = Self {
        color_src: BlendFactor::One,
        ..Self::ALPHA
    };

    pub const ADDITIVE: Self = Self {
        enabled: true,
        color_op: BlendEquation::Add,
        color_src: BlendFactor::One,
        color_dst: BlendFactor::One,
        alpha_op: BlendEquation::Add,
        alpha_src: BlendFactor::One,
        alpha_dst: BlendFactor::One,
        write_mask: wgpu::ColorWrites::ALL,
    };

    #[must_use]
    pub fn with_write_mask(mut self, mask: wgpu::ColorWrites) -> Self {
        self.write_mask = mask;
        self
    }

    #[must_use]
    pub fn key(&self) -> u32 {
        let mask = self.write_mask.bits() << 23;
        if !self.enabled {
            return mask;
        }
        1 | (self.color_op as u32) << 1
            | (self.color_src as u32) << 4
            | (self.color_dst as u32) << 8
            | (self.alpha_op as u32) << 12
            | (self.alpha_src as u32) << 15
            | (self.alpha_dst as u32) << 19
            | mask
    }

    #[must_use]
    pub fn to_wgpu(&self) -> Option<wgpu::BlendState> {
        self.enabled.then(|| wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: self.color_src.to_wgpu(),
                dst_factor: self.color_dst.to_wgpu(),
                operation: self.color_op.to_wgpu(),
            },
            alpha: wgpu::BlendComponent {
                src_factor: self.alpha_src.to_wgpu(),
                dst_factor: self.alpha_dst.to_wgpu(),
                operation: self.alpha_op.to_wgpu(),
            },
        })
    }
}

// ─── Depth ───────────────────────────────────────────────────────────────────

/// Depth test and write. Key layout: `test:1 | write:1 | func:3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub func: CompareFunc,
}

impl Default for DepthState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl DepthState {
    pub const DEFAULT: Self = Self {
        test: true,
        write: true,
        func: CompareFunc::LessEqual,
    };

    pub const NO_WRITE: Self = Self {
        write: false,
        ..Self::DEFAULT
    };

    pub const NONE: Self = Self {
        test: false,
        write: false,
        func: CompareFunc::Always,
    };

    /// Compare function the pipeline uses; a disabled test always passes.
    #[must_use]
    pub fn effective_func(&self) -> CompareFunc {
        if self.test { self.func } else { CompareFunc::Always }
    }

    #[must_use]
    pub fn key(&self) -> u32 {
        u32::from(self.test) | u32::from(self.write) << 1 | (self.effective_func() as u32) << 2
    }
}

// ─── Stencil ─────────────────────────────────────────────────────────────────

/// Stencil settings of one face.
///
/// The reference value is dynamic pass state and is not part of the key.
/// Key layout: `func:3 | fail:3 | zfail:3 | zpass:3 | read_mask:8 |
/// write_mask:8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilParameters {
    pub func: CompareFunc,
    pub fail: StencilOp,
    pub zfail: StencilOp,
    pub zpass: StencilOp,
    pub read_mask: u8,
    pub write_mask: u8,
    pub reference: u32,
}

impl Default for StencilParameters {
    fn default() -> Self {
        Self {
            func: CompareFunc::Always,
            fail: StencilOp::Keep,
            zfail: StencilOp::Keep,
            zpass: StencilOp::Keep,
            read_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

impl StencilParameters {
    #[must_use]
    pub fn key(&self) -> u32 {
        (self.func as u32)
            | (self.fail as u32) << 3
            | (self.zfail as u32) << 6
            | (self.zpass as u32) << 9
            | u32::from(self.read_mask) << 12
            | u32::from(self.write_mask) << 20
    }

    #[must_use]
    pub fn to_wgpu(&self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.func.to_wgpu(),
            fail_op: self.fail.to_wgpu(),
            depth_fail_op: self.zfail.to_wgpu(),
            pass_op: self.zpass.to_wgpu(),
        }
    }
}

/// Hash word of an optional stencil face: `0` when disabled.
#[inline]
#[must_use]
pub fn stencil_word(stencil: Option<&StencilParameters>) -> u32 {
    stencil.map_or(0, |s| s.key() + 1)
}

/// Combined wgpu stencil state. The API has one read and one write mask for
/// both faces; the front face's masks win when both are set.
#[must_use]
pub fn stencil_state(
    front: Option<&StencilParameters>,
    back: Option<&StencilParameters>,
) -> wgpu::StencilState {
    let face = |s: Option<&StencilParameters>| {
        s.map_or(wgpu::StencilFaceState::IGNORE, StencilParameters::to_wgpu)
    };
    let masks = front.or(back);
    wgpu::StencilState {
        front: face(front),
        back: face(back),
        read_mask: masks.map_or(0, |s| u32::from(s.read_mask)),
        write_mask: masks.map_or(0, |s| u32::from(s.write_mask)),
    }
}

// ─── Render State ────────────────────────────────────────────────────────────

/// Fixed-function state of one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderState {
    pub primitive: PrimitiveType,
    pub cull: CullMode,
    pub front_face: FrontFace,
    pub depth: DepthState,
    pub blend: BlendState,
    pub stencil_front: Option<StencilParameters>,
    pub stencil_back: Option<StencilParameters>,
}

impl RenderState {
    /// Stencil reference set on the pass before drawing.
    #[must_use]
    pub fn stencil_reference(&self) -> Option<u32> {
        self.stencil_front
            .as_ref()
            .or(self.stencil_back.as_ref())
            .map(|s| s.reference)
    }
}
