// Fixed-function render state carried by pipelines and set on the renderer.
//
// Each block is a plain value type so that pipeline configurations can be
// hashed and compared. The enums keep the hardware register encodings as
// discriminants.

use crate::texture::AbstractTextureFormat;

// ---------------------------------------------------------------------------
// Rasterization
// ---------------------------------------------------------------------------

/// Primitive class a batch is drawn with. Quads and fans are expanded to
/// triangles by the index generator before they reach this level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveType {
    Points = 0,
    Lines = 1,
    #[default]
    Triangles = 2,
    TriangleStrip = 3,
}

/// Face-culling mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CullMode {
    #[default]
    None = 0,
    Back = 1,
    Front = 2,
    All = 3,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub primitive: PrimitiveType,
    pub cull_mode: CullMode,
}

impl RasterizationState {
    /// State used by the renderer's own full-screen and overlay draws.
    pub fn utility(primitive: PrimitiveType) -> Self {
        Self {
            primitive,
            cull_mode: CullMode::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Depth
// ---------------------------------------------------------------------------

/// Compare function, shared by the depth test and alpha compare.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompareFunction {
    Never = 0,
    Less = 1,
    Equal = 2,
    #[default]
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    Always = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test_enable: bool,
    pub update_enable: bool,
    pub func: CompareFunction,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            update_enable: true,
            func: CompareFunction::LessEqual,
        }
    }
}

impl DepthState {
    /// Depth test and writes disabled.
    pub fn no_depth() -> Self {
        Self {
            test_enable: false,
            update_enable: false,
            func: CompareFunction::Always,
        }
    }

    /// Depth writes enabled, test always passes.
    pub fn always_write() -> Self {
        Self {
            test_enable: true,
            update_enable: true,
            func: CompareFunction::Always,
        }
    }
}

// ---------------------------------------------------------------------------
// Blending
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    Zero = 0,
    #[default]
    One = 1,
    SrcClr = 2,
    InvSrcClr = 3,
    SrcAlpha = 4,
    InvSrcAlpha = 5,
    DstAlpha = 6,
    InvDstAlpha = 7,
    DstClr = 8,
    InvDstClr = 9,
}

/// Logic-op selectors used when logic op blending is enabled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogicOp {
    Clear = 0,
    And = 1,
    AndReverse = 2,
    #[default]
    Copy = 3,
    AndInverted = 4,
    NoOp = 5,
    Xor = 6,
    Or = 7,
    Nor = 8,
    Equiv = 9,
    Invert = 10,
    OrReverse = 11,
    CopyInverted = 12,
    OrInverted = 13,
    Nand = 14,
    Set = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendingState {
    pub blend_enable: bool,
    pub logic_op_enable: bool,
    pub dst_alpha: bool,
    pub color_update: bool,
    pub alpha_update: bool,
    pub subtract: bool,
    pub subtract_alpha: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub src_factor_alpha: BlendFactor,
    pub dst_factor_alpha: BlendFactor,
    pub logic_mode: LogicOp,
}

impl Default for BlendingState {
    fn default() -> Self {
        Self::no_blend()
    }
}

impl BlendingState {
    /// Opaque writes to all channels.
    pub fn no_blend() -> Self {
        Self {
            blend_enable: false,
            logic_op_enable: false,
            dst_alpha: false,
            color_update: true,
            alpha_update: true,
            subtract: false,
            subtract_alpha: false,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            src_factor_alpha: BlendFactor::One,
            dst_factor_alpha: BlendFactor::Zero,
            logic_mode: LogicOp::Copy,
        }
    }

    /// Standard premultiplied-less alpha blending, used by the overlay.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::InvSrcAlpha,
            src_factor_alpha: BlendFactor::SrcAlpha,
            dst_factor_alpha: BlendFactor::InvSrcAlpha,
            ..Self::no_blend()
        }
    }

    /// Color writes disabled entirely.
    pub fn no_color_write() -> Self {
        Self {
            color_update: false,
            alpha_update: false,
            ..Self::no_blend()
        }
    }

    /// True when the blend factors read the source alpha of a second output.
    pub fn uses_dual_source(&self) -> bool {
        self.blend_enable
            && self.dst_alpha
            && matches!(
                self.src_factor,
                BlendFactor::SrcAlpha | BlendFactor::InvSrcAlpha
            )
    }
}

// ---------------------------------------------------------------------------
// Framebuffer and sampler state
// ---------------------------------------------------------------------------

/// Render-target shape a pipeline is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferState {
    pub color_format: AbstractTextureFormat,
    pub depth_format: AbstractTextureFormat,
    pub samples: u32,
    pub per_sample_shading: bool,
}

impl Default for FramebufferState {
    fn default() -> Self {
        Self {
            color_format: AbstractTextureFormat::RGBA8,
            depth_format: AbstractTextureFormat::Undefined,
            samples: 1,
            per_sample_shading: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Point,
    Linear,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    #[default]
    Clamp,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerState {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_filter: Filter,
    pub wrap_u: AddressMode,
    pub wrap_v: AddressMode,
    /// Bias in 1/256 level units.
    pub lod_bias: i32,
    /// Max LOD in 1/16 level units.
    pub max_lod: u32,
    pub anisotropic_filtering: bool,
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::point()
    }
}

impl SamplerState {
    pub fn point() -> Self {
        Self {
            min_filter: Filter::Point,
            mag_filter: Filter::Point,
            mipmap_filter: Filter::Point,
            wrap_u: AddressMode::Clamp,
            wrap_v: AddressMode::Clamp,
            lod_bias: 0,
            max_lod: 0,
            anisotropic_filtering: false,
        }
    }

    pub fn linear() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_filter: Filter::Linear,
            ..Self::point()
        }
    }
}

// ---------------------------------------------------------------------------
// Viewport and clear
// ---------------------------------------------------------------------------

/// Viewport transform parameters (maps clip space to target pixels).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub near_depth: f32,
    pub far_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 640.0,
            height: 528.0,
            near_depth: 0.0,
            far_depth: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32, near_depth: f32, far_depth: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            near_depth,
            far_depth,
        }
    }
}

/// RGBA clear color in [0, 1].
pub type ClearColor = [f32; 4];

pub const CLEAR_BLACK: ClearColor = [0.0, 0.0, 0.0, 1.0];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn state_blocks_are_hashable_keys() {
        let mut set = HashSet::new();
        set.insert(BlendingState::no_blend());
        set.insert(BlendingState::alpha_blend());
        set.insert(BlendingState::no_blend());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn default_depth_state_tests_and_writes() {
        let d = DepthState::default();
        assert!(d.test_enable && d.update_enable);
        assert_eq!(d.func, CompareFunction::LessEqual);
        assert!(!DepthState::no_depth().update_enable);
    }

    #[test]
    fn dual_source_requires_dst_alpha_and_alpha_factor() {
        let mut b = BlendingState::alpha_blend();
        assert!(!b.uses_dual_source());
        b.dst_alpha = true;
        assert!(b.uses_dual_source());
        b.src_factor = BlendFactor::One;
        assert!(!b.uses_dual_source());
    }
}
