// Conversions from backend-neutral state to wgpu descriptors.

use crate::error::{Result, VideoError};
use crate::native_vertex_format::{AttributeFormat, ComponentFormat, PortableVertexDeclaration};
use crate::render_state::{
    AddressMode, BlendFactor, BlendingState, CompareFunction, CullMode, DepthState, Filter,
    PrimitiveType, RasterizationState, SamplerState,
};
use crate::texture::{AbstractTextureFormat, TextureConfig};

pub(crate) fn texture_format(
    format: AbstractTextureFormat,
    features: wgpu::Features,
) -> Result<wgpu::TextureFormat> {
    let needs = |feature: wgpu::Features, fmt: wgpu::TextureFormat| {
        if features.contains(feature) {
            Ok(fmt)
        } else {
            Err(VideoError::UnsupportedFormat(format.to_string()))
        }
    };
    match format {
        AbstractTextureFormat::RGBA8 => Ok(wgpu::TextureFormat::Rgba8Unorm),
        AbstractTextureFormat::BGRA8 => Ok(wgpu::TextureFormat::Bgra8Unorm),
        AbstractTextureFormat::DXT1 => needs(
            wgpu::Features::TEXTURE_COMPRESSION_BC,
            wgpu::TextureFormat::Bc1RgbaUnorm,
        ),
        AbstractTextureFormat::DXT3 => needs(
            wgpu::Features::TEXTURE_COMPRESSION_BC,
            wgpu::TextureFormat::Bc2RgbaUnorm,
        ),
        AbstractTextureFormat::DXT5 => needs(
            wgpu::Features::TEXTURE_COMPRESSION_BC,
            wgpu::TextureFormat::Bc3RgbaUnorm,
        ),
        AbstractTextureFormat::BPTC => needs(
            wgpu::Features::TEXTURE_COMPRESSION_BC,
            wgpu::TextureFormat::Bc7RgbaUnorm,
        ),
        AbstractTextureFormat::R16 => needs(
            wgpu::Features::TEXTURE_FORMAT_16BIT_NORM,
            wgpu::TextureFormat::R16Unorm,
        ),
        AbstractTextureFormat::D16 => Ok(wgpu::TextureFormat::Depth16Unorm),
        AbstractTextureFormat::D24_S8 => Ok(wgpu::TextureFormat::Depth24PlusStencil8),
        AbstractTextureFormat::R32F => Ok(wgpu::TextureFormat::R32Float),
        AbstractTextureFormat::D32F => Ok(wgpu::TextureFormat::Depth32Float),
        AbstractTextureFormat::D32F_S8 => needs(
            wgpu::Features::DEPTH32FLOAT_STENCIL8,
            wgpu::TextureFormat::Depth32FloatStencil8,
        ),
        AbstractTextureFormat::Undefined => {
            Err(VideoError::UnsupportedFormat(format.to_string()))
        }
    }
}

/// True if textures of `format` can sit in a filterable float binding.
pub(crate) fn is_filterable(format: AbstractTextureFormat, features: wgpu::Features) -> bool {
    match format {
        AbstractTextureFormat::R32F => features.contains(wgpu::Features::FLOAT32_FILTERABLE),
        f => !f.is_depth() && f != AbstractTextureFormat::Undefined,
    }
}

/// Aspect used when copying `format` to or from a buffer.
pub(crate) fn copy_aspect(format: AbstractTextureFormat) -> wgpu::TextureAspect {
    if format.is_depth() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

pub(crate) fn texture_usage(config: &TextureConfig) -> wgpu::TextureUsages {
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING;
    if config.is_multisampled() {
        return usage | wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    usage |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
    if config.is_render_target() {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if config.is_compute_image() {
        usage |= wgpu::TextureUsages::STORAGE_BINDING;
    }
    usage
}

pub(crate) fn compare_function(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

pub(crate) fn depth_stencil_state(
    format: wgpu::TextureFormat,
    state: &DepthState,
) -> wgpu::DepthStencilState {
    let (depth_compare, depth_write_enabled) = if state.test_enable {
        (compare_function(state.func), state.update_enable)
    } else {
        (wgpu::CompareFunction::Always, false)
    };
    wgpu::DepthStencilState {
        format,
        depth_write_enabled,
        depth_compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcClr => wgpu::BlendFactor::Src,
        BlendFactor::InvSrcClr => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::InvDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::DstClr => wgpu::BlendFactor::Dst,
        BlendFactor::InvDstClr => wgpu::BlendFactor::OneMinusDst,
    }
}

/// Subtractive blending computes `dst - src`.
fn blend_operation(subtract: bool) -> wgpu::BlendOperation {
    if subtract {
        wgpu::BlendOperation::ReverseSubtract
    } else {
        wgpu::BlendOperation::Add
    }
}

pub(crate) fn color_target_state(
    format: wgpu::TextureFormat,
    state: &BlendingState,
) -> wgpu::ColorTargetState {
    let mut write_mask = wgpu::ColorWrites::empty();
    if state.color_update {
        write_mask |= wgpu::ColorWrites::COLOR;
    }
    if state.alpha_update {
        write_mask |= wgpu::ColorWrites::ALPHA;
    }

    if state.logic_op_enable {
        log::trace!("Logic op {:?} approximated as a plain write", state.logic_mode);
    }
    let blend = state.blend_enable.then(|| wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_factor),
            dst_factor: blend_factor(state.dst_factor),
            operation: blend_operation(state.subtract),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_factor_alpha),
            dst_factor: blend_factor(state.dst_factor_alpha),
            operation: blend_operation(state.subtract_alpha),
        },
    });

    wgpu::ColorTargetState {
        format,
        blend,
        write_mask,
    }
}

pub(crate) fn primitive_state(state: &RasterizationState) -> wgpu::PrimitiveState {
    let (topology, strip_index_format) = match state.primitive {
        PrimitiveType::Points => (wgpu::PrimitiveTopology::PointList, None),
        PrimitiveType::Lines => (wgpu::PrimitiveTopology::LineList, None),
        PrimitiveType::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
        PrimitiveType::TriangleStrip => (
            wgpu::PrimitiveTopology::TriangleStrip,
            Some(wgpu::IndexFormat::Uint16),
        ),
    };
    // Culling everything is handled by skipping the draw.
    let cull_mode = match state.cull_mode {
        CullMode::None | CullMode::All => None,
        CullMode::Back => Some(wgpu::Face::Back),
        CullMode::Front => Some(wgpu::Face::Front),
    };
    wgpu::PrimitiveState {
        topology,
        strip_index_format,
        // GX winds front faces clockwise.
        front_face: wgpu::FrontFace::Cw,
        cull_mode,
        unclipped_depth: false,
        polygon_mode: wgpu::PolygonMode::Fill,
        conservative: false,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Point => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Sampler descriptor for `state`. wgpu has no LOD bias, so it is dropped.
pub(crate) fn sampler_descriptor(state: &SamplerState) -> wgpu::SamplerDescriptor<'static> {
    let all_linear = state.min_filter == Filter::Linear
        && state.mag_filter == Filter::Linear
        && state.mipmap_filter == Filter::Linear;
    wgpu::SamplerDescriptor {
        label: Some("gx sampler"),
        address_mode_u: address_mode(state.wrap_u),
        address_mode_v: address_mode(state.wrap_v),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode(state.mag_filter),
        min_filter: filter_mode(state.min_filter),
        mipmap_filter: filter_mode(state.mipmap_filter),
        lod_min_clamp: 0.0,
        lod_max_clamp: state.max_lod as f32 / 16.0,
        compare: None,
        anisotropy_clamp: if state.anisotropic_filtering && all_linear {
            16
        } else {
            1
        },
        border_color: None,
    }
}

/// Vertex format for one attribute. Eight and sixteen bit types only come
/// in pairs and quads, so odd component counts round up.
pub(crate) fn vertex_format(attr: &AttributeFormat) -> wgpu::VertexFormat {
    use wgpu::VertexFormat as V;
    let wide = attr.components > 2;
    match (attr.format, attr.integer) {
        (ComponentFormat::Float, _) => match attr.components {
            0 | 1 => V::Float32,
            2 => V::Float32x2,
            3 => V::Float32x3,
            _ => V::Float32x4,
        },
        (ComponentFormat::UByte, true) => if wide { V::Uint8x4 } else { V::Uint8x2 },
        (ComponentFormat::UByte, false) => if wide { V::Unorm8x4 } else { V::Unorm8x2 },
        (ComponentFormat::Byte, true) => if wide { V::Sint8x4 } else { V::Sint8x2 },
        (ComponentFormat::Byte, false) => if wide { V::Snorm8x4 } else { V::Snorm8x2 },
        (ComponentFormat::UShort, true) => if wide { V::Uint16x4 } else { V::Uint16x2 },
        (ComponentFormat::UShort, false) => if wide { V::Unorm16x4 } else { V::Unorm16x2 },
        (ComponentFormat::Short, true) => if wide { V::Sint16x4 } else { V::Sint16x2 },
        (ComponentFormat::Short, false) => if wide { V::Snorm16x4 } else { V::Snorm16x2 },
    }
}

/// Attribute list of a vertex declaration. Attributes whose rounded-up
/// format would read past the vertex stride are dropped.
pub(crate) fn vertex_attributes(decl: &PortableVertexDeclaration) -> Vec<wgpu::VertexAttribute> {
    decl.enabled_attributes()
        .filter_map(|(location, attr)| {
            let format = vertex_format(&attr);
            if attr.offset as u64 + format.size() > decl.stride as u64 {
                log::warn!(
                    "Vertex attribute at location {location} ({format:?} at offset {}) exceeds stride {}",
                    attr.offset,
                    decl.stride
                );
                return None;
            }
            Some(wgpu::VertexAttribute {
                format,
                offset: attr.offset as u64,
                shader_location: location,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_round_up_to_quads() {
        let attr = AttributeFormat::new(ComponentFormat::UByte, 3, 12, false);
        assert_eq!(vertex_format(&attr), wgpu::VertexFormat::Unorm8x4);
        let attr = AttributeFormat::new(ComponentFormat::Short, 1, 0, true);
        assert_eq!(vertex_format(&attr), wgpu::VertexFormat::Sint16x2);
        let attr = AttributeFormat::new(ComponentFormat::Float, 3, 0, false);
        assert_eq!(vertex_format(&attr), wgpu::VertexFormat::Float32x3);
    }

    #[test]
    fn compressed_formats_need_bc_feature() {
        assert!(texture_format(AbstractTextureFormat::DXT1, wgpu::Features::empty()).is_err());
        assert_eq!(
            texture_format(
                AbstractTextureFormat::DXT1,
                wgpu::Features::TEXTURE_COMPRESSION_BC
            )
            .unwrap(),
            wgpu::TextureFormat::Bc1RgbaUnorm
        );
        assert!(texture_format(AbstractTextureFormat::Undefined, wgpu::Features::all()).is_err());
    }

    #[test]
    fn disabled_depth_test_always_passes_without_writes() {
        let state = DepthState {
            test_enable: false,
            update_enable: true,
            func: CompareFunction::Less,
        };
        let ds = depth_stencil_state(wgpu::TextureFormat::Depth32Float, &state);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::Always);
        assert!(!ds.depth_write_enabled);
    }

    #[test]
    fn subtract_reverses_operands() {
        let state = BlendingState {
            blend_enable: true,
            subtract: true,
            ..BlendingState::alpha_blend()
        };
        let target = color_target_state(wgpu::TextureFormat::Rgba8Unorm, &state);
        let blend = target.blend.unwrap();
        assert_eq!(blend.color.operation, wgpu::BlendOperation::ReverseSubtract);
        assert_eq!(blend.alpha.operation, wgpu::BlendOperation::Add);
    }

    #[test]
    fn anisotropy_requires_linear_filtering() {
        let mut state = SamplerState::point();
        state.anisotropic_filtering = true;
        assert_eq!(sampler_descriptor(&state).anisotropy_clamp, 1);
        let mut state = SamplerState::linear();
        state.anisotropic_filtering = true;
        assert_eq!(sampler_descriptor(&state).anisotropy_clamp, 16);
    }

    #[test]
    fn depth_formats_are_not_filterable() {
        assert!(!is_filterable(AbstractTextureFormat::D32F, wgpu::Features::all()));
        assert!(!is_filterable(AbstractTextureFormat::R32F, wgpu::Features::empty()));
        assert!(is_filterable(AbstractTextureFormat::RGBA8, wgpu::Features::empty()));
    }
}
