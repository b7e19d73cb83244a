//! Shader source generation.
//!
//! Every generator is a pure function of `(ApiType, ShaderHostConfig, description)`
//! and returns complete source text for that API. Identical inputs always
//! produce byte-identical output, so generated source can be cached and
//! compared. No generator reads global state.
//!
//! HLSL and GLSL share one body syntax: GLSL sources start with a prelude
//! that maps the HLSL-style vector type names and the binding macros onto
//! GLSL. WGSL is emitted separately.

pub mod framebuffer;
pub mod tev;
pub mod vertex;

use crate::config::{ApiType, BackendInfo, EfbScale, StereoMode, VideoConfig};
use bitflags::bitflags;
use std::fmt;

pub use framebuffer::EfbReinterpretType;
pub use tev::{PixelShaderUid, TevStageConfig};
pub use vertex::VertexShaderUid;

bitflags! {
    /// Host-side settings that change generated shader code.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderHostConfig: u32 {
        const MSAA = 1 << 0;
        const SSAA = 1 << 1;
        const STEREO = 1 << 2;
        const WIREFRAME = 1 << 3;
        const PER_PIXEL_LIGHTING = 1 << 4;
        const VERTEX_ROUNDING = 1 << 5;
        const FAST_DEPTH_CALC = 1 << 6;
        const BOUNDING_BOX = 1 << 7;
        const BACKEND_DUAL_SOURCE_BLEND = 1 << 8;
        const BACKEND_GEOMETRY_SHADERS = 1 << 9;
        const BACKEND_EARLY_Z = 1 << 10;
        const BACKEND_BBOX = 1 << 11;
        const BACKEND_GS_INSTANCING = 1 << 12;
        const BACKEND_CLIP_CONTROL = 1 << 13;
        const BACKEND_SSAA = 1 << 14;
        const BACKEND_ATOMICS = 1 << 15;
        const BACKEND_DEPTH_CLAMP = 1 << 16;
        const BACKEND_REVERSED_DEPTH_RANGE = 1 << 17;
        const BACKEND_BITFIELD = 1 << 18;
        const BACKEND_DYNAMIC_SAMPLER_INDEXING = 1 << 19;
        const BACKEND_FRAMEBUFFER_FETCH = 1 << 20;
        const BACKEND_LOGIC_OP = 1 << 21;
        const BACKEND_LARGE_POINTS = 1 << 22;
    }
}

impl ShaderHostConfig {
    /// Derives the host configuration from the active settings and the
    /// backend's capabilities.
    pub fn from_config(config: &VideoConfig, info: &BackendInfo) -> Self {
        let mut bits = ShaderHostConfig::empty();
        let msaa = config.multisamples > 1;
        bits.set(ShaderHostConfig::MSAA, msaa);
        bits.set(
            ShaderHostConfig::SSAA,
            msaa && config.ssaa && info.supports_ssaa,
        );
        bits.set(
            ShaderHostConfig::STEREO,
            config.stereo_mode != StereoMode::Off,
        );
        bits.set(ShaderHostConfig::WIREFRAME, config.wireframe);
        bits.set(
            ShaderHostConfig::PER_PIXEL_LIGHTING,
            config.per_pixel_lighting,
        );
        bits.set(
            ShaderHostConfig::VERTEX_ROUNDING,
            config.vertex_rounding && config.efb_scale != EfbScale::Fixed(1),
        );
        bits.set(ShaderHostConfig::FAST_DEPTH_CALC, config.fast_depth_calc);
        bits.set(
            ShaderHostConfig::BOUNDING_BOX,
            config.bbox_enable && info.supports_bbox,
        );
        bits.set(
            ShaderHostConfig::BACKEND_DUAL_SOURCE_BLEND,
            info.supports_dual_source_blend,
        );
        bits.set(
            ShaderHostConfig::BACKEND_GEOMETRY_SHADERS,
            info.supports_geometry_shaders,
        );
        bits.set(ShaderHostConfig::BACKEND_EARLY_Z, info.supports_early_z);
        bits.set(ShaderHostConfig::BACKEND_BBOX, info.supports_bbox);
        bits.set(
            ShaderHostConfig::BACKEND_GS_INSTANCING,
            info.supports_gs_instancing,
        );
        bits.set(
            ShaderHostConfig::BACKEND_CLIP_CONTROL,
            info.supports_clip_control,
        );
        bits.set(ShaderHostConfig::BACKEND_SSAA, info.supports_ssaa);
        bits.set(
            ShaderHostConfig::BACKEND_ATOMICS,
            info.supports_fragment_stores_and_atomics,
        );
        bits.set(ShaderHostConfig::BACKEND_DEPTH_CLAMP, info.supports_depth_clamp);
        bits.set(
            ShaderHostConfig::BACKEND_REVERSED_DEPTH_RANGE,
            info.supports_reversed_depth_range,
        );
        bits.set(ShaderHostConfig::BACKEND_BITFIELD, info.supports_bitfield);
        bits.set(
            ShaderHostConfig::BACKEND_DYNAMIC_SAMPLER_INDEXING,
            info.supports_dynamic_sampler_indexing,
        );
        bits.set(
            ShaderHostConfig::BACKEND_FRAMEBUFFER_FETCH,
            info.supports_framebuffer_fetch,
        );
        bits.set(ShaderHostConfig::BACKEND_LOGIC_OP, info.supports_logic_op);
        bits.set(
            ShaderHostConfig::BACKEND_LARGE_POINTS,
            info.supports_large_points,
        );
        bits
    }

    /// Vertex outputs are wrapped in an interface block for the geometry stage.
    pub fn uses_interface_blocks(self) -> bool {
        self.contains(ShaderHostConfig::BACKEND_GEOMETRY_SHADERS)
    }
}

// ---------------------------------------------------------------------------
// Source buffer
// ---------------------------------------------------------------------------

/// Growable shader source buffer.
#[derive(Debug, Default, Clone)]
pub struct ShaderCode {
    buf: String,
}

impl ShaderCode {
    pub fn new() -> Self {
        Self {
            buf: String::with_capacity(2048),
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    pub fn push_fmt(&mut self, args: fmt::Arguments<'_>) {
        // Formatting into a String cannot fail.
        let _ = fmt::Write::write_fmt(&mut self.buf, args);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Appends one formatted line to a [`ShaderCode`].
macro_rules! emit {
    ($code:expr) => {
        $code.push_str("\n")
    };
    ($code:expr, $($arg:tt)*) => {{
        $code.push_fmt(format_args!($($arg)*));
        $code.push_str("\n");
    }};
}
pub(crate) use emit;

/// Prelude that lets GLSL consume the shared HLSL-style body syntax.
pub fn glsl_header(api: ApiType, host: ShaderHostConfig) -> String {
    let mut code = ShaderCode::new();
    match api {
        ApiType::Vulkan => {
            emit!(code, "#version 450 core");
            emit!(code, "#define ATTRIBUTE_LOCATION(x) layout(location = x)");
            emit!(code, "#define FRAGMENT_OUTPUT_LOCATION(x) layout(location = x)");
            emit!(code, "#define VARYING_LOCATION(x) layout(location = x)");
            emit!(
                code,
                "#define UBO_BINDING(packing, x) layout(packing, set = 0, binding = (x - 1))"
            );
            emit!(code, "#define SAMPLER_BINDING(x) layout(set = 1, binding = x)");
            emit!(code, "#define gl_VertexID gl_VertexIndex");
            emit!(code, "#define gl_InstanceID gl_InstanceIndex");
        }
        _ => {
            emit!(code, "#version 430");
            emit!(code, "#define ATTRIBUTE_LOCATION(x) layout(location = x)");
            emit!(code, "#define FRAGMENT_OUTPUT_LOCATION(x) layout(location = x)");
            emit!(code, "#define VARYING_LOCATION(x) layout(location = x)");
            emit!(code, "#define UBO_BINDING(packing, x) layout(packing, binding = x)");
            emit!(code, "#define SAMPLER_BINDING(x) layout(binding = x)");
        }
    }
    if host.contains(ShaderHostConfig::SSAA) {
        emit!(code, "#extension GL_ARB_sample_shading : enable");
    }
    for (from, to) in [
        ("float2", "vec2"),
        ("float3", "vec3"),
        ("float4", "vec4"),
        ("int2", "ivec2"),
        ("int3", "ivec3"),
        ("int4", "ivec4"),
        ("uint2", "uvec2"),
        ("uint3", "uvec3"),
        ("uint4", "uvec4"),
        ("float4x4", "mat4"),
        ("frac", "fract"),
        ("lerp", "mix"),
    ] {
        emit!(code, "#define {from} {to}");
    }
    emit!(code);
    code.into_string()
}

/// Prepends the GLSL prelude where the API needs it.
pub(crate) fn finish(api: ApiType, host: ShaderHostConfig, body: ShaderCode) -> String {
    if api.is_glsl() {
        let mut source = glsl_header(api, host);
        source.push_str(body.as_str());
        source
    } else {
        body.into_string()
    }
}

// ---------------------------------------------------------------------------
// GX uniform block
// ---------------------------------------------------------------------------

/// Uniforms shared by the GX vertex and pixel shaders. The layout is valid
/// std140, so the same bytes feed HLSL, GLSL and WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GxUniforms {
    pub projection: [[f32; 4]; 4],
    pub modelview: [[f32; 4]; 4],
    pub texmtx: [[[f32; 4]; 4]; 8],
    /// Initial values of the prev, reg0, reg1 and reg2 TEV registers.
    pub tev_color: [[f32; 4]; 4],
    pub konst: [[f32; 4]; 4],
    /// `x` and `y` hold the two alpha test references in `[0, 1]`.
    pub alpha_ref: [f32; 4],
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

impl Default for GxUniforms {
    fn default() -> Self {
        Self {
            projection: IDENTITY,
            modelview: IDENTITY,
            texmtx: [IDENTITY; 8],
            tev_color: [[0.0; 4]; 4],
            konst: [[1.0; 4]; 4],
            alpha_ref: [0.0; 4],
        }
    }
}

impl GxUniforms {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Declares the [`GxUniforms`] block.
pub(crate) fn gx_uniform_block(code: &mut ShaderCode, api: ApiType) {
    if api == ApiType::Wgsl {
        emit!(code, "struct GxBlock {{");
        emit!(code, "  projection: mat4x4<f32>,");
        emit!(code, "  modelview: mat4x4<f32>,");
        emit!(code, "  texmtx: array<mat4x4<f32>, 8>,");
        emit!(code, "  tev_color: array<vec4<f32>, 4>,");
        emit!(code, "  konst: array<vec4<f32>, 4>,");
        emit!(code, "  alpha_ref: vec4<f32>,");
        emit!(code, "}};");
        emit!(code, "@group(0) @binding(0) var<uniform> gx: GxBlock;");
    } else {
        if api.is_glsl() {
            emit!(code, "UBO_BINDING(std140, 1) uniform GxBlock");
        } else {
            emit!(code, "cbuffer GxBlock : register(b0)");
        }
        emit!(code, "{{");
        emit!(code, "  float4x4 projection;");
        emit!(code, "  float4x4 modelview;");
        emit!(code, "  float4x4 texmtx[8];");
        emit!(code, "  float4 tev_color[4];");
        emit!(code, "  float4 konst[4];");
        emit!(code, "  float4 alpha_ref;");
        emit!(code, "}};");
    }
    emit!(code);
}

/// Reference to a member of [`GxUniforms`] in generated code.
pub(crate) fn gx_uniform(api: ApiType, member: &str) -> String {
    if api == ApiType::Wgsl {
        format!("gx.{member}")
    } else {
        member.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_config_tracks_msaa_and_ssaa() {
        let info = BackendInfo::null();
        let mut config = VideoConfig::default();
        assert!(!ShaderHostConfig::from_config(&config, &info).contains(ShaderHostConfig::MSAA));

        config.multisamples = 4;
        config.ssaa = true;
        let host = ShaderHostConfig::from_config(&config, &info);
        assert!(host.contains(ShaderHostConfig::MSAA | ShaderHostConfig::SSAA));

        let mut no_ssaa = info.clone();
        no_ssaa.supports_ssaa = false;
        let host = ShaderHostConfig::from_config(&config, &no_ssaa);
        assert!(!host.contains(ShaderHostConfig::SSAA));
    }

    #[test]
    fn bounding_box_needs_backend_support() {
        let mut info = BackendInfo::null();
        let config = VideoConfig {
            bbox_enable: true,
            ..Default::default()
        };
        assert!(ShaderHostConfig::from_config(&config, &info)
            .contains(ShaderHostConfig::BOUNDING_BOX));
        info.supports_bbox = false;
        assert!(!ShaderHostConfig::from_config(&config, &info)
            .contains(ShaderHostConfig::BOUNDING_BOX));
    }

    #[test]
    fn gx_uniforms_match_std140_size() {
        assert_eq!(std::mem::size_of::<GxUniforms>(), 784);
        assert_eq!(GxUniforms::default().as_bytes().len(), 784);
    }

    #[test]
    fn vulkan_header_remaps_vertex_id() {
        let header = glsl_header(ApiType::Vulkan, ShaderHostConfig::empty());
        assert!(header.starts_with("#version 450 core\n"));
        assert!(header.contains("#define gl_VertexID gl_VertexIndex"));
        let gl = glsl_header(ApiType::OpenGL, ShaderHostConfig::empty());
        assert!(!gl.contains("gl_VertexIndex"));
    }
}
