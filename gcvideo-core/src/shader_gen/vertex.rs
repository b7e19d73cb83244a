//! GX vertex shader generation.
//!
//! Transforms positions through the modelview and projection matrices,
//! forwards both vertex colors and runs one texture matrix per texgen.
//! Outputs are `num_texgens` texture coordinates followed by two colors,
//! matching what [`super::tev`] expects.

use super::framebuffer::{is_hlsl, varyings, wgsl};
use super::{emit, finish, gx_uniform, gx_uniform_block, ShaderCode, ShaderHostConfig};
use super::tev::MAX_TEXGENS;
use crate::config::ApiType;
use crate::native_vertex_format::{location, PortableVertexDeclaration};
use bitflags::bitflags;

bitflags! {
    /// Attributes present in the vertex stream.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VertexComponents: u32 {
        const POSITION = 1 << 0;
        const POSMTX = 1 << 1;
        const NORMAL = 1 << 2;
        const COLOR0 = 1 << 3;
        const COLOR1 = 1 << 4;
        const TEXCOORD0 = 1 << 8;
        const TEXCOORD1 = 1 << 9;
        const TEXCOORD2 = 1 << 10;
        const TEXCOORD3 = 1 << 11;
        const TEXCOORD4 = 1 << 12;
        const TEXCOORD5 = 1 << 13;
        const TEXCOORD6 = 1 << 14;
        const TEXCOORD7 = 1 << 15;
    }
}

impl VertexComponents {
    pub fn texcoord(index: u8) -> Self {
        Self::from_bits_truncate(Self::TEXCOORD0.bits() << index.min(7))
    }

    pub fn color(index: u8) -> Self {
        if index == 0 {
            Self::COLOR0
        } else {
            Self::COLOR1
        }
    }

    pub fn from_decl(decl: &PortableVertexDeclaration) -> Self {
        let mut components = Self::empty();
        components.set(Self::POSITION, decl.position.enable);
        components.set(Self::POSMTX, decl.posmtx.enable);
        components.set(Self::NORMAL, decl.normals[0].enable);
        components.set(Self::COLOR0, decl.colors[0].enable);
        components.set(Self::COLOR1, decl.colors[1].enable);
        for (i, tc) in decl.texcoords.iter().enumerate() {
            components.set(Self::texcoord(i as u8), tc.enable);
        }
        components
    }
}

/// Everything that selects a distinct GX vertex shader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexShaderUid {
    pub num_texgens: u8,
    pub components: VertexComponents,
}

impl VertexShaderUid {
    pub fn new(decl: &PortableVertexDeclaration, num_texgens: u8) -> Self {
        Self {
            num_texgens: num_texgens.min(MAX_TEXGENS),
            components: VertexComponents::from_decl(decl),
        }
    }

    fn has(&self, component: VertexComponents) -> bool {
        self.components.contains(component)
    }
}

/// Generates the complete GX vertex shader for `uid`.
pub fn generate_vertex_shader(
    api: ApiType,
    host: ShaderHostConfig,
    uid: &VertexShaderUid,
) -> String {
    if api == ApiType::Wgsl {
        return generate_wgsl(uid);
    }

    let mut code = ShaderCode::new();
    gx_uniform_block(&mut code, api);
    let num_texgens = uid.num_texgens as u32;

    if is_hlsl(api) {
        code.push_str("void main(");
        if uid.has(VertexComponents::POSITION) {
            code.push_str("in float4 rawpos : POSITION, ");
        }
        for i in 0..2u8 {
            if uid.has(VertexComponents::color(i)) {
                code.push_fmt(format_args!("in float4 rawcolor{i} : COLOR{i}, "));
            }
        }
        for i in 0..uid.num_texgens {
            if uid.has(VertexComponents::texcoord(i)) {
                code.push_fmt(format_args!("in float3 rawtex{i} : TEXCOORD{i}, "));
            }
        }
        for i in 0..num_texgens {
            code.push_fmt(format_args!("out float3 v_tex{i} : TEXCOORD{i}, "));
        }
        for i in 0..2 {
            code.push_fmt(format_args!("out float4 v_col{i} : COLOR{i}, "));
        }
        emit!(code, "out float4 opos : SV_Position)");
    } else {
        if uid.has(VertexComponents::POSITION) {
            emit!(code, "ATTRIBUTE_LOCATION({}) in float4 rawpos;", location::POSITION);
        }
        for i in 0..2u8 {
            if uid.has(VertexComponents::color(i)) {
                emit!(
                    code,
                    "ATTRIBUTE_LOCATION({}) in float4 rawcolor{i};",
                    location::COLOR0 + i as u32
                );
            }
        }
        for i in 0..uid.num_texgens {
            if uid.has(VertexComponents::texcoord(i)) {
                emit!(
                    code,
                    "ATTRIBUTE_LOCATION({}) in float3 rawtex{i};",
                    location::TEXCOORD0 + i as u32
                );
            }
        }
        varyings(&mut code, host, "out", num_texgens, 2, "");
        emit!(code, "#define opos gl_Position");
        emit!(code);
        emit!(code, "void main()");
    }

    let mul = |m: &str, v: &str| {
        if is_hlsl(api) {
            format!("mul({m}, {v})")
        } else {
            format!("{m} * {v}")
        }
    };

    emit!(code, "{{");
    if uid.has(VertexComponents::POSITION) {
        emit!(code, "  float4 pos = float4(rawpos.xyz, 1.0);");
    } else {
        emit!(code, "  float4 pos = float4(0.0, 0.0, 0.0, 1.0);");
    }
    emit!(code, "  float4 world = {};", mul("modelview", "pos"));
    emit!(code, "  opos = {};", mul("projection", "world"));
    emit!(code, "  v_col0 = {};", color_source(uid, 0, "float4(1.0, 1.0, 1.0, 1.0)"));
    emit!(code, "  v_col1 = {};", color_source(uid, 1, "float4(0.0, 0.0, 0.0, 0.0)"));
    for i in 0..uid.num_texgens {
        let src = if uid.has(VertexComponents::texcoord(i)) {
            format!("float4(rawtex{i}.xy, 1.0, 1.0)")
        } else {
            "float4(pos.xy, 1.0, 1.0)".to_string()
        };
        emit!(
            code,
            "  v_tex{i} = float3({}.xy, 0.0);",
            mul(&format!("texmtx[{i}]"), &src)
        );
    }
    if api == ApiType::OpenGL && !host.contains(ShaderHostConfig::BACKEND_CLIP_CONTROL) {
        // GL clip space depth is [-w, w].
        emit!(code, "  opos.z = opos.z * 2.0 - opos.w;");
    }
    if api == ApiType::Vulkan {
        emit!(code, "  opos.y = -opos.y;");
    }
    emit!(code, "}}");
    finish(api, host, code)
}

fn color_source(uid: &VertexShaderUid, index: u8, fallback: &str) -> String {
    if uid.has(VertexComponents::color(index)) {
        format!("rawcolor{index}")
    } else {
        fallback.to_string()
    }
}

fn generate_wgsl(uid: &VertexShaderUid) -> String {
    let mut code = ShaderCode::new();
    gx_uniform_block(&mut code, ApiType::Wgsl);
    wgsl::vertex_output(&mut code, uid.num_texgens as u32, 2);

    let mut inputs = Vec::new();
    if uid.has(VertexComponents::POSITION) {
        inputs.push(format!("@location({}) rawpos: vec4<f32>", location::POSITION));
    }
    for i in 0..2u8 {
        if uid.has(VertexComponents::color(i)) {
            inputs.push(format!(
                "@location({}) rawcolor{i}: vec4<f32>",
                location::COLOR0 + i as u32
            ));
        }
    }
    for i in 0..uid.num_texgens {
        if uid.has(VertexComponents::texcoord(i)) {
            inputs.push(format!(
                "@location({}) rawtex{i}: vec3<f32>",
                location::TEXCOORD0 + i as u32
            ));
        }
    }

    let modelview = gx_uniform(ApiType::Wgsl, "modelview");
    let projection = gx_uniform(ApiType::Wgsl, "projection");
    let texmtx = gx_uniform(ApiType::Wgsl, "texmtx");

    emit!(code, "@vertex");
    emit!(code, "fn main({}) -> VertexOutput {{", inputs.join(", "));
    emit!(code, "  var out: VertexOutput;");
    if uid.has(VertexComponents::POSITION) {
        emit!(code, "  let pos = vec4<f32>(rawpos.xyz, 1.0);");
    } else {
        emit!(code, "  let pos = vec4<f32>(0.0, 0.0, 0.0, 1.0);");
    }
    emit!(code, "  out.pos = {projection} * ({modelview} * pos);");
    if uid.has(VertexComponents::COLOR0) {
        emit!(code, "  out.col0 = rawcolor0;");
    } else {
        emit!(code, "  out.col0 = vec4<f32>(1.0);");
    }
    if uid.has(VertexComponents::COLOR1) {
        emit!(code, "  out.col1 = rawcolor1;");
    } else {
        emit!(code, "  out.col1 = vec4<f32>(0.0);");
    }
    for i in 0..uid.num_texgens {
        let src = if uid.has(VertexComponents::texcoord(i)) {
            format!("vec4<f32>(rawtex{i}.xy, 1.0, 1.0)")
        } else {
            "vec4<f32>(pos.xy, 1.0, 1.0)".to_string()
        };
        emit!(code, "  out.tex{i} = vec3<f32>(({texmtx}[{i}] * {src}).xy, 0.0);");
    }
    emit!(code, "  return out;");
    emit!(code, "}}");
    code.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(num_texcoords: usize, num_texgens: u8) -> VertexShaderUid {
        VertexShaderUid::new(&PortableVertexDeclaration::simple(num_texcoords), num_texgens)
    }

    #[test]
    fn components_follow_declaration() {
        let components = uid(2, 2).components;
        assert!(components.contains(
            VertexComponents::POSITION
                | VertexComponents::COLOR0
                | VertexComponents::TEXCOORD0
                | VertexComponents::TEXCOORD1
        ));
        assert!(!components.contains(VertexComponents::COLOR1));
        assert!(!components.contains(VertexComponents::TEXCOORD2));
    }

    #[test]
    fn hlsl_uses_mul_and_semantics() {
        let src = generate_vertex_shader(ApiType::D3D, ShaderHostConfig::empty(), &uid(1, 1));
        assert!(src.contains("in float4 rawpos : POSITION, "));
        assert!(src.contains("in float3 rawtex0 : TEXCOORD0, "));
        assert!(src.contains("opos = mul(projection, world);"));
        assert!(src.contains("v_col1 = float4(0.0, 0.0, 0.0, 0.0);"));
    }

    #[test]
    fn glsl_inputs_use_attribute_locations() {
        let src = generate_vertex_shader(ApiType::Vulkan, ShaderHostConfig::empty(), &uid(1, 1));
        assert!(src.contains("ATTRIBUTE_LOCATION(0) in float4 rawpos;"));
        assert!(src.contains("ATTRIBUTE_LOCATION(5) in float4 rawcolor0;"));
        assert!(src.contains("ATTRIBUTE_LOCATION(8) in float3 rawtex0;"));
        assert!(src.contains("VARYING_LOCATION(1) out float4 v_col0;"));
        assert!(src.contains("opos.y = -opos.y;"));
    }

    #[test]
    fn opengl_remaps_depth_without_clip_control() {
        let plain = generate_vertex_shader(ApiType::OpenGL, ShaderHostConfig::empty(), &uid(0, 0));
        assert!(plain.contains("opos.z = opos.z * 2.0 - opos.w;"));
        let clip = generate_vertex_shader(
            ApiType::OpenGL,
            ShaderHostConfig::BACKEND_CLIP_CONTROL,
            &uid(0, 0),
        );
        assert!(!clip.contains("opos.z = opos.z * 2.0"));
    }

    #[test]
    fn missing_texcoord_falls_back_to_position() {
        let src = generate_vertex_shader(ApiType::Wgsl, ShaderHostConfig::empty(), &uid(0, 1));
        assert!(src.contains("out.tex0 = vec3<f32>((gx.texmtx[0] * vec4<f32>(pos.xy, 1.0, 1.0)).xy, 0.0);"));
        assert!(src.contains("@location(1) col0: vec4<f32>"));
    }

    #[test]
    fn wgsl_declares_only_present_inputs() {
        let src = generate_vertex_shader(ApiType::Wgsl, ShaderHostConfig::empty(), &uid(1, 1));
        assert!(src.contains(
            "fn main(@location(0) rawpos: vec4<f32>, @location(5) rawcolor0: vec4<f32>, @location(8) rawtex0: vec3<f32>) -> VertexOutput {"
        ));
    }
}
