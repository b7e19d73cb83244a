//! Utility shaders used by the renderer itself: full-screen quads, texture
//! copies, clears, EFB pokes, depth resolves, EFB format reinterpretation
//! and the on-screen overlay.
//!
//! HLSL and GLSL share their bodies (see [`super::glsl_header`]); WGSL has its
//! own emitters at the bottom of the file. `ApiType::Nothing` gets HLSL.

use super::{emit, finish, ShaderCode, ShaderHostConfig};
use crate::config::ApiType;
use crate::native_vertex_format::location;

/// EFB pixel format conversion performed when a game switches formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EfbReinterpretType {
    Rgb8ToRgb565,
    Rgb8ToRgba6,
    Rgba6ToRgb8,
    Rgba6ToRgb565,
    Rgb565ToRgb8,
    Rgb565ToRgba6,
}

impl EfbReinterpretType {
    pub const ALL: [EfbReinterpretType; 6] = [
        EfbReinterpretType::Rgb8ToRgb565,
        EfbReinterpretType::Rgb8ToRgba6,
        EfbReinterpretType::Rgba6ToRgb8,
        EfbReinterpretType::Rgba6ToRgb565,
        EfbReinterpretType::Rgb565ToRgb8,
        EfbReinterpretType::Rgb565ToRgba6,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EfbReinterpretType::Rgb8ToRgb565 => "rgb8_to_rgb565",
            EfbReinterpretType::Rgb8ToRgba6 => "rgb8_to_rgba6",
            EfbReinterpretType::Rgba6ToRgb8 => "rgba6_to_rgb8",
            EfbReinterpretType::Rgba6ToRgb565 => "rgba6_to_rgb565",
            EfbReinterpretType::Rgb565ToRgb8 => "rgb565_to_rgb8",
            EfbReinterpretType::Rgb565ToRgba6 => "rgb565_to_rgba6",
        }
    }
}

pub(super) fn is_hlsl(api: ApiType) -> bool {
    !api.is_glsl() && api != ApiType::Wgsl
}

// ---------------------------------------------------------------------------
// HLSL / GLSL building blocks
// ---------------------------------------------------------------------------

pub(super) fn sampler_declarations(
    code: &mut ShaderCode,
    api: ApiType,
    start: u32,
    end: u32,
    ms: bool,
) {
    for i in start..end {
        if is_hlsl(api) {
            let ty = if ms {
                "Texture2DMSArray<float4>"
            } else {
                "Texture2DArray<float4>"
            };
            emit!(code, "{ty} tex{i} : register(t{i});");
            emit!(code, "SamplerState samp{i} : register(s{i});");
        } else {
            let ty = if ms { "sampler2DMSArray" } else { "sampler2DArray" };
            emit!(code, "SAMPLER_BINDING({i}) uniform {ty} samp{i};");
        }
    }
}

fn sample_texture(api: ApiType, n: u32, coords: &str) -> String {
    if is_hlsl(api) {
        format!("tex{n}.Sample(samp{n}, {coords})")
    } else {
        format!("texture(samp{n}, {coords})")
    }
}

fn uniform_block_header(code: &mut ShaderCode, api: ApiType) {
    if is_hlsl(api) {
        emit!(code, "cbuffer PSBlock : register(b0)");
    } else {
        emit!(code, "UBO_BINDING(std140, 1) uniform PSBlock");
    }
}

fn vertex_id_input(api: ApiType) -> &'static str {
    if is_hlsl(api) {
        "in uint id : SV_VertexID, "
    } else {
        "#define id gl_VertexID\n"
    }
}

/// Interface a vertex stage exposes.
#[derive(Clone, Copy)]
struct VertexIo<'a> {
    tex_inputs: u32,
    color_inputs: u32,
    position_input: bool,
    tex_outputs: u32,
    color_outputs: u32,
    extra: &'a str,
}

fn vertex_main(code: &mut ShaderCode, api: ApiType, host: ShaderHostConfig, io: VertexIo<'_>) {
    if is_hlsl(api) {
        code.push_str("void main(");
        for i in 0..io.tex_inputs {
            code.push_fmt(format_args!("in float3 rawtex{i} : TEXCOORD{i}, "));
        }
        for i in 0..io.color_inputs {
            code.push_fmt(format_args!("in float4 rawcolor{i} : COLOR{i}, "));
        }
        if io.position_input {
            code.push_str("in float4 rawpos : POSITION, ");
        }
        code.push_str(io.extra);
        for i in 0..io.tex_outputs {
            code.push_fmt(format_args!("out float3 v_tex{i} : TEXCOORD{i}, "));
        }
        for i in 0..io.color_outputs {
            code.push_fmt(format_args!("out float4 v_col{i} : COLOR{i}, "));
        }
        emit!(code, "out float4 opos : SV_Position)");
        return;
    }

    for i in 0..io.tex_inputs {
        emit!(
            code,
            "ATTRIBUTE_LOCATION({}) in float3 rawtex{i};",
            location::TEXCOORD0 + i
        );
    }
    for i in 0..io.color_inputs {
        emit!(
            code,
            "ATTRIBUTE_LOCATION({}) in float4 rawcolor{i};",
            location::COLOR0 + i
        );
    }
    if io.position_input {
        emit!(code, "ATTRIBUTE_LOCATION({}) in float4 rawpos;", location::POSITION);
    }
    varyings(code, host, "out", io.tex_outputs, io.color_outputs, "");
    emit!(code, "#define opos gl_Position");
    emit!(code, "{}", io.extra);
    emit!(code, "void main()");
}

pub(super) fn varyings(
    code: &mut ShaderCode,
    host: ShaderHostConfig,
    dir: &str,
    num_tex: u32,
    num_colors: u32,
    block_suffix: &str,
) {
    if host.uses_interface_blocks() {
        if num_tex == 0 && num_colors == 0 {
            return;
        }
        emit!(code, "VARYING_LOCATION(0) {dir} VertexData {{");
        for i in 0..num_tex {
            emit!(code, "  float3 v_tex{i};");
        }
        for i in 0..num_colors {
            emit!(code, "  float4 v_col{i};");
        }
        emit!(code, "}}{block_suffix};");
    } else {
        for i in 0..num_tex {
            emit!(code, "VARYING_LOCATION({i}) {dir} float3 v_tex{i};");
        }
        for i in 0..num_colors {
            emit!(code, "VARYING_LOCATION({}) {dir} float4 v_col{i};", num_tex + i);
        }
    }
}

pub(super) fn pixel_main(
    code: &mut ShaderCode,
    api: ApiType,
    host: ShaderHostConfig,
    tex_inputs: u32,
    color_inputs: u32,
    output_type: &str,
    extra: &str,
) {
    if is_hlsl(api) {
        code.push_str("void main(");
        for i in 0..tex_inputs {
            code.push_fmt(format_args!("in float3 v_tex{i} : TEXCOORD{i}, "));
        }
        for i in 0..color_inputs {
            code.push_fmt(format_args!("in float4 v_col{i} : COLOR{i}, "));
        }
        emit!(code, "{extra}out {output_type} ocol0 : SV_Target)");
        return;
    }

    varyings(code, host, "in", tex_inputs, color_inputs, "");
    emit!(code, "FRAGMENT_OUTPUT_LOCATION(0) out {output_type} ocol0;");
    emit!(code, "{extra}");
    emit!(code, "void main()");
}

fn frag_coord_input(api: ApiType) -> &'static str {
    if is_hlsl(api) {
        "in float4 ipos : SV_Position, "
    } else {
        ""
    }
}

fn int_coords(code: &mut ShaderCode, api: ApiType) {
    emit!(code, "  int layer = int(v_tex0.z);");
    if is_hlsl(api) {
        emit!(code, "  int3 coords = int3(int2(ipos.xy), layer);");
    } else {
        emit!(code, "  int3 coords = int3(int2(gl_FragCoord.xy), layer);");
    }
}

fn load_sample(api: ApiType, sample: &str) -> String {
    if is_hlsl(api) {
        format!("tex0.Load(coords, {sample})")
    } else {
        format!("texelFetch(samp0, coords, {sample})")
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Full-screen triangle covering the target. Outputs `v_tex0` in `[0, 2]`.
pub fn screen_quad_vertex_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::screen_quad_vertex(false);
    }
    let mut code = ShaderCode::new();
    vertex_main(
        &mut code,
        api,
        host,
        VertexIo {
            tex_inputs: 0,
            color_inputs: 0,
            position_input: false,
            tex_outputs: 1,
            color_outputs: 0,
            extra: vertex_id_input(api),
        },
    );
    emit!(code, "{{");
    emit!(code, "  v_tex0 = float3(float((id << 1) & 2), float(id & 2), 0.0f);");
    emit!(
        code,
        "  opos = float4(v_tex0.xy * float2(2.0f, -2.0f) + float2(-1.0f, 1.0f), 0.0f, 1.0f);"
    );
    // Vulkan NDC is flipped; GL is flipped too so (0,0) is the lower-left.
    if api.is_glsl() {
        emit!(code, "  opos.y = -opos.y;");
    }
    emit!(code, "}}");
    finish(api, host, code)
}

/// Duplicates each triangle into both stereo layers. `None` where the API
/// has no geometry stage.
pub fn passthrough_geometry_shader(
    api: ApiType,
    host: ShaderHostConfig,
    num_tex: u32,
    num_colors: u32,
) -> Option<String> {
    if api == ApiType::Wgsl {
        return None;
    }
    let mut code = ShaderCode::new();
    if is_hlsl(api) {
        for name in ["VS_OUTPUT", "GS_OUTPUT"] {
            emit!(code, "struct {name}");
            emit!(code, "{{");
            for i in 0..num_tex {
                emit!(code, "  float3 tex{i} : TEXCOORD{i};");
            }
            for i in 0..num_colors {
                emit!(code, "  float4 color{i} : COLOR{i};");
            }
            emit!(code, "  float4 position : SV_Position;");
            if name == "GS_OUTPUT" {
                emit!(code, "  uint slice : SV_RenderTargetArrayIndex;");
            }
            emit!(code, "}};");
        }
        emit!(code);
        emit!(code, "[maxvertexcount(6)]");
        emit!(
            code,
            "void main(triangle VS_OUTPUT vso[3], inout TriangleStream<GS_OUTPUT> output)"
        );
        emit!(code, "{{");
        emit!(code, "  for (uint slice = 0; slice < 2u; slice++)");
        emit!(code, "  {{");
        emit!(code, "    for (int i = 0; i < 3; i++)");
        emit!(code, "    {{");
        emit!(code, "      GS_OUTPUT gso;");
        emit!(code, "      gso.position = vso[i].position;");
        for i in 0..num_tex {
            emit!(code, "      gso.tex{i} = float3(vso[i].tex{i}.xy, float(slice));");
        }
        for i in 0..num_colors {
            emit!(code, "      gso.color{i} = vso[i].color{i};");
        }
        emit!(code, "      gso.slice = slice;");
        emit!(code, "      output.Append(gso);");
        emit!(code, "    }}");
        emit!(code, "    output.RestartStrip();");
        emit!(code, "  }}");
        emit!(code, "}}");
    } else {
        emit!(code, "layout(triangles) in;");
        emit!(code, "layout(triangle_strip, max_vertices = 6) out;");
        let blocks = host | ShaderHostConfig::BACKEND_GEOMETRY_SHADERS;
        varyings(&mut code, blocks, "in", num_tex, num_colors, " v_in[]");
        varyings(&mut code, blocks, "out", num_tex, num_colors, " v_out");
        emit!(code);
        emit!(code, "void main()");
        emit!(code, "{{");
        emit!(code, "  for (int j = 0; j < 2; j++)");
        emit!(code, "  {{");
        emit!(code, "    gl_Layer = j;");
        emit!(code, "    for (int i = 0; i < 3; i++)");
        emit!(code, "    {{");
        emit!(code, "      gl_Position = gl_in[i].gl_Position;");
        for i in 0..num_tex {
            emit!(code, "      v_out.v_tex{i} = float3(v_in[i].v_tex{i}.xy, float(j));");
        }
        for i in 0..num_colors {
            emit!(code, "      v_out.v_col{i} = v_in[i].v_col{i};");
        }
        emit!(code, "      EmitVertex();");
        emit!(code, "    }}");
        emit!(code, "    EndPrimitive();");
        emit!(code, "  }}");
        emit!(code, "}}");
    }
    Some(finish(api, host, code))
}

/// Screen quad whose texture coordinates cover `src_offset .. src_offset + src_size`.
pub fn texture_copy_vertex_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::screen_quad_vertex(true);
    }
    let mut code = ShaderCode::new();
    uniform_block_header(&mut code, api);
    emit!(code, "{{");
    emit!(code, "  float2 src_offset;");
    emit!(code, "  float2 src_size;");
    emit!(code, "}};");
    emit!(code);
    vertex_main(
        &mut code,
        api,
        host,
        VertexIo {
            tex_inputs: 0,
            color_inputs: 0,
            position_input: false,
            tex_outputs: 1,
            color_outputs: 0,
            extra: vertex_id_input(api),
        },
    );
    emit!(code, "{{");
    emit!(code, "  v_tex0 = float3(float((id << 1) & 2), float(id & 2), 0.0f);");
    emit!(
        code,
        "  opos = float4(v_tex0.xy * float2(2.0f, -2.0f) + float2(-1.0f, 1.0f), 0.0f, 1.0f);"
    );
    emit!(code, "  v_tex0 = float3(src_offset + (src_size * v_tex0.xy), 0.0f);");
    if api.is_glsl() {
        emit!(code, "  opos.y = -opos.y;");
    }
    emit!(code, "}}");
    finish(api, host, code)
}

pub fn texture_copy_pixel_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::texture_copy_pixel();
    }
    let mut code = ShaderCode::new();
    sampler_declarations(&mut code, api, 0, 1, false);
    pixel_main(&mut code, api, host, 1, 0, "float4", "");
    emit!(code, "{{");
    emit!(code, "  ocol0 = {};", sample_texture(api, 0, "v_tex0"));
    emit!(code, "}}");
    finish(api, host, code)
}

/// Writes the interpolated vertex color.
pub fn color_pixel_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::color_pixel();
    }
    let mut code = ShaderCode::new();
    pixel_main(&mut code, api, host, 0, 1, "float4", "");
    emit!(code, "{{");
    emit!(code, "  ocol0 = v_col0;");
    emit!(code, "}}");
    finish(api, host, code)
}

/// Takes the minimum of all depth samples.
pub fn resolve_depth_pixel_shader(api: ApiType, host: ShaderHostConfig, samples: u32) -> String {
    if api == ApiType::Wgsl {
        return wgsl::resolve_depth_pixel(samples);
    }
    let mut code = ShaderCode::new();
    sampler_declarations(&mut code, api, 0, 1, true);
    pixel_main(&mut code, api, host, 1, 0, "float", frag_coord_input(api));
    emit!(code, "{{");
    int_coords(&mut code, api);
    emit!(code, "  ocol0 = {}.r;", load_sample(api, "0"));
    emit!(code, "  for (int i = 1; i < {samples}; i++)");
    emit!(code, "    ocol0 = min(ocol0, {}.r);", load_sample(api, "i"));
    emit!(code, "}}");
    finish(api, host, code)
}

/// Full-screen quad at `clear_depth` carrying `clear_color`.
pub fn clear_vertex_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::clear_vertex();
    }
    let mut code = ShaderCode::new();
    uniform_block_header(&mut code, api);
    emit!(code, "{{");
    emit!(code, "  float4 clear_color;");
    emit!(code, "  float clear_depth;");
    emit!(code, "}};");
    vertex_main(
        &mut code,
        api,
        host,
        VertexIo {
            tex_inputs: 0,
            color_inputs: 0,
            position_input: false,
            tex_outputs: 0,
            color_outputs: 1,
            extra: vertex_id_input(api),
        },
    );
    emit!(code, "{{");
    emit!(code, "  float2 coord = float2(float((id << 1) & 2), float(id & 2));");
    emit!(
        code,
        "  opos = float4(coord * float2(2.0f, -2.0f) + float2(-1.0f, 1.0f), clear_depth, 1.0f);"
    );
    emit!(code, "  v_col0 = clear_color;");
    if api == ApiType::Vulkan {
        emit!(code, "  opos.y = -opos.y;");
    }
    emit!(code, "}}");
    finish(api, host, code)
}

/// Points or quads written straight into the EFB. `rawpos.w` is the point size.
pub fn efb_poke_vertex_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::efb_poke_vertex();
    }
    let mut code = ShaderCode::new();
    vertex_main(
        &mut code,
        api,
        host,
        VertexIo {
            tex_inputs: 0,
            color_inputs: 1,
            position_input: true,
            tex_outputs: 0,
            color_outputs: 1,
            extra: "",
        },
    );
    emit!(code, "{{");
    emit!(code, "  v_col0 = rawcolor0;");
    emit!(code, "  opos = float4(rawpos.xyz, 1.0f);");
    if host.contains(ShaderHostConfig::BACKEND_LARGE_POINTS) && api.is_glsl() {
        emit!(code, "  gl_PointSize = rawpos.w;");
    }
    if api == ApiType::Vulkan {
        emit!(code, "  opos.y = -opos.y;");
    }
    emit!(code, "}}");
    finish(api, host, code)
}

/// Converts EFB contents between pixel formats, resolving MSAA on the way.
pub fn format_conversion_shader(
    api: ApiType,
    host: ShaderHostConfig,
    conversion: EfbReinterpretType,
    samples: u32,
) -> String {
    if api == ApiType::Wgsl {
        return wgsl::format_conversion(conversion, samples);
    }
    let ssaa = host.contains(ShaderHostConfig::SSAA);
    let mut code = ShaderCode::new();
    sampler_declarations(&mut code, api, 0, 1, samples > 1);
    let extra = if !is_hlsl(api) {
        ""
    } else if ssaa {
        "in float4 ipos : SV_Position, in uint isample : SV_SampleIndex, "
    } else {
        "in float4 ipos : SV_Position, "
    };
    pixel_main(&mut code, api, host, 1, 0, "float4", extra);
    emit!(code, "{{");
    int_coords(&mut code, api);
    if samples <= 1 {
        if is_hlsl(api) {
            emit!(code, "  float4 val = tex0.Load(int4(coords, 0));");
        } else {
            emit!(code, "  float4 val = texelFetch(samp0, coords, 0);");
        }
    } else if ssaa {
        let sample = if is_hlsl(api) { "isample" } else { "gl_SampleID" };
        emit!(code, "  float4 val = {};", load_sample(api, sample));
    } else {
        emit!(code, "  float4 val = float4(0.0f, 0.0f, 0.0f, 0.0f);");
        emit!(code, "  for (int i = 0; i < {samples}; i++)");
        emit!(code, "    val += {};", load_sample(api, "i"));
        emit!(code, "  val /= float({samples});");
    }
    conversion_body(&mut code, conversion, "int4", "float4", "");
    emit!(code, "}}");
    finish(api, host, code)
}

// Shared between all APIs; WGSL passes its own type names and shift suffix.
fn conversion_body(
    code: &mut ShaderCode,
    conversion: EfbReinterpretType,
    ivec: &str,
    fvec: &str,
    shift: &str,
) {
    let decl = |code: &mut ShaderCode, name: &str| {
        if ivec == "int4" {
            emit!(code, "  int4 {name};");
        } else {
            emit!(code, "  var {name}: {ivec};");
        }
    };
    let local = |code: &mut ShaderCode, name: &str, expr: String| {
        if ivec == "int4" {
            emit!(code, "  int4 {name} = {expr};");
        } else {
            emit!(code, "  let {name} = {expr};");
        }
    };
    match conversion {
        EfbReinterpretType::Rgb8ToRgba6 => {
            local(code, "src8", format!("{ivec}(round(val * 255.0))"));
            decl(code, "dst6");
            emit!(code, "  dst6.r = src8.r >> 2{shift};");
            emit!(code, "  dst6.g = ((src8.r & 3) << 4{shift}) | (src8.g >> 4{shift});");
            emit!(code, "  dst6.b = ((src8.g & 15) << 2{shift}) | (src8.b >> 6{shift});");
            emit!(code, "  dst6.a = src8.b & 63;");
            emit!(code, "  ocol0 = {fvec}(dst6) / 63.0;");
        }
        EfbReinterpretType::Rgba6ToRgb8 => {
            local(code, "src6", format!("{ivec}(round(val * 63.0))"));
            decl(code, "dst8");
            emit!(code, "  dst8.r = (src6.r << 2{shift}) | (src6.g >> 4{shift});");
            emit!(code, "  dst8.g = ((src6.g & 15) << 4{shift}) | (src6.b >> 2{shift});");
            emit!(code, "  dst8.b = ((src6.b & 3) << 6{shift}) | src6.a;");
            emit!(code, "  dst8.a = 255;");
            emit!(code, "  ocol0 = {fvec}(dst8) / 255.0;");
        }
        // The remaining conversions keep the stored bits.
        EfbReinterpretType::Rgb8ToRgb565
        | EfbReinterpretType::Rgba6ToRgb565
        | EfbReinterpretType::Rgb565ToRgb8
        | EfbReinterpretType::Rgb565ToRgba6 => {
            emit!(code, "  ocol0 = val;");
        }
    }
}

/// Vertex shader for overlay quads given in window pixels.
pub fn overlay_vertex_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::overlay_vertex();
    }
    let mut code = ShaderCode::new();
    uniform_block_header(&mut code, api);
    emit!(code, "{{");
    emit!(code, "  float2 u_rcp_viewport_size_mul2;");
    emit!(code, "}};");
    emit!(code);
    vertex_main(
        &mut code,
        api,
        host,
        VertexIo {
            tex_inputs: 1,
            color_inputs: 1,
            position_input: true,
            tex_outputs: 1,
            color_outputs: 1,
            extra: "",
        },
    );
    emit!(code, "{{");
    emit!(code, "  v_tex0 = float3(rawtex0.xy, 0.0);");
    emit!(code, "  v_col0 = rawcolor0;");
    emit!(
        code,
        "  opos = float4(rawpos.x * u_rcp_viewport_size_mul2.x - 1.0, 1.0 - rawpos.y * u_rcp_viewport_size_mul2.y, 0.0, 1.0);"
    );
    if api == ApiType::Vulkan {
        emit!(code, "  opos.y = -opos.y;");
    }
    emit!(code, "}}");
    finish(api, host, code)
}

pub fn overlay_pixel_shader(api: ApiType, host: ShaderHostConfig) -> String {
    if api == ApiType::Wgsl {
        return wgsl::overlay_pixel();
    }
    let mut code = ShaderCode::new();
    sampler_declarations(&mut code, api, 0, 1, false);
    pixel_main(&mut code, api, host, 1, 1, "float4", "");
    emit!(code, "{{");
    emit!(
        code,
        "  ocol0 = {} * v_col0;",
        sample_texture(api, 0, "float3(v_tex0.xy, 0.0)")
    );
    emit!(code, "}}");
    finish(api, host, code)
}

// ---------------------------------------------------------------------------
// WGSL
// ---------------------------------------------------------------------------

/// WGSL emitters. Bind group 0 binding 0 holds the uniform block; bind
/// group 1 holds textures at bindings 0..8 and their samplers at 8..16.
pub(crate) mod wgsl {
    use super::{conversion_body, EfbReinterpretType};
    use crate::native_vertex_format::location;
    use crate::shader_gen::{emit, ShaderCode};

    pub(crate) const SAMPLER_BINDING_BASE: u32 = 8;

    pub(crate) fn texture_bindings(code: &mut ShaderCode, count: u32) {
        for i in 0..count {
            emit!(code, "@group(1) @binding({i}) var tex{i}: texture_2d_array<f32>;");
            emit!(
                code,
                "@group(1) @binding({}) var samp{i}: sampler;",
                SAMPLER_BINDING_BASE + i
            );
        }
    }

    pub(crate) fn vertex_output(code: &mut ShaderCode, num_tex: u32, num_colors: u32) {
        emit!(code, "struct VertexOutput {{");
        emit!(code, "  @builtin(position) pos: vec4<f32>,");
        for i in 0..num_tex {
            emit!(code, "  @location({i}) tex{i}: vec3<f32>,");
        }
        for i in 0..num_colors {
            emit!(code, "  @location({}) col{i}: vec4<f32>,", num_tex + i);
        }
        emit!(code, "}};");
        emit!(code);
    }

    pub(crate) fn screen_quad_vertex(with_source_rect: bool) -> String {
        let mut code = ShaderCode::new();
        if with_source_rect {
            emit!(code, "struct CopyBlock {{");
            emit!(code, "  src_offset: vec2<f32>,");
            emit!(code, "  src_size: vec2<f32>,");
            emit!(code, "}};");
            emit!(code, "@group(0) @binding(0) var<uniform> u: CopyBlock;");
            emit!(code);
        }
        vertex_output(&mut code, 1, 0);
        emit!(code, "@vertex");
        emit!(code, "fn main(@builtin(vertex_index) id: u32) -> VertexOutput {{");
        emit!(code, "  var out: VertexOutput;");
        emit!(code, "  let coord = vec2<f32>(f32((id << 1u) & 2u), f32(id & 2u));");
        emit!(
            code,
            "  out.pos = vec4<f32>(coord * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);"
        );
        if with_source_rect {
            emit!(code, "  out.tex0 = vec3<f32>(u.src_offset + u.src_size * coord, 0.0);");
        } else {
            emit!(code, "  out.tex0 = vec3<f32>(coord, 0.0);");
        }
        emit!(code, "  return out;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn texture_copy_pixel() -> String {
        let mut code = ShaderCode::new();
        texture_bindings(&mut code, 1);
        emit!(code);
        emit!(code, "@fragment");
        emit!(
            code,
            "fn main(@location(0) v_tex0: vec3<f32>) -> @location(0) vec4<f32> {{"
        );
        emit!(
            code,
            "  return textureSample(tex0, samp0, v_tex0.xy, i32(v_tex0.z));"
        );
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn color_pixel() -> String {
        let mut code = ShaderCode::new();
        emit!(code, "@fragment");
        emit!(
            code,
            "fn main(@location(0) v_col0: vec4<f32>) -> @location(0) vec4<f32> {{"
        );
        emit!(code, "  return v_col0;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn resolve_depth_pixel(samples: u32) -> String {
        let mut code = ShaderCode::new();
        emit!(code, "@group(1) @binding(0) var tex0: texture_multisampled_2d<f32>;");
        emit!(code);
        emit!(code, "@fragment");
        emit!(
            code,
            "fn main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) f32 {{"
        );
        emit!(code, "  let coords = vec2<i32>(frag_coord.xy);");
        emit!(code, "  var depth = textureLoad(tex0, coords, 0).r;");
        emit!(code, "  for (var i = 1; i < {samples}; i++) {{");
        emit!(code, "    depth = min(depth, textureLoad(tex0, coords, i).r);");
        emit!(code, "  }}");
        emit!(code, "  return depth;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn clear_vertex() -> String {
        let mut code = ShaderCode::new();
        emit!(code, "struct ClearBlock {{");
        emit!(code, "  clear_color: vec4<f32>,");
        emit!(code, "  clear_depth: f32,");
        emit!(code, "}};");
        emit!(code, "@group(0) @binding(0) var<uniform> u: ClearBlock;");
        emit!(code);
        vertex_output(&mut code, 0, 1);
        emit!(code, "@vertex");
        emit!(code, "fn main(@builtin(vertex_index) id: u32) -> VertexOutput {{");
        emit!(code, "  var out: VertexOutput;");
        emit!(code, "  let coord = vec2<f32>(f32((id << 1u) & 2u), f32(id & 2u));");
        emit!(
            code,
            "  out.pos = vec4<f32>(coord * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), u.clear_depth, 1.0);"
        );
        emit!(code, "  out.col0 = u.clear_color;");
        emit!(code, "  return out;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn efb_poke_vertex() -> String {
        let mut code = ShaderCode::new();
        vertex_output(&mut code, 0, 1);
        emit!(code, "@vertex");
        emit!(
            code,
            "fn main(@location({}) rawpos: vec4<f32>, @location({}) rawcolor0: vec4<f32>) -> VertexOutput {{",
            location::POSITION,
            location::COLOR0
        );
        emit!(code, "  var out: VertexOutput;");
        emit!(code, "  out.col0 = rawcolor0;");
        emit!(code, "  out.pos = vec4<f32>(rawpos.xyz, 1.0);");
        emit!(code, "  return out;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn format_conversion(conversion: EfbReinterpretType, samples: u32) -> String {
        let mut code = ShaderCode::new();
        if samples > 1 {
            emit!(code, "@group(1) @binding(0) var tex0: texture_multisampled_2d<f32>;");
        } else {
            emit!(code, "@group(1) @binding(0) var tex0: texture_2d_array<f32>;");
        }
        emit!(code);
        emit!(code, "@fragment");
        emit!(
            code,
            "fn main(@builtin(position) frag_coord: vec4<f32>, @location(0) v_tex0: vec3<f32>) -> @location(0) vec4<f32> {{"
        );
        emit!(code, "  let coords = vec2<i32>(frag_coord.xy);");
        if samples > 1 {
            emit!(code, "  var val = vec4<f32>(0.0);");
            emit!(code, "  for (var i = 0; i < {samples}; i++) {{");
            emit!(code, "    val += textureLoad(tex0, coords, i);");
            emit!(code, "  }}");
            emit!(code, "  val /= f32({samples});");
        } else {
            emit!(
                code,
                "  let val = textureLoad(tex0, coords, i32(v_tex0.z), 0);"
            );
        }
        emit!(code, "  var ocol0: vec4<f32>;");
        conversion_body(&mut code, conversion, "vec4<i32>", "vec4<f32>", "u");
        emit!(code, "  return ocol0;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn overlay_vertex() -> String {
        let mut code = ShaderCode::new();
        emit!(code, "struct OverlayBlock {{");
        emit!(code, "  rcp_viewport_size_mul2: vec2<f32>,");
        emit!(code, "}};");
        emit!(code, "@group(0) @binding(0) var<uniform> u: OverlayBlock;");
        emit!(code);
        vertex_output(&mut code, 1, 1);
        emit!(code, "@vertex");
        emit!(
            code,
            "fn main(@location({}) rawpos: vec4<f32>, @location({}) rawcolor0: vec4<f32>, @location({}) rawtex0: vec3<f32>) -> VertexOutput {{",
            location::POSITION,
            location::COLOR0,
            location::TEXCOORD0
        );
        emit!(code, "  var out: VertexOutput;");
        emit!(code, "  out.tex0 = vec3<f32>(rawtex0.xy, 0.0);");
        emit!(code, "  out.col0 = rawcolor0;");
        emit!(
            code,
            "  out.pos = vec4<f32>(rawpos.x * u.rcp_viewport_size_mul2.x - 1.0, 1.0 - rawpos.y * u.rcp_viewport_size_mul2.y, 0.0, 1.0);"
        );
        emit!(code, "  return out;");
        emit!(code, "}}");
        code.into_string()
    }

    pub(crate) fn overlay_pixel() -> String {
        let mut code = ShaderCode::new();
        texture_bindings(&mut code, 1);
        emit!(code);
        emit!(code, "@fragment");
        emit!(
            code,
            "fn main(@location(0) v_tex0: vec3<f32>, @location(1) v_col0: vec4<f32>) -> @location(0) vec4<f32> {{"
        );
        emit!(code, "  return textureSample(tex0, samp0, v_tex0.xy, 0) * v_col0;");
        emit!(code, "}}");
        code.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ShaderHostConfig {
        ShaderHostConfig::empty()
    }

    #[test]
    fn screen_quad_uses_vertex_id() {
        let hlsl = screen_quad_vertex_shader(ApiType::D3D, host());
        assert!(hlsl.contains("in uint id : SV_VertexID"));
        assert!(hlsl.contains("v_tex0 = float3(float((id << 1) & 2), float(id & 2), 0.0f);"));
        assert!(!hlsl.contains("opos.y = -opos.y"));
    }

    #[test]
    fn glsl_screen_quad_flips_y() {
        for api in [ApiType::OpenGL, ApiType::Vulkan] {
            let src = screen_quad_vertex_shader(api, host());
            assert!(src.starts_with("#version"));
            assert!(src.contains("opos.y = -opos.y;"));
            assert!(src.contains("#define id gl_VertexID"));
        }
    }

    #[test]
    fn clear_shader_flips_only_on_vulkan() {
        assert!(clear_vertex_shader(ApiType::Vulkan, host()).contains("opos.y = -opos.y"));
        assert!(!clear_vertex_shader(ApiType::OpenGL, host()).contains("opos.y = -opos.y"));
    }

    #[test]
    fn glsl_varyings_follow_interface_block_setting() {
        let plain = texture_copy_pixel_shader(ApiType::OpenGL, host());
        assert!(plain.contains("VARYING_LOCATION(0) in float3 v_tex0;"));
        let blocks = texture_copy_pixel_shader(
            ApiType::OpenGL,
            ShaderHostConfig::BACKEND_GEOMETRY_SHADERS,
        );
        assert!(blocks.contains("VARYING_LOCATION(0) in VertexData {"));
    }

    #[test]
    fn resolve_depth_loops_over_samples() {
        let src = resolve_depth_pixel_shader(ApiType::D3D, host(), 4);
        assert!(src.contains("Texture2DMSArray<float4> tex0"));
        assert!(src.contains("for (int i = 1; i < 4; i++)"));
        assert!(src.contains("min(ocol0, tex0.Load(coords, i).r)"));
    }

    #[test]
    fn rgb8_to_rgba6_repacks_bits() {
        let src = format_conversion_shader(
            ApiType::Vulkan,
            host(),
            EfbReinterpretType::Rgb8ToRgba6,
            1,
        );
        assert!(src.contains("dst6.r = src8.r >> 2;"));
        assert!(src.contains("ocol0 = float4(dst6) / 63.0;"));
    }

    #[test]
    fn msaa_conversion_averages_unless_ssaa() {
        let avg = format_conversion_shader(
            ApiType::D3D,
            host(),
            EfbReinterpretType::Rgb565ToRgb8,
            4,
        );
        assert!(avg.contains("val /= float(4);"));
        let ssaa = format_conversion_shader(
            ApiType::D3D,
            ShaderHostConfig::SSAA,
            EfbReinterpretType::Rgb565ToRgb8,
            4,
        );
        assert!(ssaa.contains("SV_SampleIndex"));
        assert!(!ssaa.contains("val /="));
    }

    #[test]
    fn wgsl_has_no_geometry_stage() {
        assert!(passthrough_geometry_shader(ApiType::Wgsl, host(), 1, 0).is_none());
        let gs = passthrough_geometry_shader(ApiType::D3D, host(), 1, 1).unwrap();
        assert!(gs.contains("[maxvertexcount(6)]"));
        assert!(gs.contains("gso.tex0 = float3(vso[i].tex0.xy, float(slice));"));
    }

    #[test]
    fn wgsl_conversion_uses_unsigned_shifts() {
        let src = format_conversion_shader(
            ApiType::Wgsl,
            host(),
            EfbReinterpretType::Rgba6ToRgb8,
            1,
        );
        assert!(src.contains("let src6 = vec4<i32>(round(val * 63.0));"));
        assert!(src.contains("dst8.r = (src6.r << 2u) | (src6.g >> 4u);"));
        assert!(src.contains("var dst8: vec4<i32>;"));
    }

    #[test]
    fn generation_is_deterministic() {
        for api in [ApiType::D3D, ApiType::OpenGL, ApiType::Vulkan, ApiType::Wgsl] {
            assert_eq!(
                overlay_vertex_shader(api, host()),
                overlay_vertex_shader(api, host())
            );
            assert_eq!(
                texture_copy_vertex_shader(api, host()),
                texture_copy_vertex_shader(api, host())
            );
        }
    }
}
