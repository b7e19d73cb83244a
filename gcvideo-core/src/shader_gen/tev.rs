// TEV (Texture Environment) pixel shader generation.
//
// The console GPU has up to 16 TEV stages that combine textures, rasterized
// colors and constant colors into the final pixel. Every stage runs one
// combiner for color and one for alpha. `PixelShaderUid` captures everything
// that changes the generated code; register and konst values live in
// `GxUniforms` instead.

use super::framebuffer::{is_hlsl, pixel_main, sampler_declarations, wgsl};
use super::{emit, finish, gx_uniform, gx_uniform_block, ShaderCode, ShaderHostConfig};
use crate::backend::MAX_TEXTURE_UNITS;
use crate::config::ApiType;
use crate::render_state::CompareFunction;

pub const MAX_TEV_STAGES: usize = 16;
pub const MAX_TEXGENS: u8 = 8;

/// TEV color register. `Prev` holds the pixel output after the last stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TevReg {
    Prev,
    Reg0,
    Reg1,
    Reg2,
}

impl TevReg {
    const ALL: [TevReg; 4] = [TevReg::Prev, TevReg::Reg0, TevReg::Reg1, TevReg::Reg2];

    fn var(self) -> &'static str {
        match self {
            TevReg::Prev => "prev",
            TevReg::Reg0 => "reg0",
            TevReg::Reg1 => "reg1",
            TevReg::Reg2 => "reg2",
        }
    }
}

/// A four-component value a combiner can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TevSource {
    Reg(TevReg),
    /// The stage's texture lookup.
    Texture,
    /// The stage's rasterized channel.
    Rasterized,
    /// The stage's konst selection.
    Konst,
}

impl TevSource {
    fn var(self) -> &'static str {
        match self {
            TevSource::Reg(reg) => reg.var(),
            TevSource::Texture => "texel",
            TevSource::Rasterized => "vcolor",
            TevSource::Konst => "kcolor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TevConst {
    Zero,
    Half,
    One,
}

impl TevConst {
    fn literal(self) -> &'static str {
        match self {
            TevConst::Zero => "0.0",
            TevConst::Half => "0.5",
            TevConst::One => "1.0",
        }
    }
}

/// Color combiner operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorInput {
    Rgb(TevSource),
    /// The source's alpha replicated into all three channels.
    Alpha(TevSource),
    Const(TevConst),
}

/// Alpha combiner operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaInput {
    Alpha(TevSource),
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TevOp {
    Add,
    Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TevBias {
    Zero,
    AddHalf,
    SubHalf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TevScale {
    One,
    Two,
    Four,
    Half,
}

/// One combiner: `(d op lerp(a, b, c) + bias) * scale`, optionally clamped
/// to [0, 1], written to `dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TevCombiner<I> {
    pub a: I,
    pub b: I,
    pub c: I,
    pub d: I,
    pub op: TevOp,
    pub bias: TevBias,
    pub scale: TevScale,
    pub clamp: bool,
    pub dest: TevReg,
}

impl<I: Copy> TevCombiner<I> {
    fn with_inputs(a: I, b: I, c: I, d: I) -> Self {
        Self {
            a,
            b,
            c,
            d,
            op: TevOp::Add,
            bias: TevBias::Zero,
            scale: TevScale::One,
            clamp: true,
            dest: TevReg::Prev,
        }
    }
}

impl TevCombiner<ColorInput> {
    const ZERO: ColorInput = ColorInput::Const(TevConst::Zero);

    /// Outputs `d` unchanged.
    pub fn pass(d: ColorInput) -> Self {
        Self::with_inputs(Self::ZERO, Self::ZERO, Self::ZERO, d)
    }

    /// Outputs `x * y`.
    pub fn modulate(x: ColorInput, y: ColorInput) -> Self {
        Self::with_inputs(Self::ZERO, x, y, Self::ZERO)
    }
}

impl TevCombiner<AlphaInput> {
    pub fn pass(d: AlphaInput) -> Self {
        let z = AlphaInput::Zero;
        Self::with_inputs(z, z, z, d)
    }

    pub fn modulate(x: AlphaInput, y: AlphaInput) -> Self {
        let z = AlphaInput::Zero;
        Self::with_inputs(z, x, y, z)
    }
}

/// Texture lookup performed by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TevTexture {
    pub coord: u8,
    pub map: u8,
}

/// Which interpolated vertex color a stage sees as `Rasterized`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasChannel {
    #[default]
    Color0,
    Color1,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TevStageConfig {
    pub color: TevCombiner<ColorInput>,
    pub alpha: TevCombiner<AlphaInput>,
    pub texture: Option<TevTexture>,
    pub channel: RasChannel,
    /// Konst color selector as encoded in the KSEL registers.
    pub konst_color: u8,
    pub konst_alpha: u8,
}

impl Default for TevStageConfig {
    /// Leaves `prev` untouched.
    fn default() -> Self {
        Self {
            color: TevCombiner::<ColorInput>::pass(ColorInput::Rgb(TevSource::Reg(TevReg::Prev))),
            alpha: TevCombiner::<AlphaInput>::pass(AlphaInput::Alpha(TevSource::Reg(TevReg::Prev))),
            texture: None,
            channel: RasChannel::Color0,
            konst_color: 0,
            konst_alpha: 0,
        }
    }
}

impl TevStageConfig {
    pub fn rasterized_color() -> Self {
        Self {
            color: TevCombiner::<ColorInput>::pass(ColorInput::Rgb(TevSource::Rasterized)),
            alpha: TevCombiner::<AlphaInput>::pass(AlphaInput::Alpha(TevSource::Rasterized)),
            ..Self::default()
        }
    }

    /// Texture map 0 at `tex_coord`, multiplied by vertex color 0.
    pub fn modulate_texture(tex_coord: u8) -> Self {
        Self {
            color: TevCombiner::<ColorInput>::modulate(
                ColorInput::Rgb(TevSource::Texture),
                ColorInput::Rgb(TevSource::Rasterized),
            ),
            alpha: TevCombiner::<AlphaInput>::modulate(
                AlphaInput::Alpha(TevSource::Texture),
                AlphaInput::Alpha(TevSource::Rasterized),
            ),
            texture: Some(TevTexture {
                coord: tex_coord,
                map: 0,
            }),
            ..Self::default()
        }
    }

    fn sampled_texture(&self, num_texgens: u8) -> Option<TevTexture> {
        self.texture
            .filter(|t| t.coord < num_texgens && (t.map as usize) < MAX_TEXTURE_UNITS)
    }
}

/// How the two alpha test comparisons are combined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaTestOp {
    #[default]
    And,
    Or,
    Xor,
    Xnor,
}

/// Alpha test comparisons. The reference values are uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlphaTest {
    pub comp0: CompareFunction,
    pub comp1: CompareFunction,
    pub logic: AlphaTestOp,
}

impl Default for AlphaTest {
    fn default() -> Self {
        Self {
            comp0: CompareFunction::Always,
            comp1: CompareFunction::Always,
            logic: AlphaTestOp::And,
        }
    }
}

impl AlphaTest {
    /// True when every fragment passes regardless of the references.
    pub fn always_passes(&self) -> bool {
        let pass0 = self.comp0 == CompareFunction::Always;
        let pass1 = self.comp1 == CompareFunction::Always;
        let fail0 = self.comp0 == CompareFunction::Never;
        let fail1 = self.comp1 == CompareFunction::Never;
        match self.logic {
            AlphaTestOp::And => pass0 && pass1,
            AlphaTestOp::Or => pass0 || pass1,
            AlphaTestOp::Xor => (pass0 && fail1) || (fail0 && pass1),
            AlphaTestOp::Xnor => (pass0 && pass1) || (fail0 && fail1),
        }
    }
}

/// Everything that selects a distinct GX pixel shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelShaderUid {
    pub num_stages: u8,
    pub num_texgens: u8,
    /// Entries past `num_stages` are always the default stage.
    pub stages: [TevStageConfig; MAX_TEV_STAGES],
    pub alpha_test: AlphaTest,
}

impl Default for PixelShaderUid {
    fn default() -> Self {
        Self::new(&[TevStageConfig::rasterized_color()], 0, AlphaTest::default())
    }
}

impl PixelShaderUid {
    /// Builds a uid from the active stages. At most 16 stages and 8 texgens
    /// are kept, and at least one stage is always present.
    pub fn new(active: &[TevStageConfig], num_texgens: u8, alpha_test: AlphaTest) -> Self {
        let count = active.len().min(MAX_TEV_STAGES);
        let mut stages = [TevStageConfig::default(); MAX_TEV_STAGES];
        stages[..count].copy_from_slice(&active[..count]);
        Self {
            num_stages: count.max(1) as u8,
            num_texgens: num_texgens.min(MAX_TEXGENS),
            stages,
            alpha_test,
        }
    }

    pub fn active_stages(&self) -> &[TevStageConfig] {
        &self.stages[..self.num_stages as usize]
    }

    /// Highest texture unit referenced by a stage, plus one.
    pub fn texture_units_used(&self) -> u32 {
        self.active_stages()
            .iter()
            .filter_map(|s| s.sampled_texture(self.num_texgens))
            .map(|t| t.map as u32 + 1)
            .max()
            .unwrap_or(0)
    }
}

// HLSL and GLSL share `float3`/`float4` syntax through the GLSL prelude.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Hlsl,
    Wgsl,
}

impl Dialect {
    fn of(api: ApiType) -> Self {
        if api == ApiType::Wgsl {
            Dialect::Wgsl
        } else {
            Dialect::Hlsl
        }
    }

    fn vec3(self, x: &str) -> String {
        match self {
            Dialect::Hlsl => format!("float3({x}, {x}, {x})"),
            Dialect::Wgsl => format!("vec3<f32>({x})"),
        }
    }

    fn vec4_from(self, rgb: &str, a: &str) -> String {
        match self {
            Dialect::Hlsl => format!("float4({rgb}, {a})"),
            Dialect::Wgsl => format!("vec4<f32>({rgb}, {a})"),
        }
    }

    fn zero4(self) -> &'static str {
        match self {
            Dialect::Hlsl => "float4(0.0, 0.0, 0.0, 0.0)",
            Dialect::Wgsl => "vec4<f32>(0.0)",
        }
    }

    fn lerp(self) -> &'static str {
        match self {
            Dialect::Hlsl => "lerp",
            Dialect::Wgsl => "mix",
        }
    }

    fn decl(self, ty: &str, name: &str, expr: &str) -> String {
        match self {
            Dialect::Hlsl => format!("{ty} {name} = {expr};"),
            Dialect::Wgsl => format!("let {name} = {expr};"),
        }
    }

    fn var4(self, name: &str, expr: &str) -> String {
        match self {
            Dialect::Hlsl => format!("float4 {name} = {expr};"),
            Dialect::Wgsl => format!("var {name}: vec4<f32> = {expr};"),
        }
    }

    fn color_input(self, i: u32) -> String {
        match self {
            Dialect::Hlsl => format!("v_col{i}"),
            Dialect::Wgsl => format!("input.col{i}"),
        }
    }

    fn tex_input(self, i: u8) -> String {
        match self {
            Dialect::Hlsl => format!("v_tex{i}"),
            Dialect::Wgsl => format!("input.tex{i}"),
        }
    }
}

trait CombinerInput: Copy {
    fn expr(self, d: Dialect) -> String;
}

impl CombinerInput for ColorInput {
    fn expr(self, d: Dialect) -> String {
        match self {
            ColorInput::Rgb(src) => format!("{}.rgb", src.var()),
            ColorInput::Alpha(src) => d.vec3(&format!("{}.a", src.var())),
            ColorInput::Const(c) => d.vec3(c.literal()),
        }
    }
}

impl CombinerInput for AlphaInput {
    fn expr(self, _d: Dialect) -> String {
        match self {
            AlphaInput::Alpha(src) => format!("{}.a", src.var()),
            AlphaInput::Zero => "0.0".to_string(),
        }
    }
}

fn combiner_expr<I: CombinerInput>(d: Dialect, c: &TevCombiner<I>) -> String {
    let blend = format!(
        "{}({}, {}, {})",
        d.lerp(),
        c.a.expr(d),
        c.b.expr(d),
        c.c.expr(d)
    );
    let op = match c.op {
        TevOp::Add => '+',
        TevOp::Subtract => '-',
    };
    let mut expr = format!("{} {op} {blend}", c.d.expr(d));
    match c.bias {
        TevBias::Zero => {}
        TevBias::AddHalf => expr.push_str(" + 0.5"),
        TevBias::SubHalf => expr.push_str(" - 0.5"),
    }
    match c.scale {
        TevScale::One => expr,
        TevScale::Two => format!("({expr}) * 2.0"),
        TevScale::Four => format!("({expr}) * 4.0"),
        TevScale::Half => format!("({expr}) * 0.5"),
    }
}

const KONST_FRACTIONS: [&str; 8] = [
    "1.0", "0.875", "0.75", "0.625", "0.5", "0.375", "0.25", "0.125",
];
const CHANNELS: [&str; 4] = ["r", "g", "b", "a"];

// Selectors 0..=7 are fixed fractions, 0x0C..=0x0F a whole konst register,
// 0x10..=0x1F one channel of a konst register.
fn konst_color(d: Dialect, api: ApiType, sel: u8) -> String {
    let konst = gx_uniform(api, "konst");
    match sel {
        0..=7 => d.vec3(KONST_FRACTIONS[sel as usize]),
        0x0C..=0x0F => format!("{konst}[{}].rgb", sel & 3),
        0x10..=0x1F => {
            let channel = CHANNELS[((sel - 0x10) >> 2) as usize];
            d.vec3(&format!("{konst}[{}].{channel}", sel & 3))
        }
        _ => format!("{konst}[0].rgb"),
    }
}

fn konst_alpha(api: ApiType, sel: u8) -> String {
    let konst = gx_uniform(api, "konst");
    match sel {
        0..=7 => KONST_FRACTIONS[sel as usize].to_string(),
        0x10..=0x1F => {
            let channel = CHANNELS[((sel - 0x10) >> 2) as usize];
            format!("{konst}[{}].{channel}", sel & 3)
        }
        _ => format!("{konst}[0].a"),
    }
}

fn compare_expr(func: CompareFunction, value: &str, reference: &str) -> String {
    let op = match func {
        CompareFunction::Never => return "false".to_string(),
        CompareFunction::Always => return "true".to_string(),
        CompareFunction::Less => "<",
        CompareFunction::Equal => "==",
        CompareFunction::LessEqual => "<=",
        CompareFunction::Greater => ">",
        CompareFunction::NotEqual => "!=",
        CompareFunction::GreaterEqual => ">=",
    };
    format!("({value} {op} {reference})")
}

/// Generates the complete GX pixel shader for `uid`.
///
/// The vertex stage must provide `num_texgens` texture coordinates followed
/// by two colors (see [`super::vertex`]).
pub fn generate_pixel_shader(
    api: ApiType,
    host: ShaderHostConfig,
    uid: &PixelShaderUid,
) -> String {
    let d = Dialect::of(api);
    let mut code = ShaderCode::new();
    gx_uniform_block(&mut code, api);

    let texture_units = uid.texture_units_used();
    match d {
        Dialect::Hlsl => {
            sampler_declarations(&mut code, api, 0, texture_units, false);
            pixel_main(
                &mut code,
                api,
                host,
                uid.num_texgens as u32,
                2,
                "float4",
                "",
            );
            emit!(code, "{{");
        }
        Dialect::Wgsl => {
            wgsl::texture_bindings(&mut code, texture_units);
            emit!(code, "struct FragmentInput {{");
            for i in 0..uid.num_texgens as u32 {
                emit!(code, "  @location({i}) tex{i}: vec3<f32>,");
            }
            for i in 0..2 {
                emit!(code, "  @location({}) col{i}: vec4<f32>,", uid.num_texgens as u32 + i);
            }
            emit!(code, "}};");
            emit!(code);
            emit!(code, "@fragment");
            emit!(code, "fn main(input: FragmentInput) -> @location(0) vec4<f32> {{");
        }
    }

    let tev_color = gx_uniform(api, "tev_color");
    for (i, reg) in TevReg::ALL.iter().enumerate() {
        emit!(code, "  {}", d.var4(reg.var(), &format!("{tev_color}[{i}]")));
    }
    for src in [TevSource::Texture, TevSource::Rasterized, TevSource::Konst] {
        emit!(code, "  {}", d.var4(src.var(), d.zero4()));
    }
    emit!(code);

    for (n, stage) in uid.active_stages().iter().enumerate() {
        generate_stage(&mut code, api, d, uid.num_texgens, stage, n);
    }

    if !uid.alpha_test.always_passes() {
        emit_alpha_test(&mut code, api, d, &uid.alpha_test);
    }

    match d {
        Dialect::Hlsl => emit!(code, "  ocol0 = prev;"),
        Dialect::Wgsl => emit!(code, "  return prev;"),
    }
    emit!(code, "}}");
    finish(api, host, code)
}

fn sample_stage_texture(api: ApiType, d: Dialect, texture: TevTexture) -> String {
    let (map, uv) = (texture.map, d.tex_input(texture.coord));
    match d {
        Dialect::Wgsl => format!("textureSample(tex{map}, samp{map}, {uv}.xy, 0)"),
        Dialect::Hlsl if is_hlsl(api) => {
            format!("tex{map}.Sample(samp{map}, float3({uv}.xy, 0.0))")
        }
        Dialect::Hlsl => format!("texture(samp{map}, float3({uv}.xy, 0.0))"),
    }
}

fn generate_stage(
    code: &mut ShaderCode,
    api: ApiType,
    d: Dialect,
    num_texgens: u8,
    stage: &TevStageConfig,
    n: usize,
) {
    emit!(code, "  // stage {n}");

    if let Some(texture) = stage.sampled_texture(num_texgens) {
        emit!(code, "  texel = {};", sample_stage_texture(api, d, texture));
    }
    let ras = match stage.channel {
        RasChannel::Color0 => d.color_input(0),
        RasChannel::Color1 => d.color_input(1),
        RasChannel::Zero => d.zero4().to_string(),
    };
    emit!(code, "  vcolor = {ras};");
    let konst = d.vec4_from(
        &konst_color(d, api, stage.konst_color),
        &konst_alpha(api, stage.konst_alpha),
    );
    emit!(code, "  kcolor = {konst};");

    let rgb = format!("s{n}_rgb");
    let alpha = format!("s{n}_a");
    emit!(code, "  {}", d.decl("float3", &rgb, &combiner_expr(d, &stage.color)));
    emit!(code, "  {}", d.decl("float", &alpha, &combiner_expr(d, &stage.alpha)));

    let rgb = if stage.color.clamp {
        format!("clamp({rgb}, {}, {})", d.vec3("0.0"), d.vec3("1.0"))
    } else {
        rgb
    };
    let alpha = if stage.alpha.clamp {
        format!("clamp({alpha}, 0.0, 1.0)")
    } else {
        alpha
    };

    let color_dest = stage.color.dest.var();
    if stage.color.dest == stage.alpha.dest {
        emit!(code, "  {color_dest} = {};", d.vec4_from(&rgb, &alpha));
    } else {
        let keep_alpha = format!("{color_dest}.a");
        emit!(code, "  {color_dest} = {};", d.vec4_from(&rgb, &keep_alpha));
        emit!(code, "  {}.a = {alpha};", stage.alpha.dest.var());
    }
    emit!(code);
}

fn emit_alpha_test(code: &mut ShaderCode, api: ApiType, d: Dialect, test: &AlphaTest) {
    let alpha_ref = gx_uniform(api, "alpha_ref");
    let at0 = compare_expr(test.comp0, "prev.a", &format!("{alpha_ref}.x"));
    let at1 = compare_expr(test.comp1, "prev.a", &format!("{alpha_ref}.y"));
    emit!(code, "  // alpha test");
    emit!(code, "  {}", d.decl("bool", "at0", &at0));
    emit!(code, "  {}", d.decl("bool", "at1", &at1));
    let pass = match test.logic {
        AlphaTestOp::And => "at0 && at1",
        AlphaTestOp::Or => "at0 || at1",
        AlphaTestOp::Xor => "at0 != at1",
        AlphaTestOp::Xnor => "at0 == at1",
    };
    match d {
        Dialect::Wgsl => emit!(code, "  if (!({pass})) {{ discard; }}"),
        Dialect::Hlsl => emit!(code, "  if (!({pass})) discard;"),
    }
    emit!(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO3: &str = "vec3<f32>(0.0)";

    fn wgsl_for(stages: &[TevStageConfig]) -> String {
        let uid = PixelShaderUid::new(stages, 1, AlphaTest::default());
        generate_pixel_shader(ApiType::Wgsl, ShaderHostConfig::empty(), &uid)
    }

    #[test]
    fn default_stage_leaves_prev_alone() {
        let wgsl = wgsl_for(&[TevStageConfig::default()]);
        assert!(wgsl.contains(&format!(
            "let s0_rgb = prev.rgb + mix({ZERO3}, {ZERO3}, {ZERO3});"
        )));
        assert!(wgsl.contains("let s0_a = prev.a + mix(0.0, 0.0, 0.0);"));
        assert!(wgsl.contains(
            "prev = vec4<f32>(clamp(s0_rgb, vec3<f32>(0.0), vec3<f32>(1.0)), clamp(s0_a, 0.0, 1.0));"
        ));
        assert!(!wgsl.contains("texel = texture"));
    }

    #[test]
    fn default_uid_outputs_vertex_color() {
        let uid = PixelShaderUid::default();
        assert_eq!(uid.num_stages, 1);
        let wgsl = generate_pixel_shader(ApiType::Wgsl, ShaderHostConfig::empty(), &uid);
        assert!(wgsl.contains("vcolor = input.col0;"));
        assert!(wgsl.contains("let s0_rgb = vcolor.rgb + mix("));
        assert!(wgsl.contains("return prev;"));
    }

    #[test]
    fn stage_list_is_bounded() {
        let uid = PixelShaderUid::new(&[], 0, AlphaTest::default());
        assert_eq!(uid.num_stages, 1);
        assert_eq!(uid.active_stages()[0], TevStageConfig::default());

        let wgsl = wgsl_for(&[TevStageConfig::default(); 20]);
        assert!(wgsl.contains("// stage 15\n"));
        assert!(!wgsl.contains("// stage 16\n"));

        let uid = PixelShaderUid::new(&[TevStageConfig::rasterized_color()], 12, AlphaTest::default());
        assert_eq!(uid.num_texgens, MAX_TEXGENS);
        assert!(uid.stages[1..].iter().all(|s| *s == TevStageConfig::default()));
    }

    #[test]
    fn modulated_texture_is_sampled_in_every_language() {
        let mut stage = TevStageConfig::modulate_texture(0);
        stage.texture = Some(TevTexture { coord: 0, map: 2 });
        let uid = PixelShaderUid::new(&[stage], 1, AlphaTest::default());
        assert_eq!(uid.texture_units_used(), 3);

        let host = ShaderHostConfig::empty();
        let wgsl = generate_pixel_shader(ApiType::Wgsl, host, &uid);
        assert!(wgsl.contains("texel = textureSample(tex2, samp2, input.tex0.xy, 0);"));
        assert!(wgsl.contains(&format!("mix({ZERO3}, texel.rgb, vcolor.rgb)")));
        assert!(wgsl.contains("mix(0.0, texel.a, vcolor.a)"));
        let hlsl = generate_pixel_shader(ApiType::D3D, host, &uid);
        assert!(hlsl.contains("texel = tex2.Sample(samp2, float3(v_tex0.xy, 0.0));"));
        let glsl = generate_pixel_shader(ApiType::OpenGL, host, &uid);
        assert!(glsl.contains("texel = texture(samp2, float3(v_tex0.xy, 0.0));"));
    }

    #[test]
    fn lookup_past_the_texgens_is_dropped() {
        let uid = PixelShaderUid::new(&[TevStageConfig::modulate_texture(3)], 1, AlphaTest::default());
        assert_eq!(uid.texture_units_used(), 0);
        let wgsl = generate_pixel_shader(ApiType::Wgsl, ShaderHostConfig::empty(), &uid);
        assert!(!wgsl.contains("textureSample"));
    }

    #[test]
    fn subtract_bias_and_scale_wrap_the_blend() {
        let mut stage = TevStageConfig::rasterized_color();
        stage.color.op = TevOp::Subtract;
        stage.color.bias = TevBias::SubHalf;
        stage.color.scale = TevScale::Two;
        stage.alpha.bias = TevBias::AddHalf;
        stage.alpha.scale = TevScale::Half;
        let wgsl = wgsl_for(&[stage]);
        assert!(wgsl.contains(&format!(
            "let s0_rgb = (vcolor.rgb - mix({ZERO3}, {ZERO3}, {ZERO3}) - 0.5) * 2.0;"
        )));
        assert!(wgsl.contains("let s0_a = (vcolor.a + mix(0.0, 0.0, 0.0) + 0.5) * 0.5;"));
    }

    #[test]
    fn split_destinations_keep_the_other_channel() {
        let mut stage = TevStageConfig::default();
        stage.color.dest = TevReg::Reg0;
        stage.alpha.dest = TevReg::Reg1;
        stage.alpha.clamp = false;
        let wgsl = wgsl_for(&[stage]);
        assert!(wgsl.contains(
            "reg0 = vec4<f32>(clamp(s0_rgb, vec3<f32>(0.0), vec3<f32>(1.0)), reg0.a);"
        ));
        assert!(wgsl.contains("reg1.a = s0_a;"));
    }

    #[test]
    fn unclamped_results_are_written_raw() {
        let mut stage = TevStageConfig::default();
        stage.color.clamp = false;
        stage.alpha.clamp = false;
        assert!(wgsl_for(&[stage]).contains("prev = vec4<f32>(s0_rgb, s0_a);"));
    }

    #[test]
    fn hlsl_uses_typed_locals_and_lerp() {
        let uid = PixelShaderUid::new(&[TevStageConfig::default()], 0, AlphaTest::default());
        let hlsl = generate_pixel_shader(ApiType::D3D, ShaderHostConfig::empty(), &uid);
        assert!(hlsl.contains("cbuffer GxBlock : register(b0)"));
        assert!(hlsl.contains("float4 prev = tev_color[0];"));
        assert!(hlsl.contains("float4 reg2 = tev_color[3];"));
        assert!(hlsl.contains("float3 s0_rgb = prev.rgb + lerp(float3(0.0, 0.0, 0.0), "));
        assert!(hlsl.contains("ocol0 = prev;"));
    }

    #[test]
    fn alpha_replicated_color_input() {
        let input = ColorInput::Alpha(TevSource::Texture);
        assert_eq!(input.expr(Dialect::Wgsl), "vec3<f32>(texel.a)");
        assert_eq!(input.expr(Dialect::Hlsl), "float3(texel.a, texel.a, texel.a)");
        assert_eq!(ColorInput::Const(TevConst::Half).expr(Dialect::Wgsl), "vec3<f32>(0.5)");
        assert_eq!(AlphaInput::Alpha(TevSource::Reg(TevReg::Reg2)).expr(Dialect::Wgsl), "reg2.a");
    }

    #[test]
    fn second_channel_and_zero_channel() {
        let mut stage = TevStageConfig::rasterized_color();
        stage.channel = RasChannel::Color1;
        assert!(wgsl_for(&[stage]).contains("vcolor = input.col1;"));
        stage.channel = RasChannel::Zero;
        assert!(wgsl_for(&[stage]).contains("vcolor = vec4<f32>(0.0);"));
    }

    #[test]
    fn konst_selectors() {
        let mut stage = TevStageConfig::default();
        stage.color.a = ColorInput::Rgb(TevSource::Konst);
        stage.konst_color = 0x0D;
        stage.konst_alpha = 0x1E;
        let wgsl = wgsl_for(&[stage]);
        assert!(wgsl.contains("kcolor = vec4<f32>(gx.konst[1].rgb, gx.konst[2].a);"));

        stage.konst_color = 4;
        stage.konst_alpha = 0x12;
        let wgsl = wgsl_for(&[stage]);
        assert!(wgsl.contains("kcolor = vec4<f32>(vec3<f32>(0.5), gx.konst[2].r);"));
    }

    #[test]
    fn alpha_test_emits_discard() {
        let test = AlphaTest {
            comp0: CompareFunction::Greater,
            comp1: CompareFunction::Always,
            logic: AlphaTestOp::And,
        };
        let uid = PixelShaderUid::new(&[TevStageConfig::default()], 0, test);
        let glsl = generate_pixel_shader(ApiType::Vulkan, ShaderHostConfig::empty(), &uid);
        assert!(glsl.contains("bool at0 = (prev.a > alpha_ref.x);"));
        assert!(glsl.contains("if (!(at0 && at1)) discard;"));
    }

    #[test]
    fn always_passing_alpha_test_is_skipped() {
        let test = AlphaTest {
            comp0: CompareFunction::Never,
            comp1: CompareFunction::Always,
            logic: AlphaTestOp::Or,
        };
        assert!(test.always_passes());
        let uid = PixelShaderUid::new(&[TevStageConfig::default()], 0, test);
        let wgsl = generate_pixel_shader(ApiType::Wgsl, ShaderHostConfig::empty(), &uid);
        assert!(!wgsl.contains("discard"));
    }

    #[test]
    fn generation_is_deterministic() {
        let uid = PixelShaderUid::new(
            &[TevStageConfig::modulate_texture(0), TevStageConfig::default()],
            1,
            AlphaTest::default(),
        );
        for api in [ApiType::D3D, ApiType::OpenGL, ApiType::Vulkan, ApiType::Wgsl] {
            let host = ShaderHostConfig::BACKEND_GEOMETRY_SHADERS;
            assert_eq!(
                generate_pixel_shader(api, host, &uid),
                generate_pixel_shader(api, host, &uid)
            );
        }
    }
}
