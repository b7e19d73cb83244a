//! Subcommand implementations.

use anyhow::{Context, Result};
use gcvideo_core::host::XfbEntry;
use gcvideo_core::index_generator::GxPrimitive;
use gcvideo_core::native_vertex_format::PortableVertexDeclaration;
use gcvideo_core::renderer::DisplayGeometry;
use gcvideo_core::shader_cache::GxPipelineUid;
use gcvideo_core::shader_gen::framebuffer::{self, EfbReinterpretType};
use gcvideo_core::shader_gen::tev::{generate_pixel_shader, AlphaTest, TevStageConfig};
use gcvideo_core::shader_gen::vertex::generate_vertex_shader;
use gcvideo_core::shader_gen::{PixelShaderUid, ShaderHostConfig, VertexShaderUid};
use gcvideo_core::texture::{AbstractTextureFormat, TextureConfig};
use gcvideo_core::vertex_manager::ProjectionAspect;
use gcvideo_core::{
    ApiType, AspectMode, Backend, BackendKind, Collaborators, Renderer, SharedConfig,
    VideoConfig, XfbTextureCache,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const XFB_ADDR: u32 = 0x0080_0000;
const XFB_WIDTH: u32 = 640;
const XFB_HEIGHT: u32 = 480;
const TICKS_PER_FRAME: u64 = 486_000_000 / 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShaderApi {
    D3d,
    Opengl,
    Vulkan,
    Wgsl,
}

impl ShaderApi {
    fn api(self) -> ApiType {
        match self {
            ShaderApi::D3d => ApiType::D3D,
            ShaderApi::Opengl => ApiType::OpenGL,
            ShaderApi::Vulkan => ApiType::Vulkan,
            ShaderApi::Wgsl => ApiType::Wgsl,
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            ShaderApi::D3d => "d3d",
            ShaderApi::Opengl => "opengl",
            ShaderApi::Vulkan => "vulkan",
            ShaderApi::Wgsl => "wgsl",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ShaderApi::D3d => "hlsl",
            ShaderApi::Opengl | ShaderApi::Vulkan => "glsl",
            ShaderApi::Wgsl => "wgsl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AspectArg {
    Auto,
    Analog,
    AnalogWide,
    Stretch,
}

impl From<AspectArg> for AspectMode {
    fn from(arg: AspectArg) -> Self {
        match arg {
            AspectArg::Auto => AspectMode::Auto,
            AspectArg::Analog => AspectMode::Analog,
            AspectArg::AnalogWide => AspectMode::AnalogWide,
            AspectArg::Stretch => AspectMode::Stretch,
        }
    }
}

// ---------------------------------------------------------------------------
// shaders
// ---------------------------------------------------------------------------

/// Writes every utility shader plus a textured TEV pipeline. Returns the
/// number of files written.
pub fn write_shaders(api: ShaderApi, out: &Path) -> Result<usize> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;

    let ty = api.api();
    let host = ShaderHostConfig::empty();
    let mut sources: Vec<(String, String)> = vec![
        ("screen_quad.vs".into(), framebuffer::screen_quad_vertex_shader(ty, host)),
        ("texture_copy.vs".into(), framebuffer::texture_copy_vertex_shader(ty, host)),
        ("texture_copy.ps".into(), framebuffer::texture_copy_pixel_shader(ty, host)),
        ("color.ps".into(), framebuffer::color_pixel_shader(ty, host)),
        ("clear.vs".into(), framebuffer::clear_vertex_shader(ty, host)),
        ("efb_poke.vs".into(), framebuffer::efb_poke_vertex_shader(ty, host)),
        ("overlay.vs".into(), framebuffer::overlay_vertex_shader(ty, host)),
        ("overlay.ps".into(), framebuffer::overlay_pixel_shader(ty, host)),
        ("resolve_depth_4x.ps".into(), framebuffer::resolve_depth_pixel_shader(ty, host, 4)),
    ];
    for conversion in EfbReinterpretType::ALL {
        sources.push((
            format!("{}.ps", conversion.name()),
            framebuffer::format_conversion_shader(ty, host, conversion, 1),
        ));
    }
    if let Some(gs) = framebuffer::passthrough_geometry_shader(ty, host, 1, 1) {
        sources.push(("stereo_passthrough.gs".into(), gs));
    }

    let decl = PortableVertexDeclaration::simple(1);
    let ps_uid = PixelShaderUid::new(&[TevStageConfig::modulate_texture(0)], 1, AlphaTest::default());
    let vs_uid = VertexShaderUid::new(&decl, ps_uid.num_texgens);
    sources.push(("tev_sample.vs".into(), generate_vertex_shader(ty, host, &vs_uid)));
    sources.push(("tev_sample.ps".into(), generate_pixel_shader(ty, host, &ps_uid)));

    for (name, source) in &sources {
        let path = out.join(format!("{name}.{}", api.extension()));
        std::fs::write(&path, source)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
    }
    Ok(sources.len())
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

pub struct ReplayOptions {
    pub frames: u32,
    pub backend: BackendKind,
    pub dump: Option<PathBuf>,
    pub screenshot: Option<PathBuf>,
    pub size: (u32, u32),
    pub config: Option<PathBuf>,
}

/// Diagonal gradient that scrolls one step per frame.
fn synthetic_frame(frame: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((XFB_WIDTH * XFB_HEIGHT * 4) as usize);
    for y in 0..XFB_HEIGHT {
        for x in 0..XFB_WIDTH {
            let v = x.wrapping_add(y).wrapping_add(frame * 4);
            pixels.extend_from_slice(&[v as u8, (y / 2) as u8, (x / 3) as u8, 0xFF]);
        }
    }
    pixels
}

/// Streams one 4:3 quad so the vertex path runs every frame.
fn draw_quad(renderer: &mut Renderer, decl: &PortableVertexDeclaration) {
    let stride = decl.stride as usize;
    let mut vertices = vec![0u8; stride * 4];
    for (i, (x, y)) in [(-1.0f32, 1.0f32), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)]
        .into_iter()
        .enumerate()
    {
        let position = [x, y, 0.0, 1.0];
        let dst = &mut vertices[i * stride..i * stride + 16];
        for (chunk, value) in dst.chunks_exact_mut(4).zip(position) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        vertices[i * stride + 16..i * stride + 20].copy_from_slice(&[0xFF, 0x80, 0x40, 0xFF]);
    }

    renderer.set_projection(
        ProjectionAspect {
            raw_projection: [1.0, 0.0, 4.0 / 3.0, 0.0, -1.0, 0.0],
            viewport_width: XFB_WIDTH as f32,
            viewport_height: XFB_HEIGHT as f32,
        },
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    );
    renderer.submit_vertices(GxPrimitive::Quads, &vertices, 4);
    renderer.flush_vertices();
}

pub fn replay(options: &ReplayOptions, mut progress: impl FnMut(u32)) -> Result<Value> {
    let mut config = match &options.config {
        Some(path) => VideoConfig::load(path)
            .with_context(|| format!("Failed to load video config {}", path.display()))?,
        None => VideoConfig::default(),
    };
    if let Some(dir) = &options.dump {
        config.dump_path = dir.clone();
        config.dump_frames_silent = true;
    }

    let (width, height) = options.size;
    let backend = Backend::create(options.backend, width, height)
        .with_context(|| format!("Failed to create {} backend", options.backend.name()))?;
    let cache = XfbTextureCache::new();
    let collab = Collaborators::headless(Box::new(cache.clone()));
    let mut renderer = Renderer::new(backend, SharedConfig::new(config), collab)
        .context("Failed to initialize renderer")?;
    log::info!(
        "Replaying {} frames on {} at {width}x{height}",
        options.frames,
        options.backend.name()
    );

    let screenshots = renderer.screenshot_handle();
    if options.dump.is_some() {
        screenshots.set_dump_frames(true);
    }
    if let Some(path) = &options.screenshot {
        screenshots.save_screenshot(path, false);
    }

    let decl = PortableVertexDeclaration::simple(0);
    renderer.set_gx_pipeline(GxPipelineUid::new(decl, PixelShaderUid::default()));
    let xfb_config = TextureConfig::simple(XFB_WIDTH, XFB_HEIGHT, AbstractTextureFormat::RGBA8);

    for frame in 1..=options.frames {
        draw_quad(&mut renderer, &decl);

        let texture = renderer
            .create_texture(&xfb_config)
            .context("Failed to create XFB texture")?;
        texture.load(0, XFB_WIDTH, XFB_HEIGHT, XFB_WIDTH, &synthetic_frame(frame));
        cache.insert(
            XFB_ADDR,
            XfbEntry {
                id: frame as u64,
                texture: Arc::new(texture),
                native_width: XFB_WIDTH,
                native_height: XFB_HEIGHT,
            },
        );
        renderer.swap(
            XFB_ADDR,
            XFB_WIDTH,
            XFB_WIDTH,
            XFB_HEIGHT,
            frame as u64 * TICKS_PER_FRAME,
        );
        progress(frame);
    }

    // An unchanged XFB only flushes, handing the last dumped frame to the worker.
    renderer.swap(XFB_ADDR, XFB_WIDTH, XFB_WIDTH, XFB_HEIGHT, 0);
    renderer.shutdown();

    let stats = renderer.stats();
    let target = renderer.target_rectangle();
    Ok(json!({
        "backend": options.backend.name(),
        "frames_presented": stats.num_frames_presented,
        "swaps_skipped": stats.num_swaps_skipped,
        "frame_count": renderer.frame_count(),
        "fps": renderer.frame_timer().fps(),
        "backbuffer": renderer.backbuffer_size(),
        "target_rectangle": [target.left, target.top, target.right, target.bottom],
        "aspect_wide": renderer.aspect_wide(),
    }))
}

// ---------------------------------------------------------------------------
// rect
// ---------------------------------------------------------------------------

pub fn rect(width: u32, height: u32, aspect: AspectArg, wide: bool, crop: bool) -> Value {
    let config = VideoConfig {
        aspect_mode: aspect.into(),
        crop,
        ..Default::default()
    };
    let geometry = DisplayGeometry::new(&config, wide, 4.0 / 3.0, (width, height));
    let target = geometry.target_rectangle();
    let (out_w, out_h) = geometry.output_dimensions(XFB_WIDTH as i32, XFB_HEIGHT as i32);
    json!({
        "window": [width, height],
        "draw_aspect_ratio": geometry.draw_aspect_ratio(),
        "target_rectangle": [target.left, target.top, target.right, target.bottom],
        "target_size": [target.width(), target.height()],
        "output_dimensions": [out_w, out_h],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_centres_4_3_in_wide_window() {
        let report = rect(1920, 1080, AspectArg::Analog, false, false);
        let target = report["target_rectangle"].as_array().unwrap();
        let left = target[0].as_i64().unwrap();
        let right = target[2].as_i64().unwrap();
        assert!(left > 0);
        assert_eq!(left % 4, 0);
        assert_eq!(1920 - right, left);
    }

    #[test]
    fn null_replay_presents_every_frame() {
        let options = ReplayOptions {
            frames: 3,
            backend: BackendKind::Null,
            dump: None,
            screenshot: None,
            size: (320, 240),
            config: None,
        };
        let mut seen = Vec::new();
        let report = replay(&options, |f| seen.push(f)).unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(report["frames_presented"], 3);
        assert_eq!(report["swaps_skipped"], 1);
    }

    #[test]
    fn shaders_are_written_per_api() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_shaders(ShaderApi::Wgsl, dir.path()).unwrap();
        assert!(written > 10);
        assert!(dir.path().join("tev_sample.ps.wgsl").exists());
        assert!(!dir.path().join("stereo_passthrough.gs.wgsl").exists());
    }
}
