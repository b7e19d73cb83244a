//! The renderer.
//!
//! One [`Renderer`] exists per emulated GPU and lives on the video thread.
//! It owns the backend together with the vertex manager, the shader cache
//! and the frame dump worker, forwards decoder state changes to the backend,
//! and turns each VI swap into a presented frame.
//!
//! Other threads talk to it only through handles: [`SurfaceHandle`] for
//! window changes, [`OverlayHandle`] for on-screen messages,
//! [`ScreenshotHandle`] for screenshots and frame dumping, the shared
//! [`SharedConfig`] for settings and the frame counter.

mod bbox;
mod dump;
pub mod geometry;

pub use bbox::{BoundingBox, NUM_BBOX_VALUES};
pub use geometry::{
    aspect_to_widescreen, calculate_target_scale, convert_stereo_rectangle, DisplayGeometry,
};

use crate::backend::{Backend, StreamBufferSizes, SurfaceRequest, SurfaceTarget};
use crate::config::{AspectMode, ConfigChangeBits, SharedConfig, StereoMode, VideoConfig};
use crate::error::Result;
use crate::frame_dump::{DumpSettings, FrameDumper, FrameState, ScreenshotHandle};
use crate::framebuffer::AbstractFramebuffer;
use crate::host::{FixedAnswer, FixedVideoInterface, FrameDumpPrompt, HeadlessHost, Host};
use crate::host::{SystemInfo, TextureCacheHooks, VideoInterface, XfbEntry};
use crate::index_generator::GxPrimitive;
use crate::math::{EfbRectangle, TargetRectangle, EFB_HEIGHT, EFB_WIDTH};
use crate::math::{MAX_XFB_HEIGHT, MAX_XFB_WIDTH};
use crate::overlay::{duration, OverlayHandle};
use crate::pipeline::{AbstractPipeline, AbstractPipelineConfig, AbstractShader, ShaderStage};
use crate::render_state::{ClearColor, FramebufferState, SamplerState, Viewport, CLEAR_BLACK};
use crate::shader_cache::{GxPipelineUid, ShaderCache, UtilityPipeline};
use crate::shader_gen::{GxUniforms, ShaderHostConfig};
use crate::stats::{FrameTimer, Statistics};
use crate::texture::{
    AbstractStagingTexture, AbstractTexture, AbstractTextureFormat, StagingTextureType,
    TextureConfig, TextureId,
};
use crate::vertex_manager::{ProjectionAspect, TexelBufferFormat, VertexManager};
use bytemuck::{Pod, Zeroable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Share of flushes that must contradict the current widescreen
/// classification before it flips.
const ASPECT_FLIP_THRESHOLD: f32 = 0.75;

const OVERLAY_LINE_HEIGHT: f32 = 16.0;
const OVERLAY_PADDING: f32 = 4.0;
const OVERLAY_WIDTH: f32 = 360.0;
const OVERLAY_BACKGROUND: [u8; 4] = [0, 0, 0, 160];

/// Vertex layout of the overlay pipeline (position, color, one texcoord).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OverlayVertex {
    position: [f32; 4],
    color: [u8; 4],
    texcoord: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OverlayUniforms {
    rcp_viewport_size_mul2: [f32; 2],
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ClearUniforms {
    clear_color: [f32; 4],
    clear_depth: f32,
    _pad: [f32; 3],
}

/// Subsystems the renderer calls out to.
pub struct Collaborators {
    pub texture_cache: Box<dyn TextureCacheHooks>,
    pub host: Arc<dyn Host>,
    pub video_interface: Box<dyn VideoInterface>,
    pub system: SystemInfo,
    pub frame_dump_prompt: Arc<dyn FrameDumpPrompt>,
}

impl Collaborators {
    /// No window, NTSC timing, a GameCube, and frame dumps that never
    /// overwrite existing images.
    pub fn headless(texture_cache: Box<dyn TextureCacheHooks>) -> Self {
        Self {
            texture_cache,
            host: Arc::new(HeadlessHost::new()),
            video_interface: Box::new(FixedVideoInterface::ntsc()),
            system: SystemInfo::default(),
            frame_dump_prompt: Arc::new(FixedAnswer(false)),
        }
    }
}

#[derive(Debug, Default)]
struct PendingSurface {
    new_surface: Option<SurfaceRequest>,
    resize: Option<(u32, u32)>,
}

/// Host-thread access to the presentation surface.
///
/// Requests are picked up the next time the renderer binds the backbuffer.
/// The lock is also held around every present, so a surface is never
/// replaced mid-present.
#[derive(Debug, Clone, Default)]
pub struct SurfaceHandle(Arc<Mutex<PendingSurface>>);

impl SurfaceHandle {
    fn lock(&self) -> MutexGuard<'_, PendingSurface> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replaces the window surface. Supersedes any pending resize.
    pub fn change_surface(&self, request: SurfaceRequest) {
        log::info!(
            "Surface change requested: {:?} {}x{}",
            request.target,
            request.width,
            request.height
        );
        let mut pending = self.lock();
        pending.new_surface = Some(request);
        pending.resize = None;
    }

    pub fn resize_surface(&self, width: u32, height: u32) {
        log::debug!("Surface resize requested: {width}x{height}");
        self.lock().resize = Some((width, height));
    }

    pub fn has_pending_change(&self) -> bool {
        let pending = self.lock();
        pending.new_surface.is_some() || pending.resize.is_some()
    }
}

fn logged<T>(what: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        log::error!("Failed to create {what}: {e}");
    }
    result
}

pub struct Renderer {
    backend: Backend,
    shared_config: SharedConfig,
    /// Settings in effect for the current frame.
    config: VideoConfig,
    vertex_manager: VertexManager,
    shader_cache: ShaderCache,
    stats: Statistics,
    frame_timer: FrameTimer,

    texture_cache: Box<dyn TextureCacheHooks>,
    host: Arc<dyn Host>,
    video_interface: Box<dyn VideoInterface>,
    system: SystemInfo,
    overlay: OverlayHandle,
    surface: SurfaceHandle,

    frame_dumper: FrameDumper,
    frame_dump_render_texture: Option<AbstractTexture>,
    /// `[0]` receives the frame being dumped, `[1]` the previous one.
    frame_dump_readback: [Option<AbstractStagingTexture>; 2],
    last_frame_state: FrameState,
    last_frame_exported: bool,

    frame_count: Arc<AtomicU64>,

    backbuffer_width: u32,
    backbuffer_height: u32,
    target_rectangle: TargetRectangle,
    target_width: u32,
    target_height: u32,
    efb_scale: u32,
    aspect_wide: bool,
    aspect_ratio_hack: (f32, f32),
    last_refresh_rate: f32,
    fullscreen: bool,
    last_window_request: (i32, i32),
    headless: bool,

    last_xfb_texture: Option<Arc<AbstractTexture>>,
    last_xfb_id: Option<u64>,
    last_xfb_ticks: u64,
    last_xfb_region: EfbRectangle,
    last_xfb_width: u32,
    last_xfb_height: u32,

    current_framebuffer: Option<Arc<AbstractFramebuffer>>,
    current_viewport: Viewport,
    current_scissor: EfbRectangle,
    bbox: BoundingBox,
    white_texture: Option<Arc<AbstractTexture>>,
}

impl Renderer {
    pub fn new(mut backend: Backend, config: SharedConfig, collab: Collaborators) -> Result<Self> {
        let active = config.snapshot();
        let mut vertex_manager =
            VertexManager::new(StreamBufferSizes::default(), collab.system.is_wii);
        vertex_manager.initialize(&mut *backend)?;
        backend.set_vsync(active.vsync);
        let shader_cache = ShaderCache::new(backend.info(), &active);

        let overlay = OverlayHandle::new();
        let mut frame_dumper =
            FrameDumper::new(overlay.clone(), Arc::clone(&collab.frame_dump_prompt));
        frame_dumper.set_settings(DumpSettings::from_config(&active));

        let (backbuffer_width, backbuffer_height) = backend.backbuffer_size();
        let last_refresh_rate = collab.video_interface.target_refresh_rate();
        let aspect_wide = collab.system.is_wii && collab.system.wii_widescreen;

        let mut renderer = Self {
            backend,
            shared_config: config,
            config: active,
            vertex_manager,
            shader_cache,
            stats: Statistics::new(),
            frame_timer: FrameTimer::default(),
            texture_cache: collab.texture_cache,
            host: collab.host,
            video_interface: collab.video_interface,
            system: collab.system,
            overlay,
            surface: SurfaceHandle::default(),
            frame_dumper,
            frame_dump_render_texture: None,
            frame_dump_readback: [None, None],
            last_frame_state: FrameState::default(),
            last_frame_exported: false,
            frame_count: Arc::new(AtomicU64::new(0)),
            backbuffer_width,
            backbuffer_height,
            target_rectangle: TargetRectangle::default(),
            target_width: EFB_WIDTH,
            target_height: EFB_HEIGHT,
            efb_scale: 1,
            aspect_wide,
            aspect_ratio_hack: (1.0, 1.0),
            last_refresh_rate,
            fullscreen: false,
            last_window_request: (0, 0),
            headless: true,
            last_xfb_texture: None,
            last_xfb_id: None,
            last_xfb_ticks: 0,
            last_xfb_region: EfbRectangle::default(),
            last_xfb_width: MAX_XFB_WIDTH,
            last_xfb_height: MAX_XFB_HEIGHT,
            current_framebuffer: None,
            current_viewport: Viewport::default(),
            current_scissor: EfbRectangle::with_size(EFB_WIDTH as i32, EFB_HEIGHT as i32),
            bbox: BoundingBox::new(),
            white_texture: None,
        };
        renderer.update_draw_rectangle();
        renderer.calculate_target_size();
        log::info!(
            "Renderer created: backbuffer {}x{}, EFB {}x{}",
            renderer.backbuffer_width,
            renderer.backbuffer_height,
            renderer.target_width,
            renderer.target_height
        );
        Ok(renderer)
    }

    // -- Accessors --

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    /// Settings in effect for the current frame.
    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }

    pub fn overlay(&self) -> OverlayHandle {
        self.overlay.clone()
    }

    pub fn surface_handle(&self) -> SurfaceHandle {
        self.surface.clone()
    }

    pub fn screenshot_handle(&self) -> ScreenshotHandle {
        self.frame_dumper.screenshot_handle()
    }

    /// Counter of presented frames, readable from any thread.
    pub fn frame_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frame_count)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Acquire)
    }

    pub fn backbuffer_size(&self) -> (u32, u32) {
        (self.backbuffer_width, self.backbuffer_height)
    }

    pub fn target_rectangle(&self) -> TargetRectangle {
        self.target_rectangle
    }

    /// Size of the EFB at the current internal resolution.
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn efb_scale(&self) -> u32 {
        self.efb_scale
    }

    pub fn aspect_wide(&self) -> bool {
        self.aspect_wide
    }

    pub fn aspect_ratio_hack(&self) -> (f32, f32) {
        self.aspect_ratio_hack
    }

    /// Part of the last presented XFB texture that holds the picture.
    pub fn last_xfb_region(&self) -> EfbRectangle {
        self.last_xfb_region
    }

    pub fn last_xfb_size(&self) -> (u32, u32) {
        (self.last_xfb_width, self.last_xfb_height)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    /// True while no window surface is attached.
    pub fn is_headless(&self) -> bool {
        self.headless
    }

    pub fn current_framebuffer(&self) -> Option<&Arc<AbstractFramebuffer>> {
        self.current_framebuffer.as_ref()
    }

    // -- Scaling --

    pub fn efb_to_scaled_x(&self, x: i32) -> i32 {
        x * self.efb_scale as i32
    }

    pub fn efb_to_scaled_y(&self, y: i32) -> i32 {
        y * self.efb_scale as i32
    }

    pub fn efb_to_scaled_xf(&self, x: f32) -> f32 {
        x * self.target_width as f32 / EFB_WIDTH as f32
    }

    pub fn efb_to_scaled_yf(&self, y: f32) -> f32 {
        y * self.target_height as f32 / EFB_HEIGHT as f32
    }

    /// `rc` in EFB coordinates scaled to the internal resolution.
    pub fn convert_efb_rectangle(&self, rc: &EfbRectangle) -> TargetRectangle {
        TargetRectangle::new(
            self.efb_to_scaled_x(rc.left),
            self.efb_to_scaled_y(rc.top),
            self.efb_to_scaled_x(rc.right),
            self.efb_to_scaled_y(rc.bottom),
        )
    }

    /// Recomputes the EFB scale. Returns true when the EFB size changed.
    pub fn calculate_target_size(&mut self) -> bool {
        let scale = calculate_target_scale(
            self.config.efb_scale,
            &self.target_rectangle,
            (self.last_xfb_width, self.last_xfb_height),
            self.backend.info().max_texture_size,
        );
        self.efb_scale = scale;

        let (width, height) = (EFB_WIDTH * scale, EFB_HEIGHT * scale);
        if (width, height) == (self.target_width, self.target_height) {
            return false;
        }
        log::info!("EFB size changed to {width}x{height} ({scale}x native)");
        self.target_width = width;
        self.target_height = height;
        true
    }

    // -- Display geometry --

    pub fn display_geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new(
            &self.config,
            self.aspect_wide,
            self.video_interface.aspect_ratio(),
            (self.backbuffer_width, self.backbuffer_height),
        )
    }

    pub fn calculate_draw_aspect_ratio(&self) -> f32 {
        self.display_geometry().draw_aspect_ratio()
    }

    pub fn scale_to_display_aspect_ratio(&self, width: i32, height: i32) -> (f32, f32) {
        self.display_geometry()
            .scale_to_display_aspect_ratio(width, height)
    }

    pub fn calculate_output_dimensions(&self, width: i32, height: i32) -> (i32, i32) {
        self.display_geometry().output_dimensions(width, height)
    }

    pub fn update_draw_rectangle(&mut self) {
        let geometry = self.display_geometry();
        self.aspect_ratio_hack = geometry.aspect_ratio_hack();
        self.target_rectangle = geometry.target_rectangle();
    }

    /// Asks the host for a window that fits a `width` x `height` XFB.
    pub fn set_window_size(&mut self, width: i32, height: i32) {
        let request = self.calculate_output_dimensions(width, height);
        if request == self.last_window_request {
            return;
        }
        self.last_window_request = request;
        if !self.fullscreen {
            self.host.request_render_window_size(request.0, request.1);
        }
    }

    pub fn set_fullscreen(&mut self, enable: bool) {
        if enable == self.fullscreen {
            return;
        }
        let refresh_rate = if self.config.sync_refresh_rate {
            self.last_refresh_rate
        } else {
            0.0
        };
        self.change_fullscreen_state(enable, refresh_rate);
    }

    pub fn change_fullscreen_state(&mut self, enable: bool, refresh_rate: f32) {
        log::info!("Fullscreen {} ({refresh_rate} Hz)", if enable { "on" } else { "off" });
        self.fullscreen = enable;
        self.host.request_fullscreen(enable, refresh_rate);
    }

    // -- Resources --

    pub fn create_texture(&mut self, config: &TextureConfig) -> Result<AbstractTexture> {
        let texture = logged("texture", self.backend.create_texture(config))?;
        self.stats.this_frame.num_textures_created += 1;
        Ok(texture)
    }

    pub fn create_staging_texture(
        &mut self,
        ty: StagingTextureType,
        config: &TextureConfig,
    ) -> Result<AbstractStagingTexture> {
        logged(
            "staging texture",
            self.backend.create_staging_texture(ty, config),
        )
    }

    pub fn create_framebuffer(
        &mut self,
        color: Option<Arc<AbstractTexture>>,
        depth: Option<Arc<AbstractTexture>>,
    ) -> Result<AbstractFramebuffer> {
        logged("framebuffer", self.backend.create_framebuffer(color, depth))
    }

    pub fn create_shader_from_source(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<AbstractShader> {
        let shader = logged(
            "shader",
            self.backend.create_shader_from_source(stage, source),
        )?;
        self.stats.this_frame.num_shaders_created += 1;
        Ok(shader)
    }

    pub fn create_pipeline(&mut self, config: &AbstractPipelineConfig) -> Result<AbstractPipeline> {
        let pipeline = logged("pipeline", self.backend.create_pipeline(config))?;
        self.stats.this_frame.num_pipelines_created += 1;
        Ok(pipeline)
    }

    // -- State --

    pub fn set_pipeline(&mut self, pipeline: Option<&Arc<AbstractPipeline>>) {
        self.backend.set_pipeline(pipeline);
    }

    /// Binds `framebuffer`, first removing its attachments from every
    /// texture unit. Rebinding the current framebuffer does nothing.
    pub fn set_framebuffer(&mut self, framebuffer: &Arc<AbstractFramebuffer>) {
        if let Some(current) = &self.current_framebuffer {
            if Arc::ptr_eq(current, framebuffer) {
                return;
            }
        }
        for attachment in [framebuffer.color_attachment(), framebuffer.depth_attachment()]
            .into_iter()
            .flatten()
        {
            self.backend.unbind_texture(attachment.id());
        }
        self.backend.set_framebuffer(framebuffer);
        self.current_framebuffer = Some(Arc::clone(framebuffer));
    }

    /// Binds `framebuffer` without preserving its contents.
    pub fn set_and_discard_framebuffer(&mut self, framebuffer: &Arc<AbstractFramebuffer>) {
        self.set_framebuffer(framebuffer);
    }

    pub fn set_and_clear_framebuffer(
        &mut self,
        framebuffer: &Arc<AbstractFramebuffer>,
        color: ClearColor,
        depth: f32,
    ) {
        self.set_framebuffer(framebuffer);
        self.backend.clear_framebuffer(Some(color), Some(depth));
    }

    /// Sets the scissor, widening empty rectangles to one pixel.
    pub fn set_scissor_rect(&mut self, rect: &EfbRectangle) {
        let mut rect = *rect;
        rect.right = rect.right.max(rect.left + 1);
        rect.bottom = rect.bottom.max(rect.top + 1);
        self.current_scissor = rect;
        self.backend.set_scissor_rect(&rect);
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) {
        self.current_viewport = *viewport;
        self.backend.set_viewport(viewport);
    }

    pub fn set_texture(&mut self, index: u32, texture: Option<&Arc<AbstractTexture>>) {
        self.backend.set_texture(index, texture);
    }

    pub fn set_sampler_state(&mut self, index: u32, state: &SamplerState) {
        self.backend.set_sampler_state(index, state);
    }

    pub fn unbind_texture(&mut self, texture: TextureId) {
        self.backend.unbind_texture(texture);
    }

    pub fn draw(&mut self, base_vertex: u32, num_vertices: u32) {
        self.backend.draw(base_vertex, num_vertices);
    }

    pub fn draw_indexed(&mut self, base_index: u32, num_indices: u32, base_vertex: u32) {
        self.backend.draw_indexed(base_index, num_indices, base_vertex);
    }

    /// Binds and clears the backbuffer, applying any surface change or
    /// resize the host requested since the last frame.
    pub fn bind_backbuffer(&mut self, clear_color: ClearColor) {
        let mut resized = false;
        {
            let mut pending = self.surface.lock();
            if let Some(request) = pending.new_surface.take() {
                self.headless = matches!(request.target, SurfaceTarget::Headless);
                let (w, h) = self.backend.change_surface(request);
                self.backbuffer_width = w;
                self.backbuffer_height = h;
                resized = true;
            }
            if let Some((width, height)) = pending.resize.take() {
                let (w, h) = self.backend.resize_surface(width, height);
                self.backbuffer_width = w;
                self.backbuffer_height = h;
                resized = true;
            }
        }
        if resized {
            log::info!(
                "Backbuffer is now {}x{}",
                self.backbuffer_width,
                self.backbuffer_height
            );
            self.update_draw_rectangle();
        }

        self.backend.bind_backbuffer(clear_color);
        self.current_framebuffer = None;
    }

    pub fn present_backbuffer(&mut self) {
        let _swap = self.surface.lock();
        self.backend.present();
    }

    // -- Decoder-facing batching --

    pub fn submit_vertices(&mut self, primitive: GxPrimitive, vertices: &[u8], num_vertices: u32) {
        self.vertex_manager.add_vertices(
            &mut *self.backend,
            &mut self.shader_cache,
            &mut self.stats,
            primitive,
            vertices,
            num_vertices,
        );
    }

    /// Switches the GX pipeline, drawing the pending batch first when it
    /// changes.
    pub fn set_gx_pipeline(&mut self, uid: GxPipelineUid) {
        if *self.vertex_manager.pipeline_uid() != uid {
            self.flush_vertices();
        }
        self.vertex_manager.set_pipeline_uid(uid);
    }

    pub fn uniforms_mut(&mut self) -> &mut GxUniforms {
        self.vertex_manager.uniforms_mut()
    }

    /// Loads the GX projection matrix, scaled by the widescreen hack factors.
    pub fn set_projection(&mut self, aspect: ProjectionAspect, mut matrix: [[f32; 4]; 4]) {
        let (hack_w, hack_h) = self.aspect_ratio_hack;
        matrix[0][0] *= hack_w;
        matrix[1][1] *= hack_h;
        self.vertex_manager.set_projection_aspect(aspect);
        self.vertex_manager.uniforms_mut().projection = matrix;
    }

    pub fn flush_vertices(&mut self) {
        self.vertex_manager
            .flush(&mut *self.backend, &mut self.shader_cache, &mut self.stats);
    }

    pub fn upload_texel_buffer(&mut self, data: &[u8], format: TexelBufferFormat) -> Option<u32> {
        let offset = self
            .vertex_manager
            .upload_texel_buffer(&mut *self.backend, data, format)?;
        self.stats.this_frame.bytes_texel_streamed += data.len() as u64;
        Some(offset)
    }

    pub fn upload_texel_buffer_with_palette(
        &mut self,
        data: &[u8],
        format: TexelBufferFormat,
        palette: &[u8],
        palette_format: TexelBufferFormat,
    ) -> Option<(u32, u32)> {
        let offsets = self.vertex_manager.upload_texel_buffer_with_palette(
            &mut *self.backend,
            data,
            format,
            palette,
            palette_format,
        )?;
        self.stats.this_frame.bytes_texel_streamed += (data.len() + palette.len()) as u64;
        Some(offsets)
    }

    // -- Bounding box --

    pub fn bbox_read(&self, index: usize) -> u16 {
        self.bbox.read(index, self.target_width, self.target_height)
    }

    pub fn bbox_write(&mut self, index: usize, value: u16) {
        self.bbox
            .write(index, value, self.target_width, self.target_height);
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    // -- EFB clears --

    /// Clears `rc` (native EFB coordinates) of the bound framebuffer.
    ///
    /// Drawn as a quad so color, alpha and depth can be masked separately.
    /// `color` is ARGB8 and `z` a 24-bit depth value.
    #[allow(clippy::too_many_arguments)]
    pub fn clear_screen(
        &mut self,
        rc: &EfbRectangle,
        color_enable: bool,
        alpha_enable: bool,
        z_enable: bool,
        color: u32,
        z: u32,
    ) {
        self.flush_vertices();
        let Some(framebuffer) = self.current_framebuffer.clone() else {
            log::warn!("EFB clear with no framebuffer bound");
            return;
        };

        let state = FramebufferState {
            color_format: framebuffer.color_format(),
            depth_format: framebuffer.depth_format(),
            samples: framebuffer.samples(),
            per_sample_shading: false,
        };
        let kind = UtilityPipeline::Clear {
            color: color_enable,
            alpha: alpha_enable,
            depth: z_enable,
        };
        let Some(pipeline) = self.shader_cache.get_utility_pipeline(
            &mut *self.backend,
            kind,
            state,
            &mut self.stats,
        ) else {
            return;
        };

        let channel = |shift: u32| ((color >> shift) & 0xFF) as f32 / 255.0;
        let uniforms = ClearUniforms {
            clear_color: [channel(16), channel(8), channel(0), channel(24)],
            clear_depth: (z & 0xFF_FFFF) as f32 / 16_777_216.0,
            _pad: [0.0; 3],
        };
        self.vertex_manager
            .upload_utility_uniforms(&mut *self.backend, bytemuck::bytes_of(&uniforms));

        let target = self.convert_efb_rectangle(rc);
        self.backend.set_pipeline(Some(&pipeline));
        self.backend.set_viewport(&Viewport::new(
            target.left as f32,
            target.top as f32,
            target.width() as f32,
            target.height() as f32,
            0.0,
            1.0,
        ));
        self.backend.set_scissor_rect(&target);
        self.backend.draw(0, 3);

        self.backend.set_viewport(&self.current_viewport);
        self.backend.set_scissor_rect(&self.current_scissor);
        self.vertex_manager.invalidate_pipeline_object();
    }

    // -- Swap --

    /// Draws the pending batch and submits recorded work.
    pub fn flush(&mut self) {
        self.flush_vertices();
        self.backend.flush();
    }

    fn update_widescreen_heuristic(&mut self) {
        let (flushes_4_3, flushes_anamorphic) =
            self.vertex_manager.reset_flush_aspect_ratio_count();

        let suggested = self.config.suggested_aspect_mode;
        if matches!(suggested, AspectMode::Analog | AspectMode::AnalogWide) {
            self.aspect_wide = suggested == AspectMode::AnalogWide;
        } else if self.system.is_wii {
            self.aspect_wide = self.system.wii_widescreen;
        } else {
            let total = (flushes_4_3 + flushes_anamorphic) as f32;
            self.aspect_wide = if self.aspect_wide {
                flushes_4_3 as f32 <= ASPECT_FLIP_THRESHOLD * total
            } else {
                flushes_anamorphic as f32 > ASPECT_FLIP_THRESHOLD * total
            };
        }
    }

    /// Ends the emulated frame and presents the XFB at `xfb_addr`.
    ///
    /// A swap whose XFB is unchanged since the last present, or that has a
    /// zero address or dimension, only flushes.
    pub fn swap(
        &mut self,
        xfb_addr: u32,
        fb_width: u32,
        fb_stride: u32,
        fb_height: u32,
        ticks: u64,
    ) {
        self.update_widescreen_heuristic();
        self.flush_frame_dump();

        let refresh_rate = self.video_interface.target_refresh_rate();
        if refresh_rate != self.last_refresh_rate {
            self.last_refresh_rate = refresh_rate;
            if self.fullscreen && self.config.sync_refresh_rate {
                self.change_fullscreen_state(true, refresh_rate);
            }
        }

        if xfb_addr == 0 || fb_width == 0 || fb_stride == 0 || fb_height == 0 {
            self.stats.num_swaps_skipped += 1;
            self.flush();
            return;
        }

        let entry = self.texture_cache.get_xfb_texture(
            &mut *self.backend,
            xfb_addr,
            fb_stride,
            fb_height,
            false,
        );
        match entry {
            Some(entry) if self.last_xfb_id != Some(entry.id) => {
                self.present_xfb(entry, fb_width, fb_stride, ticks);
            }
            _ => {
                log::debug!("Skipping present of unchanged XFB at {xfb_addr:#010x}");
                self.stats.num_swaps_skipped += 1;
                self.flush();
            }
        }

        self.last_xfb_width = if fb_stride > MAX_XFB_WIDTH {
            MAX_XFB_WIDTH
        } else {
            fb_stride
        };
        self.last_xfb_height = if fb_height > MAX_XFB_HEIGHT {
            MAX_XFB_HEIGHT
        } else {
            fb_height
        };
    }

    fn present_xfb(&mut self, entry: XfbEntry, fb_width: u32, fb_stride: u32, ticks: u64) {
        let texture = entry.texture;
        let texture_config = *texture.config();

        // The stride may include padding past the visible width.
        let padding = fb_stride.saturating_sub(fb_width) as i32;
        let mut xfb_rect = texture_config.rect();
        xfb_rect.right -= if texture_config.width == entry.native_width {
            padding
        } else {
            self.efb_to_scaled_x(padding)
        };

        self.last_xfb_texture = Some(Arc::clone(&texture));
        self.last_xfb_id = Some(entry.id);
        self.last_xfb_ticks = ticks;
        self.last_xfb_region = xfb_rect;

        self.flush_vertices();
        self.backend.reset_api_state();
        self.bind_backbuffer(CLEAR_BLACK);
        self.update_draw_rectangle();
        self.render_xfb_to_screen(&texture, &xfb_rect);
        self.draw_debug_text();
        {
            let _swap = self.surface.lock();
            self.backend.present();
        }
        self.stats.num_frames_presented += 1;

        self.set_window_size(texture_config.width as i32, texture_config.height as i32);
        self.frame_timer.mark_present();

        if self.frame_dumper.is_frame_dumping() {
            self.dump_current_frame();
        }

        let frame = self.frame_count.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.reset_frame();
        self.vertex_manager.invalidate_pipeline_object();
        self.texture_cache.flush_efb_copies();
        self.texture_cache.cleanup(frame);
        self.check_for_config_changes();
        self.backend.restore_api_state();
    }

    fn render_xfb_to_screen(&mut self, texture: &AbstractTexture, xfb_rect: &EfbRectangle) {
        let target = self.target_rectangle;
        if self.config.stereo_mode == StereoMode::Off {
            self.backend.blit_texture(&target, texture, xfb_rect, 0);
            return;
        }

        let (left, right) = convert_stereo_rectangle(
            self.config.stereo_mode,
            &target,
            self.backbuffer_width,
            self.backbuffer_height,
        );
        let right_layer = texture.config().layers.saturating_sub(1).min(1);
        self.backend.blit_texture(&left, texture, xfb_rect, 0);
        self.backend.blit_texture(&right, texture, xfb_rect, right_layer);
    }

    fn draw_debug_text(&mut self) {
        let overlay = self.overlay.clone();
        let mut messages = overlay.lock();

        let mut lines = Vec::new();
        if self.config.show_fps {
            let worst = self.frame_timer.worst_interval().unwrap_or_default();
            lines.push(format!(
                "FPS: {:.0} (worst {:.1} ms)",
                self.frame_timer.fps(),
                worst.as_secs_f32() * 1000.0
            ));
        }
        if self.config.show_frame_count {
            lines.push(format!("Frame: {}", self.frame_count()));
        }
        if self.config.overlay_stats {
            lines.extend(self.stats.overlay_lines());
        }
        lines.extend(messages.active_messages(Instant::now()));

        if !lines.is_empty() {
            self.draw_overlay_background(lines.len());
            self.backend.draw_overlay(&lines);
        }
    }

    fn white_texture(&mut self) -> Option<Arc<AbstractTexture>> {
        if self.white_texture.is_none() {
            let texture = self
                .create_texture(&TextureConfig::simple(1, 1, AbstractTextureFormat::RGBA8))
                .ok()?;
            texture.load(0, 1, 1, 1, &[0xFF; 4]);
            self.white_texture = Some(Arc::new(texture));
        }
        self.white_texture.clone()
    }

    /// Dims the top-left corner behind `num_lines` of overlay text.
    fn draw_overlay_background(&mut self, num_lines: usize) {
        let Some(white) = self.white_texture() else {
            return;
        };
        let Some(pipeline) = self.shader_cache.get_utility_pipeline(
            &mut *self.backend,
            UtilityPipeline::Overlay,
            FramebufferState::default(),
            &mut self.stats,
        ) else {
            return;
        };

        let (width, height) = (
            self.backbuffer_width.max(1) as f32,
            self.backbuffer_height.max(1) as f32,
        );
        let right = OVERLAY_WIDTH.min(width);
        let bottom = (num_lines as f32 * OVERLAY_LINE_HEIGHT + 2.0 * OVERLAY_PADDING).min(height);
        let vertex = |x: f32, y: f32| OverlayVertex {
            position: [x, y, 0.0, 1.0],
            color: OVERLAY_BACKGROUND,
            texcoord: [0.0; 3],
        };
        let vertices = [
            vertex(0.0, 0.0),
            vertex(right, 0.0),
            vertex(0.0, bottom),
            vertex(right, bottom),
        ];
        let indices: [u16; 6] = [0, 1, 2, 1, 3, 2];

        let (base_vertex, base_index) = self.vertex_manager.upload_utility_vertices(
            &mut *self.backend,
            bytemuck::cast_slice(&vertices),
            std::mem::size_of::<OverlayVertex>() as u32,
            vertices.len() as u32,
            &indices,
        );
        let uniforms = OverlayUniforms {
            rcp_viewport_size_mul2: [2.0 / width, 2.0 / height],
            _pad: [0.0; 2],
        };
        self.vertex_manager
            .upload_utility_uniforms(&mut *self.backend, bytemuck::bytes_of(&uniforms));

        self.backend.set_pipeline(Some(&pipeline));
        self.backend.set_texture(0, Some(&white));
        self.backend.set_sampler_state(0, &SamplerState::point());
        self.backend
            .set_viewport(&Viewport::new(0.0, 0.0, width, height, 0.0, 1.0));
        self.backend.set_scissor_rect(&EfbRectangle::with_size(
            self.backbuffer_width as i32,
            self.backbuffer_height as i32,
        ));
        self.backend
            .draw_indexed(base_index, indices.len() as u32, base_vertex);
    }

    // -- Configuration --

    /// Applies settings changed by the host since the last frame.
    pub fn check_for_config_changes(&mut self) {
        let old_host = ShaderHostConfig::from_config(&self.config, self.backend.info());
        let old = std::mem::replace(&mut self.config, self.shared_config.snapshot());
        self.texture_cache.on_config_changed(&self.config);
        self.frame_dumper
            .set_settings(DumpSettings::from_config(&self.config));
        let new_host = ShaderHostConfig::from_config(&self.config, self.backend.info());

        let mut bits = ConfigChangeBits::empty();
        bits.set(ConfigChangeBits::HOST_CONFIG, old_host != new_host);
        bits.set(
            ConfigChangeBits::STEREO_MODE,
            old.stereo_mode != self.config.stereo_mode,
        );
        bits.set(
            ConfigChangeBits::MULTISAMPLES,
            old.multisamples != self.config.multisamples,
        );
        bits.set(
            ConfigChangeBits::ANISOTROPY,
            old.max_anisotropy != self.config.max_anisotropy,
        );
        bits.set(
            ConfigChangeBits::FORCE_TEXTURE_FILTERING,
            old.force_filtering != self.config.force_filtering,
        );
        bits.set(ConfigChangeBits::VSYNC, old.vsync != self.config.vsync);
        bits.set(
            ConfigChangeBits::BBOX,
            old.bbox_enable != self.config.bbox_enable,
        );
        if self.calculate_target_size() {
            bits |= ConfigChangeBits::TARGET_SIZE;
        }

        if bits.is_empty() {
            return;
        }
        log::debug!("Video config changed: {bits:?}");
        self.backend.on_config_changed(bits);
        if bits.contains(ConfigChangeBits::VSYNC) {
            self.backend.set_vsync(self.config.vsync);
        }

        if bits.intersects(ConfigChangeBits::HOST_CONFIG | ConfigChangeBits::MULTISAMPLES) {
            self.overlay
                .add_message("Video config changed, reloading shaders.", duration::NORMAL);
            self.backend.set_pipeline(None);
            self.vertex_manager.invalidate_pipeline_object();
            self.shader_cache
                .set_host_config(new_host, self.config.multisamples);
        }
    }

    /// Stops frame dumping and leaves fullscreen.
    pub fn shutdown(&mut self) {
        self.shutdown_frame_dumping();
        if self.fullscreen {
            self.backend.wait_for_gpu_idle();
            self.change_fullscreen_state(false, 0.0);
        }
        log::info!("Renderer shut down after {} frames", self.frame_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::host::XfbTextureCache;

    fn renderer_with(config: VideoConfig, system: SystemInfo) -> (Renderer, XfbTextureCache) {
        let cache = XfbTextureCache::new();
        let backend = Backend::create(BackendKind::Null, 640, 480).unwrap();
        let collab = Collaborators {
            system,
            ..Collaborators::headless(Box::new(cache.clone()))
        };
        let renderer = Renderer::new(backend, SharedConfig::new(config), collab).unwrap();
        (renderer, cache)
    }

    fn renderer() -> Renderer {
        renderer_with(VideoConfig::default(), SystemInfo::default()).0
    }

    #[test]
    fn binding_framebuffer_unbinds_sampled_attachment() {
        let mut r = renderer();
        let config = TextureConfig::render_target(32, 32, AbstractTextureFormat::RGBA8);
        let color = Arc::new(r.create_texture(&config).unwrap());
        let other = Arc::new(
            r.create_texture(&TextureConfig::simple(4, 4, AbstractTextureFormat::RGBA8))
                .unwrap(),
        );
        r.set_texture(0, Some(&color));
        r.set_texture(1, Some(&other));
        r.set_texture(2, Some(&color));

        let fb = Arc::new(r.create_framebuffer(Some(color.clone()), None).unwrap());
        r.set_framebuffer(&fb);

        let null = r.backend().as_null().unwrap();
        assert!(null.bound_texture(0).is_none());
        assert!(null.bound_texture(2).is_none());
        assert_eq!(null.bound_texture(1).map(|t| t.id()), Some(other.id()));
    }

    #[test]
    fn scissor_is_never_empty() {
        let mut r = renderer();
        r.set_scissor_rect(&EfbRectangle::new(10, 20, 10, 5));
        let null = r.backend().as_null().unwrap();
        assert_eq!(null.scissor_rect(), EfbRectangle::new(10, 20, 11, 21));
    }

    #[test]
    fn bbox_uses_target_resolution() {
        let config = VideoConfig {
            efb_scale: crate::config::EfbScale::Fixed(2),
            ..Default::default()
        };
        let (mut r, _) = renderer_with(config, SystemInfo::default());
        assert_eq!(r.target_size(), (1280, 1056));
        r.bbox_write(1, 100);
        assert_eq!(r.bbox().raw()[1], 200);
        assert_eq!(r.bbox_read(1), 101);
    }

    #[test]
    fn wii_follows_system_widescreen() {
        let system = SystemInfo {
            is_wii: true,
            wii_widescreen: true,
        };
        let (mut r, _) = renderer_with(VideoConfig::default(), system);
        assert!(r.aspect_wide());
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());
    }

    #[test]
    fn suggested_aspect_overrides_heuristic() {
        let config = VideoConfig {
            suggested_aspect_mode: AspectMode::AnalogWide,
            ..Default::default()
        };
        let (mut r, _) = renderer_with(config, SystemInfo::default());
        r.swap(0, 0, 0, 0, 0);
        assert!(r.aspect_wide());
    }

    #[test]
    fn zero_sized_swap_only_flushes() {
        let mut r = renderer();
        r.swap(0x1000, 0, 640, 480, 0);
        assert_eq!(r.frame_count(), 0);
        assert_eq!(r.stats().num_swaps_skipped, 1);
        assert_eq!(r.backend().as_null().unwrap().counters().present_count, 0);
        assert_eq!(r.last_xfb_size(), (MAX_XFB_WIDTH, MAX_XFB_HEIGHT));
    }

    #[test]
    fn fullscreen_toggle_notifies_host_once() {
        let host = Arc::new(HeadlessHost::new());
        let backend = Backend::create(BackendKind::Null, 640, 480).unwrap();
        let collab = Collaborators {
            host: host.clone(),
            ..Collaborators::headless(Box::new(XfbTextureCache::new()))
        };
        let mut r = Renderer::new(backend, SharedConfig::default(), collab).unwrap();
        r.set_fullscreen(true);
        r.set_fullscreen(true);
        r.set_window_size(640, 528);
        r.shutdown();
        let requests = host.requests();
        assert_eq!(requests.fullscreen, vec![(true, 0.0), (false, 0.0)]);
        assert!(requests.window_sizes.is_empty());
        assert!(!r.is_fullscreen());
    }

    #[test]
    fn window_size_requests_are_deduplicated() {
        let host = Arc::new(HeadlessHost::new());
        let backend = Backend::create(BackendKind::Null, 640, 480).unwrap();
        let collab = Collaborators {
            host: host.clone(),
            ..Collaborators::headless(Box::new(XfbTextureCache::new()))
        };
        let mut r = Renderer::new(backend, SharedConfig::default(), collab).unwrap();
        r.set_window_size(640, 528);
        r.set_window_size(640, 528);
        assert_eq!(host.requests().window_sizes, vec![(704, 528)]);
    }

    #[test]
    fn config_change_reloads_shaders_once() {
        let shared = SharedConfig::default();
        let backend = Backend::create(BackendKind::Null, 640, 480).unwrap();
        let collab = Collaborators::headless(Box::new(XfbTextureCache::new()));
        let mut r = Renderer::new(backend, shared.clone(), collab).unwrap();

        r.check_for_config_changes();
        assert!(r.backend().as_null().unwrap().counters().config_changes.is_empty());

        shared.update(|c| {
            c.wireframe = true;
            c.vsync = false;
        });
        r.check_for_config_changes();
        let changes = &r.backend().as_null().unwrap().counters().config_changes;
        assert_eq!(changes.len(), 1);
        assert!(changes[0].contains(ConfigChangeBits::HOST_CONFIG | ConfigChangeBits::VSYNC));
        assert_eq!(r.overlay().lock().len(), 1);
    }

    #[test]
    fn surface_resize_applies_on_next_bind() {
        let mut r = renderer();
        let handle = r.surface_handle();
        handle.resize_surface(1280, 720);
        assert!(handle.has_pending_change());
        assert_eq!(r.backbuffer_size(), (640, 480));

        r.bind_backbuffer(CLEAR_BLACK);
        assert!(!handle.has_pending_change());
        assert_eq!(r.backbuffer_size(), (1280, 720));
        assert_eq!(r.target_rectangle().height(), 720);
    }
}
