// Null backend: CPU-side resources, no rasterization.
//
// Textures keep their pixels in memory so copies, resolves, blits and
// readbacks behave like a real backend for everything except triangle
// rasterization. Every call is counted in `NullCounters`, which the headless
// driver and the tests use to observe what the renderer did.

use super::{
    MapMode, RenderBackend, StreamBufferSizes, StreamTarget, SurfaceRequest, SurfaceTarget,
    MAX_TEXTURE_UNITS,
};
use crate::config::{BackendInfo, ConfigChangeBits};
use crate::error::{ResourceKind, Result, VideoError};
use crate::framebuffer::AbstractFramebuffer;
use crate::math::{EfbRectangle, Rect, TargetRectangle};
use crate::pipeline::{
    AbstractPipeline, AbstractPipelineConfig, AbstractShader, PipelineImpl, ShaderImpl,
    ShaderStage,
};
use crate::render_state::{ClearColor, SamplerState, Viewport};
use crate::texture::{
    AbstractStagingTexture, AbstractTexture, AbstractTextureFormat, StagingImpl,
    StagingTextureType, TextureConfig, TextureId, TextureImpl,
};
use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// Region helpers
// ---------------------------------------------------------------------------

/// Rectangle with `left <= right` and `top <= bottom`.
fn normalized(rect: &EfbRectangle) -> EfbRectangle {
    Rect::new(
        rect.left.min(rect.right),
        rect.top.min(rect.bottom),
        rect.left.max(rect.right),
        rect.top.max(rect.bottom),
    )
}

/// Byte offset, bytes per row and row count of `rect` inside an image with
/// rows `stride` bytes apart.
fn region_layout(
    format: AbstractTextureFormat,
    stride: usize,
    rect: &EfbRectangle,
) -> (usize, usize, usize) {
    let rect = normalized(rect);
    let block = format.block_size() as i32;
    let texel = format.texel_size() as usize;
    let offset = (rect.top / block) as usize * stride + (rect.left / block) as usize * texel;
    let row_bytes = format.stride_for(rect.width() as u32) as usize;
    let rows = format.rows_for(rect.height() as u32) as usize;
    (offset, row_bytes, rows)
}

fn read_region(
    buf: &[u8],
    stride: usize,
    format: AbstractTextureFormat,
    rect: &EfbRectangle,
) -> Vec<u8> {
    let (offset, row_bytes, rows) = region_layout(format, stride, rect);
    let mut out = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = offset + row * stride;
        match buf.get(start..start + row_bytes) {
            Some(src) => out.extend_from_slice(src),
            None => {
                debug_assert!(false, "region read out of bounds");
                break;
            }
        }
    }
    out
}

fn write_region(
    buf: &mut [u8],
    stride: usize,
    format: AbstractTextureFormat,
    rect: &EfbRectangle,
    data: &[u8],
    data_stride: usize,
) {
    let (offset, row_bytes, rows) = region_layout(format, stride, rect);
    for row in 0..rows {
        let dst = offset + row * stride;
        let src = row * data_stride;
        match (
            buf.get_mut(dst..dst + row_bytes),
            data.get(src..src + row_bytes),
        ) {
            (Some(d), Some(s)) => d.copy_from_slice(s),
            _ => {
                debug_assert!(false, "region write out of bounds");
                break;
            }
        }
    }
}

/// Encodes `color` as one texel of `format`.
fn encode_color(format: AbstractTextureFormat, color: ClearColor) -> Vec<u8> {
    let unorm8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match format {
        AbstractTextureFormat::RGBA8 => color.iter().map(|c| unorm8(*c)).collect(),
        AbstractTextureFormat::BGRA8 => vec![
            unorm8(color[2]),
            unorm8(color[1]),
            unorm8(color[0]),
            unorm8(color[3]),
        ],
        AbstractTextureFormat::R16 => (((color[0].clamp(0.0, 1.0) * 65535.0).round()) as u16)
            .to_le_bytes()
            .to_vec(),
        AbstractTextureFormat::R32F => color[0].to_le_bytes().to_vec(),
        _ => vec![0; format.texel_size() as usize],
    }
}

fn encode_depth(format: AbstractTextureFormat, depth: f32) -> Vec<u8> {
    let depth = depth.clamp(0.0, 1.0);
    match format {
        AbstractTextureFormat::D16 => (((depth * 65535.0).round()) as u16).to_le_bytes().to_vec(),
        AbstractTextureFormat::D24_S8 => (((depth * 16_777_215.0).round()) as u32)
            .to_le_bytes()
            .to_vec(),
        AbstractTextureFormat::D32F => depth.to_le_bytes().to_vec(),
        AbstractTextureFormat::D32F_S8 => {
            let mut texel = depth.to_le_bytes().to_vec();
            texel.extend_from_slice(&[0; 4]);
            texel
        }
        _ => vec![0; format.texel_size() as usize],
    }
}

fn is_rgba_bgra_pair(a: AbstractTextureFormat, b: AbstractTextureFormat) -> bool {
    matches!(
        (a, b),
        (AbstractTextureFormat::RGBA8, AbstractTextureFormat::BGRA8)
            | (AbstractTextureFormat::BGRA8, AbstractTextureFormat::RGBA8)
    )
}

// ---------------------------------------------------------------------------
// NullTexture
// ---------------------------------------------------------------------------

pub(crate) struct NullTexture {
    config: TextureConfig,
    /// One buffer per (layer, level), layer-major.
    subresources: Mutex<Vec<Vec<u8>>>,
}

impl NullTexture {
    pub(crate) fn new(config: TextureConfig) -> Self {
        let mut subresources = Vec::with_capacity((config.layers * config.levels) as usize);
        for _layer in 0..config.layers {
            for level in 0..config.levels {
                let size = config.format.stride_for(config.mip_width(level)) as usize
                    * config.format.rows_for(config.mip_height(level)) as usize;
                subresources.push(vec![0u8; size]);
            }
        }
        Self {
            config,
            subresources: Mutex::new(subresources),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        match self.subresources.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn index(&self, layer: u32, level: u32) -> usize {
        (layer * self.config.levels + level) as usize
    }

    fn level_stride(&self, level: u32) -> usize {
        self.config.format.stride_for(self.config.mip_width(level)) as usize
    }

    pub(crate) fn load(
        &self,
        level: u32,
        width: u32,
        height: u32,
        src_stride: usize,
        data: &[u8],
    ) {
        let rect = EfbRectangle::with_size(width as i32, height as i32);
        let stride = self.level_stride(level);
        let index = self.index(0, level);
        let mut subresources = self.lock();
        if let Some(buf) = subresources.get_mut(index) {
            write_region(buf, stride, self.config.format, &rect, data, src_stride);
        }
    }

    /// Tightly packed copy of `rect` of one subresource.
    pub(crate) fn read_rect(&self, layer: u32, level: u32, rect: &EfbRectangle) -> Vec<u8> {
        let stride = self.level_stride(level);
        let index = self.index(layer, level);
        let subresources = self.lock();
        subresources
            .get(index)
            .map(|buf| read_region(buf, stride, self.config.format, rect))
            .unwrap_or_default()
    }

    pub(crate) fn write_rect(
        &self,
        layer: u32,
        level: u32,
        rect: &EfbRectangle,
        data: &[u8],
        data_stride: usize,
    ) {
        let stride = self.level_stride(level);
        let index = self.index(layer, level);
        let mut subresources = self.lock();
        if let Some(buf) = subresources.get_mut(index) {
            write_region(buf, stride, self.config.format, rect, data, data_stride);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_from(
        &self,
        src: &NullTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        src_level: u32,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
        dst_level: u32,
    ) {
        if src.config.format.texel_size() != self.config.format.texel_size() {
            log::warn!(
                "Null copy between incompatible formats {} -> {}",
                src.config.format,
                self.config.format
            );
            return;
        }
        // Read fully before writing so a texture can copy onto itself.
        let mut texels = src.read_rect(src_layer, src_level, src_rect);
        if is_rgba_bgra_pair(src.config.format, self.config.format) {
            swap_red_blue(&mut texels);
        }
        let row_bytes = self.config.format.stride_for(dst_rect.width() as u32) as usize;
        self.write_rect(dst_layer, dst_level, dst_rect, &texels, row_bytes);
    }

    /// Nearest-neighbour scaled copy between uncompressed textures.
    pub(crate) fn scale_from(
        &self,
        src: &NullTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
    ) {
        let texel = self.config.format.texel_size() as usize;
        if src.config.format.is_compressed()
            || self.config.format.is_compressed()
            || src.config.format.texel_size() as usize != texel
        {
            log::warn!(
                "Null scaled copy between unsupported formats {} -> {}",
                src.config.format,
                self.config.format
            );
            return;
        }

        let src_rect = normalized(src_rect);
        let dst_rect = normalized(dst_rect);
        let (sw, sh) = (src_rect.width() as usize, src_rect.height() as usize);
        let (dw, dh) = (dst_rect.width() as usize, dst_rect.height() as usize);
        if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
            return;
        }

        let source = src.read_rect(src_layer, 0, &src_rect);
        let mut scaled = vec![0u8; dw * dh * texel];
        for y in 0..dh {
            let sy = y * sh / dh;
            for x in 0..dw {
                let sx = x * sw / dw;
                let s = (sy * sw + sx) * texel;
                let d = (y * dw + x) * texel;
                scaled[d..d + texel].copy_from_slice(&source[s..s + texel]);
            }
        }
        if is_rgba_bgra_pair(src.config.format, self.config.format) {
            swap_red_blue(&mut scaled);
        }
        self.write_rect(dst_layer, 0, &dst_rect, &scaled, dw * texel);
    }

    /// Fills level 0 of every layer with one texel value.
    fn fill(&self, texel: &[u8]) {
        if texel.is_empty() {
            return;
        }
        let mut subresources = self.lock();
        for layer in 0..self.config.layers {
            let index = self.index(layer, 0);
            if let Some(buf) = subresources.get_mut(index) {
                for chunk in buf.chunks_exact_mut(texel.len()) {
                    chunk.copy_from_slice(texel);
                }
            }
        }
    }

    fn clear_color(&self, color: ClearColor) {
        self.fill(&encode_color(self.config.format, color));
    }

    fn clear_depth(&self, depth: f32) {
        self.fill(&encode_depth(self.config.format, depth));
    }
}

fn swap_red_blue(texels: &mut [u8]) {
    for px in texels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

// ---------------------------------------------------------------------------
// NullStagingTexture
// ---------------------------------------------------------------------------

pub(crate) struct NullStagingTexture {
    config: TextureConfig,
    data: Vec<u8>,
}

impl NullStagingTexture {
    fn new(config: TextureConfig) -> Self {
        let size = config.stride() as usize * config.format.rows_for(config.height) as usize;
        Self {
            config,
            data: vec![0; size],
        }
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn copy_from_texture(
        &mut self,
        src: &NullTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        src_level: u32,
        dst_rect: &EfbRectangle,
    ) {
        let mut texels = src.read_rect(src_layer, src_level, src_rect);
        if is_rgba_bgra_pair(src.config.format, self.config.format) {
            swap_red_blue(&mut texels);
        }
        let row_bytes = self.config.format.stride_for(dst_rect.width() as u32) as usize;
        let stride = self.config.stride() as usize;
        write_region(
            &mut self.data,
            stride,
            self.config.format,
            dst_rect,
            &texels,
            row_bytes,
        );
    }

    pub(crate) fn copy_to_texture(
        &mut self,
        src_rect: &EfbRectangle,
        dst: &NullTexture,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
        dst_level: u32,
    ) {
        let stride = self.config.stride() as usize;
        let texels = read_region(&self.data, stride, self.config.format, src_rect);
        let row_bytes = self.config.format.stride_for(src_rect.width() as u32) as usize;
        dst.write_rect(dst_layer, dst_level, dst_rect, &texels, row_bytes);
    }
}

// ---------------------------------------------------------------------------
// NullBackend
// ---------------------------------------------------------------------------

/// Draw parameters of the most recent draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub base_vertex: u32,
    pub num_vertices: u32,
    pub base_index: u32,
    pub num_indices: u32,
    pub indexed: bool,
    pub geometry_slot: u32,
    pub vertex_stride: u32,
}

/// Counters of everything the Null backend was asked to do.
#[derive(Debug, Default, Clone)]
pub struct NullCounters {
    pub present_count: u64,
    pub flush_count: u64,
    pub draw_count: u64,
    pub blit_count: u64,
    pub clear_count: u64,
    pub framebuffer_binds: u64,
    pub backbuffer_binds: u64,
    pub pipeline_binds: u64,
    pub geometry_discards: u64,
    pub texel_discards: u64,
    pub api_resets: u64,
    pub surface_changes: u64,
    pub config_changes: Vec<ConfigChangeBits>,
    pub last_overlay: Vec<String>,
    pub last_draw: Option<DrawRecord>,
    pub last_blit_dst: Option<TargetRectangle>,
}

enum BoundTarget {
    Backbuffer,
    Framebuffer(Arc<AbstractFramebuffer>),
}

pub struct NullBackend {
    info: BackendInfo,
    backbuffer: Arc<AbstractTexture>,
    target: BoundTarget,
    pipeline: Option<Arc<AbstractPipeline>>,
    textures: [Option<Arc<AbstractTexture>>; MAX_TEXTURE_UNITS],
    samplers: [SamplerState; MAX_TEXTURE_UNITS],
    scissor: EfbRectangle,
    viewport: Viewport,
    geometry_streams: Vec<Vec<u8>>,
    texel_stream: Vec<u8>,
    uniforms: Vec<u8>,
    geometry_slot: u32,
    vertex_stride: u32,
    counters: NullCounters,
}

impl NullBackend {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let backbuffer = Arc::new(Self::make_backbuffer(width, height));
        Ok(Self {
            info: BackendInfo::null(),
            backbuffer,
            target: BoundTarget::Backbuffer,
            pipeline: None,
            textures: Default::default(),
            samplers: [SamplerState::default(); MAX_TEXTURE_UNITS],
            scissor: EfbRectangle::with_size(width as i32, height as i32),
            viewport: Viewport::default(),
            geometry_streams: Vec::new(),
            texel_stream: Vec::new(),
            uniforms: Vec::new(),
            geometry_slot: 0,
            vertex_stride: 0,
            counters: NullCounters::default(),
        })
    }

    fn make_backbuffer(width: u32, height: u32) -> AbstractTexture {
        let config =
            TextureConfig::render_target(width.max(1), height.max(1), AbstractTextureFormat::RGBA8);
        AbstractTexture::new(config, TextureImpl::Null(NullTexture::new(config)))
    }

    pub fn counters(&self) -> &NullCounters {
        &self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = NullCounters::default();
    }

    /// Contents of a stream buffer, or an empty slice if not allocated.
    pub fn stream_contents(&self, target: StreamTarget) -> &[u8] {
        match target {
            StreamTarget::Geometry(slot) => self
                .geometry_streams
                .get(slot as usize)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            StreamTarget::Texel => &self.texel_stream,
        }
    }

    pub fn uniforms(&self) -> &[u8] {
        &self.uniforms
    }

    /// RGBA8 pixels of the backbuffer.
    pub fn backbuffer_pixels(&self) -> Vec<u8> {
        match &self.backbuffer.inner {
            TextureImpl::Null(tex) => tex.read_rect(0, 0, &self.backbuffer.config().rect()),
            #[cfg(feature = "wgpu-backend")]
            _ => Vec::new(),
        }
    }

    pub fn bound_texture(&self, index: u32) -> Option<&Arc<AbstractTexture>> {
        self.textures.get(index as usize).and_then(Option::as_ref)
    }

    pub fn scissor_rect(&self) -> EfbRectangle {
        self.scissor
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn sampler_state(&self, index: u32) -> Option<SamplerState> {
        self.samplers.get(index as usize).copied()
    }

    pub fn current_pipeline(&self) -> Option<&Arc<AbstractPipeline>> {
        self.pipeline.as_ref()
    }

    fn target_color(&self) -> Option<Arc<AbstractTexture>> {
        match &self.target {
            BoundTarget::Backbuffer => Some(Arc::clone(&self.backbuffer)),
            BoundTarget::Framebuffer(fb) => fb.color_attachment().cloned(),
        }
    }

    fn write_stream(buf: &mut Vec<u8>, offset: u32, data: &[u8]) {
        let start = offset as usize;
        let end = start + data.len();
        match buf.get_mut(start..end) {
            Some(dst) => dst.copy_from_slice(data),
            None => {
                debug_assert!(false, "stream upload past end of buffer");
                log::error!(
                    "Stream upload of {} bytes at {} exceeds buffer of {}",
                    data.len(),
                    offset,
                    buf.len()
                );
            }
        }
    }
}

fn null_texture(texture: &AbstractTexture) -> Option<&NullTexture> {
    match &texture.inner {
        TextureImpl::Null(tex) => Some(tex),
        #[cfg(feature = "wgpu-backend")]
        _ => None,
    }
}

impl RenderBackend for NullBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn create_texture(&mut self, config: &TextureConfig) -> Result<AbstractTexture> {
        if config.width == 0
            || config.height == 0
            || config.levels == 0
            || config.layers == 0
            || config.format == AbstractTextureFormat::Undefined
        {
            return Err(VideoError::resource(
                ResourceKind::Texture,
                config.describe(),
            ));
        }
        if config.width > self.info.max_texture_size || config.height > self.info.max_texture_size
        {
            return Err(VideoError::resource(
                ResourceKind::Texture,
                format!(
                    "{} exceeds max texture size {}",
                    config.describe(),
                    self.info.max_texture_size
                ),
            ));
        }
        Ok(AbstractTexture::new(
            *config,
            TextureImpl::Null(NullTexture::new(*config)),
        ))
    }

    fn create_staging_texture(
        &mut self,
        ty: StagingTextureType,
        config: &TextureConfig,
    ) -> Result<AbstractStagingTexture> {
        if config.width == 0 || config.height == 0 || config.format == AbstractTextureFormat::Undefined
        {
            return Err(VideoError::resource(
                ResourceKind::StagingTexture,
                config.describe(),
            ));
        }
        Ok(AbstractStagingTexture::new(
            ty,
            *config,
            StagingImpl::Null(NullStagingTexture::new(*config)),
        ))
    }

    fn create_framebuffer(
        &mut self,
        color: Option<Arc<AbstractTexture>>,
        depth: Option<Arc<AbstractTexture>>,
    ) -> Result<AbstractFramebuffer> {
        AbstractFramebuffer::new(color, depth)
    }

    fn create_shader_from_source(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<AbstractShader> {
        if source.trim().is_empty() {
            return Err(VideoError::ShaderCompilation {
                stage: stage.to_string(),
                api: "Null".to_string(),
                log: "empty source".to_string(),
            });
        }
        Ok(AbstractShader::new(stage, ShaderImpl::Null))
    }

    fn create_pipeline(&mut self, config: &AbstractPipelineConfig) -> Result<AbstractPipeline> {
        if config.vertex_shader.stage() != ShaderStage::Vertex
            || config.pixel_shader.stage() != ShaderStage::Pixel
        {
            return Err(VideoError::resource(
                ResourceKind::Pipeline,
                "shader stages do not match their pipeline slots",
            ));
        }
        Ok(AbstractPipeline::new(config.clone(), PipelineImpl::Null))
    }

    fn set_pipeline(&mut self, pipeline: Option<&Arc<AbstractPipeline>>) {
        self.pipeline = pipeline.cloned();
        self.counters.pipeline_binds += 1;
    }

    fn set_framebuffer(&mut self, framebuffer: &Arc<AbstractFramebuffer>) {
        self.target = BoundTarget::Framebuffer(Arc::clone(framebuffer));
        self.counters.framebuffer_binds += 1;
    }

    fn clear_framebuffer(&mut self, color: Option<ClearColor>, depth: Option<f32>) {
        self.counters.clear_count += 1;
        let (color_tex, depth_tex) = match &self.target {
            BoundTarget::Backbuffer => (Some(Arc::clone(&self.backbuffer)), None),
            BoundTarget::Framebuffer(fb) => (
                fb.color_attachment().cloned(),
                fb.depth_attachment().cloned(),
            ),
        };
        if let (Some(color), Some(tex)) = (color, color_tex) {
            if let Some(null) = null_texture(&tex) {
                null.clear_color(color);
            }
        }
        if let (Some(depth), Some(tex)) = (depth, depth_tex) {
            if let Some(null) = null_texture(&tex) {
                null.clear_depth(depth);
            }
        }
    }

    fn set_scissor_rect(&mut self, rect: &EfbRectangle) {
        self.scissor = *rect;
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.viewport = *viewport;
    }

    fn set_texture(&mut self, index: u32, texture: Option<&Arc<AbstractTexture>>) {
        if let Some(slot) = self.textures.get_mut(index as usize) {
            *slot = texture.cloned();
        }
    }

    fn set_sampler_state(&mut self, index: u32, state: &SamplerState) {
        if let Some(slot) = self.samplers.get_mut(index as usize) {
            *slot = *state;
        }
    }

    fn unbind_texture(&mut self, texture: TextureId) {
        for slot in self.textures.iter_mut() {
            if slot.as_ref().is_some_and(|t| t.id() == texture) {
                *slot = None;
            }
        }
    }

    fn allocate_stream_buffers(&mut self, sizes: &StreamBufferSizes) -> Result<()> {
        self.geometry_streams = (0..sizes.buffer_count)
            .map(|_| vec![0u8; sizes.slot_size() as usize])
            .collect();
        self.texel_stream = vec![0u8; sizes.texel as usize];
        Ok(())
    }

    fn upload_stream(&mut self, target: StreamTarget, offset: u32, data: &[u8], mode: MapMode) {
        match target {
            StreamTarget::Geometry(slot) => {
                if mode == MapMode::Discard {
                    self.counters.geometry_discards += 1;
                }
                match self.geometry_streams.get_mut(slot as usize) {
                    Some(buf) => Self::write_stream(buf, offset, data),
                    None => log::error!("Upload to unallocated geometry slot {slot}"),
                }
            }
            StreamTarget::Texel => {
                if mode == MapMode::Discard {
                    self.counters.texel_discards += 1;
                }
                Self::write_stream(&mut self.texel_stream, offset, data);
            }
        }
    }

    fn bind_geometry_stream(&mut self, slot: u32, vertex_stride: u32) {
        self.geometry_slot = slot;
        self.vertex_stride = vertex_stride;
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.uniforms.clear();
        self.uniforms.extend_from_slice(data);
    }

    fn draw(&mut self, base_vertex: u32, num_vertices: u32) {
        self.counters.draw_count += 1;
        self.counters.last_draw = Some(DrawRecord {
            base_vertex,
            num_vertices,
            base_index: 0,
            num_indices: 0,
            indexed: false,
            geometry_slot: self.geometry_slot,
            vertex_stride: self.vertex_stride,
        });
    }

    fn draw_indexed(&mut self, base_index: u32, num_indices: u32, base_vertex: u32) {
        self.counters.draw_count += 1;
        self.counters.last_draw = Some(DrawRecord {
            base_vertex,
            num_vertices: 0,
            base_index,
            num_indices,
            indexed: true,
            geometry_slot: self.geometry_slot,
            vertex_stride: self.vertex_stride,
        });
    }

    fn bind_backbuffer(&mut self, clear_color: ClearColor) {
        self.target = BoundTarget::Backbuffer;
        self.counters.backbuffer_binds += 1;
        self.clear_framebuffer(Some(clear_color), None);
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        let config = self.backbuffer.config();
        (config.width, config.height)
    }

    fn blit_texture(
        &mut self,
        dst_rect: &TargetRectangle,
        src: &AbstractTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
    ) {
        self.counters.blit_count += 1;
        self.counters.last_blit_dst = Some(*dst_rect);
        let Some(target) = self.target_color() else {
            return;
        };
        let config = target.config();
        if !normalized(dst_rect).fits_within(config.width, config.height) {
            log::debug!("Null blit destination {dst_rect:?} outside target, skipped");
            return;
        }
        if let (Some(dst), Some(src_tex)) = (null_texture(&target), null_texture(src)) {
            dst.scale_from(src_tex, src_rect, src_layer, dst_rect, 0);
        }
    }

    fn draw_overlay(&mut self, lines: &[String]) {
        self.counters.last_overlay = lines.to_vec();
    }

    fn present(&mut self) {
        self.counters.present_count += 1;
    }

    fn flush(&mut self) {
        self.counters.flush_count += 1;
    }

    fn wait_for_gpu_idle(&mut self) {}

    fn reset_api_state(&mut self) {
        self.counters.api_resets += 1;
    }

    fn on_config_changed(&mut self, bits: ConfigChangeBits) {
        self.counters.config_changes.push(bits);
    }

    fn change_surface(&mut self, request: SurfaceRequest) -> (u32, u32) {
        self.counters.surface_changes += 1;
        match request.target {
            SurfaceTarget::Headless => {}
            #[cfg(feature = "wgpu-backend")]
            SurfaceTarget::Wgpu(_) => {
                log::warn!("Null backend cannot present to a wgpu surface; staying headless")
            }
        }
        self.resize_surface(request.width, request.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> (u32, u32) {
        self.backbuffer = Arc::new(Self::make_backbuffer(width, height));
        if matches!(self.target, BoundTarget::Backbuffer) {
            self.scissor = EfbRectangle::with_size(width as i32, height as i32);
        }
        self.backbuffer_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureFlags;

    fn rgba(width: u32, height: u32) -> TextureConfig {
        TextureConfig::new(
            width,
            height,
            1,
            1,
            1,
            AbstractTextureFormat::RGBA8,
            TextureFlags::RENDER_TARGET,
        )
    }

    #[test]
    fn load_honours_row_length() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let tex = backend.create_texture(&rgba(2, 2)).unwrap();
        // Source rows are 3 pixels long; only the first 2 are used.
        let data: Vec<u8> = (0..24).collect();
        tex.load(0, 2, 2, 3, &data);
        let TextureImpl::Null(null) = &tex.inner else {
            unreachable!()
        };
        let pixels = null.read_rect(0, 0, &EfbRectangle::with_size(2, 2));
        assert_eq!(&pixels[0..8], &data[0..8]);
        assert_eq!(&pixels[8..16], &data[12..20]);
    }

    #[test]
    fn copy_between_rgba_and_bgra_swizzles() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let src = backend.create_texture(&rgba(1, 1)).unwrap();
        let dst = backend
            .create_texture(&TextureConfig::render_target(
                1,
                1,
                AbstractTextureFormat::BGRA8,
            ))
            .unwrap();
        src.load(0, 1, 1, 1, &[1, 2, 3, 4]);
        let rect = EfbRectangle::with_size(1, 1);
        dst.copy_rectangle_from_texture(&src, &rect, 0, 0, &rect, 0, 0);
        let TextureImpl::Null(null) = &dst.inner else {
            unreachable!()
        };
        assert_eq!(null.read_rect(0, 0, &rect), vec![3, 2, 1, 4]);
    }

    #[test]
    fn scaled_copy_is_nearest_neighbour() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let src = backend.create_texture(&rgba(2, 1)).unwrap();
        let dst = backend.create_texture(&rgba(4, 1)).unwrap();
        src.load(0, 2, 1, 2, &[10, 10, 10, 10, 20, 20, 20, 20]);
        dst.scale_rectangle_from_texture(
            &src,
            &EfbRectangle::with_size(2, 1),
            &EfbRectangle::with_size(4, 1),
        );
        let TextureImpl::Null(null) = &dst.inner else {
            unreachable!()
        };
        let px = null.read_rect(0, 0, &EfbRectangle::with_size(4, 1));
        assert_eq!(px[0], 10);
        assert_eq!(px[4], 10);
        assert_eq!(px[8], 20);
        assert_eq!(px[12], 20);
    }

    #[test]
    fn zero_sized_texture_is_a_resource_error() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let err = backend.create_texture(&rgba(0, 16)).unwrap_err();
        assert!(matches!(
            err,
            VideoError::ResourceCreation {
                kind: ResourceKind::Texture,
                ..
            }
        ));
    }

    #[test]
    fn bind_backbuffer_clears_to_color() {
        let mut backend = NullBackend::new(4, 4).unwrap();
        backend.bind_backbuffer([0.0, 0.0, 0.0, 1.0]);
        let px = backend.backbuffer_pixels();
        assert_eq!(px.len(), 4 * 4 * 4);
        assert!(px.chunks_exact(4).all(|p| p == [0, 0, 0, 255]));
    }

    #[test]
    fn unbind_texture_clears_every_unit() {
        let mut backend = NullBackend::new(4, 4).unwrap();
        let tex = Arc::new(backend.create_texture(&rgba(1, 1)).unwrap());
        backend.set_texture(0, Some(&tex));
        backend.set_texture(3, Some(&tex));
        backend.unbind_texture(tex.id());
        assert!(backend.bound_texture(0).is_none());
        assert!(backend.bound_texture(3).is_none());
    }
}
