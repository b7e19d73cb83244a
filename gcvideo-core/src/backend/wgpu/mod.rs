//! Hardware backend on wgpu.
//!
//! Draws are encoded into the shared command encoder as they arrive, one
//! render pass each, so texture copies and blits recorded in between keep
//! their order. Uniform uploads go to a ring of fixed-size slots bound at a
//! dynamic offset. Geometry goes to one buffer per stream slot, written
//! through `Queue::write_buffer`; a discard submits first so recorded draws
//! still see the old contents.
//!
//! Frames render into an offscreen RGBA8 backbuffer. When a window surface
//! is attached, `present` blits the backbuffer onto the swap chain image.

mod blit;
mod context;
mod format;
mod pipeline;
mod texture;

pub use pipeline::{WgpuPipeline, WgpuShader};
pub use texture::{WgpuStagingTexture, WgpuTexture};

use super::{
    MapMode, RenderBackend, StreamBufferSizes, StreamTarget, SurfaceRequest, SurfaceTarget,
    MAX_TEXTURE_UNITS,
};
use crate::config::{BackendInfo, ConfigChangeBits};
use crate::error::{ResourceKind, Result, VideoError};
use crate::framebuffer::AbstractFramebuffer;
use crate::math::{align_up, EfbRectangle, TargetRectangle};
use crate::pipeline::{
    AbstractPipeline, AbstractPipelineConfig, AbstractShader, PipelineImpl, ShaderImpl,
    ShaderStage,
};
use crate::render_state::{ClearColor, SamplerState, Viewport};
use crate::texture::{
    AbstractStagingTexture, AbstractTexture, AbstractTextureFormat, StagingImpl,
    StagingTextureType, TextureConfig, TextureId, TextureImpl,
};
use blit::{clamp_rect, BlitSource, BlitTarget};
use context::GpuContext;
use pipeline::{PipelineLayouts, SAMPLER_BINDING_BASE, UNIFORM_SLOT_SIZE};
use std::collections::HashMap;
use std::sync::Arc;

const UNIFORM_RING_SIZE: u64 = 4 * 1024 * 1024;

fn wgpu_texture(texture: &AbstractTexture) -> Option<&WgpuTexture> {
    match &texture.inner {
        TextureImpl::Wgpu(tex) => Some(tex),
        _ => None,
    }
}

fn to_color(color: ClearColor) -> wgpu::Color {
    wgpu::Color {
        r: color[0] as f64,
        g: color[1] as f64,
        b: color[2] as f64,
        a: color[3] as f64,
    }
}

// ---------------------------------------------------------------------------
// Stream buffers
// ---------------------------------------------------------------------------

/// GPU buffer with a CPU copy, so unaligned uploads can be widened to the
/// four-byte granularity `write_buffer` needs.
struct StreamBuffer {
    buffer: wgpu::Buffer,
    shadow: Vec<u8>,
}

impl StreamBuffer {
    fn new(ctx: &GpuContext, label: &str, size: u32, usage: wgpu::BufferUsages) -> Result<Self> {
        let size = align_up(size.max(4), wgpu::COPY_BUFFER_ALIGNMENT as u32);
        let buffer = ctx
            .validated(|device| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size: size as u64,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .map_err(|log| VideoError::resource(ResourceKind::Buffer, format!("{label}: {log}")))?;
        Ok(Self {
            buffer,
            shadow: vec![0u8; size as usize],
        })
    }

    fn write(&mut self, queue: &wgpu::Queue, offset: u32, data: &[u8]) {
        let start = offset as usize;
        let end = start + data.len();
        let Some(dst) = self.shadow.get_mut(start..end) else {
            log::error!(
                "Stream upload of {} bytes at {} exceeds buffer of {}",
                data.len(),
                offset,
                self.shadow.len()
            );
            return;
        };
        dst.copy_from_slice(data);
        let aligned_start = start & !3;
        let aligned_end = align_up(end as u32, 4) as usize;
        queue.write_buffer(
            &self.buffer,
            aligned_start as u64,
            &self.shadow[aligned_start..aligned_end],
        );
    }
}

struct StreamBuffers {
    geometry: Vec<StreamBuffer>,
    texel: StreamBuffer,
}

/// Ring of uniform slots. Each upload takes a fresh slot so recorded draws
/// keep reading their own constants.
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slot_stride: u64,
    cursor: u64,
    current: u32,
    scratch: Vec<u8>,
}

impl UniformRing {
    fn new(ctx: &GpuContext, layouts: &PipelineLayouts) -> Self {
        let alignment = ctx.device.limits().min_uniform_buffer_offset_alignment as u64;
        let slot_stride = align_up(UNIFORM_SLOT_SIZE as u32, alignment.max(1) as u32) as u64;
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform ring"),
            size: UNIFORM_RING_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform ring"),
            layout: &layouts.uniforms,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORM_SLOT_SIZE),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            slot_stride,
            cursor: 0,
            current: 0,
            scratch: vec![0u8; UNIFORM_SLOT_SIZE as usize],
        }
    }

    fn push(&mut self, ctx: &GpuContext, data: &[u8]) {
        if data.len() as u64 > UNIFORM_SLOT_SIZE {
            log::error!(
                "Uniform block of {} bytes truncated to {UNIFORM_SLOT_SIZE}",
                data.len()
            );
        }
        if self.cursor + self.slot_stride > UNIFORM_RING_SIZE {
            ctx.submit();
            self.cursor = 0;
        }
        let len = data.len().min(UNIFORM_SLOT_SIZE as usize);
        self.scratch.fill(0);
        self.scratch[..len].copy_from_slice(&data[..len]);
        ctx.queue.write_buffer(&self.buffer, self.cursor, &self.scratch);
        self.current = self.cursor as u32;
        self.cursor += self.slot_stride;
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

enum BoundTarget {
    Backbuffer,
    Framebuffer(Arc<AbstractFramebuffer>),
}

/// Attachments of the bound render target.
struct Attachments {
    color: Option<Arc<AbstractTexture>>,
    depth: Option<Arc<AbstractTexture>>,
    width: u32,
    height: u32,
}

struct PresentSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

#[derive(Debug, Clone, Copy)]
enum DrawRange {
    Vertices { base: u32, count: u32 },
    Indexed { base_index: u32, count: u32, base_vertex: u32 },
}

/// Everything a single draw binds, resolved before the pass is opened.
struct DrawCommand<'a> {
    pipeline: &'a wgpu::RenderPipeline,
    textures: &'a wgpu::BindGroup,
    geometry: Option<&'a wgpu::Buffer>,
    viewport: (f32, f32, f32, f32, f32, f32),
    scissor: (u32, u32, u32, u32),
    range: DrawRange,
}

pub struct WgpuBackend {
    ctx: Arc<GpuContext>,
    info: BackendInfo,
    layouts: PipelineLayouts,
    surface: Option<PresentSurface>,
    vsync: bool,
    backbuffer: Arc<AbstractTexture>,
    target: BoundTarget,
    pipeline: Option<Arc<AbstractPipeline>>,
    textures: [Option<Arc<AbstractTexture>>; MAX_TEXTURE_UNITS],
    samplers: [SamplerState; MAX_TEXTURE_UNITS],
    sampler_cache: HashMap<SamplerState, Arc<wgpu::Sampler>>,
    texture_bind_group: Option<Arc<wgpu::BindGroup>>,
    dummy_view: wgpu::TextureView,
    scissor: EfbRectangle,
    viewport: Viewport,
    streams: Option<StreamBuffers>,
    uniforms: UniformRing,
    geometry_slot: u32,
    vertex_stride: u32,
    overlay_lines: Vec<String>,
}

impl WgpuBackend {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let ctx = GpuContext::new()?;
        let info = ctx.backend_info();
        let layouts = PipelineLayouts::new(&ctx.device);
        let uniforms = UniformRing::new(&ctx, &layouts);
        let backbuffer = Arc::new(Self::make_backbuffer(&ctx, width, height)?);
        let dummy_view = Self::make_dummy_texture(&ctx);

        Ok(Self {
            ctx,
            info,
            layouts,
            surface: None,
            vsync: true,
            backbuffer,
            target: BoundTarget::Backbuffer,
            pipeline: None,
            textures: Default::default(),
            samplers: [SamplerState::default(); MAX_TEXTURE_UNITS],
            sampler_cache: HashMap::new(),
            texture_bind_group: None,
            dummy_view,
            scissor: EfbRectangle::with_size(width as i32, height as i32),
            viewport: Viewport::default(),
            streams: None,
            uniforms,
            geometry_slot: 0,
            vertex_stride: 0,
            overlay_lines: Vec::new(),
        })
    }

    fn make_backbuffer(ctx: &Arc<GpuContext>, width: u32, height: u32) -> Result<AbstractTexture> {
        let config =
            TextureConfig::render_target(width.max(1), height.max(1), AbstractTextureFormat::RGBA8);
        let texture = WgpuTexture::new(ctx, &config)?;
        Ok(AbstractTexture::new(config, TextureImpl::Wgpu(texture)))
    }

    /// Transparent black texel bound to every unused texture unit.
    fn make_dummy_texture(ctx: &GpuContext) -> wgpu::TextureView {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("unbound texture unit"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            texture.as_image_copy(),
            &[0, 0, 0, 0],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        })
    }

    /// Text handed to the last `draw_overlay` call.
    pub fn overlay_lines(&self) -> &[String] {
        &self.overlay_lines
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    fn present_mode(&self) -> wgpu::PresentMode {
        if self.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        }
    }

    fn configure_surface(&mut self) {
        let present_mode = self.present_mode();
        if let Some(surface) = &mut self.surface {
            surface.config.present_mode = present_mode;
            surface.surface.configure(&self.ctx.device, &surface.config);
        }
    }

    fn attachments(&self) -> Attachments {
        match &self.target {
            BoundTarget::Backbuffer => {
                let config = self.backbuffer.config();
                Attachments {
                    color: Some(Arc::clone(&self.backbuffer)),
                    depth: None,
                    width: config.width,
                    height: config.height,
                }
            }
            BoundTarget::Framebuffer(fb) => Attachments {
                color: fb.color_attachment().cloned(),
                depth: fb.depth_attachment().cloned(),
                width: fb.width(),
                height: fb.height(),
            },
        }
    }

    fn sampler(&mut self, state: SamplerState) -> Arc<wgpu::Sampler> {
        let device = &self.ctx.device;
        Arc::clone(
            self.sampler_cache
                .entry(state)
                .or_insert_with(|| Arc::new(device.create_sampler(&format::sampler_descriptor(&state)))),
        )
    }

    fn invalidate_textures(&mut self) {
        self.texture_bind_group = None;
    }

    fn texture_bind_group(&mut self) -> Arc<wgpu::BindGroup> {
        if let Some(group) = &self.texture_bind_group {
            return Arc::clone(group);
        }

        let samplers: Vec<Arc<wgpu::Sampler>> =
            self.samplers.clone().into_iter().map(|s| self.sampler(s)).collect();
        let views: Vec<&wgpu::TextureView> = self
            .textures
            .iter()
            .map(|slot| {
                slot.as_deref()
                    .and_then(wgpu_texture)
                    .filter(|tex| tex.is_sampleable())
                    .map_or(&self.dummy_view, WgpuTexture::sample_view)
            })
            .collect();

        let mut entries = Vec::with_capacity(MAX_TEXTURE_UNITS * 2);
        for (unit, (view, sampler)) in views.iter().zip(&samplers).enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING_BASE + unit as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let group = Arc::new(self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture units"),
            layout: &self.layouts.textures,
            entries: &entries,
        }));
        self.texture_bind_group = Some(Arc::clone(&group));
        group
    }

    /// Records one render pass on the bound target, optionally with a draw.
    fn encode_pass(
        &self,
        targets: &Attachments,
        color_load: wgpu::LoadOp<wgpu::Color>,
        depth_load: wgpu::LoadOp<f32>,
        draw: Option<DrawCommand<'_>>,
    ) {
        let color_view = targets
            .color
            .as_deref()
            .and_then(wgpu_texture)
            .and_then(WgpuTexture::attachment_view);
        let depth = targets
            .depth
            .as_deref()
            .and_then(|t| wgpu_texture(t).and_then(WgpuTexture::attachment_view).map(|v| (v, t)));
        if color_view.is_none() && depth.is_none() {
            log::debug!("Render pass without attachments skipped");
            return;
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment<'_>>> = color_view
            .map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })
            .into_iter()
            .map(Some)
            .collect();
        let depth_attachment = depth.map(|(view, texture)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: texture.config().format.is_stencil().then_some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
        });

        self.ctx.record(|encoder| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gcvideo pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let Some(cmd) = &draw else {
                return;
            };
            let (vx, vy, vw, vh, near, far) = cmd.viewport;
            let (sx, sy, sw, sh) = cmd.scissor;
            pass.set_pipeline(cmd.pipeline);
            pass.set_bind_group(0, &self.uniforms.bind_group, &[self.uniforms.current]);
            pass.set_bind_group(1, cmd.textures, &[]);
            pass.set_viewport(vx, vy, vw, vh, near, far);
            pass.set_scissor_rect(sx, sy, sw, sh);
            if let Some(buffer) = cmd.geometry {
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint16);
            }
            match cmd.range {
                DrawRange::Vertices { base, count } => pass.draw(base..base + count, 0..1),
                DrawRange::Indexed {
                    base_index,
                    count,
                    base_vertex,
                } => pass.draw_indexed(base_index..base_index + count, base_vertex as i32, 0..1),
            }
        });
    }

    fn encode_draw(&mut self, range: DrawRange) {
        let Some(pipeline) = self.pipeline.clone() else {
            log::debug!("Draw without a pipeline skipped");
            return;
        };
        let PipelineImpl::Wgpu(gpu_pipeline) = &pipeline.inner else {
            log::error!("Pipeline was not created by the wgpu backend");
            return;
        };
        if gpu_pipeline.culls_all() {
            return;
        }

        let targets = self.attachments();
        let Some(viewport) = clamp_viewport(&self.viewport, targets.width, targets.height) else {
            return;
        };
        let Some(scissor) = clamp_rect(&self.scissor, targets.width, targets.height) else {
            return;
        };
        let needs_geometry = pipeline.config().vertex_format.is_some()
            || matches!(range, DrawRange::Indexed { .. });
        let textures = self.texture_bind_group();

        let geometry = self
            .streams
            .as_ref()
            .and_then(|s| s.geometry.get(self.geometry_slot as usize))
            .map(|s| &s.buffer);
        if needs_geometry && geometry.is_none() {
            log::error!("Draw from unallocated geometry slot {}", self.geometry_slot);
            return;
        }

        let cmd = DrawCommand {
            pipeline: gpu_pipeline.raw(),
            textures: &textures,
            geometry,
            viewport,
            scissor,
            range,
        };
        self.encode_pass(&targets, wgpu::LoadOp::Load, wgpu::LoadOp::Load, Some(cmd));
    }
}

/// Viewport limited to the target and the 0..1 depth range wgpu accepts.
fn clamp_viewport(vp: &Viewport, width: u32, height: u32) -> Option<(f32, f32, f32, f32, f32, f32)> {
    let (w, h) = (width as f32, height as f32);
    let x0 = vp.x.min(vp.x + vp.width).clamp(0.0, w);
    let x1 = vp.x.max(vp.x + vp.width).clamp(0.0, w);
    let y0 = vp.y.min(vp.y + vp.height).clamp(0.0, h);
    let y1 = vp.y.max(vp.y + vp.height).clamp(0.0, h);
    if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
        return None;
    }
    let near = vp.near_depth.clamp(0.0, 1.0);
    let far = vp.far_depth.clamp(0.0, 1.0);
    Some((x0, y0, x1 - x0, y1 - y0, near.min(far), near.max(far)))
}

impl RenderBackend for WgpuBackend {
    fn info(&self) -> &BackendInfo {
        &self.info
    }

    fn create_texture(&mut self, config: &TextureConfig) -> Result<AbstractTexture> {
        if config.width == 0 || config.height == 0 || config.levels == 0 || config.layers == 0 {
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
        let texture = WgpuTexture::new(&self.ctx, config)?;
        Ok(AbstractTexture::new(*config, TextureImpl::Wgpu(texture)))
    }

    fn create_staging_texture(
        &mut self,
        ty: StagingTextureType,
        config: &TextureConfig,
    ) -> Result<AbstractStagingTexture> {
        if config.width == 0 || config.height == 0 {
            return Err(VideoError::resource(
                ResourceKind::StagingTexture,
                config.describe(),
            ));
        }
        let staging = WgpuStagingTexture::new(&self.ctx, ty, config)?;
        Ok(AbstractStagingTexture::new(
            ty,
            *config,
            StagingImpl::Wgpu(staging),
        ))
    }

    fn create_framebuffer(
        &mut self,
        color: Option<Arc<AbstractTexture>>,
        depth: Option<Arc<AbstractTexture>>,
    ) -> Result<AbstractFramebuffer> {
        let foreign = color
            .iter()
            .chain(depth.iter())
            .any(|t| wgpu_texture(t).is_none());
        if foreign {
            return Err(VideoError::resource(
                ResourceKind::Framebuffer,
                "attachment was not created by the wgpu backend",
            ));
        }
        AbstractFramebuffer::new(color, depth)
    }

    fn create_shader_from_source(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<AbstractShader> {
        let shader = pipeline::create_shader(&self.ctx, stage, source)?;
        Ok(AbstractShader::new(stage, ShaderImpl::Wgpu(shader)))
    }

    fn create_pipeline(&mut self, config: &AbstractPipelineConfig) -> Result<AbstractPipeline> {
        let pipeline = pipeline::create_pipeline(&self.ctx, &self.layouts, config)?;
        Ok(AbstractPipeline::new(config.clone(), PipelineImpl::Wgpu(pipeline)))
    }

    fn set_pipeline(&mut self, pipeline: Option<&Arc<AbstractPipeline>>) {
        self.pipeline = pipeline.cloned();
    }

    fn set_framebuffer(&mut self, framebuffer: &Arc<AbstractFramebuffer>) {
        self.target = BoundTarget::Framebuffer(Arc::clone(framebuffer));
    }

    fn clear_framebuffer(&mut self, color: Option<ClearColor>, depth: Option<f32>) {
        let targets = self.attachments();
        let color_load = color.map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(to_color(c)));
        let depth_load = depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
        self.encode_pass(&targets, color_load, depth_load, None);
    }

    fn set_scissor_rect(&mut self, rect: &EfbRectangle) {
        self.scissor = *rect;
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.viewport = *viewport;
    }

    fn set_texture(&mut self, index: u32, texture: Option<&Arc<AbstractTexture>>) {
        let Some(slot) = self.textures.get_mut(index as usize) else {
            return;
        };
        let same = match (slot.as_ref(), texture) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same {
            *slot = texture.cloned();
            self.invalidate_textures();
        }
    }

    fn set_sampler_state(&mut self, index: u32, state: &SamplerState) {
        let Some(slot) = self.samplers.get_mut(index as usize) else {
            return;
        };
        if *slot != *state {
            *slot = *state;
            self.invalidate_textures();
        }
    }

    fn unbind_texture(&mut self, texture: TextureId) {
        let mut changed = false;
        for slot in self.textures.iter_mut() {
            if slot.as_ref().is_some_and(|t| t.id() == texture) {
                *slot = None;
                changed = true;
            }
        }
        if changed {
            self.invalidate_textures();
        }
    }

    fn allocate_stream_buffers(&mut self, sizes: &StreamBufferSizes) -> Result<()> {
        let geometry = (0..sizes.buffer_count)
            .map(|_| {
                StreamBuffer::new(
                    &self.ctx,
                    "geometry stream",
                    sizes.slot_size(),
                    wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::INDEX,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let texel = StreamBuffer::new(
            &self.ctx,
            "texel stream",
            sizes.texel,
            wgpu::BufferUsages::STORAGE,
        )?;
        self.streams = Some(StreamBuffers { geometry, texel });
        Ok(())
    }

    fn upload_stream(&mut self, target: StreamTarget, offset: u32, data: &[u8], mode: MapMode) {
        if mode == MapMode::Discard && self.ctx.has_pending_work() {
            self.ctx.submit();
        }
        let Some(streams) = &mut self.streams else {
            log::error!("Stream upload before stream buffers were allocated");
            return;
        };
        let buffer = match target {
            StreamTarget::Geometry(slot) => match streams.geometry.get_mut(slot as usize) {
                Some(buffer) => buffer,
                None => {
                    log::error!("Upload to unallocated geometry slot {slot}");
                    return;
                }
            },
            StreamTarget::Texel => &mut streams.texel,
        };
        buffer.write(&self.ctx.queue, offset, data);
    }

    fn bind_geometry_stream(&mut self, slot: u32, vertex_stride: u32) {
        self.geometry_slot = slot;
        self.vertex_stride = vertex_stride;
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.uniforms.push(&self.ctx, data);
    }

    fn draw(&mut self, base_vertex: u32, num_vertices: u32) {
        self.encode_draw(DrawRange::Vertices {
            base: base_vertex,
            count: num_vertices,
        });
    }

    fn draw_indexed(&mut self, base_index: u32, num_indices: u32, base_vertex: u32) {
        self.encode_draw(DrawRange::Indexed {
            base_index,
            count: num_indices,
            base_vertex,
        });
    }

    fn bind_backbuffer(&mut self, clear_color: ClearColor) {
        self.target = BoundTarget::Backbuffer;
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
        let Some(src_tex) = wgpu_texture(src) else {
            log::error!("Blit source was not created by the wgpu backend");
            return;
        };
        if !src_tex.is_sampleable() {
            log::error!("Blit source {} cannot be sampled", src.config().describe());
            return;
        }
        let targets = self.attachments();
        let Some(dst) = targets.color.as_deref().and_then(wgpu_texture) else {
            return;
        };
        let Some(dst_view) = dst.attachment_view() else {
            return;
        };
        let src_view = src_tex.layer_view(src_layer);
        let ctx = &self.ctx;
        ctx.record(|encoder| {
            ctx.blitter.blit(
                &ctx.device,
                encoder,
                &BlitSource {
                    view: &src_view,
                    width: src.config().width,
                    height: src.config().height,
                    rect: *src_rect,
                },
                &BlitTarget {
                    view: dst_view,
                    format: dst.format(),
                    width: targets.width,
                    height: targets.height,
                    rect: *dst_rect,
                    clear: None,
                },
            );
        });
    }

    fn draw_overlay(&mut self, lines: &[String]) {
        for line in lines {
            log::trace!("overlay: {line}");
        }
        self.overlay_lines = lines.to_vec();
    }

    fn present(&mut self) {
        let Some(surface) = &self.surface else {
            self.ctx.submit();
            return;
        };
        let frame = match surface.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::debug!("Surface outdated, reconfiguring");
                self.configure_surface();
                self.ctx.submit();
                return;
            }
            Err(err) => {
                log::warn!("Failed to acquire swap chain image: {err}");
                self.ctx.submit();
                return;
            }
        };

        let Some(src) = wgpu_texture(&self.backbuffer) else {
            return;
        };
        let src_view = src.layer_view(0);
        let dst_view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let (bw, bh) = self.backbuffer_size();
        let (sw, sh) = (surface.config.width, surface.config.height);
        let ctx = &self.ctx;
        ctx.record(|encoder| {
            ctx.blitter.blit(
                &ctx.device,
                encoder,
                &BlitSource {
                    view: &src_view,
                    width: bw,
                    height: bh,
                    rect: EfbRectangle::with_size(bw as i32, bh as i32),
                },
                &BlitTarget {
                    view: &dst_view,
                    format: surface.config.format,
                    width: sw,
                    height: sh,
                    rect: EfbRectangle::with_size(sw as i32, sh as i32),
                    clear: Some(wgpu::Color::BLACK),
                },
            );
        });
        self.ctx.submit();
        frame.present();
    }

    fn flush(&mut self) {
        self.ctx.submit();
    }

    fn wait_for_gpu_idle(&mut self) {
        self.ctx.wait_idle();
    }

    fn on_config_changed(&mut self, bits: ConfigChangeBits) {
        if bits.intersects(ConfigChangeBits::ANISOTROPY | ConfigChangeBits::FORCE_TEXTURE_FILTERING)
        {
            self.sampler_cache.clear();
            self.invalidate_textures();
        }
    }

    fn set_vsync(&mut self, enabled: bool) {
        if self.vsync != enabled {
            self.vsync = enabled;
            self.configure_surface();
        }
    }

    fn change_surface(&mut self, request: SurfaceRequest) -> (u32, u32) {
        // The old surface may still have work referencing its images.
        self.ctx.wait_idle();
        self.surface = None;
        match request.target {
            SurfaceTarget::Headless => {}
            SurfaceTarget::Wgpu(surface) => {
                let caps = surface.get_capabilities(&self.ctx.adapter);
                let format = caps
                    .formats
                    .iter()
                    .copied()
                    .find(|f| !f.is_srgb())
                    .or_else(|| caps.formats.first().copied());
                match format {
                    Some(format) => {
                        let config = wgpu::SurfaceConfiguration {
                            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                            format,
                            width: request.width.max(1),
                            height: request.height.max(1),
                            present_mode: self.present_mode(),
                            desired_maximum_frame_latency: 2,
                            alpha_mode: caps
                                .alpha_modes
                                .first()
                                .copied()
                                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
                            view_formats: vec![],
                        };
                        self.surface = Some(PresentSurface { surface, config });
                        self.configure_surface();
                    }
                    None => log::error!("Surface is not compatible with the adapter; staying headless"),
                }
            }
        }
        self.resize_surface(request.width, request.height)
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> (u32, u32) {
        if let Some(surface) = &mut self.surface {
            surface.config.width = width.max(1);
            surface.config.height = height.max(1);
        }
        self.configure_surface();

        if self.backbuffer_size() != (width.max(1), height.max(1)) {
            match Self::make_backbuffer(&self.ctx, width, height) {
                Ok(backbuffer) => self.backbuffer = Arc::new(backbuffer),
                Err(err) => log::error!("Failed to resize backbuffer to {width}x{height}: {err}"),
            }
        }
        if matches!(self.target, BoundTarget::Backbuffer) {
            self.scissor = EfbRectangle::with_size(width as i32, height as i32);
        }
        self.backbuffer_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_is_clamped_to_target() {
        let vp = Viewport::new(-20.0, 10.0, 700.0, 500.0, 0.0, 1.0);
        let (x, y, w, h, near, far) = clamp_viewport(&vp, 640, 480).unwrap();
        assert_eq!((x, y, w, h), (0.0, 10.0, 640.0, 470.0));
        assert_eq!((near, far), (0.0, 1.0));
    }

    #[test]
    fn reversed_depth_range_is_ordered() {
        let vp = Viewport::new(0.0, 0.0, 64.0, 64.0, 1.0, 0.25);
        let (.., near, far) = clamp_viewport(&vp, 64, 64).unwrap();
        assert_eq!((near, far), (0.25, 1.0));
    }

    #[test]
    fn offscreen_viewport_is_rejected() {
        let vp = Viewport::new(700.0, 0.0, 64.0, 64.0, 0.0, 1.0);
        assert!(clamp_viewport(&vp, 640, 480).is_none());
    }

    #[test]
    #[ignore] // Requires a GPU adapter
    fn renders_and_reads_back_clear_color() {
        let mut backend = WgpuBackend::new(64, 64).unwrap();
        let config = TextureConfig::render_target(16, 16, AbstractTextureFormat::RGBA8);
        let texture = Arc::new(backend.create_texture(&config).unwrap());
        let fb = Arc::new(backend.create_framebuffer(Some(Arc::clone(&texture)), None).unwrap());
        backend.set_framebuffer(&fb);
        backend.clear_framebuffer(Some([1.0, 0.0, 0.0, 1.0]), None);

        let mut readback = backend
            .create_staging_texture(StagingTextureType::Readback, &config)
            .unwrap();
        readback.copy_from_texture_all(&texture, 0, 0);
        assert!(readback.map());
        let mut texel = [0u8; 4];
        readback.read_texel(5, 5, &mut texel);
        assert_eq!(texel, [255, 0, 0, 255]);
    }
}
