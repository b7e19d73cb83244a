// GPU textures and buffer-backed staging textures.
//
// Uploads go through temporary copy buffers recorded in the shared encoder
// rather than `Queue::write_texture`, which would run ahead of draws that
// are recorded but not yet submitted.

use super::blit::{BlitSource, BlitTarget};
use super::context::GpuContext;
use super::format;
use crate::error::{ResourceKind, Result, VideoError};
use crate::math::{align_up, EfbRectangle};
use crate::texture::{StagingTextureType, TextureConfig};
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Row pitch of an image `width` pixels wide, padded for buffer copies.
fn padded_stride(config: &TextureConfig, width: u32) -> u32 {
    align_up(
        config.format.stride_for(width),
        wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
    )
}

/// Copy extent of `rect`, rounded up to whole blocks.
fn block_extent(config: &TextureConfig, width: u32, height: u32) -> wgpu::Extent3d {
    let block = config.format.block_size();
    wgpu::Extent3d {
        width: align_up(width, block),
        height: align_up(height, block),
        depth_or_array_layers: 1,
    }
}

fn origin(rect: &EfbRectangle, layer: u32) -> wgpu::Origin3d {
    wgpu::Origin3d {
        x: rect.left.min(rect.right).max(0) as u32,
        y: rect.top.min(rect.bottom).max(0) as u32,
        z: layer,
    }
}

pub struct WgpuTexture {
    ctx: Arc<GpuContext>,
    config: TextureConfig,
    format: wgpu::TextureFormat,
    texture: wgpu::Texture,
    sample_view: wgpu::TextureView,
    attachment_view: Option<wgpu::TextureView>,
}

impl WgpuTexture {
    pub(crate) fn new(ctx: &Arc<GpuContext>, config: &TextureConfig) -> Result<Self> {
        let format = format::texture_format(config.format, ctx.features())?;
        let texture = ctx
            .validated(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("gcvideo texture"),
                    size: wgpu::Extent3d {
                        width: align_up(config.width, config.format.block_size()),
                        height: align_up(config.height, config.format.block_size()),
                        depth_or_array_layers: config.layers,
                    },
                    mip_level_count: config.levels,
                    sample_count: config.samples.max(1),
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: format::texture_usage(config),
                    view_formats: &[],
                })
            })
            .map_err(|log| {
                VideoError::resource(ResourceKind::Texture, format!("{}: {log}", config.describe()))
            })?;

        let sample_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("gcvideo texture view"),
            dimension: Some(if config.is_multisampled() {
                wgpu::TextureViewDimension::D2
            } else {
                wgpu::TextureViewDimension::D2Array
            }),
            aspect: format::copy_aspect(config.format),
            ..Default::default()
        });
        let attachment_view = config
            .is_render_target()
            .then(|| Self::make_view(&texture, 0, 0, wgpu::TextureViewDimension::D2));

        Ok(Self {
            ctx: Arc::clone(ctx),
            config: *config,
            format,
            texture,
            sample_view,
            attachment_view,
        })
    }

    fn make_view(
        texture: &wgpu::Texture,
        layer: u32,
        level: u32,
        dimension: wgpu::TextureViewDimension,
    ) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("gcvideo layer view"),
            dimension: Some(dimension),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// View of every layer, as bound to a texture unit.
    pub(crate) fn sample_view(&self) -> &wgpu::TextureView {
        &self.sample_view
    }

    /// Layer 0, level 0 as a render attachment. `None` unless the texture
    /// is a render target.
    pub(crate) fn attachment_view(&self) -> Option<&wgpu::TextureView> {
        self.attachment_view.as_ref()
    }

    /// Single layer of level 0 as an array view, for blit sources.
    pub(crate) fn layer_view(&self, layer: u32) -> wgpu::TextureView {
        Self::make_view(&self.texture, layer, 0, wgpu::TextureViewDimension::D2Array)
    }

    /// True if the texture can be sampled through a filtering sampler.
    pub(crate) fn is_sampleable(&self) -> bool {
        !self.config.is_multisampled() && format::is_filterable(self.config.format, self.ctx.features())
    }

    fn image_copy(&self, level: u32, origin: wgpu::Origin3d) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture: &self.texture,
            mip_level: level,
            origin,
            aspect: format::copy_aspect(self.config.format),
        }
    }

    /// Records a copy of `rows` rows of `data` (`src_stride` bytes apart)
    /// into `level` of `layer` at `dst`.
    fn upload_region(
        &self,
        dst: wgpu::Origin3d,
        level: u32,
        width: u32,
        height: u32,
        src_stride: u32,
        data: &[u8],
    ) {
        let row_bytes = self.config.format.stride_for(width) as usize;
        let rows = self.config.format.rows_for(height) as usize;
        let padded = padded_stride(&self.config, width) as usize;
        let mut staging = vec![0u8; padded * rows];
        for row in 0..rows {
            let src = row * src_stride as usize;
            let Some(line) = data.get(src..src + row_bytes) else {
                break;
            };
            staging[row * padded..row * padded + row_bytes].copy_from_slice(line);
        }

        let buffer = self
            .ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("texture upload"),
                contents: &staging,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        let extent = block_extent(&self.config, width, height);
        self.ctx.record(|encoder| {
            encoder.copy_buffer_to_texture(
                wgpu::ImageCopyBuffer {
                    buffer: &buffer,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(padded as u32),
                        rows_per_image: Some(rows as u32),
                    },
                },
                self.image_copy(level, dst),
                extent,
            );
        });
    }

    pub(crate) fn load(&self, level: u32, width: u32, height: u32, src_stride: u32, data: &[u8]) {
        if self.config.is_multisampled() {
            log::error!("Cannot upload pixels into a multisampled texture");
            return;
        }
        self.upload_region(wgpu::Origin3d::ZERO, level, width, height, src_stride, data);
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_from(
        &self,
        src: &WgpuTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        src_level: u32,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
        dst_level: u32,
    ) {
        if src.config.is_multisampled() || self.config.is_multisampled() {
            log::error!("Multisampled textures must be resolved before copying");
            return;
        }
        let extent = block_extent(&self.config, dst_rect.width() as u32, dst_rect.height() as u32);
        self.ctx.record(|encoder| {
            encoder.copy_texture_to_texture(
                src.image_copy(src_level, origin(src_rect, src_layer)),
                self.image_copy(dst_level, origin(dst_rect, dst_layer)),
                extent,
            );
        });
    }

    /// Resolves `layer` of multisampled `src` into this texture. wgpu
    /// resolves whole attachments, so `rect` only documents the caller's
    /// intent.
    pub(crate) fn resolve_from(
        &self,
        src: &WgpuTexture,
        rect: &EfbRectangle,
        layer: u32,
        level: u32,
    ) {
        if self.config.format.is_depth() {
            log::warn!("Depth resolve of {rect:?} is not supported by wgpu, skipped");
            return;
        }
        let src_view = Self::make_view(&src.texture, layer, level, wgpu::TextureViewDimension::D2);
        let dst_view = Self::make_view(&self.texture, layer, level, wgpu::TextureViewDimension::D2);
        self.ctx.record(|encoder| {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("resolve"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &src_view,
                    resolve_target: Some(&dst_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        });
    }

    pub(crate) fn scale_from(&self, src: &WgpuTexture, src_rect: &EfbRectangle, dst_rect: &EfbRectangle) {
        let Some(dst_view) = &self.attachment_view else {
            log::error!("Scaled copy into a texture that is not a render target");
            return;
        };
        if !src.is_sampleable() {
            log::error!("Scaled copy source {} cannot be sampled", src.config.describe());
            return;
        }
        let src_view = src.layer_view(0);
        let ctx = &self.ctx;
        ctx.record(|encoder| {
            ctx.blitter.blit(
                &ctx.device,
                encoder,
                &BlitSource {
                    view: &src_view,
                    width: src.config.width,
                    height: src.config.height,
                    rect: *src_rect,
                },
                &BlitTarget {
                    view: dst_view,
                    format: self.format,
                    width: self.config.width,
                    height: self.config.height,
                    rect: *dst_rect,
                    clear: None,
                },
            );
        });
    }
}

// ---------------------------------------------------------------------------
// Staging textures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingCopy {
    None,
    Readback,
    Upload,
}

/// CPU image plus, for readback, a mappable buffer the GPU copies into.
///
/// The CPU image uses the tight row pitch of the texture config; the GPU
/// buffer uses the padded pitch copies require.
pub struct WgpuStagingTexture {
    ctx: Arc<GpuContext>,
    config: TextureConfig,
    readback: Option<wgpu::Buffer>,
    padded_stride: u32,
    data: Vec<u8>,
    pending: PendingCopy,
}

impl WgpuStagingTexture {
    pub(crate) fn new(
        ctx: &Arc<GpuContext>,
        ty: StagingTextureType,
        config: &TextureConfig,
    ) -> Result<Self> {
        format::texture_format(config.format, ctx.features())?;
        let padded = padded_stride(config, config.width);
        let rows = config.format.rows_for(config.height);
        let readback = match ty {
            StagingTextureType::Upload => None,
            StagingTextureType::Readback | StagingTextureType::Mutable => Some(
                ctx.validated(|device| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("staging readback"),
                        size: padded as u64 * rows as u64,
                        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                        mapped_at_creation: false,
                    })
                })
                .map_err(|log| VideoError::resource(ResourceKind::StagingTexture, log))?,
            ),
        };
        Ok(Self {
            ctx: Arc::clone(ctx),
            config: *config,
            readback,
            padded_stride: padded,
            data: vec![0u8; config.level0_size()],
            pending: PendingCopy::None,
        })
    }

    fn rect_offset(&self, rect: &EfbRectangle, stride: u32) -> u64 {
        let block = self.config.format.block_size() as i32;
        let o = origin(rect, 0);
        (o.y as i32 / block) as u64 * stride as u64
            + (o.x as i32 / block) as u64 * self.config.format.texel_size() as u64
    }

    /// CPU image is always addressable; readbacks land in it on flush.
    pub(crate) fn map(&mut self) -> bool {
        true
    }

    pub(crate) fn unmap(&mut self) {}

    pub(crate) fn flush(&mut self) {
        match std::mem::replace(&mut self.pending, PendingCopy::None) {
            PendingCopy::None => {}
            PendingCopy::Upload => self.ctx.submit(),
            PendingCopy::Readback => {
                self.ctx.submit();
                let Some(buffer) = &self.readback else {
                    return;
                };
                let Some(bytes) = self.ctx.read_buffer(buffer, buffer.size()) else {
                    return;
                };
                let row_bytes = self.config.stride() as usize;
                let padded = self.padded_stride as usize;
                for (dst, src) in self
                    .data
                    .chunks_exact_mut(row_bytes)
                    .zip(bytes.chunks_exact(padded))
                {
                    dst.copy_from_slice(&src[..row_bytes]);
                }
            }
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
        src: &WgpuTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        src_level: u32,
        dst_rect: &EfbRectangle,
    ) {
        let Some(buffer) = &self.readback else {
            log::error!("Readback into an upload-only staging texture");
            return;
        };
        if src.config.is_multisampled() {
            log::error!("Multisampled textures must be resolved before readback");
            return;
        }
        let offset = self.rect_offset(dst_rect, self.padded_stride);
        let extent = block_extent(&src.config, src_rect.width() as u32, src_rect.height() as u32);
        let layout = wgpu::ImageDataLayout {
            offset,
            bytes_per_row: Some(self.padded_stride),
            rows_per_image: Some(self.config.format.rows_for(self.config.height)),
        };
        self.ctx.record(|encoder| {
            encoder.copy_texture_to_buffer(
                src.image_copy(src_level, origin(src_rect, src_layer)),
                wgpu::ImageCopyBuffer { buffer, layout },
                extent,
            );
        });
        self.pending = PendingCopy::Readback;
    }

    pub(crate) fn copy_to_texture(
        &mut self,
        src_rect: &EfbRectangle,
        dst: &WgpuTexture,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
        dst_level: u32,
    ) {
        let stride = self.config.stride();
        let offset = self.rect_offset(src_rect, stride) as usize;
        let Some(region) = self.data.get(offset..) else {
            return;
        };
        dst.upload_region(
            origin(dst_rect, dst_layer),
            dst_level,
            dst_rect.width() as u32,
            dst_rect.height() as u32,
            stride,
            region,
        );
        self.pending = PendingCopy::Upload;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{AbstractTextureFormat, TextureFlags};

    #[test]
    fn padded_stride_meets_copy_alignment() {
        let config = TextureConfig::simple(100, 4, AbstractTextureFormat::RGBA8);
        assert_eq!(padded_stride(&config, 100), 512);
        let config = TextureConfig::simple(64, 4, AbstractTextureFormat::RGBA8);
        assert_eq!(padded_stride(&config, 64), 256);
    }

    #[test]
    fn compressed_extents_cover_whole_blocks() {
        let config = TextureConfig::new(
            6,
            2,
            1,
            1,
            1,
            AbstractTextureFormat::DXT1,
            TextureFlags::empty(),
        );
        let extent = block_extent(&config, 6, 2);
        assert_eq!((extent.width, extent.height), (8, 4));
    }

    #[test]
    fn origin_uses_top_left_of_flipped_rect() {
        let o = origin(&EfbRectangle::new(30, 40, 10, 20), 2);
        assert_eq!((o.x, o.y, o.z), (10, 20, 2));
    }
}
