//! GPU textures and CPU-visible staging textures.
//!
//! [`AbstractTexture`] is the backend-neutral handle to an image resource.
//! Its shape is fixed by a [`TextureConfig`] at creation. Textures are shared
//! through `Arc` by framebuffers, the texture cache and the renderer; the
//! GPU resource is released when the last handle drops.
//!
//! [`AbstractStagingTexture`] mirrors a texture region in CPU memory. The
//! mapped view is only valid between [`AbstractStagingTexture::map`] and
//! [`AbstractStagingTexture::unmap`], and a GPU copy always unmaps first.

use crate::backend::null::{NullStagingTexture, NullTexture};
#[cfg(feature = "wgpu-backend")]
use crate::backend::wgpu::{WgpuStagingTexture, WgpuTexture};
use crate::math::EfbRectangle;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Formats and configuration
// ---------------------------------------------------------------------------

/// Pixel formats a texture may be created with.
#[allow(non_camel_case_types)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbstractTextureFormat {
    RGBA8,
    BGRA8,
    DXT1,
    DXT3,
    DXT5,
    BPTC,
    R16,
    D16,
    D24_S8,
    R32F,
    D32F,
    D32F_S8,
    #[default]
    Undefined,
}

impl AbstractTextureFormat {
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Self::DXT1 | Self::DXT3 | Self::DXT5 | Self::BPTC
        )
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::D16 | Self::D24_S8 | Self::D32F | Self::D32F_S8)
    }

    pub fn is_stencil(self) -> bool {
        matches!(self, Self::D24_S8 | Self::D32F_S8)
    }

    /// Edge length of one addressable block (4 for block-compressed formats).
    pub fn block_size(self) -> u32 {
        if self.is_compressed() {
            4
        } else {
            1
        }
    }

    /// Bytes per texel, or per 4x4 block for compressed formats.
    pub fn texel_size(self) -> u32 {
        match self {
            Self::DXT1 => 8,
            Self::DXT3 | Self::DXT5 | Self::BPTC => 16,
            Self::R16 | Self::D16 => 2,
            Self::RGBA8 | Self::BGRA8 | Self::D24_S8 | Self::R32F | Self::D32F => 4,
            Self::D32F_S8 => 8,
            Self::Undefined => 0,
        }
    }

    /// Bytes in one row of blocks for an image `width` pixels wide.
    pub fn stride_for(self, width: u32) -> u32 {
        width.div_ceil(self.block_size()) * self.texel_size()
    }

    /// Number of block rows for an image `height` pixels tall.
    pub fn rows_for(self, height: u32) -> u32 {
        height.div_ceil(self.block_size())
    }
}

impl std::fmt::Display for AbstractTextureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

bitflags! {
    /// Usage flags fixed at texture creation.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        const RENDER_TARGET = 1 << 0;
        const COMPUTE_IMAGE = 1 << 1;
    }
}

/// Shape of a texture resource. Immutable once the texture exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureConfig {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub layers: u32,
    pub samples: u32,
    pub format: AbstractTextureFormat,
    pub flags: TextureFlags,
}

impl TextureConfig {
    pub fn new(
        width: u32,
        height: u32,
        levels: u32,
        layers: u32,
        samples: u32,
        format: AbstractTextureFormat,
        flags: TextureFlags,
    ) -> Self {
        Self {
            width,
            height,
            levels,
            layers,
            samples,
            format,
            flags,
        }
    }

    /// Single-level, single-layer, single-sample 2D texture.
    pub fn simple(width: u32, height: u32, format: AbstractTextureFormat) -> Self {
        Self::new(width, height, 1, 1, 1, format, TextureFlags::empty())
    }

    /// Single-level render target.
    pub fn render_target(width: u32, height: u32, format: AbstractTextureFormat) -> Self {
        Self::new(width, height, 1, 1, 1, format, TextureFlags::RENDER_TARGET)
    }

    pub fn rect(&self) -> EfbRectangle {
        EfbRectangle::with_size(self.width as i32, self.height as i32)
    }

    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    pub fn is_render_target(&self) -> bool {
        self.flags.contains(TextureFlags::RENDER_TARGET)
    }

    pub fn is_compute_image(&self) -> bool {
        self.flags.contains(TextureFlags::COMPUTE_IMAGE)
    }

    /// Row pitch of level 0 in bytes.
    pub fn stride(&self) -> u32 {
        self.format.stride_for(self.width)
    }

    pub fn mip_width(&self, level: u32) -> u32 {
        (self.width >> level).max(1)
    }

    pub fn mip_height(&self, level: u32) -> u32 {
        (self.height >> level).max(1)
    }

    pub fn mip_size(&self, level: u32) -> (u32, u32) {
        (self.mip_width(level), self.mip_height(level))
    }

    pub fn mip_rect(&self, level: u32) -> EfbRectangle {
        let (width, height) = self.mip_size(level);
        EfbRectangle::with_size(width as i32, height as i32)
    }

    /// Size in bytes of level 0 of one layer.
    pub fn level0_size(&self) -> usize {
        self.stride() as usize * self.format.rows_for(self.height) as usize
    }

    pub fn describe(&self) -> String {
        format!(
            "{}x{} levels={} layers={} samples={} format={} flags={:?}",
            self.width, self.height, self.levels, self.layers, self.samples, self.format, self.flags
        )
    }
}

// ---------------------------------------------------------------------------
// AbstractTexture
// ---------------------------------------------------------------------------

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique texture identity. Used to detect read/write aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

pub(crate) enum TextureImpl {
    Null(NullTexture),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(WgpuTexture),
}

/// A GPU-resident image.
pub struct AbstractTexture {
    id: TextureId,
    config: TextureConfig,
    pub(crate) inner: TextureImpl,
}

impl std::fmt::Debug for AbstractTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbstractTexture")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}

impl AbstractTexture {
    pub(crate) fn new(config: TextureConfig, inner: TextureImpl) -> Self {
        Self {
            id: TextureId::next(),
            config,
            inner,
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn config(&self) -> &TextureConfig {
        &self.config
    }

    /// Uploads linear pixel data into `level` of layer 0.
    ///
    /// `row_length` is the source row length in pixels and may exceed `width`.
    pub fn load(&self, level: u32, width: u32, height: u32, row_length: u32, data: &[u8]) {
        debug_assert!(level < self.config.levels, "mip level out of range");
        debug_assert!(row_length >= width, "row length shorter than width");
        let src_stride = self.config.format.stride_for(row_length) as usize;
        let rows = self.config.format.rows_for(height) as usize;
        let needed = src_stride * rows.saturating_sub(1)
            + self.config.format.stride_for(width) as usize;
        if data.len() < needed {
            debug_assert!(false, "texture upload buffer too small");
            log::error!(
                "Texture load of {}x{} needs {} bytes, got {}",
                width,
                height,
                needed,
                data.len()
            );
            return;
        }

        match &self.inner {
            TextureImpl::Null(tex) => tex.load(level, width, height, src_stride, data),
            #[cfg(feature = "wgpu-backend")]
            TextureImpl::Wgpu(tex) => tex.load(level, width, height, src_stride as u32, data),
        }
    }

    /// GPU-side copy without scaling. Source and destination rectangles must
    /// be the same size.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_rectangle_from_texture(
        &self,
        src: &AbstractTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        src_level: u32,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
        dst_level: u32,
    ) {
        debug_assert!(
            src_rect.width() == dst_rect.width() && src_rect.height() == dst_rect.height(),
            "copy rectangles must be the same size"
        );
        debug_assert!(src_rect.fits_within(
            src.config.mip_width(src_level),
            src.config.mip_height(src_level)
        ));
        debug_assert!(dst_rect.fits_within(
            self.config.mip_width(dst_level),
            self.config.mip_height(dst_level)
        ));

        match (&self.inner, &src.inner) {
            (TextureImpl::Null(dst), TextureImpl::Null(src_tex)) => dst.copy_from(
                src_tex, src_rect, src_layer, src_level, dst_rect, dst_layer, dst_level,
            ),
            #[cfg(feature = "wgpu-backend")]
            (TextureImpl::Wgpu(dst), TextureImpl::Wgpu(src_tex)) => dst.copy_from(
                src_tex, src_rect, src_layer, src_level, dst_rect, dst_layer, dst_level,
            ),
            #[cfg(feature = "wgpu-backend")]
            _ => log_backend_mismatch("copy_rectangle_from_texture"),
        }
    }

    /// Resolves multisampled `src` into this single-sampled texture.
    pub fn resolve_from_texture(
        &self,
        src: &AbstractTexture,
        rect: &EfbRectangle,
        layer: u32,
        level: u32,
    ) {
        debug_assert!(
            src.config.samples > 1 && self.config.samples == 1,
            "resolve requires a multisampled source and single-sampled destination"
        );
        debug_assert!(
            src.config.width == self.config.width && src.config.height == self.config.height,
            "resolve requires equal dimensions"
        );

        match (&self.inner, &src.inner) {
            (TextureImpl::Null(dst), TextureImpl::Null(src_tex)) => {
                dst.copy_from(src_tex, rect, layer, level, rect, layer, level)
            }
            #[cfg(feature = "wgpu-backend")]
            (TextureImpl::Wgpu(dst), TextureImpl::Wgpu(src_tex)) => {
                dst.resolve_from(src_tex, rect, layer, level)
            }
            #[cfg(feature = "wgpu-backend")]
            _ => log_backend_mismatch("resolve_from_texture"),
        }
    }

    /// Scaled copy of layer 0, level 0 of `src` into `dst_rect`.
    pub fn scale_rectangle_from_texture(
        &self,
        src: &AbstractTexture,
        src_rect: &EfbRectangle,
        dst_rect: &EfbRectangle,
    ) {
        debug_assert!(self.config.is_render_target());
        match (&self.inner, &src.inner) {
            (TextureImpl::Null(dst), TextureImpl::Null(src_tex)) => {
                dst.scale_from(src_tex, src_rect, 0, dst_rect, 0)
            }
            #[cfg(feature = "wgpu-backend")]
            (TextureImpl::Wgpu(dst), TextureImpl::Wgpu(src_tex)) => {
                dst.scale_from(src_tex, src_rect, dst_rect)
            }
            #[cfg(feature = "wgpu-backend")]
            _ => log_backend_mismatch("scale_rectangle_from_texture"),
        }
    }
}

#[cfg(feature = "wgpu-backend")]
#[cold]
fn log_backend_mismatch(op: &str) {
    debug_assert!(false, "{op}: textures belong to different backends");
    log::error!("{op}: textures belong to different backends");
}

// ---------------------------------------------------------------------------
// AbstractStagingTexture
// ---------------------------------------------------------------------------

/// Direction a staging texture can transfer in. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagingTextureType {
    /// GPU -> CPU.
    Readback,
    /// CPU -> GPU.
    Upload,
    /// Both directions.
    Mutable,
}

pub(crate) enum StagingImpl {
    Null(NullStagingTexture),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(WgpuStagingTexture),
}

/// CPU-mappable mirror of a texture region.
pub struct AbstractStagingTexture {
    ty: StagingTextureType,
    config: TextureConfig,
    texel_size: u32,
    map_stride: u32,
    mapped: bool,
    needs_flush: bool,
    inner: StagingImpl,
}

impl std::fmt::Debug for AbstractStagingTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbstractStagingTexture")
            .field("ty", &self.ty)
            .field("config", &self.config)
            .field("mapped", &self.mapped)
            .field("needs_flush", &self.needs_flush)
            .finish()
    }
}

impl AbstractStagingTexture {
    pub(crate) fn new(ty: StagingTextureType, config: TextureConfig, inner: StagingImpl) -> Self {
        Self {
            ty,
            config,
            texel_size: config.format.texel_size(),
            map_stride: config.stride(),
            mapped: false,
            needs_flush: false,
            inner,
        }
    }

    pub fn ty(&self) -> StagingTextureType {
        self.ty
    }

    pub fn config(&self) -> &TextureConfig {
        &self.config
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn needs_flush(&self) -> bool {
        self.needs_flush
    }

    pub fn mapped_stride(&self) -> u32 {
        self.map_stride
    }

    /// Maps the CPU view. Returns true if the texture is (already) mapped.
    ///
    /// Completes any outstanding GPU copy first, which may block.
    pub fn map(&mut self) -> bool {
        if self.mapped {
            return true;
        }
        if self.needs_flush {
            self.flush();
        }
        let ok = match &mut self.inner {
            StagingImpl::Null(_) => true,
            #[cfg(feature = "wgpu-backend")]
            StagingImpl::Wgpu(staging) => staging.map(),
        };
        self.mapped = ok;
        ok
    }

    pub fn unmap(&mut self) {
        if !self.mapped {
            return;
        }
        match &mut self.inner {
            StagingImpl::Null(_) => {}
            #[cfg(feature = "wgpu-backend")]
            StagingImpl::Wgpu(staging) => staging.unmap(),
        }
        self.mapped = false;
    }

    /// Waits for the last GPU copy to finish. Must be called between a
    /// `copy_from_texture` and reading the mapped data.
    pub fn flush(&mut self) {
        if !self.needs_flush {
            return;
        }
        match &mut self.inner {
            StagingImpl::Null(_) => {}
            #[cfg(feature = "wgpu-backend")]
            StagingImpl::Wgpu(staging) => staging.flush(),
        }
        self.needs_flush = false;
    }

    /// Mapped bytes, `mapped_stride()` bytes per row.
    pub fn mapped_data(&self) -> Option<&[u8]> {
        if !self.mapped {
            return None;
        }
        Some(match &self.inner {
            StagingImpl::Null(staging) => staging.data(),
            #[cfg(feature = "wgpu-backend")]
            StagingImpl::Wgpu(staging) => staging.data(),
        })
    }

    pub fn mapped_data_mut(&mut self) -> Option<&mut [u8]> {
        if !self.mapped {
            return None;
        }
        Some(match &mut self.inner {
            StagingImpl::Null(staging) => staging.data_mut(),
            #[cfg(feature = "wgpu-backend")]
            StagingImpl::Wgpu(staging) => staging.data_mut(),
        })
    }

    /// Queues a GPU copy of `src_rect` of `src` into `dst_rect` of this
    /// staging texture. Unmaps first if mapped.
    pub fn copy_from_texture(
        &mut self,
        src: &AbstractTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
        src_level: u32,
        dst_rect: &EfbRectangle,
    ) {
        debug_assert!(
            self.ty != StagingTextureType::Upload,
            "cannot read back into an upload staging texture"
        );
        debug_assert!(
            src_rect.width() == dst_rect.width() && src_rect.height() == dst_rect.height(),
            "staging copy rectangles must be the same size"
        );
        debug_assert!(src_rect.fits_within(
            src.config.mip_width(src_level),
            src.config.mip_height(src_level)
        ));
        debug_assert!(dst_rect.fits_within(self.config.width, self.config.height));

        if self.mapped {
            self.unmap();
        }

        match (&mut self.inner, &src.inner) {
            (StagingImpl::Null(staging), TextureImpl::Null(tex)) => {
                staging.copy_from_texture(tex, src_rect, src_layer, src_level, dst_rect)
            }
            #[cfg(feature = "wgpu-backend")]
            (StagingImpl::Wgpu(staging), TextureImpl::Wgpu(tex)) => {
                staging.copy_from_texture(tex, src_rect, src_layer, src_level, dst_rect)
            }
            #[cfg(feature = "wgpu-backend")]
            _ => {
                log_backend_mismatch("copy_from_texture");
                return;
            }
        }
        self.needs_flush = true;
    }

    /// Copies the whole of `src` (`layer`, `level`) into this texture.
    pub fn copy_from_texture_all(&mut self, src: &AbstractTexture, layer: u32, level: u32) {
        let rect = self.config.rect();
        self.copy_from_texture(src, &rect, layer, level, &rect);
    }

    /// Queues a GPU copy of `src_rect` of this staging texture into `dst`.
    /// Unmaps first if mapped.
    pub fn copy_to_texture(
        &mut self,
        src_rect: &EfbRectangle,
        dst: &AbstractTexture,
        dst_rect: &EfbRectangle,
        dst_layer: u32,
        dst_level: u32,
    ) {
        debug_assert!(
            self.ty != StagingTextureType::Readback,
            "cannot upload from a readback staging texture"
        );
        debug_assert!(
            src_rect.width() == dst_rect.width() && src_rect.height() == dst_rect.height(),
            "staging copy rectangles must be the same size"
        );
        debug_assert!(src_rect.fits_within(self.config.width, self.config.height));
        debug_assert!(dst_rect.fits_within(
            dst.config.mip_width(dst_level),
            dst.config.mip_height(dst_level)
        ));

        if self.mapped {
            self.unmap();
        }

        match (&mut self.inner, &dst.inner) {
            (StagingImpl::Null(staging), TextureImpl::Null(tex)) => {
                staging.copy_to_texture(src_rect, tex, dst_rect, dst_layer, dst_level)
            }
            #[cfg(feature = "wgpu-backend")]
            (StagingImpl::Wgpu(staging), TextureImpl::Wgpu(tex)) => {
                staging.copy_to_texture(src_rect, tex, dst_rect, dst_layer, dst_level)
            }
            #[cfg(feature = "wgpu-backend")]
            _ => {
                log_backend_mismatch("copy_to_texture");
                return;
            }
        }
        self.needs_flush = true;
    }

    fn prepare_for_access(&mut self) -> bool {
        if self.needs_flush {
            if self.mapped {
                self.unmap();
            }
            self.flush();
        }
        self.map()
    }

    fn region_offset(&self, rect: &EfbRectangle) -> usize {
        let block = self.config.format.block_size() as i32;
        (rect.top / block) as usize * self.map_stride as usize
            + (rect.left / block) as usize * self.texel_size as usize
    }

    /// Copies `rect` out of the mapped view into `out` (rows `out_stride` apart).
    pub fn read_texels(&mut self, rect: &EfbRectangle, out: &mut [u8], out_stride: u32) {
        debug_assert!(self.ty != StagingTextureType::Upload);
        if !self.prepare_for_access() {
            return;
        }
        debug_assert!(rect.fits_within(self.config.width, self.config.height));

        let offset = self.region_offset(rect);
        let map_stride = self.map_stride as usize;
        let block = self.config.format.block_size();
        let rows = (rect.height() as u32).div_ceil(block) as usize;
        let copy_size = ((rect.width() as u32).div_ceil(block) * self.texel_size) as usize;
        let copy_size = copy_size.min(map_stride);
        let out_stride = out_stride as usize;
        let Some(data) = self.mapped_data() else {
            return;
        };

        if rect.left == 0 && rect.width() as u32 == self.config.width && out_stride == map_stride
        {
            let len = map_stride * rows;
            out[..len].copy_from_slice(&data[offset..offset + len]);
            return;
        }

        for row in 0..rows {
            let src = offset + row * map_stride;
            let dst = row * out_stride;
            out[dst..dst + copy_size].copy_from_slice(&data[src..src + copy_size]);
        }
    }

    /// Reads the texel at (`x`, `y`) into `out` (`texel_size` bytes).
    pub fn read_texel(&mut self, x: u32, y: u32, out: &mut [u8]) {
        debug_assert!(self.ty != StagingTextureType::Upload);
        if !self.prepare_for_access() {
            return;
        }
        debug_assert!(x < self.config.width && y < self.config.height);
        let offset = y as usize * self.map_stride as usize + x as usize * self.texel_size as usize;
        let size = self.texel_size as usize;
        if let Some(data) = self.mapped_data() {
            out[..size].copy_from_slice(&data[offset..offset + size]);
        }
    }

    /// Copies `data` (rows `data_stride` apart) into `rect` of the mapped view.
    pub fn write_texels(&mut self, rect: &EfbRectangle, data: &[u8], data_stride: u32) {
        debug_assert!(self.ty != StagingTextureType::Readback);
        if !self.prepare_for_access() {
            return;
        }
        debug_assert!(rect.fits_within(self.config.width, self.config.height));

        let offset = self.region_offset(rect);
        let map_stride = self.map_stride as usize;
        let block = self.config.format.block_size();
        let rows = (rect.height() as u32).div_ceil(block) as usize;
        let copy_size = ((rect.width() as u32).div_ceil(block) * self.texel_size) as usize;
        let copy_size = copy_size.min(map_stride);
        let data_stride = data_stride as usize;
        let full_rows =
            rect.left == 0 && rect.width() as u32 == self.config.width && data_stride == map_stride;
        let Some(mapped) = self.mapped_data_mut() else {
            return;
        };

        if full_rows {
            let len = map_stride * rows;
            mapped[offset..offset + len].copy_from_slice(&data[..len]);
            return;
        }

        for row in 0..rows {
            let dst = offset + row * map_stride;
            let src = row * data_stride;
            mapped[dst..dst + copy_size].copy_from_slice(&data[src..src + copy_size]);
        }
    }

    pub fn write_texel(&mut self, x: u32, y: u32, texel: &[u8]) {
        debug_assert!(self.ty != StagingTextureType::Readback);
        if !self.prepare_for_access() {
            return;
        }
        debug_assert!(x < self.config.width && y < self.config.height);
        let offset = y as usize * self.map_stride as usize + x as usize * self.texel_size as usize;
        let size = self.texel_size as usize;
        if let Some(mapped) = self.mapped_data_mut() {
            mapped[offset..offset + size].copy_from_slice(&texel[..size]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_strides_use_blocks() {
        assert_eq!(AbstractTextureFormat::DXT1.stride_for(16), 32);
        assert_eq!(AbstractTextureFormat::DXT5.stride_for(6), 32);
        assert_eq!(AbstractTextureFormat::DXT1.rows_for(6), 2);
        assert_eq!(AbstractTextureFormat::RGBA8.stride_for(640), 2560);
        assert_eq!(AbstractTextureFormat::RGBA8.rows_for(528), 528);
    }

    #[test]
    fn format_classification() {
        assert!(AbstractTextureFormat::D24_S8.is_depth());
        assert!(AbstractTextureFormat::D24_S8.is_stencil());
        assert!(!AbstractTextureFormat::D32F.is_stencil());
        assert!(AbstractTextureFormat::BPTC.is_compressed());
        assert!(!AbstractTextureFormat::R16.is_compressed());
    }

    #[test]
    fn mip_dimensions_never_reach_zero() {
        let config = TextureConfig::new(
            64,
            16,
            8,
            1,
            1,
            AbstractTextureFormat::RGBA8,
            TextureFlags::empty(),
        );
        assert_eq!(config.mip_width(3), 8);
        assert_eq!(config.mip_height(5), 1);
        assert_eq!(config.mip_width(7), 1);
    }

    #[test]
    fn texture_ids_are_unique() {
        let a = TextureId::next();
        let b = TextureId::next();
        assert_ne!(a, b);
    }
}
