//! Render targets built from a color and/or depth texture.
//!
//! A framebuffer shares its attachments through `Arc` and caches their
//! shape. Dropping a framebuffer never destroys an attachment that is still
//! referenced elsewhere.

use crate::error::{Result, VideoError};
use crate::math::EfbRectangle;
use crate::texture::{AbstractTexture, AbstractTextureFormat, TextureId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_FRAMEBUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(u64);

/// A color and/or depth attachment pair bound as a render target.
#[derive(Debug)]
pub struct AbstractFramebuffer {
    id: FramebufferId,
    color: Option<Arc<AbstractTexture>>,
    depth: Option<Arc<AbstractTexture>>,
    color_format: AbstractTextureFormat,
    depth_format: AbstractTextureFormat,
    width: u32,
    height: u32,
    layers: u32,
    samples: u32,
}

impl AbstractFramebuffer {
    /// Checks that the attachments can be combined.
    ///
    /// At least one attachment is required. When both are present they must
    /// agree on width, height, layer count and sample count. The color
    /// attachment must be a render target and the depth attachment must use
    /// a depth format.
    pub fn validate_config(
        color: Option<&AbstractTexture>,
        depth: Option<&AbstractTexture>,
    ) -> Result<()> {
        let (color, depth) = match (color, depth) {
            (None, None) => {
                return Err(VideoError::mismatch(
                    "framebuffer needs at least one attachment",
                ))
            }
            (color, depth) => (color, depth),
        };

        if let Some(c) = color {
            if !c.config().is_render_target() {
                return Err(VideoError::mismatch(format!(
                    "color attachment is not a render target: {}",
                    c.config().describe()
                )));
            }
            if c.config().format.is_depth() {
                return Err(VideoError::mismatch(format!(
                    "color attachment has depth format {}",
                    c.config().format
                )));
            }
        }
        if let Some(d) = depth {
            if !d.config().format.is_depth() {
                return Err(VideoError::mismatch(format!(
                    "depth attachment has non-depth format {}",
                    d.config().format
                )));
            }
        }

        if let (Some(c), Some(d)) = (color, depth) {
            let cc = c.config();
            let dc = d.config();
            if cc.width != dc.width
                || cc.height != dc.height
                || cc.layers != dc.layers
                || cc.samples != dc.samples
            {
                return Err(VideoError::mismatch(format!(
                    "attachments disagree: color {}x{}x{} ({} samples), depth {}x{}x{} ({} samples)",
                    cc.width, cc.height, cc.layers, cc.samples,
                    dc.width, dc.height, dc.layers, dc.samples
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn new(
        color: Option<Arc<AbstractTexture>>,
        depth: Option<Arc<AbstractTexture>>,
    ) -> Result<Self> {
        Self::validate_config(color.as_deref(), depth.as_deref())?;

        let shape = color
            .as_deref()
            .or(depth.as_deref())
            .map(|t| *t.config())
            .ok_or_else(|| VideoError::mismatch("framebuffer needs at least one attachment"))?;

        Ok(Self {
            id: FramebufferId(NEXT_FRAMEBUFFER_ID.fetch_add(1, Ordering::Relaxed)),
            color_format: color
                .as_ref()
                .map_or(AbstractTextureFormat::Undefined, |t| t.config().format),
            depth_format: depth
                .as_ref()
                .map_or(AbstractTextureFormat::Undefined, |t| t.config().format),
            color,
            depth,
            width: shape.width,
            height: shape.height,
            layers: shape.layers,
            samples: shape.samples,
        })
    }

    pub fn id(&self) -> FramebufferId {
        self.id
    }

    pub fn color_attachment(&self) -> Option<&Arc<AbstractTexture>> {
        self.color.as_ref()
    }

    pub fn depth_attachment(&self) -> Option<&Arc<AbstractTexture>> {
        self.depth.as_ref()
    }

    pub fn color_format(&self) -> AbstractTextureFormat {
        self.color_format
    }

    pub fn depth_format(&self) -> AbstractTextureFormat {
        self.depth_format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn rect(&self) -> EfbRectangle {
        EfbRectangle::with_size(self.width as i32, self.height as i32)
    }

    /// True if `texture` is one of this framebuffer's attachments.
    pub fn has_attachment(&self, texture: TextureId) -> bool {
        self.color.as_ref().is_some_and(|t| t.id() == texture)
            || self.depth.as_ref().is_some_and(|t| t.id() == texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, RenderBackend};
    use crate::texture::TextureConfig;

    fn texture(backend: &mut NullBackend, config: TextureConfig) -> Arc<AbstractTexture> {
        Arc::new(backend.create_texture(&config).unwrap())
    }

    #[test]
    fn shape_is_taken_from_attachments() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let color = texture(
            &mut backend,
            TextureConfig::render_target(64, 32, AbstractTextureFormat::RGBA8),
        );
        let depth = texture(
            &mut backend,
            TextureConfig::render_target(64, 32, AbstractTextureFormat::D32F),
        );
        let fb = AbstractFramebuffer::new(Some(color.clone()), Some(depth.clone())).unwrap();
        assert_eq!((fb.width(), fb.height(), fb.layers(), fb.samples()), (64, 32, 1, 1));
        assert_eq!(fb.color_format(), AbstractTextureFormat::RGBA8);
        assert_eq!(fb.depth_format(), AbstractTextureFormat::D32F);
        assert!(fb.has_attachment(color.id()));
        assert!(fb.has_attachment(depth.id()));
    }

    #[test]
    fn mismatched_attachment_sizes_are_rejected() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let color = texture(
            &mut backend,
            TextureConfig::render_target(64, 64, AbstractTextureFormat::RGBA8),
        );
        let depth = texture(
            &mut backend,
            TextureConfig::render_target(32, 64, AbstractTextureFormat::D32F),
        );
        let err = AbstractFramebuffer::new(Some(color), Some(depth)).unwrap_err();
        assert!(matches!(err, VideoError::ConfigMismatch(_)));
    }

    #[test]
    fn framebuffer_needs_an_attachment() {
        let err = AbstractFramebuffer::new(None, None).unwrap_err();
        assert!(matches!(err, VideoError::ConfigMismatch(_)));
    }

    #[test]
    fn depth_only_framebuffer_is_valid() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let depth = texture(
            &mut backend,
            TextureConfig::render_target(16, 16, AbstractTextureFormat::D16),
        );
        let fb = AbstractFramebuffer::new(None, Some(depth)).unwrap();
        assert_eq!(fb.color_format(), AbstractTextureFormat::Undefined);
        assert_eq!(fb.rect(), EfbRectangle::with_size(16, 16));
    }
}
