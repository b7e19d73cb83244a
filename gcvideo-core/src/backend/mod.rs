//! Graphics backends.
//!
//! Every backend implements [`RenderBackend`]: resource creation, state
//! binding, stream uploads, draw submission and presentation. The active
//! backend is chosen at startup with [`BackendKind`] and held in the tagged
//! [`Backend`] enum, which dereferences to the trait object.

pub mod null;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu;

use crate::config::{BackendInfo, ConfigChangeBits};
use crate::error::{Result, VideoError};
use crate::framebuffer::AbstractFramebuffer;
use crate::math::{EfbRectangle, TargetRectangle};
use crate::pipeline::{AbstractPipeline, AbstractPipelineConfig, AbstractShader, ShaderStage};
use crate::render_state::{ClearColor, SamplerState, Viewport};
use crate::texture::{
    AbstractStagingTexture, AbstractTexture, StagingTextureType, TextureConfig, TextureId,
};
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

pub use null::{NullBackend, NullCounters};

/// Number of texture units exposed to pipelines.
pub const MAX_TEXTURE_UNITS: usize = 8;

// ---------------------------------------------------------------------------
// Stream buffers
// ---------------------------------------------------------------------------

/// How a stream buffer region is mapped for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Append after data the GPU may still be reading.
    NoOverwrite,
    /// Previous contents are no longer needed; start over.
    Discard,
}

/// Which stream buffer an upload goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamTarget {
    /// One slot of the combined vertex/index ring.
    Geometry(u32),
    /// The texel (palette/lookup) buffer.
    Texel,
}

/// Capacities of the streaming buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBufferSizes {
    pub vertex: u32,
    pub index: u32,
    pub buffer_count: u32,
    pub texel: u32,
}

impl StreamBufferSizes {
    pub const VERTEX_STREAM_BUFFER_SIZE: u32 = 8 * 1024 * 1024;
    pub const INDEX_STREAM_BUFFER_SIZE: u32 = 4 * 1024 * 1024;
    pub const BUFFER_COUNT: u32 = 2;
    pub const TEXEL_STREAM_BUFFER_SIZE: u32 = 16 * 1024 * 1024;

    /// Bytes in one geometry slot. Vertex and index data share a slot.
    pub fn slot_size(&self) -> u32 {
        (self.vertex + self.index) / self.buffer_count.max(1)
    }
}

impl Default for StreamBufferSizes {
    fn default() -> Self {
        Self {
            vertex: Self::VERTEX_STREAM_BUFFER_SIZE,
            index: Self::INDEX_STREAM_BUFFER_SIZE,
            buffer_count: Self::BUFFER_COUNT,
            texel: Self::TEXEL_STREAM_BUFFER_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Surfaces
// ---------------------------------------------------------------------------

/// Where presented frames go.
pub enum SurfaceTarget {
    /// Offscreen backbuffer only.
    Headless,
    /// A window surface created from the backend's wgpu instance.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(::wgpu::Surface<'static>),
}

impl std::fmt::Debug for SurfaceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceTarget::Headless => f.write_str("Headless"),
            #[cfg(feature = "wgpu-backend")]
            SurfaceTarget::Wgpu(_) => f.write_str("Wgpu"),
        }
    }
}

/// A new surface handed over by the host thread.
#[derive(Debug)]
pub struct SurfaceRequest {
    pub target: SurfaceTarget,
    pub width: u32,
    pub height: u32,
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Capability set every graphics backend provides.
///
/// Methods are called from the video thread only. Resource creation failures
/// are returned as [`VideoError::ResourceCreation`]; state calls never fail.
pub trait RenderBackend: Send {
    fn info(&self) -> &BackendInfo;

    fn create_texture(&mut self, config: &TextureConfig) -> Result<AbstractTexture>;
    fn create_staging_texture(
        &mut self,
        ty: StagingTextureType,
        config: &TextureConfig,
    ) -> Result<AbstractStagingTexture>;
    fn create_framebuffer(
        &mut self,
        color: Option<Arc<AbstractTexture>>,
        depth: Option<Arc<AbstractTexture>>,
    ) -> Result<AbstractFramebuffer>;
    fn create_shader_from_source(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<AbstractShader>;
    fn create_pipeline(&mut self, config: &AbstractPipelineConfig) -> Result<AbstractPipeline>;

    fn set_pipeline(&mut self, pipeline: Option<&Arc<AbstractPipeline>>);
    fn set_framebuffer(&mut self, framebuffer: &Arc<AbstractFramebuffer>);
    /// Clears the bound framebuffer. `None` leaves that aspect untouched.
    fn clear_framebuffer(&mut self, color: Option<ClearColor>, depth: Option<f32>);
    fn set_scissor_rect(&mut self, rect: &EfbRectangle);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_texture(&mut self, index: u32, texture: Option<&Arc<AbstractTexture>>);
    fn set_sampler_state(&mut self, index: u32, state: &SamplerState);
    /// Removes `texture` from every texture unit it is bound to.
    fn unbind_texture(&mut self, texture: TextureId);

    fn allocate_stream_buffers(&mut self, sizes: &StreamBufferSizes) -> Result<()>;
    fn upload_stream(&mut self, target: StreamTarget, offset: u32, data: &[u8], mode: MapMode);
    fn bind_geometry_stream(&mut self, slot: u32, vertex_stride: u32);
    fn set_uniforms(&mut self, data: &[u8]);
    fn draw(&mut self, base_vertex: u32, num_vertices: u32);
    fn draw_indexed(&mut self, base_index: u32, num_indices: u32, base_vertex: u32);

    /// Makes the swap chain image current and clears it.
    fn bind_backbuffer(&mut self, clear_color: ClearColor);
    fn backbuffer_size(&self) -> (u32, u32);
    /// Scaled copy of `src` into `dst_rect` of the current render target.
    fn blit_texture(
        &mut self,
        dst_rect: &TargetRectangle,
        src: &AbstractTexture,
        src_rect: &EfbRectangle,
        src_layer: u32,
    );
    fn draw_overlay(&mut self, lines: &[String]);
    fn present(&mut self);
    /// Submits recorded work without waiting for it.
    fn flush(&mut self);
    fn wait_for_gpu_idle(&mut self);

    /// Ends any backend-side pass state before the renderer's own drawing.
    fn reset_api_state(&mut self) {}
    fn restore_api_state(&mut self) {}

    fn on_config_changed(&mut self, bits: ConfigChangeBits);
    /// Selects whether presentation waits for vertical blank.
    fn set_vsync(&mut self, _enabled: bool) {}
    /// Replaces the presentation surface. Returns the new backbuffer size.
    fn change_surface(&mut self, request: SurfaceRequest) -> (u32, u32);
    /// Resizes the presentation surface. Returns the new backbuffer size.
    fn resize_surface(&mut self, width: u32, height: u32) -> (u32, u32);
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Accepts every call, draws nothing on a GPU. Headless and tests.
    #[default]
    Null,
    /// wgpu (Vulkan, Metal, D3D12 or GL underneath).
    Wgpu,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Null => "null",
            BackendKind::Wgpu => "wgpu",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(BackendKind::Null),
            "wgpu" => Ok(BackendKind::Wgpu),
            other => Err(VideoError::BackendUnavailable(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

/// The active backend.
pub enum Backend {
    Null(NullBackend),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Box<wgpu::WgpuBackend>),
}

impl Backend {
    /// Creates a backend with an offscreen backbuffer of the given size.
    pub fn create(kind: BackendKind, width: u32, height: u32) -> Result<Self> {
        let backend = match kind {
            BackendKind::Null => Backend::Null(NullBackend::new(width, height)?),
            #[cfg(feature = "wgpu-backend")]
            BackendKind::Wgpu => Backend::Wgpu(Box::new(wgpu::WgpuBackend::new(width, height)?)),
            #[cfg(not(feature = "wgpu-backend"))]
            BackendKind::Wgpu => {
                return Err(VideoError::BackendUnavailable(
                    "built without the wgpu-backend feature".to_string(),
                ))
            }
        };
        log::info!(
            "Video backend initialized: {} ({})",
            kind.name(),
            backend.info().display_name
        );
        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Null(_) => BackendKind::Null,
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu(_) => BackendKind::Wgpu,
        }
    }

    pub fn as_null(&self) -> Option<&NullBackend> {
        match self {
            Backend::Null(null) => Some(null),
            #[cfg(feature = "wgpu-backend")]
            _ => None,
        }
    }

    pub fn as_null_mut(&mut self) -> Option<&mut NullBackend> {
        match self {
            Backend::Null(null) => Some(null),
            #[cfg(feature = "wgpu-backend")]
            _ => None,
        }
    }
}

impl Deref for Backend {
    type Target = dyn RenderBackend;

    fn deref(&self) -> &Self::Target {
        match self {
            Backend::Null(null) => null,
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu(wgpu) => wgpu.as_ref(),
        }
    }
}

impl DerefMut for Backend {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Backend::Null(null) => null,
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu(wgpu) => wgpu.as_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_slot_size_splits_ring() {
        let sizes = StreamBufferSizes::default();
        assert_eq!(sizes.slot_size(), 6 * 1024 * 1024);
    }

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("NULL".parse::<BackendKind>().unwrap(), BackendKind::Null);
        assert_eq!("wgpu".parse::<BackendKind>().unwrap(), BackendKind::Wgpu);
        assert!("metal".parse::<BackendKind>().is_err());
    }

    #[test]
    fn null_backend_is_selectable() {
        let backend = Backend::create(BackendKind::Null, 640, 480).unwrap();
        assert_eq!(backend.kind(), BackendKind::Null);
        assert_eq!(backend.backbuffer_size(), (640, 480));
        assert!(backend.as_null().is_some());
    }
}
