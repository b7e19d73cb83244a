//! Compiled shaders and pipeline objects.
//!
//! Shader source comes from [`crate::shader_gen`]; the backend compiles it
//! into an [`AbstractShader`]. An [`AbstractPipeline`] bundles shaders with
//! the fixed-function state of [`crate::render_state`] and the target shape.

#[cfg(feature = "wgpu-backend")]
use crate::backend::wgpu::{WgpuPipeline, WgpuShader};
use crate::native_vertex_format::NativeVertexFormat;
use crate::render_state::{BlendingState, DepthState, FramebufferState, RasterizationState};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Pixel => "pixel",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) enum ShaderImpl {
    Null,
    #[cfg(feature = "wgpu-backend")]
    Wgpu(WgpuShader),
}

/// A shader compiled by the backend.
pub struct AbstractShader {
    stage: ShaderStage,
    pub(crate) inner: ShaderImpl,
}

impl std::fmt::Debug for AbstractShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbstractShader")
            .field("stage", &self.stage)
            .finish()
    }
}

impl AbstractShader {
    pub(crate) fn new(stage: ShaderStage, inner: ShaderImpl) -> Self {
        Self { stage, inner }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

/// Which resource layout a pipeline is built against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineUsage {
    /// Emulated draws (uniform block + texture units).
    #[default]
    GX,
    /// Renderer-internal draws (blits, clears, overlay).
    Utility,
}

/// Everything needed to create a pipeline.
#[derive(Debug, Clone)]
pub struct AbstractPipelineConfig {
    pub vertex_format: Option<Arc<NativeVertexFormat>>,
    pub vertex_shader: Arc<AbstractShader>,
    pub geometry_shader: Option<Arc<AbstractShader>>,
    pub pixel_shader: Arc<AbstractShader>,
    pub rasterization_state: RasterizationState,
    pub depth_state: DepthState,
    pub blending_state: BlendingState,
    pub framebuffer_state: FramebufferState,
    pub usage: PipelineUsage,
}

pub(crate) enum PipelineImpl {
    Null,
    #[cfg(feature = "wgpu-backend")]
    Wgpu(WgpuPipeline),
}

/// Immutable pipeline state object.
pub struct AbstractPipeline {
    config: AbstractPipelineConfig,
    pub(crate) inner: PipelineImpl,
}

impl std::fmt::Debug for AbstractPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbstractPipeline")
            .field("rasterization", &self.config.rasterization_state)
            .field("usage", &self.config.usage)
            .finish()
    }
}

impl AbstractPipeline {
    pub(crate) fn new(config: AbstractPipelineConfig, inner: PipelineImpl) -> Self {
        Self { config, inner }
    }

    pub fn config(&self) -> &AbstractPipelineConfig {
        &self.config
    }
}
