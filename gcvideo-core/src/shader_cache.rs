//! Compiled shader and pipeline caches.
//!
//! Shaders are generated from their uids, compiled through the backend and
//! memoized. A compile failure is cached as `None` so the same broken shader
//! is not rebuilt every draw. Changing the host configuration drops every
//! cache; entries are recreated lazily on next use.

use crate::backend::RenderBackend;
use crate::config::{ApiType, BackendInfo, VideoConfig};
use crate::native_vertex_format::{NativeVertexFormat, PortableVertexDeclaration};
use crate::pipeline::{
    AbstractPipeline, AbstractPipelineConfig, AbstractShader, PipelineUsage, ShaderStage,
};
use crate::render_state::{
    BlendingState, DepthState, FramebufferState, PrimitiveType, RasterizationState,
};
use crate::shader_gen::{framebuffer, tev, vertex};
use crate::shader_gen::{PixelShaderUid, ShaderHostConfig, VertexShaderUid};
use crate::stats::Statistics;
use crate::texture::AbstractTextureFormat;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything that selects a GX pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GxPipelineUid {
    pub vertex_decl: PortableVertexDeclaration,
    pub vs_uid: VertexShaderUid,
    pub ps_uid: PixelShaderUid,
    pub rasterization_state: RasterizationState,
    pub depth_state: DepthState,
    pub blending_state: BlendingState,
}

impl GxPipelineUid {
    /// Pipeline for `decl` with shaders derived from the same texgen count.
    pub fn new(decl: PortableVertexDeclaration, ps_uid: PixelShaderUid) -> Self {
        Self {
            vertex_decl: decl,
            vs_uid: VertexShaderUid::new(&decl, ps_uid.num_texgens),
            ps_uid,
            rasterization_state: RasterizationState::default(),
            depth_state: DepthState::default(),
            blending_state: BlendingState::default(),
        }
    }
}

impl Default for GxPipelineUid {
    fn default() -> Self {
        Self::new(PortableVertexDeclaration::simple(0), PixelShaderUid::default())
    }
}

/// Pipelines the renderer uses for its own draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UtilityPipeline {
    /// Textured full-screen triangle.
    Blit,
    /// Full-screen triangle writing the clear color and/or depth.
    Clear { color: bool, alpha: bool, depth: bool },
    /// Alpha-blended overlay quads.
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UtilityShader {
    ScreenQuadVertex,
    TextureCopyVertex,
    TextureCopyPixel,
    ClearVertex,
    ColorPixel,
    OverlayVertex,
    OverlayPixel,
}

pub struct ShaderCache {
    api: ApiType,
    host: ShaderHostConfig,
    efb_multisamples: u32,
    vertex_formats: HashMap<PortableVertexDeclaration, Arc<NativeVertexFormat>>,
    vertex_shaders: HashMap<VertexShaderUid, Option<Arc<AbstractShader>>>,
    pixel_shaders: HashMap<PixelShaderUid, Option<Arc<AbstractShader>>>,
    utility_shaders: HashMap<UtilityShader, Option<Arc<AbstractShader>>>,
    gx_pipelines: HashMap<GxPipelineUid, Option<Arc<AbstractPipeline>>>,
    utility_pipelines: HashMap<(UtilityPipeline, FramebufferState), Option<Arc<AbstractPipeline>>>,
}

impl ShaderCache {
    pub fn new(info: &BackendInfo, config: &VideoConfig) -> Self {
        Self {
            api: info.api_type,
            host: ShaderHostConfig::from_config(config, info),
            efb_multisamples: config.multisamples.max(1),
            vertex_formats: HashMap::new(),
            vertex_shaders: HashMap::new(),
            pixel_shaders: HashMap::new(),
            utility_shaders: HashMap::new(),
            gx_pipelines: HashMap::new(),
            utility_pipelines: HashMap::new(),
        }
    }

    pub fn api(&self) -> ApiType {
        self.api
    }

    pub fn host_config(&self) -> ShaderHostConfig {
        self.host
    }

    /// Replaces the host configuration and drops every cached object.
    pub fn set_host_config(&mut self, host: ShaderHostConfig, efb_multisamples: u32) {
        log::info!(
            "Shader host config changed ({:#x}, {}x MSAA), clearing shader caches",
            host.bits(),
            efb_multisamples
        );
        self.host = host;
        self.efb_multisamples = efb_multisamples.max(1);
        self.clear();
    }

    pub fn clear(&mut self) {
        self.vertex_shaders.clear();
        self.pixel_shaders.clear();
        self.utility_shaders.clear();
        self.gx_pipelines.clear();
        self.utility_pipelines.clear();
    }

    /// Render-target shape of the EFB pipelines.
    pub fn efb_framebuffer_state(&self) -> FramebufferState {
        FramebufferState {
            color_format: AbstractTextureFormat::RGBA8,
            depth_format: AbstractTextureFormat::D32F,
            samples: self.efb_multisamples,
            per_sample_shading: self.host.contains(ShaderHostConfig::SSAA),
        }
    }

    /// Deduplicated vertex format for `decl`.
    pub fn get_vertex_format(&mut self, decl: &PortableVertexDeclaration) -> Arc<NativeVertexFormat> {
        Arc::clone(
            self.vertex_formats
                .entry(*decl)
                .or_insert_with(|| NativeVertexFormat::new(*decl)),
        )
    }

    pub fn num_gx_pipelines(&self) -> usize {
        self.gx_pipelines.len()
    }

    pub fn num_cached_shaders(&self) -> usize {
        self.vertex_shaders.len() + self.pixel_shaders.len() + self.utility_shaders.len()
    }

    // -- Shaders --

    fn compile(
        backend: &mut dyn RenderBackend,
        stage: ShaderStage,
        source: &str,
        what: &str,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractShader>> {
        match backend.create_shader_from_source(stage, source) {
            Ok(shader) => {
                stats.this_frame.num_shaders_created += 1;
                Some(Arc::new(shader))
            }
            Err(err) => {
                log::error!("Failed to compile {what}: {err}");
                None
            }
        }
    }

    pub fn get_vertex_shader(
        &mut self,
        backend: &mut dyn RenderBackend,
        uid: &VertexShaderUid,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractShader>> {
        if let Some(cached) = self.vertex_shaders.get(uid) {
            return cached.clone();
        }
        let source = vertex::generate_vertex_shader(self.api, self.host, uid);
        let shader = Self::compile(backend, ShaderStage::Vertex, &source, "GX vertex shader", stats);
        self.vertex_shaders.insert(*uid, shader.clone());
        shader
    }

    pub fn get_pixel_shader(
        &mut self,
        backend: &mut dyn RenderBackend,
        uid: &PixelShaderUid,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractShader>> {
        if let Some(cached) = self.pixel_shaders.get(uid) {
            return cached.clone();
        }
        let source = tev::generate_pixel_shader(self.api, self.host, uid);
        let shader = Self::compile(backend, ShaderStage::Pixel, &source, "GX pixel shader", stats);
        self.pixel_shaders.insert(*uid, shader.clone());
        shader
    }

    fn get_utility_shader(
        &mut self,
        backend: &mut dyn RenderBackend,
        which: UtilityShader,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractShader>> {
        if let Some(cached) = self.utility_shaders.get(&which) {
            return cached.clone();
        }
        let (api, host) = (self.api, self.host);
        let (stage, source) = match which {
            UtilityShader::ScreenQuadVertex => (
                ShaderStage::Vertex,
                framebuffer::screen_quad_vertex_shader(api, host),
            ),
            UtilityShader::TextureCopyVertex => (
                ShaderStage::Vertex,
                framebuffer::texture_copy_vertex_shader(api, host),
            ),
            UtilityShader::TextureCopyPixel => (
                ShaderStage::Pixel,
                framebuffer::texture_copy_pixel_shader(api, host),
            ),
            UtilityShader::ClearVertex => (
                ShaderStage::Vertex,
                framebuffer::clear_vertex_shader(api, host),
            ),
            UtilityShader::ColorPixel => (
                ShaderStage::Pixel,
                framebuffer::color_pixel_shader(api, host),
            ),
            UtilityShader::OverlayVertex => (
                ShaderStage::Vertex,
                framebuffer::overlay_vertex_shader(api, host),
            ),
            UtilityShader::OverlayPixel => (
                ShaderStage::Pixel,
                framebuffer::overlay_pixel_shader(api, host),
            ),
        };
        let shader = Self::compile(backend, stage, &source, &format!("{which:?} shader"), stats);
        self.utility_shaders.insert(which, shader.clone());
        shader
    }

    // -- Pipelines --

    fn build_pipeline(
        backend: &mut dyn RenderBackend,
        config: AbstractPipelineConfig,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractPipeline>> {
        match backend.create_pipeline(&config) {
            Ok(pipeline) => {
                stats.this_frame.num_pipelines_created += 1;
                Some(Arc::new(pipeline))
            }
            Err(err) => {
                log::error!("Failed to create {:?} pipeline: {err}", config.usage);
                None
            }
        }
    }

    /// Pipeline for an emulated draw, built on first use.
    pub fn get_pipeline(
        &mut self,
        backend: &mut dyn RenderBackend,
        uid: &GxPipelineUid,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractPipeline>> {
        if let Some(cached) = self.gx_pipelines.get(uid) {
            return cached.clone();
        }
        let pipeline = self.create_gx_pipeline(backend, uid, stats);
        self.gx_pipelines.insert(*uid, pipeline.clone());
        pipeline
    }

    fn create_gx_pipeline(
        &mut self,
        backend: &mut dyn RenderBackend,
        uid: &GxPipelineUid,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractPipeline>> {
        let vertex_shader = self.get_vertex_shader(backend, &uid.vs_uid, stats)?;
        let pixel_shader = self.get_pixel_shader(backend, &uid.ps_uid, stats)?;
        let config = AbstractPipelineConfig {
            vertex_format: Some(self.get_vertex_format(&uid.vertex_decl)),
            vertex_shader,
            geometry_shader: None,
            pixel_shader,
            rasterization_state: uid.rasterization_state,
            depth_state: uid.depth_state,
            blending_state: uid.blending_state,
            framebuffer_state: self.efb_framebuffer_state(),
            usage: PipelineUsage::GX,
        };
        Self::build_pipeline(backend, config, stats)
    }

    /// Utility pipeline of `kind` for a target shaped like `framebuffer`.
    pub fn get_utility_pipeline(
        &mut self,
        backend: &mut dyn RenderBackend,
        kind: UtilityPipeline,
        framebuffer: FramebufferState,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractPipeline>> {
        let key = (kind, framebuffer);
        if let Some(cached) = self.utility_pipelines.get(&key) {
            return cached.clone();
        }
        let pipeline = self.create_utility_pipeline(backend, kind, framebuffer, stats);
        self.utility_pipelines.insert(key, pipeline.clone());
        pipeline
    }

    fn create_utility_pipeline(
        &mut self,
        backend: &mut dyn RenderBackend,
        kind: UtilityPipeline,
        framebuffer: FramebufferState,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractPipeline>> {
        let (vs, ps, vertex_format, depth_state, blending_state) = match kind {
            UtilityPipeline::Blit => (
                UtilityShader::TextureCopyVertex,
                UtilityShader::TextureCopyPixel,
                None,
                DepthState::no_depth(),
                BlendingState::no_blend(),
            ),
            UtilityPipeline::Clear {
                color,
                alpha,
                depth,
            } => (
                UtilityShader::ClearVertex,
                UtilityShader::ColorPixel,
                None,
                if depth {
                    DepthState::always_write()
                } else {
                    DepthState::no_depth()
                },
                BlendingState {
                    color_update: color,
                    alpha_update: alpha,
                    ..BlendingState::no_blend()
                },
            ),
            UtilityPipeline::Overlay => (
                UtilityShader::OverlayVertex,
                UtilityShader::OverlayPixel,
                Some(self.get_vertex_format(&PortableVertexDeclaration::simple(1))),
                DepthState::no_depth(),
                BlendingState::alpha_blend(),
            ),
        };
        let vertex_shader = self.get_utility_shader(backend, vs, stats)?;
        let pixel_shader = self.get_utility_shader(backend, ps, stats)?;
        let config = AbstractPipelineConfig {
            vertex_format,
            vertex_shader,
            geometry_shader: None,
            pixel_shader,
            rasterization_state: RasterizationState::utility(PrimitiveType::Triangles),
            depth_state,
            blending_state,
            framebuffer_state: framebuffer,
            usage: PipelineUsage::Utility,
        };
        Self::build_pipeline(backend, config, stats)
    }

    /// Full-screen triangle vertex shader, for backends drawing their own
    /// post-processing passes.
    pub fn screen_quad_vertex_shader(
        &mut self,
        backend: &mut dyn RenderBackend,
        stats: &mut Statistics,
    ) -> Option<Arc<AbstractShader>> {
        self.get_utility_shader(backend, UtilityShader::ScreenQuadVertex, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::shader_gen::TevStageConfig;
    use crate::shader_gen::tev::AlphaTest;

    fn cache(backend: &NullBackend) -> ShaderCache {
        ShaderCache::new(backend.info(), &VideoConfig::default())
    }

    #[test]
    fn pipelines_are_memoized() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut cache = cache(&backend);
        let mut stats = Statistics::new();
        let uid = GxPipelineUid::default();

        let a = cache.get_pipeline(&mut backend, &uid, &mut stats).unwrap();
        let b = cache.get_pipeline(&mut backend, &uid, &mut stats).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(stats.this_frame.num_pipelines_created, 1);
        assert_eq!(stats.this_frame.num_shaders_created, 2);
        assert_eq!(a.config().framebuffer_state, cache.efb_framebuffer_state());
    }

    #[test]
    fn distinct_uids_get_distinct_pipelines() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut cache = cache(&backend);
        let mut stats = Statistics::new();
        let a = GxPipelineUid::default();
        let mut b = a;
        b.blending_state = BlendingState::alpha_blend();
        cache.get_pipeline(&mut backend, &a, &mut stats);
        cache.get_pipeline(&mut backend, &b, &mut stats);
        assert_eq!(cache.num_gx_pipelines(), 2);
        // Same shaders, only fixed-function state differs.
        assert_eq!(stats.this_frame.num_shaders_created, 2);
    }

    #[test]
    fn host_config_change_clears_caches() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut cache = cache(&backend);
        let mut stats = Statistics::new();
        cache.get_pipeline(&mut backend, &GxPipelineUid::default(), &mut stats);
        assert!(cache.num_cached_shaders() > 0);

        cache.set_host_config(ShaderHostConfig::MSAA, 4);
        assert_eq!(cache.num_gx_pipelines(), 0);
        assert_eq!(cache.num_cached_shaders(), 0);
        assert_eq!(cache.efb_framebuffer_state().samples, 4);
    }

    #[test]
    fn vertex_formats_are_shared() {
        let backend = NullBackend::new(64, 64).unwrap();
        let mut cache = cache(&backend);
        let decl = PortableVertexDeclaration::simple(2);
        let a = cache.get_vertex_format(&decl);
        let b = cache.get_vertex_format(&decl);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn utility_pipelines_use_their_own_state() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut cache = cache(&backend);
        let mut stats = Statistics::new();
        let fb = FramebufferState::default();

        let overlay = cache
            .get_utility_pipeline(&mut backend, UtilityPipeline::Overlay, fb, &mut stats)
            .unwrap();
        assert_eq!(overlay.config().usage, PipelineUsage::Utility);
        assert!(overlay.config().blending_state.blend_enable);
        assert!(overlay.config().vertex_format.is_some());

        let clear = cache
            .get_utility_pipeline(
                &mut backend,
                UtilityPipeline::Clear {
                    color: false,
                    alpha: false,
                    depth: true,
                },
                fb,
                &mut stats,
            )
            .unwrap();
        assert!(!clear.config().blending_state.color_update);
        assert_eq!(clear.config().depth_state, DepthState::always_write());
    }

    #[test]
    fn compile_failures_are_cached_as_none() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut cache = cache(&backend);
        let mut stats = Statistics::new();
        // Seed the cache the way a rejected compile leaves it.
        let uid = PixelShaderUid::new(&[TevStageConfig::default()], 0, AlphaTest::default());
        cache.pixel_shaders.insert(uid, None);
        assert!(cache.get_pixel_shader(&mut backend, &uid, &mut stats).is_none());
        assert_eq!(stats.this_frame.num_shaders_created, 0);

        // The pipeline using it is cached as missing too.
        let gx = GxPipelineUid::new(PortableVertexDeclaration::simple(0), uid);
        assert!(cache.get_pipeline(&mut backend, &gx, &mut stats).is_none());
        assert_eq!(cache.num_gx_pipelines(), 1);
        assert_eq!(stats.this_frame.num_pipelines_created, 0);
    }
}
