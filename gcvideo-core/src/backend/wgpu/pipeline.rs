// Shader modules, bind group layouts and render pipelines.

use super::context::GpuContext;
use super::format;
use crate::backend::MAX_TEXTURE_UNITS;
use crate::error::{ResourceKind, Result, VideoError};
use crate::pipeline::{
    AbstractPipelineConfig, AbstractShader, PipelineUsage, ShaderImpl, ShaderStage,
};
use crate::render_state::{CullMode, PrimitiveType};
use crate::texture::AbstractTextureFormat;

pub(crate) use crate::shader_gen::framebuffer::wgsl::SAMPLER_BINDING_BASE;

/// Bytes reserved per uniform upload. Covers the largest block (GX).
pub(crate) const UNIFORM_SLOT_SIZE: u64 = 1024;

pub struct WgpuShader {
    module: wgpu::ShaderModule,
}

impl WgpuShader {
    pub(crate) fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }
}

pub struct WgpuPipeline {
    pipeline: wgpu::RenderPipeline,
    culls_all: bool,
}

impl WgpuPipeline {
    pub(crate) fn raw(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    /// True when every primitive would be culled.
    pub(crate) fn culls_all(&self) -> bool {
        self.culls_all
    }
}

/// Layouts shared by every pipeline: group 0 holds the uniform block at a
/// dynamic offset, group 1 the texture units and their samplers.
pub(crate) struct PipelineLayouts {
    pub uniforms: wgpu::BindGroupLayout,
    pub textures: wgpu::BindGroupLayout,
    pub layout: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform block"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_SLOT_SIZE),
                },
                count: None,
            }],
        });

        let mut entries = Vec::with_capacity(MAX_TEXTURE_UNITS * 2);
        for unit in 0..MAX_TEXTURE_UNITS as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: unit,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2Array,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: SAMPLER_BINDING_BASE + unit,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture units"),
            entries: &entries,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gcvideo pipeline layout"),
            bind_group_layouts: &[&uniforms, &textures],
            push_constant_ranges: &[],
        });

        Self {
            uniforms,
            textures,
            layout,
        }
    }
}

pub(crate) fn create_shader(
    ctx: &GpuContext,
    stage: ShaderStage,
    source: &str,
) -> Result<WgpuShader> {
    if stage == ShaderStage::Geometry {
        return Err(VideoError::ShaderCompilation {
            stage: stage.to_string(),
            api: "WGSL".to_string(),
            log: "geometry shaders are not supported by wgpu".to_string(),
        });
    }
    let module = ctx
        .validated(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(stage.name()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
        .map_err(|log| VideoError::ShaderCompilation {
            stage: stage.to_string(),
            api: "WGSL".to_string(),
            log,
        })?;
    Ok(WgpuShader { module })
}

fn wgpu_shader(shader: &AbstractShader) -> Result<&WgpuShader> {
    match &shader.inner {
        ShaderImpl::Wgpu(s) => Ok(s),
        _ => Err(VideoError::resource(
            ResourceKind::Pipeline,
            format!("{} shader was not created by the wgpu backend", shader.stage()),
        )),
    }
}

fn optional_format(
    format: AbstractTextureFormat,
    features: wgpu::Features,
) -> Result<Option<wgpu::TextureFormat>> {
    if format == AbstractTextureFormat::Undefined {
        return Ok(None);
    }
    format::texture_format(format, features).map(Some)
}

pub(crate) fn create_pipeline(
    ctx: &GpuContext,
    layouts: &PipelineLayouts,
    config: &AbstractPipelineConfig,
) -> Result<WgpuPipeline> {
    if config.vertex_shader.stage() != ShaderStage::Vertex
        || config.pixel_shader.stage() != ShaderStage::Pixel
    {
        return Err(VideoError::resource(
            ResourceKind::Pipeline,
            "shader stages do not match their pipeline slots",
        ));
    }
    if config.geometry_shader.is_some() {
        log::warn!("Geometry shader ignored, wgpu has no geometry stage");
    }
    let vs = wgpu_shader(&config.vertex_shader)?;
    let ps = wgpu_shader(&config.pixel_shader)?;

    let features = ctx.features();
    let fb = &config.framebuffer_state;
    let color_format = optional_format(fb.color_format, features)?;
    let depth_format = optional_format(fb.depth_format, features)?;

    let attributes = config
        .vertex_format
        .as_ref()
        .map(|vf| format::vertex_attributes(vf.decl()))
        .unwrap_or_default();
    let vertex_buffers: Vec<wgpu::VertexBufferLayout<'_>> = config
        .vertex_format
        .as_ref()
        .map(|vf| wgpu::VertexBufferLayout {
            array_stride: vf.stride() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        })
        .into_iter()
        .collect();

    let targets: Vec<Option<wgpu::ColorTargetState>> = color_format
        .map(|f| format::color_target_state(f, &config.blending_state))
        .into_iter()
        .map(Some)
        .collect();

    let pipeline = ctx
        .validated(|device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(match config.usage {
                    PipelineUsage::GX => "gx pipeline",
                    PipelineUsage::Utility => "utility pipeline",
                }),
                layout: Some(&layouts.layout),
                vertex: wgpu::VertexState {
                    module: vs.module(),
                    entry_point: "main",
                    buffers: &vertex_buffers,
                },
                primitive: format::primitive_state(&config.rasterization_state),
                depth_stencil: depth_format
                    .map(|f| format::depth_stencil_state(f, &config.depth_state)),
                multisample: wgpu::MultisampleState {
                    count: fb.samples.max(1),
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module: ps.module(),
                    entry_point: "main",
                    targets: &targets,
                }),
                multiview: None,
            })
        })
        .map_err(|log| VideoError::resource(ResourceKind::Pipeline, log))?;

    let raster = &config.rasterization_state;
    let culls_all = raster.cull_mode == CullMode::All
        && matches!(
            raster.primitive,
            PrimitiveType::Triangles | PrimitiveType::TriangleStrip
        );
    Ok(WgpuPipeline {
        pipeline,
        culls_all,
    })
}
