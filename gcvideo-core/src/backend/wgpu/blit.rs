// Scaled texture copies drawn as a full-screen triangle.
//
// Used for texture scaling, blits to the current target and presenting
// the backbuffer to the window surface. Pipelines are created per
// destination format on first use.

use crate::config::ApiType;
use crate::math::EfbRectangle;
use crate::shader_gen::framebuffer::{texture_copy_pixel_shader, texture_copy_vertex_shader};
use crate::shader_gen::ShaderHostConfig;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct CopyUniforms {
    src_offset: [f32; 2],
    src_size: [f32; 2],
}

/// Source of a blit: a single-layer array view and its full size.
pub(crate) struct BlitSource<'a> {
    pub view: &'a wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub rect: EfbRectangle,
}

/// Destination of a blit.
pub(crate) struct BlitTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub rect: EfbRectangle,
    /// Clear color for the whole target, or `None` to keep its contents.
    pub clear: Option<wgpu::Color>,
}

pub(crate) struct Blitter {
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    layout: wgpu::PipelineLayout,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    linear: wgpu::Sampler,
    nearest: wgpu::Sampler,
    pipelines: Mutex<HashMap<wgpu::TextureFormat, Arc<wgpu::RenderPipeline>>>,
}

impl Blitter {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit uniforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit source"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: super::pipeline::SAMPLER_BINDING_BASE,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let host = ShaderHostConfig::empty();
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit vertex"),
            source: wgpu::ShaderSource::Wgsl(texture_copy_vertex_shader(ApiType::Wgsl, host).into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit pixel"),
            source: wgpu::ShaderSource::Wgsl(texture_copy_pixel_shader(ApiType::Wgsl, host).into()),
        });

        let sampler = |filter, label| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };

        Self {
            linear: sampler(wgpu::FilterMode::Linear, "blit linear"),
            nearest: sampler(wgpu::FilterMode::Nearest, "blit nearest"),
            uniform_layout,
            texture_layout,
            layout,
            vertex,
            fragment,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    fn pipeline(&self, device: &wgpu::Device, format: wgpu::TextureFormat) -> Arc<wgpu::RenderPipeline> {
        let mut pipelines = self.pipelines.lock().unwrap_or_else(PoisonError::into_inner);
        let pipeline = pipelines.entry(format).or_insert_with(|| {
            Arc::new(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("blit"),
                layout: Some(&self.layout),
                vertex: wgpu::VertexState {
                    module: &self.vertex,
                    entry_point: "main",
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.fragment,
                    entry_point: "main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            }))
        });
        Arc::clone(pipeline)
    }

    /// Records a scaled copy. Linear filtering is used when the sizes differ.
    pub fn blit(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        src: &BlitSource<'_>,
        dst: &BlitTarget<'_>,
    ) {
        let Some((x, y, w, h)) = clamp_rect(&dst.rect, dst.width, dst.height) else {
            log::debug!("Blit destination {:?} outside target, skipped", dst.rect);
            return;
        };
        if src.width == 0 || src.height == 0 {
            return;
        }

        let (sw, sh) = (src.width as f32, src.height as f32);
        let uniforms = CopyUniforms {
            src_offset: [src.rect.left as f32 / sw, src.rect.top as f32 / sh],
            src_size: [
                (src.rect.right - src.rect.left) as f32 / sw,
                (src.rect.bottom - src.rect.top) as f32 / sh,
            ],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("blit uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit uniforms"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let scaled = src.rect.width() != dst.rect.width() || src.rect.height() != dst.rect.height();
        let sampler = if scaled { &self.linear } else { &self.nearest };
        let texture_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit source"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src.view),
                },
                wgpu::BindGroupEntry {
                    binding: super::pipeline::SAMPLER_BINDING_BASE,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let pipeline = self.pipeline(device, dst.format);
        let load = match dst.clear {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &uniform_group, &[]);
        pass.set_bind_group(1, &texture_group, &[]);
        pass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
        pass.set_scissor_rect(x, y, w, h);
        pass.draw(0..3, 0..1);
    }
}

/// Intersects `rect` with the target. Returns `(x, y, width, height)`, or
/// `None` when nothing is left.
pub(crate) fn clamp_rect(rect: &EfbRectangle, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let left = rect.left.min(rect.right).clamp(0, width as i32);
    let right = rect.left.max(rect.right).clamp(0, width as i32);
    let top = rect.top.min(rect.bottom).clamp(0, height as i32);
    let bottom = rect.top.max(rect.bottom).clamp(0, height as i32);
    if right <= left || bottom <= top {
        return None;
    }
    Some((
        left as u32,
        top as u32,
        (right - left) as u32,
        (bottom - top) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rect_trims_to_target() {
        let rc = EfbRectangle::new(-10, 20, 700, 500);
        assert_eq!(clamp_rect(&rc, 640, 480), Some((0, 20, 640, 460)));
    }

    #[test]
    fn clamp_rect_normalizes_flipped() {
        let rc = EfbRectangle::new(100, 200, 50, 100);
        assert_eq!(clamp_rect(&rc, 640, 480), Some((50, 100, 50, 100)));
    }

    #[test]
    fn clamp_rect_rejects_empty() {
        assert_eq!(clamp_rect(&EfbRectangle::new(700, 0, 800, 10), 640, 480), None);
        assert_eq!(clamp_rect(&EfbRectangle::new(5, 5, 5, 10), 640, 480), None);
    }
}
