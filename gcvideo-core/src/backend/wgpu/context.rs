// Device, queue and the shared command encoder.
//
// Textures and the backend record into one encoder so that copies, blits
// and draws execute in call order. The encoder is submitted on flush,
// present, readback and before any write that would overwrite data the
// recorded commands still read.

use super::blit::Blitter;
use crate::config::{ApiType, BackendInfo};
use crate::error::{Result, VideoError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Optional features used when the adapter has them.
fn wanted_features(adapter: &wgpu::Adapter) -> wgpu::Features {
    let wanted = wgpu::Features::TEXTURE_COMPRESSION_BC
        | wgpu::Features::DEPTH32FLOAT_STENCIL8
        | wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
        | wgpu::Features::FLOAT32_FILTERABLE
        | wgpu::Features::DEPTH_CLIP_CONTROL
        | wgpu::Features::DUAL_SOURCE_BLENDING;
    adapter.features() & wanted
}

pub(crate) struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub blitter: Blitter,
    encoder: Mutex<Option<wgpu::CommandEncoder>>,
}

impl GpuContext {
    pub fn new() -> Result<Arc<Self>> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| VideoError::BackendUnavailable("no suitable GPU adapter found".into()))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("gcvideo device"),
                required_features: wanted_features(&adapter),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| VideoError::BackendUnavailable(e.to_string()))?;

        // Validation errors are reported through the error scopes around
        // resource creation; anything else is logged instead of panicking.
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("wgpu: {err}");
        }));

        let info = adapter.get_info();
        log::info!(
            "wgpu adapter: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let blitter = Blitter::new(&device);
        Ok(Arc::new(Self {
            adapter,
            device,
            queue,
            blitter,
            encoder: Mutex::new(None),
        }))
    }

    pub fn features(&self) -> wgpu::Features {
        self.device.features()
    }

    pub fn backend_info(&self) -> BackendInfo {
        let adapter_info = self.adapter.get_info();
        let limits = self.device.limits();
        let features = self.features();
        let sample_flags = self
            .adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba8Unorm)
            .flags;
        let aa_modes = [1u32, 2, 4, 8]
            .into_iter()
            .filter(|&n| n == 1 || sample_flags.sample_count_supported(n))
            .collect();

        BackendInfo {
            api_type: ApiType::Wgsl,
            display_name: format!("wgpu {:?} ({})", adapter_info.backend, adapter_info.name),
            max_texture_size: limits.max_texture_dimension_2d,
            aa_modes,
            supports_dual_source_blend: features.contains(wgpu::Features::DUAL_SOURCE_BLENDING),
            supports_geometry_shaders: false,
            supports_early_z: false,
            supports_bbox: false,
            supports_gs_instancing: false,
            supports_clip_control: true,
            supports_ssaa: false,
            supports_fragment_stores_and_atomics: false,
            supports_depth_clamp: features.contains(wgpu::Features::DEPTH_CLIP_CONTROL),
            supports_reversed_depth_range: true,
            supports_bitfield: true,
            supports_dynamic_sampler_indexing: false,
            supports_framebuffer_fetch: false,
            supports_logic_op: false,
            supports_palette_conversion: false,
            supports_primitive_restart: true,
            supports_large_points: false,
        }
    }

    fn lock_encoder(&self) -> MutexGuard<'_, Option<wgpu::CommandEncoder>> {
        self.encoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with the shared encoder, creating one if needed.
    pub fn record<R>(&self, f: impl FnOnce(&mut wgpu::CommandEncoder) -> R) -> R {
        let mut guard = self.lock_encoder();
        let encoder = guard.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("gcvideo frame"),
                })
        });
        f(encoder)
    }

    pub fn has_pending_work(&self) -> bool {
        self.lock_encoder().is_some()
    }

    /// Submits everything recorded so far.
    pub fn submit(&self) {
        let encoder = self.lock_encoder().take();
        if let Some(encoder) = encoder {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    /// Submits and blocks until the GPU has finished all work.
    pub fn wait_idle(&self) {
        self.submit();
        self.device.poll(wgpu::Maintain::Wait);
    }

    /// Runs `f` inside a validation error scope.
    pub fn validated<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> std::result::Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    /// Maps `buffer` for reading and copies its first `size` bytes out.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Option<Vec<u8>> {
        let slice = buffer.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::error!("Readback buffer map failed: {err}");
                return None;
            }
            Err(_) => {
                log::error!("Readback buffer map callback dropped");
                return None;
            }
        }
        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Some(data)
    }
}
