//! Geometry batching and streaming.
//!
//! Vertices from the command-stream decoder accumulate in a CPU staging area
//! together with indices from the [`IndexGenerator`]. A flush commits both
//! into one slot of the backend's geometry ring and issues a single indexed
//! draw with the current pipeline.
//!
//! The ring is never grown. When a commit does not fit in the rest of the
//! current slot the manager moves on to the next slot and maps it with
//! [`MapMode::Discard`]; everything else is appended with
//! [`MapMode::NoOverwrite`]. The texel buffer follows the same policy with
//! its own cursor.

use crate::backend::{MapMode, RenderBackend, StreamBufferSizes, StreamTarget};
use crate::error::Result;
use crate::index_generator::{GxPrimitive, IndexGenerator};
use crate::math::align_up;
use crate::pipeline::AbstractPipeline;
use crate::render_state::PrimitiveType;
use crate::shader_cache::{GxPipelineUid, ShaderCache};
use crate::shader_gen::GxUniforms;
use crate::stats::Statistics;
use std::sync::Arc;

/// Largest vertex payload of a single batch.
pub const MAX_VERTEX_BYTES: u32 = 0x50000;
/// Largest index count of a single batch.
pub const MAX_INDICES: u32 = 65536;
// Indices are 16-bit.
const MAX_BATCH_VERTICES: u32 = u16::MAX as u32 + 1;
const INDEX_SIZE: u32 = std::mem::size_of::<u16>() as u32;

/// Element formats of the texel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelBufferFormat {
    R8,
    R16,
    RGBA8,
    R32G32,
}

impl TexelBufferFormat {
    pub fn element_size(self) -> u32 {
        match self {
            TexelBufferFormat::R8 => 1,
            TexelBufferFormat::R16 => 2,
            TexelBufferFormat::RGBA8 => 4,
            TexelBufferFormat::R32G32 => 8,
        }
    }
}

/// Projection and viewport shape of the batch being drawn.
///
/// `raw_projection` holds the six projection coefficients as the console
/// loads them: `[0]` scales x and `[2]` scales y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionAspect {
    pub raw_projection: [f32; 6],
    pub viewport_width: f32,
    pub viewport_height: f32,
}

impl Default for ProjectionAspect {
    fn default() -> Self {
        Self {
            raw_projection: [0.0; 6],
            viewport_width: 0.0,
            viewport_height: 0.0,
        }
    }
}

// PAL and NTSC pixels are each ~9% off square in opposite directions, so
// both tests allow 11% slop.
fn aspect_is_4_3(width: f32, height: f32) -> bool {
    let aspect = (width / height).abs();
    (aspect - 4.0 / 3.0).abs() < 4.0 / 3.0 * 0.11
}

fn aspect_is_16_9(width: f32, height: f32) -> bool {
    let aspect = (width / height).abs();
    (aspect - 16.0 / 9.0).abs() < 16.0 / 9.0 * 0.11
}

pub struct VertexManager {
    sizes: StreamBufferSizes,
    staging: Vec<u8>,
    index_generator: IndexGenerator,
    upload_scratch: Vec<u8>,
    is_flushed: bool,
    current_stride: u32,
    geometry_slot: u32,
    geometry_cursor: u32,
    texel_cursor: u32,
    pipeline_uid: GxPipelineUid,
    pipeline_changed: bool,
    current_pipeline: Option<Arc<AbstractPipeline>>,
    uniforms: GxUniforms,
    uniforms_dirty: bool,
    projection: ProjectionAspect,
    is_wii: bool,
    flush_count_4_3: usize,
    flush_count_anamorphic: usize,
}

impl VertexManager {
    pub fn new(sizes: StreamBufferSizes, is_wii: bool) -> Self {
        Self {
            sizes,
            staging: Vec::with_capacity(MAX_VERTEX_BYTES as usize),
            index_generator: IndexGenerator::new(),
            upload_scratch: Vec::new(),
            is_flushed: true,
            current_stride: 0,
            geometry_slot: 0,
            geometry_cursor: 0,
            texel_cursor: 0,
            pipeline_uid: GxPipelineUid::default(),
            pipeline_changed: true,
            current_pipeline: None,
            uniforms: GxUniforms::default(),
            uniforms_dirty: true,
            projection: ProjectionAspect::default(),
            is_wii,
            flush_count_4_3: 0,
            flush_count_anamorphic: 0,
        }
    }

    /// Allocates the backend's geometry ring and texel buffer.
    pub fn initialize(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        backend.allocate_stream_buffers(&self.sizes)?;
        self.geometry_slot = 0;
        self.geometry_cursor = 0;
        self.texel_cursor = 0;
        log::debug!(
            "Stream buffers: {} slots of {} bytes, {} byte texel buffer",
            self.sizes.buffer_count,
            self.sizes.slot_size(),
            self.sizes.texel
        );
        Ok(())
    }

    pub fn sizes(&self) -> &StreamBufferSizes {
        &self.sizes
    }

    pub fn is_flushed(&self) -> bool {
        self.is_flushed
    }

    pub fn current_geometry_slot(&self) -> u32 {
        self.geometry_slot
    }

    pub fn pipeline_uid(&self) -> &GxPipelineUid {
        &self.pipeline_uid
    }

    /// Selects the pipeline for the following vertices. The caller flushes
    /// first when the uid differs.
    pub fn set_pipeline_uid(&mut self, uid: GxPipelineUid) {
        debug_assert!(
            self.is_flushed || uid.vertex_decl.stride == self.current_stride,
            "vertex stride changed inside a batch"
        );
        if self.pipeline_uid != uid {
            self.pipeline_uid = uid;
            self.pipeline_changed = true;
        }
    }

    pub fn uniforms(&self) -> &GxUniforms {
        &self.uniforms
    }

    /// Mutable access to the GX uniforms; they are uploaded on the next flush.
    pub fn uniforms_mut(&mut self) -> &mut GxUniforms {
        self.uniforms_dirty = true;
        &mut self.uniforms
    }

    pub fn set_projection_aspect(&mut self, projection: ProjectionAspect) {
        self.projection = projection;
    }

    /// Drops the cached pipeline object; the next flush looks it up again.
    pub fn invalidate_pipeline_object(&mut self) {
        self.current_pipeline = None;
        self.pipeline_changed = true;
    }

    /// Returns `(4:3 flushes, anamorphic flushes)` since the last call and
    /// zeroes both counts.
    pub fn reset_flush_aspect_ratio_count(&mut self) -> (usize, usize) {
        let counts = (self.flush_count_4_3, self.flush_count_anamorphic);
        self.flush_count_4_3 = 0;
        self.flush_count_anamorphic = 0;
        counts
    }

    // -- Batching --

    /// Begins a new batch of vertices `stride` bytes apart.
    pub fn reset_buffer(&mut self, stride: u32) {
        self.staging.clear();
        self.index_generator.start();
        self.current_stride = stride;
    }

    fn batch_has_room(&self, primitive: GxPrimitive, num_vertices: u32, needed_bytes: u32) -> bool {
        self.staging.len() as u32 + needed_bytes <= MAX_VERTEX_BYTES
            && self.index_generator.num_vertices() + num_vertices <= MAX_BATCH_VERTICES
            && self.index_generator.index_len() + primitive.max_indices(num_vertices) <= MAX_INDICES
    }

    /// Appends `num_vertices` vertices of `primitive` in the layout of the
    /// current pipeline's vertex declaration.
    pub fn add_vertices(
        &mut self,
        backend: &mut dyn RenderBackend,
        shader_cache: &mut ShaderCache,
        stats: &mut Statistics,
        primitive: GxPrimitive,
        vertices: &[u8],
        num_vertices: u32,
    ) {
        let stride = self.pipeline_uid.vertex_decl.stride;
        if stride == 0 {
            log::error!("Vertex declaration has zero stride, dropping {num_vertices} vertices");
            return;
        }
        let Some(needed_bytes) = num_vertices.checked_mul(stride) else {
            log::error!("Primitive of {num_vertices} vertices exceeds the batch limits");
            return;
        };
        if (vertices.len() as u32) < needed_bytes {
            debug_assert!(false, "vertex data shorter than num_vertices * stride");
            log::error!(
                "Vertex data of {} bytes is shorter than {} vertices of stride {}",
                vertices.len(),
                num_vertices,
                stride
            );
            return;
        }
        if needed_bytes > MAX_VERTEX_BYTES || num_vertices > MAX_BATCH_VERTICES {
            log::error!("Primitive of {num_vertices} vertices exceeds the batch limits");
            return;
        }

        // Different primitive classes cannot share a draw.
        let class = primitive.class();
        if self.pipeline_uid.rasterization_state.primitive != class {
            self.flush(backend, shader_cache, stats);
            self.pipeline_uid.rasterization_state.primitive = class;
            self.pipeline_changed = true;
        }

        if !self.is_flushed && !self.batch_has_room(primitive, num_vertices, needed_bytes) {
            self.flush(backend, shader_cache, stats);
        }

        if self.is_flushed {
            self.reset_buffer(stride);
            self.is_flushed = false;
        }

        self.staging
            .extend_from_slice(&vertices[..needed_bytes as usize]);
        self.index_generator.add_indices(primitive, num_vertices);
    }

    /// Copies the staged batch into the geometry ring and binds it.
    ///
    /// Returns `(base_vertex, base_index)` for the draw.
    pub fn commit_buffer(
        &mut self,
        backend: &mut dyn RenderBackend,
        num_vertices: u32,
        stride: u32,
        num_indices: u32,
    ) -> (u32, u32) {
        debug_assert!(stride > 0, "commit with zero stride");
        let stride = stride.max(1);
        let vertex_bytes = align_up(num_vertices * stride, INDEX_SIZE);
        let index_bytes = num_indices * INDEX_SIZE;
        let total = vertex_bytes + index_bytes;
        let slot_size = self.sizes.slot_size();
        if total > slot_size {
            debug_assert!(false, "batch larger than a geometry slot");
            log::error!("Batch of {total} bytes does not fit a {slot_size} byte geometry slot");
            return (0, 0);
        }

        // Vertex starts must be stride-aligned for base_vertex to address them.
        let mut cursor = self.geometry_cursor;
        let padding = cursor % stride;
        if padding != 0 {
            cursor += stride - padding;
        }

        let mut mode = MapMode::NoOverwrite;
        if cursor + total >= slot_size {
            cursor = 0;
            self.geometry_slot = (self.geometry_slot + 1) % self.sizes.buffer_count.max(1);
            mode = MapMode::Discard;
        }

        let base_vertex = cursor / stride;
        let base_index = (cursor + vertex_bytes) / INDEX_SIZE;

        let vertex_len = (num_vertices * stride) as usize;
        self.upload_scratch.clear();
        self.upload_scratch
            .extend_from_slice(&self.staging[..vertex_len.min(self.staging.len())]);
        self.upload_scratch.resize(vertex_bytes as usize, 0);
        let indices = &self.index_generator.indices()[..num_indices as usize];
        self.upload_scratch
            .extend_from_slice(bytemuck::cast_slice(indices));

        backend.upload_stream(
            StreamTarget::Geometry(self.geometry_slot),
            cursor,
            &self.upload_scratch,
            mode,
        );
        backend.bind_geometry_stream(self.geometry_slot, stride);

        self.geometry_cursor = cursor + total;
        (base_vertex, base_index)
    }

    fn update_pipeline_object(
        &mut self,
        backend: &mut dyn RenderBackend,
        shader_cache: &mut ShaderCache,
        stats: &mut Statistics,
    ) {
        if !self.pipeline_changed && self.current_pipeline.is_some() {
            return;
        }
        self.current_pipeline = shader_cache.get_pipeline(backend, &self.pipeline_uid, stats);
        self.pipeline_changed = false;
    }

    fn classify_aspect(&mut self) {
        let raw = &self.projection.raw_projection;
        let viewport_is_4_3 =
            aspect_is_4_3(self.projection.viewport_width, self.projection.viewport_height);
        if aspect_is_16_9(raw[2], raw[0]) && viewport_is_4_3 {
            // 16:9 projection into a 4:3 viewport: anamorphic widescreen.
            self.flush_count_anamorphic += 1;
        } else if aspect_is_4_3(raw[2], raw[0]) && viewport_is_4_3 {
            self.flush_count_4_3 += 1;
        }
    }

    /// Draws the pending batch, if any.
    pub fn flush(
        &mut self,
        backend: &mut dyn RenderBackend,
        shader_cache: &mut ShaderCache,
        stats: &mut Statistics,
    ) {
        if self.is_flushed {
            return;
        }

        if !self.is_wii {
            self.classify_aspect();
        }

        // Constants go out before the geometry so they belong to the same draw.
        if self.uniforms_dirty {
            backend.set_uniforms(self.uniforms.as_bytes());
            stats.this_frame.bytes_uniform_streamed += self.uniforms.as_bytes().len() as u64;
            self.uniforms_dirty = false;
        }

        let num_vertices = self.index_generator.num_vertices();
        let num_indices = self.index_generator.index_len();
        let stride = self.current_stride;
        if num_indices > 0 {
            let (base_vertex, base_index) =
                self.commit_buffer(backend, num_vertices, stride, num_indices);

            self.update_pipeline_object(backend, shader_cache, stats);
            if let Some(pipeline) = &self.current_pipeline {
                backend.set_pipeline(Some(pipeline));
                backend.draw_indexed(base_index, num_indices, base_vertex);

                let frame = &mut stats.this_frame;
                frame.num_draw_calls += 1;
                frame.num_primitives += match self.pipeline_uid.rasterization_state.primitive {
                    PrimitiveType::Points => num_indices,
                    PrimitiveType::Lines => num_indices / 2,
                    PrimitiveType::Triangles | PrimitiveType::TriangleStrip => num_indices / 3,
                };
            }

            let frame = &mut stats.this_frame;
            frame.num_vertices_loaded += num_vertices;
            frame.num_indices += num_indices;
            frame.bytes_vertex_streamed += align_up(num_vertices * stride, INDEX_SIZE) as u64;
            frame.bytes_index_streamed += (num_indices * INDEX_SIZE) as u64;
        }

        self.is_flushed = true;
    }

    // -- Renderer-internal draws --

    /// Streams vertices and indices for a draw issued by the renderer itself.
    /// The GX batch must already be flushed.
    pub fn upload_utility_vertices(
        &mut self,
        backend: &mut dyn RenderBackend,
        vertices: &[u8],
        stride: u32,
        num_vertices: u32,
        indices: &[u16],
    ) -> (u32, u32) {
        debug_assert!(self.is_flushed, "GX batch must be flushed before utility draws");
        let stride = stride.max(1);
        self.reset_buffer(stride);
        let copy_size = ((stride * num_vertices) as usize).min(vertices.len());
        debug_assert!(copy_size as u32 <= MAX_VERTEX_BYTES);
        self.staging.extend_from_slice(&vertices[..copy_size]);
        self.index_generator.add_external_indices(indices, num_vertices);
        self.commit_buffer(backend, num_vertices, stride, indices.len() as u32)
    }

    /// Binds renderer-owned uniforms. GX uniforms are re-sent on the next flush.
    pub fn upload_utility_uniforms(&mut self, backend: &mut dyn RenderBackend, data: &[u8]) {
        backend.set_uniforms(data);
        self.uniforms_dirty = true;
    }

    // -- Texel buffer --

    fn reserve_texel_space(&mut self, size: u32, alignment: u32) -> Option<(u32, MapMode)> {
        if size > self.sizes.texel {
            log::error!(
                "Texel upload of {} bytes exceeds the {} byte texel buffer",
                size,
                self.sizes.texel
            );
            return None;
        }
        let offset = align_up(self.texel_cursor, alignment);
        if offset + size > self.sizes.texel {
            Some((0, MapMode::Discard))
        } else {
            Some((offset, MapMode::NoOverwrite))
        }
    }

    /// Streams `data` into the texel buffer. Returns the offset in elements
    /// of `format`, or `None` when the data exceeds the buffer capacity.
    pub fn upload_texel_buffer(
        &mut self,
        backend: &mut dyn RenderBackend,
        data: &[u8],
        format: TexelBufferFormat,
    ) -> Option<u32> {
        let elem_size = format.element_size();
        let (offset, mode) = self.reserve_texel_space(data.len() as u32, elem_size)?;
        backend.upload_stream(StreamTarget::Texel, offset, data, mode);
        self.texel_cursor = offset + data.len() as u32;
        Some(offset / elem_size)
    }

    /// Streams texel data followed by its palette. Returns the element
    /// offsets of both.
    pub fn upload_texel_buffer_with_palette(
        &mut self,
        backend: &mut dyn RenderBackend,
        data: &[u8],
        format: TexelBufferFormat,
        palette: &[u8],
        palette_format: TexelBufferFormat,
    ) -> Option<(u32, u32)> {
        let elem_size = format.element_size();
        let palette_elem_size = palette_format.element_size();
        // Slack for padding the palette up to its own element alignment.
        let reserve = (data.len() + palette.len()) as u32 + palette_elem_size - 1;
        let (offset, mode) = self.reserve_texel_space(reserve, elem_size)?;

        let palette_start = align_up(offset + data.len() as u32, palette_elem_size);
        self.upload_scratch.clear();
        self.upload_scratch.extend_from_slice(data);
        self.upload_scratch.resize((palette_start - offset) as usize, 0);
        self.upload_scratch.extend_from_slice(palette);
        backend.upload_stream(StreamTarget::Texel, offset, &self.upload_scratch, mode);

        self.texel_cursor = palette_start + palette.len() as u32;
        Some((offset / elem_size, palette_start / palette_elem_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::config::VideoConfig;
    use crate::native_vertex_format::PortableVertexDeclaration;

    fn small_sizes() -> StreamBufferSizes {
        StreamBufferSizes {
            vertex: 64,
            index: 64,
            buffer_count: 2,
            texel: 64,
        }
    }

    fn setup(sizes: StreamBufferSizes) -> (NullBackend, VertexManager) {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut vm = VertexManager::new(sizes, false);
        vm.initialize(&mut backend).unwrap();
        (backend, vm)
    }

    const QUAD: [u16; 6] = [0, 1, 2, 0, 2, 3];

    #[test]
    fn commit_computes_bases_from_cursor() {
        let (mut backend, mut vm) = setup(small_sizes());
        // Slot size 64; each commit is 16 vertex + 12 index bytes.
        assert_eq!(vm.upload_utility_vertices(&mut backend, &[1; 16], 4, 4, &QUAD), (0, 8));
        assert_eq!(vm.upload_utility_vertices(&mut backend, &[2; 16], 4, 4, &QUAD), (7, 22));
        assert_eq!(backend.counters().geometry_discards, 0);
    }

    #[test]
    fn cursor_is_padded_to_stride() {
        let (mut backend, mut vm) = setup(StreamBufferSizes {
            vertex: 256,
            index: 256,
            buffer_count: 2,
            texel: 64,
        });
        // 3 bytes of vertex data pad to 4, plus 2 bytes of index.
        vm.upload_utility_vertices(&mut backend, &[9; 3], 3, 1, &[0]);
        // Cursor 6 is padded to 12 for stride 12.
        let (base_vertex, base_index) =
            vm.upload_utility_vertices(&mut backend, &[7; 12], 12, 1, &[0]);
        assert_eq!(base_vertex, 1);
        assert_eq!(base_index, (12 + 12) / 2);
    }

    #[test]
    fn wrap_discards_once_and_never_aliases() {
        let (mut backend, mut vm) = setup(small_sizes());
        vm.upload_utility_vertices(&mut backend, &[0xAA; 16], 4, 4, &QUAD);
        vm.upload_utility_vertices(&mut backend, &[0xBB; 16], 4, 4, &QUAD);
        assert_eq!(vm.current_geometry_slot(), 0);

        // 56 + 28 >= 64: wraps to the next slot.
        let bases = vm.upload_utility_vertices(&mut backend, &[0xCC; 16], 4, 4, &QUAD);
        assert_eq!(bases, (0, 8));
        assert_eq!(vm.current_geometry_slot(), 1);
        assert_eq!(backend.counters().geometry_discards, 1);

        let slot0 = backend.stream_contents(StreamTarget::Geometry(0));
        assert!(slot0[0..16].iter().all(|&b| b == 0xAA));
        assert!(slot0[28..44].iter().all(|&b| b == 0xBB));
        assert!(!slot0.contains(&0xCC));
        let slot1 = backend.stream_contents(StreamTarget::Geometry(1));
        assert!(slot1[0..16].iter().all(|&b| b == 0xCC));
        assert_eq!(&slot1[16..28], bytemuck::cast_slice::<u16, u8>(&QUAD));
    }

    #[test]
    fn texel_upload_aligns_to_element_size() {
        let (mut backend, mut vm) = setup(small_sizes());
        assert_eq!(
            vm.upload_texel_buffer(&mut backend, &[1; 3], TexelBufferFormat::R8),
            Some(0)
        );
        // Cursor 3 aligns to 4 for RGBA8.
        assert_eq!(
            vm.upload_texel_buffer(&mut backend, &[2; 8], TexelBufferFormat::RGBA8),
            Some(1)
        );
        assert_eq!(&backend.stream_contents(StreamTarget::Texel)[4..12], &[2; 8]);
    }

    #[test]
    fn texel_upload_wraps_with_discard_and_rejects_oversized() {
        let (mut backend, mut vm) = setup(small_sizes());
        vm.upload_texel_buffer(&mut backend, &[1; 40], TexelBufferFormat::R8);
        assert_eq!(
            vm.upload_texel_buffer(&mut backend, &[2; 32], TexelBufferFormat::R16),
            Some(0)
        );
        assert_eq!(backend.counters().texel_discards, 1);
        assert_eq!(
            vm.upload_texel_buffer(&mut backend, &[3; 65], TexelBufferFormat::R8),
            None
        );
    }

    #[test]
    fn palette_follows_data_at_its_own_alignment() {
        let (mut backend, mut vm) = setup(small_sizes());
        let offsets = vm.upload_texel_buffer_with_palette(
            &mut backend,
            &[5; 6],
            TexelBufferFormat::R8,
            &[6; 8],
            TexelBufferFormat::RGBA8,
        );
        // Palette starts at byte 8 (6 aligned to 4) -> element 2.
        assert_eq!(offsets, Some((0, 2)));
        let texel = backend.stream_contents(StreamTarget::Texel);
        assert_eq!(&texel[8..16], &[6; 8]);
        // Next upload continues after the palette.
        assert_eq!(
            vm.upload_texel_buffer(&mut backend, &[7; 4], TexelBufferFormat::R8),
            Some(16)
        );
    }

    #[test]
    fn palette_aligns_from_an_odd_cursor() {
        let (mut backend, mut vm) = setup(small_sizes());
        vm.upload_texel_buffer(&mut backend, &[1; 3], TexelBufferFormat::R8);
        let offsets = vm.upload_texel_buffer_with_palette(
            &mut backend,
            &[5; 6],
            TexelBufferFormat::R8,
            &[0xEE; 8],
            TexelBufferFormat::RGBA8,
        );
        // Data at byte 3..9, palette aligned up to byte 12 -> element 3.
        assert_eq!(offsets, Some((3, 3)));
        let texel = backend.stream_contents(StreamTarget::Texel);
        assert_eq!(&texel[3..9], &[5; 6]);
        assert_eq!(&texel[12..20], &[0xEE; 8]);
    }

    fn gx_setup() -> (NullBackend, VertexManager, ShaderCache, Statistics) {
        let (backend, mut vm) = setup(StreamBufferSizes {
            vertex: 4096,
            index: 4096,
            buffer_count: 2,
            texel: 64,
        });
        let cache = ShaderCache::new(backend.info(), &VideoConfig::default());
        vm.set_pipeline_uid(GxPipelineUid::new(
            PortableVertexDeclaration::simple(0),
            Default::default(),
        ));
        (backend, vm, cache, Statistics::new())
    }

    #[test]
    fn flush_draws_batch_with_cached_pipeline() {
        let (mut backend, mut vm, mut cache, mut stats) = gx_setup();
        let stride = vm.pipeline_uid().vertex_decl.stride;
        let vertices = vec![0u8; (stride * 4) as usize];
        vm.add_vertices(&mut backend, &mut cache, &mut stats, GxPrimitive::Quads, &vertices, 4);
        assert!(!vm.is_flushed());
        vm.flush(&mut backend, &mut cache, &mut stats);

        let draw = backend.counters().last_draw.unwrap();
        assert!(draw.indexed);
        assert_eq!(draw.num_indices, 6);
        assert_eq!(draw.vertex_stride, stride);
        assert_eq!(stats.this_frame.num_draw_calls, 1);
        assert_eq!(stats.this_frame.num_primitives, 2);
        assert_eq!(backend.uniforms(), GxUniforms::default().as_bytes());

        // A second flush with nothing pending is a no-op.
        vm.flush(&mut backend, &mut cache, &mut stats);
        assert_eq!(backend.counters().draw_count, 1);
    }

    #[test]
    fn oversized_vertex_count_is_dropped() {
        let (mut backend, mut vm, mut cache, mut stats) = gx_setup();
        let vertices = vec![0u8; 64];
        vm.add_vertices(
            &mut backend,
            &mut cache,
            &mut stats,
            GxPrimitive::Points,
            &vertices,
            u32::MAX,
        );
        assert!(vm.is_flushed());
        vm.flush(&mut backend, &mut cache, &mut stats);
        assert_eq!(backend.counters().draw_count, 0);
    }

    #[test]
    fn primitive_class_change_splits_batches() {
        let (mut backend, mut vm, mut cache, mut stats) = gx_setup();
        let stride = vm.pipeline_uid().vertex_decl.stride;
        let vertices = vec![0u8; (stride * 3) as usize];
        vm.add_vertices(&mut backend, &mut cache, &mut stats, GxPrimitive::Triangles, &vertices, 3);
        vm.add_vertices(&mut backend, &mut cache, &mut stats, GxPrimitive::Lines, &vertices, 2);
        assert_eq!(backend.counters().draw_count, 1);
        vm.flush(&mut backend, &mut cache, &mut stats);
        assert_eq!(backend.counters().draw_count, 2);
        assert_eq!(
            vm.pipeline_uid().rasterization_state.primitive,
            PrimitiveType::Lines
        );
        assert_eq!(cache.num_gx_pipelines(), 2);
    }

    #[test]
    fn flushes_classify_projection_aspect() {
        let (mut backend, mut vm, mut cache, mut stats) = gx_setup();
        let stride = vm.pipeline_uid().vertex_decl.stride;
        let vertices = vec![0u8; (stride * 3) as usize];
        let mut draw = |vm: &mut VertexManager, x_scale: f32| {
            vm.set_projection_aspect(ProjectionAspect {
                raw_projection: [x_scale, 0.0, 1.0, 0.0, 0.0, 0.0],
                viewport_width: 320.0,
                viewport_height: -240.0,
            });
            vm.add_vertices(&mut backend, &mut cache, &mut stats, GxPrimitive::Triangles, &vertices, 3);
            vm.flush(&mut backend, &mut cache, &mut stats);
        };
        draw(&mut vm, 9.0 / 16.0);
        draw(&mut vm, 3.0 / 4.0);
        draw(&mut vm, 3.0 / 4.0);
        // Square projection matches neither.
        draw(&mut vm, 1.0);
        assert_eq!(vm.reset_flush_aspect_ratio_count(), (2, 1));
        assert_eq!(vm.reset_flush_aspect_ratio_count(), (0, 0));
    }

    #[test]
    fn wii_flushes_are_not_classified() {
        let mut backend = NullBackend::new(64, 64).unwrap();
        let mut vm = VertexManager::new(StreamBufferSizes::default(), true);
        vm.initialize(&mut backend).unwrap();
        let mut cache = ShaderCache::new(backend.info(), &VideoConfig::default());
        let mut stats = Statistics::new();
        vm.set_pipeline_uid(GxPipelineUid::default());
        vm.set_projection_aspect(ProjectionAspect {
            raw_projection: [0.75, 0.0, 1.0, 0.0, 0.0, 0.0],
            viewport_width: 320.0,
            viewport_height: 240.0,
        });
        let stride = vm.pipeline_uid().vertex_decl.stride;
        let vertices = vec![0u8; (stride * 3) as usize];
        vm.add_vertices(&mut backend, &mut cache, &mut stats, GxPrimitive::Triangles, &vertices, 3);
        vm.flush(&mut backend, &mut cache, &mut stats);
        assert_eq!(vm.reset_flush_aspect_ratio_count(), (0, 0));
    }
}
