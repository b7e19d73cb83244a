/// Expands console primitive streams into indexed lists.
///
/// Quads and triangle fans have no direct equivalent on modern APIs, and
/// strips are converted to lists so that consecutive primitives of the same
/// class can share one draw call.
use crate::render_state::PrimitiveType;

/// Console primitive opcodes as they appear in the command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GxPrimitive {
    Quads = 0x80,
    Quads2 = 0x88,
    Triangles = 0x90,
    TriangleStrip = 0x98,
    TriangleFan = 0xA0,
    Lines = 0xA8,
    LineStrip = 0xB0,
    Points = 0xB8,
}

impl GxPrimitive {
    pub fn from_opcode(op: u8) -> Option<Self> {
        match op & 0xF8 {
            0x80 => Some(Self::Quads),
            0x88 => Some(Self::Quads2),
            0x90 => Some(Self::Triangles),
            0x98 => Some(Self::TriangleStrip),
            0xA0 => Some(Self::TriangleFan),
            0xA8 => Some(Self::Lines),
            0xB0 => Some(Self::LineStrip),
            0xB8 => Some(Self::Points),
            _ => None,
        }
    }

    /// Primitive class the batch is drawn with.
    pub fn class(self) -> PrimitiveType {
        match self {
            Self::Quads
            | Self::Quads2
            | Self::Triangles
            | Self::TriangleStrip
            | Self::TriangleFan => PrimitiveType::Triangles,
            Self::Lines | Self::LineStrip => PrimitiveType::Lines,
            Self::Points => PrimitiveType::Points,
        }
    }

    /// Upper bound on indices produced for `num_vertices` vertices.
    pub fn max_indices(self, num_vertices: u32) -> u32 {
        match self {
            Self::Quads | Self::Quads2 => num_vertices / 4 * 6,
            Self::Triangles => num_vertices / 3 * 3,
            Self::TriangleStrip | Self::TriangleFan => num_vertices.saturating_sub(2) * 3,
            Self::Lines => num_vertices / 2 * 2,
            Self::LineStrip => num_vertices.saturating_sub(1) * 2,
            Self::Points => num_vertices,
        }
    }
}

/// Accumulates indices for the current batch.
#[derive(Debug, Default)]
pub struct IndexGenerator {
    indices: Vec<u16>,
    base_vertex: u32,
}

impl IndexGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new batch.
    pub fn start(&mut self) {
        self.indices.clear();
        self.base_vertex = 0;
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn index_len(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Vertices referenced so far in this batch.
    pub fn num_vertices(&self) -> u32 {
        self.base_vertex
    }

    /// Appends indices for `num_vertices` new vertices of `primitive`.
    pub fn add_indices(&mut self, primitive: GxPrimitive, num_vertices: u32) {
        let base = self.base_vertex;
        match primitive {
            GxPrimitive::Quads | GxPrimitive::Quads2 => self.add_quads(base, num_vertices),
            GxPrimitive::Triangles => self.add_list(base, num_vertices / 3 * 3),
            GxPrimitive::TriangleStrip => self.add_strip(base, num_vertices),
            GxPrimitive::TriangleFan => self.add_fan(base, num_vertices),
            GxPrimitive::Lines => self.add_list(base, num_vertices / 2 * 2),
            GxPrimitive::LineStrip => self.add_line_strip(base, num_vertices),
            GxPrimitive::Points => self.add_list(base, num_vertices),
        }
        self.base_vertex += num_vertices;
    }

    /// Appends pre-built indices that reference `num_vertices` new vertices.
    pub fn add_external_indices(&mut self, indices: &[u16], num_vertices: u32) {
        let base = self.base_vertex;
        for &index in indices {
            self.push(base + index as u32);
        }
        self.base_vertex += num_vertices;
    }

    fn push(&mut self, index: u32) {
        debug_assert!(index <= u16::MAX as u32, "batch exceeds 16-bit indices");
        self.indices.push(index as u16);
    }

    fn add_list(&mut self, base: u32, count: u32) {
        for i in 0..count {
            self.push(base + i);
        }
    }

    // Quad ABCD -> triangles ABC + ACD.
    fn add_quads(&mut self, base: u32, num_vertices: u32) {
        for q in 0..num_vertices / 4 {
            let a = base + q * 4;
            for index in [a, a + 1, a + 2, a, a + 2, a + 3] {
                self.push(index);
            }
        }
    }

    // Fan with center V0: V0V1V2, V0V2V3, ...
    fn add_fan(&mut self, base: u32, num_vertices: u32) {
        for i in 0..num_vertices.saturating_sub(2) {
            for index in [base, base + i + 1, base + i + 2] {
                self.push(index);
            }
        }
    }

    // Odd triangles swap their first two vertices to keep the winding.
    fn add_strip(&mut self, base: u32, num_vertices: u32) {
        for i in 0..num_vertices.saturating_sub(2) {
            let v = base + i;
            let tri = if i % 2 == 0 {
                [v, v + 1, v + 2]
            } else {
                [v + 1, v, v + 2]
            };
            for index in tri {
                self.push(index);
            }
        }
    }

    fn add_line_strip(&mut self, base: u32, num_vertices: u32) {
        for i in 0..num_vertices.saturating_sub(1) {
            self.push(base + i);
            self.push(base + i + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quads_become_two_triangles() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::Quads, 4);
        assert_eq!(gen.indices(), &[0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn fan_keeps_center_vertex() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::TriangleFan, 5);
        assert_eq!(gen.indices(), &[0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn fan_with_too_few_vertices_is_empty() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::TriangleFan, 2);
        assert!(gen.indices().is_empty());
        assert_eq!(gen.num_vertices(), 2);
    }

    #[test]
    fn strip_alternates_winding() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::TriangleStrip, 4);
        assert_eq!(gen.indices(), &[0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn second_primitive_offsets_by_previous_vertices() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::Triangles, 3);
        gen.add_indices(GxPrimitive::Quads, 4);
        assert_eq!(gen.indices(), &[0, 1, 2, 3, 4, 5, 3, 5, 6]);
        assert_eq!(gen.index_len(), GxPrimitive::Triangles.max_indices(3) + 6);
    }

    #[test]
    fn line_strip_expands_to_segments() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::LineStrip, 3);
        assert_eq!(gen.indices(), &[0, 1, 1, 2]);
    }

    #[test]
    fn external_indices_are_rebased() {
        let mut gen = IndexGenerator::new();
        gen.add_indices(GxPrimitive::Points, 2);
        gen.add_external_indices(&[0, 1, 2], 3);
        assert_eq!(gen.indices(), &[0, 1, 2, 3, 4]);
        assert_eq!(gen.num_vertices(), 5);
    }

    #[test]
    fn opcode_low_bits_select_vertex_format() {
        assert_eq!(GxPrimitive::from_opcode(0x93), Some(GxPrimitive::Triangles));
        assert_eq!(GxPrimitive::from_opcode(0x40), None);
    }
}
