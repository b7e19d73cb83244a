//! Bounding box registers.
//!
//! Values are kept at target resolution, where pixel shaders update them.
//! The command processor reads and writes native EFB coordinates.

use crate::math::{EFB_HEIGHT, EFB_WIDTH};

/// Left, right, top and bottom.
pub const NUM_BBOX_VALUES: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    values: [i32; NUM_BBOX_VALUES],
}

// Indices 0 and 1 are horizontal, 2 and 3 vertical.
fn axis(index: usize, target_width: u32, target_height: u32) -> (i64, i64) {
    if index < 2 {
        (EFB_WIDTH as i64, target_width.max(1) as i64)
    } else {
        (EFB_HEIGHT as i64, target_height.max(1) as i64)
    }
}

impl BoundingBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a native coordinate, scaled to the current target size.
    pub fn write(&mut self, index: usize, value: u16, target_width: u32, target_height: u32) {
        debug_assert!(index < NUM_BBOX_VALUES, "bbox index {index} out of range");
        let Some(slot) = self.values.get_mut(index) else {
            return;
        };
        let (native, target) = axis(index, target_width, target_height);
        *slot = (value as i64 * target / native) as i32;
    }

    /// Returns the native coordinate of `index`.
    ///
    /// The maxima (indices 1 and 3) are exclusive in storage and read back
    /// one larger.
    pub fn read(&self, index: usize, target_width: u32, target_height: u32) -> u16 {
        debug_assert!(index < NUM_BBOX_VALUES, "bbox index {index} out of range");
        let Some(&stored) = self.values.get(index) else {
            return 0;
        };
        let (native, target) = axis(index, target_width, target_height);
        let mut value = stored as i64 * native / target;
        if index & 1 != 0 {
            value += 1;
        }
        value.clamp(0, u16::MAX as i64) as u16
    }

    /// Values in target-resolution space.
    pub fn raw(&self) -> [i32; NUM_BBOX_VALUES] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_edge_round_trips_with_correction() {
        let mut bbox = BoundingBox::new();
        bbox.write(1, 100, 1280, 1056);
        assert_eq!(bbox.raw()[1], 200);
        assert_eq!(bbox.read(1, 1280, 1056), 101);
    }

    #[test]
    fn minima_read_back_unchanged() {
        let mut bbox = BoundingBox::new();
        bbox.write(0, 37, 1920, 1584);
        bbox.write(2, 48, 1920, 1584);
        assert_eq!(bbox.raw()[0], 111);
        assert_eq!(bbox.raw()[2], 144);
        assert_eq!(bbox.read(0, 1920, 1584), 37);
        assert_eq!(bbox.read(2, 1920, 1584), 48);
    }

    #[test]
    fn vertical_values_use_height() {
        let mut bbox = BoundingBox::new();
        bbox.write(3, 264, 640, 1056);
        assert_eq!(bbox.raw()[3], 528);
        assert_eq!(bbox.read(3, 640, 1056), 265);
    }
}
