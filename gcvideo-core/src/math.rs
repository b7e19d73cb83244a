// Rectangles, alignment helpers and the fixed GameCube framebuffer dimensions.

use serde::{Deserialize, Serialize};

/// Native width of the embedded framebuffer.
pub const EFB_WIDTH: u32 = 640;
/// Native height of the embedded framebuffer.
pub const EFB_HEIGHT: u32 = 528;
/// Largest external framebuffer stride the video interface can scan out.
pub const MAX_XFB_WIDTH: u32 = 720;
/// Largest external framebuffer height the video interface can scan out.
pub const MAX_XFB_HEIGHT: u32 = 576;

/// Edge-based rectangle. `right`/`bottom` are exclusive and may be smaller
/// than `left`/`top` for flipped rectangles.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect<T> {
    pub left: T,
    pub top: T,
    pub right: T,
    pub bottom: T,
}

/// Rectangle in backbuffer pixel space.
pub type TargetRectangle = Rect<i32>;
/// Rectangle in (possibly scaled) EFB/texture pixel space.
pub type EfbRectangle = Rect<i32>;

impl<T> Rect<T> {
    pub const fn new(left: T, top: T, right: T, bottom: T) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl Rect<i32> {
    /// Rectangle anchored at the origin.
    pub const fn with_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).abs()
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).abs()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// True when the rectangle lies inside `0..width` x `0..height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.right >= self.left
            && self.bottom >= self.top
            && self.right as u32 <= width
            && self.bottom as u32 <= height
    }
}

/// Rounds `value` up to the next multiple of `alignment` (which must be non-zero).
pub fn align_up(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment > 0, "alignment must be non-zero");
    value.div_ceil(alignment) * alignment
}

/// Rounds `value` down to a multiple of `alignment`.
pub fn align_down(value: u32, alignment: u32) -> u32 {
    debug_assert!(alignment > 0, "alignment must be non-zero");
    value - value % alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipped_rect_has_positive_size() {
        let rc = Rect::new(10, 50, 2, 20);
        assert_eq!(rc.width(), 8);
        assert_eq!(rc.height(), 30);
    }

    #[test]
    fn fits_within_rejects_out_of_bounds() {
        assert!(Rect::with_size(64, 32).fits_within(64, 32));
        assert!(!Rect::with_size(65, 32).fits_within(64, 32));
        assert!(!Rect::new(-1, 0, 4, 4).fits_within(64, 32));
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(8, 4), 8);
        assert_eq!(align_down(7, 4), 4);
    }
}
