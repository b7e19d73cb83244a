//! Display geometry.
//!
//! Where the XFB lands inside the backbuffer, how large the window should
//! be, and at which multiple of native resolution the EFB is rendered. All
//! functions here are pure so they can be computed from any thread and
//! tested without a backend.

use crate::config::{AspectMode, EfbScale, StereoMode, VideoConfig};
use crate::math::{TargetRectangle, EFB_HEIGHT, EFB_WIDTH};

/// Stretches a 4:3 aspect ratio to the matching 16:9 one.
pub fn aspect_to_widescreen(aspect: f32) -> f32 {
    aspect * ((16.0 / 9.0) / (4.0 / 3.0))
}

fn align_down_4(value: f32) -> i32 {
    let value = value.ceil() as i32;
    value - value % 4
}

/// Inputs of the presentation rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub aspect_mode: AspectMode,
    pub crop: bool,
    pub widescreen_hack: bool,
    /// Current widescreen classification of the game picture.
    pub aspect_wide: bool,
    /// Picture aspect ratio reported by the video interface.
    pub vi_aspect_ratio: f32,
    pub backbuffer_width: u32,
    pub backbuffer_height: u32,
}

impl DisplayGeometry {
    pub fn new(
        config: &VideoConfig,
        aspect_wide: bool,
        vi_aspect_ratio: f32,
        backbuffer: (u32, u32),
    ) -> Self {
        Self {
            aspect_mode: config.aspect_mode,
            crop: config.crop,
            widescreen_hack: config.widescreen_hack,
            aspect_wide,
            vi_aspect_ratio,
            backbuffer_width: backbuffer.0,
            backbuffer_height: backbuffer.1,
        }
    }

    fn uses_widescreen(&self) -> bool {
        self.aspect_mode == AspectMode::AnalogWide
            || (self.aspect_mode != AspectMode::Analog && self.aspect_wide)
    }

    fn window_size(&self) -> (f32, f32) {
        (
            self.backbuffer_width.max(1) as f32,
            self.backbuffer_height.max(1) as f32,
        )
    }

    fn expected_crop_aspect(&self) -> f32 {
        if self.uses_widescreen() {
            16.0 / 9.0
        } else {
            4.0 / 3.0
        }
    }

    /// Aspect ratio the picture is shown at.
    pub fn draw_aspect_ratio(&self) -> f32 {
        if self.aspect_mode == AspectMode::Stretch {
            let (w, h) = self.window_size();
            return w / h;
        }
        if self.uses_widescreen() {
            aspect_to_widescreen(self.vi_aspect_ratio)
        } else {
            self.vi_aspect_ratio
        }
    }

    /// Grows one side of `width` x `height` so the result has the draw
    /// aspect ratio.
    pub fn scale_to_display_aspect_ratio(&self, width: i32, height: i32) -> (f32, f32) {
        let ratio = self.draw_aspect_ratio();
        let (width, height) = (width as f32, height as f32);
        if width / height >= ratio {
            (width, width / ratio)
        } else {
            (height * ratio, height)
        }
    }

    /// Window size that shows a `width` x `height` XFB at the draw aspect
    /// ratio. Both dimensions are multiples of 4.
    pub fn output_dimensions(&self, width: i32, height: i32) -> (i32, i32) {
        let (mut w, mut h) = self.scale_to_display_aspect_ratio(width.max(1), height.max(1));

        if self.crop {
            let expected = self.expected_crop_aspect();
            if w / h > expected {
                w = h * expected;
            } else {
                h = w / expected;
            }
        }

        (align_down_4(w), align_down_4(h))
    }

    /// Projection scale factors `(w, h)` applied when the widescreen hack
    /// forces a different aspect ratio than the game renders at.
    pub fn aspect_ratio_hack(&self) -> (f32, f32) {
        if !self.widescreen_hack {
            return (1.0, 1.0);
        }

        let source = if self.aspect_wide {
            aspect_to_widescreen(self.vi_aspect_ratio)
        } else {
            self.vi_aspect_ratio
        };
        let target = match self.aspect_mode {
            AspectMode::Stretch => {
                let (w, h) = self.window_size();
                w / h
            }
            AspectMode::Analog => self.vi_aspect_ratio,
            AspectMode::AnalogWide => aspect_to_widescreen(self.vi_aspect_ratio),
            AspectMode::Auto => source,
        };

        let adjust = source / target;
        if adjust > 1.0 {
            (1.0, 1.0 / adjust)
        } else {
            (adjust, 1.0)
        }
    }

    /// Centered rectangle of the backbuffer the XFB is drawn into.
    ///
    /// Width and height are multiples of 4 and the result depends only on
    /// `self`.
    pub fn target_rectangle(&self) -> TargetRectangle {
        let (win_w, win_h) = self.window_size();

        let mut draw_w = self.draw_aspect_ratio();
        let mut draw_h = 1.0f32;
        let (mut crop_w, mut crop_h) = (draw_w, draw_h);

        if self.crop && self.aspect_mode != AspectMode::Stretch {
            let expected = self.expected_crop_aspect();
            if crop_w / crop_h >= expected {
                crop_w = crop_h * expected;
            } else {
                crop_h = crop_w / expected;
            }
        }

        let scale = if win_w / win_h >= crop_w / crop_h {
            win_h / crop_h
        } else {
            win_w / crop_w
        };
        draw_w *= scale;
        draw_h *= scale;

        let width = align_down_4(draw_w);
        let height = align_down_4(draw_h);
        let left = (win_w / 2.0 - width as f32 / 2.0).round() as i32;
        let top = (win_h / 2.0 - height as f32 / 2.0).round() as i32;
        TargetRectangle::new(left, top, left + width, top + height)
    }
}

/// Splits `rc` into the left and right eye rectangles of a stereo layout.
///
/// Each eye gets half of `rc`, offset by a quarter of the backbuffer towards
/// its side. Flipped rectangles keep their orientation.
pub fn convert_stereo_rectangle(
    mode: StereoMode,
    rc: &TargetRectangle,
    backbuffer_width: u32,
    backbuffer_height: u32,
) -> (TargetRectangle, TargetRectangle) {
    let mut draw = *rc;
    if mode == StereoMode::TopAndBottom {
        let height = rc.bottom - rc.top;
        draw.top += height / 4;
        draw.bottom -= height / 4;
        let shift = backbuffer_height as i32 / 4;
        (draw.offset(0, -shift), draw.offset(0, shift))
    } else {
        let width = rc.right - rc.left;
        draw.left += width / 4;
        draw.right -= width / 4;
        let shift = backbuffer_width as i32 / 4;
        (draw.offset(-shift, 0), draw.offset(shift, 0))
    }
}

/// Integral EFB scale for the current settings.
///
/// `AutoIntegral` picks the smallest scale whose EFB covers the target
/// rectangle at the last XFB size. The result never needs a texture larger
/// than `max_texture_size` and is at least 1.
pub fn calculate_target_scale(
    efb_scale: EfbScale,
    target_rectangle: &TargetRectangle,
    last_xfb: (u32, u32),
    max_texture_size: u32,
) -> u32 {
    let scale = match efb_scale {
        EfbScale::AutoIntegral => {
            let (xfb_w, xfb_h) = (last_xfb.0.max(1) as i64, last_xfb.1.max(1) as i64);
            let w = (EFB_WIDTH as i64 * target_rectangle.width() as i64 / xfb_w) as i32;
            let h = (EFB_HEIGHT as i64 * target_rectangle.height() as i64 / xfb_h) as i32;
            let scale_x = (w - 1) / EFB_WIDTH as i32 + 1;
            let scale_y = (h - 1) / EFB_HEIGHT as i32 + 1;
            scale_x.max(scale_y).max(1) as u32
        }
        EfbScale::Fixed(n) => n.max(1),
    };

    if max_texture_size < EFB_WIDTH.saturating_mul(scale) {
        (max_texture_size / EFB_WIDTH).max(1)
    } else {
        scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(mode: AspectMode, width: u32, height: u32) -> DisplayGeometry {
        DisplayGeometry {
            aspect_mode: mode,
            crop: false,
            widescreen_hack: false,
            aspect_wide: false,
            vi_aspect_ratio: 4.0 / 3.0,
            backbuffer_width: width,
            backbuffer_height: height,
        }
    }

    const MODES: [AspectMode; 4] = [
        AspectMode::Auto,
        AspectMode::Analog,
        AspectMode::AnalogWide,
        AspectMode::Stretch,
    ];

    #[test]
    fn rectangle_is_aligned_to_four() {
        let sizes = [
            (1, 1),
            (3, 7),
            (333, 777),
            (640, 480),
            (641, 479),
            (1279, 719),
            (1920, 1080),
            (2560, 1081),
        ];
        for &(w, h) in &sizes {
            for mode in MODES {
                for crop in [false, true] {
                    for wide in [false, true] {
                        let g = DisplayGeometry {
                            crop,
                            aspect_wide: wide,
                            ..geometry(mode, w, h)
                        };
                        let rc = g.target_rectangle();
                        assert_eq!(rc.width() % 4, 0, "{w}x{h} {mode:?} crop={crop}");
                        assert_eq!(rc.height() % 4, 0, "{w}x{h} {mode:?} crop={crop}");
                        assert_eq!(rc, g.target_rectangle());

                        let (ow, oh) = g.output_dimensions(w as i32, h as i32);
                        assert_eq!((ow % 4, oh % 4), (0, 0));
                    }
                }
            }
        }
    }

    #[test]
    fn analog_is_pillarboxed_in_wide_window() {
        let rc = geometry(AspectMode::Analog, 1920, 1080).target_rectangle();
        assert_eq!(rc, TargetRectangle::new(240, 0, 1680, 1080));
    }

    #[test]
    fn stretch_fills_window() {
        let rc = geometry(AspectMode::Stretch, 1280, 720).target_rectangle();
        assert_eq!(rc, TargetRectangle::new(0, 0, 1280, 720));
    }

    #[test]
    fn widescreen_is_letterboxed() {
        let g = DisplayGeometry {
            aspect_wide: true,
            ..geometry(AspectMode::Auto, 640, 480)
        };
        let rc = g.target_rectangle();
        assert_eq!(rc.width(), 640);
        assert_eq!(rc.height(), 360);
        assert_eq!(rc.top, 60);
    }

    #[test]
    fn output_dimensions_widen_native_efb() {
        let g = geometry(AspectMode::Auto, 640, 480);
        assert_eq!(g.output_dimensions(640, 528), (704, 528));
        assert_eq!(g.output_dimensions(0, 0), (0, 0));
    }

    #[test]
    fn aspect_hack_squeezes_horizontally() {
        let mut g = DisplayGeometry {
            widescreen_hack: true,
            ..geometry(AspectMode::AnalogWide, 640, 480)
        };
        let (w, h) = g.aspect_ratio_hack();
        assert!((w - 0.75).abs() < 1e-5);
        assert_eq!(h, 1.0);

        g.widescreen_hack = false;
        assert_eq!(g.aspect_ratio_hack(), (1.0, 1.0));
    }

    #[test]
    fn stereo_halves_are_offset_by_a_quarter() {
        let rc = TargetRectangle::new(0, 0, 640, 480);
        let (left, right) = convert_stereo_rectangle(StereoMode::TopAndBottom, &rc, 640, 480);
        assert_eq!(left, TargetRectangle::new(0, 0, 640, 240));
        assert_eq!(right, TargetRectangle::new(0, 240, 640, 480));

        let (left, right) = convert_stereo_rectangle(StereoMode::SideBySide, &rc, 640, 480);
        assert_eq!(left, TargetRectangle::new(0, 0, 320, 480));
        assert_eq!(right, TargetRectangle::new(320, 0, 640, 480));
    }

    #[test]
    fn target_scale_modes() {
        let rc = TargetRectangle::new(0, 0, 1280, 1056);
        assert_eq!(calculate_target_scale(EfbScale::AutoIntegral, &rc, (640, 528), 16384), 2);
        assert_eq!(calculate_target_scale(EfbScale::AutoIntegral, &rc, (0, 0), 16384), 25);
        assert_eq!(calculate_target_scale(EfbScale::Fixed(3), &rc, (640, 528), 1024), 1);
        assert_eq!(calculate_target_scale(EfbScale::Fixed(0), &rc, (640, 528), 16384), 1);
        assert_eq!(calculate_target_scale(EfbScale::Fixed(4), &rc, (640, 528), 16384), 4);
    }
}
