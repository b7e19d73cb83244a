//! Per-frame statistics and frame pacing samples.
//!
//! [`Statistics`] counts what happened during the current frame and is reset
//! by the renderer after every genuine present. [`FrameTimer`] measures the
//! wall-clock spacing of presents for the FPS display.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Counters for the frame in progress.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounters {
    pub num_draw_calls: u32,
    pub num_primitives: u32,
    pub num_vertices_loaded: u32,
    pub num_indices: u32,
    pub bytes_vertex_streamed: u64,
    pub bytes_index_streamed: u64,
    pub bytes_texel_streamed: u64,
    pub bytes_uniform_streamed: u64,
    pub num_pipelines_created: u32,
    pub num_shaders_created: u32,
    pub num_textures_created: u32,
}

/// Frame counters plus lifetime totals.
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    pub this_frame: FrameCounters,
    pub num_frames_presented: u64,
    pub num_swaps_skipped: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_frame(&mut self) {
        self.this_frame = FrameCounters::default();
    }

    /// Lines shown by the statistics overlay.
    pub fn overlay_lines(&self) -> Vec<String> {
        let f = &self.this_frame;
        vec![
            format!("Draw calls: {}", f.num_draw_calls),
            format!("Primitives: {}", f.num_primitives),
            format!("Vertices loaded: {}", f.num_vertices_loaded),
            format!(
                "Streamed: {} KiB vtx, {} KiB idx, {} KiB texel",
                f.bytes_vertex_streamed / 1024,
                f.bytes_index_streamed / 1024,
                f.bytes_texel_streamed / 1024
            ),
            format!("Pipelines created: {}", f.num_pipelines_created),
        ]
    }
}

/// Intervals between the last `window` presents.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    intervals: VecDeque<Duration>,
    window: usize,
    last_present: Option<Instant>,
}

impl FrameTimer {
    /// Two seconds of presents at 60 Hz.
    pub const DEFAULT_WINDOW: usize = 120;

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            intervals: VecDeque::with_capacity(window),
            window,
            last_present: None,
        }
    }

    pub fn mark_present(&mut self) {
        self.mark_present_at(Instant::now());
    }

    pub fn mark_present_at(&mut self, now: Instant) {
        if let Some(last) = self.last_present.replace(now) {
            if self.intervals.len() == self.window {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.saturating_duration_since(last));
        }
    }

    /// Presents per second over the window, 0 until two presents were seen.
    pub fn fps(&self) -> f32 {
        let total: Duration = self.intervals.iter().sum();
        if total.is_zero() {
            0.0
        } else {
            self.intervals.len() as f32 / total.as_secs_f32()
        }
    }

    /// Longest gap between two presents in the window.
    pub fn worst_interval(&self) -> Option<Duration> {
        self.intervals.iter().max().copied()
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_from_uniform_intervals() {
        let mut timer = FrameTimer::with_window(10);
        let start = Instant::now();
        assert_eq!(timer.fps(), 0.0);
        for i in 0..5 {
            timer.mark_present_at(start + Duration::from_millis(20 * i));
        }
        assert!((timer.fps() - 50.0).abs() < 0.1);
        assert_eq!(timer.worst_interval(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn old_intervals_leave_the_window() {
        let mut timer = FrameTimer::with_window(2);
        let start = Instant::now();
        timer.mark_present_at(start);
        timer.mark_present_at(start + Duration::from_millis(100));
        timer.mark_present_at(start + Duration::from_millis(110));
        timer.mark_present_at(start + Duration::from_millis(120));
        assert_eq!(timer.worst_interval(), Some(Duration::from_millis(10)));
        assert!((timer.fps() - 100.0).abs() < 0.1);
    }

    #[test]
    fn reset_frame_keeps_totals() {
        let mut stats = Statistics::new();
        stats.this_frame.num_draw_calls = 7;
        stats.num_frames_presented = 3;
        stats.reset_frame();
        assert_eq!(stats.this_frame, FrameCounters::default());
        assert_eq!(stats.num_frames_presented, 3);
    }
}
