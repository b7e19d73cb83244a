// Renderer side of frame dumping.
//
// A dumped frame is drawn into its own render texture at dump size and
// copied into a readback texture. The copy is mapped one swap later, when
// the GPU has finished it, and the pixels go to the worker thread. Two
// readback textures alternate so the copy of frame N never waits on the
// mapping of frame N-1.

use super::{logged, Renderer};
use crate::frame_dump::{FrameDumpConfig, FrameState};
use crate::math::EfbRectangle;
use crate::texture::{AbstractTexture, AbstractTextureFormat, StagingTextureType, TextureConfig};

impl Renderer {
    /// True while a screenshot is pending or frame dumping is on.
    pub fn is_frame_dumping(&self) -> bool {
        self.frame_dumper.is_frame_dumping()
    }

    pub(super) fn dump_current_frame(&mut self) {
        if self.render_frame_dump() {
            self.queue_frame_dump_readback();
        }
    }

    fn frame_dump_size(&self, xfb: &AbstractTexture) -> (u32, u32) {
        if !self.config.internal_resolution_frame_dumps && !self.headless {
            let rc = self.target_rectangle;
            return (rc.width() as u32, rc.height() as u32);
        }
        let (w, h) =
            self.calculate_output_dimensions(xfb.config().width as i32, xfb.config().height as i32);
        (w.max(0) as u32, h.max(0) as u32)
    }

    /// Draws the last presented XFB into the frame dump texture.
    ///
    /// Returns false when there is nothing to dump.
    pub fn render_frame_dump(&mut self) -> bool {
        let Some(xfb) = self.last_xfb_texture.clone() else {
            return false;
        };
        let (width, height) = self.frame_dump_size(&xfb);
        if width == 0 || height == 0 {
            return false;
        }

        let stale = self
            .frame_dump_render_texture
            .as_ref()
            .map_or(true, |t| t.config().width != width || t.config().height != height);
        if stale {
            self.frame_dump_render_texture = None;
            let config = TextureConfig::render_target(width, height, AbstractTextureFormat::RGBA8);
            match self.create_texture(&config) {
                Ok(texture) => self.frame_dump_render_texture = Some(texture),
                Err(_) => return false,
            }
        }
        let Some(target) = &self.frame_dump_render_texture else {
            return false;
        };

        let region = self.last_xfb_region;
        let dst = EfbRectangle::with_size(width as i32, height as i32);
        if region.width() != dst.width() || region.height() != dst.height() {
            target.scale_rectangle_from_texture(&xfb, &region, &dst);
        } else {
            target.copy_rectangle_from_texture(&xfb, &region, 0, 0, &dst, 0, 0);
        }
        true
    }

    /// Starts the GPU copy of the dump texture into a readback texture.
    pub fn queue_frame_dump_readback(&mut self) {
        let Some(config) = self.frame_dump_render_texture.as_ref().map(|t| *t.config()) else {
            return;
        };

        if self.frame_dump_readback[0].is_some() {
            self.frame_dump_readback.swap(0, 1);
        }
        let stale = self.frame_dump_readback[0]
            .as_ref()
            .map_or(true, |rb| *rb.config() != config);
        if stale {
            self.frame_dump_readback[0] = None;
            let created = logged(
                "frame dump readback texture",
                self.backend
                    .create_staging_texture(StagingTextureType::Readback, &config),
            );
            match created {
                Ok(readback) => self.frame_dump_readback[0] = Some(readback),
                Err(_) => return,
            }
        }

        self.last_frame_state = FrameState {
            ticks: self.last_xfb_ticks,
            frame_number: self.frame_count(),
            refresh_rate: self.last_refresh_rate,
        };
        self.last_frame_exported = true;

        if let (Some(source), Some(readback)) = (
            &self.frame_dump_render_texture,
            &mut self.frame_dump_readback[0],
        ) {
            readback.copy_from_texture_all(source, 0, 0);
        }
    }

    /// Hands the frame queued last swap to the worker. Shuts the worker
    /// down once dumping has been turned off.
    pub fn flush_frame_dump(&mut self) {
        if !self.last_frame_exported {
            return;
        }

        self.frame_dumper.finish_frame_data();
        if let Some(readback) = &mut self.frame_dump_readback[0] {
            readback.flush();
            if readback.map() {
                let config = *readback.config();
                let stride = readback.mapped_stride();
                if let Some(data) = readback.mapped_data() {
                    self.frame_dumper.dump_frame_data(FrameDumpConfig {
                        data: data.to_vec(),
                        width: config.width,
                        height: config.height,
                        stride,
                        state: self.last_frame_state,
                    });
                }
                readback.unmap();
            } else {
                log::warn!("Failed to map frame dump readback texture");
            }
        }
        self.last_frame_exported = false;

        if !self.is_frame_dumping() {
            self.shutdown_frame_dumping();
        }
    }

    /// Flushes the pending frame and stops the worker, releasing the dump
    /// textures if it was running.
    pub fn shutdown_frame_dumping(&mut self) {
        self.flush_frame_dump();
        if self.frame_dumper.stop_thread() {
            self.frame_dump_render_texture = None;
            self.frame_dump_readback = [None, None];
        }
    }
}
