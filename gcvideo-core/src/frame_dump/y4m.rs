//! Uncompressed YUV4MPEG2 video output.
//!
//! Frames are converted from RGBA8 to 4:2:0 with full-range BT.601
//! coefficients, the JPEG chroma siting declared by `C420jpeg`. A change of
//! frame size closes the current file and starts the next one.

use super::FrameDumpConfig;
use crate::error::{Result, VideoError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Frame rate as a y4m rational.
fn frame_rate(refresh_rate: f32) -> (u32, u32) {
    if !refresh_rate.is_finite() || refresh_rate <= 0.0 {
        return (60, 1);
    }
    ((refresh_rate * 1000.0).round() as u32, 1000)
}

pub fn stream_header(width: u32, height: u32, refresh_rate: f32) -> String {
    let (num, den) = frame_rate(refresh_rate);
    format!("YUV4MPEG2 W{width} H{height} F{num}:{den} Ip A1:1 C420jpeg\n")
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Converts RGBA8 rows (`stride` bytes apart) into planar Y, U and V.
pub fn rgba_to_yuv420(data: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let (w, h, stride) = (width as usize, height as usize, stride as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut out = vec![0u8; w * h + 2 * cw * ch];
    let (luma, chroma) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut(cw * ch);

    let pixel = |x: usize, y: usize| -> (f32, f32, f32) {
        let o = y * stride + x * 4;
        (data[o] as f32, data[o + 1] as f32, data[o + 2] as f32)
    };

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = pixel(x, y);
            luma[y * w + x] = clamp_u8(0.299 * r + 0.587 * g + 0.114 * b);
        }
    }

    for cy in 0..ch {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0.0, 0.0, 0.0, 0.0);
            for y in (cy * 2)..(cy * 2 + 2).min(h) {
                for x in (cx * 2)..(cx * 2 + 2).min(w) {
                    let (pr, pg, pb) = pixel(x, y);
                    r += pr;
                    g += pg;
                    b += pb;
                    n += 1.0;
                }
            }
            let (r, g, b) = (r / n, g / n, b / n);
            u_plane[cy * cw + cx] = clamp_u8(128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b);
            v_plane[cy * cw + cx] = clamp_u8(128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b);
        }
    }
    out
}

/// An open `.y4m` stream.
pub struct Y4mDump {
    dir: PathBuf,
    path: PathBuf,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    frames: u64,
}

impl Y4mDump {
    /// Picks the first unused `framedump<N>.y4m` in `dir`.
    fn next_path(dir: &Path) -> PathBuf {
        (0u32..)
            .map(|n| dir.join(format!("framedump{n}.y4m")))
            .find(|p| !p.exists())
            .unwrap_or_else(|| dir.join("framedump.y4m"))
    }

    pub fn start(dir: &Path, config: &FrameDumpConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(VideoError::FrameDump(format!(
                "cannot start video dump at {}x{}",
                config.width, config.height
            )));
        }
        std::fs::create_dir_all(dir)?;
        let path = Self::next_path(dir);
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(
            stream_header(config.width, config.height, config.state.refresh_rate).as_bytes(),
        )?;
        log::info!(
            "Dumping frames to '{}' ({}x{})",
            path.display(),
            config.width,
            config.height
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            writer,
            width: config.width,
            height: config.height,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_frame(&mut self, config: &FrameDumpConfig) -> Result<()> {
        if config.width != self.width || config.height != self.height {
            log::info!(
                "Frame size changed from {}x{} to {}x{}, starting a new video file",
                self.width,
                self.height,
                config.width,
                config.height
            );
            let next = Self::start(&self.dir, config)?;
            let previous = std::mem::replace(self, next);
            previous.stop()?;
        }

        let needed = config.stride as usize * config.height.saturating_sub(1) as usize
            + config.width as usize * 4;
        if config.data.len() < needed {
            return Err(VideoError::FrameDump(format!(
                "frame data of {} bytes too small for {}x{}",
                config.data.len(),
                config.width,
                config.height
            )));
        }

        let planes = rgba_to_yuv420(&config.data, config.width, config.height, config.stride);
        self.writer.write_all(b"FRAME\n")?;
        self.writer.write_all(&planes)?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    pub fn stop(mut self) -> Result<()> {
        self.writer.flush()?;
        log::info!(
            "Video frame dump '{}' closed after {} frames",
            self.path.display(),
            self.frames
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_dump::FrameState;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> FrameDumpConfig {
        let mut data = Vec::new();
        for _ in 0..width * height {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        FrameDumpConfig {
            data,
            width,
            height,
            stride: width * 4,
            state: FrameState {
                ticks: 0,
                frame_number: 0,
                refresh_rate: 59.94,
            },
        }
    }

    #[test]
    fn header_uses_millihertz_rate() {
        assert_eq!(
            stream_header(640, 480, 59.94),
            "YUV4MPEG2 W640 H480 F59940:1000 Ip A1:1 C420jpeg\n"
        );
        assert!(stream_header(4, 4, 0.0).contains("F60:1"));
    }

    #[test]
    fn grey_maps_to_neutral_chroma() {
        let frame = solid(4, 4, [128, 128, 128]);
        let yuv = rgba_to_yuv420(&frame.data, 4, 4, 16);
        assert_eq!(yuv.len(), 16 + 4 + 4);
        assert!(yuv[..16].iter().all(|&y| y == 128));
        assert!(yuv[16..].iter().all(|&c| c == 128));
    }

    #[test]
    fn frames_are_appended_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let frame = solid(4, 4, [255, 0, 0]);
        let mut dump = Y4mDump::start(dir.path(), &frame).unwrap();
        dump.write_frame(&frame).unwrap();
        dump.write_frame(&frame).unwrap();
        let path = dump.path().to_path_buf();
        assert_eq!(dump.frames_written(), 2);
        dump.stop().unwrap();

        let bytes = std::fs::read(path).unwrap();
        let header = stream_header(4, 4, 59.94);
        assert!(bytes.starts_with(header.as_bytes()));
        assert_eq!(bytes.len(), header.len() + 2 * (6 + 24));
    }

    #[test]
    fn size_change_opens_next_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut dump = Y4mDump::start(dir.path(), &solid(4, 4, [0, 0, 0])).unwrap();
        dump.write_frame(&solid(8, 4, [0, 0, 0])).unwrap();
        assert!(dump.path().ends_with("framedump1.y4m"));
        dump.stop().unwrap();
        assert!(dir.path().join("framedump0.y4m").exists());
    }
}
