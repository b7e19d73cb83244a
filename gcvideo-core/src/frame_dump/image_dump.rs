//! PNG output for screenshots and image-sequence frame dumps.

use super::FrameDumpConfig;
use crate::error::{Result, VideoError};
use crate::host::FrameDumpPrompt;
use image::{ImageFormat, RgbaImage};
use std::path::{Path, PathBuf};

/// Copies the visible rows of `config` into a tightly packed, opaque RGBA buffer.
pub fn pack_rgba(config: &FrameDumpConfig) -> Result<Vec<u8>> {
    let row_bytes = config.width as usize * 4;
    let stride = config.stride as usize;
    let rows = config.height as usize;
    if stride < row_bytes || config.data.len() < stride * rows.saturating_sub(1) + row_bytes {
        return Err(VideoError::FrameDump(format!(
            "frame data of {} bytes too small for {}x{} with stride {}",
            config.data.len(),
            config.width,
            config.height,
            config.stride
        )));
    }

    let mut packed = Vec::with_capacity(row_bytes * rows);
    for row in config.data.chunks(stride).take(rows) {
        packed.extend_from_slice(&row[..row_bytes]);
    }
    for alpha in packed.iter_mut().skip(3).step_by(4) {
        *alpha = 0xFF;
    }
    Ok(packed)
}

/// Writes `config` to `path` as PNG.
pub fn write_png(path: &Path, config: &FrameDumpConfig) -> Result<()> {
    let pixels = pack_rgba(config)?;
    let image = RgbaImage::from_raw(config.width, config.height, pixels).ok_or_else(|| {
        VideoError::FrameDump(format!("invalid {}x{} image buffer", config.width, config.height))
    })?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Numbered `framedump_<N>.png` files in one directory.
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    counter: u32,
}

impl ImageSequence {
    pub fn file_name(dir: &Path, counter: u32) -> PathBuf {
        dir.join(format!("framedump_{counter}.png"))
    }

    /// Starts numbering at 1.
    ///
    /// Unless `silent`, an existing first image is only overwritten when
    /// `prompt` agrees; otherwise the sequence does not start.
    pub fn start(dir: &Path, silent: bool, prompt: &dyn FrameDumpPrompt) -> Option<Self> {
        let sequence = Self {
            dir: dir.to_path_buf(),
            counter: 1,
        };
        if !silent {
            let first = sequence.next_file_name();
            if first.exists() && !prompt.confirm_overwrite(&first) {
                log::info!("Frame dump to '{}' declined", dir.display());
                return None;
            }
        }
        log::info!("Dumping frames as images to '{}'", dir.display());
        Some(sequence)
    }

    pub fn next_file_name(&self) -> PathBuf {
        Self::file_name(&self.dir, self.counter)
    }

    pub fn write_frame(&mut self, config: &FrameDumpConfig) -> Result<()> {
        let path = self.next_file_name();
        let result = write_png(&path, config);
        self.counter += 1;
        result
    }

    pub fn frames_written(&self) -> u32 {
        self.counter - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_dump::FrameState;

    #[test]
    fn packing_drops_row_padding_and_forces_alpha() {
        let mut data = vec![0u8; 2 * 12];
        data[..8].copy_from_slice(&[1, 2, 3, 0, 4, 5, 6, 7]);
        data[8..12].copy_from_slice(&[9, 9, 9, 9]);
        data[12..20].copy_from_slice(&[10, 11, 12, 13, 14, 15, 16, 17]);
        let config = FrameDumpConfig {
            data,
            width: 2,
            height: 2,
            stride: 12,
            state: FrameState::default(),
        };
        let packed = pack_rgba(&config).unwrap();
        assert_eq!(
            packed,
            vec![1, 2, 3, 255, 4, 5, 6, 255, 10, 11, 12, 255, 14, 15, 16, 255]
        );
    }

    #[test]
    fn short_buffer_is_rejected() {
        let config = FrameDumpConfig {
            data: vec![0; 10],
            width: 4,
            height: 4,
            stride: 16,
            state: FrameState::default(),
        };
        assert!(matches!(pack_rgba(&config), Err(VideoError::FrameDump(_))));
    }

    #[test]
    fn written_png_decodes_to_same_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("a.png");
        let config = FrameDumpConfig {
            data: vec![0x40; 8 * 4 * 4],
            width: 8,
            height: 4,
            stride: 32,
            state: FrameState::default(),
        };
        write_png(&path, &config).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }
}
