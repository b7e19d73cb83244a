// Video settings and backend capability description.
//
// `VideoConfig` is written by the host thread through `SharedConfig` and
// snapshotted by the renderer once per frame (see
// `Renderer::check_for_config_changes`). `BackendInfo` is filled in by the
// backend at creation time and never changes afterwards.

use crate::error::Result;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Shading language family the backend consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiType {
    /// HLSL.
    D3D,
    /// GLSL with GL clip conventions.
    OpenGL,
    /// GLSL with Vulkan clip conventions.
    Vulkan,
    /// WGSL for wgpu.
    Wgsl,
    /// No shading language (Null backend).
    Nothing,
}

impl ApiType {
    pub fn name(self) -> &'static str {
        match self {
            ApiType::D3D => "D3D",
            ApiType::OpenGL => "OpenGL",
            ApiType::Vulkan => "Vulkan",
            ApiType::Wgsl => "WGSL",
            ApiType::Nothing => "Nothing",
        }
    }

    pub fn is_glsl(self) -> bool {
        matches!(self, ApiType::OpenGL | ApiType::Vulkan)
    }
}

/// How the picture aspect ratio is chosen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectMode {
    /// Follow the game (heuristic on GameCube, SYSCONF on Wii).
    #[default]
    Auto,
    /// Force 4:3.
    Analog,
    /// Force 16:9.
    AnalogWide,
    /// Fill the window.
    Stretch,
}

/// Stereoscopic 3D output mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StereoMode {
    #[default]
    Off,
    /// Side-by-side: left eye in the left half.
    SideBySide,
    /// Top-and-bottom: left eye in the top half.
    TopAndBottom,
}

/// Internal resolution multiplier for the EFB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EfbScale {
    /// Pick the smallest integral scale that covers the window.
    AutoIntegral,
    /// Fixed multiple of native resolution (1 = native).
    Fixed(u32),
}

impl Default for EfbScale {
    fn default() -> Self {
        EfbScale::Fixed(1)
    }
}

/// User-facing video settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub aspect_mode: AspectMode,
    /// Aspect mode the emulated console asks for, if any.
    pub suggested_aspect_mode: AspectMode,
    pub crop: bool,
    pub widescreen_hack: bool,
    pub efb_scale: EfbScale,
    pub multisamples: u32,
    pub ssaa: bool,
    pub stereo_mode: StereoMode,
    pub max_anisotropy: u32,
    pub force_filtering: bool,
    pub vsync: bool,
    pub bbox_enable: bool,
    pub wireframe: bool,
    pub per_pixel_lighting: bool,
    pub vertex_rounding: bool,
    pub fast_depth_calc: bool,
    pub sync_refresh_rate: bool,
    pub internal_resolution_frame_dumps: bool,
    pub dump_frames_as_images: bool,
    pub dump_frames_silent: bool,
    pub dump_path: PathBuf,
    pub show_fps: bool,
    pub show_frame_count: bool,
    pub overlay_stats: bool,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            aspect_mode: AspectMode::Auto,
            suggested_aspect_mode: AspectMode::Auto,
            crop: false,
            widescreen_hack: false,
            efb_scale: EfbScale::Fixed(1),
            multisamples: 1,
            ssaa: false,
            stereo_mode: StereoMode::Off,
            max_anisotropy: 0,
            force_filtering: false,
            vsync: true,
            bbox_enable: false,
            wireframe: false,
            per_pixel_lighting: false,
            vertex_rounding: false,
            fast_depth_calc: true,
            sync_refresh_rate: false,
            internal_resolution_frame_dumps: false,
            dump_frames_as_images: false,
            dump_frames_silent: false,
            dump_path: PathBuf::from("Dump/Frames"),
            show_fps: false,
            show_frame_count: false,
            overlay_stats: false,
        }
    }
}

impl VideoConfig {
    /// Reads a JSON config, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: VideoConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// True when the picture should be treated as 16:9.
    pub fn uses_widescreen(&self, aspect_wide: bool) -> bool {
        self.aspect_mode == AspectMode::AnalogWide
            || (self.aspect_mode != AspectMode::Analog && aspect_wide)
    }
}

/// Configuration shared between the host thread (writer) and the renderer.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<VideoConfig>>);

impl SharedConfig {
    pub fn new(config: VideoConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> VideoConfig {
        match self.0.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Applies `f` to the settings under the write lock.
    pub fn update(&self, f: impl FnOnce(&mut VideoConfig)) {
        match self.0.write() {
            Ok(mut config) => f(&mut config),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

bitflags! {
    /// Settings groups that changed between two frames.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigChangeBits: u32 {
        const HOST_CONFIG = 1 << 0;
        const MULTISAMPLES = 1 << 1;
        const STEREO_MODE = 1 << 2;
        const TARGET_SIZE = 1 << 3;
        const ANISOTROPY = 1 << 4;
        const FORCE_TEXTURE_FILTERING = 1 << 5;
        const VSYNC = 1 << 6;
        const BBOX = 1 << 7;
    }
}

/// Capabilities reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendInfo {
    pub api_type: ApiType,
    pub display_name: String,
    pub max_texture_size: u32,
    pub aa_modes: Vec<u32>,
    pub supports_dual_source_blend: bool,
    pub supports_geometry_shaders: bool,
    pub supports_early_z: bool,
    pub supports_bbox: bool,
    pub supports_gs_instancing: bool,
    pub supports_clip_control: bool,
    pub supports_ssaa: bool,
    pub supports_fragment_stores_and_atomics: bool,
    pub supports_depth_clamp: bool,
    pub supports_reversed_depth_range: bool,
    pub supports_bitfield: bool,
    pub supports_dynamic_sampler_indexing: bool,
    pub supports_framebuffer_fetch: bool,
    pub supports_logic_op: bool,
    pub supports_palette_conversion: bool,
    pub supports_primitive_restart: bool,
    pub supports_large_points: bool,
}

impl BackendInfo {
    /// Capability set of a backend that accepts everything and draws nothing.
    pub fn null() -> Self {
        Self {
            api_type: ApiType::Nothing,
            display_name: "Null".to_string(),
            max_texture_size: 16384,
            aa_modes: vec![1],
            supports_dual_source_blend: true,
            supports_geometry_shaders: true,
            supports_early_z: true,
            supports_bbox: true,
            supports_gs_instancing: true,
            supports_clip_control: true,
            supports_ssaa: true,
            supports_fragment_stores_and_atomics: false,
            supports_depth_clamp: true,
            supports_reversed_depth_range: true,
            supports_bitfield: false,
            supports_dynamic_sampler_indexing: false,
            supports_framebuffer_fetch: false,
            supports_logic_op: false,
            supports_palette_conversion: true,
            supports_primitive_restart: true,
            supports_large_points: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = VideoConfig::load(&dir.path().join("video.json")).unwrap();
        assert_eq!(config, VideoConfig::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("video.json");
        let config = VideoConfig {
            aspect_mode: AspectMode::Stretch,
            efb_scale: EfbScale::AutoIntegral,
            stereo_mode: StereoMode::TopAndBottom,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(VideoConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: VideoConfig = serde_json::from_str(r#"{"crop": true}"#).unwrap();
        assert!(config.crop);
        assert_eq!(config.multisamples, 1);
    }

    #[test]
    fn widescreen_policy() {
        let mut config = VideoConfig::default();
        assert!(config.uses_widescreen(true));
        assert!(!config.uses_widescreen(false));
        config.aspect_mode = AspectMode::Analog;
        assert!(!config.uses_widescreen(true));
        config.aspect_mode = AspectMode::AnalogWide;
        assert!(config.uses_widescreen(false));
    }

    #[test]
    fn shared_config_update_is_visible_in_snapshot() {
        let shared = SharedConfig::new(VideoConfig::default());
        shared.update(|c| c.vsync = false);
        assert!(!shared.snapshot().vsync);
    }
}
