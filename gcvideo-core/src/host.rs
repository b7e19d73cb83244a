//! Interfaces to the subsystems around the video core.
//!
//! The texture cache, the host window layer and the emulated video interface
//! live outside this crate. The renderer reaches them only through the traits
//! below, so a headless driver or a test can stand in for any of them.

use crate::backend::RenderBackend;
use crate::config::VideoConfig;
use crate::texture::AbstractTexture;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// An external framebuffer resolved by the texture cache.
#[derive(Debug, Clone)]
pub struct XfbEntry {
    /// Changes whenever the cached contents change.
    pub id: u64,
    pub texture: Arc<AbstractTexture>,
    /// Width the XFB has at native resolution.
    pub native_width: u32,
    pub native_height: u32,
}

/// End-of-frame hooks into the texture cache.
pub trait TextureCacheHooks: Send {
    /// Looks up (or decodes) the XFB texture at `addr`.
    fn get_xfb_texture(
        &mut self,
        backend: &mut dyn RenderBackend,
        addr: u32,
        stride: u32,
        height: u32,
        force_safe_hash: bool,
    ) -> Option<XfbEntry>;

    /// Writes pending EFB copies back to emulated memory.
    fn flush_efb_copies(&mut self);

    /// Evicts entries not used since `frame_count`.
    fn cleanup(&mut self, frame_count: u64);

    fn on_config_changed(&mut self, _config: &VideoConfig) {}
}

/// Requests to the window layer. Fire-and-forget.
pub trait Host: Send + Sync {
    fn request_render_window_size(&self, width: i32, height: i32);
    fn request_fullscreen(&self, enable: bool, refresh_rate: f32);
}

/// State of the emulated video interface.
pub trait VideoInterface: Send {
    /// Picture aspect ratio the VI is scanning out (about 4:3).
    fn aspect_ratio(&self) -> f32;
    fn target_refresh_rate(&self) -> f32;
}

/// Asks the user before frame dump images are overwritten.
pub trait FrameDumpPrompt: Send + Sync {
    fn confirm_overwrite(&self, path: &Path) -> bool;
}

/// Console facts fixed for the session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SystemInfo {
    pub is_wii: bool,
    /// Widescreen setting from the Wii system configuration.
    pub wii_widescreen: bool,
}

// ---------------------------------------------------------------------------
// Stand-ins
// ---------------------------------------------------------------------------

/// Host without a window. Requests are logged and recorded.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    requests: Mutex<HostRequests>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HostRequests {
    pub window_sizes: Vec<(i32, i32)>,
    pub fullscreen: Vec<(bool, f32)>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> HostRequests {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self) -> MutexGuard<'_, HostRequests> {
        match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Host for HeadlessHost {
    fn request_render_window_size(&self, width: i32, height: i32) {
        log::debug!("Render window size requested: {width}x{height}");
        self.record().window_sizes.push((width, height));
    }

    fn request_fullscreen(&self, enable: bool, refresh_rate: f32) {
        log::debug!("Fullscreen requested: {enable} at {refresh_rate} Hz");
        self.record().fullscreen.push((enable, refresh_rate));
    }
}

/// Video interface with constant timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedVideoInterface {
    pub aspect_ratio: f32,
    pub refresh_rate: f32,
}

impl FixedVideoInterface {
    /// NTSC 480i timing.
    pub fn ntsc() -> Self {
        Self {
            aspect_ratio: 4.0 / 3.0,
            refresh_rate: 59.94,
        }
    }

    /// PAL 576i timing.
    pub fn pal() -> Self {
        Self {
            aspect_ratio: 4.0 / 3.0,
            refresh_rate: 50.0,
        }
    }
}

impl Default for FixedVideoInterface {
    fn default() -> Self {
        Self::ntsc()
    }
}

impl VideoInterface for FixedVideoInterface {
    fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    fn target_refresh_rate(&self) -> f32 {
        self.refresh_rate
    }
}

/// Answers every overwrite prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl FrameDumpPrompt for FixedAnswer {
    fn confirm_overwrite(&self, path: &Path) -> bool {
        log::info!(
            "Frame dump image '{}' already exists, overwrite: {}",
            path.display(),
            self.0
        );
        self.0
    }
}

/// Texture cache serving XFB textures registered by the caller.
///
/// Clones share the same entries, so a driver can keep a handle after
/// giving one to the renderer.
#[derive(Debug, Clone, Default)]
pub struct XfbTextureCache {
    inner: Arc<Mutex<XfbCacheState>>,
}

#[derive(Debug, Default)]
struct XfbCacheState {
    entries: HashMap<u32, XfbEntry>,
    efb_copy_flushes: u64,
    last_cleanup: Option<u64>,
    config_updates: u64,
}

impl XfbTextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, XfbCacheState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes `entry` the XFB at `addr`, replacing any previous one.
    pub fn insert(&self, addr: u32, entry: XfbEntry) {
        self.state().entries.insert(addr, entry);
    }

    pub fn remove(&self, addr: u32) {
        self.state().entries.remove(&addr);
    }

    pub fn efb_copy_flushes(&self) -> u64 {
        self.state().efb_copy_flushes
    }

    pub fn last_cleanup(&self) -> Option<u64> {
        self.state().last_cleanup
    }

    pub fn config_updates(&self) -> u64 {
        self.state().config_updates
    }
}

impl TextureCacheHooks for XfbTextureCache {
    fn get_xfb_texture(
        &mut self,
        _backend: &mut dyn RenderBackend,
        addr: u32,
        _stride: u32,
        _height: u32,
        _force_safe_hash: bool,
    ) -> Option<XfbEntry> {
        self.state().entries.get(&addr).cloned()
    }

    fn flush_efb_copies(&mut self) {
        self.state().efb_copy_flushes += 1;
    }

    fn cleanup(&mut self, frame_count: u64) {
        self.state().last_cleanup = Some(frame_count);
    }

    fn on_config_changed(&mut self, _config: &VideoConfig) {
        self.state().config_updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::texture::{AbstractTextureFormat, TextureConfig};

    #[test]
    fn xfb_cache_clones_share_entries() {
        let mut backend = NullBackend::new(16, 16).unwrap();
        let texture = Arc::new(
            backend
                .create_texture(&TextureConfig::simple(8, 8, AbstractTextureFormat::RGBA8))
                .unwrap(),
        );
        let driver = XfbTextureCache::new();
        let mut renderer_side = driver.clone();
        driver.insert(
            0x100,
            XfbEntry {
                id: 7,
                texture,
                native_width: 8,
                native_height: 8,
            },
        );
        let entry = renderer_side
            .get_xfb_texture(&mut backend, 0x100, 8, 8, false)
            .unwrap();
        assert_eq!(entry.id, 7);
        assert!(renderer_side
            .get_xfb_texture(&mut backend, 0x200, 8, 8, false)
            .is_none());

        renderer_side.cleanup(3);
        assert_eq!(driver.last_cleanup(), Some(3));
    }

    #[test]
    fn headless_host_records_requests() {
        let host = HeadlessHost::new();
        host.request_render_window_size(640, 480);
        host.request_fullscreen(true, 60.0);
        let requests = host.requests();
        assert_eq!(requests.window_sizes, vec![(640, 480)]);
        assert_eq!(requests.fullscreen, vec![(true, 60.0)]);
    }
}
