//! Test Utilities
//!
//! Helpers shared by the integration tests: a headless renderer on the Null
//! backend and XFB textures registered with its texture cache.

#![allow(dead_code)]

use gcvideo_core::backend::BackendKind;
use gcvideo_core::host::{SystemInfo, XfbEntry};
use gcvideo_core::texture::{AbstractTextureFormat, TextureConfig};
use gcvideo_core::{Backend, Collaborators, Renderer, SharedConfig, VideoConfig, XfbTextureCache};
use std::sync::Arc;

/// Headless renderer with a 640x480 backbuffer.
pub fn headless_renderer(config: VideoConfig) -> (Renderer, XfbTextureCache) {
    headless_renderer_for(config, SystemInfo::default())
}

pub fn headless_renderer_for(config: VideoConfig, system: SystemInfo) -> (Renderer, XfbTextureCache) {
    let cache = XfbTextureCache::new();
    let backend = Backend::create(BackendKind::Null, 640, 480).unwrap();
    let collab = Collaborators {
        system,
        ..Collaborators::headless(Box::new(cache.clone()))
    };
    let renderer = Renderer::new(backend, SharedConfig::new(config), collab).unwrap();
    (renderer, cache)
}

/// Registers a native-resolution XFB at `addr` filled with `rgba`.
pub fn insert_xfb(
    renderer: &mut Renderer,
    cache: &XfbTextureCache,
    addr: u32,
    id: u64,
    (width, height): (u32, u32),
    rgba: [u8; 4],
) {
    let texture = renderer
        .create_texture(&TextureConfig::simple(width, height, AbstractTextureFormat::RGBA8))
        .unwrap();
    let pixels: Vec<u8> = rgba
        .iter()
        .copied()
        .cycle()
        .take((width * height * 4) as usize)
        .collect();
    texture.load(0, width, height, width, &pixels);
    cache.insert(
        addr,
        XfbEntry {
            id,
            texture: Arc::new(texture),
            native_width: width,
            native_height: height,
        },
    );
}
