//! GPU command pipeline and abstract renderer for GameCube/Wii video
//! emulation.
//!
//! The [`Renderer`] sits between the command processor and a
//! [`RenderBackend`](backend::RenderBackend). It batches decoded vertices,
//! keys pipelines by GX state, copies XFB textures to the window on each VI
//! swap and dumps frames to disk. Two backends ship with the crate: a
//! recording Null backend for headless runs and tests, and a wgpu backend
//! behind the `wgpu-backend` feature.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame_dump;
pub mod framebuffer;
pub mod host;
pub mod index_generator;
pub mod math;
pub mod native_vertex_format;
pub mod overlay;
pub mod pipeline;
pub mod render_state;
pub mod renderer;
pub mod shader_cache;
pub mod shader_gen;
pub mod stats;
pub mod sync;
pub mod texture;
pub mod vertex_manager;

pub use backend::{Backend, BackendKind, RenderBackend};
pub use config::{ApiType, AspectMode, BackendInfo, SharedConfig, StereoMode, VideoConfig};
pub use error::{Result, VideoError};
pub use frame_dump::ScreenshotHandle;
pub use host::{Host, XfbTextureCache};
pub use overlay::OverlayHandle;
pub use renderer::{Collaborators, Renderer, SurfaceHandle};
