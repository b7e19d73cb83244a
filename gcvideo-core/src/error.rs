//! Error types for the video core.
//!
//! Every fallible public operation returns [`Result`]. Failures are handled
//! at the boundary where they occur: resource creation failures are logged
//! and the caller continues with a missing resource for that frame, frame
//! dump failures disable dumping for the session.
//!
//! # Error Categories
//! - **Resource creation**: textures, staging textures, framebuffers, shaders, pipelines
//! - **Configuration mismatches**: attachments that cannot be combined
//! - **Shader compilation**: backend rejected generated source
//! - **Frame dump I/O**: screenshot, image sequence and video output

use thiserror::Error;

/// What kind of GPU resource failed to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Texture,
    StagingTexture,
    Framebuffer,
    Shader,
    Pipeline,
    Buffer,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Texture => "texture",
            ResourceKind::StagingTexture => "staging texture",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Shader => "shader",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

/// Video core error type.
#[derive(Error, Debug)]
pub enum VideoError {
    /// The backend could not create a GPU resource.
    ///
    /// `detail` carries the requested shape (dimensions, format, stage).
    #[error("failed to create {kind}: {detail}")]
    ResourceCreation { kind: ResourceKind, detail: String },

    /// Attachments or configurations that must agree do not.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Generated shader source was rejected by the backend compiler.
    #[error("{stage} shader compilation failed for {api}: {log}")]
    ShaderCompilation {
        stage: String,
        api: String,
        log: String,
    },

    /// A texture format is not representable on the active backend.
    #[error("texture format {0} is not supported by this backend")]
    UnsupportedFormat(String),

    /// No usable device/adapter for the requested backend.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Frame dump or screenshot output failed.
    #[error("frame dump error: {0}")]
    FrameDump(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VideoError {
    #[cold]
    pub fn resource(kind: ResourceKind, detail: impl Into<String>) -> Self {
        VideoError::ResourceCreation {
            kind,
            detail: detail.into(),
        }
    }

    #[cold]
    pub fn mismatch(detail: impl Into<String>) -> Self {
        VideoError::ConfigMismatch(detail.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_error_mentions_kind_and_detail() {
        let err = VideoError::resource(ResourceKind::Texture, "640x528 RGBA8");
        assert_eq!(err.to_string(), "failed to create texture: 640x528 RGBA8");
    }
}
