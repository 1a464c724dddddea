use std::path::PathBuf;

use meshview_core::{EncodeError, MeshError};

use crate::shader::ShaderError;

/// Errors raised by the render coordinator and its GPU resources.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No adapter, device or surface could be obtained
    #[error("graphics initialization failed: {0}")]
    GraphicsInit(String),

    /// The offscreen colour/depth targets could not be created at the requested size
    #[error("offscreen framebuffer incomplete: {0}")]
    Framebuffer(String),

    /// The mesh does not fit in one vertex buffer on this device
    #[error("mesh with {vertices} vertices exceeds the {max_bytes}-byte vertex buffer limit")]
    MeshTooLarge { vertices: usize, max_bytes: u64 },

    /// The window surface could not provide a frame
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Shader(#[from] ShaderError),
}
