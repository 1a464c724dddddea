use std::path::PathBuf;

/// Errors produced while loading a mesh file.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The file could not be opened or read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unrecognised or truncated mesh data
    #[error("invalid STL data: {0}")]
    Format(String),

    /// The file parsed but produced no triangles
    #[error("mesh contains no triangles")]
    Empty,
}
