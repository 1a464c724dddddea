/// meshview core library - mesh loading and camera logic
///
/// This crate has no GPU or windowing dependencies: STL parsing, mesh
/// normalization, the orbit camera and PNG encoding all live here so they
/// can be tested without a graphics device.

pub mod camera;
pub mod color;
pub mod error;
pub mod geometry;
pub mod normalize;
pub mod raster;
pub mod stl;
pub mod transform;

// Re-export commonly used types
pub use camera::{OrbitCamera, Projection, ProjectionMode};
pub use color::Color;
pub use error::MeshError;
pub use geometry::{Mesh, Triangle, Vertex};
pub use normalize::normalize;
pub use raster::{EncodeError, RasterImage, RowOrder};
pub use transform::Transform;

use std::path::Path;

/// Load an STL file and normalize it into a render-ready mesh.
pub fn load_mesh(path: impl AsRef<Path>) -> Result<Mesh, MeshError> {
    let triangles = stl::load_stl(path.as_ref())?;
    Ok(normalize(triangles))
}
