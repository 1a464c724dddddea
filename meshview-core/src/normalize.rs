//! Post-load mesh normalization.
//!
//! A freshly parsed triangle soup is moved so its bounding-box centre sits on
//! the origin, re-oriented from Y-up to Z-up, and given a uniform scale that
//! maps its largest dimension to one unit. The steps run in a fixed order;
//! each one reads the previous step's output.

use log::{debug, info};

use crate::geometry::{Mesh, Triangle};
use crate::transform::Transform;

/// Build the canonical, origin-centred mesh from a parsed triangle list.
pub fn normalize(triangles: Vec<Triangle>) -> Mesh {
    // Bounds and centre of the source data
    let mut mesh = Mesh::from_triangles(triangles);
    debug!(
        "Source bounds min {:?} max {:?}",
        mesh.min_bounds.coords, mesh.max_bounds.coords
    );

    let offset = -mesh.center.coords;
    translate(&mut mesh, offset);
    reorient_z_up(&mut mesh);

    // Centre is the origin by construction; recompute it anyway so drift shows up in the bounds
    mesh.update_bounds();
    mesh.fit_scale();

    info!(
        "Normalized {} triangles: bounds min {:?} max {:?}, scale {}",
        mesh.triangles.len(),
        mesh.min_bounds.coords,
        mesh.max_bounds.coords,
        mesh.scale
    );
    mesh
}

/// Shift every position; normals are direction-only and stay put.
fn translate(mesh: &mut Mesh, offset: nalgebra::Vector3<f32>) {
    for vertex in mesh.triangles.iter_mut().flat_map(|t| t.vertices.iter_mut()) {
        vertex.position += offset;
    }
}

fn reorient_z_up(mesh: &mut Mesh) {
    for vertex in mesh.triangles.iter_mut().flat_map(|t| t.vertices.iter_mut()) {
        vertex.position.coords = Transform::z_up(&vertex.position.coords);
        vertex.normal = Transform::z_up(&vertex.normal);
    }
}
