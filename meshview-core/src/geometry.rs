/// Geometry primitives for triangle-soup meshes
use nalgebra::{Point3, Vector3};

/// A mesh vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(x: f32, y: f32, z: f32, nx: f32, ny: f32, nz: f32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            normal: Vector3::new(nx, ny, nz),
        }
    }

    pub fn with_normal(position: Point3<f32>, normal: Vector3<f32>) -> Self {
        Self { position, normal }
    }
}

/// A triangle face defined by three vertices
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }
}

/// An unindexed triangle mesh with its axis-aligned bounds.
///
/// `center` and `scale` are derived from the bounds by [`Mesh::update_bounds`]
/// and [`Mesh::fit_scale`]; the normalizer calls both after it has finished
/// moving vertices, so a normalized mesh always carries fresh values.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
    pub min_bounds: Point3<f32>,
    pub max_bounds: Point3<f32>,
    pub center: Point3<f32>,
    pub scale: f32,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
            min_bounds: Point3::origin(),
            max_bounds: Point3::origin(),
            center: Point3::origin(),
            scale: 1.0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Wrap a parsed triangle list and compute its initial bounds.
    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        let mut mesh = Self {
            triangles,
            ..Self::new()
        };
        mesh.update_bounds();
        mesh
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.triangles.len() * 3
    }

    /// Iterate over every vertex in draw order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.triangles.iter().flat_map(|t| t.vertices.iter())
    }

    /// Recompute `min_bounds`, `max_bounds` and `center` from the vertex positions.
    ///
    /// An empty mesh keeps degenerate bounds at the origin.
    pub fn update_bounds(&mut self) {
        let bounds = self.vertices().map(|v| v.position).fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((min, max)) => Some((min.inf(&p), max.sup(&p))),
        });
        let (min, max) = bounds.unwrap_or((Point3::origin(), Point3::origin()));

        self.min_bounds = min;
        self.max_bounds = max;
        self.center = nalgebra::center(&min, &max);
    }

    /// Size of the bounding box along each axis.
    pub fn dimensions(&self) -> Vector3<f32> {
        self.max_bounds - self.min_bounds
    }

    pub fn max_dimension(&self) -> f32 {
        self.dimensions().max()
    }

    /// Set `scale` so the largest dimension maps to one unit.
    ///
    /// A degenerate mesh (every vertex identical) keeps a scale of 1.
    pub fn fit_scale(&mut self) {
        let max_dimension = self.max_dimension();
        self.scale = if max_dimension > 0.0 {
            1.0 / max_dimension
        } else {
            1.0
        };
    }

    /// Create an axis-aligned cube mesh (12 triangles, 36 vertices)
    pub fn cube(size: f32) -> Self {
        let half = size / 2.0;
        let mut mesh = Self::with_capacity(12);

        // Front face
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, half, 0.0, 0.0, 1.0),
            Vertex::new(half, -half, half, 0.0, 0.0, 1.0),
            Vertex::new(half, half, half, 0.0, 0.0, 1.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, half, 0.0, 0.0, 1.0),
            Vertex::new(half, half, half, 0.0, 0.0, 1.0),
            Vertex::new(-half, half, half, 0.0, 0.0, 1.0),
        ));

        // Back face
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, 0.0, -1.0),
            Vertex::new(-half, half, -half, 0.0, 0.0, -1.0),
            Vertex::new(half, half, -half, 0.0, 0.0, -1.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, 0.0, -1.0),
            Vertex::new(half, half, -half, 0.0, 0.0, -1.0),
            Vertex::new(half, -half, -half, 0.0, 0.0, -1.0),
        ));

        // Top face
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, half, -half, 0.0, 1.0, 0.0),
            Vertex::new(-half, half, half, 0.0, 1.0, 0.0),
            Vertex::new(half, half, half, 0.0, 1.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, half, -half, 0.0, 1.0, 0.0),
            Vertex::new(half, half, half, 0.0, 1.0, 0.0),
            Vertex::new(half, half, -half, 0.0, 1.0, 0.0),
        ));

        // Bottom face
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, -1.0, 0.0),
            Vertex::new(half, -half, -half, 0.0, -1.0, 0.0),
            Vertex::new(half, -half, half, 0.0, -1.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, 0.0, -1.0, 0.0),
            Vertex::new(half, -half, half, 0.0, -1.0, 0.0),
            Vertex::new(-half, -half, half, 0.0, -1.0, 0.0),
        ));

        // Right face
        mesh.add_triangle(Triangle::new(
            Vertex::new(half, -half, -half, 1.0, 0.0, 0.0),
            Vertex::new(half, half, -half, 1.0, 0.0, 0.0),
            Vertex::new(half, half, half, 1.0, 0.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(half, -half, -half, 1.0, 0.0, 0.0),
            Vertex::new(half, half, half, 1.0, 0.0, 0.0),
            Vertex::new(half, -half, half, 1.0, 0.0, 0.0),
        ));

        // Left face
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, -1.0, 0.0, 0.0),
            Vertex::new(-half, -half, half, -1.0, 0.0, 0.0),
            Vertex::new(-half, half, half, -1.0, 0.0, 0.0),
        ));
        mesh.add_triangle(Triangle::new(
            Vertex::new(-half, -half, -half, -1.0, 0.0, 0.0),
            Vertex::new(-half, half, half, -1.0, 0.0, 0.0),
            Vertex::new(-half, half, -half, -1.0, 0.0, 0.0),
        ));

        mesh.update_bounds();
        mesh.fit_scale();
        mesh
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}
