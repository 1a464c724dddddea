/// 3D transformation matrices and the viewer's axis convention
use nalgebra::{Matrix4, Vector3};

/// Transform builder for 3D transformations
pub struct Transform;

impl Transform {
    /// Reassign axes from a Y-up source to the viewer's Z-up convention.
    ///
    /// `y' = z`, `z' = -y`; x is unchanged. This is a -90 degree rotation
    /// about X, so handedness is preserved and it applies to normals as-is.
    pub fn z_up(v: &Vector3<f32>) -> Vector3<f32> {
        Vector3::new(v.x, v.z, -v.y)
    }

    /// Create a scale matrix
    pub fn scale_matrix(sx: f32, sy: f32, sz: f32) -> Matrix4<f32> {
        Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_z_up_swaps_axes() {
        let v = Transform::z_up(&Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(v, Vector3::new(1.0, 3.0, -2.0));
    }

    #[test]
    fn test_z_up_is_rotation() {
        // Length and handedness survive the swap
        let x = Transform::z_up(&Vector3::x());
        let y = Transform::z_up(&Vector3::y());
        let z = Transform::z_up(&Vector3::z());
        assert_relative_eq!(x.cross(&y), z, epsilon = 1e-6);
        let v = Vector3::new(0.25, -4.0, 7.5);
        assert_relative_eq!(Transform::z_up(&v).norm(), v.norm(), epsilon = 1e-5);
    }

    #[test]
    fn test_scale_matrix() {
        let model = Transform::scale_matrix(0.5, 2.0, 1.0);
        let p = model.transform_point(&Point3::new(6.0, 4.0, 5.0));
        assert_relative_eq!(p, Point3::new(3.0, 8.0, 5.0), epsilon = 1e-6);
    }
}
