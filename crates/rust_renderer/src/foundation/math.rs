//! Math utilities and types
//!
//! Provides the fundamental math types used by the camera, culling and
//! picking code. Everything is `f32` and right-handed with the camera
//! looking down -Z in view space.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Degrees to radians conversion factor
const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;

/// Math utility functions
pub mod utils {
    use super::{Mat4, Point3, Vec3, DEG_TO_RAD};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * DEG_TO_RAD
    }

    /// Transform a point by a homogeneous matrix
    pub fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
        matrix.transform_point(&Point3::from(*point)).coords
    }

    /// Transform a direction by a homogeneous matrix (ignores translation)
    pub fn transform_vector(matrix: &Mat4, vector: &Vec3) -> Vec3 {
        matrix.transform_vector(vector)
    }

    /// Hash-friendly bit pattern of a float slice
    ///
    /// Used when immutable draw descriptions derive cache keys from their
    /// geometry.
    pub fn float_bits(values: &[f32]) -> impl Iterator<Item = u32> + '_ {
        values.iter().map(|v| v.to_bits())
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// OpenGL-style perspective projection (camera looks down -Z, NDC depth -1..1)
    fn perspective_gl(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Inverse that falls back to identity for singular matrices
    fn inverse_or_identity(&self) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective_gl(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let f = 1.0 / (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = f / aspect;
        result[(1, 1)] = f;
        result[(2, 2)] = (far + near) / (near - far);
        result[(2, 3)] = (2.0 * far * near) / (near - far);
        result[(3, 2)] = -1.0;
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or_else(|| {
            log::warn!("Singular matrix inverted, using identity");
            Mat4::identity()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_point_applies_scale_then_translation() {
        let matrix = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)) * Mat4::new_scaling(2.0);
        let p = utils::transform_point(&matrix, &Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Vec3::new(3.0, 2.0, 3.0), epsilon = 1e-6);
        let v = utils::transform_vector(&matrix, &Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v, Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_ndc_range() {
        let proj = Mat4::perspective_gl(utils::deg_to_rad(60.0), 1.0, 1.0, 100.0);
        let near = proj * Vec4::new(0.0, 0.0, -1.0, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(near.z / near.w, -1.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-4);
    }
}
