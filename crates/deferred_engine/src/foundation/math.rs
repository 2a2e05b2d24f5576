//! Math utilities and types
//!
//! Fundamental math types for 3D rendering, backed by nalgebra. The
//! projection conventions target Vulkan's zero-to-one clip depth.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Math utility functions
pub mod utils {
    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * std::f32::consts::PI / 180.0
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Round `value` up to the next multiple of `alignment` (power of two)
    pub fn align_up(value: u64, alignment: u64) -> u64 {
        debug_assert!(alignment.is_power_of_two());
        (value + alignment - 1) & !(alignment - 1)
    }
}

/// Extension trait for Mat4 with the projection/view constructors the
/// renderer needs
pub trait Mat4Ext {
    /// Perspective projection mapping view depth to [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Orthographic projection mapping the box [l,r]x[b,t]x[n,f] to
    /// Vulkan clip space ([-1,1]^2 x [0,1])
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Right-handed look-at view matrix (Y-up view space)
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Intermediate coordinate flip aligning Y-up right-handed view space
    /// with Vulkan's Y-down, Z-forward clip conventions
    fn vulkan_coordinate_transform() -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;
        result
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / (right - left);
        result[(0, 3)] = -(right + left) / (right - left);
        result[(1, 1)] = 2.0 / (top - bottom);
        result[(1, 3)] = -(top + bottom) / (top - bottom);
        result[(2, 2)] = 1.0 / (far - near);
        result[(2, 3)] = -near / (far - near);
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new(
            1.0, 0.0, 0.0, -eye.x,
            0.0, 1.0, 0.0, -eye.y,
            0.0, 0.0, 1.0, -eye.z,
            0.0, 0.0, 0.0, 1.0,
        );

        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0,
            camera_up.x, camera_up.y, camera_up.z, 0.0,
            -forward.x, -forward.y, -forward.z, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }

    fn vulkan_coordinate_transform() -> Mat4 {
        // Flip Y (up becomes down) and Z (forward becomes into screen).
        Mat4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, -1.0, 0.0, 0.0,
            0.0, 0.0, -1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }
}

/// Transform a point by a homogeneous matrix, applying the perspective
/// divide
pub fn project_point(m: &Mat4, p: Vec3) -> Vec3 {
    let h = m * Vec4::new(p.x, p.y, p.z, 1.0);
    Vec3::new(h.x / h.w, h.y / h.w, h.z / h.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_depth_range() {
        let proj = Mat4::perspective(utils::deg_to_rad(60.0), 1.0, 0.1, 100.0);

        // A point on the near plane maps to depth 0, far plane to depth 1.
        // View-space forward is +Z after the coordinate transform, so feed
        // post-transform coordinates directly.
        let near = project_point(&proj, Vec3::new(0.0, 0.0, 0.1));
        let far = project_point(&proj, Vec3::new(0.0, 0.0, 100.0));

        assert_relative_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_orthographic_maps_box_to_clip() {
        let ortho = Mat4::orthographic(-10.0, 10.0, -5.0, 5.0, 1.0, 50.0);

        let min = project_point(&ortho, Vec3::new(-10.0, -5.0, 1.0));
        let max = project_point(&ortho, Vec3::new(10.0, 5.0, 50.0));

        assert_relative_eq!(min.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(min.y, -1.0, epsilon = 1e-5);
        assert_relative_eq!(min.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(max.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(max.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(max.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_centers_target() {
        let view = Mat4::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::zeros(),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let target_in_view = view.transform_point(&Point3::origin());

        // Target sits straight ahead, 5 units along -Z (right-handed view).
        assert_relative_eq!(target_in_view.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.z, -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(utils::align_up(0, 256), 0);
        assert_eq!(utils::align_up(1, 256), 256);
        assert_eq!(utils::align_up(256, 256), 256);
        assert_eq!(utils::align_up(257, 64), 320);
    }
}
