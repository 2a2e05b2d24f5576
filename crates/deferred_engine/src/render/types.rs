//! GPU-visible constant layouts
//!
//! Plain-old-data structs mirrored by the shader uniform blocks. All
//! fields are 16-byte aligned per std140, matrices are column-major
//! `[[f32; 4]; 4]`, and every struct derives `Pod` so it can be memcpy'd
//! into mapped uniform memory.

use crate::foundation::math::{Mat4, Vec3};
use crate::render::MAX_CASCADES;
use crate::scene::{Light, Material};
use bytemuck::{Pod, Zeroable};

fn mat4_to_array(m: &Mat4) -> [[f32; 4]; 4] {
    (*m).into()
}

/// Per-pass constants: camera matrices, cascade data, and the dominant
/// directional light. Bound once per frame at set 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PassConstants {
    /// World-to-view matrix
    pub view: [[f32; 4]; 4],
    /// View-to-clip matrix (includes the Vulkan coordinate flip)
    pub projection: [[f32; 4]; 4],
    /// Combined world-to-clip matrix
    pub view_projection: [[f32; 4]; 4],
    /// World-to-shadow-clip matrix per cascade
    pub cascade_view_projections: [[[f32; 4]; 4]; MAX_CASCADES],
    /// Far bound of each cascade in camera-view depth
    pub cascade_splits: [f32; MAX_CASCADES],
    /// Camera position in world space (w unused)
    pub camera_position: [f32; 4],
    /// Camera near/far planes, viewport size in pixels
    pub depth_viewport: [f32; 4],
    /// Dominant directional light direction (w unused)
    pub sun_direction: [f32; 4],
    /// Dominant directional light color, intensity in w
    pub sun_color: [f32; 4],
    /// Ambient color, intensity in w
    pub ambient: [f32; 4],
    /// x = active cascade count, y/z/w reserved
    pub counts: [u32; 4],
}

impl PassConstants {
    /// Fill the camera block; cascade and light fields are set separately
    pub fn set_camera(&mut self, view: &Mat4, projection: &Mat4, position: Vec3) {
        self.view = mat4_to_array(view);
        self.projection = mat4_to_array(projection);
        self.view_projection = mat4_to_array(&(projection * view));
        self.camera_position = [position.x, position.y, position.z, 1.0];
    }

    /// Fill the depth range and viewport size
    pub fn set_depth_viewport(&mut self, near: f32, far: f32, width: f32, height: f32) {
        self.depth_viewport = [near, far, width, height];
    }

    /// Fill the directional light and ambient fields
    pub fn set_sun(&mut self, sun: Option<&Light>, ambient_color: Vec3, ambient_intensity: f32) {
        match sun {
            Some(light) => {
                self.sun_direction =
                    [light.direction.x, light.direction.y, light.direction.z, 0.0];
                self.sun_color = [light.color.x, light.color.y, light.color.z, light.intensity];
            }
            None => {
                self.sun_direction = [0.0, -1.0, 0.0, 0.0];
                self.sun_color = [0.0; 4];
            }
        }
        self.ambient = [
            ambient_color.x,
            ambient_color.y,
            ambient_color.z,
            ambient_intensity,
        ];
    }

    /// Fill the cascade matrices and split depths
    pub fn set_cascades(&mut self, matrices: &[Mat4], splits: &[f32]) {
        let count = matrices.len().min(MAX_CASCADES);
        for (i, matrix) in matrices.iter().take(count).enumerate() {
            self.cascade_view_projections[i] = mat4_to_array(matrix);
        }
        for (i, &split) in splits.iter().take(count).enumerate() {
            self.cascade_splits[i] = split;
        }
        self.counts[0] = count as u32;
    }
}

impl Default for PassConstants {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

/// Per-object constants, bound with a dynamic offset per draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Object-to-world matrix
    pub world: [[f32; 4]; 4],
    /// Inverse-transpose of `world` for normal transformation
    pub normal_matrix: [[f32; 4]; 4],
}

impl ObjectConstants {
    /// Build from a world matrix, falling back to `world` itself when the
    /// matrix is singular
    pub fn from_world(world: &Mat4) -> Self {
        let normal_matrix = world
            .try_inverse()
            .map(|inv| inv.transpose())
            .unwrap_or(*world);
        Self {
            world: mat4_to_array(world),
            normal_matrix: mat4_to_array(&normal_matrix),
        }
    }
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

/// Per-material constants written into the geometry buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialConstants {
    /// Diffuse rgb, opacity in w
    pub diffuse_opacity: [f32; 4],
    /// Fresnel reflectance rgb, roughness in w
    pub reflectance_roughness: [f32; 4],
    /// Emissive rgb (w unused)
    pub emissive: [f32; 4],
}

impl From<&Material> for MaterialConstants {
    fn from(material: &Material) -> Self {
        Self {
            diffuse_opacity: [
                material.diffuse.x,
                material.diffuse.y,
                material.diffuse.z,
                material.opacity,
            ],
            reflectance_roughness: [
                material.reflectance.x,
                material.reflectance.y,
                material.reflectance.z,
                material.roughness,
            ],
            emissive: [material.emissive.x, material.emissive.y, material.emissive.z, 0.0],
        }
    }
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self::from(&Material::default())
    }
}

/// Push-constant block for one point-light volume draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PointLightPush {
    /// Proxy-sphere object-to-world matrix (scaled to the light radius)
    pub world: [[f32; 4]; 4],
    /// Light position, radius in w
    pub position_radius: [f32; 4],
    /// Light color, intensity in w
    pub color_intensity: [f32; 4],
}

impl PointLightPush {
    /// Build the push block for a point light
    pub fn new(world: &Mat4, light: &Light) -> Self {
        Self {
            world: mat4_to_array(world),
            position_radius: [
                light.position.x,
                light.position.y,
                light.position.z,
                light.radius,
            ],
            color_intensity: [light.color.x, light.color.y, light.color.z, light.intensity],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_constant_blocks_are_std140_sized() {
        assert_eq!(mem::size_of::<PassConstants>() % 16, 0);
        assert_eq!(mem::size_of::<ObjectConstants>() % 16, 0);
        assert_eq!(mem::size_of::<MaterialConstants>() % 16, 0);
        assert_eq!(mem::size_of::<PointLightPush>() % 16, 0);
    }

    #[test]
    fn test_point_light_push_fits_push_constant_limit() {
        // 128 bytes is the guaranteed minimum maxPushConstantsSize.
        assert!(mem::size_of::<PointLightPush>() <= 128);
    }

    #[test]
    fn test_object_constants_identity_normal_matrix() {
        let constants = ObjectConstants::from_world(&Mat4::identity());
        assert_eq!(constants.world, constants.normal_matrix);
    }

    #[test]
    fn test_pass_constants_cascade_count_clamped() {
        let mut constants = PassConstants::default();
        let matrices = vec![Mat4::identity(); MAX_CASCADES + 2];
        let splits = vec![1.0; MAX_CASCADES + 2];
        constants.set_cascades(&matrices, &splits);
        assert_eq!(constants.counts[0], MAX_CASCADES as u32);
    }
}
