//! Cascaded shadow maps
//!
//! The camera frustum is partitioned into depth slices, and each slice gets
//! its own orthographic light projection fitted around the slice's corners
//! in light space. The fitting math is device-free; `CascadeShadowMaps`
//! owns the per-cascade depth targets and framebuffers.

use crate::config::ShadowConfig;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3, Vec4};
use crate::render::vulkan::{
    Framebuffer, RenderImage, RenderPass, VulkanContext, VulkanResult,
};
use crate::scene::Camera;
use ash::vk;

/// Depth format used by every cascade slice
pub const SHADOW_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Practical split scheme: blend of uniform and logarithmic partitions.
/// Returns the far bound of each cascade; the last bound equals `far`.
pub fn practical_splits(near: f32, far: f32, count: usize, lambda: f32) -> Vec<f32> {
    assert!(count >= 1);
    assert!(near > 0.0 && far > near);
    let lambda = lambda.clamp(0.0, 1.0);

    let mut splits = Vec::with_capacity(count);
    for i in 1..=count {
        let fraction = i as f32 / count as f32;
        let uniform = near + (far - near) * fraction;
        let logarithmic = near * (far / near).powf(fraction);
        splits.push(lambda * logarithmic + (1.0 - lambda) * uniform);
    }
    // Guard against float drift on the last bound.
    splits[count - 1] = far;
    splits
}

/// Frustum partition: the far bound of each cascade in view depth
#[derive(Debug, Clone)]
pub struct CascadePartition {
    splits: Vec<f32>,
}

impl CascadePartition {
    /// Resolve the partition from config: explicit splits when given,
    /// otherwise the practical scheme over the camera's depth range.
    ///
    /// The last slice must reach the camera far plane; geometry past the
    /// last split would sample outside every cascade and resolve
    /// unshadowed. A short explicit last split is clamped up to `far`.
    pub fn from_config(config: &ShadowConfig, near: f32, far: f32) -> Self {
        let splits = match &config.splits {
            Some(explicit) => {
                let mut splits = explicit.clone();
                if let Some(last) = splits.last_mut() {
                    if *last < far {
                        log::warn!(
                            "Last shadow split {last} is short of the far plane, clamping to {far}"
                        );
                        *last = far;
                    }
                }
                splits
            }
            None => practical_splits(near, far, config.cascade_count, config.split_lambda),
        };
        Self { splits }
    }

    /// Far bounds of each cascade
    pub fn splits(&self) -> &[f32] {
        &self.splits
    }

    /// Number of cascades
    pub fn cascade_count(&self) -> usize {
        self.splits.len()
    }

    /// `[near, far]` depth range of cascade `index`
    pub fn slice_range(&self, index: usize, camera_near: f32) -> Option<(f32, f32)> {
        let far = *self.splits.get(index)?;
        let near = if index == 0 {
            camera_near
        } else {
            self.splits[index - 1]
        };
        Some((near, far))
    }
}

/// Fitted light matrices for one frame
#[derive(Debug, Clone)]
pub struct CascadeSet {
    matrices: Vec<Mat4>,
    splits: Vec<f32>,
}

impl CascadeSet {
    /// Fit an orthographic light projection around each frustum slice.
    ///
    /// A degenerate light direction falls back to straight down, so the
    /// shadow pass always has usable matrices.
    pub fn compute(camera: &Camera, light_direction: Vec3, partition: &CascadePartition) -> Self {
        let light_dir = if light_direction.norm() > f32::EPSILON {
            light_direction.normalize()
        } else {
            Vec3::new(0.0, -1.0, 0.0)
        };

        let inv_view = camera
            .view_matrix()
            .try_inverse()
            .unwrap_or_else(Mat4::identity);

        let mut matrices = Vec::with_capacity(partition.cascade_count());
        for index in 0..partition.cascade_count() {
            let (slice_near, slice_far) = partition
                .slice_range(index, camera.near)
                .expect("index within partition");
            let corners = frustum_slice_corners(camera, &inv_view, slice_near, slice_far);
            matrices.push(fit_light_matrix(&corners, light_dir));
        }

        Self {
            matrices,
            splits: partition.splits().to_vec(),
        }
    }

    /// World-to-shadow-clip matrix of cascade `index`
    pub fn matrix(&self, index: usize) -> Option<&Mat4> {
        self.matrices.get(index)
    }

    /// All cascade matrices in order
    pub fn matrices(&self) -> &[Mat4] {
        &self.matrices
    }

    /// Far bounds matching `matrices`
    pub fn splits(&self) -> &[f32] {
        &self.splits
    }

    /// Number of cascades
    pub fn cascade_count(&self) -> usize {
        self.matrices.len()
    }
}

/// World-space corners of the camera sub-frustum between `near` and `far`
fn frustum_slice_corners(camera: &Camera, inv_view: &Mat4, near: f32, far: f32) -> [Vec3; 8] {
    let tan_half_fov = (camera.fov * 0.5).tan();
    let mut corners = [Vec3::zeros(); 8];

    for (slot, &distance) in [near, far].iter().enumerate() {
        let half_height = distance * tan_half_fov;
        let half_width = half_height * camera.aspect;
        // View space is right-handed with the camera looking down -Z.
        for (i, (x, y)) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .iter()
            .enumerate()
        {
            let view_point = Vec4::new(x * half_width, y * half_height, -distance, 1.0);
            let world = inv_view * view_point;
            corners[slot * 4 + i] = Vec3::new(world.x, world.y, world.z);
        }
    }

    corners
}

/// Orthographic world-to-clip matrix tightly bounding `corners` as seen
/// from `light_dir`
fn fit_light_matrix(corners: &[Vec3; 8], light_dir: Vec3) -> Mat4 {
    let center = corners.iter().sum::<Vec3>() / corners.len() as f32;

    // Pick an up vector that is not parallel to the light direction.
    let up = if light_dir.y.abs() > 0.99 {
        Vec3::new(0.0, 0.0, 1.0)
    } else {
        Vec3::new(0.0, 1.0, 0.0)
    };

    let radius = corners
        .iter()
        .map(|c| (c - center).norm())
        .fold(0.0f32, f32::max)
        .max(1.0);
    let eye = center - light_dir * radius * 2.0;
    let light_view = Mat4::vulkan_coordinate_transform() * Mat4::look_at(eye, center, up);

    let mut min = Vec3::new(f32::MAX, f32::MAX, f32::MAX);
    let mut max = Vec3::new(f32::MIN, f32::MIN, f32::MIN);
    for corner in corners {
        let p = light_view * Vec4::new(corner.x, corner.y, corner.z, 1.0);
        min = Vec3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
        max = Vec3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
    }

    // Pull the near plane back by the slice depth so casters between the
    // light and the frustum still land in the map.
    let depth = (max.z - min.z).max(1.0);
    let projection = Mat4::orthographic(min.x, max.x, min.y, max.y, min.z - depth, max.z);

    projection * light_view
}

/// GPU-side shadow atlas: one depth target and framebuffer per cascade
pub struct CascadeShadowMaps {
    maps: Vec<RenderImage>,
    framebuffers: Vec<Framebuffer>,
    resolution: u32,
}

impl CascadeShadowMaps {
    /// Allocate `cascade_count` square depth targets of `resolution`
    pub fn new(
        context: &VulkanContext,
        render_pass: &RenderPass,
        resolution: u32,
        cascade_count: usize,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let memory_props = context.memory_properties();
        let extent = vk::Extent2D {
            width: resolution,
            height: resolution,
        };

        let mut maps = Vec::with_capacity(cascade_count);
        let mut framebuffers = Vec::with_capacity(cascade_count);
        for _ in 0..cascade_count {
            let map = RenderImage::depth_target(
                device.clone(),
                &memory_props,
                extent,
                SHADOW_DEPTH_FORMAT,
            )?;
            framebuffers.push(Framebuffer::new(
                device.clone(),
                render_pass.handle(),
                &[map.view()],
                extent,
            )?);
            maps.push(map);
        }

        log::debug!("Shadow atlas created: {cascade_count} x {resolution}x{resolution}");

        Ok(Self {
            maps,
            framebuffers,
            resolution,
        })
    }

    /// Depth target of cascade `index`
    pub fn shadow_map(&self, index: usize) -> Option<&RenderImage> {
        self.maps.get(index)
    }

    /// Framebuffer of cascade `index`
    pub fn framebuffer(&self, index: usize) -> Option<&Framebuffer> {
        self.framebuffers.get(index)
    }

    /// Square map resolution
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of cascades
    pub fn cascade_count(&self) -> usize {
        self.maps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::project_point;
    use approx::assert_relative_eq;

    fn test_camera() -> Camera {
        let mut camera = Camera::perspective(Vec3::new(0.0, 5.0, 10.0), 60.0, 16.0 / 9.0, 0.5, 1000.0);
        camera.look_at(Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0));
        camera
    }

    #[test]
    fn test_practical_splits_monotonic_and_capped() {
        let splits = practical_splits(0.5, 1000.0, 4, 0.75);
        assert_eq!(splits.len(), 4);
        for pair in splits.windows(2) {
            assert!(pair[0] < pair[1], "splits must strictly increase: {splits:?}");
        }
        assert_relative_eq!(splits[3], 1000.0);
        assert!(splits[0] > 0.5);
    }

    #[test]
    fn test_lambda_zero_gives_uniform_splits() {
        let splits = practical_splits(1.0, 101.0, 4, 0.0);
        assert_relative_eq!(splits[0], 26.0, epsilon = 1e-3);
        assert_relative_eq!(splits[1], 51.0, epsilon = 1e-3);
        assert_relative_eq!(splits[2], 76.0, epsilon = 1e-3);
        assert_relative_eq!(splits[3], 101.0, epsilon = 1e-3);
    }

    #[test]
    fn test_explicit_splits_override_scheme() {
        let config = ShadowConfig {
            splits: Some(vec![20.0, 50.0, 100.0, 1000.0]),
            ..ShadowConfig::default()
        };
        let partition = CascadePartition::from_config(&config, 0.5, 1000.0);
        assert_eq!(partition.splits(), &[20.0, 50.0, 100.0, 1000.0]);
        assert_eq!(partition.slice_range(0, 0.5), Some((0.5, 20.0)));
        assert_eq!(partition.slice_range(2, 0.5), Some((50.0, 100.0)));
        assert_eq!(partition.slice_range(4, 0.5), None);
    }

    #[test]
    fn test_short_explicit_splits_clamped_to_far_plane() {
        let config = ShadowConfig {
            splits: Some(vec![20.0, 50.0, 100.0, 500.0]),
            ..ShadowConfig::default()
        };
        let partition = CascadePartition::from_config(&config, 0.5, 1000.0);

        // The tail of the depth range must stay inside the last cascade.
        assert_eq!(partition.splits(), &[20.0, 50.0, 100.0, 1000.0]);
        assert_eq!(partition.slice_range(3, 0.5), Some((100.0, 1000.0)));

        // Splits already reaching past the far plane are left alone.
        let config = ShadowConfig {
            splits: Some(vec![20.0, 50.0, 100.0, 1200.0]),
            ..ShadowConfig::default()
        };
        let partition = CascadePartition::from_config(&config, 0.5, 1000.0);
        assert_eq!(partition.splits()[3], 1200.0);
    }

    #[test]
    fn test_cascade_covers_its_frustum_slice() {
        let camera = test_camera();
        let config = ShadowConfig::default();
        let partition = CascadePartition::from_config(&config, camera.near, camera.far);
        let cascades = CascadeSet::compute(&camera, Vec3::new(-0.4, -1.0, -0.2), &partition);

        let inv_view = camera.view_matrix().try_inverse().unwrap();
        for index in 0..cascades.cascade_count() {
            let (near, far) = partition.slice_range(index, camera.near).unwrap();
            let corners = frustum_slice_corners(&camera, &inv_view, near, far);
            let matrix = cascades.matrix(index).unwrap();

            for corner in &corners {
                let clip = project_point(matrix, *corner);
                assert!(
                    clip.x >= -1.001 && clip.x <= 1.001,
                    "cascade {index} x out of range: {clip:?}"
                );
                assert!(
                    clip.y >= -1.001 && clip.y <= 1.001,
                    "cascade {index} y out of range: {clip:?}"
                );
                assert!(
                    clip.z >= -0.001 && clip.z <= 1.001,
                    "cascade {index} z out of range: {clip:?}"
                );
            }
        }
    }

    #[test]
    fn test_near_cascades_are_tighter_than_far() {
        let camera = test_camera();
        let config = ShadowConfig::default();
        let partition = CascadePartition::from_config(&config, camera.near, camera.far);
        let cascades = CascadeSet::compute(&camera, Vec3::new(0.3, -1.0, 0.1), &partition);

        // Texel density: a world-space segment should shrink less in the
        // near cascade's clip space than in the far cascade's.
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let near_matrix = cascades.matrix(0).unwrap();
        let far_matrix = cascades.matrix(cascades.cascade_count() - 1).unwrap();

        let near_len = (project_point(near_matrix, b) - project_point(near_matrix, a)).norm();
        let far_len = (project_point(far_matrix, b) - project_point(far_matrix, a)).norm();
        assert!(
            near_len > far_len,
            "near cascade should have higher resolution: {near_len} vs {far_len}"
        );
    }

    #[test]
    fn test_degenerate_light_direction_falls_back() {
        let camera = test_camera();
        let config = ShadowConfig::default();
        let partition = CascadePartition::from_config(&config, camera.near, camera.far);
        let cascades = CascadeSet::compute(&camera, Vec3::zeros(), &partition);

        for index in 0..cascades.cascade_count() {
            let matrix = cascades.matrix(index).unwrap();
            assert!(
                matrix.iter().all(|v| v.is_finite()),
                "cascade {index} matrix must be finite"
            );
        }
    }

    #[test]
    fn test_vertical_light_uses_alternate_up() {
        let camera = test_camera();
        let config = ShadowConfig::default();
        let partition = CascadePartition::from_config(&config, camera.near, camera.far);
        let cascades = CascadeSet::compute(&camera, Vec3::new(0.0, -1.0, 0.0), &partition);

        assert!(cascades
            .matrix(0)
            .unwrap()
            .iter()
            .all(|v| v.is_finite()));
    }

    #[test]
    fn test_matrix_lookup_out_of_range_is_none() {
        let camera = test_camera();
        let config = ShadowConfig::default();
        let partition = CascadePartition::from_config(&config, camera.near, camera.far);
        let cascades = CascadeSet::compute(&camera, Vec3::new(0.0, -1.0, 0.3), &partition);

        assert!(cascades.matrix(cascades.cascade_count()).is_none());
        assert!(cascades.matrix(usize::MAX).is_none());
    }
}
