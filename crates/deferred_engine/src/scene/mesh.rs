//! CPU-side mesh data
//!
//! Vertex layout and mesh containers handed over by the external asset
//! importer. GPU residency is handled by the renderer's upload path.

use crate::foundation::math::Vec3;

/// Vertex format shared by every geometry pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

impl Vertex {
    /// Construct a vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }
}

/// Indexed triangle mesh in CPU memory
#[derive(Debug, Clone)]
pub struct MeshData {
    /// Vertex array
    pub vertices: Vec<Vertex>,
    /// Triangle-list indices
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Generate a unit sphere (radius 1, centered at origin) used as the
    /// point-light volume proxy
    pub fn unit_sphere(rings: u32, segments: u32) -> Self {
        let rings = rings.max(3);
        let segments = segments.max(3);

        let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
        for ring in 0..=rings {
            let theta = std::f32::consts::PI * ring as f32 / rings as f32;
            let (sin_theta, cos_theta) = theta.sin_cos();
            for segment in 0..=segments {
                let phi = std::f32::consts::TAU * segment as f32 / segments as f32;
                let (sin_phi, cos_phi) = phi.sin_cos();

                let normal = Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi);
                vertices.push(Vertex::new(
                    [normal.x, normal.y, normal.z],
                    [normal.x, normal.y, normal.z],
                    [
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ],
                ));
            }
        }

        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Self { vertices, indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_sphere_vertices_on_unit_radius() {
        let sphere = MeshData::unit_sphere(8, 12);
        for vertex in &sphere.vertices {
            let radius = Vec3::from(vertex.position).norm();
            assert!((radius - 1.0).abs() < 1e-5, "vertex off unit sphere: {radius}");
        }
    }

    #[test]
    fn test_unit_sphere_indices_in_bounds() {
        let sphere = MeshData::unit_sphere(6, 8);
        let vertex_count = sphere.vertices.len() as u32;
        assert!(sphere.indices.iter().all(|&i| i < vertex_count));
        assert_eq!(sphere.indices.len() % 3, 0);
    }
}
