//! Scene-side data consumed by the renderer
//!
//! The entity/component system proper is an external collaborator; this
//! module holds the flat, typed registries the renderer reads each frame.
//! GPU meshes and materials live in slotmap arenas with generation-checked
//! keys, so stale handles resolve to `None` instead of dangling.

pub mod camera;
pub mod lighting;
pub mod mesh;

pub use camera::Camera;
pub use lighting::{Light, LightType, LightingEnvironment};
pub use mesh::{MeshData, Vertex};

use crate::foundation::math::{Mat4, Vec3};
use crate::render::GpuMesh;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generation-checked handle to a GPU-resident mesh
    pub struct MeshKey;
}

new_key_type! {
    /// Generation-checked handle to a material
    pub struct MaterialKey;
}

/// Surface material parameters read by the geometry pass
#[derive(Debug, Clone)]
pub struct Material {
    /// Diffuse albedo color
    pub diffuse: Vec3,
    /// Opacity (1.0 = fully opaque)
    pub opacity: f32,
    /// Roughness in [0, 1]
    pub roughness: f32,
    /// Fresnel reflectance at normal incidence
    pub reflectance: Vec3,
    /// Emissive color
    pub emissive: Vec3,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: Vec3::new(0.8, 0.8, 0.8),
            opacity: 1.0,
            roughness: 0.7,
            reflectance: Vec3::new(0.04, 0.04, 0.04),
            emissive: Vec3::zeros(),
        }
    }
}

/// One drawable instance: mesh + material + world transform
#[derive(Debug, Clone, Copy)]
pub struct RenderObject {
    /// Mesh handle
    pub mesh: MeshKey,
    /// Material handle
    pub material: MaterialKey,
    /// Object-to-world matrix
    pub world: Mat4,
}

/// Everything the renderer pulls from the scene once per frame
pub struct RenderScene {
    meshes: SlotMap<MeshKey, GpuMesh>,
    materials: SlotMap<MaterialKey, Material>,
    /// Drawable instances, rebuilt or mutated by the external update loop
    pub objects: Vec<RenderObject>,
    /// Scene lights
    pub lights: LightingEnvironment,
    /// Active camera
    pub camera: Camera,
}

impl RenderScene {
    /// Create an empty scene with a default camera
    pub fn new() -> Self {
        Self {
            meshes: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            objects: Vec::new(),
            lights: LightingEnvironment::new(),
            camera: Camera::default(),
        }
    }

    /// Register a GPU mesh, returning its handle
    pub fn insert_mesh(&mut self, mesh: GpuMesh) -> MeshKey {
        self.meshes.insert(mesh)
    }

    /// Register a material, returning its handle
    pub fn insert_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    /// Remove a mesh; objects still referencing the key resolve to `None`
    pub fn remove_mesh(&mut self, key: MeshKey) -> Option<GpuMesh> {
        self.meshes.remove(key)
    }

    /// Remove a material
    pub fn remove_material(&mut self, key: MaterialKey) -> Option<Material> {
        self.materials.remove(key)
    }

    /// Look up a mesh by handle
    pub fn mesh(&self, key: MeshKey) -> Option<&GpuMesh> {
        self.meshes.get(key)
    }

    /// Look up a material by handle
    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    /// Number of registered meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

impl Default for RenderScene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_material_key_resolves_to_none() {
        let mut scene = RenderScene::new();
        let key = scene.insert_material(Material::default());
        assert!(scene.material(key).is_some());

        scene.remove_material(key);
        assert!(scene.material(key).is_none());
    }

    #[test]
    fn test_material_keys_are_generation_checked() {
        let mut scene = RenderScene::new();
        let first = scene.insert_material(Material::default());
        scene.remove_material(first);

        // Reusing the slot must not resurrect the old key.
        let second = scene.insert_material(Material::default());
        assert!(scene.material(first).is_none());
        assert!(scene.material(second).is_some());
    }
}
