//! # Deferred Engine
//!
//! A deferred-shading rendering engine core on Vulkan.
//!
//! ## Features
//!
//! - **Deferred shading**: geometry attributes rendered to an MRT buffer,
//!   lighting accumulated per light in a separate HDR pass
//! - **Cascaded shadow maps**: the camera frustum is partitioned into depth
//!   slices, each with its own fitted orthographic light projection
//! - **Frame-resource ring**: CPU recording overlaps GPU execution across a
//!   configurable number of in-flight frames
//! - **Asynchronous uploads**: mesh data is staged on a dedicated transfer
//!   queue when the hardware exposes one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deferred_engine::prelude::*;
//! # fn handles() -> (raw_window_handle::RawDisplayHandle, raw_window_handle::RawWindowHandle) { unimplemented!() }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     deferred_engine::foundation::logging::init();
//!
//!     let (display, window) = handles();
//!     let context = VulkanContext::new(display, window, "demo")?;
//!     let config = RendererConfig::default();
//!     let mut renderer = DeferredRenderer::new(
//!         context,
//!         config,
//!         ash::vk::Extent2D { width: 1280, height: 720 },
//!     )?;
//!
//!     let mut scene = RenderScene::new();
//!     scene.lights = LightingEnvironment::new().add_light(Light::directional(
//!         Vec3::new(-0.3, -1.0, -0.2),
//!         Vec3::new(1.0, 0.96, 0.9),
//!         3.0,
//!     ));
//!
//!     loop {
//!         renderer.render_frame(&scene)?;
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Commonly used types, re-exported for application code
pub mod prelude {
    pub use crate::config::{RendererConfig, ShadowConfig};
    pub use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};
    pub use crate::render::{
        DeferredRenderer, GpuMesh, VulkanContext, VulkanError, VulkanResult,
    };
    pub use crate::scene::{
        Camera, Light, LightingEnvironment, Material, MaterialKey, MeshData, MeshKey,
        RenderObject, RenderScene, Vertex,
    };
}
