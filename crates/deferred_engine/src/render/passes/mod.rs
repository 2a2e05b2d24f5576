//! Deferred pipeline passes
//!
//! Each pass owns its render pass object and pipelines, and records into a
//! caller-provided command recorder. Draw lists are resolved by the
//! renderer before recording, so passes never touch the scene registries.

pub mod composite_pass;
pub mod geometry_pass;
pub mod lighting_pass;
pub mod shadow_pass;

pub use composite_pass::CompositePass;
pub use geometry_pass::GeometryPass;
pub use lighting_pass::{
    plan_lighting, point_light_world_matrix, DirectionalDraw, LightingPass, LightingPlan,
    PointDraw, LIGHTING_FORMAT,
};
pub use shadow_pass::ShadowPass;

use ash::vk;

/// One resolved draw: mesh handles plus the object's slot in the per-frame
/// constant buffers
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand {
    /// Vertex buffer handle
    pub vertex_buffer: vk::Buffer,
    /// Index buffer handle
    pub index_buffer: vk::Buffer,
    /// Number of indices
    pub index_count: u32,
    /// Index into the dynamic object/material constant buffers
    pub object_index: usize,
}

/// Viewport covering `extent` with the standard zero-to-one depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
