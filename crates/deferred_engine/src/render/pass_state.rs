//! Pass state and pipeline families
//!
//! One parameterized pipeline wrapper covers every pass in the deferred
//! pipeline; the differences between passes (blend, depth, culling, bias,
//! attachment count) live in data, not in per-pass types. Constant blocks
//! are wrapped in `TrackedConstants`, which tracks staleness per frame
//! slot so a value is re-uploaded exactly once per slot after it changes.

use crate::render::vulkan::{
    BlendMode, DepthBias, DepthMode, GraphicsPipeline, PipelineSettings, ShaderModule,
    VulkanResult,
};
use crate::scene::Vertex;
use ash::{vk, Device};
use std::mem;

/// CPU-side constant block with per-frame-slot staleness tracking
#[derive(Debug)]
pub struct TrackedConstants<T> {
    value: T,
    stale: Vec<bool>,
}

impl<T> TrackedConstants<T> {
    /// Wrap `value`, marking it stale for all `slots`
    pub fn new(value: T, slots: usize) -> Self {
        Self {
            value,
            stale: vec![true; slots],
        }
    }

    /// Read the current value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Mutate the value and mark every slot stale
    pub fn modify(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.stale.fill(true);
    }

    /// Replace the value and mark every slot stale
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.stale.fill(true);
    }

    /// Take the value for upload into `slot` if that slot's copy is stale.
    /// Returns `None` when the slot is already current, so flushing twice
    /// without an intervening change uploads nothing.
    pub fn flush(&mut self, slot: usize) -> Option<&T> {
        if self.stale.get(slot).copied().unwrap_or(false) {
            self.stale[slot] = false;
            Some(&self.value)
        } else {
            None
        }
    }

    /// True if `slot` still needs an upload
    pub fn is_stale(&self, slot: usize) -> bool {
        self.stale.get(slot).copied().unwrap_or(false)
    }
}

/// Vertex input consumed by a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInputKind {
    /// Standard mesh vertices (position, normal, uv)
    Mesh,
    /// No vertex buffer; the vertex shader synthesizes a fullscreen triangle
    None,
}

/// Fixed-function description of one pipeline family
#[derive(Debug, Clone, Copy)]
pub struct PassConfig {
    /// Human-readable pass name for logs
    pub name: &'static str,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub cull: vk::CullModeFlags,
    pub depth_bias: Option<DepthBias>,
    pub color_attachment_count: u32,
    pub vertex_input: VertexInputKind,
    /// Depth-only passes run without a fragment stage
    pub has_fragment_stage: bool,
}

impl PassConfig {
    /// Geometry pass: opaque MRT writes with standard depth testing
    pub fn geometry() -> Self {
        Self {
            name: "geometry",
            blend: BlendMode::Opaque,
            depth: DepthMode::ReadWrite,
            cull: vk::CullModeFlags::BACK,
            depth_bias: None,
            color_attachment_count: 4,
            vertex_input: VertexInputKind::Mesh,
            has_fragment_stage: true,
        }
    }

    /// Shadow pass: depth-only with slope-scaled bias against acne
    pub fn shadow() -> Self {
        Self {
            name: "shadow",
            blend: BlendMode::Opaque,
            depth: DepthMode::ReadWrite,
            cull: vk::CullModeFlags::BACK,
            depth_bias: Some(DepthBias {
                constant_factor: 1.25,
                slope_factor: 1.75,
            }),
            color_attachment_count: 0,
            vertex_input: VertexInputKind::Mesh,
            has_fragment_stage: false,
        }
    }

    /// Directional lighting: fullscreen triangle accumulating into the
    /// lighting target
    pub fn lighting_directional() -> Self {
        Self {
            name: "lighting_directional",
            blend: BlendMode::Additive,
            depth: DepthMode::Disabled,
            cull: vk::CullModeFlags::NONE,
            depth_bias: None,
            color_attachment_count: 1,
            vertex_input: VertexInputKind::None,
            has_fragment_stage: true,
        }
    }

    /// Point lighting: sphere proxy volumes, front-face culled so the
    /// volume still shades when the camera is inside it
    pub fn lighting_point() -> Self {
        Self {
            name: "lighting_point",
            blend: BlendMode::Additive,
            depth: DepthMode::Disabled,
            cull: vk::CullModeFlags::FRONT,
            depth_bias: None,
            color_attachment_count: 1,
            vertex_input: VertexInputKind::Mesh,
            has_fragment_stage: true,
        }
    }
}

/// Vertex binding/attribute descriptions for the standard mesh layout
pub fn mesh_vertex_layout() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![vk::VertexInputBindingDescription {
        binding: 0,
        stride: mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    let attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 12,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 24,
        },
    ];
    (bindings, attributes)
}

/// A pipeline built from a `PassConfig`
pub struct PassPipeline {
    config: PassConfig,
    pipeline: GraphicsPipeline,
}

impl PassPipeline {
    /// Build the pipeline for `config` against `render_pass`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        vertex_shader: &ShaderModule,
        fragment_shader: Option<&ShaderModule>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        config: PassConfig,
    ) -> VulkanResult<Self> {
        let (bindings, attributes) = match config.vertex_input {
            VertexInputKind::Mesh => mesh_vertex_layout(),
            VertexInputKind::None => (Vec::new(), Vec::new()),
        };

        let settings = PipelineSettings {
            render_pass,
            vertex_shader,
            fragment_shader: if config.has_fragment_stage {
                fragment_shader
            } else {
                None
            },
            vertex_bindings: &bindings,
            vertex_attributes: &attributes,
            set_layouts,
            push_constant_ranges,
            color_attachment_count: config.color_attachment_count,
            blend: config.blend,
            depth: config.depth,
            cull_mode: config.cull,
            depth_bias: config.depth_bias,
        };

        let pipeline = GraphicsPipeline::new(device, &settings)?;
        log::debug!("Pipeline created: {}", config.name);

        Ok(Self { config, pipeline })
    }

    /// The configuration this pipeline was built from
    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// Pipeline layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_uploads_once_per_slot() {
        let mut tracked = TrackedConstants::new(7u32, 3);
        assert_eq!(tracked.flush(0), Some(&7));
        assert_eq!(tracked.flush(0), None);
        // Other slots are still stale.
        assert_eq!(tracked.flush(1), Some(&7));
        assert_eq!(tracked.flush(2), Some(&7));
        assert_eq!(tracked.flush(2), None);
    }

    #[test]
    fn test_modify_restales_all_slots() {
        let mut tracked = TrackedConstants::new(1u32, 2);
        tracked.flush(0);
        tracked.flush(1);

        tracked.modify(|v| *v = 2);
        assert!(tracked.is_stale(0));
        assert!(tracked.is_stale(1));
        assert_eq!(tracked.flush(0), Some(&2));
    }

    #[test]
    fn test_out_of_range_slot_never_flushes() {
        let mut tracked = TrackedConstants::new(0u32, 1);
        assert_eq!(tracked.flush(5), None);
        assert!(!tracked.is_stale(5));
    }

    #[test]
    fn test_pass_configs_differ_where_it_matters() {
        let shadow = PassConfig::shadow();
        assert!(shadow.depth_bias.is_some());
        assert!(!shadow.has_fragment_stage);
        assert_eq!(shadow.color_attachment_count, 0);

        let geometry = PassConfig::geometry();
        assert_eq!(geometry.color_attachment_count, 4);
        assert_eq!(geometry.blend, BlendMode::Opaque);

        let point = PassConfig::lighting_point();
        assert_eq!(point.blend, BlendMode::Additive);
        assert_eq!(point.cull, vk::CullModeFlags::FRONT);

        let directional = PassConfig::lighting_directional();
        assert_eq!(directional.vertex_input, VertexInputKind::None);
    }

    #[test]
    fn test_mesh_vertex_layout_matches_vertex_struct() {
        let (bindings, attributes) = mesh_vertex_layout();
        assert_eq!(bindings[0].stride as usize, mem::size_of::<Vertex>());
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
    }
}
