//! Deferred rendering pipeline
//!
//! The renderer proper: Vulkan backend wrappers, the frame-resource ring,
//! the geometry buffer and shadow atlas, the four pipeline passes, and the
//! `DeferredRenderer` that orchestrates a frame.

pub mod frame;
pub mod gbuffer;
pub mod pass_state;
pub mod passes;
pub mod renderer;
pub mod shadow;
pub mod types;
pub mod upload;
pub mod vulkan;

/// Upper bound on shadow cascades; sizes the constant-block arrays and the
/// lighting input bindings
pub const MAX_CASCADES: usize = 4;

pub use frame::{FrameResource, FrameResourceRing, FrameRingState, RingError};
pub use gbuffer::{GBuffer, GBufferSlot};
pub use pass_state::{PassConfig, PassPipeline, TrackedConstants, VertexInputKind};
pub use passes::{
    plan_lighting, CompositePass, DrawCommand, GeometryPass, LightingPass, LightingPlan,
    ShadowPass, LIGHTING_FORMAT,
};
pub use renderer::{DeferredRenderer, RebuildFlags};
pub use shadow::{
    practical_splits, CascadePartition, CascadeSet, CascadeShadowMaps, SHADOW_DEPTH_FORMAT,
};
pub use types::{MaterialConstants, ObjectConstants, PassConstants, PointLightPush};
pub use upload::{GpuMesh, PendingUploads, UploadManager};
pub use vulkan::{VulkanContext, VulkanError, VulkanResult};
