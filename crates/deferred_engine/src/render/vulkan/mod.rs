//! Vulkan backend primitives
//!
//! RAII wrappers over the raw API: context and device selection, memory
//! and buffers, render targets, command recording, synchronization,
//! pipelines, and the swapchain. Everything above this module works in
//! terms of these wrappers and never calls `ash` directly.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod framebuffer;
pub mod image;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use buffer::{
    Buffer, DynamicUniformBuffer, IndexBuffer, StagingBuffer, UniformBuffer, VertexBuffer,
};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{
    LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult,
    WindowSurface,
};
pub use descriptor::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
pub use framebuffer::Framebuffer;
pub use image::{RenderImage, Sampler};
pub use render_pass::RenderPass;
pub use shader::{
    BlendMode, DepthBias, DepthMode, GraphicsPipeline, PipelineSettings, ShaderModule,
};
pub use swapchain::{Swapchain, SwapchainStatus};
pub use sync::{Fence, FrameSync, Semaphore, FENCE_WAIT_TIMEOUT_NS};
