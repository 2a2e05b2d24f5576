//! Cascade shadow rendering
//!
//! Depth-only pass over the caster list, once per cascade. The cascade's
//! world-to-clip matrix is selected in the vertex shader by a push-constant
//! index into the pass constants' cascade array.

use crate::render::frame::FrameResource;
use crate::render::pass_state::{PassConfig, PassPipeline};
use crate::render::passes::{full_scissor, full_viewport, DrawCommand};
use crate::render::shadow::{CascadeShadowMaps, SHADOW_DEPTH_FORMAT};
use crate::render::vulkan::{
    CommandRecorder, RenderPass, ShaderModule, VulkanContext, VulkanResult,
};
use ash::vk;

/// Push block selecting the active cascade
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CascadeIndexPush {
    cascade_index: u32,
}

/// Depth-only shadow pass
pub struct ShadowPass {
    render_pass: RenderPass,
    pipeline: PassPipeline,
}

impl ShadowPass {
    /// Build the shadow render pass and its depth-only pipeline
    pub fn new(
        context: &VulkanContext,
        vertex_shader: &ShaderModule,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let render_pass = RenderPass::new_shadow_pass(device.clone(), SHADOW_DEPTH_FORMAT)?;

        let push_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: std::mem::size_of::<CascadeIndexPush>() as u32,
        }];

        let pipeline = PassPipeline::new(
            device,
            render_pass.handle(),
            vertex_shader,
            None,
            set_layouts,
            &push_ranges,
            PassConfig::shadow(),
        )?;

        Ok(Self {
            render_pass,
            pipeline,
        })
    }

    /// The render pass cascade framebuffers must be created against
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Record depth renders of `draws` into every cascade slice
    pub fn record(
        &self,
        recorder: &mut CommandRecorder,
        shadow_maps: &CascadeShadowMaps,
        frame: &FrameResource,
        draws: &[DrawCommand],
    ) -> VulkanResult<()> {
        let clear_values = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        }];

        for cascade in 0..shadow_maps.cascade_count() {
            let framebuffer = shadow_maps
                .framebuffer(cascade)
                .expect("cascade index within atlas");

            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer.handle(),
                framebuffer.render_area(),
                &clear_values,
            )?;

            pass.set_viewport(&full_viewport(framebuffer.extent()));
            pass.set_scissor(&full_scissor(framebuffer.extent()));
            pass.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

            let push = CascadeIndexPush {
                cascade_index: cascade as u32,
            };
            pass.cmd_push_constants(
                self.pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push),
            );

            for draw in draws {
                let dynamic_offsets = [
                    frame.object_constants.offset_of(draw.object_index),
                    frame.material_constants.offset_of(draw.object_index),
                ];
                pass.cmd_bind_descriptor_sets(
                    self.pipeline.layout(),
                    0,
                    &[frame.descriptor_set],
                    &dynamic_offsets,
                );
                pass.cmd_bind_vertex_buffers(0, &[draw.vertex_buffer], &[0]);
                pass.cmd_bind_index_buffer(draw.index_buffer, 0, vk::IndexType::UINT32);
                pass.cmd_draw_indexed(draw.index_count, 1, 0, 0, 0);
            }
        }

        Ok(())
    }
}
