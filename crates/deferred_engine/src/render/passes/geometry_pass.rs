//! Geometry pass
//!
//! Rasterizes every opaque drawable into the geometry buffer's four color
//! targets plus depth. Per-object and per-material constants are bound
//! through dynamic offsets into the frame slot's constant buffers.

use crate::render::frame::FrameResource;
use crate::render::gbuffer::{GBuffer, GBufferSlot};
use crate::render::pass_state::{PassConfig, PassPipeline};
use crate::render::passes::{full_scissor, full_viewport, DrawCommand};
use crate::render::vulkan::{
    CommandRecorder, RenderPass, ShaderModule, VulkanContext, VulkanResult,
};
use ash::vk;

/// MRT geometry pass
pub struct GeometryPass {
    render_pass: RenderPass,
    pipeline: PassPipeline,
}

impl GeometryPass {
    /// Build the geometry render pass and its pipeline
    pub fn new(
        context: &VulkanContext,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let render_pass = RenderPass::new_geometry_pass(
            device.clone(),
            &GBuffer::color_formats(),
            GBufferSlot::Depth.format(),
        )?;

        let pipeline = PassPipeline::new(
            device,
            render_pass.handle(),
            vertex_shader,
            Some(fragment_shader),
            set_layouts,
            &[],
            PassConfig::geometry(),
        )?;

        Ok(Self {
            render_pass,
            pipeline,
        })
    }

    /// The render pass the G-buffer framebuffer must be created against
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Record all geometry draws into the G-buffer
    pub fn record(
        &self,
        recorder: &mut CommandRecorder,
        gbuffer: &GBuffer,
        frame: &FrameResource,
        draws: &[DrawCommand],
    ) -> VulkanResult<()> {
        let clear_values = GBuffer::clear_values();
        let framebuffer = gbuffer.framebuffer();

        let mut pass = recorder.begin_render_pass(
            self.render_pass.handle(),
            framebuffer.handle(),
            framebuffer.render_area(),
            &clear_values,
        )?;

        pass.set_viewport(&full_viewport(gbuffer.extent()));
        pass.set_scissor(&full_scissor(gbuffer.extent()));
        pass.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());

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

        Ok(())
    }
}
