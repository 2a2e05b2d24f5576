//! Deferred lighting pass
//!
//! Reads the geometry buffer and shadow cascades, and accumulates lighting
//! into an HDR target inside a single render pass: one fullscreen triangle
//! per directional light, then one front-culled sphere proxy per point
//! light, all blended additively. The draw list is planned ahead of
//! recording by `plan_lighting`, which is device-free and tested directly.

use crate::foundation::math::{Mat4, Vec3};
use crate::render::frame::FrameResource;
use crate::render::pass_state::{PassConfig, PassPipeline};
use crate::render::passes::{full_scissor, full_viewport};
use crate::render::types::PointLightPush;
use crate::render::upload::GpuMesh;
use crate::render::vulkan::{
    CommandRecorder, Framebuffer, RenderPass, ShaderModule, VulkanContext, VulkanResult,
};
use crate::scene::{Light, LightType, LightingEnvironment};
use ash::vk;
use bytemuck::{Pod, Zeroable};

/// HDR format of the lighting accumulation target
pub const LIGHTING_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Margin added to point-light proxy spheres so sphere tessellation error
/// never clips the falloff radius
const POINT_VOLUME_MARGIN: f32 = 1.1;

/// Push block for one directional fullscreen draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLightPush {
    /// Light direction; w = 1.0 when cascade shadows apply
    pub direction_shadowed: [f32; 4],
    /// Light color, intensity in w
    pub color_intensity: [f32; 4],
}

/// One planned directional fullscreen draw
#[derive(Debug, Clone)]
pub struct DirectionalDraw {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Only the dominant directional light samples the cascades
    pub shadowed: bool,
}

impl DirectionalDraw {
    fn push(&self) -> DirectionalLightPush {
        DirectionalLightPush {
            direction_shadowed: [
                self.direction.x,
                self.direction.y,
                self.direction.z,
                if self.shadowed { 1.0 } else { 0.0 },
            ],
            color_intensity: [self.color.x, self.color.y, self.color.z, self.intensity],
        }
    }
}

/// One planned point-light volume draw
#[derive(Debug, Clone)]
pub struct PointDraw {
    pub world: Mat4,
    pub light: Light,
}

/// Planned lighting work for one frame
#[derive(Debug, Clone, Default)]
pub struct LightingPlan {
    pub directional: Vec<DirectionalDraw>,
    pub point: Vec<PointDraw>,
}

impl LightingPlan {
    /// Total draws the plan will record
    pub fn draw_count(&self) -> usize {
        self.directional.len() + self.point.len()
    }
}

/// Object-to-world matrix of a point light's proxy sphere
pub fn point_light_world_matrix(light: &Light) -> Mat4 {
    let scale = light.radius * POINT_VOLUME_MARGIN;
    Mat4::new_translation(&light.position) * Mat4::new_scaling(scale)
}

/// Turn the lighting environment into an ordered draw plan. Directional
/// lights come first; the shadow flag lands on the same light whose
/// direction fitted the cascades, so intensity ties cannot split the
/// two. Point lights with a non-positive radius or intensity contribute
/// nothing and are dropped.
pub fn plan_lighting(env: &LightingEnvironment) -> LightingPlan {
    let dominant = env.dominant_directional_index();

    let directional = env
        .lights
        .iter()
        .enumerate()
        .filter(|(_, light)| light.light_type == LightType::Directional)
        .map(|(index, light)| DirectionalDraw {
            direction: light.direction,
            color: light.color,
            intensity: light.intensity,
            shadowed: Some(index) == dominant,
        })
        .collect();

    let point = env
        .point_lights()
        .filter(|light| light.radius > 0.0 && light.intensity > 0.0)
        .map(|light| PointDraw {
            world: point_light_world_matrix(light),
            light: light.clone(),
        })
        .collect();

    LightingPlan { directional, point }
}

/// HDR lighting accumulation pass
pub struct LightingPass {
    render_pass: RenderPass,
    directional_pipeline: PassPipeline,
    point_pipeline: PassPipeline,
}

impl LightingPass {
    /// Build the lighting render pass and both light pipelines
    pub fn new(
        context: &VulkanContext,
        fullscreen_vertex: &ShaderModule,
        directional_fragment: &ShaderModule,
        volume_vertex: &ShaderModule,
        point_fragment: &ShaderModule,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let render_pass = RenderPass::new_lighting_pass(device.clone(), LIGHTING_FORMAT)?;

        let directional_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<DirectionalLightPush>() as u32,
        }];
        let directional_pipeline = PassPipeline::new(
            device.clone(),
            render_pass.handle(),
            fullscreen_vertex,
            Some(directional_fragment),
            set_layouts,
            &directional_ranges,
            PassConfig::lighting_directional(),
        )?;

        let point_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<PointLightPush>() as u32,
        }];
        let point_pipeline = PassPipeline::new(
            device,
            render_pass.handle(),
            volume_vertex,
            Some(point_fragment),
            set_layouts,
            &point_ranges,
            PassConfig::lighting_point(),
        )?;

        Ok(Self {
            render_pass,
            directional_pipeline,
            point_pipeline,
        })
    }

    /// The render pass the lighting framebuffer must be created against
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Record the planned lighting draws. `inputs_set` binds the G-buffer
    /// and shadow cascade samplers; `sphere` is the shared proxy mesh.
    pub fn record(
        &self,
        recorder: &mut CommandRecorder,
        framebuffer: &Framebuffer,
        frame: &FrameResource,
        inputs_set: vk::DescriptorSet,
        plan: &LightingPlan,
        sphere: &GpuMesh,
    ) -> VulkanResult<()> {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];

        let mut pass = recorder.begin_render_pass(
            self.render_pass.handle(),
            framebuffer.handle(),
            framebuffer.render_area(),
            &clear_values,
        )?;

        pass.set_viewport(&full_viewport(framebuffer.extent()));
        pass.set_scissor(&full_scissor(framebuffer.extent()));

        // Both pipelines share set 0/1 layouts; dynamic offsets are unused
        // here but the bindings still require placeholders for the dynamic
        // descriptors in set 0.
        let dynamic_offsets = [0u32, 0u32];

        if !plan.directional.is_empty() {
            pass.cmd_bind_pipeline(
                vk::PipelineBindPoint::GRAPHICS,
                self.directional_pipeline.handle(),
            );
            pass.cmd_bind_descriptor_sets(
                self.directional_pipeline.layout(),
                0,
                &[frame.descriptor_set, inputs_set],
                &dynamic_offsets,
            );
            for draw in &plan.directional {
                pass.cmd_push_constants(
                    self.directional_pipeline.layout(),
                    vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&draw.push()),
                );
                pass.cmd_draw(3, 1, 0, 0);
            }
        }

        if !plan.point.is_empty() {
            pass.cmd_bind_pipeline(
                vk::PipelineBindPoint::GRAPHICS,
                self.point_pipeline.handle(),
            );
            pass.cmd_bind_descriptor_sets(
                self.point_pipeline.layout(),
                0,
                &[frame.descriptor_set, inputs_set],
                &dynamic_offsets,
            );
            pass.cmd_bind_vertex_buffers(0, &[sphere.vertex_buffer.handle()], &[0]);
            pass.cmd_bind_index_buffer(sphere.index_buffer.handle(), 0, vk::IndexType::UINT32);
            for draw in &plan.point {
                let push = PointLightPush::new(&draw.world, &draw.light);
                pass.cmd_push_constants(
                    self.point_pipeline.layout(),
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                pass.cmd_draw_indexed(sphere.index_count(), 1, 0, 0, 0);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::project_point;

    #[test]
    fn test_two_directional_no_point() {
        let env = LightingEnvironment::new()
            .add_light(Light::directional(
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
                3.0,
            ))
            .add_light(Light::directional(
                Vec3::new(-1.0, -0.5, 0.0),
                Vec3::new(1.0, 0.9, 0.8),
                1.0,
            ));

        let plan = plan_lighting(&env);
        assert_eq!(plan.directional.len(), 2);
        assert!(plan.point.is_empty());
        assert_eq!(plan.draw_count(), 2);

        // Only the strongest light samples the shadow cascades.
        assert!(plan.directional[0].shadowed);
        assert!(!plan.directional[1].shadowed);
    }

    #[test]
    fn test_tied_dominant_shadows_exactly_one() {
        let env = LightingEnvironment::new()
            .add_light(Light::directional(
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
                2.0,
            ))
            .add_light(Light::directional(
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
                2.0,
            ));

        let plan = plan_lighting(&env);
        let shadowed: Vec<_> = plan.directional.iter().filter(|d| d.shadowed).collect();
        assert_eq!(shadowed.len(), 1);

        // The shadow flag must sit on the same light whose direction the
        // cascades were fitted to, even with tied intensities.
        let dominant = env.dominant_directional().unwrap();
        assert_eq!(shadowed[0].direction, dominant.direction);
    }

    #[test]
    fn test_degenerate_point_lights_dropped() {
        let env = LightingEnvironment::new()
            .add_light(Light::point(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), 5.0, 0.0))
            .add_light(Light::point(Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0), 0.0, 3.0))
            .add_light(Light::point(Vec3::zeros(), Vec3::new(0.0, 0.0, 1.0), 2.0, 4.0));

        let plan = plan_lighting(&env);
        assert_eq!(plan.point.len(), 1);
        assert_eq!(plan.point[0].light.radius, 4.0);
    }

    #[test]
    fn test_point_volume_encloses_radius() {
        let light = Light::point(Vec3::new(2.0, 1.0, -3.0), Vec3::new(1.0, 1.0, 1.0), 1.0, 5.0);
        let world = point_light_world_matrix(&light);

        // A unit-sphere surface point must land outside the falloff radius.
        let surface = project_point(&world, Vec3::new(1.0, 0.0, 0.0));
        let distance = (surface - light.position).norm();
        assert!(distance >= light.radius, "{distance} < {}", light.radius);

        // The center maps to the light position.
        let center = project_point(&world, Vec3::zeros());
        assert!((center - light.position).norm() < 1e-5);
    }

    #[test]
    fn test_empty_environment_plans_nothing() {
        let plan = plan_lighting(&LightingEnvironment::new());
        assert_eq!(plan.draw_count(), 0);
    }
}
