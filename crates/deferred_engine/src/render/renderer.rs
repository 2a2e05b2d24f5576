//! Deferred renderer
//!
//! Orchestrates one frame end to end: wait for the frame slot, fit the
//! shadow cascades, upload constants, then record shadow -> geometry ->
//! lighting -> composite into one command buffer and submit it against the
//! slot's fence. Resizes are deferred to the top of the next frame, where
//! the ring is flushed before any sized resource is recreated.

use crate::config::RendererConfig;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::foundation::time::FrameTimer;
use crate::render::frame::FrameResourceRing;
use crate::render::gbuffer::{GBuffer, GBufferSlot};
use crate::render::pass_state::TrackedConstants;
use crate::render::passes::{
    plan_lighting, CompositePass, DrawCommand, GeometryPass, LightingPass, ShadowPass,
    LIGHTING_FORMAT,
};
use crate::render::shadow::{CascadePartition, CascadeSet, CascadeShadowMaps};
use crate::render::types::{MaterialConstants, ObjectConstants, PassConstants};
use crate::render::upload::{GpuMesh, UploadManager};
use crate::render::vulkan::{
    CommandPool, CommandRecorder, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    DescriptorSetWriter, Framebuffer, RenderImage, Sampler, ShaderModule, Swapchain,
    VulkanContext, VulkanError, VulkanResult,
};
use crate::render::MAX_CASCADES;
use crate::scene::{MeshData, RenderScene};
use ash::vk;
use bitflags::bitflags;
use std::mem;
use std::path::Path;

bitflags! {
    /// Structural work deferred to the top of the next frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RebuildFlags: u32 {
        /// Recreate the swapchain at the new window extent
        const SWAPCHAIN = 1 << 0;
        /// Recreate the G-buffer, lighting target, and input bindings
        const RENDER_TARGETS = 1 << 1;
    }
}

/// The SPIR-V modules the deferred pipeline is built from
struct ShaderLibrary {
    shadow_vert: ShaderModule,
    geometry_vert: ShaderModule,
    geometry_frag: ShaderModule,
    fullscreen_vert: ShaderModule,
    directional_frag: ShaderModule,
    volume_vert: ShaderModule,
    point_frag: ShaderModule,
}

impl ShaderLibrary {
    fn load(device: ash::Device, dir: &Path) -> VulkanResult<Self> {
        let load = |name: &str| ShaderModule::from_file(device.clone(), dir.join(name));
        Ok(Self {
            shadow_vert: load("shadow.vert.spv")?,
            geometry_vert: load("geometry.vert.spv")?,
            geometry_frag: load("geometry.frag.spv")?,
            fullscreen_vert: load("fullscreen.vert.spv")?,
            directional_frag: load("lighting_directional.frag.spv")?,
            volume_vert: load("light_volume.vert.spv")?,
            point_frag: load("lighting_point.frag.spv")?,
        })
    }
}

/// Top-level deferred shading renderer
pub struct DeferredRenderer {
    config: RendererConfig,
    window_extent: vk::Extent2D,
    pending: RebuildFlags,

    swapchain: Option<Swapchain>,
    command_pool: CommandPool,
    upload: UploadManager,

    descriptor_pool: DescriptorPool,
    frame_set_layout: DescriptorSetLayout,
    inputs_set_layout: DescriptorSetLayout,
    gbuffer_sampler: Sampler,
    shadow_sampler: Sampler,
    inputs_set: vk::DescriptorSet,

    shadow_pass: ShadowPass,
    geometry_pass: GeometryPass,
    lighting_pass: LightingPass,

    gbuffer: GBuffer,
    shadow_maps: CascadeShadowMaps,
    lighting_target: RenderImage,
    lighting_framebuffer: Framebuffer,

    frames: FrameResourceRing,
    pass_constants: TrackedConstants<PassConstants>,
    sphere: GpuMesh,

    timer: FrameTimer,

    // Dropped last so every wrapper above can destroy its handles first.
    context: VulkanContext,
}

impl DeferredRenderer {
    /// Build the full pipeline against an initialized context
    pub fn new(
        context: VulkanContext,
        config: RendererConfig,
        window_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        config.validate().map_err(|e| VulkanError::InvalidOperation {
            reason: e.to_string(),
        })?;

        let device = context.raw_device();

        let swapchain = Swapchain::new(&context, window_extent, config.vsync)?;
        let command_pool = CommandPool::new(device.clone(), context.physical_device.graphics_family)?;
        let mut upload = UploadManager::new(&context)?;

        // Set 0: per-frame constants. Set 1: G-buffer and shadow inputs.
        let frame_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .add_uniform_buffer_dynamic(1, vk::ShaderStageFlags::VERTEX)
            .add_uniform_buffer_dynamic(2, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;

        let mut inputs_builder = DescriptorSetLayoutBuilder::new();
        for binding in 0..5u32 {
            inputs_builder =
                inputs_builder.add_combined_image_sampler(binding, vk::ShaderStageFlags::FRAGMENT);
        }
        for cascade in 0..MAX_CASCADES as u32 {
            inputs_builder = inputs_builder
                .add_combined_image_sampler(5 + cascade, vk::ShaderStageFlags::FRAGMENT);
        }
        let inputs_set_layout = inputs_builder.build(&device)?;

        let descriptor_pool =
            DescriptorPool::new(device.clone(), config.frames_in_flight as u32 + 4)?;
        let gbuffer_sampler = Sampler::nearest_clamp(device.clone())?;
        let shadow_sampler = Sampler::shadow_compare(device.clone())?;

        let shaders = ShaderLibrary::load(device.clone(), &config.shader_dir)?;

        let frame_layouts = [frame_set_layout.handle()];
        let lighting_layouts = [frame_set_layout.handle(), inputs_set_layout.handle()];

        let shadow_pass = ShadowPass::new(&context, &shaders.shadow_vert, &frame_layouts)?;
        let geometry_pass = GeometryPass::new(
            &context,
            &shaders.geometry_vert,
            &shaders.geometry_frag,
            &frame_layouts,
        )?;
        let lighting_pass = LightingPass::new(
            &context,
            &shaders.fullscreen_vert,
            &shaders.directional_frag,
            &shaders.volume_vert,
            &shaders.point_frag,
            &lighting_layouts,
        )?;

        let extent = swapchain.extent();
        let gbuffer = GBuffer::new(&context, geometry_pass.render_pass(), extent)?;
        let shadow_maps = CascadeShadowMaps::new(
            &context,
            shadow_pass.render_pass(),
            config.shadow.resolution,
            config.shadow.cascade_count,
        )?;
        let (lighting_target, lighting_framebuffer) =
            Self::create_lighting_target(&context, &lighting_pass, extent)?;

        let mut frames = FrameResourceRing::new(&context, &command_pool, &config)?;
        Self::write_frame_sets(&device, &descriptor_pool, &frame_set_layout, &mut frames)?;

        let inputs_set = descriptor_pool.allocate_descriptor_sets(&[inputs_set_layout.handle()])?[0];
        Self::write_inputs_set(
            &device,
            inputs_set,
            &gbuffer,
            &shadow_maps,
            &gbuffer_sampler,
            &shadow_sampler,
        );

        // The point-light proxy sphere lives for the renderer's lifetime.
        let sphere = upload.upload_mesh(&MeshData::unit_sphere(16, 24))?;
        upload.flush()?;

        let pass_constants =
            TrackedConstants::new(PassConstants::default(), config.frames_in_flight);

        log::info!(
            "Deferred renderer initialized: {}x{}, {} cascades @ {}",
            extent.width,
            extent.height,
            config.shadow.cascade_count,
            config.shadow.resolution
        );

        Ok(Self {
            config,
            window_extent: extent,
            pending: RebuildFlags::empty(),
            swapchain: Some(swapchain),
            command_pool,
            upload,
            descriptor_pool,
            frame_set_layout,
            inputs_set_layout,
            gbuffer_sampler,
            shadow_sampler,
            inputs_set,
            shadow_pass,
            geometry_pass,
            lighting_pass,
            gbuffer,
            shadow_maps,
            lighting_target,
            lighting_framebuffer,
            frames,
            pass_constants,
            sphere,
            timer: FrameTimer::default(),
            context,
        })
    }

    fn create_lighting_target(
        context: &VulkanContext,
        lighting_pass: &LightingPass,
        extent: vk::Extent2D,
    ) -> VulkanResult<(RenderImage, Framebuffer)> {
        let device = context.raw_device();
        let target = RenderImage::color_target(
            device.clone(),
            &context.memory_properties(),
            extent,
            LIGHTING_FORMAT,
        )?;
        let framebuffer = Framebuffer::new(
            device,
            lighting_pass.render_pass().handle(),
            &[target.view()],
            extent,
        )?;
        Ok((target, framebuffer))
    }

    fn write_frame_sets(
        device: &ash::Device,
        pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
        frames: &mut FrameResourceRing,
    ) -> VulkanResult<()> {
        let layouts: Vec<vk::DescriptorSetLayout> = frames
            .frames_mut()
            .iter()
            .map(|_| layout.handle())
            .collect();
        let sets = pool.allocate_descriptor_sets(&layouts)?;

        for (frame, set) in frames.frames_mut().iter_mut().zip(sets) {
            frame.descriptor_set = set;
            DescriptorSetWriter::new()
                .write_buffer(
                    set,
                    0,
                    frame.pass_constants.handle(),
                    0,
                    mem::size_of::<PassConstants>() as vk::DeviceSize,
                )
                .write_buffer_dynamic(
                    set,
                    1,
                    frame.object_constants.handle(),
                    mem::size_of::<ObjectConstants>() as vk::DeviceSize,
                )
                .write_buffer_dynamic(
                    set,
                    2,
                    frame.material_constants.handle(),
                    mem::size_of::<MaterialConstants>() as vk::DeviceSize,
                )
                .update(device);
        }
        Ok(())
    }

    fn write_inputs_set(
        device: &ash::Device,
        set: vk::DescriptorSet,
        gbuffer: &GBuffer,
        shadow_maps: &CascadeShadowMaps,
        gbuffer_sampler: &Sampler,
        shadow_sampler: &Sampler,
    ) {
        let mut writer = DescriptorSetWriter::new();

        for (binding, slot) in GBufferSlot::COLOR_SLOTS.iter().enumerate() {
            writer = writer.write_image(
                set,
                binding as u32,
                gbuffer.view(*slot),
                gbuffer_sampler.handle(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        }
        writer = writer.write_image(
            set,
            4,
            gbuffer.view(GBufferSlot::Depth),
            gbuffer_sampler.handle(),
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );

        // Unused cascade bindings alias the last map so every declared
        // binding is valid.
        let last = shadow_maps.cascade_count().saturating_sub(1);
        for cascade in 0..MAX_CASCADES {
            let map = shadow_maps
                .shadow_map(cascade.min(last))
                .expect("atlas has at least one cascade");
            writer = writer.write_image(
                set,
                5 + cascade as u32,
                map.view(),
                shadow_sampler.handle(),
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            );
        }

        writer.update(device);
    }

    /// Upload a mesh through the staging path. The mesh is safe to draw
    /// from the next `render_frame` call onward.
    pub fn upload_mesh(&mut self, data: &MeshData) -> VulkanResult<GpuMesh> {
        let mesh = self.upload.upload_mesh(data)?;
        self.upload.flush()?;
        Ok(mesh)
    }

    /// Note a new window size; resources are rebuilt at the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.window_extent = vk::Extent2D { width, height };
        self.pending |= RebuildFlags::SWAPCHAIN | RebuildFlags::RENDER_TARGETS;
    }

    /// Current render extent
    pub fn extent(&self) -> vk::Extent2D {
        self.window_extent
    }

    fn process_pending(&mut self) -> VulkanResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        // Nothing sized may be destroyed while any frame is in flight.
        self.frames.flush()?;
        self.context.wait_idle()?;

        if self.pending.contains(RebuildFlags::SWAPCHAIN) {
            let swapchain = self
                .swapchain
                .take()
                .expect("swapchain present outside recreate");
            self.swapchain =
                Some(swapchain.recreate(&self.context, self.window_extent, self.config.vsync)?);
        }

        if self.pending.contains(RebuildFlags::RENDER_TARGETS) {
            let extent = self.swapchain.as_ref().expect("swapchain exists").extent();
            self.window_extent = extent;
            self.gbuffer
                .resize(&self.context, self.geometry_pass.render_pass(), extent)?;
            let (target, framebuffer) =
                Self::create_lighting_target(&self.context, &self.lighting_pass, extent)?;
            self.lighting_target = target;
            self.lighting_framebuffer = framebuffer;

            Self::write_inputs_set(
                &self.context.raw_device(),
                self.inputs_set,
                &self.gbuffer,
                &self.shadow_maps,
                &self.gbuffer_sampler,
                &self.shadow_sampler,
            );
        }

        log::debug!(
            "Rebuilt {:?} at {}x{}",
            self.pending,
            self.window_extent.width,
            self.window_extent.height
        );
        self.pending = RebuildFlags::empty();
        Ok(())
    }

    /// Resolve scene objects into draw commands and fill the per-object
    /// constant buffers for the active frame slot
    fn build_draw_list(&mut self, scene: &RenderScene) -> VulkanResult<Vec<DrawCommand>> {
        let frame = self.frames.current();
        let mut draws = Vec::with_capacity(scene.objects.len());

        for object in &scene.objects {
            if draws.len() >= self.config.max_objects {
                log::warn!(
                    "Draw list truncated at {} objects (max_objects)",
                    self.config.max_objects
                );
                break;
            }
            // Stale keys are skipped, not errors: objects may outlive the
            // meshes they referenced.
            let Some(mesh) = scene.mesh(object.mesh) else {
                continue;
            };
            let Some(material) = scene.material(object.material) else {
                continue;
            };

            let object_index = draws.len();
            frame
                .object_constants
                .update_at(object_index, &ObjectConstants::from_world(&object.world))?;
            frame
                .material_constants
                .update_at(object_index, &MaterialConstants::from(material))?;

            draws.push(DrawCommand {
                vertex_buffer: mesh.vertex_buffer.handle(),
                index_buffer: mesh.index_buffer.handle(),
                index_count: mesh.index_count(),
                object_index,
            });
        }

        Ok(draws)
    }

    /// Render one frame of `scene` and present it
    pub fn render_frame(&mut self, scene: &RenderScene) -> VulkanResult<()> {
        self.process_pending()?;

        let slot = self.frames.begin_frame()?;

        // Fit the cascades to this frame's camera and dominant light.
        let mut camera = scene.camera.clone();
        camera.set_aspect_ratio(self.window_extent.width as f32 / self.window_extent.height as f32);
        let partition =
            CascadePartition::from_config(&self.config.shadow, camera.near, camera.far);
        let light_dir = scene
            .lights
            .dominant_directional()
            .map(|l| l.direction)
            .unwrap_or_else(|| Vec3::new(0.0, -1.0, 0.0));
        let cascades = CascadeSet::compute(&camera, light_dir, &partition);

        let view = camera.view_matrix();
        let projection = camera.projection_matrix() * Mat4::vulkan_coordinate_transform();
        let sun = scene.lights.dominant_directional();
        let ambient_color = scene.lights.ambient_color;
        let ambient_intensity = scene.lights.ambient_intensity;
        let extent = self.window_extent;
        self.pass_constants.modify(|constants| {
            constants.set_camera(&view, &projection, camera.position);
            constants.set_depth_viewport(
                camera.near,
                camera.far,
                extent.width as f32,
                extent.height as f32,
            );
            constants.set_sun(sun, ambient_color, ambient_intensity);
            constants.set_cascades(cascades.matrices(), cascades.splits());
        });
        if let Some(constants) = self.pass_constants.flush(slot) {
            self.frames.current().pass_constants.update(constants)?;
        }

        let (image_index, acquire_status) = {
            let swapchain = self.swapchain.as_ref().expect("swapchain exists");
            swapchain.acquire_next_image(self.frames.current().sync.image_available.handle())?
        };
        if acquire_status.needs_rebuild() {
            self.pending |= RebuildFlags::SWAPCHAIN | RebuildFlags::RENDER_TARGETS;
        }
        if !acquire_status.image_acquired() {
            // No image and the acquire semaphore never signals, so the
            // slot can be recycled without a submission.
            self.frames.abort_frame()?;
            return Ok(());
        }

        let draws = self.build_draw_list(scene)?;
        let plan = plan_lighting(&scene.lights);

        let device = self.context.raw_device();
        let frame = self.frames.current();
        let mut recorder = CommandRecorder::new(frame.command_buffer, device.clone());
        recorder.begin()?;

        self.shadow_pass
            .record(&mut recorder, &self.shadow_maps, frame, &draws)?;
        self.geometry_pass
            .record(&mut recorder, &self.gbuffer, frame, &draws)?;
        self.lighting_pass.record(
            &mut recorder,
            &self.lighting_framebuffer,
            frame,
            self.inputs_set,
            &plan,
            &self.sphere,
        )?;

        let swapchain = self.swapchain.as_ref().expect("swapchain exists");
        CompositePass::record(
            &mut recorder,
            &self.lighting_target,
            swapchain.images()[image_index as usize],
            swapchain.extent(),
        )?;

        let command_buffer = recorder.end()?;

        let wait_semaphores = [frame.sync.image_available.handle()];
        // The first use of the acquired image is the composite blit.
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [frame.sync.render_finished.handle()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info.build()],
                    frame.sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        let render_finished = frame.sync.render_finished.handle();
        self.frames.end_frame()?;

        let present_status = self.swapchain.as_ref().expect("swapchain exists").present(
            self.context.device.present_queue,
            image_index,
            render_finished,
        )?;
        if present_status.needs_rebuild() {
            self.pending |= RebuildFlags::SWAPCHAIN | RebuildFlags::RENDER_TARGETS;
        }

        self.upload.reclaim()?;

        if let Some(stats) = self.timer.tick() {
            log::info!(
                "{} frames, {:.2} ms avg ({:.1} fps), {} draws",
                stats.frames,
                stats.average_frame_time.as_secs_f64() * 1000.0,
                stats.fps(),
                draws.len() + plan.draw_count()
            );
        }

        Ok(())
    }

    /// Block until all GPU work retires (shutdown, target teardown)
    pub fn wait_idle(&mut self) -> VulkanResult<()> {
        self.frames.flush()?;
        self.upload.flush()?;
        self.context.wait_idle()
    }
}

impl Drop for DeferredRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("Failed to drain GPU during renderer teardown: {e}");
        }
    }
}
