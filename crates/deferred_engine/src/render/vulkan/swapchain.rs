//! Vulkan swapchain management
//!
//! Swapchain creation and recreation following RAII principles. Swapchain
//! images carry TRANSFER_DST usage because the final composite blits the
//! lighting target onto the backbuffer instead of rendering into it.

use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

/// Outcome of an acquire or present call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    /// Image usable as-is
    Ok,
    /// The call succeeded but the swapchain no longer matches the surface;
    /// an acquired image must still be rendered and presented because its
    /// semaphore will signal. Recreate before the next frame.
    Suboptimal,
    /// The call failed outright: no image was acquired and the acquire
    /// semaphore stays unsignaled. Drop the frame and recreate.
    OutOfDate,
}

impl SwapchainStatus {
    /// True when an image was acquired and its semaphore will signal, so
    /// the frame must run through submit and present
    pub fn image_acquired(self) -> bool {
        !matches!(self, SwapchainStatus::OutOfDate)
    }

    /// True when the swapchain should be recreated before the next frame
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, SwapchainStatus::Ok)
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        vsync: bool,
    ) -> VulkanResult<Self> {
        Self::create(context, window_extent, vsync, vk::SwapchainKHR::null())
    }

    /// Recreate the swapchain after a resize, chaining the old handle so
    /// in-flight presents complete cleanly
    pub fn recreate(
        self,
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        vsync: bool,
    ) -> VulkanResult<Self> {
        let replacement = Self::create(context, window_extent, vsync, self.swapchain)?;
        // `self` drops here, destroying the old swapchain and views after
        // the new one has been linked to it.
        Ok(replacement)
    }

    fn create(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let physical = context.physical_device.device;
        let surface = context.surface.surface;
        let surface_loader = &context.surface.loader;
        let swapchain_loader = context.swapchain_loader().clone();

        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical, surface)
                .map_err(VulkanError::Api)?
        };

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let format = surface_formats
            .iter()
            .find(|sf| {
                sf.format == vk::Format::B8G8R8A8_UNORM
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .cloned()
            .unwrap_or(surface_formats[0]);

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let present_mode = if vsync {
            vk::PresentModeKHR::FIFO
        } else {
            present_modes
                .iter()
                .cloned()
                .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };

        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(
                    surface_caps.min_image_extent.width,
                    surface_caps.max_image_extent.width,
                ),
                height: window_extent.height.clamp(
                    surface_caps.min_image_extent.height,
                    surface_caps.max_image_extent.height,
                ),
            }
        };

        let image_count = (surface_caps.min_image_count + 1).min(
            if surface_caps.max_image_count > 0 {
                surface_caps.max_image_count
            } else {
                surface_caps.min_image_count + 1
            },
        );

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let image_views: Result<Vec<_>, _> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.create_image_view(&create_info, None) }
            })
            .collect();
        let image_views = image_views.map_err(VulkanError::Api)?;

        log::debug!(
            "Swapchain created: {}x{} x{} images, {:?}",
            extent.width,
            extent.height,
            images.len(),
            present_mode
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    /// Returns the image index and whether the swapchain is still optimal.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> VulkanResult<(u32, SwapchainStatus)> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => Ok((index, SwapchainStatus::Ok)),
            Ok((index, true)) => Ok((index, SwapchainStatus::Suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, SwapchainStatus::OutOfDate)),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Present `image_index` after `wait_semaphore` signals
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<SwapchainStatus> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        match result {
            Ok(false) => Ok(SwapchainStatus::Ok),
            Ok(true) => Ok(SwapchainStatus::Suboptimal),
            // The wait semaphore is consumed even when presentation fails,
            // so the frame still retires normally.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Swapchain image handles
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Swapchain image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Surface format in use
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suboptimal_acquire_still_renders_the_frame() {
        // A suboptimal acquire signals its semaphore, so the frame must be
        // submitted and presented; only an out-of-date acquire may be
        // dropped without consuming the semaphore.
        assert!(SwapchainStatus::Ok.image_acquired());
        assert!(SwapchainStatus::Suboptimal.image_acquired());
        assert!(!SwapchainStatus::OutOfDate.image_acquired());
    }

    #[test]
    fn test_rebuild_needed_for_every_non_ok_status() {
        assert!(!SwapchainStatus::Ok.needs_rebuild());
        assert!(SwapchainStatus::Suboptimal.needs_rebuild());
        assert!(SwapchainStatus::OutOfDate.needs_rebuild());
    }
}
