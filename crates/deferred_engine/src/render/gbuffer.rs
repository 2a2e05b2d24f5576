//! Geometry buffer
//!
//! The MRT surface set written by the geometry pass and sampled by the
//! lighting pass: albedo, packed normal+specular power, reflectance,
//! emissive+ambient factor, plus scene depth. All targets share the
//! viewport extent and are recreated together on resize.

use crate::render::vulkan::{Framebuffer, RenderImage, RenderPass, VulkanContext, VulkanResult};
use ash::vk;

/// Identifies one surface of the geometry buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GBufferSlot {
    /// Diffuse albedo (rgb) + opacity (a)
    Albedo,
    /// World-space normal (rgb) + specular power (a)
    NormalSpecular,
    /// Fresnel reflectance (rgb) + roughness (a)
    Reflectance,
    /// Emissive color (rgb) + ambient occlusion factor (a)
    EmissiveAmbient,
    /// Scene depth
    Depth,
}

impl GBufferSlot {
    /// The color slots in attachment order
    pub const COLOR_SLOTS: [GBufferSlot; 4] = [
        GBufferSlot::Albedo,
        GBufferSlot::NormalSpecular,
        GBufferSlot::Reflectance,
        GBufferSlot::EmissiveAmbient,
    ];

    /// Image format for this slot
    pub fn format(self) -> vk::Format {
        match self {
            GBufferSlot::Albedo => vk::Format::R8G8B8A8_UNORM,
            GBufferSlot::NormalSpecular => vk::Format::R16G16B16A16_SFLOAT,
            GBufferSlot::Reflectance => vk::Format::R8G8B8A8_UNORM,
            GBufferSlot::EmissiveAmbient => vk::Format::R16G16B16A16_SFLOAT,
            GBufferSlot::Depth => vk::Format::D32_SFLOAT,
        }
    }

    /// Slot for attachment index `index`, depth last
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(GBufferSlot::Albedo),
            1 => Some(GBufferSlot::NormalSpecular),
            2 => Some(GBufferSlot::Reflectance),
            3 => Some(GBufferSlot::EmissiveAmbient),
            4 => Some(GBufferSlot::Depth),
            _ => None,
        }
    }

    fn attachment_index(self) -> usize {
        match self {
            GBufferSlot::Albedo => 0,
            GBufferSlot::NormalSpecular => 1,
            GBufferSlot::Reflectance => 2,
            GBufferSlot::EmissiveAmbient => 3,
            GBufferSlot::Depth => 4,
        }
    }
}

/// The geometry buffer targets and their shared framebuffer
pub struct GBuffer {
    targets: Vec<RenderImage>,
    framebuffer: Framebuffer,
    extent: vk::Extent2D,
}

impl GBuffer {
    /// Allocate all targets at `extent` and bind them to the geometry pass
    pub fn new(
        context: &VulkanContext,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let memory_props = context.memory_properties();

        let mut targets = Vec::with_capacity(5);
        for slot in GBufferSlot::COLOR_SLOTS {
            targets.push(RenderImage::color_target(
                device.clone(),
                &memory_props,
                extent,
                slot.format(),
            )?);
        }
        targets.push(RenderImage::depth_target(
            device.clone(),
            &memory_props,
            extent,
            GBufferSlot::Depth.format(),
        )?);

        let views: Vec<vk::ImageView> = targets.iter().map(|t| t.view()).collect();
        let framebuffer = Framebuffer::new(device, render_pass.handle(), &views, extent)?;

        log::debug!("G-buffer created: {}x{}", extent.width, extent.height);

        Ok(Self {
            targets,
            framebuffer,
            extent,
        })
    }

    /// Drop and recreate every target at the new extent. The caller must
    /// have flushed the frame ring first.
    pub fn resize(
        &mut self,
        context: &VulkanContext,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        *self = Self::new(context, render_pass, extent)?;
        Ok(())
    }

    /// View of `slot`
    pub fn view(&self, slot: GBufferSlot) -> vk::ImageView {
        self.targets[slot.attachment_index()].view()
    }

    /// Render target of `slot`
    pub fn target(&self, slot: GBufferSlot) -> &RenderImage {
        &self.targets[slot.attachment_index()]
    }

    /// Shared framebuffer for the geometry pass
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Attachment formats in framebuffer order (depth last)
    pub fn color_formats() -> [vk::Format; 4] {
        [
            GBufferSlot::Albedo.format(),
            GBufferSlot::NormalSpecular.format(),
            GBufferSlot::Reflectance.format(),
            GBufferSlot::EmissiveAmbient.format(),
        ]
    }

    /// Clear values matching the attachment order. Color clears to black,
    /// depth to the far plane.
    pub fn clear_values() -> [vk::ClearValue; 5] {
        let black = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 0.0],
            },
        };
        [
            black,
            black,
            black,
            black,
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_round_trip() {
        for index in 0..5 {
            let slot = GBufferSlot::from_index(index).unwrap();
            assert_eq!(slot.attachment_index(), index);
        }
        assert_eq!(GBufferSlot::from_index(5), None);
    }

    #[test]
    fn test_depth_clear_is_far_plane() {
        let clears = GBuffer::clear_values();
        let depth = unsafe { clears[4].depth_stencil };
        assert_eq!(depth.depth, 1.0);
    }
}
