//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, plus the per-frame bundle used
//! by the frame resource ring. Binary semaphores handle GPU-GPU ordering
//! (acquire -> render -> present); fences let the CPU wait for a frame's
//! command buffers to retire before reusing that frame's resources.

use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Bounded fence wait. A frame should never take anywhere near this long;
/// exceeding it is treated as a lost device rather than retried.
pub const FENCE_WAIT_TIMEOUT_NS: u64 = 5_000_000_000;

/// GPU-GPU synchronization primitive with automatic resource management
///
/// Semaphores are signaled by one queue operation and waited on by another:
/// image acquisition signals, rendering waits; rendering signals,
/// presentation waits.
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Wait for the fence with an explicit timeout in nanoseconds
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        let result = unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::FenceTimeout {
                waited_ms: timeout / 1_000_000,
            }),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Wait with the standard bounded timeout
    pub fn wait_bounded(&self) -> VulkanResult<()> {
        self.wait(FENCE_WAIT_TIMEOUT_NS)
    }

    /// Reset fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Non-blocking signal check
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe {
            self.device
                .get_fence_status(self.fence)
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Frame synchronization objects for in-flight frame management
pub struct FrameSync {
    pub image_available: Semaphore,
    pub render_finished: Semaphore,
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects.
    ///
    /// The fence starts unsignaled and is only passed to `queue_submit`
    /// when the slot is actually submitted; the ring waits and resets it
    /// before the slot's next use. A signaled start would make the first
    /// wrap-around wait pass vacuously while the GPU still owns the slot.
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, false)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
