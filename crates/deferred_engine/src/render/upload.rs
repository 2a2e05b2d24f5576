//! Asset upload path
//!
//! Meshes are staged through host-visible buffers and copied into
//! device-local memory on the upload queue. Staging buffers must outlive
//! the GPU copy, so each submission is stamped with a serial and the
//! buffers are parked in `PendingUploads` until that serial is known to
//! have retired. Uploads on a single queue retire in submission order,
//! which is what makes the serial comparison sufficient.

use crate::render::vulkan::{
    CommandPool, Fence, IndexBuffer, StagingBuffer, VertexBuffer, VulkanContext, VulkanError,
    VulkanResult,
};
use crate::scene::MeshData;
use ash::vk;

/// A mesh resident in device-local memory
pub struct GpuMesh {
    /// Vertex data
    pub vertex_buffer: VertexBuffer,
    /// Index data
    pub index_buffer: IndexBuffer,
}

impl GpuMesh {
    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_buffer.index_count()
    }
}

/// Device-free ledger of items waiting for a GPU serial to retire
#[derive(Debug)]
pub struct PendingUploads<T> {
    entries: Vec<(u64, T)>,
}

impl<T> PendingUploads<T> {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Park `item` until `serial` retires
    pub fn push(&mut self, serial: u64, item: T) {
        self.entries.push((serial, item));
    }

    /// Drop every item whose serial is at or below `completed_serial`,
    /// returning how many were reclaimed
    pub fn reclaim(&mut self, completed_serial: u64) -> usize {
        self.drain_completed(completed_serial).len()
    }

    /// Remove and return every item whose serial is at or below
    /// `completed_serial`, for items that need explicit cleanup
    pub fn drain_completed(&mut self, completed_serial: u64) -> Vec<T> {
        let entries = std::mem::take(&mut self.entries);
        let (done, keep): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|(serial, _)| *serial <= completed_serial);
        self.entries = keep;
        done.into_iter().map(|(_, item)| item).collect()
    }

    /// Number of items still parked
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is parked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for PendingUploads<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Manages mesh uploads on the dedicated upload queue
pub struct UploadManager {
    device: ash::Device,
    memory_props: vk::PhysicalDeviceMemoryProperties,
    queue: vk::Queue,
    command_pool: CommandPool,
    pending: PendingUploads<StagingBuffer>,
    // Copy command buffers live until their batch retires, then go back
    // to the pool.
    command_buffers: PendingUploads<vk::CommandBuffer>,
    fences: Vec<(u64, Fence)>,
    next_serial: u64,
    completed_serial: u64,
}

impl UploadManager {
    /// Create an upload manager on the context's upload queue family
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.raw_device();
        let command_pool = CommandPool::new(device.clone(), context.device.upload_family)?;

        Ok(Self {
            device,
            memory_props: context.memory_properties(),
            queue: context.device.upload_queue,
            command_pool,
            pending: PendingUploads::new(),
            command_buffers: PendingUploads::new(),
            fences: Vec::new(),
            next_serial: 1,
            completed_serial: 0,
        })
    }

    /// Stage a mesh and submit the copy into device-local buffers. The
    /// returned mesh must not be drawn until `flush` or a later `reclaim`
    /// confirms the copy retired; the renderer flushes before first use.
    pub fn upload_mesh(&mut self, data: &MeshData) -> VulkanResult<GpuMesh> {
        if data.vertices.is_empty() || data.indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot upload an empty mesh".to_string(),
            });
        }

        let vertex_staging =
            StagingBuffer::new(self.device.clone(), &self.memory_props, &data.vertices)?;
        let index_staging =
            StagingBuffer::new(self.device.clone(), &self.memory_props, &data.indices)?;

        let vertex_buffer = VertexBuffer::new_device_local(
            self.device.clone(),
            &self.memory_props,
            vertex_staging.size(),
        )?;
        let index_buffer = IndexBuffer::new_device_local(
            self.device.clone(),
            &self.memory_props,
            data.index_count(),
        )?;

        let mut recorder = self.command_pool.begin_single_time()?;
        recorder.cmd_copy_buffer(
            vertex_staging.handle(),
            vertex_buffer.handle(),
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: vertex_staging.size(),
            }],
        );
        recorder.cmd_copy_buffer(
            index_staging.handle(),
            index_buffer.handle(),
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: index_staging.size(),
            }],
        );
        let command_buffer = recorder.end()?;

        let fence = Fence::new(self.device.clone(), false)?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit_info.build()], fence.handle())
                .map_err(VulkanError::Api)?;
        }

        let serial = self.next_serial;
        self.next_serial += 1;
        self.pending.push(serial, vertex_staging);
        self.pending.push(serial, index_staging);
        self.command_buffers.push(serial, command_buffer);
        self.fences.push((serial, fence));

        log::debug!(
            "Mesh upload submitted: {} vertices, {} indices (serial {serial})",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(GpuMesh {
            vertex_buffer,
            index_buffer,
        })
    }

    /// Poll upload fences and free the staging buffers and command
    /// buffers whose copies retired
    pub fn reclaim(&mut self) -> VulkanResult<usize> {
        let mut completed = self.completed_serial;
        for (serial, fence) in &self.fences {
            if fence.is_signaled()? {
                completed = completed.max(*serial);
            }
        }
        self.completed_serial = completed;
        self.fences.retain(|(serial, _)| *serial > completed);
        self.free_retired_command_buffers(completed);
        Ok(self.pending.reclaim(completed))
    }

    /// Block until every outstanding upload retires
    pub fn flush(&mut self) -> VulkanResult<()> {
        for (serial, fence) in self.fences.drain(..) {
            fence.wait_bounded()?;
            self.completed_serial = self.completed_serial.max(serial);
        }
        self.free_retired_command_buffers(self.completed_serial);
        self.pending.reclaim(self.completed_serial);
        Ok(())
    }

    fn free_retired_command_buffers(&mut self, completed_serial: u64) {
        let retired = self.command_buffers.drain_completed(completed_serial);
        if !retired.is_empty() {
            self.command_pool.free_command_buffers(&retired);
        }
    }

    /// Number of staging buffers still awaiting retirement
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_frees_only_retired_items() {
        let mut pending = PendingUploads::new();
        pending.push(1, "a");
        pending.push(2, "b");
        pending.push(3, "c");

        assert_eq!(pending.reclaim(2), 2);
        assert_eq!(pending.len(), 1);

        assert_eq!(pending.reclaim(3), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_reclaim_is_idempotent() {
        let mut pending = PendingUploads::new();
        pending.push(5, "a");

        assert_eq!(pending.reclaim(4), 0);
        assert_eq!(pending.reclaim(5), 1);
        assert_eq!(pending.reclaim(5), 0);
    }

    #[test]
    fn test_drain_returns_retired_items_for_cleanup() {
        // Command buffers ride the same ledger as staging memory; the
        // drained handles go back to the pool instead of leaking.
        let mut pending = PendingUploads::new();
        pending.push(1, "cb1");
        pending.push(2, "cb2");
        pending.push(3, "cb3");

        assert_eq!(pending.drain_completed(2), vec!["cb1", "cb2"]);
        assert_eq!(pending.len(), 1);
        assert!(pending.drain_completed(2).is_empty());
        assert_eq!(pending.drain_completed(3), vec!["cb3"]);
    }

    #[test]
    fn test_items_sharing_a_serial_reclaim_together() {
        // Vertex and index staging for one mesh share one submission.
        let mut pending = PendingUploads::new();
        pending.push(7, "vertices");
        pending.push(7, "indices");

        assert_eq!(pending.reclaim(6), 0);
        assert_eq!(pending.reclaim(7), 2);
    }
}
