//! Buffer management for vertex data, indices, and uniforms
//!
//! Memory management following RAII patterns with proper allocation and
//! cleanup. Memory type selection queries the cached physical-device
//! memory properties; there is no separate allocator layer.

use crate::foundation::math::utils::align_up;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};
use std::mem;

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = find_memory_type(
            memory_props,
            mem_requirements.memory_type_bits,
            properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Map memory for writing
    pub fn map_memory(&self) -> VulkanResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    /// Unmap memory
    pub fn unmap_memory(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Write a slice of POD data to offset zero. Only valid for
    /// host-visible buffers.
    pub fn write_data<T: bytemuck::Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.write_data_at(data, 0)
    }

    /// Write a slice of POD data at a byte offset
    pub fn write_data_at<T: bytemuck::Pod>(
        &self,
        data: &[T],
        offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if offset + bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    bytes.len(),
                    offset,
                    self.size
                ),
            });
        }

        let data_ptr = self.map_memory()?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                (data_ptr as *mut u8).add(offset as usize),
                bytes.len(),
            );
        }
        self.unmap_memory();
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Host-visible source buffer for the staged upload path
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a staging buffer preloaded with `data`
    pub fn new<T: bytemuck::Pod>(
        device: Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        data: &[T],
    ) -> VulkanResult<Self> {
        let size = mem::size_of_val(data) as vk::DeviceSize;
        let buffer = Buffer::new(
            device,
            memory_props,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_data(data)?;
        Ok(Self { buffer })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Device-local vertex buffer, filled via the upload queue
pub struct VertexBuffer {
    buffer: Buffer,
}

impl VertexBuffer {
    /// Create a device-local vertex buffer sized for `size` bytes
    pub fn new_device_local(
        device: Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_props,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        Ok(Self { buffer })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Device-local index buffer, filled via the upload queue
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create a device-local index buffer for `index_count` u32 indices
    pub fn new_device_local(
        device: Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        index_count: u32,
    ) -> VulkanResult<Self> {
        let size = (index_count as usize * mem::size_of::<u32>()) as vk::DeviceSize;
        let buffer = Buffer::new(
            device,
            memory_props,
            size,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        Ok(Self {
            buffer,
            index_count,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get index count
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Host-visible uniform buffer holding a single `T`
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    /// Create uniform buffer
    pub fn new(
        device: Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
    ) -> VulkanResult<Self> {
        let size = mem::size_of::<T>() as vk::DeviceSize;

        let buffer = Buffer::new(
            device,
            memory_props,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Update uniform data
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

/// Host-visible uniform buffer holding an array of `T` at the device's
/// dynamic-offset alignment, bound with per-draw dynamic offsets
pub struct DynamicUniformBuffer<T> {
    buffer: Buffer,
    stride: vk::DeviceSize,
    capacity: usize,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> DynamicUniformBuffer<T> {
    /// Create a dynamic uniform buffer with room for `capacity` elements
    pub fn new(
        device: Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        min_alignment: vk::DeviceSize,
        capacity: usize,
    ) -> VulkanResult<Self> {
        let stride = align_up(mem::size_of::<T>() as u64, min_alignment.max(1));
        let size = stride * capacity as vk::DeviceSize;

        let buffer = Buffer::new(
            device,
            memory_props,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            stride,
            capacity,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Write element `index`
    pub fn update_at(&self, index: usize, data: &T) -> VulkanResult<()> {
        if index >= self.capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "dynamic uniform index {index} out of range (capacity {})",
                    self.capacity
                ),
            });
        }
        self.buffer
            .write_data_at(std::slice::from_ref(data), self.stride * index as u64)
    }

    /// Dynamic offset for element `index`
    pub fn offset_of(&self, index: usize) -> u32 {
        (self.stride * index as u64) as u32
    }

    /// Aligned element stride in bytes
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    /// Element capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

/// Find memory type with required properties
pub fn find_memory_type(
    mem_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for i in 0..mem_properties.memory_type_count {
        let type_matches = type_filter & (1 << i) != 0;
        let props_match = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        if type_matches && props_match {
            return Ok(i);
        }
    }

    Err(VulkanError::NoSuitableMemoryType)
}
