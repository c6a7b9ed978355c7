//! [`MemoryDevice`] and [`TransferQueue`] implementations on top of an
//! [`ash::Device`].
//!
//! Every buffer gets its own allocation. Recording transfers into a command
//! buffer is done here, submitting it and waiting on it is up to the caller.

use ash::vk;

use crate::device::{BufferRequest, HeapDescriptor, MemoryDevice, RawBuffer, TransferHandle, TransferQueue};
use crate::{Bytes, MemoryError};

pub struct VulkanDevice {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice, device: ash::Device) -> VulkanDevice {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        VulkanDevice { device, memory_properties }
    }

    /// The device's memory types, for [`MemoryTypes::select`](crate::MemoryTypes::select).
    pub fn heaps(&self) -> Vec<HeapDescriptor> {
        HeapDescriptor::from_memory_properties(&self.memory_properties)
    }
}

impl MemoryDevice for VulkanDevice {
    fn create_buffer(&self, request: &BufferRequest) -> Result<RawBuffer, MemoryError> {
        profiling::scope!("vulkan buffer creation");
        let buffer_create_info = vk::BufferCreateInfo::default()
            .size(request.size)
            .usage(request.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_create_info, None) }.map_err(MemoryError::BufferCreation)?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let destroy_buffer = || unsafe { self.device.destroy_buffer(buffer, None) };
        let Some(memory_type_index) = memory_type_index(&self.memory_properties, requirements.memory_type_bits, request.memory_flags) else {
            destroy_buffer();
            return Err(MemoryError::MissingMemoryType(request.memory_flags));
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = {
            profiling::scope!("vk::allocate_memory");
            log::trace!("vk::allocate_memory({} bytes, index {})", requirements.size, memory_type_index);
            match unsafe { self.device.allocate_memory(&alloc_info, None) } {
                Ok(memory) => memory,
                Err(err) => {
                    destroy_buffer();
                    return Err(MemoryError::Allocate(err, Bytes(requirements.size)));
                }
            }
        };
        let free_all = || unsafe {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        };

        if let Err(err) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            free_all();
            return Err(MemoryError::BufferBinding(err));
        }

        let mut raw = RawBuffer::unmapped(buffer, memory, request);
        if request.mapped {
            match unsafe { self.device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()) } {
                Ok(mapped_ptr) => raw.mapped_ptr = mapped_ptr.cast::<u8>(),
                Err(err) => {
                    free_all();
                    return Err(MemoryError::Map(err, Bytes(requirements.size)));
                }
            }
        }
        Ok(raw)
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        profiling::scope!("vulkan buffer destruction");
        unsafe {
            if !buffer.mapped_ptr.is_null() {
                self.device.unmap_memory(buffer.memory);
            }
            self.device.destroy_buffer(buffer.inner, None);
            self.device.free_memory(buffer.memory, None);
        }
    }
}

fn memory_type_index(props: &vk::PhysicalDeviceMemoryProperties, type_bits: u32, flags: vk::MemoryPropertyFlags) -> Option<u32> {
    let types = &props.memory_types[..props.memory_type_count as usize];
    let find = |matches: &dyn Fn(vk::MemoryPropertyFlags) -> bool| {
        types
            .iter()
            .enumerate()
            .find(|(i, ty)| type_bits & (1 << *i) != 0 && matches(ty.property_flags))
            .map(|(i, _)| i as u32)
    };
    // Exact matches first, so device-local buffers don't end up in
    // host-visible memory when purely device-local memory exists. Mapped
    // writes are never flushed, so host-visible memory must be coherent if
    // at all possible.
    let coherent = if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        flags | vk::MemoryPropertyFlags::HOST_COHERENT
    } else {
        flags
    };
    find(&|ty| ty == flags)
        .or_else(|| find(&|ty| ty.contains(coherent)))
        .or_else(|| find(&|ty| ty.contains(flags)))
}

/// Records copies into a command buffer that is submitted to the transfer
/// queue by the caller. The handles count up from 1 and are unique for the
/// lifetime of the queue.
pub struct VulkanTransferQueue {
    device: ash::Device,
    command_buffer: vk::CommandBuffer,
    next_handle: u64,
}

impl VulkanTransferQueue {
    pub fn new(device: ash::Device, command_buffer: vk::CommandBuffer) -> VulkanTransferQueue {
        VulkanTransferQueue {
            device,
            command_buffer,
            next_handle: 1,
        }
    }

    /// Switches to recording into `command_buffer`, which must be in the
    /// recording state whenever copies are made.
    pub fn set_command_buffer(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_buffer = command_buffer;
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl TransferQueue for VulkanTransferQueue {
    fn copy_buffer_cmd(
        &mut self,
        src: vk::Buffer,
        src_offset: vk::DeviceSize,
        dst: vk::Buffer,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> TransferHandle {
        profiling::scope!("vk::cmd_copy_buffer");
        let copy_regions = [vk::BufferCopy::default().src_offset(src_offset).dst_offset(dst_offset).size(size)];
        unsafe { self.device.cmd_copy_buffer(self.command_buffer, src, dst, &copy_regions) };
        let handle = TransferHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }
}
