//! The parts of the graphics device this crate drives but does not own: buffer
//! allocation, the transfer queue and the frame counter.

use ash::vk;
use core::ptr;

use crate::MemoryError;

/// One memory type exposed by the physical device, as far as memory type
/// selection is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapDescriptor {
    pub property_flags: vk::MemoryPropertyFlags,
    pub index: u32,
}

impl HeapDescriptor {
    pub fn from_memory_properties(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> Vec<HeapDescriptor> {
        let types = &memory_properties.memory_types[..memory_properties.memory_type_count as usize];
        types
            .iter()
            .enumerate()
            .map(|(i, memory_type)| HeapDescriptor {
                property_flags: memory_type.property_flags,
                index: i as u32,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferRequest {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// The memory backing the buffer must have at least these flags.
    pub memory_flags: vk::MemoryPropertyFlags,
    /// Whether the whole allocation should be mapped for host access.
    pub mapped: bool,
}

/// A buffer and its memory as handed out by a [`MemoryDevice`].
#[derive(Debug)]
pub struct RawBuffer {
    pub inner: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// Start of the mapped allocation, or null if the request was not mapped.
    pub mapped_ptr: *mut u8,
}

impl RawBuffer {
    pub fn unmapped(inner: vk::Buffer, memory: vk::DeviceMemory, request: &BufferRequest) -> RawBuffer {
        RawBuffer {
            inner,
            memory,
            size: request.size,
            usage: request.usage,
            mapped_ptr: ptr::null_mut(),
        }
    }
}

pub trait MemoryDevice {
    fn create_buffer(&self, request: &BufferRequest) -> Result<RawBuffer, MemoryError>;
    fn destroy_buffer(&self, buffer: RawBuffer);
}

/// Identifies a copy command recorded into a [`TransferQueue`]. Completion is
/// tracked by whoever submits the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferHandle(pub u64);

pub trait TransferQueue {
    fn copy_buffer_cmd(
        &mut self,
        src: vk::Buffer,
        src_offset: vk::DeviceSize,
        dst: vk::Buffer,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> TransferHandle;
}

pub trait FrameIndex {
    fn current_frame(&self) -> usize;
}

impl<F: Fn() -> usize> FrameIndex for F {
    fn current_frame(&self) -> usize {
        self()
    }
}
