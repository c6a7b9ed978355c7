use ash::vk;

use crate::memory_types::MemoryKind;
use crate::Bytes;

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("failed to create buffer (probably out of host or device memory)")]
    BufferCreation(#[source] vk::Result),
    #[error("no memory type with the required flags (flags: {0:?})")]
    MissingMemoryType(vk::MemoryPropertyFlags),
    #[error("vulkan memory allocation failed (size: {1})")]
    Allocate(#[source] vk::Result, Bytes),
    #[error("failed to bind buffer to memory (probably out of host or device memory)")]
    BufferBinding(#[source] vk::Result),
    #[error("mapping vulkan memory failed (size: {1})")]
    Map(#[source] vk::Result, Bytes),
    #[error("tried to access {0:?} memory through a mapped pointer, but the buffer is not mapped")]
    NotMapped(MemoryKind),
    #[error("destination buffer ({dst} bytes) is smaller than the source buffer ({src} bytes)")]
    DestinationTooSmall { src: vk::DeviceSize, dst: vk::DeviceSize },
    #[error("{0:?} memory does not support buffer-to-buffer copies")]
    CopyUnsupported(MemoryKind),
    #[error("{identifier} ({used}/{total} bytes used) cannot fit {required} bytes")]
    OutOfMemory {
        identifier: String,
        used: vk::DeviceSize,
        total: vk::DeviceSize,
        required: vk::DeviceSize,
    },
    #[error("range of {size} bytes at offset {offset} does not fit in {total} bytes")]
    OutOfBounds {
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
        total: vk::DeviceSize,
    },
    #[error("device-local upload attempted without any staging buffers")]
    NoStagingBuffers,
}
