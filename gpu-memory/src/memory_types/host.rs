//! Memory types the host can map. All of them write and read through the
//! buffer's mapped pointer, they differ in the flags they allocate with.
use ash::vk;
use core::ptr;

use crate::buffer::{source_range, Buffer};
use crate::device::{BufferRequest, MemoryDevice, RawBuffer};
use crate::memory_types::{CopyStatus, MemoryKind, MemoryType, TransferContext};
use crate::MemoryError;

fn create_mapped_buffer(
    property_flags: vk::MemoryPropertyFlags,
    device: &dyn MemoryDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
) -> Result<RawBuffer, MemoryError> {
    device.create_buffer(&BufferRequest {
        size,
        usage,
        memory_flags: property_flags,
        mapped: true,
    })
}

fn upload_mapped(buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError> {
    profiling::scope!("mapped buffer upload");
    buffer.write_mapped(0, src)?;
    buffer.used_bytes = src.len() as vk::DeviceSize;
    Ok(CopyStatus::Complete)
}

fn copy_to_mapped(buffer: &mut Buffer, size: vk::DeviceSize, src: &[u8]) -> Result<CopyStatus, MemoryError> {
    profiling::scope!("mapped buffer append");
    let src = source_range(src, size)?;
    let offset = buffer.used_bytes;
    buffer.write_mapped(offset, src)?;
    buffer.used_bytes = offset + size;
    Ok(CopyStatus::Complete)
}

#[derive(Debug)]
pub struct HostCachedMemory {
    property_flags: vk::MemoryPropertyFlags,
}

impl HostCachedMemory {
    pub fn new(property_flags: vk::MemoryPropertyFlags) -> HostCachedMemory {
        HostCachedMemory { property_flags }
    }

    /// Writes the first `size` bytes of `src` at `dst_offset`, without
    /// touching the buffer's used bytes.
    pub fn copy_to_buffer_at(
        &self,
        buffer: &mut Buffer,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
        src: &[u8],
    ) -> Result<CopyStatus, MemoryError> {
        buffer.write_mapped(dst_offset, source_range(src, size)?)?;
        Ok(CopyStatus::Complete)
    }
}

impl MemoryType for HostCachedMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::HostCached
    }

    fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    fn create_buffer(
        &self,
        device: &dyn MemoryDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<RawBuffer, MemoryError> {
        create_mapped_buffer(self.property_flags, device, size, usage)
    }

    fn upload_buffer(&self, _ctx: &mut TransferContext, buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError> {
        upload_mapped(buffer, src)
    }

    fn copy_to_buffer(
        &self,
        _ctx: &mut TransferContext,
        buffer: &mut Buffer,
        size: vk::DeviceSize,
        src: &[u8],
    ) -> Result<CopyStatus, MemoryError> {
        copy_to_mapped(buffer, size, src)
    }

    fn copy_from_buffer(&self, buffer: &Buffer, size: vk::DeviceSize, dst: &mut [u8]) -> Result<(), MemoryError> {
        buffer.read_mapped(size, dst)
    }

    fn copy_buffer(&self, _ctx: &mut TransferContext, src: &Buffer, dst: &mut Buffer) -> Result<CopyStatus, MemoryError> {
        profiling::scope!("mapped buffer to buffer copy");
        if dst.size < src.size {
            return Err(MemoryError::DestinationTooSmall {
                src: src.size,
                dst: dst.size,
            });
        }
        if src.mapped_ptr.is_null() {
            return Err(MemoryError::NotMapped(src.memory_type.kind()));
        }
        if dst.mapped_ptr.is_null() {
            return Err(MemoryError::NotMapped(dst.memory_type.kind()));
        }
        // Safety: both pointers map at least `src.size` bytes (checked above),
        // and two distinct buffers never share mapped memory.
        unsafe { ptr::copy_nonoverlapping(src.mapped_ptr, dst.mapped_ptr, src.size as usize) };
        dst.used_bytes = src.used_bytes;
        Ok(CopyStatus::Complete)
    }
}

#[derive(Debug)]
pub struct HostFallbackMemory {
    property_flags: vk::MemoryPropertyFlags,
}

impl HostFallbackMemory {
    pub fn new() -> HostFallbackMemory {
        HostFallbackMemory {
            property_flags: MemoryKind::HostFallback.allocation_flags(),
        }
    }
}

impl Default for HostFallbackMemory {
    fn default() -> Self {
        HostFallbackMemory::new()
    }
}

impl MemoryType for HostFallbackMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::HostFallback
    }

    fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    fn create_buffer(
        &self,
        device: &dyn MemoryDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<RawBuffer, MemoryError> {
        create_mapped_buffer(self.property_flags, device, size, usage)
    }

    fn upload_buffer(&self, _ctx: &mut TransferContext, buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError> {
        upload_mapped(buffer, src)
    }

    fn copy_to_buffer(
        &self,
        _ctx: &mut TransferContext,
        buffer: &mut Buffer,
        size: vk::DeviceSize,
        src: &[u8],
    ) -> Result<CopyStatus, MemoryError> {
        copy_to_mapped(buffer, size, src)
    }

    fn copy_from_buffer(&self, buffer: &Buffer, size: vk::DeviceSize, dst: &mut [u8]) -> Result<(), MemoryError> {
        buffer.read_mapped(size, dst)
    }

    fn copy_buffer(&self, _ctx: &mut TransferContext, _src: &Buffer, _dst: &mut Buffer) -> Result<CopyStatus, MemoryError> {
        Err(MemoryError::CopyUnsupported(self.kind()))
    }
}

#[derive(Debug)]
pub struct HostDeviceSharedMemory {
    property_flags: vk::MemoryPropertyFlags,
}

impl HostDeviceSharedMemory {
    pub fn new(property_flags: vk::MemoryPropertyFlags) -> HostDeviceSharedMemory {
        HostDeviceSharedMemory { property_flags }
    }
}

impl MemoryType for HostDeviceSharedMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::HostDeviceShared
    }

    fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    fn create_buffer(
        &self,
        device: &dyn MemoryDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<RawBuffer, MemoryError> {
        create_mapped_buffer(self.property_flags, device, size, usage)
    }

    fn upload_buffer(&self, _ctx: &mut TransferContext, buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError> {
        upload_mapped(buffer, src)
    }

    fn copy_to_buffer(
        &self,
        _ctx: &mut TransferContext,
        buffer: &mut Buffer,
        size: vk::DeviceSize,
        src: &[u8],
    ) -> Result<CopyStatus, MemoryError> {
        copy_to_mapped(buffer, size, src)
    }

    fn copy_from_buffer(&self, buffer: &Buffer, size: vk::DeviceSize, dst: &mut [u8]) -> Result<(), MemoryError> {
        buffer.read_mapped(size, dst)
    }

    fn copy_buffer(&self, _ctx: &mut TransferContext, _src: &Buffer, _dst: &mut Buffer) -> Result<CopyStatus, MemoryError> {
        Err(MemoryError::CopyUnsupported(self.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::HostCachedMemory;
    use crate::test_device::TestDevice;
    use crate::{Buffer, CopyStatus, MemoryError, MemoryKind};
    use alloc::rc::Rc;
    use ash::vk;

    #[test]
    fn writes_at_an_offset_leave_the_cursor_alone() {
        let device = TestDevice::new();
        let memory = Rc::new(HostCachedMemory::new(MemoryKind::HostCached.allocation_flags()));
        let mut buffer = Buffer::new(&*device, memory.clone(), 8, vk::BufferUsageFlags::empty()).unwrap();
        assert_eq!(CopyStatus::Complete, memory.copy_to_buffer_at(&mut buffer, 4, 2, &[7, 8, 9]).unwrap());
        assert_eq!(0, buffer.used_bytes());
        assert_eq!(vec![0, 0, 0, 0, 7, 8, 0, 0], device.contents(buffer.handle()));
        assert!(matches!(
            memory.copy_to_buffer_at(&mut buffer, 7, 2, &[1, 1]),
            Err(MemoryError::OutOfMemory { used: 7, .. })
        ));
    }
}
