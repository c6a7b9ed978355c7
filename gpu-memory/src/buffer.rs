use alloc::rc::Rc;
use ash::vk;
use core::ptr;

use crate::device::{MemoryDevice, RawBuffer};
use crate::memory_types::{MemoryKind, MemoryType};
use crate::MemoryError;

/// A Vulkan buffer, its memory, and the memory type that decides how data
/// gets into it. Only created and destroyed through the
/// [`MemoryManager`](crate::MemoryManager).
#[derive(Debug)]
pub struct Buffer {
    pub(crate) inner: vk::Buffer,
    pub(crate) memory: vk::DeviceMemory,
    pub(crate) size: vk::DeviceSize,
    pub(crate) usage: vk::BufferUsageFlags,
    /// The write cursor: how many bytes from the start have been written.
    pub(crate) used_bytes: vk::DeviceSize,
    pub(crate) memory_type: Rc<dyn MemoryType>,
    pub(crate) mapped_ptr: *mut u8,
}

impl Buffer {
    pub(crate) fn new(
        device: &dyn MemoryDevice,
        memory_type: Rc<dyn MemoryType>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer, MemoryError> {
        let raw = memory_type.create_buffer(device, size, usage)?;
        Ok(Buffer::from_raw(raw, memory_type))
    }

    pub(crate) fn from_raw(raw: RawBuffer, memory_type: Rc<dyn MemoryType>) -> Buffer {
        debug_assert_eq!(
            memory_type.mappable(),
            !raw.mapped_ptr.is_null(),
            "buffers should be mapped exactly when their memory type is mappable",
        );
        Buffer {
            inner: raw.inner,
            memory: raw.memory,
            size: raw.size,
            usage: raw.usage,
            used_bytes: 0,
            memory_type,
            mapped_ptr: raw.mapped_ptr,
        }
    }

    pub(crate) fn into_raw(self) -> RawBuffer {
        RawBuffer {
            inner: self.inner,
            memory: self.memory,
            size: self.size,
            usage: self.usage,
            mapped_ptr: self.mapped_ptr,
        }
    }

    pub fn handle(&self) -> vk::Buffer {
        self.inner
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn used_bytes(&self) -> vk::DeviceSize {
        self.used_bytes
    }

    pub fn remaining(&self) -> vk::DeviceSize {
        self.size - self.used_bytes
    }

    pub fn memory_type(&self) -> &Rc<dyn MemoryType> {
        &self.memory_type
    }

    pub fn kind(&self) -> MemoryKind {
        self.memory_type.kind()
    }

    /// Rewinds the write cursor, so the next append writes to the start of
    /// the buffer again.
    pub fn reset(&mut self) {
        self.used_bytes = 0;
    }

    pub(crate) fn check_fits(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<(), MemoryError> {
        match offset.checked_add(size) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(MemoryError::OutOfMemory {
                identifier: format!("{:?} buffer {:?}", self.kind(), self.inner),
                used: offset,
                total: self.size,
                required: size,
            }),
        }
    }

    pub(crate) fn write_mapped(&mut self, offset: vk::DeviceSize, src: &[u8]) -> Result<(), MemoryError> {
        if self.mapped_ptr.is_null() {
            return Err(MemoryError::NotMapped(self.kind()));
        }
        self.check_fits(offset, src.len() as vk::DeviceSize)?;
        // Safety: the mapping covers the whole buffer, and the range was
        // checked to be inside it.
        unsafe {
            let dst = self.mapped_ptr.add(offset as usize);
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
        Ok(())
    }

    pub(crate) fn read_mapped(&self, size: vk::DeviceSize, dst: &mut [u8]) -> Result<(), MemoryError> {
        if self.mapped_ptr.is_null() {
            return Err(MemoryError::NotMapped(self.kind()));
        }
        if size > self.size {
            return Err(MemoryError::OutOfBounds {
                offset: 0,
                size,
                total: self.size,
            });
        }
        let total = dst.len() as vk::DeviceSize;
        let dst = dst.get_mut(..size as usize).ok_or(MemoryError::OutOfBounds { offset: 0, size, total })?;
        // Safety: `size` bytes are mapped (checked above) and `dst` is exactly
        // `size` bytes long.
        unsafe { ptr::copy_nonoverlapping(self.mapped_ptr, dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }
}

/// The first `size` bytes of `src`, for the copies that take an explicit size
/// along with the source slice.
pub(crate) fn source_range(src: &[u8], size: vk::DeviceSize) -> Result<&[u8], MemoryError> {
    let total = src.len() as vk::DeviceSize;
    src.get(..size as usize).ok_or(MemoryError::OutOfBounds { offset: 0, size, total })
}
