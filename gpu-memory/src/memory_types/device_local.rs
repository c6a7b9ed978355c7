use ash::vk;

use crate::buffer::{source_range, Buffer};
use crate::device::{BufferRequest, MemoryDevice, RawBuffer};
use crate::memory_types::{CopyStatus, MemoryKind, MemoryType, TransferContext};
use crate::MemoryError;

/// Memory only the GPU can access. Writes go through the current frame's
/// staging buffer and a transfer queue copy.
#[derive(Debug)]
pub struct DeviceLocalMemory {
    property_flags: vk::MemoryPropertyFlags,
}

impl DeviceLocalMemory {
    pub fn new(property_flags: vk::MemoryPropertyFlags) -> DeviceLocalMemory {
        DeviceLocalMemory { property_flags }
    }
}

impl MemoryType for DeviceLocalMemory {
    fn kind(&self) -> MemoryKind {
        MemoryKind::DeviceLocal
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
        device.create_buffer(&BufferRequest {
            size,
            usage: usage | vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            memory_flags: self.property_flags,
            mapped: false,
        })
    }

    #[profiling::function]
    fn upload_buffer(&self, ctx: &mut TransferContext, buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError> {
        let size = src.len() as vk::DeviceSize;
        buffer.check_fits(0, size)?;
        if src.is_empty() {
            buffer.used_bytes = 0;
            return Ok(CopyStatus::Complete);
        }
        let handle = ctx.staged_copy(src, buffer.inner, 0)?;
        buffer.used_bytes = size;
        Ok(CopyStatus::Submitted(handle))
    }

    #[profiling::function]
    fn copy_to_buffer(
        &self,
        ctx: &mut TransferContext,
        buffer: &mut Buffer,
        size: vk::DeviceSize,
        src: &[u8],
    ) -> Result<CopyStatus, MemoryError> {
        let src = source_range(src, size)?;
        let offset = buffer.used_bytes;
        buffer.check_fits(offset, size)?;
        if src.is_empty() {
            return Ok(CopyStatus::Complete);
        }
        let handle = ctx.staged_copy(src, buffer.inner, offset)?;
        buffer.used_bytes = offset + size;
        Ok(CopyStatus::Submitted(handle))
    }

    fn copy_from_buffer(&self, buffer: &Buffer, size: vk::DeviceSize, _dst: &mut [u8]) -> Result<(), MemoryError> {
        // Reading back device-local memory would need a copy into host memory
        // and a wait on the transfer, which nothing needs yet.
        log::trace!("ignored read of {} bytes from device-local buffer {:?}", size, buffer.inner);
        Ok(())
    }

    fn copy_buffer(&self, ctx: &mut TransferContext, src: &Buffer, dst: &mut Buffer) -> Result<CopyStatus, MemoryError> {
        if dst.size < src.size {
            return Err(MemoryError::DestinationTooSmall {
                src: src.size,
                dst: dst.size,
            });
        }
        let handle = ctx.transfer_queue.copy_buffer_cmd(src.inner, 0, dst.inner, 0, src.size);
        dst.used_bytes = src.used_bytes;
        Ok(CopyStatus::Submitted(handle))
    }
}
