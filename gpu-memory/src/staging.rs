//! Host-visible buffers that device-local uploads are copied through, one per
//! frame in flight.
use arrayvec::ArrayVec;
use ash::vk;
use core::ptr;

use crate::device::{MemoryDevice, RawBuffer};
use crate::memory_types::{MemoryKind, MemoryType};
use crate::MemoryError;

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// A mapped buffer written front to back during one frame, and rewound when
/// the frame's transfers are known to be done.
#[derive(Debug)]
pub struct StagingBuffer {
    raw: RawBuffer,
    /// Start of the most recent write.
    offset: vk::DeviceSize,
    used_bytes: vk::DeviceSize,
    frame_index: usize,
    kind: MemoryKind,
}

impl StagingBuffer {
    pub fn new(
        device: &dyn MemoryDevice,
        memory_type: &dyn MemoryType,
        size: vk::DeviceSize,
        frame_index: usize,
    ) -> Result<StagingBuffer, MemoryError> {
        profiling::scope!("staging buffer creation");
        if !memory_type.mappable() {
            return Err(MemoryError::NotMapped(memory_type.kind()));
        }
        let raw = memory_type.create_buffer(device, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        log::trace!("created staging buffer {} ({}) in {:?} memory", frame_index, crate::Bytes(size), memory_type.kind());
        Ok(StagingBuffer {
            raw,
            offset: 0,
            used_bytes: 0,
            frame_index,
            kind: memory_type.kind(),
        })
    }

    /// Appends `src` after the previous writes and returns the offset it was
    /// written at, to be used as the source offset of the transfer.
    pub fn copy_buffer(&mut self, src: &[u8]) -> Result<vk::DeviceSize, MemoryError> {
        let size = src.len() as vk::DeviceSize;
        if self.raw.size - self.used_bytes < size {
            return Err(MemoryError::OutOfMemory {
                identifier: format!("staging buffer {}", self.frame_index),
                used: self.used_bytes,
                total: self.raw.size,
                required: size,
            });
        }
        if self.raw.mapped_ptr.is_null() {
            return Err(MemoryError::NotMapped(self.kind));
        }
        // Safety: the whole buffer is mapped, and the write was checked to fit
        // in the unused part of it.
        unsafe {
            let dst = self.raw.mapped_ptr.add(self.used_bytes as usize);
            ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len());
        }
        self.offset = self.used_bytes;
        self.used_bytes += size;
        Ok(self.offset)
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.used_bytes = 0;
    }

    pub fn handle(&self) -> vk::Buffer {
        self.raw.inner
    }

    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    pub fn used_bytes(&self) -> vk::DeviceSize {
        self.used_bytes
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.raw.size
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub(crate) fn into_raw(self) -> RawBuffer {
        self.raw
    }
}

/// One [`StagingBuffer`] per frame in flight. The buffer for a frame must not
/// be reset until the transfers recorded from it have finished, which the
/// frame pacing outside this crate keeps track of.
#[derive(Debug, Default)]
pub struct StagingBuffers {
    buffers: ArrayVec<StagingBuffer, MAX_FRAMES_IN_FLIGHT>,
}

impl StagingBuffers {
    pub fn new(
        device: &dyn MemoryDevice,
        memory_type: &dyn MemoryType,
        frames_in_flight: usize,
        size: vk::DeviceSize,
    ) -> Result<StagingBuffers, MemoryError> {
        if frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            log::warn!("{} frames in flight requested, only {} staging buffers will be created", frames_in_flight, MAX_FRAMES_IN_FLIGHT);
        }
        let mut buffers = ArrayVec::new();
        for frame_index in 0..frames_in_flight.min(MAX_FRAMES_IN_FLIGHT) {
            match StagingBuffer::new(device, memory_type, size, frame_index) {
                Ok(buffer) => buffers.push(buffer),
                Err(err) => {
                    for buffer in buffers {
                        device.destroy_buffer(buffer.into_raw());
                    }
                    return Err(err);
                }
            }
        }
        Ok(StagingBuffers { buffers })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn current(&self, frame: usize) -> Result<&StagingBuffer, MemoryError> {
        if self.buffers.is_empty() {
            return Err(MemoryError::NoStagingBuffers);
        }
        Ok(&self.buffers[frame % self.buffers.len()])
    }

    pub fn current_mut(&mut self, frame: usize) -> Result<&mut StagingBuffer, MemoryError> {
        if self.buffers.is_empty() {
            return Err(MemoryError::NoStagingBuffers);
        }
        let count = self.buffers.len();
        Ok(&mut self.buffers[frame % count])
    }

    /// Rewinds the staging buffer used by `frame`.
    pub fn reset(&mut self, frame: usize) {
        if let Ok(buffer) = self.current_mut(frame) {
            buffer.reset();
        }
    }

    pub(crate) fn destroy(&mut self, device: &dyn MemoryDevice) {
        for buffer in self.buffers.drain(..) {
            device.destroy_buffer(buffer.into_raw());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StagingBuffers;
    use crate::test_device::{heaps, TestDevice};
    use crate::{MemoryError, MemoryTypes};
    use ash::vk::MemoryPropertyFlags as Flags;

    fn staging_buffers(device: &TestDevice, frames: usize, size: u64) -> StagingBuffers {
        let types = MemoryTypes::select(&heaps(&[Flags::DEVICE_LOCAL, Flags::HOST_VISIBLE | Flags::HOST_COHERENT]));
        StagingBuffers::new(device, &**types.host(), frames, size).unwrap()
    }

    #[test]
    fn writes_are_appended_and_return_their_offset() {
        let device = TestDevice::new();
        let mut staging = staging_buffers(&device, 2, 16);
        let buffer = staging.current_mut(0).unwrap();
        assert_eq!(0, buffer.copy_buffer(&[1, 2, 3]).unwrap());
        assert_eq!(3, buffer.copy_buffer(&[4, 5]).unwrap());
        assert_eq!(3, buffer.offset());
        assert_eq!(5, buffer.used_bytes());
        assert_eq!(&[1, 2, 3, 4, 5], &device.contents(buffer.handle())[..5]);
    }

    #[test]
    fn frames_use_their_own_buffer() {
        let device = TestDevice::new();
        let mut staging = staging_buffers(&device, 2, 16);
        staging.current_mut(0).unwrap().copy_buffer(&[1; 4]).unwrap();
        staging.current_mut(1).unwrap().copy_buffer(&[2; 6]).unwrap();
        assert_eq!(4, staging.current(2).unwrap().used_bytes());
        assert_eq!(6, staging.current(3).unwrap().used_bytes());
        assert_ne!(staging.current(0).unwrap().handle(), staging.current(1).unwrap().handle());

        staging.reset(2);
        assert_eq!(0, staging.current(0).unwrap().used_bytes());
        assert_eq!(6, staging.current(1).unwrap().used_bytes());
    }

    #[test]
    fn full_staging_buffer_rejects_writes() {
        let device = TestDevice::new();
        let mut staging = staging_buffers(&device, 1, 8);
        let buffer = staging.current_mut(0).unwrap();
        buffer.copy_buffer(&[0; 6]).unwrap();
        assert!(matches!(
            buffer.copy_buffer(&[0; 3]),
            Err(MemoryError::OutOfMemory {
                used: 6,
                total: 8,
                required: 3,
                ..
            })
        ));
        assert_eq!(6, buffer.used_bytes());
    }

    #[test]
    fn frame_count_is_capped() {
        let device = TestDevice::new();
        let staging = staging_buffers(&device, 16, 8);
        assert_eq!(super::MAX_FRAMES_IN_FLIGHT, staging.len());
        let empty = staging_buffers(&device, 0, 8);
        assert!(matches!(empty.current(0), Err(MemoryError::NoStagingBuffers)));
    }
}
