use alloc::rc::Rc;
use ash::vk;
use enum_map::EnumMap;

use crate::buffer::Buffer;
use crate::device::{FrameIndex, HeapDescriptor, MemoryDevice, TransferQueue};
use crate::memory_types::{CopyStatus, MemoryKind, MemoryLocation, MemoryType, MemoryTypes, TransferContext};
use crate::staging::StagingBuffers;
use crate::MemoryError;

#[derive(Clone, Debug)]
pub struct MemoryConfig {
    /// How many staging buffers to create, capped at
    /// [`MAX_FRAMES_IN_FLIGHT`](crate::MAX_FRAMES_IN_FLIGHT).
    pub frames_in_flight: usize,
    /// The size of each staging buffer, i.e. how much data can be uploaded to
    /// device-local memory per frame.
    pub staging_buffer_size: vk::DeviceSize,
    /// Initial capacity for [`ScratchBuffer`](crate::ScratchBuffer)s.
    pub scratch_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            frames_in_flight: 2,
            staging_buffer_size: 8 * 1024 * 1024,
            scratch_capacity: 1024,
        }
    }
}

/// Creates buffers in the memory types picked for the device and moves data
/// in and out of them, staging device-local uploads through the current
/// frame's staging buffer.
pub struct MemoryManager {
    device: Rc<dyn MemoryDevice>,
    memory_types: MemoryTypes,
    staging_buffers: StagingBuffers,
    transfer_queue: Box<dyn TransferQueue>,
    frames: Box<dyn FrameIndex>,
    allocated: EnumMap<MemoryKind, vk::DeviceSize>,
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.staging_buffers.destroy(&*self.device);
    }
}

impl MemoryManager {
    pub fn new(
        device: Rc<dyn MemoryDevice>,
        heaps: &[HeapDescriptor],
        transfer_queue: Box<dyn TransferQueue>,
        frames: Box<dyn FrameIndex>,
        config: &MemoryConfig,
    ) -> Result<MemoryManager, MemoryError> {
        profiling::scope!("memory manager creation");
        let memory_types = MemoryTypes::select(heaps);
        let staging_buffers = StagingBuffers::new(
            &*device,
            &**memory_types.host(),
            config.frames_in_flight,
            config.staging_buffer_size,
        )?;
        Ok(MemoryManager {
            device,
            memory_types,
            staging_buffers,
            transfer_queue,
            frames,
            allocated: EnumMap::default(),
        })
    }

    pub fn memory_types(&self) -> &MemoryTypes {
        &self.memory_types
    }

    pub fn gpu_memory(&self) -> &Rc<dyn MemoryType> {
        self.memory_types.gpu()
    }

    pub fn host_memory(&self) -> &Rc<dyn MemoryType> {
        self.memory_types.host()
    }

    pub fn staging_buffers(&self) -> &StagingBuffers {
        &self.staging_buffers
    }

    /// Bytes currently allocated for buffers of the given kind.
    pub fn allocated_bytes(&self, kind: MemoryKind) -> vk::DeviceSize {
        self.allocated[kind]
    }

    #[profiling::function]
    pub fn create_buffer(
        &mut self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Buffer, MemoryError> {
        let memory_type = Rc::clone(self.memory_types.get(location));
        let buffer = Buffer::new(&*self.device, memory_type, size, usage)?;
        log::trace!("created {:?} buffer {:?} ({})", buffer.kind(), buffer.inner, crate::Bytes(size));
        self.allocated[buffer.kind()] += size;
        if buffer.kind().allocation_flags().contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            crate::vram_usage::track_allocation(size);
        }
        Ok(buffer)
    }

    pub fn destroy_buffer(&mut self, buffer: Buffer) {
        let kind = buffer.kind();
        self.allocated[kind] = self.allocated[kind].saturating_sub(buffer.size);
        if kind.allocation_flags().contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            crate::vram_usage::track_free(buffer.size);
        }
        log::trace!("destroying {:?} buffer {:?}", kind, buffer.inner);
        self.device.destroy_buffer(buffer.into_raw());
    }

    /// Replaces the contents of `buffer` with `src`.
    pub fn upload_buffer(&mut self, buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError> {
        let memory_type = Rc::clone(&buffer.memory_type);
        memory_type.upload_buffer(&mut self.transfer_context(), buffer, src)
    }

    /// Appends the first `size` bytes of `src` after the data already in
    /// `buffer`.
    pub fn copy_to_buffer(&mut self, buffer: &mut Buffer, size: vk::DeviceSize, src: &[u8]) -> Result<CopyStatus, MemoryError> {
        let memory_type = Rc::clone(&buffer.memory_type);
        memory_type.copy_to_buffer(&mut self.transfer_context(), buffer, size, src)
    }

    /// Reads the first `size` bytes of `buffer` into `dst`. Does nothing for
    /// device-local buffers.
    pub fn copy_from_buffer(&self, buffer: &Buffer, size: vk::DeviceSize, dst: &mut [u8]) -> Result<(), MemoryError> {
        buffer.memory_type.copy_from_buffer(buffer, size, dst)
    }

    /// Copies all of `src` to the start of `dst`, using the strategy of the
    /// memory `src` lives in.
    pub fn copy_buffer(&mut self, src: &Buffer, dst: &mut Buffer) -> Result<CopyStatus, MemoryError> {
        let memory_type = Rc::clone(&src.memory_type);
        memory_type.copy_buffer(&mut self.transfer_context(), src, dst)
    }

    /// Rewinds the staging buffer of `frame`. Should be called once the
    /// transfers recorded during that frame have finished.
    pub fn reclaim_frame(&mut self, frame: usize) {
        self.staging_buffers.reset(frame);
    }

    fn transfer_context(&mut self) -> TransferContext<'_> {
        let frame = self.frames.current_frame();
        TransferContext::new(&mut self.staging_buffers, &mut *self.transfer_queue, frame)
    }
}
