//! Memory type selection, and the upload and copy strategy of each kind of
//! memory.
use alloc::rc::Rc;
use ash::vk;
use core::fmt::Debug;

use crate::buffer::Buffer;
use crate::device::{HeapDescriptor, MemoryDevice, RawBuffer, TransferHandle, TransferQueue};
use crate::staging::StagingBuffers;
use crate::MemoryError;

mod device_local;
mod host;

pub use device_local::DeviceLocalMemory;
pub use host::{HostCachedMemory, HostDeviceSharedMemory, HostFallbackMemory};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, enum_map::Enum)]
pub enum MemoryKind {
    /// Only accessible by the GPU, written via staging buffers.
    DeviceLocal,
    HostCached,
    /// Uncached host memory, used when no cached host memory type exists.
    HostFallback,
    /// Device-local memory which is also host-visible, used as GPU memory on
    /// devices without a purely device-local memory type.
    HostDeviceShared,
}

/// Where buffers should preferably live, see [`MemoryTypes::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryLocation {
    Device,
    Host,
}

impl MemoryKind {
    pub const fn mappable(self) -> bool {
        !matches!(self, MemoryKind::DeviceLocal)
    }

    pub const fn location(self) -> MemoryLocation {
        match self {
            MemoryKind::DeviceLocal => MemoryLocation::Device,
            MemoryKind::HostCached | MemoryKind::HostFallback | MemoryKind::HostDeviceShared => MemoryLocation::Host,
        }
    }

    /// The flags requested from the device when allocating memory of this kind.
    pub fn allocation_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryKind::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryKind::HostCached => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT | vk::MemoryPropertyFlags::HOST_CACHED
            }
            MemoryKind::HostFallback => vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            MemoryKind::HostDeviceShared => vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        }
    }
}

/// How a copy was carried out. Host copies are done when the call returns,
/// transfer queue copies are done once the queue has been submitted and
/// finished executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyStatus {
    Complete,
    Submitted(TransferHandle),
}

/// The parts of the frame state that staged copies need: the current frame's
/// staging buffer and the transfer queue to record copies into.
pub struct TransferContext<'a> {
    pub(crate) staging_buffers: &'a mut StagingBuffers,
    pub(crate) transfer_queue: &'a mut dyn TransferQueue,
    pub(crate) frame: usize,
}

impl<'a> TransferContext<'a> {
    pub fn new(staging_buffers: &'a mut StagingBuffers, transfer_queue: &'a mut dyn TransferQueue, frame: usize) -> TransferContext<'a> {
        TransferContext {
            staging_buffers,
            transfer_queue,
            frame,
        }
    }

    /// Writes `src` into the current frame's staging buffer and records a
    /// copy from there to `dst` at `dst_offset`.
    pub(crate) fn staged_copy(&mut self, src: &[u8], dst: vk::Buffer, dst_offset: vk::DeviceSize) -> Result<TransferHandle, MemoryError> {
        let staging_buffer = self.staging_buffers.current_mut(self.frame)?;
        let src_offset = staging_buffer.copy_buffer(src)?;
        log::trace!(
            "copy {} bytes from staging buffer {} (offset {}) to {:?} (offset {})",
            src.len(),
            staging_buffer.frame_index(),
            src_offset,
            dst,
            dst_offset,
        );
        let staging_buffer = staging_buffer.handle();
        Ok(self
            .transfer_queue
            .copy_buffer_cmd(staging_buffer, src_offset, dst, dst_offset, src.len() as vk::DeviceSize))
    }
}

/// The operations whose implementation depends on the kind of memory a
/// buffer lives in. Selected once by [`MemoryTypes::select`] and shared by
/// every buffer of that kind.
pub trait MemoryType: Debug {
    fn kind(&self) -> MemoryKind;

    /// The property flags of the device memory type this was selected from.
    fn property_flags(&self) -> vk::MemoryPropertyFlags;

    fn mappable(&self) -> bool {
        self.kind().mappable()
    }

    fn create_buffer(
        &self,
        device: &dyn MemoryDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<RawBuffer, MemoryError>;

    /// Writes all of `src` to the start of the buffer.
    fn upload_buffer(&self, ctx: &mut TransferContext, buffer: &mut Buffer, src: &[u8]) -> Result<CopyStatus, MemoryError>;

    /// Appends the first `size` bytes of `src` after the buffer's used bytes.
    fn copy_to_buffer(
        &self,
        ctx: &mut TransferContext,
        buffer: &mut Buffer,
        size: vk::DeviceSize,
        src: &[u8],
    ) -> Result<CopyStatus, MemoryError>;

    /// Reads the first `size` bytes of the buffer into the start of `dst`.
    fn copy_from_buffer(&self, buffer: &Buffer, size: vk::DeviceSize, dst: &mut [u8]) -> Result<(), MemoryError>;

    /// Copies the whole `src` buffer to the start of `dst`.
    fn copy_buffer(&self, ctx: &mut TransferContext, src: &Buffer, dst: &mut Buffer) -> Result<CopyStatus, MemoryError>;
}

/// The memory types picked for this device: `gpu` for resources the GPU reads
/// often, `host` for resources the CPU writes or reads back.
#[derive(Clone, Debug)]
pub struct MemoryTypes {
    gpu: Rc<dyn MemoryType>,
    host: Rc<dyn MemoryType>,
}

impl MemoryTypes {
    /// Picks the GPU and host memory types out of the device's memory types.
    /// Both are always picked: devices without purely device-local memory get
    /// device-local host-visible memory, or failing that, host memory.
    pub fn select(heaps: &[HeapDescriptor]) -> MemoryTypes {
        profiling::scope!("memory type selection");
        let device_local = MemoryKind::DeviceLocal.allocation_flags();
        let host_cached = MemoryKind::HostCached.allocation_flags();

        let mut gpu: Option<Rc<dyn MemoryType>> = None;
        let mut host: Option<Rc<dyn MemoryType>> = None;
        for heap in heaps {
            if gpu.is_none() && heap.property_flags == device_local {
                gpu = Some(Rc::new(DeviceLocalMemory::new(heap.property_flags)));
            }
            if host.is_none() && heap.property_flags == host_cached {
                host = Some(Rc::new(HostCachedMemory::new(heap.property_flags)));
            }
        }

        let host: Rc<dyn MemoryType> = match host {
            Some(host) => host,
            None => {
                log::debug!("no cached host memory type found, falling back to uncached host memory");
                Rc::new(HostFallbackMemory::new())
            }
        };

        let gpu: Rc<dyn MemoryType> = match gpu {
            Some(gpu) => gpu,
            None => {
                let shared = MemoryKind::HostDeviceShared.allocation_flags();
                if let Some(heap) = heaps.iter().find(|heap| heap.property_flags.contains(shared)) {
                    log::debug!("no device-local memory type found, using shared memory type {}", heap.index);
                    Rc::new(HostDeviceSharedMemory::new(heap.property_flags))
                } else {
                    log::debug!("no device-local memory type found, using host memory for gpu resources");
                    Rc::clone(&host)
                }
            }
        };

        log::debug!("gpu memory: {:?}, host memory: {:?}", gpu, host);
        MemoryTypes { gpu, host }
    }

    pub fn gpu(&self) -> &Rc<dyn MemoryType> {
        &self.gpu
    }

    pub fn host(&self) -> &Rc<dyn MemoryType> {
        &self.host
    }

    pub fn get(&self, location: MemoryLocation) -> &Rc<dyn MemoryType> {
        match location {
            MemoryLocation::Device => &self.gpu,
            MemoryLocation::Host => &self.host,
        }
    }
}
