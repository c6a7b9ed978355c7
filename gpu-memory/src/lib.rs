//! GPU memory management for a Vulkan renderer: picks the memory types to
//! allocate buffers from, and moves data into them either by writing through
//! a mapped pointer or by staging it and recording a transfer queue copy.
//!
//! Also contains [`UploadBuffer`], which holds a copy of a mesh's vertex and
//! index data between the mesh builder and the upload into device buffers.

extern crate alloc;

// internal modules:

#[cfg(test)]
mod test_device;

// public-facing modules:

mod vram_usage {
    use core::sync::atomic::{AtomicU64, Ordering};
    pub(crate) static ALLOCATED: AtomicU64 = AtomicU64::new(0);
    pub(crate) static ALLOCATED_PEAK: AtomicU64 = AtomicU64::new(0);

    pub(crate) fn track_allocation(size: u64) {
        let allocated = ALLOCATED.fetch_add(size, Ordering::Relaxed) + size;
        ALLOCATED_PEAK.fetch_max(allocated, Ordering::Relaxed);
    }

    pub(crate) fn track_free(size: u64) {
        let _ = ALLOCATED.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |allocated| Some(allocated.saturating_sub(size)));
    }

    /// Returns the amount of device-local memory currently allocated for
    /// buffers created through a [`MemoryManager`](crate::MemoryManager).
    pub fn get_allocated_vram() -> u64 {
        ALLOCATED.load(Ordering::Relaxed)
    }
    pub fn get_allocated_vram_peak() -> u64 {
        ALLOCATED_PEAK.load(Ordering::Relaxed)
    }
}
pub use vram_usage::{get_allocated_vram, get_allocated_vram_peak};

mod display_utils {
    use core::fmt::{Display, Formatter, Result};

    /// Wrapper around u64 for pretty-printing byte amount with the appropriate
    /// size prefix (KiB, MiB, etc.).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Bytes(pub u64);

    impl Display for Bytes {
        fn fmt(&self, fmt: &mut Formatter) -> Result {
            const KIBI: u64 = 1_024;
            const MEBI: u64 = KIBI * KIBI;
            const GIBI: u64 = MEBI * KIBI;
            const TIBI: u64 = GIBI * KIBI;
            match self.0 {
                bytes if bytes < KIBI => write!(fmt, "{:.0} bytes", bytes as f32),
                bytes if bytes < MEBI => write!(fmt, "{:.2} KiB", bytes as f32 / KIBI as f32),
                bytes if bytes < GIBI => write!(fmt, "{:.2} MiB", bytes as f32 / MEBI as f32),
                bytes if bytes < TIBI => write!(fmt, "{:.2} GiB", bytes as f32 / GIBI as f32),
                bytes => write!(fmt, "{:.3} TiB", bytes as f32 / TIBI as f32),
            }
        }
    }

}
pub use display_utils::*;

mod error;
pub use error::MemoryError;

mod device;
pub use device::{BufferRequest, FrameIndex, HeapDescriptor, MemoryDevice, RawBuffer, TransferHandle, TransferQueue};

mod memory_types;
pub use memory_types::{
    CopyStatus, DeviceLocalMemory, HostCachedMemory, HostDeviceSharedMemory, HostFallbackMemory, MemoryKind, MemoryLocation,
    MemoryType, MemoryTypes, TransferContext,
};

mod buffer;
pub use buffer::Buffer;

mod staging;
pub use staging::{StagingBuffer, StagingBuffers, MAX_FRAMES_IN_FLIGHT};

mod upload_buffer;
pub use upload_buffer::{DrawState, RenderedBuffer, ScratchBuffer, UploadBuffer};

mod manager;
pub use manager::{MemoryConfig, MemoryManager};

mod mesh;
pub use mesh::MeshBuffers;

pub mod vulkan;

pub use ash::vk;
