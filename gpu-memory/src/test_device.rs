//! A [`MemoryDevice`] backed by host allocations, and a transfer queue that
//! executes its copies immediately, for testing without a GPU.

use alloc::rc::Rc;
use ash::vk;
use ash::vk::Handle;
use core::cell::{Cell, RefCell};
use core::ptr;
use hashbrown::HashMap;

use crate::device::{BufferRequest, HeapDescriptor, MemoryDevice, RawBuffer, TransferHandle, TransferQueue};
use crate::{Bytes, MemoryError};

pub(crate) type Command = (vk::Buffer, vk::DeviceSize, vk::Buffer, vk::DeviceSize, vk::DeviceSize);

pub(crate) fn heaps(flags: &[vk::MemoryPropertyFlags]) -> Vec<HeapDescriptor> {
    flags
        .iter()
        .enumerate()
        .map(|(i, &property_flags)| HeapDescriptor {
            property_flags,
            index: i as u32,
        })
        .collect()
}

struct Allocation {
    data: *mut [u8],
}

impl Allocation {
    fn ptr(&self) -> *mut u8 {
        self.data as *mut u8
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Default)]
pub(crate) struct TestDevice {
    allocations: RefCell<HashMap<u64, Allocation>>,
    requests: RefCell<Vec<BufferRequest>>,
    commands: RefCell<Vec<Command>>,
    next_handle: Cell<u64>,
    /// How many allocations succeed before the next one fails.
    fail_after: Cell<Option<usize>>,
}

impl TestDevice {
    pub(crate) fn new() -> Rc<TestDevice> {
        Rc::new(TestDevice::default())
    }

    /// Every request passed to `create_buffer`, oldest first.
    pub(crate) fn requests(&self) -> Vec<BufferRequest> {
        self.requests.borrow().clone()
    }

    /// Every copy recorded by a [`TestTransferQueue`] of this device.
    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.borrow().clone()
    }

    pub(crate) fn contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        let allocations = self.allocations.borrow();
        let allocation = &allocations[&buffer.as_raw()];
        // Safety: the allocation is alive while it is in the map.
        unsafe { core::slice::from_raw_parts(allocation.ptr(), allocation.len()) }.to_vec()
    }

    pub(crate) fn live_buffers(&self) -> usize {
        self.allocations.borrow().len()
    }

    pub(crate) fn fail_next_allocation(&self) {
        self.fail_allocation_after(0);
    }

    pub(crate) fn fail_allocation_after(&self, successes: usize) {
        self.fail_after.set(Some(successes));
    }

    fn allocation_ptr(&self, buffer: vk::Buffer, offset: vk::DeviceSize, size: vk::DeviceSize) -> *mut u8 {
        let allocations = self.allocations.borrow();
        let allocation = &allocations[&buffer.as_raw()];
        assert!(offset + size <= allocation.len() as u64, "copy out of bounds of {:?}", buffer);
        // Safety: checked to be in bounds above.
        unsafe { allocation.ptr().add(offset as usize) }
    }
}

impl MemoryDevice for TestDevice {
    fn create_buffer(&self, request: &BufferRequest) -> Result<RawBuffer, MemoryError> {
        self.requests.borrow_mut().push(*request);
        match self.fail_after.get() {
            Some(0) => {
                self.fail_after.set(None);
                return Err(MemoryError::Allocate(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY, Bytes(request.size)));
            }
            Some(n) => self.fail_after.set(Some(n - 1)),
            None => {}
        }
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        let data = Box::into_raw(vec![0u8; request.size as usize].into_boxed_slice());
        let allocation = Allocation { data };
        let mut raw = RawBuffer::unmapped(vk::Buffer::from_raw(handle), vk::DeviceMemory::from_raw(handle), request);
        if request.mapped {
            raw.mapped_ptr = allocation.ptr();
        }
        self.allocations.borrow_mut().insert(handle, allocation);
        Ok(raw)
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        let allocation = self.allocations.borrow_mut().remove(&buffer.inner.as_raw());
        let allocation = allocation.expect("destroyed a buffer that was not created by this device");
        // Safety: created by Box::into_raw in create_buffer, and removed from
        // the map so it is not freed twice.
        drop(unsafe { Box::from_raw(allocation.data) });
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        for (_, allocation) in self.allocations.get_mut().drain() {
            // Safety: see destroy_buffer.
            drop(unsafe { Box::from_raw(allocation.data) });
        }
    }
}

pub(crate) struct TestTransferQueue {
    device: Rc<TestDevice>,
    next_handle: u64,
}

impl TestTransferQueue {
    pub(crate) fn new(device: &Rc<TestDevice>) -> TestTransferQueue {
        TestTransferQueue {
            device: Rc::clone(device),
            next_handle: 0,
        }
    }
}

impl TransferQueue for TestTransferQueue {
    fn copy_buffer_cmd(
        &mut self,
        src: vk::Buffer,
        src_offset: vk::DeviceSize,
        dst: vk::Buffer,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> TransferHandle {
        let src_ptr = self.device.allocation_ptr(src, src_offset, size);
        let dst_ptr = self.device.allocation_ptr(dst, dst_offset, size);
        // Safety: both ranges were bounds checked, and ptr::copy allows overlap.
        unsafe { ptr::copy(src_ptr, dst_ptr, size as usize) };
        self.device.commands.borrow_mut().push((src, src_offset, dst, dst_offset, size));
        self.next_handle += 1;
        TransferHandle(self.next_handle)
    }
}
