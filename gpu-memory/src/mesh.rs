use ash::vk;

use crate::buffer::Buffer;
use crate::manager::MemoryManager;
use crate::memory_types::MemoryLocation;
use crate::upload_buffer::UploadBuffer;
use crate::MemoryError;

/// The device buffers of one mesh, created from an [`UploadBuffer`].
#[derive(Debug)]
pub struct MeshBuffers {
    pub vertex_buffer: Option<Buffer>,
    /// None if the mesh is drawn with sequential indices.
    pub index_buffer: Option<Buffer>,
    pub index_count: u32,
    pub auto_indices: bool,
}

impl MeshBuffers {
    /// Creates the vertex and index buffers for the mesh in `location` and
    /// uploads its data into them. The upload buffer is released whether or
    /// not this succeeds.
    #[profiling::function]
    pub fn upload(manager: &mut MemoryManager, mut upload: UploadBuffer, location: MemoryLocation) -> Result<MeshBuffers, MemoryError> {
        let result = MeshBuffers::create(manager, &upload, location);
        upload.release();
        result
    }

    fn create(manager: &mut MemoryManager, upload: &UploadBuffer, location: MemoryLocation) -> Result<MeshBuffers, MemoryError> {
        // Vulkan buffers can't be empty, so empty data gets no buffer.
        let vertex_buffer = match upload.vertex_buffer().filter(|data| !data.is_empty()) {
            Some(data) => Some(upload_data(manager, data, vk::BufferUsageFlags::VERTEX_BUFFER, location)?),
            None => None,
        };
        let index_buffer = match upload.index_buffer().filter(|data| !data.is_empty()) {
            Some(data) => match upload_data(manager, data, vk::BufferUsageFlags::INDEX_BUFFER, location) {
                Ok(buffer) => Some(buffer),
                Err(err) => {
                    if let Some(vertex_buffer) = vertex_buffer {
                        manager.destroy_buffer(vertex_buffer);
                    }
                    return Err(err);
                }
            },
            None => None,
        };
        Ok(MeshBuffers {
            vertex_buffer,
            index_buffer,
            index_count: upload.index_count(),
            auto_indices: upload.auto_indices(),
        })
    }

    pub fn destroy(self, manager: &mut MemoryManager) {
        for buffer in [self.vertex_buffer, self.index_buffer].into_iter().flatten() {
            manager.destroy_buffer(buffer);
        }
    }
}

fn upload_data(
    manager: &mut MemoryManager,
    data: &[u8],
    usage: vk::BufferUsageFlags,
    location: MemoryLocation,
) -> Result<Buffer, MemoryError> {
    let mut buffer = manager.create_buffer(data.len() as vk::DeviceSize, usage, location)?;
    if let Err(err) = manager.upload_buffer(&mut buffer, data) {
        manager.destroy_buffer(buffer);
        return Err(err);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::MeshBuffers;
    use crate::test_device::{heaps, TestDevice, TestTransferQueue};
    use crate::{DrawState, MemoryConfig, MemoryError, MemoryLocation, MemoryManager, RenderedBuffer, ScratchBuffer, UploadBuffer};
    use alloc::rc::Rc;
    use ash::vk;
    use ash::vk::MemoryPropertyFlags as Flags;

    fn manager(device: &Rc<TestDevice>) -> MemoryManager {
        MemoryManager::new(
            device.clone(),
            &heaps(&[Flags::DEVICE_LOCAL, Flags::HOST_VISIBLE | Flags::HOST_COHERENT | Flags::HOST_CACHED]),
            Box::new(TestTransferQueue::new(device)),
            Box::new(|| 0usize),
            &MemoryConfig {
                frames_in_flight: 1,
                staging_buffer_size: 1024,
                ..MemoryConfig::default()
            },
        )
        .unwrap()
    }

    fn upload(scratch: &mut ScratchBuffer, sequential_index: bool) -> UploadBuffer {
        let vertices = [[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let indices = [0u16, 1, 1, 0, 1, 0];
        let draw_state = DrawState {
            index_count: 6,
            sequential_index,
            index_only: false,
        };
        UploadBuffer::new(scratch, &RenderedBuffer::from_slices(&vertices, &indices, draw_state))
    }

    #[test]
    fn mesh_data_ends_up_in_device_buffers() {
        let device = TestDevice::new();
        let mut manager = manager(&device);
        let mut scratch = ScratchBuffer::default();
        let mesh = MeshBuffers::upload(&mut manager, upload(&mut scratch, false), MemoryLocation::Device).unwrap();

        let vertex_buffer = mesh.vertex_buffer.as_ref().unwrap();
        let index_buffer = mesh.index_buffer.as_ref().unwrap();
        assert_eq!(24, vertex_buffer.size());
        assert_eq!(12, index_buffer.size());
        assert!(vertex_buffer.usage().contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(index_buffer.usage().contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert_eq!(bytemuck::cast_slice::<u16, u8>(&[0, 1, 1, 0, 1, 0]), &device.contents(index_buffer.handle())[..]);
        assert_eq!(6, mesh.index_count);

        mesh.destroy(&mut manager);
        assert_eq!(1, device.live_buffers());
    }

    #[test]
    fn sequential_index_meshes_get_no_index_buffer() {
        let device = TestDevice::new();
        let mut manager = manager(&device);
        let mut scratch = ScratchBuffer::default();
        let mesh = MeshBuffers::upload(&mut manager, upload(&mut scratch, true), MemoryLocation::Host).unwrap();
        assert!(mesh.auto_indices);
        assert!(mesh.index_buffer.is_none());
        assert!(mesh.vertex_buffer.is_some());
        mesh.destroy(&mut manager);
    }

    #[test]
    fn empty_mesh_data_gets_no_buffer() {
        let device = TestDevice::new();
        let mut manager = manager(&device);
        let mut scratch = ScratchBuffer::default();
        let draw_state = DrawState {
            index_count: 3,
            sequential_index: false,
            index_only: false,
        };
        let rendered = RenderedBuffer::from_slices::<[f32; 3], u16>(&[], &[0, 1, 2], draw_state);
        let mesh = MeshBuffers::upload(&mut manager, UploadBuffer::new(&mut scratch, &rendered), MemoryLocation::Device).unwrap();
        assert!(mesh.vertex_buffer.is_none());
        assert_eq!(6, mesh.index_buffer.as_ref().unwrap().size());
        assert!(device.requests().iter().all(|request| request.size > 0));
        mesh.destroy(&mut manager);
    }

    #[test]
    fn failed_uploads_leave_nothing_behind() {
        let device = TestDevice::new();
        let mut manager = manager(&device);
        let mut scratch = ScratchBuffer::default();
        let live = device.live_buffers();

        device.fail_next_allocation();
        let result = MeshBuffers::upload(&mut manager, upload(&mut scratch, false), MemoryLocation::Device);
        assert!(matches!(result, Err(MemoryError::Allocate(..))));
        assert_eq!(live, device.live_buffers());

        // The vertex buffer is created and uploaded, then the index buffer fails.
        let requests = device.requests().len();
        device.fail_allocation_after(1);
        let result = MeshBuffers::upload(&mut manager, upload(&mut scratch, false), MemoryLocation::Device);
        assert!(matches!(result, Err(MemoryError::Allocate(..))));
        assert_eq!(requests + 2, device.requests().len());
        assert_eq!(live, device.live_buffers());
    }
}
