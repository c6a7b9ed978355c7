//! Owned copies of mesh data, to be uploaded into device buffers after the
//! mesh builder's own buffers have been reused.
use bytemuck::Pod;

/// How the indices of a built mesh should be drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawState {
    pub index_count: u32,
    /// Indices are implicit (0, 1, 2, ...) and there is no index data.
    pub sequential_index: bool,
    /// Only the index data changed, there is no vertex data.
    pub index_only: bool,
}

/// The output of the mesh builder, borrowed from buffers it will overwrite
/// when building the next mesh.
#[derive(Clone, Copy, Debug)]
pub struct RenderedBuffer<'a> {
    pub vertex_bytes: &'a [u8],
    pub index_bytes: &'a [u8],
    pub draw_state: DrawState,
}

impl<'a> RenderedBuffer<'a> {
    pub fn from_slices<V: Pod, I: Pod>(vertices: &'a [V], indices: &'a [I], draw_state: DrawState) -> RenderedBuffer<'a> {
        RenderedBuffer {
            vertex_bytes: bytemuck::cast_slice(vertices),
            index_bytes: bytemuck::cast_slice(indices),
            draw_state,
        }
    }
}

/// A reusable region that mesh data is copied through. Owned by whatever
/// builds the meshes, so there is one per build thread.
#[derive(Debug)]
pub struct ScratchBuffer {
    data: Vec<u8>,
}

impl ScratchBuffer {
    pub fn with_capacity(capacity: usize) -> ScratchBuffer {
        ScratchBuffer {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Copies `src` into the scratch region, and from there into a new
    /// allocation of exactly `src.len()` bytes. The scratch region grows to
    /// the next power of two if `src` does not fit.
    pub fn duplicate(&mut self, src: &[u8]) -> Box<[u8]> {
        self.data.clear();
        if src.len() > self.data.capacity() {
            let new_capacity = src.len().next_power_of_two();
            log::trace!("growing upload scratch buffer from {} to {} bytes", self.data.capacity(), new_capacity);
            self.data.reserve_exact(new_capacity);
        }
        self.data.extend_from_slice(src);
        Box::from(&self.data[..])
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        ScratchBuffer::with_capacity(crate::MemoryConfig::default().scratch_capacity)
    }
}

/// One mesh's vertex and index data, copied out of a [`RenderedBuffer`].
///
/// Must be [released](UploadBuffer::release) once the data has been uploaded.
/// Dropping an unreleased upload buffer still frees the data, but is logged as
/// a bug in the caller.
#[derive(Debug)]
pub struct UploadBuffer {
    index_count: u32,
    auto_indices: bool,
    index_only: bool,
    vertex_buffer: Option<Box<[u8]>>,
    index_buffer: Option<Box<[u8]>>,
    released: bool,
}

impl UploadBuffer {
    #[profiling::function]
    pub fn new(scratch: &mut ScratchBuffer, rendered: &RenderedBuffer) -> UploadBuffer {
        let draw_state = rendered.draw_state;
        let vertex_buffer = if !draw_state.index_only {
            Some(scratch.duplicate(rendered.vertex_bytes))
        } else {
            None
        };
        let index_buffer = if !draw_state.sequential_index {
            Some(scratch.duplicate(rendered.index_bytes))
        } else {
            None
        };
        UploadBuffer {
            index_count: draw_state.index_count,
            auto_indices: draw_state.sequential_index,
            index_only: draw_state.index_only,
            vertex_buffer,
            index_buffer,
            released: false,
        }
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn auto_indices(&self) -> bool {
        self.auto_indices
    }

    pub fn index_only(&self) -> bool {
        self.index_only
    }

    pub fn vertex_buffer(&self) -> Option<&[u8]> {
        self.vertex_buffer.as_deref()
    }

    pub fn index_buffer(&self) -> Option<&[u8]> {
        self.index_buffer.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Frees the vertex and index data. Calling this more than once does
    /// nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.vertex_buffer = None;
            self.index_buffer = None;
            self.released = true;
        }
    }
}

impl Drop for UploadBuffer {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "upload buffer dropped without being released (index count: {}, vertex data: {}, index data: {})",
                self.index_count,
                self.vertex_buffer.is_some(),
                self.index_buffer.is_some(),
            );
        }
    }
}
