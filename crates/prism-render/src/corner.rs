//! The shared corner-quad template geometry.
//!
//! Every instanced draw in the pipeline replicates the same 4-vertex quad;
//! per-instance data supplies position, extents and colors. The template is
//! created through the device once, on first use during issue, and reused by
//! all batches of a kind.

use bytemuck::{Pod, Zeroable};

use crate::device::{BufferHandle, Device, DeviceError};

/// Vertex count of the template quad.
pub const CORNER_VERTEX_COUNT: u32 = 4;
/// Index count of the template quad (two triangles).
pub const CORNER_INDEX_COUNT: u32 = 6;
/// Primitive count of the template quad.
pub const CORNER_PRIMITIVE_COUNT: u32 = 2;

/// One corner of the unit quad; the shader scales it by the instance extents.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CornerVertex {
    pub corner_weight: [f32; 2],
}

const CORNER_VERTICES: [CornerVertex; 4] = [
    CornerVertex { corner_weight: [0.0, 0.0] },
    CornerVertex { corner_weight: [1.0, 0.0] },
    CornerVertex { corner_weight: [1.0, 1.0] },
    CornerVertex { corner_weight: [0.0, 1.0] },
];

const CORNER_INDICES: [u16; 6] = [0, 1, 3, 1, 2, 3];

/// Lazily created vertex/index buffers for the template quad.
#[derive(Debug, Default)]
pub struct CornerBuffer {
    vertices: Option<BufferHandle>,
    indices: Option<BufferHandle>,
}

impl CornerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the hardware buffers, creating them on first use.
    pub fn ensure(
        &mut self,
        device: &mut dyn Device,
    ) -> Result<(BufferHandle, BufferHandle), DeviceError> {
        if self.vertices.is_none() {
            let vertices = device.create_vertex_buffer(
                bytemuck::cast_slice(&CORNER_VERTICES),
                std::mem::size_of::<CornerVertex>(),
            )?;
            let indices = device.create_index_buffer(&CORNER_INDICES)?;
            self.vertices = Some(vertices);
            self.indices = Some(indices);
        }
        match (self.vertices, self.indices) {
            (Some(v), Some(i)) => Ok((v, i)),
            _ => Err(DeviceError::InvalidHandle),
        }
    }

    /// Forget the device buffers (device loss / teardown).
    pub fn invalidate(&mut self) {
        self.vertices = None;
        self.indices = None;
    }
}
