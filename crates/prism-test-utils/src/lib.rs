//! Test doubles for the prism renderer.
//!
//! [`RecordingDevice`] implements [`Device`] by logging every call instead
//! of talking to a GPU, keeping uploaded buffer contents so tests can assert
//! on the exact packed bytes and command sequence a batch produced.

use prism_render::device::{
    BufferHandle, Device, DeviceError, MaterialParam, PrimitiveType, SamplerConfig, TextureHandle,
    VertexBufferBinding,
};
use prism_render::material::MaterialId;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateVertexBuffer {
        handle: BufferHandle,
        bytes: usize,
        stride: usize,
    },
    CreateIndexBuffer {
        handle: BufferHandle,
        indices: usize,
    },
    SetVertexBuffers(Vec<VertexBufferBinding>),
    SetIndices(Option<BufferHandle>),
    SetTexture {
        slot: u32,
        texture: Option<TextureHandle>,
    },
    SetSampler {
        slot: u32,
        sampler: SamplerConfig,
    },
    ApplyMaterial(MaterialId),
    SetMaterialParam(MaterialParam),
    DrawInstanced {
        primitive: PrimitiveType,
        base_vertex: i32,
        min_vertex_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
    },
}

/// A [`Device`] that records calls and retains uploaded buffer payloads.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    calls: Vec<DeviceCall>,
    uploads: Vec<(BufferHandle, Vec<u8>)>,
    next_handle: u64,
    /// When set, buffer creation fails with `DeviceLost`.
    pub fail_buffer_creation: bool,
    /// Reported by `depth_buffer_enabled`.
    pub depth_enabled: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            depth_enabled: true,
            ..Self::default()
        }
    }

    fn next_handle(&mut self) -> BufferHandle {
        self.next_handle += 1;
        BufferHandle::new(self.next_handle)
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// The byte payloads of every created vertex buffer.
    pub fn uploads(&self) -> &[(BufferHandle, Vec<u8>)] {
        &self.uploads
    }

    /// The contents uploaded for a specific buffer handle.
    pub fn upload_for(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.uploads
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, data)| data.as_slice())
    }

    pub fn draw_call_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, DeviceCall::DrawInstanced { .. }))
            .count()
    }

    /// Instance counts of the recorded draws, in order.
    pub fn instance_counts(&self) -> Vec<u32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DrawInstanced { instance_count, .. } => Some(*instance_count),
                _ => None,
            })
            .collect()
    }

    /// Textures bound to a slot before each draw, in draw order.
    pub fn textures_at_draws(&self, slot: u32) -> Vec<Option<TextureHandle>> {
        let mut bound = None;
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                DeviceCall::SetTexture { slot: s, texture } if *s == slot => bound = *texture,
                DeviceCall::DrawInstanced { .. } => out.push(bound),
                _ => {}
            }
        }
        out
    }

    /// Materials applied before each draw, in draw order.
    pub fn materials_at_draws(&self) -> Vec<Option<MaterialId>> {
        let mut current = None;
        let mut out = Vec::new();
        for call in &self.calls {
            match call {
                DeviceCall::ApplyMaterial(id) => current = Some(*id),
                DeviceCall::DrawInstanced { .. } => out.push(current),
                _ => {}
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.calls.clear();
        self.uploads.clear();
    }
}

impl Device for RecordingDevice {
    fn create_vertex_buffer(
        &mut self,
        contents: &[u8],
        stride: usize,
    ) -> Result<BufferHandle, DeviceError> {
        if self.fail_buffer_creation {
            return Err(DeviceError::DeviceLost);
        }
        let handle = self.next_handle();
        self.calls.push(DeviceCall::CreateVertexBuffer {
            handle,
            bytes: contents.len(),
            stride,
        });
        self.uploads.push((handle, contents.to_vec()));
        Ok(handle)
    }

    fn create_index_buffer(&mut self, indices: &[u16]) -> Result<BufferHandle, DeviceError> {
        if self.fail_buffer_creation {
            return Err(DeviceError::DeviceLost);
        }
        let handle = self.next_handle();
        self.calls.push(DeviceCall::CreateIndexBuffer {
            handle,
            indices: indices.len(),
        });
        Ok(handle)
    }

    fn set_vertex_buffers(&mut self, bindings: &[VertexBufferBinding]) {
        self.calls
            .push(DeviceCall::SetVertexBuffers(bindings.to_vec()));
    }

    fn set_indices(&mut self, buffer: Option<BufferHandle>) {
        self.calls.push(DeviceCall::SetIndices(buffer));
    }

    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>) {
        self.calls.push(DeviceCall::SetTexture { slot, texture });
    }

    fn set_sampler(&mut self, slot: u32, sampler: SamplerConfig) {
        self.calls.push(DeviceCall::SetSampler { slot, sampler });
    }

    fn apply_material(&mut self, material: MaterialId) {
        self.calls.push(DeviceCall::ApplyMaterial(material));
    }

    fn set_material_param(&mut self, param: MaterialParam) {
        self.calls.push(DeviceCall::SetMaterialParam(param));
    }

    fn depth_buffer_enabled(&self) -> bool {
        self.depth_enabled
    }

    fn draw_instanced_primitives(
        &mut self,
        primitive: PrimitiveType,
        base_vertex: i32,
        min_vertex_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
    ) {
        self.calls.push(DeviceCall::DrawInstanced {
            primitive,
            base_vertex,
            min_vertex_index,
            num_vertices,
            start_index,
            primitive_count,
            instance_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut device = RecordingDevice::new();
        let vb = device.create_vertex_buffer(&[0u8; 16], 16).unwrap();
        device.set_texture(0, Some(TextureHandle::new(7)));
        device.draw_instanced_primitives(PrimitiveType::TriangleList, 0, 0, 4, 0, 2, 3);
        assert_eq!(device.draw_call_count(), 1);
        assert_eq!(device.instance_counts(), vec![3]);
        assert_eq!(device.upload_for(vb), Some(&[0u8; 16][..]));
        assert_eq!(
            device.textures_at_draws(0),
            vec![Some(TextureHandle::new(7))]
        );
    }

    #[test]
    fn test_buffer_creation_failure() {
        let mut device = RecordingDevice::new();
        device.fail_buffer_creation = true;
        assert_eq!(
            device.create_vertex_buffer(&[], 1),
            Err(DeviceError::DeviceLost)
        );
    }
}
