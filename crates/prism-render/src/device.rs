//! The GPU device boundary.
//!
//! The batching core never talks to a graphics API directly; it targets the
//! object-safe [`Device`] trait. A backend wraps its API behind this trait,
//! and tests use a recording implementation. All calls are synchronous and
//! immediate on the calling thread.

use crate::material::MaterialId;

/// Opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Primitive topology for draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    TriangleList,
    TriangleStrip,
    LineList,
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Linear,
    Point,
}

/// Texture addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Clamp,
    Wrap,
    Mirror,
}

/// Sampler configuration bound alongside a texture slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerConfig {
    pub filter: FilterMode,
    pub address: AddressMode,
}

impl SamplerConfig {
    pub const LINEAR_CLAMP: Self = Self {
        filter: FilterMode::Linear,
        address: AddressMode::Clamp,
    };
    pub const LINEAR_WRAP: Self = Self {
        filter: FilterMode::Linear,
        address: AddressMode::Wrap,
    };
    pub const POINT_CLAMP: Self = Self {
        filter: FilterMode::Point,
        address: AddressMode::Clamp,
    };
}

/// One entry passed to [`Device::set_vertex_buffers`].
///
/// `instance_frequency` of 0 binds per-vertex data, 1 binds per-instance
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: BufferHandle,
    /// Offset in vertices (not bytes) into the buffer.
    pub vertex_offset: u32,
    pub instance_frequency: u32,
}

/// Shader parameter updates applied between draws.
///
/// Parameter binding convenience wrappers live outside the core; the batch
/// issue drivers only push typed values across this boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialParam {
    BlendInLinearSpace(bool),
    OutputInLinearSpace(bool),
    /// Shadow offset (xy), softness (z) and fill suppression (w).
    ShadowOptions([f32; 4]),
    /// Shadow expansion (x) and inside flag (y).
    ShadowOptions2([f32; 2]),
    ShadowColorLinear([f32; 4]),
    TextureModeAndSize([f32; 4]),
    TexturePlacement([f32; 4]),
}

/// Errors reported by a device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not provide a buffer of the requested size.
    OutOfMemory { bytes: usize },
    /// The underlying device was lost; no further resources can be created.
    DeviceLost,
    /// A handle referred to a resource the device no longer knows about.
    InvalidHandle,
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory { bytes } => {
                write!(f, "Device could not allocate a buffer of {} bytes", bytes)
            }
            Self::DeviceLost => write!(f, "Device lost"),
            Self::InvalidHandle => write!(f, "Invalid device resource handle"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// The external GPU collaborator contract.
///
/// Object-safe so the frame driver can hold a `&mut dyn Device`.
/// Implementations are not required to be thread-safe; the core only calls
/// into the device from the single issue thread.
pub trait Device {
    /// Create an immutable vertex buffer from packed bytes.
    fn create_vertex_buffer(
        &mut self,
        contents: &[u8],
        stride: usize,
    ) -> Result<BufferHandle, DeviceError>;

    /// Create an index buffer from 16-bit indices.
    fn create_index_buffer(&mut self, indices: &[u16]) -> Result<BufferHandle, DeviceError>;

    /// Bind the given vertex buffer set; an empty slice unbinds.
    fn set_vertex_buffers(&mut self, bindings: &[VertexBufferBinding]);

    /// Bind or unbind the index buffer.
    fn set_indices(&mut self, buffer: Option<BufferHandle>);

    /// Bind or unbind a texture slot.
    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>);

    /// Set the sampler configuration for a texture slot.
    fn set_sampler(&mut self, slot: u32, sampler: SamplerConfig);

    /// Make the given material's shader pipeline current.
    fn apply_material(&mut self, material: MaterialId);

    /// Update a shader parameter on the current material.
    fn set_material_param(&mut self, param: MaterialParam);

    /// Whether depth buffering is currently enabled on the device.
    fn depth_buffer_enabled(&self) -> bool {
        true
    }

    /// Issue one instanced draw replicating the bound template geometry.
    #[allow(clippy::too_many_arguments)]
    fn draw_instanced_primitives(
        &mut self,
        primitive: PrimitiveType,
        base_vertex: i32,
        min_vertex_index: u32,
        num_vertices: u32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
    );
}
