//! Batched draw-call sorting and buffer packing.
//!
//! Draw calls accumulate into pooled batches, a parallel prepare phase
//! sorts and packs them into instance buffers partitioned into same-state
//! sub-batches, and a serialized issue phase replays them against an
//! abstract [`Device`](device::Device). Batch lifecycles are guarded by an
//! atomic state machine so misuse surfaces as an error instead of a data
//! race.

pub mod batch;
pub mod bitmap;
pub mod buffer;
pub mod combine;
pub mod corner;
pub mod device;
pub mod draw_list;
pub mod error;
pub mod manager;
pub mod material;
pub mod raster;
pub mod sort;
pub mod state;

pub use batch::{Batch, BatchPool};
pub use bitmap::{
    AddRangeOptions, BitmapBatch, BitmapBatchOptions, BitmapDrawCall, BitmapVertex,
    DrawCallSortKey, TextureSet,
};
pub use buffer::{BufferGenerator, SoftwareBuffer};
pub use combine::{combine_adjacent, Combine};
pub use device::{
    BufferHandle, Device, DeviceError, FilterMode, MaterialParam, PrimitiveType, SamplerConfig,
    TextureHandle, VertexBufferBinding,
};
pub use draw_list::{DrawCallList, ListPool};
pub use error::RenderError;
pub use manager::{FrameStats, RenderManager, RenderShared};
pub use material::{Material, MaterialId, MaterialSet, RasterShader, RasterShaderKey};
pub use raster::{
    RasterFillMode, RasterShadowSettings, RasterShapeBatch, RasterShapeBatchOptions,
    RasterShapeDrawCall, RasterShapeFlags, RasterShapeType, RasterShapeVertex,
    RasterTextureCompositeMode, RasterTextureSettings,
};
pub use sort::{DeclarativeSorter, SortableDrawCall, SubBatch};
pub use state::{BatchState, LifecycleError};
