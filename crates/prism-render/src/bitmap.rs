//! Bitmap (textured quad) batching.
//!
//! A [`BitmapBatch`] accumulates sprite draw calls, sorts them so
//! same-texture calls run together, packs them into a pooled software buffer
//! and issues one instanced draw per texture run.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use prism_core::profiling::profile_function;
use static_assertions::const_assert_eq;

use crate::batch::{Batch, BatchHeader};
use crate::buffer::SoftwareBuffer;
use crate::corner::{CORNER_PRIMITIVE_COUNT, CORNER_VERTEX_COUNT};
use crate::device::{Device, PrimitiveType, SamplerConfig, TextureHandle, VertexBufferBinding};
use crate::draw_list::DrawCallList;
use crate::error::RenderError;
use crate::manager::RenderShared;
use crate::material::Material;
use crate::sort::{self, DeclarativeSorter, SortableDrawCall, SubBatch};
use crate::state::BatchState;

/// The texture pair a bitmap draw call samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureSet {
    pub texture1: Option<TextureHandle>,
    pub texture2: Option<TextureHandle>,
}

impl TextureSet {
    pub fn single(texture: TextureHandle) -> Self {
        Self {
            texture1: Some(texture),
            texture2: None,
        }
    }

    pub fn pair(texture1: TextureHandle, texture2: TextureHandle) -> Self {
        Self {
            texture1: Some(texture1),
            texture2: Some(texture2),
        }
    }

    /// Identity used for sorting; distinct sets get distinct keys.
    fn key(&self) -> u64 {
        let t1 = self.texture1.map_or(0, |t| t.raw());
        let t2 = self.texture2.map_or(0, |t| t.raw());
        t1.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ t2
    }
}

/// Explicit ordering applied before texture grouping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawCallSortKey {
    pub order: f32,
}

impl DrawCallSortKey {
    pub fn new(order: f32) -> Self {
        Self { order }
    }
}

/// One sprite draw request.
#[derive(Debug, Clone, Copy)]
pub struct BitmapDrawCall {
    pub textures: TextureSet,
    pub position: Vec2,
    pub scale: Vec2,
    pub origin: Vec2,
    pub rotation: f32,
    /// UV rectangle as (min x, min y, max x, max y).
    pub texture_region: [f32; 4],
    pub multiply_color: [f32; 4],
    pub add_color: [f32; 4],
    pub sort_key: DrawCallSortKey,
}

impl BitmapDrawCall {
    pub fn new(texture: TextureHandle, position: Vec2) -> Self {
        Self {
            textures: TextureSet::single(texture),
            position,
            ..Self::degenerate()
        }
    }

    /// A record with no texture; invalid until one is assigned.
    pub fn degenerate() -> Self {
        Self {
            textures: TextureSet::default(),
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            origin: Vec2::ZERO,
            rotation: 0.0,
            texture_region: [0.0, 0.0, 1.0, 1.0],
            multiply_color: [1.0, 1.0, 1.0, 1.0],
            add_color: [0.0, 0.0, 0.0, 0.0],
            sort_key: DrawCallSortKey::default(),
        }
    }

    /// A draw call must reference a texture and carry finite geometry.
    pub fn is_valid(&self) -> bool {
        self.textures.texture1.is_some()
            && self.position.is_finite()
            && self.scale.is_finite()
            && self.rotation.is_finite()
    }
}

impl SortableDrawCall for BitmapDrawCall {
    fn texture_key(&self) -> u64 {
        self.textures.key()
    }

    fn sort_key(&self) -> f32 {
        self.sort_key.order
    }
}

/// Packed per-instance data consumed by the bitmap shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BitmapVertex {
    pub position: [f32; 2],
    pub scale: [f32; 2],
    pub origin: [f32; 2],
    pub rotation: f32,
    pub _pad: f32,
    pub texture_region: [f32; 4],
    pub multiply_color: [f32; 4],
    pub add_color: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<BitmapVertex>(), 80);

impl From<&BitmapDrawCall> for BitmapVertex {
    fn from(dc: &BitmapDrawCall) -> Self {
        Self {
            position: dc.position.to_array(),
            scale: dc.scale.to_array(),
            origin: dc.origin.to_array(),
            rotation: dc.rotation,
            _pad: 0.0,
            texture_region: dc.texture_region,
            multiply_color: dc.multiply_color,
            add_color: dc.add_color,
        }
    }
}

/// Initialization options for a bitmap batch.
#[derive(Debug, Clone, Copy)]
pub struct BitmapBatchOptions {
    pub sampler: SamplerConfig,
    /// Sampler for the second texture slot; defaults to `sampler`.
    pub sampler2: Option<SamplerConfig>,
    /// Sort by texture identity only and let the depth buffer establish
    /// visual order.
    pub use_depth_buffer: bool,
    /// Expected draw-call count, used to steer list allocation toward the
    /// large pool tier.
    pub capacity: Option<usize>,
}

impl Default for BitmapBatchOptions {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::LINEAR_CLAMP,
            sampler2: None,
            use_depth_buffer: false,
            capacity: None,
        }
    }
}

/// Transform options applied while appending a range of draw calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddRangeOptions {
    pub offset: Option<Vec2>,
    pub scale: Option<Vec2>,
    pub multiply_color: Option<[f32; 4]>,
    pub add_color: Option<[f32; 4]>,
    pub sort_key: Option<DrawCallSortKey>,
}

impl AddRangeOptions {
    fn is_empty(&self) -> bool {
        self.offset.is_none()
            && self.scale.is_none()
            && self.multiply_color.is_none()
            && self.add_color.is_none()
            && self.sort_key.is_none()
    }
}

/// A pooled accumulator of sprite draw calls destined for instanced draws.
pub struct BitmapBatch {
    header: BatchHeader,
    shared: Arc<RenderShared>,
    draw_calls: DrawCallList<BitmapDrawCall>,
    sampler: SamplerConfig,
    sampler2: SamplerConfig,
    use_depth_buffer: bool,
    /// Caller opt-out when input is guaranteed pre-sorted.
    pub disable_sorting: bool,
    sorter: Option<DeclarativeSorter<BitmapDrawCall>>,
    sub_batches: Vec<SubBatch<TextureSet>>,
    software_buffer: Option<SoftwareBuffer>,
}

impl BitmapBatch {
    /// Construct an empty, `Invalid` batch. Use the manager's pool instead
    /// of calling this per frame.
    pub fn new(shared: Arc<RenderShared>) -> Self {
        let draw_calls = DrawCallList::new(shared.bitmap_lists.clone());
        Self {
            header: BatchHeader::new(),
            shared,
            draw_calls,
            sampler: SamplerConfig::LINEAR_CLAMP,
            sampler2: SamplerConfig::LINEAR_CLAMP,
            use_depth_buffer: false,
            disable_sorting: false,
            sorter: None,
            sub_batches: Vec::new(),
            software_buffer: None,
        }
    }

    /// Begin a new lifecycle cycle.
    ///
    /// Errors if the batch is currently being prepared or issued, which
    /// indicates the caller reused a batch without finishing its prior use.
    pub fn initialize(
        &mut self,
        layer: i32,
        material: Arc<Material>,
        options: BitmapBatchOptions,
    ) -> Result<(), RenderError> {
        let sequence = self.shared.next_sequence();
        self.header.initialize(layer, sequence, Some(material))?;

        self.sampler = options.sampler;
        self.sampler2 = options.sampler2.unwrap_or(options.sampler);
        self.use_depth_buffer = options.use_depth_buffer;
        self.disable_sorting = false;
        self.sorter = None;
        self.sub_batches.clear();
        self.draw_calls.clear();
        if let Some(capacity) = options.capacity {
            self.draw_calls =
                DrawCallList::with_capacity_hint(self.shared.bitmap_lists.clone(), capacity);
        }
        if let Some(buffer) = self.software_buffer.take() {
            self.shared.buffers.release(buffer);
        }
        Ok(())
    }

    /// Override the default ordering with a declarative sorter. Ties still
    /// fall back to texture identity.
    pub fn set_sorter(&mut self, sorter: Option<DeclarativeSorter<BitmapDrawCall>>) {
        self.sorter = sorter;
    }

    /// Mark this batch as retained by the caller; reusable batches are never
    /// mutated by the combiner.
    pub fn set_reusable(&mut self, reusable: bool) {
        self.header.is_reusable = reusable;
    }

    pub fn set_release_after_draw(&mut self, release: bool) {
        self.header.release_after_draw = release;
    }

    pub fn len(&self) -> usize {
        self.draw_calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_calls.is_empty()
    }

    /// Whether this batch's draw calls were combined into another batch.
    pub fn is_combined(&self) -> bool {
        self.header.is_combined
    }

    pub fn material(&self) -> Option<&Arc<Material>> {
        self.header.material.as_ref()
    }

    /// Sub-batch runs computed by the last `prepare`.
    pub fn sub_batches(&self) -> &[SubBatch<TextureSet>] {
        &self.sub_batches
    }

    /// Append one draw call. Degenerate records are rejected and the batch's
    /// existing contents stay valid.
    pub fn add(&mut self, call: BitmapDrawCall) -> Result<(), RenderError> {
        if !call.is_valid() {
            return Err(RenderError::InvalidDrawCall {
                index: None,
                reason: "degenerate bitmap draw call",
            });
        }
        self.draw_calls.push(call);
        Ok(())
    }

    /// Append a range, optionally applying batch-scoped transforms. Invalid
    /// records in the range are skipped.
    pub fn add_range(&mut self, calls: &[BitmapDrawCall], options: &AddRangeOptions) {
        for call in calls {
            if !call.is_valid() {
                continue;
            }
            if options.is_empty() {
                self.draw_calls.push(*call);
                continue;
            }
            let mut call = *call;
            if let Some(scale) = options.scale {
                call.position *= scale;
                call.scale *= scale;
            }
            if let Some(offset) = options.offset {
                call.position += offset;
            }
            if let Some(color) = options.multiply_color {
                call.multiply_color = color;
            }
            if let Some(color) = options.add_color {
                call.add_color = color;
            }
            if let Some(sort_key) = options.sort_key {
                call.sort_key = sort_key;
            }
            self.draw_calls.push(call);
        }
    }

    fn issue_sub_batches(
        &mut self,
        device: &mut dyn Device,
    ) -> Result<(), RenderError> {
        if self.use_depth_buffer && !device.depth_buffer_enabled() {
            return Err(RenderError::DepthBufferDisabled);
        }

        let material = self
            .header
            .material
            .as_ref()
            .ok_or(RenderError::MissingMaterial)?;

        let buffer = self
            .software_buffer
            .as_mut()
            .ok_or(RenderError::MissingSoftwareBuffer)?;

        let (corner_vb, corner_ib) = self.shared.corner.lock().ensure(device)?;
        device.set_indices(Some(corner_ib));
        device.apply_material(material.id);

        let instance_buffer = buffer.set_active(device)?;

        // Scratch binding array, reused across sub-batches.
        let mut bindings = [
            VertexBufferBinding {
                buffer: corner_vb,
                vertex_offset: 0,
                instance_frequency: 0,
            },
            VertexBufferBinding {
                buffer: instance_buffer,
                vertex_offset: 0,
                instance_frequency: 1,
            },
        ];

        let mut bound: Option<TextureSet> = None;
        for sb in &self.sub_batches {
            // Rebind textures and samplers only when the state changes
            // between sub-batches.
            if bound != Some(sb.key) {
                device.set_texture(0, sb.key.texture1);
                device.set_texture(1, sb.key.texture2);
                device.set_sampler(0, self.sampler);
                device.set_sampler(1, self.sampler2);
                bound = Some(sb.key);
            }

            bindings[1].vertex_offset = sb.instance_offset;
            device.set_vertex_buffers(&bindings);
            device.draw_instanced_primitives(
                PrimitiveType::TriangleList,
                0,
                0,
                CORNER_VERTEX_COUNT,
                0,
                CORNER_PRIMITIVE_COUNT,
                sb.instance_count,
            );
        }

        // Unbind so no texture or buffer state leaks into unrelated draws.
        device.set_texture(0, None);
        device.set_texture(1, None);
        device.set_vertex_buffers(&[]);
        device.set_indices(None);

        self.shared.stats.record_commands(self.sub_batches.len() as u64);
        Ok(())
    }
}

impl Batch for BitmapBatch {
    fn layer(&self) -> i32 {
        self.header.layer
    }

    fn sequence(&self) -> u64 {
        self.header.sequence
    }

    fn state(&self) -> BatchState {
        self.header.state.load()
    }

    fn prepare(&mut self) -> Result<(), RenderError> {
        profile_function!();
        self.header.begin_prepare()?;

        let count = self.draw_calls.len();
        if count == 0 {
            // Nothing to sort or pack; the exchange above is the only state
            // change an empty batch sees.
            return Ok(());
        }

        self.shared
            .stats
            .record_primitives(count as u64 * CORNER_PRIMITIVE_COUNT as u64);

        let order = sort::sort_order(
            &self.draw_calls,
            self.disable_sorting,
            self.sorter.as_ref(),
            self.use_depth_buffer,
        );

        let mut buffer =
            self.shared
                .buffers
                .allocate(count, std::mem::size_of::<BitmapVertex>(), 1);
        for i in 0..count {
            let call = sort::record_at(&self.draw_calls, order.as_deref(), i);
            buffer.push(&BitmapVertex::from(call));
        }

        self.sub_batches =
            sort::build_sub_batches(&self.draw_calls, order.as_deref(), |call| call.textures);
        self.software_buffer = Some(buffer);

        tracing::trace!(
            draw_calls = count,
            sub_batches = self.sub_batches.len(),
            "prepared bitmap batch"
        );

        self.header.finish_prepare()
    }

    fn issue(&mut self, device: &mut dyn Device) -> Result<(), RenderError> {
        profile_function!();
        if self.draw_calls.is_empty() {
            // Combined-away and genuinely empty batches issue nothing.
            return Ok(());
        }

        self.header.begin_issue()?;

        if self.header.is_combined {
            return Err(RenderError::BatchCombined);
        }

        let result = self.issue_sub_batches(device);

        // The software buffer's borrow ends with issue, success or not.
        if let Some(buffer) = self.software_buffer.take() {
            self.shared.buffers.release(buffer);
        }
        result?;

        self.header.finish_issue()
    }

    fn release(&mut self) {
        self.header.release();
        self.draw_calls.clear();
        self.sub_batches.clear();
        self.sorter = None;
        if let Some(buffer) = self.software_buffer.take() {
            self.shared.buffers.release(buffer);
        }
    }
}

/// Combining policy for bitmap batches.
///
/// Two pending batches can merge only when they would issue with identical
/// device state and neither is externally retained.
pub fn can_combine(lhs: &BitmapBatch, rhs: &BitmapBatch) -> bool {
    if lhs.header.is_reusable || rhs.header.is_reusable {
        return false;
    }
    if lhs.header.is_combined || rhs.header.is_combined {
        return false;
    }
    if !lhs.header.release_after_draw || !rhs.header.release_after_draw {
        return false;
    }
    let (Some(lm), Some(rm)) = (&lhs.header.material, &rhs.header.material) else {
        return false;
    };
    lm.id == rm.id
        && lhs.header.layer == rhs.header.layer
        && lhs.use_depth_buffer == rhs.use_depth_buffer
        && lhs.sampler == rhs.sampler
        && lhs.sampler2 == rhs.sampler2
}

/// Append all of `rhs`'s draw calls onto `lhs`, clear `rhs`, and mark it
/// combined so a subsequent issue on it is a no-op.
pub fn combine(lhs: &mut BitmapBatch, rhs: &mut BitmapBatch) -> Result<(), RenderError> {
    for i in 0..rhs.draw_calls.len() {
        let call = *rhs.draw_calls.get(i);
        if !call.is_valid() {
            return Err(RenderError::InvalidDrawCall {
                index: Some(i),
                reason: "invalid draw call in combined batch",
            });
        }
        lhs.draw_calls.push(call);
    }
    rhs.draw_calls.clear();
    rhs.header.is_combined = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_pod_sized() {
        assert_eq!(std::mem::size_of::<BitmapVertex>(), 80);
        assert!(std::mem::align_of::<BitmapVertex>() <= 16);
    }

    #[test]
    fn test_texture_set_keys_distinct() {
        let a = TextureSet::single(TextureHandle::new(1));
        let b = TextureSet::single(TextureHandle::new(2));
        let c = TextureSet::pair(TextureHandle::new(1), TextureHandle::new(2));
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_degenerate_call_invalid() {
        assert!(!BitmapDrawCall::degenerate().is_valid());
        let call = BitmapDrawCall::new(TextureHandle::new(1), Vec2::new(f32::NAN, 0.0));
        assert!(!call.is_valid());
    }
}
