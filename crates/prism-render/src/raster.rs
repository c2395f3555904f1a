//! Raster shape batching.
//!
//! A [`RasterShapeBatch`] accumulates analytically rasterized shapes
//! (ellipses, rectangles, lines, ...) and groups them into sub-batches by the
//! full shader-relevant state: shape type, blend-space flags, shadow
//! configuration, simple-vs-complex classification and texture settings.
//! Each sub-batch resolves its shader variant through the material set's
//! degradation ladder at issue time.

use std::sync::Arc;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use prism_core::profiling::profile_function;
use static_assertions::const_assert_eq;

use crate::batch::{Batch, BatchHeader};
use crate::buffer::SoftwareBuffer;
use crate::corner::{CORNER_PRIMITIVE_COUNT, CORNER_VERTEX_COUNT};
use crate::device::{
    Device, MaterialParam, PrimitiveType, SamplerConfig, TextureHandle, VertexBufferBinding,
};
use crate::draw_list::DrawCallList;
use crate::error::RenderError;
use crate::manager::RenderShared;
use crate::material::{MaterialSet, RasterShaderKey};
use crate::sort::{self, SubBatch};
use crate::state::BatchState;

/// Shape kinds with dedicated shader variants.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterShapeType {
    Ellipse = 0,
    LineSegment = 1,
    Rectangle = 2,
    Triangle = 3,
    QuadraticBezier = 4,
    Arc = 5,
}

/// Fill gradient mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RasterFillMode {
    #[default]
    Natural = 0,
    Linear = 1,
    Radial = 2,
    Along = 3,
    None = 4,
}

bitflags! {
    /// Packed shader-relevant state of one draw call; the low 16 bits hold
    /// the shape type so a single integer compare orders calls by full
    /// state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RasterShapeFlags: u32 {
        const TYPE_MASK = 0xFFFF;
        const SIMPLE = 1 << 16;
        const SHADOWED = 1 << 17;
        const BLEND_IN_LINEAR_SPACE = 1 << 18;
        const OUTPUT_IN_LINEAR_SPACE = 1 << 19;
    }
}

/// Drop-shadow configuration, part of the sub-batch state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterShadowSettings {
    pub color: [f32; 4],
    pub offset: Vec2,
    pub softness: f32,
    pub expansion: f32,
    pub fill_suppression: f32,
    pub inside: bool,
}

impl RasterShadowSettings {
    pub fn is_enabled(&self) -> bool {
        self.color[3] > 0.0
    }
}

/// How a texture composites over the procedural fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RasterTextureCompositeMode {
    #[default]
    Multiply,
    Over,
    Under,
}

/// Texture sampling configuration, part of the sub-batch state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterTextureSettings {
    pub mode: RasterTextureCompositeMode,
    /// Placement rectangle as (origin x, origin y, scale x, scale y).
    pub placement: [f32; 4],
    /// Per-call sampler override; the batch sampler applies when `None`.
    pub sampler: Option<SamplerConfig>,
}

impl RasterTextureSettings {
    fn mode_and_size(&self) -> [f32; 4] {
        let mode = match self.mode {
            RasterTextureCompositeMode::Multiply => 0.0,
            RasterTextureCompositeMode::Over => 1.0,
            RasterTextureCompositeMode::Under => 2.0,
        };
        [mode, self.placement[2], self.placement[3], 0.0]
    }
}

/// One raster shape draw request.
#[derive(Debug, Clone, Copy)]
pub struct RasterShapeDrawCall {
    pub shape: RasterShapeType,
    /// Shape control points; meaning depends on `shape`.
    pub a: Vec2,
    pub b: Vec2,
    pub c: Vec2,
    pub radius: Vec2,
    pub outline_size: f32,
    pub annular_radius: f32,
    pub fill_mode: RasterFillMode,
    pub inner_color: [f32; 4],
    pub outer_color: [f32; 4],
    pub outline_color: [f32; 4],
    pub blend_in_linear_space: bool,
    pub output_in_linear_space: bool,
    pub shadow: RasterShadowSettings,
    pub texture_settings: RasterTextureSettings,
    pub sort_key: f32,
    // Derived at add time.
    index: u32,
    simple: bool,
    packed_flags: RasterShapeFlags,
}

impl RasterShapeDrawCall {
    pub fn new(shape: RasterShapeType, a: Vec2, b: Vec2, radius: Vec2) -> Self {
        Self {
            shape,
            a,
            b,
            c: Vec2::ZERO,
            radius,
            outline_size: 0.0,
            annular_radius: 0.0,
            fill_mode: RasterFillMode::Natural,
            inner_color: [1.0, 1.0, 1.0, 1.0],
            outer_color: [1.0, 1.0, 1.0, 1.0],
            outline_color: [0.0, 0.0, 0.0, 1.0],
            blend_in_linear_space: true,
            output_in_linear_space: false,
            shadow: RasterShadowSettings::default(),
            texture_settings: RasterTextureSettings::default(),
            sort_key: 0.0,
            index: 0,
            simple: false,
            packed_flags: RasterShapeFlags::empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.a.is_finite()
            && self.b.is_finite()
            && self.c.is_finite()
            && self.radius.is_finite()
            && self.radius.x >= 0.0
            && self.radius.y >= 0.0
    }

    /// A call is simple when its fill collapses to one color; simple calls
    /// can use cheaper shader variants.
    fn classify_simple(&self) -> bool {
        self.inner_color == self.outer_color || self.fill_mode == RasterFillMode::None
    }

    fn pack_flags(&self, simple: bool) -> RasterShapeFlags {
        let mut flags = RasterShapeFlags::from_bits_retain(self.shape as u32);
        if simple {
            flags |= RasterShapeFlags::SIMPLE;
        }
        if self.shadow.is_enabled() {
            flags |= RasterShapeFlags::SHADOWED;
        }
        if self.blend_in_linear_space {
            flags |= RasterShapeFlags::BLEND_IN_LINEAR_SPACE;
        }
        if self.output_in_linear_space {
            flags |= RasterShapeFlags::OUTPUT_IN_LINEAR_SPACE;
        }
        flags
    }
}

/// Packed per-instance data consumed by the raster shape shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RasterShapeVertex {
    /// Control points a (xy) and b (zw).
    pub point_ab: [f32; 4],
    /// Control point c (xy) and radius (zw).
    pub point_c_radius: [f32; 4],
    pub inner_color: [f32; 4],
    pub outer_color: [f32; 4],
    pub outline_color: [f32; 4],
    /// outline size, annular radius, fill mode, shape type.
    pub parameters: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<RasterShapeVertex>(), 96);

impl From<&RasterShapeDrawCall> for RasterShapeVertex {
    fn from(dc: &RasterShapeDrawCall) -> Self {
        Self {
            point_ab: [dc.a.x, dc.a.y, dc.b.x, dc.b.y],
            point_c_radius: [dc.c.x, dc.c.y, dc.radius.x, dc.radius.y],
            inner_color: dc.inner_color,
            outer_color: dc.outer_color,
            outline_color: dc.outline_color,
            parameters: [
                dc.outline_size,
                dc.annular_radius,
                dc.fill_mode as u8 as f32,
                dc.shape as u16 as f32,
            ],
        }
    }
}

/// The shader-relevant state shared by one sub-batch of raster shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterSubBatchKey {
    pub shape: RasterShapeType,
    pub simple: bool,
    pub shadowed: bool,
    pub blend_in_linear_space: bool,
    pub output_in_linear_space: bool,
    pub shadow: RasterShadowSettings,
    pub texture_settings: RasterTextureSettings,
}

/// Initialization options for a raster shape batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterShapeBatchOptions {
    pub texture: Option<TextureHandle>,
    pub ramp_texture: Option<TextureHandle>,
    pub sampler: Option<SamplerConfig>,
    /// Always pick the shape-generic shader variant instead of per-shape
    /// specializations.
    pub use_ubershader: bool,
}

/// A pooled accumulator of raster shape draw calls.
pub struct RasterShapeBatch {
    header: BatchHeader,
    shared: Arc<RenderShared>,
    draw_calls: DrawCallList<RasterShapeDrawCall>,
    materials: Option<Arc<MaterialSet>>,
    texture: Option<TextureHandle>,
    ramp_texture: Option<TextureHandle>,
    sampler: Option<SamplerConfig>,
    use_ubershader: bool,
    sub_batches: Vec<SubBatch<RasterSubBatchKey>>,
    software_buffer: Option<SoftwareBuffer>,
}

impl RasterShapeBatch {
    /// Construct an empty, `Invalid` batch. Use the manager's pool instead
    /// of calling this per frame.
    pub fn new(shared: Arc<RenderShared>) -> Self {
        let draw_calls = DrawCallList::new(shared.raster_lists.clone());
        Self {
            header: BatchHeader::new(),
            shared,
            draw_calls,
            materials: None,
            texture: None,
            ramp_texture: None,
            sampler: None,
            use_ubershader: false,
            sub_batches: Vec::new(),
            software_buffer: None,
        }
    }

    /// Begin a new lifecycle cycle.
    pub fn initialize(
        &mut self,
        layer: i32,
        materials: Arc<MaterialSet>,
        options: RasterShapeBatchOptions,
    ) -> Result<(), RenderError> {
        let sequence = self.shared.next_sequence();
        self.header.initialize(layer, sequence, None)?;

        self.materials = Some(materials);
        self.texture = options.texture;
        self.ramp_texture = options.ramp_texture;
        self.sampler = options.sampler;
        self.use_ubershader = options.use_ubershader;
        self.sub_batches.clear();
        self.draw_calls.clear();
        if let Some(buffer) = self.software_buffer.take() {
            self.shared.buffers.release(buffer);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.draw_calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draw_calls.is_empty()
    }

    /// Sub-batch runs computed by the last `prepare`.
    pub fn sub_batches(&self) -> &[SubBatch<RasterSubBatchKey>] {
        &self.sub_batches
    }

    /// Append one draw call. Classification (simple flag, packed state) is
    /// derived here so sorting is a single integer compare.
    pub fn add(&mut self, mut call: RasterShapeDrawCall) -> Result<(), RenderError> {
        if !call.is_valid() {
            return Err(RenderError::InvalidDrawCall {
                index: None,
                reason: "degenerate raster shape draw call",
            });
        }
        call.index = self.draw_calls.len() as u32;
        call.simple = call.classify_simple();
        call.packed_flags = call.pack_flags(call.simple);
        self.draw_calls.push(call);
        Ok(())
    }

    fn key_of(call: &RasterShapeDrawCall) -> RasterSubBatchKey {
        RasterSubBatchKey {
            shape: call.shape,
            simple: call.simple,
            shadowed: call.shadow.is_enabled(),
            blend_in_linear_space: call.blend_in_linear_space,
            output_in_linear_space: call.output_in_linear_space,
            shadow: call.shadow,
            texture_settings: call.texture_settings,
        }
    }

    fn issue_sub_batches(&mut self, device: &mut dyn Device) -> Result<(), RenderError> {
        let materials = self
            .materials
            .as_ref()
            .ok_or(RenderError::MissingMaterial)?
            .clone();

        let buffer = self
            .software_buffer
            .as_mut()
            .ok_or(RenderError::MissingSoftwareBuffer)?;

        let (corner_vb, corner_ib) = self.shared.corner.lock().ensure(device)?;
        device.set_indices(Some(corner_ib));

        let instance_buffer = buffer.set_active(device)?;

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

        for sb in &self.sub_batches {
            let shader = materials.pick_raster_shader(RasterShaderKey {
                shape: if self.use_ubershader {
                    None
                } else {
                    Some(sb.key.shape)
                },
                simple: sb.key.simple,
                shadowed: sb.key.shadowed,
                textured: self.texture.is_some(),
                has_ramp: self.ramp_texture.is_some(),
            })?;

            device.apply_material(shader.material.id);
            device.set_material_param(MaterialParam::BlendInLinearSpace(
                sb.key.blend_in_linear_space,
            ));
            device.set_material_param(MaterialParam::OutputInLinearSpace(
                sb.key.output_in_linear_space,
            ));

            // Suppress the shadow entirely when it is disabled; otherwise
            // the shapes' bounding boxes would be pointlessly expanded.
            let (offset, softness, expansion, color) = if sb.key.shadowed {
                (
                    sb.key.shadow.offset,
                    sb.key.shadow.softness,
                    sb.key.shadow.expansion * if sb.key.shadow.inside { -1.0 } else { 1.0 },
                    sb.key.shadow.color,
                )
            } else {
                (Vec2::ZERO, 0.0, 0.0, [0.0; 4])
            };
            device.set_material_param(MaterialParam::ShadowOptions([
                offset.x,
                offset.y,
                softness,
                sb.key.shadow.fill_suppression,
            ]));
            device.set_material_param(MaterialParam::ShadowOptions2([
                expansion,
                if sb.key.shadow.inside { 1.0 } else { 0.0 },
            ]));
            device.set_material_param(MaterialParam::ShadowColorLinear(color));
            device.set_material_param(MaterialParam::TextureModeAndSize(
                sb.key.texture_settings.mode_and_size(),
            ));
            device.set_material_param(MaterialParam::TexturePlacement(
                sb.key.texture_settings.placement,
            ));

            device.set_texture(0, self.texture);
            device.set_sampler(
                0,
                sb.key
                    .texture_settings
                    .sampler
                    .or(self.sampler)
                    .unwrap_or(SamplerConfig::LINEAR_WRAP),
            );
            device.set_texture(3, self.ramp_texture);

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

            device.set_texture(0, None);
        }

        device.set_texture(3, None);
        device.set_vertex_buffers(&[]);
        device.set_indices(None);

        self.shared.stats.record_commands(self.sub_batches.len() as u64);
        Ok(())
    }
}

impl Batch for RasterShapeBatch {
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
            return Ok(());
        }

        self.shared
            .stats
            .record_primitives(count as u64 * CORNER_PRIMITIVE_COUNT as u64);

        // Order by the packed state word so equal-state calls run together;
        // the insertion index keeps equal-state calls in append order.
        let order = self.draw_calls.sort_indices_by(|a, b| {
            a.packed_flags
                .bits()
                .cmp(&b.packed_flags.bits())
                .then_with(|| a.index.cmp(&b.index))
        });

        let mut buffer =
            self.shared
                .buffers
                .allocate(count, std::mem::size_of::<RasterShapeVertex>(), 1);
        for i in 0..count {
            let call = sort::record_at(&self.draw_calls, Some(order.as_slice()), i);
            buffer.push(&RasterShapeVertex::from(call));
        }

        self.sub_batches =
            sort::build_sub_batches(&self.draw_calls, Some(order.as_slice()), Self::key_of);
        self.software_buffer = Some(buffer);

        tracing::trace!(
            draw_calls = count,
            sub_batches = self.sub_batches.len(),
            "prepared raster shape batch"
        );

        self.header.finish_prepare()
    }

    fn issue(&mut self, device: &mut dyn Device) -> Result<(), RenderError> {
        profile_function!();
        if self.draw_calls.is_empty() {
            return Ok(());
        }

        self.header.begin_issue()?;

        if self.header.is_combined {
            return Err(RenderError::BatchCombined);
        }

        let result = self.issue_sub_batches(device);

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
        self.materials = None;
        if let Some(buffer) = self.software_buffer.take() {
            self.shared.buffers.release(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(shape: RasterShapeType) -> RasterShapeDrawCall {
        RasterShapeDrawCall::new(shape, Vec2::ZERO, Vec2::ONE, Vec2::splat(2.0))
    }

    #[test]
    fn test_vertex_is_pod_sized() {
        assert_eq!(std::mem::size_of::<RasterShapeVertex>(), 96);
    }

    #[test]
    fn test_simple_classification() {
        let mut dc = call(RasterShapeType::Ellipse);
        assert!(dc.classify_simple());
        dc.outer_color = [0.0, 0.0, 0.0, 1.0];
        assert!(!dc.classify_simple());
        dc.fill_mode = RasterFillMode::None;
        assert!(dc.classify_simple());
    }

    #[test]
    fn test_packed_flags_order_by_shape_then_state() {
        let ellipse = call(RasterShapeType::Ellipse).pack_flags(false);
        let rect = call(RasterShapeType::Rectangle).pack_flags(false);
        assert!(ellipse.bits() < rect.bits());

        let mut shadowed = call(RasterShapeType::Ellipse);
        shadowed.shadow.color = [0.0, 0.0, 0.0, 1.0];
        assert!(shadowed
            .pack_flags(false)
            .contains(RasterShapeFlags::SHADOWED));
    }

    #[test]
    fn test_invalid_radius_rejected() {
        let mut dc = call(RasterShapeType::Ellipse);
        dc.radius = Vec2::new(-1.0, 1.0);
        assert!(!dc.is_valid());
    }
}
