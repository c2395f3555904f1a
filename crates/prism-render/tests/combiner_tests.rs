//! Tests for folding adjacent same-state bitmap batches.

use glam::Vec2;
use prism_render::{
    combine_adjacent, Batch, BitmapBatch, BitmapBatchOptions, BitmapDrawCall, BitmapVertex,
    Combine, DrawCallSortKey, Material, RenderError, RenderManager, SamplerConfig, TextureHandle,
};
use prism_test_utils::RecordingDevice;

fn call(x: f32) -> BitmapDrawCall {
    let mut dc = BitmapDrawCall::new(TextureHandle::new(1), Vec2::new(x, 0.0));
    dc.sort_key = DrawCallSortKey::new(0.0);
    dc
}

fn batch_with(
    manager: &RenderManager,
    layer: i32,
    material: &std::sync::Arc<Material>,
    options: BitmapBatchOptions,
    xs: &[f32],
) -> BitmapBatch {
    let mut batch = manager
        .acquire_bitmap_batch(layer, material.clone(), options)
        .unwrap();
    for &x in xs {
        batch.add(call(x)).unwrap();
    }
    batch
}

#[test]
fn test_combined_batch_keeps_append_order() {
    let manager = RenderManager::new();
    let material = Material::new(1, "bitmap");
    let mut a = batch_with(
        &manager,
        0,
        &material,
        BitmapBatchOptions::default(),
        &[1.0, 2.0],
    );
    let mut b = batch_with(
        &manager,
        0,
        &material,
        BitmapBatchOptions::default(),
        &[3.0, 4.0],
    );

    assert!(BitmapBatch::can_combine(&a, &b));
    BitmapBatch::combine(&mut a, &mut b).unwrap();
    assert_eq!(a.len(), 4);
    assert!(b.is_empty());
    assert!(b.is_combined());

    a.disable_sorting = true;
    a.prepare().unwrap();
    let mut device = RecordingDevice::new();
    a.issue(&mut device).unwrap();

    let (_, bytes) = device.uploads().last().unwrap();
    let xs: Vec<f32> = bytemuck::cast_slice::<u8, BitmapVertex>(bytes)
        .iter()
        .map(|v| v.position[0])
        .collect();
    assert_eq!(xs, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_combined_source_issue_is_a_no_op() {
    let manager = RenderManager::new();
    let material = Material::new(1, "bitmap");
    let mut a = batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[1.0]);
    let mut b = batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[2.0]);
    BitmapBatch::combine(&mut a, &mut b).unwrap();

    b.prepare().unwrap();
    let mut device = RecordingDevice::new();
    b.issue(&mut device).unwrap();
    assert!(device.calls().is_empty());
}

#[test]
fn test_combine_adjacent_folds_runs() {
    let manager = RenderManager::new();
    let material = Material::new(1, "bitmap");
    let other = Material::new(2, "bitmap_other");

    let mut batches = vec![
        batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[1.0]),
        batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[2.0]),
        batch_with(&manager, 0, &other, BitmapBatchOptions::default(), &[3.0]),
        batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[4.0]),
    ];
    let combined = combine_adjacent(batches.as_mut_slice()).unwrap();

    // Only the leading run folds; the batch after the incompatible one
    // becomes a new head and is never merged backwards.
    assert_eq!(combined, 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[2].len(), 1);
    assert_eq!(batches[3].len(), 1);
}

#[test]
fn test_rejects_mismatched_state() {
    let manager = RenderManager::new();
    let material = Material::new(1, "bitmap");
    let other = Material::new(2, "bitmap_other");
    let base = BitmapBatchOptions::default();

    let a = batch_with(&manager, 0, &material, base, &[1.0]);

    let different_layer = batch_with(&manager, 1, &material, base, &[2.0]);
    assert!(!BitmapBatch::can_combine(&a, &different_layer));

    let different_material = batch_with(&manager, 0, &other, base, &[2.0]);
    assert!(!BitmapBatch::can_combine(&a, &different_material));

    let different_sampler = batch_with(
        &manager,
        0,
        &material,
        BitmapBatchOptions {
            sampler: SamplerConfig::POINT_CLAMP,
            ..base
        },
        &[2.0],
    );
    assert!(!BitmapBatch::can_combine(&a, &different_sampler));

    let depth = batch_with(
        &manager,
        0,
        &material,
        BitmapBatchOptions {
            use_depth_buffer: true,
            ..base
        },
        &[2.0],
    );
    assert!(!BitmapBatch::can_combine(&a, &depth));

    let mut reusable = batch_with(&manager, 0, &material, base, &[2.0]);
    reusable.set_reusable(true);
    assert!(!BitmapBatch::can_combine(&a, &reusable));
}

#[test]
fn test_issue_on_drained_but_uncombined_head_errors() {
    let manager = RenderManager::new();
    let material = Material::new(1, "bitmap");
    let mut a = batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[1.0]);
    let mut b = batch_with(&manager, 0, &material, BitmapBatchOptions::default(), &[2.0]);
    BitmapBatch::combine(&mut a, &mut b).unwrap();

    // Pathological direct-issue on a combined source that still holds
    // calls; forcing one in reports the combined flag as an error.
    a.prepare().unwrap();
    let mut swapped = RecordingDevice::new();
    a.issue(&mut swapped).unwrap();
    drop(swapped);

    b.add(call(9.0)).unwrap();
    b.prepare().unwrap();
    let mut device = RecordingDevice::new();
    assert!(matches!(
        b.issue(&mut device),
        Err(RenderError::BatchCombined)
    ));
}
