use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use prism_render::{
    Batch, BitmapBatchOptions, BitmapDrawCall, DrawCallSortKey, Material, RenderManager,
    TextureHandle,
};

fn fill(manager: &RenderManager, count: usize) -> prism_render::BitmapBatch {
    let material = Material::new(1, "bitmap");
    let mut batch = manager
        .acquire_bitmap_batch(0, material, BitmapBatchOptions::default())
        .unwrap();
    for i in 0..count {
        let mut dc = BitmapDrawCall::new(
            TextureHandle::new(1 + (i % 8) as u64),
            Vec2::new(i as f32, 0.0),
        );
        dc.sort_key = DrawCallSortKey::new((i % 16) as f32);
        batch.add(dc).unwrap();
    }
    batch
}

fn bench_prepare(c: &mut Criterion) {
    let manager = RenderManager::new();
    let mut group = c.benchmark_group("prepare");
    for count in [256usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || fill(&manager, count),
                |mut batch| {
                    batch.prepare().unwrap();
                    black_box(batch.sub_batches().len());
                    manager.release_bitmap_batch(batch);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_prepare);
criterion_main!(benches);
