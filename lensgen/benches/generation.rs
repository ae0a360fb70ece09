use std::hint::black_box;
use std::sync::{Arc, Once};

use common::log_setup::{setup_logging, LogConfig};
use common::Buffer2;
use criterion::{criterion_group, criterion_main, Criterion};

use lensgen::{
    build_augmentation_transform, fast_warp, BoundaryMode, ChunkGenerator, DownsampleSpec,
    GeneratorConfig, Image, ImageSize, MemoryStore, Pool, DEFAULT_IMAGE_SIZE, DEFAULT_TARGET_SIZE,
};

static LOGGING: Once = Once::new();

fn init_logging() {
    LOGGING.call_once(|| setup_logging(&LogConfig::console("warn")));
}

fn band(tag: usize, size: ImageSize) -> Buffer2<f32> {
    Buffer2::from_fn(size.width, size.height, |x, y| {
        ((tag + x * 3 + y * 7) % 97) as f32
    })
}

fn bench_fast_warp(c: &mut Criterion) {
    init_logging();
    let image = Image::from_single_band(&band(0, DEFAULT_IMAGE_SIZE), 3);
    let ds = DownsampleSpec::center_crop(DEFAULT_IMAGE_SIZE, DEFAULT_TARGET_SIZE)
        .transform()
        .expect("center crop transform");
    let aug = build_augmentation_transform(
        1.05,
        37.0,
        3.0,
        glam::DVec2::new(1.5, -2.0),
        DEFAULT_IMAGE_SIZE,
    );
    let transform = aug.compose(&ds);

    c.bench_function("fast_warp_101_to_53x3", |b| {
        b.iter(|| {
            let warped = fast_warp(
                black_box(&image),
                &transform,
                DEFAULT_TARGET_SIZE,
                BoundaryMode::Reflect,
            )
            .expect("warp");
            black_box(warped);
        })
    });
}

fn bench_negative_chunk(c: &mut Criterion) {
    init_logging();
    let store = Arc::new(MemoryStore::new().with_raw(
        Pool::Negative,
        (0..512).map(|tag| band(tag, DEFAULT_IMAGE_SIZE)).collect(),
    ));
    let config = GeneratorConfig {
        chunk_size: 256,
        num_workers: 4,
        seed: Some(7),
        ..GeneratorConfig::default()
    };

    let mut group = c.benchmark_group("generator");
    group.sample_size(10);
    group.bench_function("negative_chunk_256", |b| {
        let mut generator =
            ChunkGenerator::negative(config.clone(), store.clone()).expect("generator");
        b.iter(|| {
            let chunk = generator.next_chunk().expect("chunk");
            black_box(chunk);
        })
    });
    group.finish();
}

criterion_group!(benches, bench_fast_warp, bench_negative_chunk);
criterion_main!(benches);
