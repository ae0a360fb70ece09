//! Fixtures shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Buffer2;

use crate::config::{AugmentationParams, DownsampleSpec, GeneratorConfig, ImageSize};
use crate::image::Image;
use crate::store::{MemoryStore, Pool, SampleStore, StoreError};

pub(crate) fn init_tracing() {
    common::log_setup::init_test_logging();
}

/// Small, fast, seeded configuration on a 16x16 grid with one 8x8 center crop.
pub(crate) fn small_config() -> GeneratorConfig {
    let image_size = ImageSize::square(16);
    GeneratorConfig {
        chunk_size: 8,
        num_chunks: Some(1),
        image_size,
        channels: 3,
        augmentation: AugmentationParams {
            zoom_range: (1.0 / 1.1, 1.1),
            rotation_range: (0.0, 360.0),
            shear_range: (-5.0, 5.0),
            translation_range: (-2.0, 2.0),
            allow_flip: true,
        },
        downsampling: vec![DownsampleSpec::center_crop(image_size, ImageSize::square(8))],
        num_workers: 2,
        loadsize: 2,
        seed: Some(1234),
        ..GeneratorConfig::default()
    }
}

/// Ramp offset by `tag`, strictly positive everywhere.
pub(crate) fn gradient_band(tag: usize, size: ImageSize) -> Buffer2<f32> {
    Buffer2::from_fn(size.width, size.height, |x, y| {
        (tag * 1000 + y * size.width + x + 1) as f32
    })
}

pub(crate) fn gradient_store(count: usize, size: ImageSize) -> MemoryStore {
    gradient_store_in(Pool::Negative, count, size)
}

pub(crate) fn gradient_store_in(pool: Pool, count: usize, size: ImageSize) -> MemoryStore {
    MemoryStore::new().with_raw(
        pool,
        (0..count).map(|tag| gradient_band(tag, size)).collect(),
    )
}

/// Raw lens and source pools of `count` gradients each.
pub(crate) fn positive_store(count: usize, size: ImageSize) -> MemoryStore {
    MemoryStore::new()
        .with_raw(
            Pool::Lens,
            (0..count).map(|tag| gradient_band(tag, size)).collect(),
        )
        .with_raw(
            Pool::Source,
            (0..count).map(|tag| gradient_band(tag + 500, size)).collect(),
        )
}

/// Constant images whose value is `index + 1`, so every output pixel names its sample.
pub(crate) fn tagged_store(pool: Pool, count: usize, size: ImageSize) -> MemoryStore {
    MemoryStore::new().with_raw(
        pool,
        (0..count)
            .map(|index| Buffer2::new_filled(size.width, size.height, (index + 1) as f32))
            .collect(),
    )
}

/// Precolored constant images whose value is `index + 1`.
pub(crate) fn tagged_precolored(pool: Pool, count: usize, size: ImageSize, channels: usize) -> MemoryStore {
    MemoryStore::new().with_precolored(
        pool,
        (0..count)
            .map(|index| {
                Image::new(
                    size.width,
                    size.height,
                    channels,
                    vec![(index + 1) as f32; size.width * size.height * channels],
                )
            })
            .collect(),
    )
}

/// Sleeps before each load so that workers finish out of submission order.
pub(crate) struct SlowStore {
    pub inner: MemoryStore,
    pub loads: AtomicUsize,
}

impl SlowStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }
}

impl SampleStore for SlowStore {
    fn count(&self, pool: Pool) -> usize {
        self.inner.count(pool)
    }

    fn load(&self, pool: Pool, index: usize) -> Result<Buffer2<f32>, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(((index * 7) % 5) as u64));
        self.inner.load(pool, index)
    }
}

/// Fails to load one specific sample.
pub(crate) struct FailingStore {
    pub inner: MemoryStore,
    pub pool: Pool,
    pub index: usize,
}

impl SampleStore for FailingStore {
    fn count(&self, pool: Pool) -> usize {
        self.inner.count(pool)
    }

    fn load(&self, pool: Pool, index: usize) -> Result<Buffer2<f32>, StoreError> {
        if pool == self.pool && index == self.index {
            return Err(StoreError::Io(std::io::Error::other("corrupt sample")));
        }
        self.inner.load(pool, index)
    }
}

/// Panics while loading one specific sample.
pub(crate) struct PanickingStore {
    pub inner: MemoryStore,
    pub index: usize,
}

impl SampleStore for PanickingStore {
    fn count(&self, pool: Pool) -> usize {
        self.inner.count(pool)
    }

    fn load(&self, pool: Pool, index: usize) -> Result<Buffer2<f32>, StoreError> {
        assert_ne!(index, self.index, "worker crashed on sample {index}");
        self.inner.load(pool, index)
    }
}
