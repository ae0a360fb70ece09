//! Chunked training-data generation.
//!
//! A [`ChunkGenerator`] repeatedly draws sample indices, streams them through
//! freshly built worker pools in submission order, post-processes the results
//! and fills one [`Chunk`] per iteration.
//!
//! Per chunk:
//! 1. draw `chunk_size` distinct indices per pool and one RNG seed per sample,
//! 2. spawn one order-preserving [`Pipeline`] per pool (two for composed positives),
//! 3. consume results in lockstep, blend and post-process on the calling thread,
//! 4. write row `k` of every array from the `k`-th result.
//!
//! Any error aborts the chunk; the iterator yields it once and then stops.


use std::sync::Arc;
use std::time::Instant;

use common::Pipeline;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPool;

use crate::chunk::{Chunk, ChunkArray};
use crate::config::{GeneratorConfig, ImageSize, PositiveDispatch};
use crate::error::{ConfigError, Error, Result};
use crate::image::Image;
use crate::postprocess::{blend_positive, finalize};
use crate::processor::{SampleKind, SampleProcessor, SampleRef, SampleTask};
use crate::store::{Pool, SampleStore};

/// Label written for every row of a negative chunk.
pub const NEGATIVE_LABEL: i32 = 0;
/// Label written for every row of a positive chunk.
pub const POSITIVE_LABEL: i32 = 1;

/// The four training-time generator variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum GeneratorKind {
    /// Raw negatives, post-processed, label 0.
    Negative,
    /// Lens + source blends, post-processed, label 1.
    Positive,
    /// Precolored negatives, written as loaded after augmentation, label 0.
    NegativeColor,
    /// Pre-composed colored positives, first output size only, label 1.
    PositiveColor,
}

impl GeneratorKind {
    pub fn label(self) -> i32 {
        match self {
            GeneratorKind::Negative | GeneratorKind::NegativeColor => NEGATIVE_LABEL,
            GeneratorKind::Positive | GeneratorKind::PositiveColor => POSITIVE_LABEL,
        }
    }

    /// Color variants skip clip, stretch, normalize and resize.
    pub fn postprocesses(self) -> bool {
        matches!(self, GeneratorKind::Negative | GeneratorKind::Positive)
    }

    fn pools(self) -> &'static [Pool] {
        match self {
            GeneratorKind::Negative | GeneratorKind::NegativeColor => &[Pool::Negative],
            GeneratorKind::Positive | GeneratorKind::PositiveColor => &[Pool::Lens, Pool::Source],
        }
    }
}

/// How work reaches the worker pools.
#[derive(Debug)]
enum Dispatch {
    /// One pool over single indices.
    Single {
        pool: Pool,
        processor: Arc<SampleProcessor>,
    },
    /// Lens and source pools consumed in lockstep.
    TwoPools {
        lens: Arc<SampleProcessor>,
        source: Arc<SampleProcessor>,
    },
    /// One pool over `(lens, source)` pairs.
    Paired { processor: Arc<SampleProcessor> },
}

/// Lazy, optionally bounded sequence of training chunks.
pub struct ChunkGenerator {
    kind: GeneratorKind,
    config: GeneratorConfig,
    store: Arc<dyn SampleStore>,
    dispatch: Dispatch,
    rng: ChaCha8Rng,
    produced: usize,
    failed: bool,
}

impl std::fmt::Debug for ChunkGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkGenerator")
            .field("kind", &self.kind)
            .field("dispatch", &self.dispatch)
            .field("produced", &self.produced)
            .field("failed", &self.failed)
            .finish()
    }
}

impl ChunkGenerator {
    /// Validate `config` against `store` and prepare the processors.
    ///
    /// # Errors
    /// [`Error::Config`] when the configuration is invalid or a pool holds
    /// fewer than `chunk_size` samples.
    pub fn new(
        kind: GeneratorKind,
        config: GeneratorConfig,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        config.validate()?;
        for &pool in kind.pools() {
            check_pool_size(store.as_ref(), pool, config.chunk_size)?;
        }

        let processor =
            |sample_kind| SampleProcessor::new(sample_kind, Arc::clone(&store), &config).map(Arc::new);
        let dispatch = match (kind, config.positive_dispatch) {
            (GeneratorKind::Negative, _) => Dispatch::Single {
                pool: Pool::Negative,
                processor: processor(SampleKind::Negative)?,
            },
            (GeneratorKind::NegativeColor, _) => Dispatch::Single {
                pool: Pool::Negative,
                processor: processor(SampleKind::PrecoloredNeg)?,
            },
            (GeneratorKind::Positive, PositiveDispatch::TwoPools) => Dispatch::TwoPools {
                lens: processor(SampleKind::Lens)?,
                source: processor(SampleKind::Source)?,
            },
            (GeneratorKind::Positive, PositiveDispatch::Paired) => Dispatch::Paired {
                processor: processor(SampleKind::ComposedPositive)?,
            },
            (GeneratorKind::PositiveColor, _) => Dispatch::Paired {
                processor: Arc::new(
                    SampleProcessor::new(SampleKind::PrecoloredPos, Arc::clone(&store), &config)?
                        .first_stage_only(),
                ),
            },
        };

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        tracing::debug!(
            "{} generator ready: chunk_size={}, outputs={}, workers={}, loadsize={}",
            kind,
            config.chunk_size,
            config.downsampling.len(),
            config.num_workers,
            config.loadsize
        );

        Ok(Self {
            kind,
            config,
            store,
            dispatch,
            rng,
            produced: 0,
            failed: false,
        })
    }

    pub fn negative(config: GeneratorConfig, store: Arc<dyn SampleStore>) -> Result<Self> {
        Self::new(GeneratorKind::Negative, config, store)
    }

    pub fn positive(config: GeneratorConfig, store: Arc<dyn SampleStore>) -> Result<Self> {
        Self::new(GeneratorKind::Positive, config, store)
    }

    pub fn negative_color(config: GeneratorConfig, store: Arc<dyn SampleStore>) -> Result<Self> {
        Self::new(GeneratorKind::NegativeColor, config, store)
    }

    pub fn positive_color(config: GeneratorConfig, store: Arc<dyn SampleStore>) -> Result<Self> {
        Self::new(GeneratorKind::PositiveColor, config, store)
    }

    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Chunks produced so far.
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Shapes `(height, width)` of the arrays in every chunk, in order.
    pub fn output_sizes(&self) -> Vec<ImageSize> {
        let stages = match &self.dispatch {
            Dispatch::Single { processor, .. } | Dispatch::Paired { processor } => {
                processor.stages()
            }
            Dispatch::TwoPools { lens, .. } => lens.stages(),
        };
        stages
            .iter()
            .map(|(_, size)| match self.config.resize {
                Some(resize) if self.kind.postprocesses() => resize,
                _ => *size,
            })
            .collect()
    }

    /// Generate one chunk regardless of the `num_chunks` bound.
    pub fn next_chunk(&mut self) -> Result<Chunk> {
        let started = Instant::now();
        let chunk_size = self.config.chunk_size;
        tracing::debug!("{} chunk {}: dispatching {} samples", self.kind, self.produced, chunk_size);

        let mut arrays = self.allocate_arrays();
        let samples = match &self.dispatch {
            Dispatch::Single { pool, processor } => {
                let pool = *pool;
                let processor = Arc::clone(processor);
                let indices = self.draw_indices(pool)?;
                let tasks = self.tasks(indices.into_iter().map(SampleRef::Single));
                self.run_single(&processor, tasks, &mut arrays)?
            }
            Dispatch::TwoPools { lens, source } => {
                let (lens, source) = (Arc::clone(lens), Arc::clone(source));
                let source_indices = self.draw_indices(Pool::Source)?;
                let lens_indices = self.draw_indices(Pool::Lens)?;
                let samples: Vec<SampleRef> = lens_indices
                    .iter()
                    .zip(&source_indices)
                    .map(|(&lens, &source)| SampleRef::Pair { lens, source })
                    .collect();
                let lens_tasks = self.tasks(lens_indices.into_iter().map(SampleRef::Single));
                let source_tasks = self.tasks(source_indices.into_iter().map(SampleRef::Single));
                self.run_two_pools(&lens, &source, lens_tasks, source_tasks, &mut arrays)?;
                samples
            }
            Dispatch::Paired { processor } => {
                let processor = Arc::clone(processor);
                let source_indices = self.draw_indices(Pool::Source)?;
                let lens_indices = self.draw_indices(Pool::Lens)?;
                let pairs = lens_indices
                    .into_iter()
                    .zip(source_indices)
                    .map(|(lens, source)| SampleRef::Pair { lens, source });
                let tasks = self.tasks(pairs);
                self.run_paired(&processor, tasks, &mut arrays)?
            }
        };

        self.produced += 1;
        tracing::info!(
            "{} chunk {} done: {} samples in {:.2}s",
            self.kind,
            self.produced - 1,
            samples.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(Chunk {
            arrays,
            labels: Some(vec![self.kind.label(); samples.len()]),
            samples,
        })
    }

    fn allocate_arrays(&self) -> Vec<ChunkArray> {
        self.output_sizes()
            .into_iter()
            .map(|size| {
                ChunkArray::zeros(
                    self.config.chunk_size,
                    size.height,
                    size.width,
                    self.config.channels,
                )
            })
            .collect()
    }

    fn draw_indices(&mut self, pool: Pool) -> Result<Vec<usize>> {
        let available = check_pool_size(self.store.as_ref(), pool, self.config.chunk_size)?;
        Ok(select_indices(&mut self.rng, available, self.config.chunk_size))
    }

    /// Attach a per-sample seed, drawn in submission order.
    fn tasks(&mut self, samples: impl Iterator<Item = SampleRef>) -> Vec<SampleTask> {
        samples
            .map(|sample| SampleTask {
                sample,
                seed: self.rng.random(),
            })
            .collect()
    }

    fn spawn(
        &self,
        processor: &Arc<SampleProcessor>,
        tasks: Vec<SampleTask>,
        name: &str,
    ) -> Result<Pipeline<Result<Vec<Image>>>> {
        let pool = build_pool(self.config.num_workers, name)?;
        let processor = Arc::clone(processor);
        Pipeline::spawn(pool, tasks, self.config.loadsize, name, move |task| {
            processor.process(task)
        })
        .map_err(Error::DispatchThread)
    }

    fn finish(&self, images: Vec<Image>) -> Vec<Image> {
        if !self.kind.postprocesses() {
            return images;
        }
        images
            .into_iter()
            .map(|image| finalize(image, self.config.normalize, self.config.resize))
            .collect()
    }

    fn blend_factor(&mut self) -> f32 {
        let range = self.config.blend_range;
        self.rng.random_range(range.min..=range.max) as f32
    }

    fn run_single(
        &self,
        processor: &Arc<SampleProcessor>,
        tasks: Vec<SampleTask>,
        arrays: &mut [ChunkArray],
    ) -> Result<Vec<SampleRef>> {
        let samples: Vec<SampleRef> = tasks.iter().map(|t| t.sample).collect();
        let mut stream = self.spawn(processor, tasks, "negative")?;

        for (k, result) in stream.by_ref().enumerate() {
            write_rows(arrays, k, &self.finish(result?))?;
        }
        check_complete(&stream)?;
        Ok(samples)
    }

    fn run_two_pools(
        &mut self,
        lens: &Arc<SampleProcessor>,
        source: &Arc<SampleProcessor>,
        lens_tasks: Vec<SampleTask>,
        source_tasks: Vec<SampleTask>,
        arrays: &mut [ChunkArray],
    ) -> Result<()> {
        let factors: Vec<f32> = (0..lens_tasks.len()).map(|_| self.blend_factor()).collect();

        let mut lens_stream = self.spawn(lens, lens_tasks, "lens")?;
        let mut source_stream = self.spawn(source, source_tasks, "source")?;

        for (k, (lens_result, source_result)) in
            lens_stream.by_ref().zip(source_stream.by_ref()).enumerate()
        {
            let blended = blend_positive(&lens_result?, &source_result?, factors[k])?;
            write_rows(arrays, k, &self.finish(blended))?;
        }
        check_complete(&lens_stream)?;
        check_complete(&source_stream)
    }

    fn run_paired(
        &mut self,
        processor: &Arc<SampleProcessor>,
        tasks: Vec<SampleTask>,
        arrays: &mut [ChunkArray],
    ) -> Result<Vec<SampleRef>> {
        let samples: Vec<SampleRef> = tasks.iter().map(|t| t.sample).collect();
        let blends = processor.kind() == SampleKind::ComposedPositive;
        let factors: Vec<f32> = if blends {
            (0..samples.len()).map(|_| self.blend_factor()).collect()
        } else {
            Vec::new()
        };

        let mut stream = self.spawn(processor, tasks, "paired")?;
        for (k, result) in stream.by_ref().enumerate() {
            let mut images = result?;
            if blends {
                let source = images.split_off(images.len() / 2);
                images = blend_positive(&images, &source, factors[k])?;
            }
            write_rows(arrays, k, &self.finish(images))?;
        }
        check_complete(&stream)?;
        Ok(samples)
    }
}

impl Iterator for ChunkGenerator {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self
            .config
            .num_chunks
            .is_some_and(|limit| self.produced >= limit)
        {
            return None;
        }
        let result = self.next_chunk();
        if let Err(e) = &result {
            tracing::error!("{} chunk {} failed: {}", self.kind, self.produced, e);
            self.failed = true;
        }
        Some(result)
    }
}

/// Draw `amount` distinct indices from `0..pool_size` in random order.
///
/// # Panics
/// Panics if `amount > pool_size`.
pub fn select_indices<R: Rng + ?Sized>(rng: &mut R, pool_size: usize, amount: usize) -> Vec<usize> {
    index::sample(rng, pool_size, amount).into_vec()
}

/// Size of `pool`, or an error if it cannot supply `requested` distinct samples.
fn check_pool_size(
    store: &dyn SampleStore,
    pool: Pool,
    requested: usize,
) -> std::result::Result<usize, ConfigError> {
    let available = store.count(pool);
    if available < requested {
        return Err(ConfigError::PoolTooSmall {
            pool,
            available,
            requested,
        });
    }
    Ok(available)
}

/// Fresh worker pool for one stream.
///
/// Dropping a rayon pool only signals its workers to exit; it does not join
/// them. The stream's dispatch thread is joined when its [`Pipeline`] drops,
/// but worker threads may outlive the chunk by a short while.
pub(crate) fn build_pool(threads: usize, name: &str) -> Result<ThreadPool> {
    let name = name.to_string();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{name}-worker-{i}"))
        .build()?;
    Ok(pool)
}

pub(crate) fn write_rows(arrays: &mut [ChunkArray], row: usize, images: &[Image]) -> Result<()> {
    if images.len() != arrays.len() {
        return Err(Error::ShapeMismatch {
            what: "outputs per sample",
            expected: (arrays.len(), 0, 0),
            actual: (images.len(), 0, 0),
        });
    }
    for (array, image) in arrays.iter_mut().zip(images) {
        array.write_row(row, image)?;
    }
    Ok(())
}

pub(crate) fn check_complete<R>(stream: &Pipeline<R>) -> Result<()> {
    if !stream.is_complete() {
        return Err(Error::StreamTruncated {
            expected: stream.expected(),
            received: stream.received(),
        });
    }
    Ok(())
}
