//! Deterministic evaluation passes.
//!
//! An [`EvaluationGenerator`] walks the evaluation pool once, in index order,
//! and renders every sample under each fixed augmentation transform. Sample
//! `p` of a chunk fills rows `p * T .. p * T + T`, where `T` is the number of
//! fixed transforms. Chunks carry no labels and no post-processing is applied.

use std::sync::Arc;
use std::time::Instant;

use common::Pipeline;

use crate::chunk::{Chunk, ChunkArray};
use crate::config::{EvaluationConfig, GeneratorConfig};
use crate::error::{Error, Result};
use crate::generator::{build_pool, check_complete, write_rows};
use crate::image::Image;
use crate::processor::{SampleKind, SampleProcessor, SampleRef, SampleTask};
use crate::store::{Pool, SampleStore};
use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum EvaluationKind {
    /// Single-band samples broadcast to the configured channels.
    Plain,
    /// Samples stored with their final channel layout.
    Color,
}

impl EvaluationKind {
    fn sample_kind(self) -> SampleKind {
        match self {
            EvaluationKind::Plain => SampleKind::FixedEval,
            EvaluationKind::Color => SampleKind::PrecoloredFixedEval,
        }
    }
}

/// Finite sequence of evaluation chunks covering the whole evaluation pool.
#[derive(Debug)]
pub struct EvaluationGenerator {
    kind: EvaluationKind,
    processor: Arc<SampleProcessor>,
    config: GeneratorConfig,
    transforms: usize,
    total: usize,
    samples_per_chunk: usize,
    next_index: usize,
    produced: usize,
    failed: bool,
}

impl EvaluationGenerator {
    /// # Errors
    /// [`Error::Config`] if either configuration is invalid.
    pub fn new(
        kind: EvaluationKind,
        config: GeneratorConfig,
        evaluation: EvaluationConfig,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        config.validate()?;
        evaluation.validate(config.image_size)?;

        let fixed: Vec<Transform> = evaluation
            .augmentation_transforms
            .iter()
            .map(|t| t.transform(config.image_size))
            .collect();
        let transforms = fixed.len();
        let total = store.count(Pool::Eval);
        let processor = SampleProcessor::new(kind.sample_kind(), store, &config)?
            .with_fixed_transforms(fixed);

        tracing::debug!(
            "{} evaluation over {} samples: {} transforms, {} samples per chunk",
            kind,
            total,
            transforms,
            evaluation.samples_per_chunk()
        );

        Ok(Self {
            kind,
            processor: Arc::new(processor),
            config,
            transforms,
            total,
            samples_per_chunk: evaluation.samples_per_chunk(),
            next_index: 0,
            produced: 0,
            failed: false,
        })
    }

    pub fn plain(
        config: GeneratorConfig,
        evaluation: EvaluationConfig,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        Self::new(EvaluationKind::Plain, config, evaluation, store)
    }

    pub fn color(
        config: GeneratorConfig,
        evaluation: EvaluationConfig,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        Self::new(EvaluationKind::Color, config, evaluation, store)
    }

    /// Total number of chunks this pass yields.
    pub fn num_chunks(&self) -> usize {
        self.total.div_ceil(self.samples_per_chunk)
    }

    pub fn samples_per_chunk(&self) -> usize {
        self.samples_per_chunk
    }

    fn next_chunk(&mut self) -> Result<Chunk> {
        let started = Instant::now();
        let start = self.next_index;
        let end = (start + self.samples_per_chunk).min(self.total);
        let rows = (end - start) * self.transforms;
        let stages = self.processor.stages().len();

        let mut arrays: Vec<ChunkArray> = self
            .processor
            .stages()
            .iter()
            .map(|(_, size)| ChunkArray::zeros(rows, size.height, size.width, self.config.channels))
            .collect();

        let tasks: Vec<SampleTask> = (start..end)
            .map(|index| SampleTask {
                sample: SampleRef::Single(index),
                seed: 0,
            })
            .collect();
        let pool = build_pool(self.config.num_workers, "eval")?;
        let processor = Arc::clone(&self.processor);
        let mut stream = Pipeline::spawn(pool, tasks, self.config.loadsize, "eval", move |task| {
            processor.process(task)
        })
        .map_err(Error::DispatchThread)?;

        let expected = self.processor.outputs_per_sample();
        for (p, result) in stream.by_ref().enumerate() {
            let images: Vec<Image> = result?;
            if images.len() != expected {
                return Err(Error::ShapeMismatch {
                    what: "outputs per sample",
                    expected: (expected, 0, 0),
                    actual: (images.len(), 0, 0),
                });
            }
            for (j, per_transform) in images.chunks(stages).enumerate() {
                write_rows(&mut arrays, p * self.transforms + j, per_transform)?;
            }
        }
        check_complete(&stream)?;

        self.next_index = end;
        self.produced += 1;
        tracing::info!(
            "{} evaluation chunk {}/{}: {} rows in {:.2}s",
            self.kind,
            self.produced,
            self.num_chunks(),
            rows,
            started.elapsed().as_secs_f64()
        );

        let samples = (start..end)
            .flat_map(|index| std::iter::repeat_n(SampleRef::Single(index), self.transforms))
            .collect();
        Ok(Chunk {
            arrays,
            labels: None,
            samples,
        })
    }
}

impl Iterator for EvaluationGenerator {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_index >= self.total {
            return None;
        }
        let result = self.next_chunk();
        if let Err(e) = &result {
            tracing::error!("{} evaluation chunk {} failed: {}", self.kind, self.produced, e);
            self.failed = true;
        }
        Some(result)
    }
}
