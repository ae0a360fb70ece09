//! Error types for chunk generation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::processor::{SampleKind, SampleRef};
use crate::store::{Pool, StoreError};

/// Rejected generator configuration. Always reported at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("{name} must contain finite values, got ({min}, {max})")]
    NonFiniteRange {
        name: &'static str,
        min: f64,
        max: f64,
    },

    #[error("{name} must satisfy min <= max, got ({min}, {max})")]
    InvertedRange {
        name: &'static str,
        min: f64,
        max: f64,
    },

    #[error("zoom_range bounds must be positive, got ({min}, {max})")]
    NonPositiveZoom { min: f64, max: f64 },

    #[error("blend range must satisfy 0 <= min <= max, got ({min}, {max})")]
    InvalidBlendRange { min: f64, max: f64 },

    #[error("at least one downsampling entry is required")]
    NoDownsampling,

    #[error("downsampling entry {index}: ds_factor must be positive and finite, got {ds_factor}")]
    InvalidDownsampleFactor { index: usize, ds_factor: f64 },

    #[error("downsampling entry {index}: subpixel_shift requires ds_factor >= 1, got {ds_factor}")]
    SubpixelShiftFactor { index: usize, ds_factor: f64 },

    #[error("downsampling entry {index} has a degenerate transform")]
    DegenerateDownsample { index: usize },

    #[error("{what} must have non-zero width and height, got {width}x{height}")]
    EmptySize {
        what: &'static str,
        width: usize,
        height: usize,
    },

    #[error("channels must be positive")]
    ZeroChannels,

    #[error("num_workers must be positive")]
    ZeroWorkers,

    #[error("loadsize must be positive")]
    ZeroLoadsize,

    #[error("{pool} pool holds {available} samples, cannot draw {requested} without replacement")]
    PoolTooSmall {
        pool: Pool,
        available: usize,
        requested: usize,
    },

    #[error("at least one fixed augmentation transform is required")]
    NoFixedTransforms,

    #[error("evaluation chunk_size {chunk_size} is smaller than the {transforms} fixed transforms")]
    EvaluationChunkTooSmall { chunk_size: usize, transforms: usize },

    #[error("fixed transform {index} is degenerate")]
    DegenerateFixedTransform { index: usize },
}

/// Errors surfaced by generators and their building blocks.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load {pool} sample {index}: {source}")]
    SampleLoad {
        pool: Pool,
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("Failed to load composed sample (lens {lens}, source {source_index}): {source}")]
    ComposedLoad {
        lens: usize,
        source_index: usize,
        #[source]
        source: StoreError,
    },

    #[error("Degenerate transform (determinant {determinant})")]
    DegenerateTransform { determinant: f64 },

    #[error("{kind} processor cannot handle sample {sample:?}")]
    UnexpectedSample { kind: SampleKind, sample: SampleRef },

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("Failed to build worker pool: {0}")]
    PoolSpawn(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to start dispatch thread: {0}")]
    DispatchThread(#[source] io::Error),

    #[error("Worker stream ended after {received} of {expected} results")]
    StreamTruncated { expected: usize, received: usize },

    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_yml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
