//! Lensgen - realtime augmentation chunks for gravitational-lens classifiers.
//!
//! Generators pull raw samples from a [`SampleStore`], warp each one under a
//! freshly drawn random perturbation composed with every configured
//! downsampling transform, and assemble the results into fixed-size chunks.
//! Workers run on a rayon pool; chunk rows always follow dispatch order.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lensgen::prelude::*;
//!
//! let store = Arc::new(MemoryStore::new().with_raw(Pool::Negative, images));
//! let config = GeneratorConfig::load_yaml("generator.yml")?;
//!
//! for chunk in ChunkGenerator::negative(config, store)?.take(10) {
//!     let chunk = chunk?;
//!     println!("{} rows, shape {:?}", chunk.len(), chunk.arrays[0].shape());
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod generator;
pub mod image;
pub mod perturbation;
pub mod postprocess;
pub mod processor;
pub mod store;
pub mod transform;
pub mod warp;

#[cfg(test)]
mod testing;

pub mod prelude;

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    AugmentationParams, BlendRange, BoundaryMode, DownsampleSpec, EvaluationConfig,
    FixedTransform, GeneratorConfig, ImageSize, PositiveDispatch, TargetSize,
    DEFAULT_CHANNELS, DEFAULT_CHUNK_SIZE, DEFAULT_EVALUATION_CHUNK_SIZE, DEFAULT_IMAGE_SIZE,
    DEFAULT_LOADSIZE, DEFAULT_NUM_WORKERS, DEFAULT_RESIZE_SHAPE, DEFAULT_TARGET_SIZE,
};

// ============================================================================
// Errors
// ============================================================================

pub use error::{ConfigError, Error, Result};

// ============================================================================
// Images and samples
// ============================================================================

pub use image::Image;
pub use store::{MemoryStore, Pool, SampleStore, StoreError};

// ============================================================================
// Geometry
// ============================================================================

pub use perturbation::{random_perturbation_transform, Perturbation};
pub use transform::{build_augmentation_transform, build_ds_transform, center_shift, Transform};
pub use warp::fast_warp;

// ============================================================================
// Generation
// ============================================================================

pub use chunk::{Chunk, ChunkArray};
pub use evaluation::{EvaluationGenerator, EvaluationKind};
pub use generator::{ChunkGenerator, GeneratorKind, NEGATIVE_LABEL, POSITIVE_LABEL};
pub use processor::{SampleKind, SampleProcessor, SampleRef, SampleTask};
