//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use lensgen::prelude::*;
//! ```

// Configuration
pub use crate::{
    AugmentationParams, BoundaryMode, DownsampleSpec, EvaluationConfig, FixedTransform,
    GeneratorConfig, ImageSize,
};

// Samples
pub use crate::{Image, MemoryStore, Pool, SampleStore};

// Generation
pub use crate::{Chunk, ChunkArray, ChunkGenerator, EvaluationGenerator};

// Errors
pub use crate::{Error, Result};
