//! Sample store interface.
//!
//! Decoding images from disk is not this crate's job. Generators pull raw
//! pixels through [`SampleStore`], addressed by pool and by an index in
//! `0..count(pool)`. [`MemoryStore`] is a preloaded implementation.

use std::sync::Arc;

use common::Buffer2;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::Image;

/// The independent sample pools a dataset provides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum Pool {
    Negative,
    Lens,
    Source,
    Eval,
}

impl Pool {
    pub const ALL: [Pool; 4] = [Pool::Negative, Pool::Lens, Pool::Source, Pool::Eval];

    fn slot(self) -> usize {
        match self {
            Pool::Negative => 0,
            Pool::Lens => 1,
            Pool::Source => 2,
            Pool::Eval => 3,
        }
    }
}

/// Failure reported by a store for a single lookup.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no {pool} sample at index {index}")]
    NotFound { pool: Pool, index: usize },

    #[error("no composed sample for lens {lens} and source {source_index}")]
    ComposedNotFound { lens: usize, source_index: usize },

    #[error("store does not provide {0}")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Source of raw training and evaluation images.
///
/// Implementations are shared across worker threads and must be cheap to call
/// concurrently.
pub trait SampleStore: Send + Sync {
    /// Number of samples in `pool`.
    fn count(&self, pool: Pool) -> usize;

    /// Single-band image for `index` in `pool`.
    fn load(&self, pool: Pool, index: usize) -> Result<Buffer2<f32>, StoreError>;

    /// Multi-channel image for `index` in `pool`, already in its final channel layout.
    fn load_precolored(&self, _pool: Pool, _index: usize) -> Result<Image, StoreError> {
        Err(StoreError::Unsupported("precolored samples"))
    }

    /// Multi-channel image with a lens and a source already composed.
    fn load_composed(&self, _lens: usize, _source: usize) -> Result<Image, StoreError> {
        Err(StoreError::Unsupported("composed samples"))
    }
}

impl<S: SampleStore + ?Sized> SampleStore for Arc<S> {
    fn count(&self, pool: Pool) -> usize {
        (**self).count(pool)
    }

    fn load(&self, pool: Pool, index: usize) -> Result<Buffer2<f32>, StoreError> {
        (**self).load(pool, index)
    }

    fn load_precolored(&self, pool: Pool, index: usize) -> Result<Image, StoreError> {
        (**self).load_precolored(pool, index)
    }

    fn load_composed(&self, lens: usize, source: usize) -> Result<Image, StoreError> {
        (**self).load_composed(lens, source)
    }
}

/// Store backed by images held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    raw: [Vec<Buffer2<f32>>; 4],
    precolored: [Vec<Image>; 4],
    composed: HashMap<(usize, usize), Image>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw(mut self, pool: Pool, images: Vec<Buffer2<f32>>) -> Self {
        self.raw[pool.slot()] = images;
        self
    }

    pub fn with_precolored(mut self, pool: Pool, images: Vec<Image>) -> Self {
        self.precolored[pool.slot()] = images;
        self
    }

    pub fn with_composed(mut self, lens: usize, source: usize, image: Image) -> Self {
        self.composed.insert((lens, source), image);
        self
    }

    pub fn push_raw(&mut self, pool: Pool, image: Buffer2<f32>) {
        self.raw[pool.slot()].push(image);
    }

    pub fn push_precolored(&mut self, pool: Pool, image: Image) {
        self.precolored[pool.slot()].push(image);
    }
}

impl SampleStore for MemoryStore {
    fn count(&self, pool: Pool) -> usize {
        self.raw[pool.slot()]
            .len()
            .max(self.precolored[pool.slot()].len())
    }

    fn load(&self, pool: Pool, index: usize) -> Result<Buffer2<f32>, StoreError> {
        self.raw[pool.slot()]
            .get(index)
            .cloned()
            .ok_or(StoreError::NotFound { pool, index })
    }

    fn load_precolored(&self, pool: Pool, index: usize) -> Result<Image, StoreError> {
        self.precolored[pool.slot()]
            .get(index)
            .cloned()
            .ok_or(StoreError::NotFound { pool, index })
    }

    fn load_composed(&self, lens: usize, source: usize) -> Result<Image, StoreError> {
        self.composed
            .get(&(lens, source))
            .cloned()
            .ok_or(StoreError::ComposedNotFound {
                lens,
                source_index: source,
            })
    }
}
