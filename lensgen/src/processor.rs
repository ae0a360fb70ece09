//! Per-sample loading and augmentation.
//!
//! A [`SampleProcessor`] turns one [`SampleTask`] into a list of augmented
//! images. The variant is picked by [`SampleKind`]; the generators only ever
//! see the `task -> Vec<Image>` contract.

use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{AugmentationParams, BoundaryMode, GeneratorConfig, ImageSize, TargetSize};
use crate::error::{ConfigError, Error, Result};
use crate::image::Image;
use crate::perturbation::random_perturbation_transform;
use crate::store::{Pool, SampleStore};
use crate::transform::Transform;
use crate::warp::fast_warp;

/// Which pool a processor reads and how the loaded image is augmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum SampleKind {
    /// Raw negative, broadcast to the configured channels, randomly perturbed.
    Negative,
    /// Raw lens, treated like a negative.
    Lens,
    /// Raw source, treated like a negative.
    Source,
    /// Raw lens and raw source of one pair, each perturbed independently.
    /// Outputs are all lens stages followed by all source stages.
    ComposedPositive,
    /// Raw evaluation sample under every fixed transform, transform-major.
    FixedEval,
    /// Multi-channel negative, randomly perturbed.
    PrecoloredNeg,
    /// Pre-composed multi-channel positive of one pair, randomly perturbed.
    PrecoloredPos,
    /// Multi-channel evaluation sample under every fixed transform.
    PrecoloredFixedEval,
}

impl SampleKind {
    /// Kinds that apply the fixed evaluation transforms instead of random ones.
    pub fn is_fixed(self) -> bool {
        matches!(self, SampleKind::FixedEval | SampleKind::PrecoloredFixedEval)
    }
}

/// Dataset address of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRef {
    Single(usize),
    Pair { lens: usize, source: usize },
}

impl fmt::Display for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleRef::Single(index) => write!(f, "#{index}"),
            SampleRef::Pair { lens, source } => write!(f, "(lens #{lens}, source #{source})"),
        }
    }
}

/// One unit of work for a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTask {
    pub sample: SampleRef,
    /// Seed of the per-sample RNG. Ignored by fixed-transform kinds.
    pub seed: u64,
}

/// Loads and augments samples of one [`SampleKind`].
pub struct SampleProcessor {
    kind: SampleKind,
    store: Arc<dyn SampleStore>,
    stages: Vec<(Transform, TargetSize)>,
    augmentation: AugmentationParams,
    image_size: ImageSize,
    channels: usize,
    boundary: BoundaryMode,
    fixed: Vec<Transform>,
}

impl fmt::Debug for SampleProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleProcessor")
            .field("kind", &self.kind)
            .field("stages", &self.stages.len())
            .field("fixed", &self.fixed.len())
            .field("channels", &self.channels)
            .finish()
    }
}

impl SampleProcessor {
    /// Processor for `kind` using every downsampling stage of `config`.
    ///
    /// Fixed-transform kinds start with the identity as their only fixed
    /// transform; see [`Self::with_fixed_transforms`].
    pub fn new(
        kind: SampleKind,
        store: Arc<dyn SampleStore>,
        config: &GeneratorConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            kind,
            store,
            stages: config.stages()?,
            augmentation: config.augmentation,
            image_size: config.image_size,
            channels: config.channels,
            boundary: config.boundary,
            fixed: vec![Transform::identity()],
        })
    }

    /// Replace the fixed augmentation transforms applied by evaluation kinds.
    pub fn with_fixed_transforms(mut self, fixed: Vec<Transform>) -> Self {
        self.fixed = fixed;
        self
    }

    /// Keep only the first downsampling stage.
    pub fn first_stage_only(mut self) -> Self {
        self.stages.truncate(1);
        self
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn stages(&self) -> &[(Transform, TargetSize)] {
        &self.stages
    }

    /// Number of images [`Self::process`] returns per task.
    pub fn outputs_per_sample(&self) -> usize {
        match self.kind {
            SampleKind::ComposedPositive => 2 * self.stages.len(),
            kind if kind.is_fixed() => self.fixed.len() * self.stages.len(),
            _ => self.stages.len(),
        }
    }

    /// Load and augment one sample.
    ///
    /// Random kinds draw ONE perturbation per loaded image and share it across
    /// every downsampling stage, so multi-resolution outputs stay aligned.
    pub fn process(&self, task: &SampleTask) -> Result<Vec<Image>> {
        let mut rng = ChaCha8Rng::seed_from_u64(task.seed);

        match (self.kind, task.sample) {
            (SampleKind::Negative, SampleRef::Single(index)) => {
                let image = self.load_broadcast(Pool::Negative, index)?;
                self.augment(&image, &mut rng)
            }
            (SampleKind::Lens, SampleRef::Single(index)) => {
                let image = self.load_broadcast(Pool::Lens, index)?;
                self.augment(&image, &mut rng)
            }
            (SampleKind::Source, SampleRef::Single(index)) => {
                let image = self.load_broadcast(Pool::Source, index)?;
                self.augment(&image, &mut rng)
            }
            (SampleKind::ComposedPositive, SampleRef::Pair { lens, source }) => {
                let lens_image = self.load_broadcast(Pool::Lens, lens)?;
                let source_image = self.load_broadcast(Pool::Source, source)?;
                let mut outputs = self.augment(&lens_image, &mut rng)?;
                outputs.extend(self.augment(&source_image, &mut rng)?);
                Ok(outputs)
            }
            (SampleKind::FixedEval, SampleRef::Single(index)) => {
                let image = self.load_broadcast(Pool::Eval, index)?;
                self.apply_fixed(&image)
            }
            (SampleKind::PrecoloredNeg, SampleRef::Single(index)) => {
                let image = self.load_precolored(Pool::Negative, index)?;
                self.augment(&image, &mut rng)
            }
            (SampleKind::PrecoloredPos, SampleRef::Pair { lens, source }) => {
                let image = self
                    .store
                    .load_composed(lens, source)
                    .map_err(|source_err| Error::ComposedLoad {
                        lens,
                        source_index: source,
                        source: source_err,
                    })?;
                self.check_channels(&image)?;
                self.augment(&image, &mut rng)
            }
            (SampleKind::PrecoloredFixedEval, SampleRef::Single(index)) => {
                let image = self.load_precolored(Pool::Eval, index)?;
                self.apply_fixed(&image)
            }
            (kind, sample) => Err(Error::UnexpectedSample { kind, sample }),
        }
    }

    fn load_broadcast(&self, pool: Pool, index: usize) -> Result<Image> {
        let band = self
            .store
            .load(pool, index)
            .map_err(|source| Error::SampleLoad {
                pool,
                index,
                source,
            })?;
        Ok(Image::from_single_band(&band, self.channels))
    }

    fn load_precolored(&self, pool: Pool, index: usize) -> Result<Image> {
        let image = self
            .store
            .load_precolored(pool, index)
            .map_err(|source| Error::SampleLoad {
                pool,
                index,
                source,
            })?;
        self.check_channels(&image)?;
        Ok(image)
    }

    fn check_channels(&self, image: &Image) -> Result<()> {
        if image.channels() != self.channels {
            let (height, width, channels) = image.shape();
            return Err(Error::ShapeMismatch {
                what: "precolored sample",
                expected: (height, width, self.channels),
                actual: (height, width, channels),
            });
        }
        Ok(())
    }

    fn augment(&self, image: &Image, rng: &mut ChaCha8Rng) -> Result<Vec<Image>> {
        let augment = random_perturbation_transform(&self.augmentation, self.image_size, rng);
        self.stages
            .iter()
            .map(|(ds, size)| fast_warp(image, &augment.compose(ds), *size, self.boundary))
            .collect()
    }

    fn apply_fixed(&self, image: &Image) -> Result<Vec<Image>> {
        let mut outputs = Vec::with_capacity(self.outputs_per_sample());
        for augment in &self.fixed {
            for (ds, size) in &self.stages {
                outputs.push(fast_warp(
                    image,
                    &augment.compose(ds),
                    *size,
                    self.boundary,
                )?);
            }
        }
        Ok(outputs)
    }
}
