//! Configuration types for chunk generation.
//!
//! All configuration is explicit and immutable once a generator is built.
//! Every struct here derives serde and can be loaded from YAML.

use std::path::Path;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::transform::{build_augmentation_transform, build_ds_transform, Transform};

// =============================================================================
// Geometry
// =============================================================================

/// Pixel dimensions of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub const fn square(side: usize) -> Self {
        Self {
            width: side,
            height: side,
        }
    }

    fn validate(&self, what: &'static str) -> std::result::Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptySize {
                what,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Dimensions of one output crop.
pub type TargetSize = ImageSize;

/// Native grid of the training images.
pub const DEFAULT_IMAGE_SIZE: ImageSize = ImageSize::square(101);
/// Output crop used when no other size is configured.
pub const DEFAULT_TARGET_SIZE: TargetSize = ImageSize::square(53);
pub const DEFAULT_CHANNELS: usize = 3;
pub const DEFAULT_CHUNK_SIZE: usize = 25_000;
pub const DEFAULT_EVALUATION_CHUNK_SIZE: usize = 500;
pub const DEFAULT_NUM_WORKERS: usize = 2;
pub const DEFAULT_LOADSIZE: usize = 100;
pub const DEFAULT_RESIZE_SHAPE: ImageSize = ImageSize::square(60);

// =============================================================================
// Augmentation
// =============================================================================

/// Ranges random perturbations are drawn from.
///
/// `zoom_range` is multiplicative and sampled log-uniformly, so a symmetric
/// range reads `(1/1.1, 1.1)`, not `(0.9, 1.1)`. Angles are in degrees,
/// translation in pixels (drawn independently per axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationParams {
    pub zoom_range: (f64, f64),
    pub rotation_range: (f64, f64),
    pub shear_range: (f64, f64),
    pub translation_range: (f64, f64),
    /// Flip half of the samples by adding 180° to rotation and shear.
    pub allow_flip: bool,
}

impl Default for AugmentationParams {
    fn default() -> Self {
        Self {
            zoom_range: (1.0, 1.0),
            rotation_range: (0.0, 360.0),
            shear_range: (0.0, 0.0),
            translation_range: (-4.0, 4.0),
            allow_flip: false,
        }
    }
}

impl AugmentationParams {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_range("zoom_range", self.zoom_range)?;
        check_range("rotation_range", self.rotation_range)?;
        check_range("shear_range", self.shear_range)?;
        check_range("translation_range", self.translation_range)?;
        let (min, max) = self.zoom_range;
        if min <= 0.0 || max <= 0.0 {
            return Err(ConfigError::NonPositiveZoom { min, max });
        }
        Ok(())
    }
}

fn check_range(name: &'static str, (min, max): (f64, f64)) -> std::result::Result<(), ConfigError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(ConfigError::NonFiniteRange { name, min, max });
    }
    if min > max {
        return Err(ConfigError::InvertedRange { name, min, max });
    }
    Ok(())
}

/// Scale range of the source contribution in a composed positive, relative to
/// the lens peak brightness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendRange {
    pub min: f64,
    pub max: f64,
}

impl Default for BlendRange {
    fn default() -> Self {
        Self {
            min: 0.02,
            max: 0.5,
        }
    }
}

impl BlendRange {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min < 0.0 || self.min > self.max
        {
            return Err(ConfigError::InvalidBlendRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Downsampling
// =============================================================================

/// One multi-resolution output: a downsampling transform plus the crop size
/// it is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsampleSpec {
    pub ds_factor: f64,
    pub orig_size: ImageSize,
    pub target_size: TargetSize,
    pub do_shift: bool,
    pub subpixel_shift: bool,
}

impl DownsampleSpec {
    /// Identity transform: the crop starts at the input's top-left pixel.
    pub fn identity(target_size: TargetSize) -> Self {
        Self {
            ds_factor: 1.0,
            orig_size: DEFAULT_IMAGE_SIZE,
            target_size,
            do_shift: false,
            subpixel_shift: false,
        }
    }

    /// Full-resolution crop centered on the input.
    pub fn center_crop(orig_size: ImageSize, target_size: TargetSize) -> Self {
        Self {
            ds_factor: 1.0,
            orig_size,
            target_size,
            do_shift: true,
            subpixel_shift: false,
        }
    }

    /// Downsample by `ds_factor` and center the output window.
    pub fn downsample(ds_factor: f64, orig_size: ImageSize, target_size: TargetSize) -> Self {
        Self {
            ds_factor,
            orig_size,
            target_size,
            do_shift: true,
            subpixel_shift: false,
        }
    }

    /// Output-to-input transform for this entry. `None` for degenerate grids.
    pub fn transform(&self) -> Option<Transform> {
        build_ds_transform(
            self.ds_factor,
            self.orig_size,
            self.target_size,
            self.do_shift,
            self.subpixel_shift,
        )
    }

    fn validate(&self, index: usize) -> std::result::Result<(), ConfigError> {
        if !self.ds_factor.is_finite() || self.ds_factor <= 0.0 {
            return Err(ConfigError::InvalidDownsampleFactor {
                index,
                ds_factor: self.ds_factor,
            });
        }
        if self.subpixel_shift && self.ds_factor < 1.0 {
            return Err(ConfigError::SubpixelShiftFactor {
                index,
                ds_factor: self.ds_factor,
            });
        }
        self.orig_size.validate("orig_size")?;
        self.target_size.validate("target_size")?;
        if self.transform().is_none() {
            return Err(ConfigError::DegenerateDownsample { index });
        }
        Ok(())
    }
}

// =============================================================================
// Warping
// =============================================================================

/// How the resampler reads pixels outside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BoundaryMode {
    /// Mirror about the edge pixel without repeating it: `d c b | a b c d | c b a`.
    #[default]
    Reflect,
    /// Mirror including the edge pixel: `c b a | a b c d | d c b`.
    Symmetric,
    /// Repeat the edge pixel.
    Edge,
    /// Tile the image.
    Wrap,
    /// Fixed value outside the image.
    Constant(f32),
}

// =============================================================================
// Generators
// =============================================================================

/// How the positive generator dispatches lens/source work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositiveDispatch {
    /// One pool for lenses and one for sources, consumed in lockstep.
    #[default]
    TwoPools,
    /// A single pool processing `(lens, source)` pairs.
    Paired,
}

/// Configuration shared by every training-time generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Samples per chunk.
    pub chunk_size: usize,
    /// Stop after this many chunks. `None` generates forever.
    pub num_chunks: Option<usize>,
    /// Native grid of the raw images; rotation and zoom pivot on its center.
    pub image_size: ImageSize,
    /// Channels of every output array. Single-band images are replicated.
    pub channels: usize,
    pub augmentation: AugmentationParams,
    /// One entry per output array.
    pub downsampling: Vec<DownsampleSpec>,
    pub boundary: BoundaryMode,
    /// Rescale each stretched image so its maximum is 255.
    pub normalize: bool,
    /// Lanczos-resize each post-processed image to this shape.
    pub resize: Option<ImageSize>,
    pub blend_range: BlendRange,
    pub positive_dispatch: PositiveDispatch,
    /// Worker threads per pool.
    pub num_workers: usize,
    /// Minimum consecutive samples per worker job; also bounds buffered results.
    pub loadsize: usize,
    /// Seed for reproducible runs. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            num_chunks: None,
            image_size: DEFAULT_IMAGE_SIZE,
            channels: DEFAULT_CHANNELS,
            augmentation: AugmentationParams::default(),
            downsampling: vec![DownsampleSpec::identity(DEFAULT_TARGET_SIZE)],
            boundary: BoundaryMode::default(),
            normalize: true,
            resize: None,
            blend_range: BlendRange::default(),
            positive_dispatch: PositiveDispatch::default(),
            num_workers: DEFAULT_NUM_WORKERS,
            loadsize: DEFAULT_LOADSIZE,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    /// Check every field. Generators call this before doing any work.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.channels == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.num_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.loadsize == 0 {
            return Err(ConfigError::ZeroLoadsize);
        }
        self.image_size.validate("image_size")?;
        self.augmentation.validate()?;
        self.blend_range.validate()?;
        if self.downsampling.is_empty() {
            return Err(ConfigError::NoDownsampling);
        }
        for (index, spec) in self.downsampling.iter().enumerate() {
            spec.validate(index)?;
        }
        if let Some(resize) = self.resize {
            resize.validate("resize")?;
        }
        Ok(())
    }

    /// Downsampling transforms paired with their crop sizes.
    pub(crate) fn stages(&self) -> std::result::Result<Vec<(Transform, TargetSize)>, ConfigError> {
        self.downsampling
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.transform()
                    .map(|t| (t, spec.target_size))
                    .ok_or(ConfigError::DegenerateDownsample { index })
            })
            .collect()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn load_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// A fixed (non-random) augmentation applied to every evaluation sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedTransform {
    pub zoom: f64,
    /// Degrees.
    pub rotation: f64,
    /// Degrees.
    pub shear: f64,
    pub translation: (f64, f64),
}

impl Default for FixedTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl FixedTransform {
    pub const fn identity() -> Self {
        Self {
            zoom: 1.0,
            rotation: 0.0,
            shear: 0.0,
            translation: (0.0, 0.0),
        }
    }

    pub const fn rotation(degrees: f64) -> Self {
        Self {
            rotation: degrees,
            ..Self::identity()
        }
    }

    /// Mirror image of the identity, expressed with the 180° rotation+shear offset.
    pub const fn flip() -> Self {
        Self {
            rotation: 180.0,
            shear: 180.0,
            ..Self::identity()
        }
    }

    pub fn transform(&self, image_size: ImageSize) -> Transform {
        build_augmentation_transform(
            self.zoom,
            self.rotation,
            self.shear,
            DVec2::new(self.translation.0, self.translation.1),
            image_size,
        )
    }
}

/// Settings specific to the deterministic evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Output rows per chunk. Each sample fills `augmentation_transforms.len()` rows.
    pub chunk_size: usize,
    pub augmentation_transforms: Vec<FixedTransform>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_EVALUATION_CHUNK_SIZE,
            augmentation_transforms: vec![FixedTransform::identity()],
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self, image_size: ImageSize) -> std::result::Result<(), ConfigError> {
        let transforms = self.augmentation_transforms.len();
        if transforms == 0 {
            return Err(ConfigError::NoFixedTransforms);
        }
        if self.chunk_size < transforms {
            return Err(ConfigError::EvaluationChunkTooSmall {
                chunk_size: self.chunk_size,
                transforms,
            });
        }
        for (index, fixed) in self.augmentation_transforms.iter().enumerate() {
            if !fixed.zoom.is_finite() || fixed.zoom <= 0.0 || !fixed.transform(image_size).is_valid()
            {
                return Err(ConfigError::DegenerateFixedTransform { index });
            }
        }
        Ok(())
    }

    /// Distinct samples per chunk; only the last chunk may hold fewer.
    pub fn samples_per_chunk(&self) -> usize {
        self.chunk_size / self.augmentation_transforms.len().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        GeneratorConfig::default().validate().unwrap();
        EvaluationConfig::default()
            .validate(DEFAULT_IMAGE_SIZE)
            .unwrap();
    }

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = GeneratorConfig::default();
        assert_eq!(config.chunk_size, 25_000);
        assert_eq!(config.channels, 3);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.loadsize, 100);
        assert_eq!(config.augmentation.rotation_range, (0.0, 360.0));
        assert_eq!(config.augmentation.translation_range, (-4.0, 4.0));
        assert_eq!(config.downsampling.len(), 1);
        assert_eq!(config.downsampling[0].target_size, ImageSize::square(53));
        assert_eq!(config.blend_range, BlendRange { min: 0.02, max: 0.5 });
    }

    #[test]
    fn test_zero_zoom_bound_is_rejected() {
        let config = GeneratorConfig {
            augmentation: AugmentationParams {
                zoom_range: (0.0, 1.1),
                ..AugmentationParams::default()
            },
            ..GeneratorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveZoom { min: 0.0, max: 1.1 })
        );
    }

    #[test]
    fn test_negative_zoom_bound_is_rejected() {
        let params = AugmentationParams {
            zoom_range: (-1.1, -0.9),
            ..AugmentationParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NonPositiveZoom { .. })
        ));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let params = AugmentationParams {
            shear_range: (5.0, -5.0),
            ..AugmentationParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::InvertedRange {
                name: "shear_range",
                min: 5.0,
                max: -5.0
            })
        );
    }

    #[test]
    fn test_non_finite_range_is_rejected() {
        let params = AugmentationParams {
            translation_range: (f64::NAN, 1.0),
            ..AugmentationParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NonFiniteRange {
                name: "translation_range",
                ..
            })
        ));
    }

    #[test]
    fn test_structural_fields_are_checked() {
        let base = GeneratorConfig::default();
        let cases = [
            (
                GeneratorConfig {
                    chunk_size: 0,
                    ..base.clone()
                },
                ConfigError::ZeroChunkSize,
            ),
            (
                GeneratorConfig {
                    channels: 0,
                    ..base.clone()
                },
                ConfigError::ZeroChannels,
            ),
            (
                GeneratorConfig {
                    num_workers: 0,
                    ..base.clone()
                },
                ConfigError::ZeroWorkers,
            ),
            (
                GeneratorConfig {
                    loadsize: 0,
                    ..base.clone()
                },
                ConfigError::ZeroLoadsize,
            ),
            (
                GeneratorConfig {
                    downsampling: vec![],
                    ..base.clone()
                },
                ConfigError::NoDownsampling,
            ),
        ];
        for (config, expected) in cases {
            assert_eq!(config.validate(), Err(expected));
        }
    }

    #[test]
    fn test_invalid_downsampling_entries() {
        let mut config = GeneratorConfig::default();
        config.downsampling.push(DownsampleSpec {
            ds_factor: 0.0,
            ..DownsampleSpec::identity(DEFAULT_TARGET_SIZE)
        });
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDownsampleFactor {
                index: 1,
                ds_factor: 0.0
            })
        );

        config.downsampling[1] = DownsampleSpec {
            ds_factor: 0.5,
            subpixel_shift: true,
            ..DownsampleSpec::identity(DEFAULT_TARGET_SIZE)
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SubpixelShiftFactor { index: 1, .. })
        ));

        config.downsampling[1] = DownsampleSpec::identity(ImageSize::new(0, 10));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptySize { .. })
        ));
    }

    #[test]
    fn test_blend_range_validation() {
        assert!(BlendRange { min: 0.5, max: 0.1 }.validate().is_err());
        assert!(BlendRange { min: -0.1, max: 0.1 }.validate().is_err());
        assert!(BlendRange { min: 0.3, max: 0.3 }.validate().is_ok());
    }

    #[test]
    fn test_stages_follow_downsampling_order() {
        let config = GeneratorConfig {
            downsampling: vec![
                DownsampleSpec::identity(ImageSize::square(53)),
                DownsampleSpec::downsample(2.0, DEFAULT_IMAGE_SIZE, ImageSize::square(25)),
            ],
            ..GeneratorConfig::default()
        };
        let stages = config.stages().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].1, ImageSize::square(53));
        assert_eq!(stages[1].1, ImageSize::square(25));
    }

    #[test]
    fn test_yaml_roundtrip_keeps_fields() -> anyhow::Result<()> {
        let config = GeneratorConfig {
            chunk_size: 64,
            num_chunks: Some(3),
            resize: Some(ImageSize::square(60)),
            boundary: BoundaryMode::Constant(0.0),
            seed: Some(7),
            ..GeneratorConfig::default()
        };
        let yaml = config.to_yaml_string()?;
        let parsed = GeneratorConfig::from_yaml_str(&yaml)?;
        assert_eq!(parsed, config);
        Ok(())
    }

    #[test]
    fn test_partial_yaml_uses_defaults() -> anyhow::Result<()> {
        let yaml = "chunk_size: 16\nnum_workers: 4\naugmentation:\n  zoom_range: [0.9, 1.1]\n";
        let config = GeneratorConfig::from_yaml_str(yaml)?;
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.augmentation.zoom_range, (0.9, 1.1));
        assert_eq!(config.augmentation.rotation_range, (0.0, 360.0));
        assert_eq!(config.loadsize, DEFAULT_LOADSIZE);
        Ok(())
    }

    #[test]
    fn test_invalid_yaml_config_fails_fast() {
        let yaml = "augmentation:\n  zoom_range: [0.0, 1.0]\n";
        let err = GeneratorConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::NonPositiveZoom { .. })
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let err = GeneratorConfig::load_yaml("/nonexistent/lensgen.yaml").unwrap_err();
        assert!(matches!(err, Error::ConfigIo { .. }));
    }

    #[test]
    fn test_evaluation_config_validation() {
        let empty = EvaluationConfig {
            augmentation_transforms: vec![],
            ..EvaluationConfig::default()
        };
        assert_eq!(
            empty.validate(DEFAULT_IMAGE_SIZE),
            Err(ConfigError::NoFixedTransforms)
        );

        let small = EvaluationConfig {
            chunk_size: 1,
            augmentation_transforms: vec![FixedTransform::identity(), FixedTransform::flip()],
        };
        assert!(matches!(
            small.validate(DEFAULT_IMAGE_SIZE),
            Err(ConfigError::EvaluationChunkTooSmall { .. })
        ));

        let degenerate = EvaluationConfig {
            augmentation_transforms: vec![FixedTransform {
                zoom: 0.0,
                ..FixedTransform::identity()
            }],
            ..EvaluationConfig::default()
        };
        assert_eq!(
            degenerate.validate(DEFAULT_IMAGE_SIZE),
            Err(ConfigError::DegenerateFixedTransform { index: 0 })
        );
    }

    #[test]
    fn test_samples_per_chunk_divides_rows() {
        let eval = EvaluationConfig {
            chunk_size: 10,
            augmentation_transforms: vec![FixedTransform::identity(), FixedTransform::flip(), FixedTransform::rotation(90.0)],
        };
        assert_eq!(eval.samples_per_chunk(), 3);
    }
}
