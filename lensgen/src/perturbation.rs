//! Random augmentation sampling.

use glam::DVec2;
use rand::Rng;

use crate::config::{AugmentationParams, ImageSize};
use crate::transform::{build_augmentation_transform, Transform};

/// One draw of augmentation parameters. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    pub zoom: f64,
    pub rotation: f64,
    pub shear: f64,
    pub translation: DVec2,
    pub flipped: bool,
}

impl Perturbation {
    /// Draw parameters from `params`.
    ///
    /// Translation is drawn independently per axis. Zoom is log-uniform. A
    /// flip adds 180° to both rotation and shear, which mirrors the image.
    pub fn sample<R: Rng + ?Sized>(params: &AugmentationParams, rng: &mut R) -> Self {
        let (t_lo, t_hi) = params.translation_range;
        let translation = DVec2::new(
            rng.random_range(t_lo..=t_hi),
            rng.random_range(t_lo..=t_hi),
        );
        let mut rotation = rng.random_range(params.rotation_range.0..=params.rotation_range.1);
        let mut shear = rng.random_range(params.shear_range.0..=params.shear_range.1);

        let flipped = params.allow_flip && rng.random_bool(0.5);
        if flipped {
            rotation += 180.0;
            shear += 180.0;
        }

        let (z_lo, z_hi) = params.zoom_range;
        let zoom = rng.random_range(z_lo.ln()..=z_hi.ln()).exp();

        Self {
            zoom,
            rotation,
            shear,
            translation,
            flipped,
        }
    }

    pub fn transform(&self, image_size: ImageSize) -> Transform {
        build_augmentation_transform(
            self.zoom,
            self.rotation,
            self.shear,
            self.translation,
            image_size,
        )
    }
}

/// Random augmentation transform centered on an `image_size` grid.
pub fn random_perturbation_transform<R: Rng + ?Sized>(
    params: &AugmentationParams,
    image_size: ImageSize,
    rng: &mut R,
) -> Transform {
    Perturbation::sample(params, rng).transform(image_size)
}
