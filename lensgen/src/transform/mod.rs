//! Affine transforms for augmentation and downsampling.
//!
//! All transforms used for warping map OUTPUT pixel coordinates `(x = col,
//! y = row)` to INPUT pixel coordinates. Composition follows matrix order:
//! `a.compose(&b)` applies `b` first, then `a`. A downsampled, augmented crop
//! therefore uses `augment.compose(&downsample)`.


use glam::{DAffine2, DMat3, DVec2};

use crate::config::ImageSize;
use crate::error::{Error, Result};

/// 2D affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    affine: DAffine2,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = self.affine.matrix2;
        let t = self.affine.translation;
        write!(
            f,
            "Affine([{:.4} {:.4} {:.2}] [{:.4} {:.4} {:.2}])",
            m.x_axis.x, m.y_axis.x, t.x, m.x_axis.y, m.y_axis.y, t.y
        )
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            affine: DAffine2::IDENTITY,
        }
    }

    pub fn translation(t: DVec2) -> Self {
        Self {
            affine: DAffine2::from_translation(t),
        }
    }

    pub fn scale(s: DVec2) -> Self {
        Self {
            affine: DAffine2::from_scale(s),
        }
    }

    /// Affine transform from 6 row-major parameters `[a, b, tx, c, d, ty]`:
    /// `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`.
    pub fn affine(params: [f64; 6]) -> Self {
        let [a, b, tx, c, d, ty] = params;
        Self {
            affine: DAffine2::from_cols_array(&[a, c, b, d, tx, ty]),
        }
    }

    /// Scale, then shear, then rotate, then translate.
    ///
    /// Angles are in radians. Shear tilts the y axis by `shear` relative to
    /// the rotated x axis:
    /// ```text
    /// | sx*cos(r)  -sy*sin(r+s)  tx |
    /// | sx*sin(r)   sy*cos(r+s)  ty |
    /// ```
    pub fn from_components(scale: DVec2, rotation: f64, shear: f64, translation: DVec2) -> Self {
        Self::affine([
            scale.x * rotation.cos(),
            -scale.y * (rotation + shear).sin(),
            translation.x,
            scale.x * rotation.sin(),
            scale.y * (rotation + shear).cos(),
            translation.y,
        ])
    }

    /// Exact affine transform mapping three `src` points onto three `dst` points.
    ///
    /// Returns `None` when the source points are collinear.
    pub fn from_correspondences(src: [DVec2; 3], dst: [DVec2; 3]) -> Option<Self> {
        let homogeneous = |p: [DVec2; 3]| {
            DMat3::from_cols(p[0].extend(1.0), p[1].extend(1.0), p[2].extend(1.0))
        };
        let s = homogeneous(src);
        let det = s.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let m = homogeneous(dst) * s.inverse();
        Some(Self {
            affine: DAffine2::from_mat3(m),
        })
    }

    pub fn from_affine(affine: DAffine2) -> Self {
        Self { affine }
    }

    #[inline]
    pub fn as_affine(&self) -> &DAffine2 {
        &self.affine
    }

    /// Map a point through the transform.
    #[inline]
    pub fn apply(&self, p: DVec2) -> DVec2 {
        self.affine.transform_point2(p)
    }

    /// Compose two transforms: `self * other` (apply `other` first, then `self`).
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            affine: self.affine * other.affine,
        }
    }

    /// Determinant of the linear part.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.affine.matrix2.determinant()
    }

    /// True for finite, invertible transforms.
    pub fn is_valid(&self) -> bool {
        let det = self.determinant();
        det.abs() > 1e-10 && det.is_finite() && self.affine.is_finite()
    }

    /// Elementwise closeness of the two affine maps.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f64) -> bool {
        self.affine.abs_diff_eq(other.affine, max_abs_diff)
    }

    pub fn inverse(&self) -> Result<Self> {
        if !self.is_valid() {
            return Err(Error::DegenerateTransform {
                determinant: self.determinant(),
            });
        }
        Ok(Self {
            affine: self.affine.inverse(),
        })
    }

    pub fn translation_components(&self) -> DVec2 {
        self.affine.translation
    }
}

/// Pixel-center offset of an image grid: `(width / 2 - 0.5, height / 2 - 0.5)`.
///
/// Rotation, shear and zoom pivot on this point. The result is an `(x, y)`
/// point, so the width term comes first. Row-first conventions write the same
/// shift as `(height / 2 - 0.5, width / 2 - 0.5)`; on non-square grids that
/// order would pivot off center.
pub fn center_shift(image_size: ImageSize) -> DVec2 {
    DVec2::new(
        image_size.width as f64 / 2.0 - 0.5,
        image_size.height as f64 / 2.0 - 0.5,
    )
}

/// Augmentation transform pivoting on the center of an `image_size` grid.
///
/// `zoom > 1` magnifies (the sampling scale is `1 / zoom`). Angles are in
/// degrees. The result is `uncenter * augment * center`, so the translation
/// is applied in the augmented, centered frame.
pub fn build_augmentation_transform(
    zoom: f64,
    rotation: f64,
    shear: f64,
    translation: DVec2,
    image_size: ImageSize,
) -> Transform {
    let shift = center_shift(image_size);
    let center = Transform::translation(-shift);
    let uncenter = Transform::translation(shift);
    let augment = Transform::from_components(
        DVec2::splat(1.0 / zoom),
        rotation.to_radians(),
        shear.to_radians(),
        translation,
    );
    uncenter.compose(&augment).compose(&center)
}

/// Downsampling transform from an `orig_size` grid to a `target_size` grid.
///
/// The scale is estimated from three corner correspondences so that pixel
/// areas line up the way an area-correct resize does:
/// `input = ds_factor * (output + 0.5) - 0.5`. With `do_shift` the output
/// window is centered on the input; `subpixel_shift` first truncates the input
/// size to a multiple of the integer factor so the shift stays on the pixel
/// grid.
///
/// Returns `None` for degenerate grids (a side shorter than two pixels).
pub fn build_ds_transform(
    ds_factor: f64,
    orig_size: ImageSize,
    target_size: ImageSize,
    do_shift: bool,
    subpixel_shift: bool,
) -> Option<Transform> {
    let rows = orig_size.height as f64;
    let cols = orig_size.width as f64;

    let src = [
        DVec2::new(0.0, 0.0),
        DVec2::new(0.0, rows - 1.0),
        DVec2::new(cols - 1.0, rows - 1.0),
    ];
    let dst = src.map(|p| ds_factor * (p + 0.5) - 0.5);
    let tform_ds = Transform::from_correspondences(src, dst)?;

    if !do_shift {
        return Some(tform_ds);
    }

    let (mut rows, mut cols) = (orig_size.height, orig_size.width);
    if subpixel_shift {
        let factor = (ds_factor as usize).max(1);
        cols = (cols / factor) * factor;
        rows = (rows / factor) * factor;
    }
    let shift = DVec2::new(
        cols as f64 / (2.0 * ds_factor) - target_size.width as f64 / 2.0,
        rows as f64 / (2.0 * ds_factor) - target_size.height as f64 / 2.0,
    );
    Some(tform_ds.compose(&Transform::translation(shift)))
}
