//! Post-processing applied to augmented images before they enter a chunk.
//!
//! The standard pipeline ([`finalize`]) is: clip to the image's own maximum,
//! zero out negatives, square-root stretch, optionally rescale to `[0, 255]`,
//! optionally Lanczos-resize to a fixed shape. Composed positives are blended
//! with [`blend_positive`] first.

use std::f32::consts::PI;
use std::sync::OnceLock;

use crate::config::ImageSize;
use crate::error::{Error, Result};
use crate::image::Image;

/// Clip every value to the image's own maximum.
///
/// This never changes anything: no value exceeds the maximum it defines. The
/// step is kept so the pipeline matches the reference processing exactly;
/// negatives are handled by [`zero_negatives`].
pub fn clip_to_own_max(image: &mut Image) {
    let max = image.max();
    image.map_in_place(|v| if v > max { max } else { v });
}

pub fn zero_negatives(image: &mut Image) {
    image.map_in_place(|v| if v < 0.0 { 0.0 } else { v });
}

pub fn sqrt_stretch(image: &mut Image) {
    image.map_in_place(f32::sqrt);
}

/// Divide by the maximum and scale to 255. Images whose maximum is not
/// positive are left untouched.
pub fn normalize_to_255(image: &mut Image) {
    let max = image.max();
    if max > 0.0 && max.is_finite() {
        let scale = 255.0 / max;
        image.map_in_place(|v| v * scale);
    }
}

/// Full post-processing of one augmented image.
pub fn finalize(mut image: Image, normalize: bool, resize: Option<ImageSize>) -> Image {
    clip_to_own_max(&mut image);
    zero_negatives(&mut image);
    sqrt_stretch(&mut image);
    if normalize {
        normalize_to_255(&mut image);
    }
    match resize {
        Some(size) => resize_lanczos3(&image, size),
        None => image,
    }
}

/// Additively blend a source into a lens, calibrated to the lens brightness.
///
/// `blended_i = lens_i + source_i / max(source) * max(lens) * factor`, with both
/// maxima taken over all targets of the respective sample. A source whose
/// maximum is not positive contributes nothing.
pub fn blend_positive(lens: &[Image], source: &[Image], factor: f32) -> Result<Vec<Image>> {
    if lens.len() != source.len() {
        return Err(Error::ShapeMismatch {
            what: "blend target count",
            expected: (lens.len(), 0, 0),
            actual: (source.len(), 0, 0),
        });
    }
    for (l, s) in lens.iter().zip(source) {
        if l.shape() != s.shape() {
            return Err(Error::ShapeMismatch {
                what: "blend source",
                expected: l.shape(),
                actual: s.shape(),
            });
        }
    }

    let max_lens = global_max(lens);
    let max_source = global_max(source);
    let scale = if max_source > 0.0 && max_source.is_finite() && max_lens.is_finite() {
        max_lens / max_source * factor
    } else {
        0.0
    };

    Ok(lens
        .iter()
        .zip(source)
        .map(|(l, s)| {
            let mut blended = l.clone();
            for (b, &sv) in blended.pixels_mut().iter_mut().zip(s.pixels()) {
                *b += sv * scale;
            }
            blended
        })
        .collect())
}

fn global_max(images: &[Image]) -> f32 {
    images.iter().map(Image::max).fold(f32::NEG_INFINITY, f32::max)
}

// ============================================================================
// Lanczos-3 resize
// ============================================================================

const LANCZOS_A: usize = 3;
const LANCZOS_LUT_RESOLUTION: usize = 4096;

#[inline]
fn lanczos_kernel_direct(x: f32, a: f32) -> f32 {
    if x.abs() < 1e-6 {
        return 1.0;
    }
    if x.abs() >= a {
        return 0.0;
    }
    let pi_x = PI * x;
    let pi_x_a = pi_x / a;
    (pi_x.sin() / pi_x) * (pi_x_a.sin() / pi_x_a)
}

/// Lanczos-3 kernel sampled on `[0, 3]`.
#[derive(Debug)]
struct LanczosLut {
    values: Vec<f32>,
}

impl LanczosLut {
    fn new() -> Self {
        let values = (0..=LANCZOS_A * LANCZOS_LUT_RESOLUTION)
            .map(|i| {
                lanczos_kernel_direct(i as f32 / LANCZOS_LUT_RESOLUTION as f32, LANCZOS_A as f32)
            })
            .collect();
        Self { values }
    }

    #[inline]
    fn lookup(&self, x: f32) -> f32 {
        let abs_x = x.abs();
        if abs_x >= LANCZOS_A as f32 {
            return 0.0;
        }
        let idx = (abs_x * LANCZOS_LUT_RESOLUTION as f32 + 0.5) as usize;
        self.values[idx.min(self.values.len() - 1)]
    }
}

static LANCZOS3_LUT: OnceLock<LanczosLut> = OnceLock::new();

/// Contributing input range and normalized weights of one output pixel.
struct Taps {
    start: usize,
    weights: Vec<f32>,
}

/// Per-output-pixel taps for resizing one axis from `in_size` to `out_size`.
///
/// When downscaling, the kernel is stretched by the scale factor so every
/// input pixel contributes (area-aware antialiasing).
fn axis_taps(in_size: usize, out_size: usize) -> Vec<Taps> {
    let lut = LANCZOS3_LUT.get_or_init(LanczosLut::new);
    let scale = in_size as f64 / out_size as f64;
    let filter_scale = scale.max(1.0);
    let support = LANCZOS_A as f64 * filter_scale;
    let inv_filter_scale = 1.0 / filter_scale;

    (0..out_size)
        .map(|i| {
            let center = (i as f64 + 0.5) * scale;
            let start = (center - support + 0.5).floor().max(0.0) as usize;
            let end = ((center + support + 0.5).floor() as usize).min(in_size);
            let mut weights: Vec<f32> = (start..end)
                .map(|x| lut.lookup(((x as f64 - center + 0.5) * inv_filter_scale) as f32))
                .collect();
            let sum: f32 = weights.iter().sum();
            if sum != 0.0 {
                weights.iter_mut().for_each(|w| *w /= sum);
            }
            Taps { start, weights }
        })
        .collect()
}

/// Separable Lanczos-3 resize of every channel to `size`.
///
/// Axes whose size does not change are passed through untouched.
pub fn resize_lanczos3(image: &Image, size: ImageSize) -> Image {
    let channels = image.channels();
    let (in_w, in_h) = (image.width(), image.height());
    if (in_w, in_h) == (size.width, size.height) {
        return image.clone();
    }
    if in_w == 0 || in_h == 0 || channels == 0 {
        return Image::zeros(size.width, size.height, channels);
    }

    let horizontal = if in_w == size.width {
        image.clone()
    } else {
        let taps = axis_taps(in_w, size.width);
        let src = image.pixels();
        let mut out = Image::zeros(size.width, in_h, channels);
        let dst = out.pixels_mut();
        for y in 0..in_h {
            for (x, tap) in taps.iter().enumerate() {
                let out_base = (y * size.width + x) * channels;
                for (k, &w) in tap.weights.iter().enumerate() {
                    let in_base = (y * in_w + tap.start + k) * channels;
                    for c in 0..channels {
                        dst[out_base + c] += w * src[in_base + c];
                    }
                }
            }
        }
        out
    };

    if in_h == size.height {
        return horizontal;
    }

    let taps = axis_taps(in_h, size.height);
    let src = horizontal.pixels();
    let row_len = size.width * channels;
    let mut out = Image::zeros(size.width, size.height, channels);
    let dst = out.pixels_mut();
    for (y, tap) in taps.iter().enumerate() {
        let out_row = &mut dst[y * row_len..(y + 1) * row_len];
        for (k, &w) in tap.weights.iter().enumerate() {
            let in_row = &src[(tap.start + k) * row_len..(tap.start + k + 1) * row_len];
            for (o, &v) in out_row.iter_mut().zip(in_row) {
                *o += w * v;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Buffer2;

    fn ramp(width: usize, height: usize, offset: f32) -> Image {
        let band = Buffer2::from_fn(width, height, |x, y| (x + y * width) as f32 + offset);
        Image::from_single_band(&band, 3)
    }

    #[test]
    fn test_clip_to_own_max_is_noop() {
        let original = Image::new(2, 2, 1, vec![-3.0, 0.5, 12.0, 7.0]);
        let mut clipped = original.clone();
        clip_to_own_max(&mut clipped);
        assert_eq!(clipped, original);
    }

    #[test]
    fn test_zero_negatives_then_sqrt() {
        let mut img = Image::new(4, 1, 1, vec![-4.0, 0.0, 4.0, 9.0]);
        zero_negatives(&mut img);
        sqrt_stretch(&mut img);
        assert_eq!(img.pixels(), &[0.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_finalize_normalizes_peak_to_255() {
        let img = ramp(5, 5, -3.0);
        let out = finalize(img, true, None);
        assert!((out.max() - 255.0).abs() < 1e-3, "max {}", out.max());
        assert!(out.pixels().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_finalize_without_normalize_keeps_sqrt_scale() {
        let img = Image::new(2, 1, 1, vec![16.0, 25.0]);
        let out = finalize(img, false, None);
        assert_eq!(out.pixels(), &[4.0, 5.0]);
    }

    #[test]
    fn test_double_finalize_changes_values() {
        let once = finalize(ramp(6, 6, 1.0), true, None);
        let twice = finalize(once.clone(), true, None);
        let max_diff = once
            .pixels()
            .iter()
            .zip(twice.pixels())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_diff > 1.0, "double stretch must change values, max diff {max_diff}");
        // The peak is pinned by normalization either way.
        assert!((twice.max() - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_all_zero_image_stays_zero() {
        let out = finalize(Image::zeros(3, 3, 3), true, None);
        assert!(out.pixels().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_resize_changes_shape() {
        let out = resize_lanczos3(&ramp(53, 53, 0.0), ImageSize::square(60));
        assert_eq!(out.shape(), (60, 60, 3));
        let out = resize_lanczos3(&ramp(53, 41, 0.0), ImageSize::new(20, 30));
        assert_eq!(out.shape(), (30, 20, 3));
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let img = ramp(7, 7, 0.0);
        assert_eq!(resize_lanczos3(&img, ImageSize::square(7)), img);
    }

    #[test]
    fn test_resize_preserves_constant_images() {
        let img = Image::new(9, 9, 1, vec![3.5; 81]);
        for size in [ImageSize::square(4), ImageSize::square(20), ImageSize::new(13, 5)] {
            let out = resize_lanczos3(&img, size);
            for &v in out.pixels() {
                assert!((v - 3.5).abs() < 1e-4, "{size:?}: {v}");
            }
        }
    }

    #[test]
    fn test_resize_keeps_channels_apart() {
        let planes = [
            Buffer2::new_filled(10, 10, 1.0),
            Buffer2::new_filled(10, 10, 2.0),
            Buffer2::new_filled(10, 10, 3.0),
        ];
        let out = resize_lanczos3(&Image::from_planes(&planes), ImageSize::square(6));
        for px in out.pixels().chunks_exact(3) {
            assert!((px[0] - 1.0).abs() < 1e-4);
            assert!((px[1] - 2.0).abs() < 1e-4);
            assert!((px[2] - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_blend_respects_brightness_bounds() {
        let lens = vec![ramp(8, 8, 0.0), ramp(4, 4, 0.0)];
        let source = vec![ramp(8, 8, 5.0), ramp(4, 4, 5.0)];
        let max_lens = 63.0;
        let (range_min, range_max) = (0.02f32, 0.5f32);

        for factor in [range_min, 0.2, range_max] {
            let blended = blend_positive(&lens, &source, factor).unwrap();
            let peak = global_max(&blended);
            assert!(peak <= max_lens * (1.0 + factor) + 1e-3, "factor {factor}: {peak}");
            assert!(peak >= max_lens * range_min, "factor {factor}: {peak}");
            // The source peak lands at exactly factor * max(lens).
            assert!((peak - max_lens * (1.0 + factor)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_blend_roles_are_not_symmetric() {
        let a = vec![Image::new(2, 1, 1, vec![10.0, 0.0])];
        let b = vec![Image::new(2, 1, 1, vec![0.0, 1.0])];
        let ab = blend_positive(&a, &b, 0.5).unwrap();
        let ba = blend_positive(&b, &a, 0.5).unwrap();
        assert_eq!(ab[0].pixels(), &[10.0, 5.0]);
        assert_eq!(ba[0].pixels(), &[0.5, 1.0]);
    }

    #[test]
    fn test_blend_with_dark_source_returns_lens() {
        let lens = vec![ramp(3, 3, 1.0)];
        let source = vec![Image::zeros(3, 3, 3)];
        let blended = blend_positive(&lens, &source, 0.3).unwrap();
        assert_eq!(blended, lens);
    }

    #[test]
    fn test_blend_rejects_mismatched_shapes() {
        let lens = vec![Image::zeros(3, 3, 3)];
        let source = vec![Image::zeros(4, 3, 3)];
        assert!(matches!(
            blend_positive(&lens, &source, 0.1),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
