//! Affine resampling of multi-channel images.
//!
//! [`fast_warp`] maps every output pixel through an output-to-input transform
//! and samples the input bilinearly. Reads outside the input are resolved with
//! a [`BoundaryMode`].


use glam::DVec2;

use crate::config::{BoundaryMode, ImageSize};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::transform::Transform;

/// Resolve a possibly out-of-range index. `None` means "use the constant".
#[inline]
fn resolve_index(i: i64, n: usize, mode: BoundaryMode) -> Option<usize> {
    let n_i = n as i64;
    if (0..n_i).contains(&i) {
        return Some(i as usize);
    }
    let resolved = match mode {
        BoundaryMode::Constant(_) => return None,
        BoundaryMode::Edge => i.clamp(0, n_i - 1),
        BoundaryMode::Wrap => i.rem_euclid(n_i),
        BoundaryMode::Reflect => {
            if n == 1 {
                0
            } else {
                let period = 2 * (n_i - 1);
                let m = i.rem_euclid(period);
                if m >= n_i {
                    period - m
                } else {
                    m
                }
            }
        }
        BoundaryMode::Symmetric => {
            let period = 2 * n_i;
            let m = i.rem_euclid(period);
            if m >= n_i {
                period - 1 - m
            } else {
                m
            }
        }
    };
    Some(resolved as usize)
}

/// Bilinear sample of all channels at `(x, y)`, written into `out`.
#[inline]
fn sample_bilinear(image: &Image, x: f64, y: f64, mode: BoundaryMode, out: &mut [f32]) {
    let channels = image.channels();
    let width = image.width();
    let height = image.height();
    let pixels = image.pixels();

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let cols = [
        resolve_index(x0, width, mode),
        resolve_index(x0.saturating_add(1), width, mode),
    ];
    let rows = [
        resolve_index(y0, height, mode),
        resolve_index(y0.saturating_add(1), height, mode),
    ];
    let cval = match mode {
        BoundaryMode::Constant(v) => v,
        _ => 0.0,
    };

    let fetch = |col: Option<usize>, row: Option<usize>, c: usize| -> f32 {
        match (col, row) {
            (Some(col), Some(row)) => pixels[(row * width + col) * channels + c],
            _ => cval,
        }
    };

    for (c, v) in out.iter_mut().enumerate() {
        let p00 = fetch(cols[0], rows[0], c);
        let p10 = fetch(cols[1], rows[0], c);
        let p01 = fetch(cols[0], rows[1], c);
        let p11 = fetch(cols[1], rows[1], c);
        let top = p00 + fx * (p10 - p00);
        let bottom = p01 + fx * (p11 - p01);
        *v = top + fy * (bottom - top);
    }
}

/// Warp `image` into an `output`-sized grid.
///
/// `transform` maps output pixel coordinates `(col, row)` to input
/// coordinates. Channels are resampled independently with the same
/// coordinates.
///
/// # Errors
/// [`Error::DegenerateTransform`] when the transform is singular or non-finite.
pub fn fast_warp(
    image: &Image,
    transform: &Transform,
    output: ImageSize,
    mode: BoundaryMode,
) -> Result<Image> {
    if !transform.is_valid() {
        return Err(Error::DegenerateTransform {
            determinant: transform.determinant(),
        });
    }

    let channels = image.channels();
    let mut result = Image::zeros(output.width, output.height, channels);
    if channels == 0 {
        return Ok(result);
    }
    if image.width() == 0 || image.height() == 0 {
        if let BoundaryMode::Constant(v) = mode {
            result.map_in_place(|_| v);
        }
        return Ok(result);
    }

    // Stepping one output column moves the input coordinate by the first column.
    let step = transform.as_affine().matrix2.x_axis;
    let (step_x, step_y) = (step.x, step.y);
    let row_len = output.width * channels;

    for (row, out_row) in result
        .pixels_mut()
        .chunks_exact_mut(row_len.max(1))
        .enumerate()
        .take(output.height)
    {
        let start = transform.apply(DVec2::new(0.0, row as f64));
        for (col, px) in out_row.chunks_exact_mut(channels).enumerate() {
            let x = start.x + step_x * col as f64;
            let y = start.y + step_y * col as f64;
            sample_bilinear(image, x, y, mode, px);
        }
    }

    Ok(result)
}
