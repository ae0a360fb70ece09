//! Multi-channel float image.

use common::Buffer2;

/// Height × width × channels image with interleaved channels.
///
/// Pixel `(x, y)` channel `c` lives at `(y * width + x) * channels + c`, which is
/// also the layout of one row of a chunk array.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    channels: usize,
    pixels: Vec<f32>,
}

impl Image {
    pub fn new(width: usize, height: usize, channels: usize, pixels: Vec<f32>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height * channels,
            "pixels length must equal width * height * channels"
        );
        Self {
            width,
            height,
            channels,
            pixels,
        }
    }

    pub fn zeros(width: usize, height: usize, channels: usize) -> Self {
        Self::new(width, height, channels, vec![0.0; width * height * channels])
    }

    /// Replicate a single-band image across `channels` identical channels.
    pub fn from_single_band(band: &Buffer2<f32>, channels: usize) -> Self {
        let mut pixels = Vec::with_capacity(band.len() * channels);
        for &v in band.iter() {
            pixels.extend(std::iter::repeat_n(v, channels));
        }
        Self::new(band.width(), band.height(), channels, pixels)
    }

    /// Interleave equally sized planes into one image.
    ///
    /// # Panics
    /// Panics if `planes` is empty or the planes differ in size.
    pub fn from_planes(planes: &[Buffer2<f32>]) -> Self {
        assert!(!planes.is_empty(), "at least one plane is required");
        let width = planes[0].width();
        let height = planes[0].height();
        let channels = planes.len();
        for plane in planes {
            assert_eq!(
                (plane.width(), plane.height()),
                (width, height),
                "all planes must have the same size"
            );
        }

        let mut pixels = Vec::with_capacity(width * height * channels);
        for i in 0..width * height {
            for plane in planes {
                pixels.push(plane.pixels()[i]);
            }
        }
        Self::new(width, height, channels, pixels)
    }

    /// Copy channel `c` out as a standalone plane.
    pub fn plane(&self, c: usize) -> Buffer2<f32> {
        assert!(c < self.channels, "channel {c} out of range");
        let pixels = self
            .pixels
            .iter()
            .skip(c)
            .step_by(self.channels)
            .copied()
            .collect();
        Buffer2::new(self.width, self.height, pixels)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `(height, width, channels)`, the order used for chunk arrays.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [f32] {
        &mut self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        debug_assert!(x < self.width && y < self.height && c < self.channels);
        self.pixels[(y * self.width + x) * self.channels + c]
    }

    /// Largest value over all channels, ignoring NaN.
    pub fn max(&self) -> f32 {
        self.pixels.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn map_in_place(&mut self, f: impl Fn(f32) -> f32) {
        self.pixels.iter_mut().for_each(|v| *v = f(*v));
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.pixels
    }
}
