//! Chunk buffers handed to the consumer.

use crate::error::{Error, Result};
use crate::image::Image;
use crate::processor::SampleRef;

/// Dense `[len, height, width, channels]` float array, one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkArray {
    len: usize,
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<f32>,
}

impl ChunkArray {
    pub fn zeros(len: usize, height: usize, width: usize, channels: usize) -> Self {
        Self {
            len,
            height,
            width,
            channels,
            data: vec![0.0; len * height * width * channels],
        }
    }

    /// `[len, height, width, channels]`.
    pub fn shape(&self) -> [usize; 4] {
        [self.len, self.height, self.width, self.channels]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn row_len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn row(&self, k: usize) -> &[f32] {
        let n = self.row_len();
        &self.data[k * n..(k + 1) * n]
    }

    pub fn row_mut(&mut self, k: usize) -> &mut [f32] {
        let n = self.row_len();
        &mut self.data[k * n..(k + 1) * n]
    }

    /// Copy `image` into row `k`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the image does not match the row shape.
    pub fn write_row(&mut self, k: usize, image: &Image) -> Result<()> {
        let expected = (self.height, self.width, self.channels);
        if image.shape() != expected {
            return Err(Error::ShapeMismatch {
                what: "chunk row",
                expected,
                actual: image.shape(),
            });
        }
        self.row_mut(k).copy_from_slice(image.pixels());
        Ok(())
    }

    /// Row `k` as an owned image.
    pub fn image(&self, k: usize) -> Image {
        Image::new(self.width, self.height, self.channels, self.row(k).to_vec())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// One batch of augmented samples.
///
/// Row `k` of every array, of `labels` and of `samples` describes the same
/// sample, in the order the samples were dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// One array per configured output size.
    pub arrays: Vec<ChunkArray>,
    /// `None` for evaluation chunks.
    pub labels: Option<Vec<i32>>,
    /// Dataset address behind each row.
    pub samples: Vec<SampleRef>,
}

impl Chunk {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
