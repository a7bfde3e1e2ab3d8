//! Fixed-image sampling.
//!
//! Samples are the physical centres of fixed pixels inside the fixed mask.
//! They are gathered once per registration run; every iteration maps the same
//! points into the moving image.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use histostack_core::image::{grid_indices, Image};
use histostack_core::spatial::Point;

use crate::error::{RegistrationError, Result};

/// Fixed sample points and their intensities.
#[derive(Debug, Clone)]
pub struct FixedSamples<B: Backend> {
    /// Physical points `[N, D]`.
    pub points: Tensor<B, 2>,
    /// Fixed intensities `[N]`.
    pub values: Tensor<B, 1>,
    pub range: (f64, f64),
    len: usize,
}

impl<B: Backend> FixedSamples<B> {
    /// Gather samples from `fixed` inside `mask` (every pixel when `None`).
    ///
    /// With `max_samples`, a deterministic strided subset of at most that
    /// many samples is kept. An empty mask fails with `TooFewSamples`.
    pub fn gather<const D: usize>(
        fixed: &Image<B, D>,
        mask: Option<&Image<B, D>>,
        max_samples: Option<usize>,
    ) -> Result<Self> {
        let pixels = fixed.to_pixels();
        let inside: Vec<bool> = match mask {
            Some(mask) => {
                if mask.shape() != fixed.shape() {
                    return Err(RegistrationError::ShapeMismatch {
                        expected: fixed.shape().to_vec(),
                        actual: mask.shape().to_vec(),
                    });
                }
                mask.to_pixels().into_iter().map(|v| v > 0.0).collect()
            }
            None => vec![true; pixels.len()],
        };

        let candidates: Vec<usize> = (0..pixels.len()).filter(|&i| inside[i]).collect();
        if candidates.is_empty() {
            return Err(RegistrationError::too_few_samples(0, 1));
        }
        let chosen = stride(&candidates, max_samples);

        let grid = grid_indices(fixed.shape());
        let mut coords = Vec::with_capacity(chosen.len() * D);
        let mut values = Vec::with_capacity(chosen.len());
        for &flat in &chosen {
            let index = Point::<D>::from(grid[flat].map(|i| i as f64));
            let point = fixed.transform_continuous_index_to_physical_point(&index);
            coords.extend(point.iter().map(|&c| c as f32));
            values.push(pixels[flat]);
        }

        let range = values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        });

        let len = values.len();
        let device = fixed.data().device();
        Ok(Self {
            points: Tensor::from_data(TensorData::new(coords, Shape::new([len, D])), &device),
            values: Tensor::from_data(TensorData::new(values, Shape::new([len])), &device),
            range,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest number of valid samples an evaluation may have: a quarter of
    /// the samples, and never zero.
    pub fn required_valid(&self) -> usize {
        self.len.div_ceil(4).max(1)
    }
}

/// At most `max` evenly strided entries of `candidates`.
fn stride(candidates: &[usize], max: Option<usize>) -> Vec<usize> {
    match max {
        Some(max) if max > 0 && candidates.len() > max => {
            let step = candidates.len() as f64 / max as f64;
            (0..max).map(|k| candidates[(k as f64 * step) as usize]).collect()
        }
        _ => candidates.to_vec(),
    }
}

/// Lowest and highest pixel value of `image`.
pub fn intensity_range<B: Backend, const D: usize>(image: &Image<B, D>) -> (f64, f64) {
    image
        .to_pixels()
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v as f64), hi.max(v as f64)))
}
