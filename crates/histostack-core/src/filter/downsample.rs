//! Integer-factor decimation.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Shape, Tensor, TensorData};

use crate::image::Image;

/// Downsample filter.
///
/// Reduces the image size by integer factors by keeping every Nth pixel,
/// starting at index 0, so the origin does not move. Spacing grows by the
/// factor.
pub struct DownsampleFilter<B: Backend> {
    factors: Vec<usize>,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> DownsampleFilter<B> {
    /// # Arguments
    /// * `factors` - Factor per physical axis `(x, y[, z])`; a single value
    ///   applies to every axis.
    pub fn new(factors: Vec<usize>) -> Self {
        Self {
            factors,
            _b: std::marker::PhantomData,
        }
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        let mut data = image.data().clone();
        let device = data.device();
        let dims: [usize; D] = data.dims();
        let mut new_spacing = *image.spacing();

        for d in 0..D {
            let axis = D - 1 - d;
            let factor = self.factors.get(axis).or(self.factors.first()).copied().unwrap_or(1);
            if factor <= 1 {
                continue;
            }

            let kept: Vec<i64> = (0..dims[d]).step_by(factor).map(|x| x as i64).collect();
            let len = kept.len();
            let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(kept, Shape::new([len])), &device);
            data = data.select(d, indices);

            new_spacing[axis] *= factor as f64;
        }

        image.clone().with_data(data).with_spacing(new_spacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::spacing;
    use burn_ndarray::NdArray;

    #[test]
    fn test_factor_per_axis() {
        let device = Default::default();
        let pixels: Vec<f32> = (0..6 * 10).map(|v| v as f32).collect();
        let image = Image::<NdArray<f32>, 2>::from_pixels(pixels, [6, 10], spacing([0.5, 2.0]), &device);

        // x by 2, y by 3
        let small = DownsampleFilter::new(vec![2, 3]).apply(&image);
        assert_eq!(small.size(), [5, 2]);
        assert_eq!(small.spacing(), &spacing([1.0, 6.0]));
        let values = small.to_pixels();
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 2.0);
        assert_eq!(values[5], 30.0);
    }
}
