//! Separable Gaussian smoothing in physical units.

use burn::tensor::backend::Backend;
use burn::tensor::module::conv1d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;

use crate::image::Image;
use crate::spatial::Spacing;

/// Kernels are truncated at this many standard deviations.
const TRUNCATION: f64 = 3.0;
const DEFAULT_MAX_RADIUS: usize = 16;

/// Smooths each axis with a sampled Gaussian, replicating edge pixels so
/// that a constant image stays constant up to its border.
pub struct GaussianFilter<B: Backend> {
    /// Standard deviation per physical axis `(x, y[, z])`; a single value
    /// applies to every axis.
    sigmas: Vec<f64>,
    max_radius: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    pub fn new(sigmas: Vec<f64>) -> Self {
        Self {
            sigmas,
            max_radius: DEFAULT_MAX_RADIUS,
            _b: std::marker::PhantomData,
        }
    }

    /// Cap the kernel radius in pixels.
    pub fn with_max_radius(mut self, radius: usize) -> Self {
        self.max_radius = radius;
        self
    }

    pub fn apply<const D: usize>(&self, image: &Image<B, D>) -> Image<B, D> {
        let data = self.apply_tensor(image.data().clone(), image.spacing());
        image.clone().with_data(data)
    }

    pub fn apply_tensor<const D: usize>(&self, input: Tensor<B, D>, spacing: &Spacing<D>) -> Tensor<B, D> {
        let mut data = input;
        for axis in 0..D {
            let sigma = self.sigma(axis) / spacing[axis];
            if sigma <= 1e-6 {
                continue;
            }
            let radius = ((TRUNCATION * sigma).ceil() as usize).clamp(1, self.max_radius.max(1));
            // tensor dim D-1-axis holds physical axis `axis`
            data = smooth_dim(data, D - 1 - axis, &kernel(sigma, radius));
        }
        data
    }

    fn sigma(&self, axis: usize) -> f64 {
        self.sigmas.get(axis).or(self.sigmas.first()).copied().unwrap_or(0.0)
    }
}

/// Normalised samples of a Gaussian of `sigma` pixels on `-radius..=radius`.
fn kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / total) as f32).collect()
}

/// Convolve every line along `dim` with `weights`.
fn smooth_dim<B: Backend, const D: usize>(input: Tensor<B, D>, dim: usize, weights: &[f32]) -> Tensor<B, D> {
    let length = input.dims()[dim];
    if length < 2 {
        return input;
    }
    let radius = weights.len() / 2;

    // lines along `dim` become the rows of a [batch, 1, length] tensor
    let moved = input.swap_dims(dim, D - 1);
    let moved_dims = moved.dims();
    let batch = moved_dims[..D - 1].iter().product::<usize>();
    let lines = moved.reshape([batch, 1, length]);

    let first = lines.clone().slice([0..batch, 0..1, 0..1]).repeat_dim(2, radius);
    let last = lines.clone().slice([0..batch, 0..1, length - 1..length]).repeat_dim(2, radius);
    let padded = Tensor::cat(vec![first, lines, last], 2);

    let device = padded.device();
    let weights = Tensor::<B, 1>::from_floats(weights, &device).reshape([1, 1, 2 * radius + 1]);
    let smoothed = conv1d(padded, weights, None, ConvOptions::new([1], [0], [1], 1));

    smoothed.reshape(moved_dims).swap_dims(dim, D - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::spacing;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_kernel_is_normalised_and_symmetric() {
        let k = kernel(1.5, 5);
        assert_eq!(k.len(), 11);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((k[0] - k[10]).abs() < 1e-9);
        assert!(k[5] > k[4]);
    }

    #[test]
    fn test_constant_image_unchanged_at_border() {
        let device = Default::default();
        let image = Image::<TestBackend, 2>::from_pixels(vec![5.0; 9 * 12], [9, 12], spacing([1.0, 1.0]), &device);
        let smoothed = GaussianFilter::new(vec![2.0]).apply(&image).to_pixels();
        assert!(smoothed.iter().all(|v| (v - 5.0).abs() < 1e-4));
    }

    #[test]
    fn test_smooths_along_x_only() {
        let device = Default::default();
        // a single bright column at x = 4 in a [H=5, W=9] image
        let mut data = vec![0.0; 5 * 9];
        for y in 0..5 {
            data[y * 9 + 4] = 1.0;
        }
        let image = Image::<TestBackend, 2>::from_pixels(data, [5, 9], spacing([1.0, 1.0]), &device);
        let smoothed = GaussianFilter::new(vec![1.0, 0.0]).apply(&image).to_pixels();

        assert!(smoothed[2 * 9 + 4] < 1.0);
        assert!(smoothed[2 * 9 + 3] > 0.0);
        assert!((smoothed[4] - smoothed[4 * 9 + 4]).abs() < 1e-6);
        let row: f32 = smoothed[2 * 9..3 * 9].iter().sum();
        assert!((row - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_sigma_in_physical_units() {
        let device = Default::default();
        let mut data = vec![0.0; 21];
        data[10] = 1.0;
        let fine = Image::<TestBackend, 2>::from_pixels(data.clone(), [1, 21], spacing([1.0, 1.0]), &device);
        let coarse = Image::<TestBackend, 2>::from_pixels(data, [1, 21], spacing([2.0, 1.0]), &device);
        let filter = GaussianFilter::new(vec![2.0]);
        // the same physical sigma covers fewer pixels on the coarse grid
        assert!(filter.apply(&coarse).to_pixels()[10] > filter.apply(&fine).to_pixels()[10]);
    }
}
