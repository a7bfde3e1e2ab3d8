//! Multi-resolution image pyramid.

use burn::tensor::backend::Backend;

use super::downsample::DownsampleFilter;
use super::gaussian::GaussianFilter;
use crate::image::Image;
use crate::spatial::Spacing;

/// Multi-resolution image pyramid.
///
/// Levels are ordered from coarsest to finest. Used for coarse-to-fine
/// volume registration.
pub struct MultiResolutionPyramid<B: Backend, const D: usize> {
    images: Vec<Image<B, D>>,
}

impl<B: Backend, const D: usize> MultiResolutionPyramid<B, D> {
    /// Create a pyramid from an input image and schedules.
    ///
    /// # Arguments
    /// * `input` - The full-resolution image.
    /// * `shrink_factors` - Shrink factors for each level `[level][axis]`.
    /// * `smoothing_sigmas` - Physical smoothing sigmas for each level `[level][axis]`.
    ///
    /// # Panics
    /// Panics if the schedules have different lengths.
    pub fn new(input: &Image<B, D>, shrink_factors: &[Vec<usize>], smoothing_sigmas: &[Vec<f64>]) -> Self {
        assert_eq!(shrink_factors.len(), smoothing_sigmas.len(), "Schedule lengths must match");

        let images = shrink_factors
            .iter()
            .zip(smoothing_sigmas.iter())
            .map(|(factors, sigmas)| {
                let smoothed = if sigmas.iter().any(|&s| s > 1e-6) {
                    GaussianFilter::new(sigmas.clone()).apply(input)
                } else {
                    input.clone()
                };
                if factors.iter().all(|&f| f <= 1) {
                    smoothed
                } else {
                    DownsampleFilter::new(factors.clone()).apply(&smoothed)
                }
            })
            .collect();

        Self { images }
    }

    /// Pyramid without smoothing, for masks.
    pub fn shrink_only(input: &Image<B, D>, shrink_factors: &[Vec<usize>]) -> Self {
        let sigmas = vec![vec![0.0; D]; shrink_factors.len()];
        Self::new(input, shrink_factors, &sigmas)
    }

    pub fn get_level(&self, level: usize) -> &Image<B, D> {
        &self.images[level]
    }

    pub fn levels(&self) -> usize {
        self.images.len()
    }

    /// Power-of-two schedule for `levels` levels.
    ///
    /// Level `l` shrinks by `2^(levels - 1 - l)` and smooths with a sigma of
    /// half the factor, in pixels of `spacing`.
    /// E.g. levels=3 -> factors [4, 2, 1], sigmas [2, 1, 0] pixels.
    pub fn default_schedule(levels: usize, spacing: &Spacing<D>) -> (Vec<Vec<usize>>, Vec<Vec<f64>>) {
        (0..levels)
            .map(|level| {
                let factor = 2usize.pow((levels - 1 - level) as u32);
                let sigma_pixels = if factor > 1 { 0.5 * factor as f64 } else { 0.0 };
                let sigmas = (0..D).map(|axis| sigma_pixels * spacing[axis]).collect();
                (vec![factor; D], sigmas)
            })
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::spacing;
    use burn_ndarray::NdArray;

    #[test]
    fn test_default_schedule() {
        let (factors, sigmas) = MultiResolutionPyramid::<NdArray<f32>, 3>::default_schedule(3, &spacing([1.0, 1.0, 2.0]));
        assert_eq!(factors, vec![vec![4; 3], vec![2; 3], vec![1; 3]]);
        assert_eq!(sigmas[0], vec![2.0, 2.0, 4.0]);
        assert_eq!(sigmas[2], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_levels_shrink() {
        let device = Default::default();
        let image = Image::<NdArray<f32>, 3>::from_pixels(vec![1.0; 8 * 8 * 8], [8, 8, 8], spacing([1.0, 1.0, 1.0]), &device);
        let (factors, sigmas) = MultiResolutionPyramid::<NdArray<f32>, 3>::default_schedule(3, image.spacing());
        let pyramid = MultiResolutionPyramid::new(&image, &factors, &sigmas);
        assert_eq!(pyramid.levels(), 3);
        assert_eq!(pyramid.get_level(0).size(), [2, 2, 2]);
        assert_eq!(pyramid.get_level(2).size(), [8, 8, 8]);

        let masks = MultiResolutionPyramid::shrink_only(&image, &factors);
        assert!(masks.get_level(1).to_pixels().iter().all(|&v| v == 1.0));
    }
}
