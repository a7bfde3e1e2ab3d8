//! Mattes mutual information metric.
//!
//! The joint histogram is Parzen-windowed: each fixed intensity lands in one
//! bin (zero-order window), while each moving intensity spreads over four
//! neighbouring bins through a cubic B-spline. The B-spline window is what
//! makes the histogram, and hence the metric, differentiable with respect to
//! the moving intensities.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::{column, Metric, SampleSet};

/// Bins left empty on each side of the intensity range so the B-spline
/// window never falls off the histogram.
const PADDING: usize = 2;

/// Fewest bins that leave one usable bin between the paddings.
pub const MIN_HISTOGRAM_BINS: usize = 2 * PADDING + 1;

const EPSILON: f64 = 1e-10;

/// Mattes mutual information, returned as `-MI`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MattesMutualInformation {
    histogram_bins: usize,
}

impl MattesMutualInformation {
    /// # Panics
    /// Panics with fewer than [`MIN_HISTOGRAM_BINS`] bins.
    pub fn new(histogram_bins: usize) -> Self {
        assert!(
            histogram_bins >= MIN_HISTOGRAM_BINS,
            "Mattes mutual information needs at least {} histogram bins, got {}",
            MIN_HISTOGRAM_BINS,
            histogram_bins
        );
        Self { histogram_bins }
    }

    pub fn histogram_bins(&self) -> usize {
        self.histogram_bins
    }

    /// Continuous bin position of each value; the range maps onto
    /// `[PADDING, bins - PADDING - 1]`.
    fn bin_positions<B: Backend>(&self, values: Tensor<B, 1>, range: (f64, f64)) -> Tensor<B, 1> {
        let usable = (self.histogram_bins - 2 * PADDING - 1).max(1) as f64;
        let width = bin_width(range, usable);
        values
            .sub_scalar(range.0)
            .div_scalar(width)
            .add_scalar(PADDING as f64)
            .clamp(PADDING as f64, (self.histogram_bins - PADDING - 1) as f64)
    }

    /// `[N, bins]` bin centres.
    fn centres<B: Backend>(&self, n: usize, device: &B::Device) -> Tensor<B, 2> {
        let bins = self.histogram_bins;
        let centres = Tensor::<B, 1, Int>::arange(0..bins as i64, device).float();
        centres.reshape([1, bins]).repeat_dim(0, n)
    }

    /// Zero-order window: one-hot rows `[N, bins]`.
    fn fixed_window<B: Backend>(&self, positions: Tensor<B, 1>) -> Tensor<B, 2> {
        let n = positions.dims()[0];
        let device = positions.device();
        let diff = column(positions.floor()) - self.centres::<B>(n, &device);
        diff.abs().neg().add_scalar(1.0).clamp_min(0.0)
    }

    /// Cubic B-spline window `[N, bins]`.
    fn moving_window<B: Backend>(&self, positions: Tensor<B, 1>) -> Tensor<B, 2> {
        let n = positions.dims()[0];
        let device = positions.device();
        let a = (column(positions) - self.centres::<B>(n, &device)).abs();

        let near = a.clone().lower_elem(1.0).float();
        let far = a.clone().greater_equal_elem(1.0).float() * a.clone().lower_elem(2.0).float();

        // |x| < 1: 2/3 - x² + |x|³/2;  1 <= |x| < 2: (2 - |x|)³/6
        let inner = a.clone().powf_scalar(3.0).mul_scalar(0.5) - a.clone().powf_scalar(2.0) + 2.0 / 3.0;
        let outer = a.neg().add_scalar(2.0).clamp_min(0.0).powf_scalar(3.0).div_scalar(6.0);

        inner * near + outer * far
    }
}

fn bin_width(range: (f64, f64), usable: f64) -> f64 {
    let span = range.1 - range.0;
    if span > f64::EPSILON {
        span / usable
    } else {
        1.0
    }
}

impl<B: Backend> Metric<B> for MattesMutualInformation {
    fn evaluate(&self, samples: &SampleSet<B>) -> Tensor<B, 1> {
        let bins = self.histogram_bins;

        let fixed_positions = self.bin_positions(samples.fixed.clone(), samples.fixed_range);
        let moving_positions = self.bin_positions(samples.moving.clone(), samples.moving_range);

        let weights = column(samples.weights.clone());
        let fixed_window = self.fixed_window(fixed_positions) * weights;
        let moving_window = self.moving_window(moving_positions);

        // joint[i, j] = Σ_k fixed_window[k, i] * moving_window[k, j]
        let joint = fixed_window.transpose().matmul(moving_window);
        let total = joint.clone().sum().add_scalar(EPSILON).reshape([1, 1]);
        let p = joint / total;

        let p_fixed = p.clone().sum_dim(1);
        let p_moving = p.clone().sum_dim(0);

        let log_ratio = (p.clone() + EPSILON).log()
            - (p_fixed + EPSILON).log().repeat_dim(1, bins)
            - (p_moving + EPSILON).log().repeat_dim(0, bins);

        (p * log_ratio).sum().neg()
    }

    fn name(&self) -> &'static str {
        "MattesMutualInformation"
    }
}
