//! Similarity metrics for slice and volume registration.

pub mod trait_;
pub mod sampler;
pub mod mean_squares;
pub mod normalized_correlation;
pub mod mattes;

pub use trait_::{Metric, SampleSet};
pub use sampler::{intensity_range, FixedSamples};
pub use mean_squares::MeanSquares;
pub use normalized_correlation::NormalizedCorrelation;
pub use mattes::{MattesMutualInformation, MIN_HISTOGRAM_BINS};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Metric chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    MeanSquares,
    NormalizedCorrelation,
    MattesMutualInformation {
        spatial_samples: usize,
        histogram_bins: usize,
    },
}

impl MetricKind {
    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::MeanSquares => "MeanSquares",
            MetricKind::NormalizedCorrelation => "NormalizedCorrelation",
            MetricKind::MattesMutualInformation { .. } => "MattesMutualInformation",
        }
    }

    /// Sample budget; `None` samples every masked fixed pixel.
    pub fn max_samples(&self) -> Option<usize> {
        match self {
            MetricKind::MattesMutualInformation { spatial_samples, .. } => Some(*spatial_samples),
            _ => None,
        }
    }

    /// Has no effect on metrics that sample every pixel.
    pub fn set_spatial_samples(&mut self, samples: usize) {
        if let MetricKind::MattesMutualInformation { spatial_samples, .. } = self {
            *spatial_samples = samples;
        }
    }

    /// Raised to [`MIN_HISTOGRAM_BINS`] when smaller.
    pub fn set_histogram_bins(&mut self, bins: usize) {
        if let MetricKind::MattesMutualInformation { histogram_bins, .. } = self {
            *histogram_bins = bins.max(MIN_HISTOGRAM_BINS);
        }
    }
}

impl<B: Backend> Metric<B> for MetricKind {
    fn evaluate(&self, samples: &SampleSet<B>) -> Tensor<B, 1> {
        match self {
            MetricKind::MeanSquares => MeanSquares.evaluate(samples),
            MetricKind::NormalizedCorrelation => NormalizedCorrelation.evaluate(samples),
            MetricKind::MattesMutualInformation { histogram_bins, .. } => {
                MattesMutualInformation::new(*histogram_bins).evaluate(samples)
            }
        }
    }

    fn name(&self) -> &'static str {
        MetricKind::name(self)
    }
}
