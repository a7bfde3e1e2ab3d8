//! Mean squares metric.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{Metric, SampleSet};

/// Mean squared intensity difference over the valid samples,
/// `Σ(f - m)² / n`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquares;

impl<B: Backend> Metric<B> for MeanSquares {
    fn evaluate(&self, samples: &SampleSet<B>) -> Tensor<B, 1> {
        let diff = samples.fixed.clone() - samples.moving.clone();
        let squared = diff.powf_scalar(2.0) * samples.weights.clone();
        squared.sum().div_scalar(samples.valid.max(1) as f64)
    }

    fn name(&self) -> &'static str {
        "MeanSquares"
    }
}
