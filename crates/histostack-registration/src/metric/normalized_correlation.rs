//! Normalized correlation metric.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::{Metric, SampleSet};

/// Negated normalized cross-correlation without mean subtraction,
/// `-Σfm / √(Σf² · Σm²)`.
///
/// Ranges over `[-1, 1]`, with `-1` for intensities that agree up to a
/// positive scale. A zero denominator yields zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedCorrelation;

impl<B: Backend> Metric<B> for NormalizedCorrelation {
    fn evaluate(&self, samples: &SampleSet<B>) -> Tensor<B, 1> {
        let w = samples.weights.clone();
        let f = samples.fixed.clone() * w.clone();
        let m = samples.moving.clone() * w;

        let sff = f.clone().powf_scalar(2.0).sum();
        let smm = m.clone().powf_scalar(2.0).sum();
        let sfm = (f * m).sum();

        let denominator = (sff * smm).sqrt().clamp_min(1e-12);
        sfm.div(denominator).neg()
    }

    fn name(&self) -> &'static str {
        "NormalizedCorrelation"
    }
}
