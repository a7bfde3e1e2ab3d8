//! Metric trait for comparing fixed and moving intensities.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Intensities gathered for one metric evaluation.
///
/// `fixed` and `moving` hold one value per fixed sample; `weights` is `1.0`
/// where the sample mapped inside the moving image and mask and `0.0`
/// elsewhere. Only weighted samples contribute.
#[derive(Debug, Clone)]
pub struct SampleSet<B: Backend> {
    pub fixed: Tensor<B, 1>,
    pub moving: Tensor<B, 1>,
    pub weights: Tensor<B, 1>,
    /// Number of samples with weight one.
    pub valid: usize,
    /// Intensity range of the fixed samples.
    pub fixed_range: (f64, f64),
    /// Intensity range of the whole moving image.
    pub moving_range: (f64, f64),
}

/// Metric trait for image registration.
///
/// Metrics are costs: the optimizer minimises them unless told to
/// maximise.
///
/// # Type Parameters
/// * `B` - The tensor backend
pub trait Metric<B: Backend> {
    /// Evaluate the metric over `samples`.
    ///
    /// # Returns
    /// A scalar tensor `[1]` whose gradient flows back through `moving`.
    fn evaluate(&self, samples: &SampleSet<B>) -> Tensor<B, 1>;

    /// Get the name of the metric.
    fn name(&self) -> &'static str;
}

/// `[N]` to `[N, 1]`.
pub(crate) fn column<B: Backend>(values: Tensor<B, 1>) -> Tensor<B, 2> {
    let n = values.dims()[0];
    values.reshape([n, 1])
}
