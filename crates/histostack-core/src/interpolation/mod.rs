//! Interpolation of images at continuous indices.

pub mod trait_;
pub mod linear;
pub mod nearest;

pub use trait_::Interpolator;
pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Interpolator chosen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolatorKind {
    #[default]
    Linear,
    NearestNeighbor,
}

impl<B: Backend> Interpolator<B> for InterpolatorKind {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            InterpolatorKind::Linear => LinearInterpolator.interpolate(data, indices),
            InterpolatorKind::NearestNeighbor => NearestNeighborInterpolator.interpolate(data, indices),
        }
    }

    fn valid_range(&self, len: usize) -> (f64, f64) {
        match self {
            InterpolatorKind::Linear => <LinearInterpolator as Interpolator<B>>::valid_range(&LinearInterpolator, len),
            InterpolatorKind::NearestNeighbor => {
                <NearestNeighborInterpolator as Interpolator<B>>::valid_range(&NearestNeighborInterpolator, len)
            }
        }
    }
}
