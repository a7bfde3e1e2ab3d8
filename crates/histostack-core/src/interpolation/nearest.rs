//! Nearest-neighbour lookup, for masks and other label images.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::Interpolator;

#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.dims();
        let [n, _] = indices.dims();
        let flat = data.clone().reshape([dims.iter().product::<usize>()]);

        let mut offset = Tensor::<B, 1, Int>::zeros([n], &indices.device());
        let mut stride = 1i32;
        for axis in 0..D {
            let len = dims[D - 1 - axis];
            let pixel = indices
                .clone()
                .slice([0..n, axis..axis + 1])
                .reshape([n])
                .round()
                .clamp(0.0, len.saturating_sub(1) as f64)
                .int();
            offset = offset + pixel * stride;
            stride *= len as i32;
        }
        flat.gather(0, offset)
    }

    /// A pixel owns the half-open interval `[i - 0.5, i + 0.5)`.
    fn valid_range(&self, len: usize) -> (f64, f64) {
        (-0.5, len as f64 - 0.5 - 1e-6)
    }
}
