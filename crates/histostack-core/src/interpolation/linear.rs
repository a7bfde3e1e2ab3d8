//! Linear interpolation over the `2^D` corners of the enclosing cell.
//!
//! The corner weights come from the fractional part of each index, so the
//! sampled value is differentiable with respect to the indices; registration
//! takes its image gradients from here.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::trait_::Interpolator;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

/// Flat offsets of the lower and upper neighbour along one axis, and the
/// weight of the upper one.
struct AxisCell<B: Backend> {
    lower: Tensor<B, 1, Int>,
    upper: Tensor<B, 1, Int>,
    weight: Tensor<B, 1>,
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.dims();
        let [n, _] = indices.dims();
        let device = indices.device();
        let flat = data.clone().reshape([dims.iter().product::<usize>()]);

        // index column 0 is x, the fastest-varying tensor dimension
        let mut cells = Vec::with_capacity(D);
        let mut stride = 1i32;
        for axis in 0..D {
            let len = dims[D - 1 - axis];
            let last = len.saturating_sub(1) as f64;
            let coordinate = indices.clone().slice([0..n, axis..axis + 1]).reshape([n]);
            let floor = coordinate.clone().floor();
            cells.push(AxisCell {
                lower: floor.clone().clamp(0.0, last).int() * stride,
                upper: (floor.clone() + 1.0).clamp(0.0, last).int() * stride,
                weight: coordinate - floor,
            });
            stride *= len as i32;
        }

        let mut value = Tensor::<B, 1>::zeros([n], &device);
        for corner in 0..(1usize << D) {
            let mut offset = Tensor::<B, 1, Int>::zeros([n], &device);
            let mut weight = Tensor::<B, 1>::ones([n], &device);
            for (axis, cell) in cells.iter().enumerate() {
                if (corner >> axis) & 1 == 1 {
                    offset = offset + cell.upper.clone();
                    weight = weight * cell.weight.clone();
                } else {
                    offset = offset + cell.lower.clone();
                    weight = weight * (cell.weight.clone().neg() + 1.0);
                }
            }
            value = value + flat.clone().gather(0, offset) * weight;
        }
        value
    }
}
