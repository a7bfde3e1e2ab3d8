//! Interpolator trait for sampling values at continuous indices.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Interpolator trait for sampling values at continuous indices.
///
/// Indices are ordered `(x, y[, z])` while the data tensor is `[H, W]` or
/// `[D, H, W]`, so index column `i` addresses tensor dimension `D - 1 - i`.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// Interpolate values from `data` at `indices` `[Batch, D]`.
    ///
    /// Indices outside the buffer are clamped to the nearest edge; use
    /// [`Interpolator::inside_buffer`] to tell them apart.
    ///
    /// # Returns
    /// Tensor of sampled values `[Batch]`
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1>;

    /// Lowest and highest continuous index, per axis, this interpolator
    /// accepts for an axis of `len` pixels.
    fn valid_range(&self, len: usize) -> (f64, f64) {
        (0.0, len.saturating_sub(1) as f64)
    }

    /// `1.0` for indices the interpolator can evaluate without clamping,
    /// `0.0` for the rest. Shape `[Batch]`.
    fn inside_buffer<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let dims = data.dims();
        let [n, _] = indices.dims();
        let mut inside = Tensor::<B, 2>::ones([n, 1], &indices.device());
        for axis in 0..D {
            let (lo, hi) = self.valid_range(dims[D - 1 - axis]);
            let column = indices.clone().slice([0..n, axis..axis + 1]);
            let above = column.clone().greater_equal_elem(lo).float();
            let below = column.lower_equal_elem(hi).float();
            inside = inside * above * below;
        }
        inside.reshape([n])
    }
}
