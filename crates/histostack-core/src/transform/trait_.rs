//! Parametric transform trait shared by the 2D slice transforms and the 3D
//! rigid transform.

use std::fmt::Debug;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::error::Result;
use super::mapping::parameter_tensor;
use crate::spatial::Point;

/// A transform described by a flat parameter vector.
///
/// Registration optimises `parameters()`; `fixed_parameters()` describe the
/// parts that stay put (a fixed center, a control-point grid).
///
/// # Type Parameters
/// * `D` - The spatial dimensionality (2 or 3)
pub trait ParametricTransform<const D: usize>: Clone + Debug {
    /// Type tag written to transform files.
    fn type_tag(&self) -> String;

    fn parameters(&self) -> Vec<f64>;

    /// Replace the parameters; fails on a length mismatch.
    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()>;

    fn fixed_parameters(&self) -> Vec<f64>;

    fn set_fixed_parameters(&mut self, fixed: &[f64]) -> Result<()>;

    fn number_of_parameters(&self) -> usize {
        self.parameters().len()
    }

    /// Map a single point on the host.
    fn transform_point(&self, point: &Point<D>) -> Point<D>;

    /// Map a batch of points `[N, D]` using `parameters` in place of the
    /// stored parameters.
    ///
    /// This is the differentiable path: gradients of the output flow back to
    /// `parameters`.
    fn map_points<B: Backend>(&self, parameters: Tensor<B, 1>, points: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Map a batch of points `[N, D]` with the stored parameters.
    fn transform_points<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let parameters = parameter_tensor::<B>(&self.parameters(), &points.device());
        self.map_points(parameters, points)
    }
}
