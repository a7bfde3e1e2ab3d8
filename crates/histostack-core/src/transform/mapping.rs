//! Tensor building blocks for differentiable point mappings.
//!
//! Parameters arrive as a flat `[P]` tensor; each scalar is sliced out as a
//! `[1, 1]` tensor so it broadcasts against `[N, 1]` point columns and keeps
//! its place in the autodiff graph.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Upload a parameter vector. An empty vector becomes a single zero so the
/// tensor is never zero-sized.
pub fn parameter_tensor<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 1> {
    let mut values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    if values.is_empty() {
        values.push(0.0);
    }
    let len = values.len();
    Tensor::<B, 1>::from_data(TensorData::new(values, Shape::new([len])), device)
}

/// Parameter `index` as a `[1, 1]` tensor.
pub(crate) fn scalar<B: Backend>(parameters: &Tensor<B, 1>, index: usize) -> Tensor<B, 2> {
    parameters.clone().slice([index..index + 1]).reshape([1, 1])
}

/// A constant `[1, 1]` tensor.
pub(crate) fn constant<B: Backend>(value: f64, device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 2>::from_data(TensorData::new(vec![value as f32], Shape::new([1, 1])), device)
}

/// Column `axis` of a `[N, D]` point batch, as `[N, 1]`.
pub(crate) fn column<B: Backend>(points: &Tensor<B, 2>, axis: usize) -> Tensor<B, 2> {
    let [n, _] = points.dims();
    points.clone().slice([0..n, axis..axis + 1])
}

/// `y = M (x - c) + c + t` for a `[N, D]` batch.
///
/// `matrix` holds the `D * D` entries in row-major order; every entry,
/// center and translation component is a `[1, 1]` tensor.
pub(crate) fn apply_linear<B: Backend>(
    points: Tensor<B, 2>,
    matrix: &[Tensor<B, 2>],
    center: &[Tensor<B, 2>],
    translation: &[Tensor<B, 2>],
) -> Tensor<B, 2> {
    let dim = center.len();
    debug_assert_eq!(matrix.len(), dim * dim);
    debug_assert_eq!(translation.len(), dim);

    let centered: Vec<Tensor<B, 2>> = (0..dim)
        .map(|j| column(&points, j) - center[j].clone())
        .collect();

    let rows: Vec<Tensor<B, 2>> = (0..dim)
        .map(|i| {
            let mut out = center[i].clone() + translation[i].clone();
            for (j, x) in centered.iter().enumerate() {
                out = out + x.clone() * matrix[i * dim + j].clone();
            }
            out
        })
        .collect();

    Tensor::cat(rows, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_apply_linear_rotation_about_center() {
        let device = Default::default();
        let points = Tensor::<Backend, 2>::from_floats([[2.0, 1.0], [1.0, 1.0]], &device);
        // 90 degrees about (1, 1), then shift by (0, 1).
        let m = [
            constant::<Backend>(0.0, &device),
            constant::<Backend>(-1.0, &device),
            constant::<Backend>(1.0, &device),
            constant::<Backend>(0.0, &device),
        ];
        let c = [constant::<Backend>(1.0, &device), constant::<Backend>(1.0, &device)];
        let t = [constant::<Backend>(0.0, &device), constant::<Backend>(1.0, &device)];

        let out: Vec<f32> = apply_linear(points, &m, &c, &t).into_data().iter::<f32>().collect();
        let expected = [1.0, 3.0, 1.0, 2.0];
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{:?}", out);
        }
    }

    #[test]
    fn test_empty_parameters_pad_to_one() {
        let device = Default::default();
        let p = parameter_tensor::<Backend>(&[], &device);
        assert_eq!(p.dims(), [1]);
    }
}
