use burn::tensor::{Shape, Tensor, TensorData};
use burn::tensor::backend::Backend;

/// Continuous indices `(x, y[, z])` of every pixel of a tensor of shape
/// `shape`, in the same row-major order as the flattened tensor.
pub fn grid_indices<const D: usize>(shape: [usize; D]) -> Vec<[usize; D]> {
    let total: usize = shape.iter().product();
    let mut out = Vec::with_capacity(total);
    for flat in 0..total {
        let mut rem = flat;
        let mut index = [0usize; D];
        // tensor dim D-1 is the fastest varying and maps to physical axis 0
        for axis in 0..D {
            let extent = shape[D - 1 - axis];
            index[axis] = rem % extent;
            rem /= extent;
        }
        out.push(index);
    }
    out
}

/// Generate the `[N, D]` index grid for a tensor of shape `shape`.
pub fn generate_grid<B: Backend, const D: usize>(shape: [usize; D], device: &B::Device) -> Tensor<B, 2> {
    let indices = grid_indices(shape);
    let n = indices.len();
    let flat: Vec<f32> = indices
        .into_iter()
        .flat_map(|index| index.into_iter().map(|i| i as f32))
        .collect();
    Tensor::<B, 2>::from_data(TensorData::new(flat, Shape::new([n, D])), device)
}
