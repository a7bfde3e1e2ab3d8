//! Image type with physical metadata and coordinate transformations.
//!
//! An `Image` pairs a burn tensor with the origin, spacing and direction that
//! place its pixels in physical space. Tensor layout is `[H, W]` for 2D and
//! `[D, H, W]` for 3D, while physical points and continuous indices are
//! ordered `(x, y[, z])`; physical axis `i` therefore lives on tensor
//! dimension `D - 1 - i`.

use burn::tensor::{Shape, Tensor, TensorData};
use burn::tensor::backend::Backend;
use crate::spatial::{Direction, Point, Spacing, Vector};

/// Image with physical metadata.
///
/// # Type Parameters
/// * `B` - The backend for tensor operations
/// * `D` - The dimensionality of the image (2 or 3)
///
/// # Examples
/// ```rust
/// use histostack_core::Image;
/// use histostack_core::spatial::{point, spacing, Direction2};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 2>::zeros([20, 30], &device);
/// let image = Image::new(data, point([0.0, 0.0]), spacing([0.5, 0.5]), Direction2::identity());
/// assert_eq!(image.size(), [30, 20]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    data: Tensor<B, D>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    inverse_direction: Direction<D>,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new image with the given data and metadata.
    ///
    /// # Panics
    /// Panics if `direction` is singular; a non-invertible direction cannot
    /// describe an image grid.
    pub fn new(
        data: Tensor<B, D>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        let inverse_direction = direction
            .try_inverse()
            .expect("Direction matrix must be invertible");
        Self {
            data,
            origin,
            spacing,
            direction,
            inverse_direction,
        }
    }

    /// Create an axis-aligned image from row-major pixel values.
    ///
    /// `shape` is the tensor shape (`[H, W]` or `[D, H, W]`).
    pub fn from_pixels(
        pixels: Vec<f32>,
        shape: [usize; D],
        spacing: Spacing<D>,
        device: &B::Device,
    ) -> Self {
        let data = Tensor::<B, D>::from_data(TensorData::new(pixels, Shape::new(shape)), device);
        Self::new(data, Point::origin(), spacing, Direction::identity())
    }

    /// Create an image of constant value on the same grid as `self`.
    pub fn filled_like(&self, value: f32) -> Self {
        let data = Tensor::<B, D>::full(self.shape(), value, &self.data.device());
        Self::new(data, self.origin, self.spacing, self.direction)
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    /// Consume the image and return its data tensor.
    pub fn into_data(self) -> Tensor<B, D> {
        self.data
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Tensor shape (`[H, W]` or `[D, H, W]`).
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Size along each physical axis, ordered `(x, y[, z])`.
    pub fn size(&self) -> [usize; D] {
        let shape = self.shape();
        std::array::from_fn(|i| shape[D - 1 - i])
    }

    /// Total number of pixels.
    pub fn num_pixels(&self) -> usize {
        self.shape().iter().product()
    }

    /// Physical extent `spacing * size` along each axis.
    pub fn physical_extent(&self) -> Vector<D> {
        let size = self.size();
        Vector::<D>::from_fn(|i, _| self.spacing[i] * size[i] as f64)
    }

    /// Replace the spacing without touching the pixel data.
    pub fn with_spacing(mut self, spacing: Spacing<D>) -> Self {
        self.spacing = spacing;
        self
    }

    /// Replace the origin without touching the pixel data.
    pub fn with_origin(mut self, origin: Point<D>) -> Self {
        self.origin = origin;
        self
    }

    /// Replace the pixel data, keeping the metadata.
    pub fn with_data(mut self, data: Tensor<B, D>) -> Self {
        self.data = data;
        self
    }

    /// Copy the pixels to the host in row-major order.
    pub fn to_pixels(&self) -> Vec<f32> {
        self.data.clone().into_data().iter::<f32>().collect()
    }

    /// Convert a physical point to a continuous index.
    ///
    /// `index = (Direction^-1 * (point - origin)) / spacing`
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        let rotated = self.inverse_direction * (point - self.origin);
        Point::from(rotated.component_div(&self.spacing))
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        self.origin + self.direction * index.coords.component_mul(&self.spacing)
    }

    /// Batch convert physical points `[N, D]` to continuous indices `[N, D]`.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin = row_tensor::<B, D>(&self.origin.coords, &device);

        // I = (P - O) @ T with T[r, c] = inv_dir[c, r] / spacing[c]
        let mut t = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                t.push((self.inverse_direction[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t, Shape::new([D, D])), &device);

        (points - origin).matmul(t)
    }

    /// Batch convert continuous indices `[N, D]` to physical points `[N, D]`.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let origin = row_tensor::<B, D>(&self.origin.coords, &device);

        // P = O + I @ M with M[r, c] = spacing[r] * dir[c, r]
        let mut m = Vec::with_capacity(D * D);
        for r in 0..D {
            for c in 0..D {
                m.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m, Shape::new([D, D])), &device);

        indices.matmul(m) + origin
    }
}

/// A `[1, D]` tensor holding `values`, for broadcasting against point batches.
pub(crate) fn row_tensor<B: Backend, const D: usize>(
    values: &Vector<D>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::<B, 2>::from_data(TensorData::new(values, Shape::new([1, D])), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{point, spacing, Direction3};
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_size_is_reversed_shape() {
        let device = Default::default();
        let image = Image::<Backend, 3>::from_pixels(
            vec![0.0; 4 * 3 * 2],
            [4, 3, 2],
            spacing([1.0, 1.0, 1.0]),
            &device,
        );
        assert_eq!(image.shape(), [4, 3, 2]);
        assert_eq!(image.size(), [2, 3, 4]);
        assert_eq!(image.num_pixels(), 24);
    }

    #[test]
    fn test_physical_index_roundtrip_with_spacing() {
        let device = Default::default();
        let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
        let image = Image::new(data, point([1.0, -2.0, 3.0]), spacing([2.0, 0.5, 4.0]), Direction3::identity());

        let p = point([5.0, 0.5, 11.0]);
        let index = image.transform_physical_point_to_continuous_index(&p);
        assert!((index[0] - 2.0).abs() < 1e-9);
        assert!((index[1] - 5.0).abs() < 1e-9);
        assert!((index[2] - 2.0).abs() < 1e-9);

        let back = image.transform_continuous_index_to_physical_point(&index);
        assert!((back - p).norm() < 1e-9);
    }

    #[test]
    fn test_tensor_mapping_matches_point_mapping() {
        let device = Default::default();
        let data = Tensor::<Backend, 2>::zeros([8, 8], &device);
        let image = Image::new(data, point([10.0, 20.0]), spacing([0.5, 2.0]), crate::spatial::Direction2::identity());

        let indices = Tensor::<Backend, 2>::from_floats([[1.0, 2.0], [3.0, 0.5]], &device);
        let world = image.index_to_world_tensor(indices.clone());
        let values: Vec<f32> = world.clone().into_data().iter::<f32>().collect();
        assert!((values[0] - 10.5).abs() < 1e-5);
        assert!((values[1] - 24.0).abs() < 1e-5);
        assert!((values[2] - 11.5).abs() < 1e-5);
        assert!((values[3] - 21.0).abs() < 1e-5);

        let back: Vec<f32> = image.world_to_index_tensor(world).into_data().iter::<f32>().collect();
        let expected: Vec<f32> = indices.into_data().iter::<f32>().collect();
        for (a, b) in back.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_filled_like_and_extent() {
        let device = Default::default();
        let image = Image::<Backend, 2>::from_pixels(vec![1.0; 6], [2, 3], spacing([0.5, 2.0]), &device);
        let mask = image.filled_like(255.0);
        assert!(mask.to_pixels().iter().all(|&v| v == 255.0));
        let extent = image.physical_extent();
        assert!((extent[0] - 1.5).abs() < 1e-12);
        assert!((extent[1] - 4.0).abs() < 1e-12);
    }
}
