//! Resample image filter.
//!
//! This module provides ResampleImageFilter which resamples an image
//! onto a new grid using a transform and an interpolator.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use crate::image::{generate_grid, Image};
use crate::interpolation::Interpolator;
use crate::spatial::{Direction, Point, Spacing};
use crate::transform::ParametricTransform;

/// Resample image filter.
///
/// For every output pixel, the transform maps its physical position into the
/// input image, where the interpolator samples a value. Positions that land
/// outside the input buffer get the default pixel value.
///
/// The transform maps Output Physical Space -> Input Physical Space.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
/// * `D` - The dimensionality (2 or 3)
pub struct ResampleImageFilter<B, T, I, const D: usize>
where
    B: Backend,
    T: ParametricTransform<D>,
    I: Interpolator<B>,
{
    size: [usize; D],
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
    transform: T,
    interpolator: I,
    default_pixel_value: f32,
    _phantom: PhantomData<B>,
}

impl<B, T, I, const D: usize> ResampleImageFilter<B, T, I, D>
where
    B: Backend,
    T: ParametricTransform<D>,
    I: Interpolator<B>,
{
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `size` - Output size in pixels, ordered `(x, y[, z])`
    /// * `origin` - Output image origin (physical)
    /// * `spacing` - Output image spacing (physical)
    /// * `transform` - Transform from output space to input space
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(size: [usize; D], origin: Point<D>, spacing: Spacing<D>, transform: T, interpolator: I) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction: Direction::identity(),
            transform,
            interpolator,
            default_pixel_value: 0.0,
            _phantom: PhantomData,
        }
    }

    /// Create from a reference image, taking its grid.
    pub fn new_from_reference(reference: &Image<B, D>, transform: T, interpolator: I) -> Self {
        Self::new(reference.size(), *reference.origin(), *reference.spacing(), transform, interpolator)
            .with_direction(*reference.direction())
    }

    /// Set default pixel value for outside the field of view.
    pub fn with_default_pixel_value(mut self, value: f32) -> Self {
        self.default_pixel_value = value;
        self
    }

    pub fn with_direction(mut self, direction: Direction<D>) -> Self {
        self.direction = direction;
        self
    }

    /// Output tensor shape (`[H, W]` or `[D, H, W]`).
    fn shape(&self) -> [usize; D] {
        std::array::from_fn(|i| self.size[D - 1 - i])
    }

    /// Apply filter to an input image.
    pub fn apply(&self, input: &Image<B, D>) -> Image<B, D> {
        let device = input.data().device();
        let shape = self.shape();

        let output_indices = generate_grid::<B, D>(shape, &device);
        let output_points = self.indices_to_physical(output_indices, &device);
        let input_points = self.transform.transform_points(output_points);
        let input_indices = input.world_to_index_tensor(input_points);

        let sampled = self.interpolator.interpolate(input.data(), input_indices.clone());
        let inside = self.interpolator.inside_buffer(input.data(), input_indices);
        let outside = inside.clone().neg().add_scalar(1.0);
        let values = sampled * inside + outside.mul_scalar(self.default_pixel_value);

        Image::new(values.reshape(Shape::new(shape)), self.origin, self.spacing, self.direction)
    }

    fn indices_to_physical(&self, indices: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        // point = origin + Direction * (index * spacing)
        let origin_vec: Vec<f32> = (0..D).map(|i| self.origin[i] as f32).collect();
        let origin_tensor = Tensor::<B, 2>::from_data(TensorData::new(origin_vec, Shape::new([1, D])), device);

        let spacing_vec: Vec<f32> = (0..D).map(|i| self.spacing[i] as f32).collect();
        let spacing_tensor = Tensor::<B, 2>::from_data(TensorData::new(spacing_vec, Shape::new([1, D])), device);

        let scaled_indices = indices * spacing_tensor;

        // Row vectors, so multiply by Direction^T.
        let mut dir_data = Vec::with_capacity(D * D);
        for c in 0..D {
            for r in 0..D {
                dir_data.push(self.direction[(r, c)] as f32);
            }
        }
        let dir_t_tensor = Tensor::<B, 2>::from_data(TensorData::new(dir_data, Shape::new([D, D])), device);

        origin_tensor + scaled_indices.matmul(dir_t_tensor)
    }
}
