//! Stacking 2D slices into volumes and cutting volumes back into slices.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::image::Image;
use crate::spatial::{Direction, Point2, Point3, Spacing2, Spacing3};

/// Tile equally-sized slices along a new z axis.
///
/// The volume takes the in-plane origin and spacing of the first slice,
/// `z = 0` as its z origin and `z_spacing` between slices.
///
/// # Panics
/// Panics if `slices` is empty or the slice shapes differ.
pub fn tile_slices<B: Backend>(slices: &[Image<B, 2>], z_spacing: f64) -> Image<B, 3> {
    assert!(!slices.is_empty(), "cannot tile an empty slice list");
    let first = &slices[0];
    let shape = first.shape();

    let planes: Vec<Tensor<B, 3>> = slices
        .iter()
        .map(|slice| {
            assert_eq!(slice.shape(), shape, "all tiled slices must share one shape");
            slice.data().clone().unsqueeze_dim::<3>(0)
        })
        .collect();

    let origin = Point3::new(first.origin().x, first.origin().y, 0.0);
    let spacing = Spacing3::new(first.spacing()[0], first.spacing()[1], z_spacing);
    Image::new(Tensor::cat(planes, 0), origin, spacing, Direction::identity())
}

/// The z-th slice of a volume as a 2D image.
///
/// # Panics
/// Panics if `z` is outside the volume.
pub fn extract_slice<B: Backend>(volume: &Image<B, 3>, z: usize) -> Image<B, 2> {
    let [depth, height, width] = volume.shape();
    assert!(z < depth, "slice {} is outside a volume of depth {}", z, depth);

    let plane = volume.data().clone().narrow(0, z, 1).reshape([height, width]);
    let origin = Point2::new(volume.origin().x, volume.origin().y);
    let spacing = Spacing2::new(volume.spacing()[0], volume.spacing()[1]);
    Image::new(plane, origin, spacing, Direction::identity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::spacing;
    use burn_ndarray::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_tile_then_extract() {
        let device = Default::default();
        let slices: Vec<Image<Backend, 2>> = (0..3)
            .map(|i| Image::from_pixels(vec![i as f32; 6], [2, 3], spacing([0.5, 0.25]), &device))
            .collect();

        let volume = tile_slices(&slices, 4.0);
        assert_eq!(volume.shape(), [3, 2, 3]);
        assert_eq!(volume.spacing(), &spacing([0.5, 0.25, 4.0]));

        let middle = extract_slice(&volume, 1);
        assert_eq!(middle.shape(), [2, 3]);
        assert!(middle.to_pixels().iter().all(|&v| v == 1.0));
    }

    #[test]
    #[should_panic]
    fn test_extract_out_of_range() {
        let device = Default::default();
        let slices = vec![Image::<Backend, 2>::from_pixels(vec![0.0; 4], [2, 2], spacing([1.0, 1.0]), &device)];
        let volume = tile_slices(&slices, 1.0);
        extract_slice(&volume, 1);
    }
}
