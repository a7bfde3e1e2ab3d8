//! Whole-stack transform initialisation.
//!
//! Each function replaces or adjusts the transforms of every slice in a
//! stack; none of them touches the resampled images, so `update_volumes`
//! must run afterwards.

use std::collections::HashMap;

use burn::tensor::backend::Backend;
use tracing::debug;

use super::stack::Stack;
use crate::spatial::{Point2, Vector2};
use crate::transform::{BSplineDeformable, ControlGrid, Transform2D, TransformError, TransformKind};

type Result<T> = std::result::Result<T, TransformError>;

pub fn initialize_to_identity<B: Backend>(stack: &mut Stack<B>) {
    stack.set_transforms(vec![Transform2D::Identity; stack.len()]);
}

/// The same translation for every slice.
pub fn initialize_with_translation<B: Backend>(stack: &mut Stack<B>, translation: Vector2) {
    stack.set_transforms(vec![Transform2D::Translation { offset: translation }; stack.len()]);
}

/// Centre each original slice in the resampled frame with a rigid
/// transform of angle zero.
///
/// The translation is `(original_spacing * original_size - spacing *
/// resampler_size) / 2`; a missing slice counts as size zero.
pub fn initialize_to_common_centre<B: Backend>(stack: &mut Stack<B>) {
    let original_spacing = *stack.original_spacing();
    let spacing = *stack.spacing();
    let resampler_size = stack.resampler_size();

    let transforms = (0..stack.len())
        .map(|i| {
            let original_size = stack.original_size(i);
            let translation = Vector2::from_fn(|axis, _| {
                (original_spacing[axis] * original_size[axis] as f64
                    - spacing[axis] * resampler_size[axis] as f64)
                    / 2.0
            });
            Transform2D::CenteredRigid2D {
                angle: 0.0,
                center: Point2::origin(),
                translation,
            }
        })
        .collect();
    stack.set_transforms(transforms);
}

/// Move every moving center to the middle of the fixed stack's resampled
/// frame, without changing the mappings.
pub fn set_moving_stack_center_with_fixed_stack<B: Backend>(fixed: &Stack<B>, moving: &mut Stack<B>) {
    let spacing = fixed.spacing();
    let size = fixed.resampler_size();
    let center = Point2::new(
        spacing[0] * size[0] as f64 / 2.0,
        spacing[1] * size[1] as f64 / 2.0,
    );
    for i in 0..moving.len() {
        moving.transform_mut(i).move_center(center);
    }
}

/// Re-express every transform as `kind`, keeping each mapping.
pub fn initialize_from_current_transforms<B: Backend>(stack: &mut Stack<B>, kind: TransformKind) -> Result<()> {
    debug!(%kind, "reinitialising stack transforms");
    let transforms = stack
        .transforms()
        .iter()
        .map(|t| t.reinitialize_as(kind))
        .collect::<Result<Vec<_>>>()?;
    stack.set_transforms(transforms);
    Ok(())
}

/// Wrap each moving transform as the bulk of a zero B-spline whose grid
/// covers the fixed stack's resampled frame with `grid_size` intervals.
pub fn initialize_bspline_from_bulk<B: Backend>(
    fixed: &Stack<B>,
    moving: &mut Stack<B>,
    grid_size: usize,
) -> Result<()> {
    let spacing = fixed.spacing();
    let size = fixed.resampler_size();
    let extent = Vector2::new(spacing[0] * size[0] as f64, spacing[1] * size[1] as f64);

    let transforms = moving
        .transforms()
        .iter()
        .map(|bulk| {
            let grid = ControlGrid::covering(*fixed.origin(), extent, grid_size);
            BSplineDeformable::from_bulk(bulk.clone(), grid)
                .map(|b| Transform2D::BSplineDeformable(Box::new(b)))
        })
        .collect::<Result<Vec<_>>>()?;
    moving.set_transforms(transforms);
    Ok(())
}

/// Translate a single slice.
pub fn translate_slice<B: Backend>(stack: &mut Stack<B>, slice_number: usize, translation: Vector2) -> Result<()> {
    stack.translate_transform(slice_number, translation)
}

/// Translate every slice.
pub fn translate<B: Backend>(stack: &mut Stack<B>, translation: Vector2) -> Result<()> {
    for i in 0..stack.len() {
        stack.translate_transform(i, translation)?;
    }
    Ok(())
}

/// Translate the slices named in `adjustments` by their per-basename
/// vectors. Unknown basenames are ignored.
pub fn apply_adjustments<B: Backend>(stack: &mut Stack<B>, adjustments: &HashMap<String, Vector2>) -> Result<()> {
    for i in 0..stack.len() {
        if let Some(&translation) = adjustments.get(stack.basename(i)) {
            debug!(basename = stack.basename(i), ?translation, "applying adjustment");
            stack.translate_transform(i, translation)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::spatial::{spacing, Spacing2};
    use crate::transform::ParametricTransform;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn stack(sizes: &[Option<[usize; 2]>], pixel: f64) -> Stack<TestBackend> {
        let device = Default::default();
        let slices = sizes
            .iter()
            .map(|size| {
                size.map(|[w, h]| Image::from_pixels(vec![0.0; w * h], [h, w], spacing([1.0, 1.0]), &device))
            })
            .collect();
        let basenames = (0..sizes.len()).map(|i| format!("{:04}", i)).collect();
        Stack::new(slices, basenames, Spacing2::new(pixel, pixel), spacing([2.0, 2.0, 10.0]), &device)
    }

    #[test]
    fn test_common_centre_translation() {
        let mut s = stack(&[Some([10, 20]), None], 1.0).with_size([4, 4]);
        initialize_to_common_centre(&mut s);
        assert_eq!(
            s.transform(0),
            &Transform2D::CenteredRigid2D {
                angle: 0.0,
                center: Point2::origin(),
                translation: Vector2::new((10.0 - 8.0) / 2.0, (20.0 - 8.0) / 2.0),
            }
        );
        match s.transform(1) {
            Transform2D::CenteredRigid2D { translation, .. } => assert_eq!(*translation, Vector2::new(-4.0, -4.0)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_moving_center_keeps_mapping() {
        let fixed = stack(&[Some([8, 8])], 1.0).with_size([6, 10]);
        let mut moving = stack(&[Some([8, 8])], 1.0);
        moving.set_transforms(vec![Transform2D::CenteredRigid2D {
            angle: 0.3,
            center: Point2::origin(),
            translation: Vector2::new(1.0, 2.0),
        }]);
        let before = moving.transform(0).clone();

        set_moving_stack_center_with_fixed_stack(&fixed, &mut moving);

        assert_eq!(moving.transform(0).center(), Point2::new(6.0, 10.0));
        let p = Point2::new(3.0, -4.0);
        assert!((moving.transform(0).transform_point(&p) - before.transform_point(&p)).norm() < 1e-9);
    }

    #[test]
    fn test_reinitialise_whole_stack() {
        let mut s = stack(&[Some([4, 4]), Some([4, 4])], 1.0);
        initialize_to_common_centre(&mut s);
        initialize_from_current_transforms(&mut s, TransformKind::CenteredAffine).unwrap();
        assert!(s.transforms().iter().all(|t| t.kind() == TransformKind::CenteredAffine));

        initialize_to_identity(&mut s);
        initialize_from_current_transforms(&mut s, TransformKind::CenteredRigid2D).unwrap();
        assert_eq!(
            s.transform(1),
            &Transform2D::identity(TransformKind::CenteredRigid2D, Point2::origin())
        );
    }

    #[test]
    fn test_bspline_from_bulk() {
        let fixed = stack(&[Some([4, 4])], 1.0).with_size([8, 8]);
        let mut moving = stack(&[Some([4, 4])], 1.0);
        initialize_to_common_centre(&mut moving);
        let bulk = moving.transform(0).clone();

        initialize_bspline_from_bulk(&fixed, &mut moving, 4).unwrap();

        match moving.transform(0) {
            Transform2D::BSplineDeformable(b) => {
                assert_eq!(b.bulk(), &bulk);
                assert_eq!(b.grid().size, [7, 7]);
                assert_eq!(b.parameters().len(), 2 * 49);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_translate_and_adjust() {
        let mut s = stack(&[Some([4, 4]), Some([4, 4])], 1.0);
        initialize_with_translation(&mut s, Vector2::new(1.0, 1.0));
        translate(&mut s, Vector2::new(0.5, 0.0)).unwrap();

        let mut adjustments = HashMap::new();
        adjustments.insert("0001".to_string(), Vector2::new(0.0, 3.0));
        adjustments.insert("9999".to_string(), Vector2::new(100.0, 0.0));
        apply_adjustments(&mut s, &adjustments).unwrap();

        assert_eq!(s.transform(0), &Transform2D::Translation { offset: Vector2::new(1.5, 1.0) });
        assert_eq!(s.transform(1), &Transform2D::Translation { offset: Vector2::new(1.5, 4.0) });
    }

    #[test]
    fn test_identity_then_single_slice_translation() {
        let mut s = stack(&[Some([4, 4]), Some([4, 4])], 1.0);
        initialize_with_translation(&mut s, Vector2::new(2.0, 2.0));
        initialize_to_identity(&mut s);
        assert!(s.transforms().iter().all(|t| t == &Transform2D::Identity));

        initialize_with_translation(&mut s, Vector2::new(0.0, 0.0));
        translate_slice(&mut s, 1, Vector2::new(-1.0, 0.25)).unwrap();
        assert_eq!(s.transform(0), &Transform2D::Translation { offset: Vector2::new(0.0, 0.0) });
        assert_eq!(s.transform(1), &Transform2D::Translation { offset: Vector2::new(-1.0, 0.25) });
    }
}
