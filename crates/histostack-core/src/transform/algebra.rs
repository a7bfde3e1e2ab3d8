//! Composition, inversion, square roots and blends of 2D transforms.

use nalgebra::Matrix2;

use super::bspline::BSplineDeformable;
use super::error::{Result, TransformError};
use super::kind::TransformKind;
use super::linear::{LinearParts, Transform2D};
use crate::spatial::Point2;

impl Transform2D {
    /// Compose with `other`, keeping `self`'s kind and center.
    ///
    /// With `pre = true` the result is `self ∘ other` (`other` applied
    /// first); with `pre = false` it is `other ∘ self`.
    pub fn compose(&self, other: &Transform2D, pre: bool) -> Result<Self> {
        let a = self.require_linear("composition")?;
        let b = other.require_linear("composition")?;

        let (matrix, offset) = if pre {
            (a.matrix * b.matrix, a.matrix * b.offset() + a.offset())
        } else {
            (b.matrix * a.matrix, b.matrix * a.offset() + b.offset())
        };

        let parts = LinearParts::from_offset(matrix, a.center, offset);
        Transform2D::from_linear(self.kind(), parts, "composition")
    }

    /// The inverse mapping, in the same kind and with the same center.
    pub fn inverse(&self) -> Result<Self> {
        let parts = self.require_linear("inverse")?;
        let inverse = parts.matrix.try_inverse().ok_or(TransformError::Singular)?;
        let offset = -(inverse * parts.offset());
        Transform2D::from_linear(
            self.kind(),
            LinearParts::from_offset(inverse, parts.center, offset),
            "inverse",
        )
    }

    /// The transform `S` with `S ∘ S = self`, in the same kind and center.
    ///
    /// Uses the closed form for 2x2 matrices: with `s = √det M` and
    /// `t = √(tr M + 2s)`, the root matrix is `(M + sI) / t` and the root
    /// offset solves `(m + I) o = O`.
    pub fn square_root(&self) -> Result<Self> {
        let parts = self.require_linear("square root")?;
        let m = parts.matrix;
        let det = m.determinant();
        let trace = m.trace();
        if det < 0.0 {
            return Err(TransformError::SquareRootDomain { det, trace });
        }
        let s = det.sqrt();
        let denominator = trace + 2.0 * s;
        if denominator <= f64::EPSILON {
            return Err(TransformError::SquareRootDomain { det, trace });
        }
        let t = denominator.sqrt();

        let identity = Matrix2::identity();
        let root = (m + identity * s) / t;
        let offset = (root + identity)
            .try_inverse()
            .ok_or(TransformError::Singular)?
            * parts.offset();

        Transform2D::from_linear(
            self.kind(),
            LinearParts::from_offset(root, parts.center, offset),
            "square root",
        )
    }

    /// `(1 - alpha) * a + alpha * b` on matrices and offsets, as a
    /// `CenteredAffine` with zero center.
    pub fn interpolate(a: &Transform2D, b: &Transform2D, alpha: f64) -> Result<Self> {
        let pa = a.require_linear("interpolation")?;
        let pb = b.require_linear("interpolation")?;

        let matrix = pa.matrix * (1.0 - alpha) + pb.matrix * alpha;
        let offset = pa.offset() * (1.0 - alpha) + pb.offset() * alpha;

        Ok(Transform2D::CenteredAffine {
            matrix,
            center: Point2::origin(),
            translation: offset,
        })
    }

    /// The same mapping expressed as `kind`, keeping the center.
    ///
    /// A linear transform becomes the bulk of an empty B-spline.
    pub fn reinitialize_as(&self, kind: TransformKind) -> Result<Self> {
        if kind == TransformKind::BSplineDeformable {
            return match self {
                Transform2D::BSplineDeformable(_) => Ok(self.clone()),
                linear => Ok(Transform2D::BSplineDeformable(Box::new(BSplineDeformable::empty(
                    linear.clone(),
                )))),
            };
        }
        Transform2D::identity(kind, self.center()).compose(self, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::Vector2;
    use crate::transform::ParametricTransform;
    use std::f64::consts::FRAC_PI_2;

    fn rigid(angle: f64, cx: f64, cy: f64, tx: f64, ty: f64) -> Transform2D {
        Transform2D::CenteredRigid2D {
            angle,
            center: Point2::new(cx, cy),
            translation: Vector2::new(tx, ty),
        }
    }

    fn assert_same_mapping(a: &Transform2D, b: &Transform2D) {
        for point in [Point2::new(0.0, 0.0), Point2::new(13.0, -7.0), Point2::new(-2.5, 40.0)] {
            let pa = a.transform_point(&point);
            let pb = b.transform_point(&point);
            assert!((pa - pb).norm() < 1e-8, "{:?} vs {:?} at {:?}", pa, pb, point);
        }
    }

    #[test]
    fn test_compose_order() {
        let rotate = rigid(FRAC_PI_2, 0.0, 0.0, 0.0, 0.0);
        let shift = rigid(0.0, 0.0, 0.0, 1.0, 0.0);
        let p = Point2::new(1.0, 0.0);

        // pre: rotate(shift(p)) = rotate((2, 0)) = (0, 2)
        let pre = rotate.compose(&shift, true).unwrap();
        assert!((pre.transform_point(&p) - Point2::new(0.0, 2.0)).norm() < 1e-12);

        // post: shift(rotate(p)) = shift((0, 1)) = (1, 1)
        let post = rotate.compose(&shift, false).unwrap();
        assert!((post.transform_point(&p) - Point2::new(1.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_compose_keeps_center_and_kind() {
        let a = rigid(0.3, 5.0, 6.0, 1.0, 2.0);
        let b = rigid(-0.1, -3.0, 2.0, 0.0, 4.0);
        let c = a.compose(&b, false).unwrap();
        assert_eq!(c.kind(), TransformKind::CenteredRigid2D);
        assert_eq!(c.center(), Point2::new(5.0, 6.0));
    }

    #[test]
    fn test_rigid_compose_with_shear_is_not_representable() {
        let a = rigid(0.3, 0.0, 0.0, 0.0, 0.0);
        let shear = Transform2D::CenteredAffine {
            matrix: Matrix2::new(1.0, 0.5, 0.0, 1.0),
            center: Point2::origin(),
            translation: Vector2::zeros(),
        };
        assert!(matches!(a.compose(&shear, true), Err(TransformError::NotRepresentable { .. })));
    }

    #[test]
    fn test_translation_composes_only_with_translations() {
        let t = Transform2D::Translation { offset: Vector2::new(1.0, 2.0) };
        let u = Transform2D::Translation { offset: Vector2::new(-3.0, 0.5) };
        assert_eq!(
            t.compose(&u, false).unwrap(),
            Transform2D::Translation { offset: Vector2::new(-2.0, 2.5) }
        );
        assert!(matches!(
            t.compose(&rigid(0.2, 0.0, 0.0, 0.0, 0.0), false),
            Err(TransformError::NotRepresentable { .. })
        ));
        assert!(matches!(
            Transform2D::Identity.compose(&rigid(0.2, 0.0, 0.0, 0.0, 0.0), false),
            Err(TransformError::NotRepresentable { .. })
        ));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform2D::CenteredAffine {
            matrix: Matrix2::new(1.2, 0.1, -0.3, 0.8),
            center: Point2::new(10.0, 20.0),
            translation: Vector2::new(-4.0, 2.0),
        };
        let inv = t.inverse().unwrap();
        assert_eq!(inv.center(), t.center());
        let identity = t.compose(&inv, true).unwrap();
        assert_same_mapping(&identity, &Transform2D::identity(TransformKind::CenteredAffine, Point2::origin()));
    }

    #[test]
    fn test_singular_inverse() {
        let t = Transform2D::Affine {
            matrix: Matrix2::new(1.0, 2.0, 2.0, 4.0),
            center: Point2::origin(),
            translation: Vector2::zeros(),
        };
        assert_eq!(t.inverse(), Err(TransformError::Singular));
    }

    #[test]
    fn test_square_root_of_rotation_halves_angle() {
        let t = rigid(0.8, 3.0, 4.0, 2.0, -1.0);
        let root = t.square_root().unwrap();
        match root {
            Transform2D::CenteredRigid2D { angle, center, .. } => {
                assert!((angle - 0.4).abs() < 1e-12);
                assert_eq!(center, Point2::new(3.0, 4.0));
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_same_mapping(&root.compose(&root, true).unwrap(), &t);
    }

    #[test]
    fn test_square_root_domain() {
        let reflection = Transform2D::CenteredAffine {
            matrix: Matrix2::new(-1.0, 0.0, 0.0, 1.0),
            center: Point2::origin(),
            translation: Vector2::zeros(),
        };
        assert!(matches!(reflection.square_root(), Err(TransformError::SquareRootDomain { .. })));

        // Rotation by pi: trace + 2 sqrt(det) = 0.
        let half_turn = rigid(std::f64::consts::PI, 0.0, 0.0, 0.0, 0.0);
        assert!(matches!(half_turn.square_root(), Err(TransformError::SquareRootDomain { .. })));
    }

    #[test]
    fn test_interpolate_endpoints() {
        let a = rigid(0.2, 1.0, 1.0, 3.0, 0.0);
        let b = Transform2D::Translation { offset: Vector2::new(0.0, 5.0) };
        let start = Transform2D::interpolate(&a, &b, 0.0).unwrap();
        let end = Transform2D::interpolate(&a, &b, 1.0).unwrap();
        assert_eq!(start.kind(), TransformKind::CenteredAffine);
        assert_eq!(start.center(), Point2::origin());
        assert_same_mapping(&start, &a);
        assert_same_mapping(&end, &b);
    }

    #[test]
    fn test_reinitialize_is_lossless_up_the_chain() {
        let t = rigid(0.25, 7.0, -2.0, 1.0, 1.5);
        let similarity = t.reinitialize_as(TransformKind::CenteredSimilarity2D).unwrap();
        let affine = similarity.reinitialize_as(TransformKind::CenteredAffine).unwrap();
        assert_eq!(similarity.center(), t.center());
        assert_eq!(affine.center(), t.center());
        assert_same_mapping(&similarity, &t);
        assert_same_mapping(&affine, &t);

        let bspline = affine.reinitialize_as(TransformKind::BSplineDeformable).unwrap();
        assert_eq!(bspline.kind(), TransformKind::BSplineDeformable);
        assert_same_mapping(&bspline, &t);
    }

    #[test]
    fn test_bspline_algebra_is_unsupported() {
        let b = Transform2D::identity(TransformKind::BSplineDeformable, Point2::origin());
        assert!(matches!(b.square_root(), Err(TransformError::Unsupported(_))));
        assert!(matches!(b.inverse(), Err(TransformError::Unsupported(_))));
    }
}
