//! The 2D slice transform family.
//!
//! Every linear member maps `x -> M (x - c) + c + t`. The offset
//! `O = t + c - M c` is what composition and inversion act on; the center
//! only decides how the same mapping is split into parameters.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::Matrix2;

use super::bspline::BSplineDeformable;
use super::error::{Result, TransformError};
use super::kind::TransformKind;
use super::mapping::{apply_linear, constant, scalar};
use super::trait_::ParametricTransform;
use crate::spatial::{Point2, Vector2};

/// Relative tolerance when projecting a matrix back into a constrained family.
const FAMILY_TOLERANCE: f64 = 1e-6;

/// Matrix, center and translation of a linear transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearParts {
    pub matrix: Matrix2<f64>,
    pub center: Point2,
    pub translation: Vector2,
}

impl LinearParts {
    pub fn identity(center: Point2) -> Self {
        Self {
            matrix: Matrix2::identity(),
            center,
            translation: Vector2::zeros(),
        }
    }

    /// Parts with the given `offset`, recomputing the translation for `center`.
    pub fn from_offset(matrix: Matrix2<f64>, center: Point2, offset: Vector2) -> Self {
        Self {
            matrix,
            center,
            translation: offset - center.coords + matrix * center.coords,
        }
    }

    pub fn offset(&self) -> Vector2 {
        self.translation + self.center.coords - self.matrix * self.center.coords
    }

    pub fn apply(&self, point: &Point2) -> Point2 {
        Point2::from(self.matrix * point.coords + self.offset())
    }
}

/// A 2D slice transform.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform2D {
    Identity,
    Translation {
        offset: Vector2,
    },
    CenteredRigid2D {
        angle: f64,
        center: Point2,
        translation: Vector2,
    },
    CenteredSimilarity2D {
        scale: f64,
        angle: f64,
        center: Point2,
        translation: Vector2,
    },
    CenteredAffine {
        matrix: Matrix2<f64>,
        center: Point2,
        translation: Vector2,
    },
    /// Affine transform whose center is a fixed parameter.
    Affine {
        matrix: Matrix2<f64>,
        center: Point2,
        translation: Vector2,
    },
    BSplineDeformable(Box<BSplineDeformable>),
}

fn rotation(angle: f64) -> Matrix2<f64> {
    let (s, c) = angle.sin_cos();
    Matrix2::new(c, -s, s, c)
}

fn close(a: &Matrix2<f64>, b: &Matrix2<f64>) -> bool {
    (a - b).norm() <= FAMILY_TOLERANCE * a.norm().max(1.0)
}

impl Transform2D {
    /// The identity member of `kind`, with the given center where the kind
    /// has one.
    ///
    /// The B-spline identity has an empty control grid and an identity
    /// rigid bulk transform.
    pub fn identity(kind: TransformKind, center: Point2) -> Self {
        let translation = Vector2::zeros();
        match kind {
            TransformKind::Identity => Transform2D::Identity,
            TransformKind::Translation => Transform2D::Translation { offset: translation },
            TransformKind::CenteredRigid2D => Transform2D::CenteredRigid2D { angle: 0.0, center, translation },
            TransformKind::CenteredSimilarity2D => Transform2D::CenteredSimilarity2D {
                scale: 1.0,
                angle: 0.0,
                center,
                translation,
            },
            TransformKind::CenteredAffine => Transform2D::CenteredAffine {
                matrix: Matrix2::identity(),
                center,
                translation,
            },
            TransformKind::Affine => Transform2D::Affine {
                matrix: Matrix2::identity(),
                center,
                translation,
            },
            TransformKind::BSplineDeformable => Transform2D::BSplineDeformable(Box::new(
                BSplineDeformable::empty(Transform2D::identity(TransformKind::CenteredRigid2D, center)),
            )),
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform2D::Identity => TransformKind::Identity,
            Transform2D::Translation { .. } => TransformKind::Translation,
            Transform2D::CenteredRigid2D { .. } => TransformKind::CenteredRigid2D,
            Transform2D::CenteredSimilarity2D { .. } => TransformKind::CenteredSimilarity2D,
            Transform2D::CenteredAffine { .. } => TransformKind::CenteredAffine,
            Transform2D::Affine { .. } => TransformKind::Affine,
            Transform2D::BSplineDeformable(_) => TransformKind::BSplineDeformable,
        }
    }

    /// Matrix, center and translation, or `None` for a B-spline.
    pub fn linear_parts(&self) -> Option<LinearParts> {
        match *self {
            Transform2D::Identity => Some(LinearParts::identity(Point2::origin())),
            Transform2D::Translation { offset } => Some(LinearParts {
                matrix: Matrix2::identity(),
                center: Point2::origin(),
                translation: offset,
            }),
            Transform2D::CenteredRigid2D { angle, center, translation } => Some(LinearParts {
                matrix: rotation(angle),
                center,
                translation,
            }),
            Transform2D::CenteredSimilarity2D { scale, angle, center, translation } => Some(LinearParts {
                matrix: rotation(angle) * scale,
                center,
                translation,
            }),
            Transform2D::CenteredAffine { matrix, center, translation }
            | Transform2D::Affine { matrix, center, translation } => Some(LinearParts {
                matrix,
                center,
                translation,
            }),
            Transform2D::BSplineDeformable(_) => None,
        }
    }

    pub(crate) fn require_linear(&self, operation: &str) -> Result<LinearParts> {
        self.linear_parts()
            .ok_or_else(|| TransformError::Unsupported(format!("{} of a {}", operation, self.kind())))
    }

    /// Build a member of `kind` from linear parts, projecting the matrix back
    /// into the family. Fails with `NotRepresentable` if the matrix is not
    /// within tolerance of the family.
    pub fn from_linear(kind: TransformKind, parts: LinearParts, operation: &str) -> Result<Self> {
        let LinearParts { matrix, center, translation } = parts;
        let reject = || TransformError::not_representable(kind, operation);
        match kind {
            TransformKind::Identity => {
                if close(&matrix, &Matrix2::identity()) && parts.offset().norm() <= FAMILY_TOLERANCE {
                    Ok(Transform2D::Identity)
                } else {
                    Err(reject())
                }
            }
            TransformKind::Translation => {
                if close(&matrix, &Matrix2::identity()) {
                    Ok(Transform2D::Translation { offset: parts.offset() })
                } else {
                    Err(reject())
                }
            }
            TransformKind::CenteredRigid2D => {
                let angle = (matrix[(1, 0)] - matrix[(0, 1)]).atan2(matrix[(0, 0)] + matrix[(1, 1)]);
                if close(&matrix, &rotation(angle)) {
                    Ok(Transform2D::CenteredRigid2D { angle, center, translation })
                } else {
                    Err(reject())
                }
            }
            TransformKind::CenteredSimilarity2D => {
                let det = matrix.determinant();
                if det <= 0.0 {
                    return Err(reject());
                }
                let scale = det.sqrt();
                let angle = (matrix[(1, 0)] - matrix[(0, 1)]).atan2(matrix[(0, 0)] + matrix[(1, 1)]);
                if close(&matrix, &(rotation(angle) * scale)) {
                    Ok(Transform2D::CenteredSimilarity2D { scale, angle, center, translation })
                } else {
                    Err(reject())
                }
            }
            TransformKind::CenteredAffine => Ok(Transform2D::CenteredAffine { matrix, center, translation }),
            TransformKind::Affine => Ok(Transform2D::Affine { matrix, center, translation }),
            TransformKind::BSplineDeformable => Err(TransformError::Unsupported(format!(
                "{} into a B-spline; use reinitialize_as",
                operation
            ))),
        }
    }

    /// Center of the transform. Kinds without a center report the origin; a
    /// B-spline reports the center of its bulk transform.
    pub fn center(&self) -> Point2 {
        match self {
            Transform2D::BSplineDeformable(b) => b.bulk().center(),
            other => other.linear_parts().map(|p| p.center).unwrap_or_else(Point2::origin),
        }
    }

    /// `M`, or `None` for a B-spline.
    pub fn matrix(&self) -> Option<Matrix2<f64>> {
        self.linear_parts().map(|p| p.matrix)
    }

    /// `O = t + c - M c`, or `None` for a B-spline.
    pub fn offset(&self) -> Option<Vector2> {
        self.linear_parts().map(|p| p.offset())
    }

    fn center_and_translation_mut(&mut self) -> Option<(&mut Point2, &mut Vector2)> {
        match self {
            Transform2D::CenteredRigid2D { center, translation, .. }
            | Transform2D::CenteredSimilarity2D { center, translation, .. }
            | Transform2D::CenteredAffine { center, translation, .. }
            | Transform2D::Affine { center, translation, .. } => Some((center, translation)),
            _ => None,
        }
    }

    /// Change the center, keeping the offset; the mapping is unchanged.
    ///
    /// A no-op for kinds without a center.
    pub fn move_center(&mut self, new_center: Point2) {
        if let Transform2D::BSplineDeformable(b) = self {
            b.bulk_mut().move_center(new_center);
            return;
        }
        let Some(parts) = self.linear_parts() else { return };
        let moved = LinearParts::from_offset(parts.matrix, new_center, parts.offset());
        if let Some((center, translation)) = self.center_and_translation_mut() {
            *center = moved.center;
            *translation = moved.translation;
        }
    }

    /// Change the center, keeping the translation; the mapping changes.
    pub fn set_center(&mut self, new_center: Point2) {
        if let Transform2D::BSplineDeformable(b) = self {
            b.bulk_mut().set_center(new_center);
            return;
        }
        if let Some((center, _)) = self.center_and_translation_mut() {
            *center = new_center;
        }
    }

    /// Pre-compose a translation by `v`, so the result maps `x -> T(x + v)`.
    ///
    /// A translation just adds `v`; the identity becomes a translation.
    pub fn translate(&self, v: Vector2) -> Result<Self> {
        match self {
            Transform2D::Identity => Ok(Transform2D::Translation { offset: v }),
            Transform2D::Translation { offset } => Ok(Transform2D::Translation { offset: offset + v }),
            Transform2D::BSplineDeformable(b) => {
                let mut out = b.clone();
                *out.bulk_mut() = b.bulk().translate(v)?;
                Ok(Transform2D::BSplineDeformable(out))
            }
            _ => self.compose(&Transform2D::Translation { offset: v }, true),
        }
    }
}

impl ParametricTransform<2> for Transform2D {
    fn type_tag(&self) -> String {
        self.kind().type_tag()
    }

    fn parameters(&self) -> Vec<f64> {
        match self {
            Transform2D::Identity => Vec::new(),
            Transform2D::Translation { offset } => vec![offset.x, offset.y],
            Transform2D::CenteredRigid2D { angle, center, translation } => {
                vec![*angle, center.x, center.y, translation.x, translation.y]
            }
            Transform2D::CenteredSimilarity2D { scale, angle, center, translation } => {
                vec![*scale, *angle, center.x, center.y, translation.x, translation.y]
            }
            Transform2D::CenteredAffine { matrix, center, translation } => vec![
                matrix[(0, 0)],
                matrix[(0, 1)],
                matrix[(1, 0)],
                matrix[(1, 1)],
                center.x,
                center.y,
                translation.x,
                translation.y,
            ],
            Transform2D::Affine { matrix, translation, .. } => vec![
                matrix[(0, 0)],
                matrix[(0, 1)],
                matrix[(1, 0)],
                matrix[(1, 1)],
                translation.x,
                translation.y,
            ],
            Transform2D::BSplineDeformable(b) => b.parameters(),
        }
    }

    fn set_parameters(&mut self, p: &[f64]) -> Result<()> {
        if let Transform2D::BSplineDeformable(b) = self {
            return b.set_parameters(p);
        }
        TransformError::check_count(self.number_of_parameters(), p.len())?;
        match self {
            Transform2D::Identity | Transform2D::BSplineDeformable(_) => {}
            Transform2D::Translation { offset } => *offset = Vector2::new(p[0], p[1]),
            Transform2D::CenteredRigid2D { angle, center, translation } => {
                *angle = p[0];
                *center = Point2::new(p[1], p[2]);
                *translation = Vector2::new(p[3], p[4]);
            }
            Transform2D::CenteredSimilarity2D { scale, angle, center, translation } => {
                *scale = p[0];
                *angle = p[1];
                *center = Point2::new(p[2], p[3]);
                *translation = Vector2::new(p[4], p[5]);
            }
            Transform2D::CenteredAffine { matrix, center, translation } => {
                *matrix = Matrix2::new(p[0], p[1], p[2], p[3]);
                *center = Point2::new(p[4], p[5]);
                *translation = Vector2::new(p[6], p[7]);
            }
            Transform2D::Affine { matrix, translation, .. } => {
                *matrix = Matrix2::new(p[0], p[1], p[2], p[3]);
                *translation = Vector2::new(p[4], p[5]);
            }
        }
        Ok(())
    }

    fn fixed_parameters(&self) -> Vec<f64> {
        match self {
            Transform2D::Affine { center, .. } => vec![center.x, center.y],
            Transform2D::BSplineDeformable(b) => b.fixed_parameters(),
            _ => Vec::new(),
        }
    }

    fn set_fixed_parameters(&mut self, fixed: &[f64]) -> Result<()> {
        match self {
            Transform2D::Affine { center, .. } => {
                TransformError::check_count(2, fixed.len())?;
                *center = Point2::new(fixed[0], fixed[1]);
                Ok(())
            }
            Transform2D::BSplineDeformable(b) => b.set_fixed_parameters(fixed),
            _ => TransformError::check_count(0, fixed.len()),
        }
    }

    fn transform_point(&self, point: &Point2) -> Point2 {
        match self {
            Transform2D::BSplineDeformable(b) => b.transform_point(point),
            other => other
                .linear_parts()
                .map(|parts| parts.apply(point))
                .unwrap_or(*point),
        }
    }

    fn map_points<B: Backend>(&self, p: Tensor<B, 1>, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        match self {
            Transform2D::Identity => points,
            Transform2D::Translation { .. } => points + p.reshape([1, 2]),
            Transform2D::CenteredRigid2D { .. } => {
                let angle = scalar(&p, 0);
                let (c, s) = (angle.clone().cos(), angle.sin());
                apply_linear(
                    points,
                    &[c.clone(), s.clone().neg(), s, c],
                    &[scalar(&p, 1), scalar(&p, 2)],
                    &[scalar(&p, 3), scalar(&p, 4)],
                )
            }
            Transform2D::CenteredSimilarity2D { .. } => {
                let scale = scalar(&p, 0);
                let angle = scalar(&p, 1);
                let c = angle.clone().cos() * scale.clone();
                let s = angle.sin() * scale;
                apply_linear(
                    points,
                    &[c.clone(), s.clone().neg(), s, c],
                    &[scalar(&p, 2), scalar(&p, 3)],
                    &[scalar(&p, 4), scalar(&p, 5)],
                )
            }
            Transform2D::CenteredAffine { .. } => apply_linear(
                points,
                &[scalar(&p, 0), scalar(&p, 1), scalar(&p, 2), scalar(&p, 3)],
                &[scalar(&p, 4), scalar(&p, 5)],
                &[scalar(&p, 6), scalar(&p, 7)],
            ),
            Transform2D::Affine { center, .. } => {
                let (cx, cy) = (constant::<B>(center.x, &device), constant::<B>(center.y, &device));
                apply_linear(
                    points,
                    &[scalar(&p, 0), scalar(&p, 1), scalar(&p, 2), scalar(&p, 3)],
                    &[cx, cy],
                    &[scalar(&p, 4), scalar(&p, 5)],
                )
            }
            Transform2D::BSplineDeformable(b) => b.map_points(p, points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::mapping::parameter_tensor;
    use burn_ndarray::NdArray;
    use std::f64::consts::FRAC_PI_2;

    type TestBackend = NdArray<f32>;

    fn assert_points_close(a: &Point2, b: &Point2) {
        assert!((a - b).norm() < 1e-9, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_rigid_maps_about_center() {
        let t = Transform2D::CenteredRigid2D {
            angle: FRAC_PI_2,
            center: Point2::new(1.0, 1.0),
            translation: Vector2::new(0.0, 1.0),
        };
        assert_points_close(&t.transform_point(&Point2::new(2.0, 1.0)), &Point2::new(1.0, 3.0));
        assert_points_close(&t.transform_point(&Point2::new(1.0, 1.0)), &Point2::new(1.0, 2.0));
    }

    #[test]
    fn test_parameters_round_trip_for_every_linear_kind() {
        for kind in TransformKind::ALL.into_iter().filter(|k| k.is_linear()) {
            let mut t = Transform2D::identity(kind, Point2::new(3.0, 4.0));
            let params = t.parameters();
            let expected = match kind {
                TransformKind::Identity => 0,
                TransformKind::Translation => 2,
                TransformKind::CenteredRigid2D => 5,
                TransformKind::CenteredSimilarity2D => 6,
                TransformKind::CenteredAffine => 8,
                TransformKind::Affine => 6,
                TransformKind::BSplineDeformable => unreachable!(),
            };
            assert_eq!(params.len(), expected, "{}", kind);
            t.set_parameters(&params).unwrap();
            assert_eq!(t.parameters(), params);
        }
    }

    #[test]
    fn test_set_parameters_rejects_wrong_length() {
        let mut t = Transform2D::identity(TransformKind::CenteredRigid2D, Point2::origin());
        assert_eq!(
            t.set_parameters(&[0.0; 4]),
            Err(TransformError::ParameterCount { expected: 5, actual: 4 })
        );
    }

    #[test]
    fn test_move_center_preserves_mapping() {
        let mut t = Transform2D::CenteredSimilarity2D {
            scale: 1.3,
            angle: 0.4,
            center: Point2::new(5.0, -2.0),
            translation: Vector2::new(1.0, 2.0),
        };
        let point = Point2::new(7.0, 11.0);
        let before = t.transform_point(&point);
        t.move_center(Point2::new(-20.0, 30.0));
        assert_eq!(t.center(), Point2::new(-20.0, 30.0));
        assert_points_close(&t.transform_point(&point), &before);
    }

    #[test]
    fn test_set_center_keeps_translation() {
        let mut t = Transform2D::CenteredRigid2D {
            angle: 0.3,
            center: Point2::origin(),
            translation: Vector2::new(1.0, 2.0),
        };
        t.set_center(Point2::new(4.0, 4.0));
        match t {
            Transform2D::CenteredRigid2D { center, translation, .. } => {
                assert_eq!(center, Point2::new(4.0, 4.0));
                assert_eq!(translation, Vector2::new(1.0, 2.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_translate_pre_composes() {
        let t = Transform2D::CenteredRigid2D {
            angle: FRAC_PI_2,
            center: Point2::origin(),
            translation: Vector2::zeros(),
        };
        let v = Vector2::new(1.0, 0.0);
        let moved = t.translate(v).unwrap();
        let point = Point2::new(2.0, 3.0);
        assert_points_close(&moved.transform_point(&point), &t.transform_point(&(point + v)));

        let shifted = Transform2D::Translation { offset: Vector2::new(1.0, 1.0) }.translate(v).unwrap();
        assert_eq!(shifted, Transform2D::Translation { offset: Vector2::new(2.0, 1.0) });
        assert_eq!(Transform2D::Identity.translate(v).unwrap(), Transform2D::Translation { offset: v });
    }

    #[test]
    fn test_map_points_matches_transform_point() {
        let device = Default::default();
        let transforms = vec![
            Transform2D::Translation { offset: Vector2::new(1.5, -2.0) },
            Transform2D::CenteredRigid2D { angle: 0.2, center: Point2::new(3.0, 4.0), translation: Vector2::new(1.0, -1.0) },
            Transform2D::CenteredSimilarity2D {
                scale: 0.9,
                angle: -0.1,
                center: Point2::new(1.0, 2.0),
                translation: Vector2::new(0.5, 0.5),
            },
            Transform2D::CenteredAffine {
                matrix: Matrix2::new(1.1, 0.2, -0.1, 0.95),
                center: Point2::new(2.0, 2.0),
                translation: Vector2::new(-1.0, 3.0),
            },
            Transform2D::Affine {
                matrix: Matrix2::new(0.9, -0.3, 0.1, 1.2),
                center: Point2::new(-2.0, 5.0),
                translation: Vector2::new(2.0, 0.0),
            },
        ];
        let hosts = [Point2::new(0.0, 0.0), Point2::new(10.0, -3.0), Point2::new(-4.5, 7.25)];
        let points = Tensor::<TestBackend, 2>::from_floats(
            [[0.0, 0.0], [10.0, -3.0], [-4.5, 7.25]],
            &device,
        );

        for t in transforms {
            let params = parameter_tensor::<TestBackend>(&t.parameters(), &device);
            let mapped = t.map_points(params, points.clone());
            let data = mapped.into_data();
            let values = data.as_slice::<f32>().unwrap();
            for (i, point) in hosts.iter().enumerate() {
                let expected = t.transform_point(point);
                assert!((values[2 * i] as f64 - expected.x).abs() < 1e-4, "{:?}", t);
                assert!((values[2 * i + 1] as f64 - expected.y).abs() < 1e-4, "{:?}", t);
            }
        }
    }

    #[test]
    fn test_fixed_parameters_only_on_affine() {
        let mut t = Transform2D::identity(TransformKind::Affine, Point2::new(1.0, 2.0));
        assert_eq!(t.fixed_parameters(), vec![1.0, 2.0]);
        t.set_fixed_parameters(&[3.0, 4.0]).unwrap();
        assert_eq!(t.center(), Point2::new(3.0, 4.0));

        let mut rigid = Transform2D::identity(TransformKind::CenteredRigid2D, Point2::origin());
        assert!(rigid.fixed_parameters().is_empty());
        assert!(rigid.set_fixed_parameters(&[1.0]).is_err());
    }
}
