//! Versor rigid 3D transform.
//!
//! The rotation is stored as the vector part `v` of a unit quaternion, with
//! the scalar part recovered as `w = √(1 - |v|²)`. The center of rotation is
//! a fixed parameter: `T(x) = R(x - c) + c + t`.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use nalgebra::{Matrix3, Quaternion, UnitQuaternion};

use super::error::{Result, TransformError};
use super::mapping::{apply_linear, constant, scalar};
use super::trait_::ParametricTransform;
use crate::spatial::{Point3, Vector3};

pub const RIGID3D_TYPE_TAG: &str = "VersorRigid3DTransform_double_3_3";

/// Rigid 3D transform parameterised by `[vx, vy, vz, tx, ty, tz]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rigid3D {
    versor: Vector3,
    translation: Vector3,
    center: Point3,
}

impl Default for Rigid3D {
    fn default() -> Self {
        Self::identity(Point3::origin())
    }
}

impl Rigid3D {
    pub fn identity(center: Point3) -> Self {
        Self {
            versor: Vector3::zeros(),
            translation: Vector3::zeros(),
            center,
        }
    }

    /// Rotation by `angle` radians about `axis`, followed by `translation`.
    pub fn from_axis_angle(axis: Vector3, angle: f64, translation: Vector3, center: Point3) -> Self {
        let axis = axis.normalize();
        Self {
            versor: axis * (angle / 2.0).sin(),
            translation,
            center,
        }
    }

    pub fn center(&self) -> &Point3 {
        &self.center
    }

    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }

    pub fn versor(&self) -> &Vector3 {
        &self.versor
    }

    pub fn set_center(&mut self, center: Point3) {
        self.center = center;
    }

    fn scalar_part(&self) -> f64 {
        (1.0 - self.versor.norm_squared()).max(0.0).sqrt()
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let q = Quaternion::new(self.scalar_part(), self.versor.x, self.versor.y, self.versor.z);
        UnitQuaternion::from_quaternion(q).to_rotation_matrix().into_inner()
    }

    /// The inverse rigid transform about the same center.
    pub fn inverse(&self) -> Self {
        let r = self.rotation_matrix();
        let offset = self.translation + self.center.coords - r * self.center.coords;
        let inverse_offset = -(r.transpose() * offset);
        let translation = inverse_offset - self.center.coords + r.transpose() * self.center.coords;
        Self {
            versor: -self.versor,
            translation,
            center: self.center,
        }
    }

    /// Rotation matrix entries, row-major, as `[1, 1]` tensors.
    fn rotation_entries<B: Backend>(parameters: &Tensor<B, 1>) -> Vec<Tensor<B, 2>> {
        let x = scalar(parameters, 0);
        let y = scalar(parameters, 1);
        let z = scalar(parameters, 2);
        let device = x.device();

        let xx = x.clone().mul(x.clone());
        let yy = y.clone().mul(y.clone());
        let zz = z.clone().mul(z.clone());
        let w = (xx.clone() + yy.clone() + zz.clone()).neg().add_scalar(1.0).clamp_min(0.0).sqrt();

        let xy = x.clone().mul(y.clone());
        let xz = x.clone().mul(z.clone());
        let yz = y.clone().mul(z.clone());
        let xw = x.mul(w.clone());
        let yw = y.mul(w.clone());
        let zw = z.mul(w);

        let one = constant::<B>(1.0, &device);

        vec![
            one.clone() - (yy.clone() + zz.clone()).mul_scalar(2.0),
            (xy.clone() - zw.clone()).mul_scalar(2.0),
            (xz.clone() + yw.clone()).mul_scalar(2.0),
            (xy + zw).mul_scalar(2.0),
            one.clone() - (xx.clone() + zz).mul_scalar(2.0),
            (yz.clone() - xw.clone()).mul_scalar(2.0),
            (xz - yw).mul_scalar(2.0),
            (yz + xw).mul_scalar(2.0),
            one - (xx + yy).mul_scalar(2.0),
        ]
    }
}

impl ParametricTransform<3> for Rigid3D {
    fn type_tag(&self) -> String {
        RIGID3D_TYPE_TAG.to_string()
    }

    fn parameters(&self) -> Vec<f64> {
        vec![
            self.versor.x,
            self.versor.y,
            self.versor.z,
            self.translation.x,
            self.translation.y,
            self.translation.z,
        ]
    }

    fn set_parameters(&mut self, p: &[f64]) -> Result<()> {
        TransformError::check_count(6, p.len())?;
        let versor = Vector3::new(p[0], p[1], p[2]);
        // Versors longer than one are pulled back onto the unit sphere.
        let norm = versor.norm();
        self.versor = if norm > 1.0 { versor / norm } else { versor };
        self.translation = Vector3::new(p[3], p[4], p[5]);
        Ok(())
    }

    fn fixed_parameters(&self) -> Vec<f64> {
        vec![self.center.x, self.center.y, self.center.z]
    }

    fn set_fixed_parameters(&mut self, fixed: &[f64]) -> Result<()> {
        TransformError::check_count(3, fixed.len())?;
        self.center = Point3::new(fixed[0], fixed[1], fixed[2]);
        Ok(())
    }

    fn transform_point(&self, point: &Point3) -> Point3 {
        let r = self.rotation_matrix();
        Point3::from(r * (point - self.center) + self.center.coords + self.translation)
    }

    fn map_points<B: Backend>(&self, parameters: Tensor<B, 1>, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let matrix = Self::rotation_entries(&parameters);
        let center: Vec<Tensor<B, 2>> = self.center.iter().map(|&c| constant::<B>(c, &device)).collect();
        let translation: Vec<Tensor<B, 2>> = (3..6).map(|i| scalar(&parameters, i)).collect();
        apply_linear(points, &matrix, &center, &translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::mapping::parameter_tensor;
    use burn_ndarray::NdArray;
    use std::f64::consts::FRAC_PI_2;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_identity() {
        let t = Rigid3D::identity(Point3::new(1.0, 2.0, 3.0));
        let p = Point3::new(4.0, -5.0, 6.0);
        assert!((t.transform_point(&p) - p).norm() < 1e-12);
    }

    #[test]
    fn test_rotation_x_90() {
        // (0, 1, 0) rotates to (0, 0, 1) about the x axis.
        let t = Rigid3D::from_axis_angle(Vector3::x(), FRAC_PI_2, Vector3::zeros(), Point3::origin());
        let out = t.transform_point(&Point3::new(0.0, 1.0, 0.0));
        assert!((out - Point3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_map_points_matches_host() {
        let device = Default::default();
        let t = Rigid3D::from_axis_angle(
            Vector3::new(1.0, 2.0, -0.5),
            0.3,
            Vector3::new(1.0, -2.0, 0.5),
            Point3::new(10.0, 5.0, -3.0),
        );
        let samples = [[0.0, 0.0, 0.0], [12.0, -4.0, 7.5]];
        let points = Tensor::<TestBackend, 2>::from_floats(samples, &device);
        let mapped = t.map_points(parameter_tensor::<TestBackend>(&t.parameters(), &device), points);
        let data = mapped.into_data();
        let values = data.as_slice::<f32>().unwrap();
        for (i, point) in samples.iter().enumerate() {
            let expected = t.transform_point(&Point3::from(*point));
            for d in 0..3 {
                assert!((values[3 * i + d] as f64 - expected[d]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Rigid3D::from_axis_angle(
            Vector3::new(0.0, 1.0, 1.0),
            -0.7,
            Vector3::new(3.0, 0.0, -1.0),
            Point3::new(2.0, 2.0, 2.0),
        );
        let p = Point3::new(-1.0, 4.0, 9.0);
        let back = t.inverse().transform_point(&t.transform_point(&p));
        assert!((back - p).norm() < 1e-9);
    }

    #[test]
    fn test_set_parameters_validates() {
        let mut t = Rigid3D::default();
        assert!(t.set_parameters(&[0.0; 5]).is_err());
        t.set_parameters(&[0.9, 0.9, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert!((t.versor().norm() - 1.0).abs() < 1e-12);
        t.set_parameters(&[0.1, 0.0, 0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.translation(), &Vector3::new(1.0, 2.0, 3.0));
    }
}
