//! Spatial types for points, vectors, spacing and direction matrices.
//!
//! These are plain nalgebra types; the aliases only fix the scalar to `f64`
//! so physical-space arithmetic never mixes precisions.

use nalgebra::{SMatrix, SVector};

pub type Point<const D: usize> = nalgebra::Point<f64, D>;
pub type Vector<const D: usize> = SVector<f64, D>;
/// Physical distance between neighbouring pixels along each axis.
pub type Spacing<const D: usize> = SVector<f64, D>;
/// Orientation of the image axes, one column per axis.
pub type Direction<const D: usize> = SMatrix<f64, D, D>;

pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Vector2 = Vector<2>;
pub type Vector3 = Vector<3>;
pub type Spacing2 = Spacing<2>;
pub type Spacing3 = Spacing<3>;
pub type Direction2 = Direction<2>;
pub type Direction3 = Direction<3>;

/// Build a spacing vector from an array.
pub fn spacing<const D: usize>(values: [f64; D]) -> Spacing<D> {
    Spacing::<D>::from(values)
}

/// Build a point from an array.
pub fn point<const D: usize>(values: [f64; D]) -> Point<D> {
    Point::<D>::from(values)
}

/// The first two components of a 3D spacing.
pub fn in_plane(spacing: &Spacing3) -> Spacing2 {
    Spacing2::new(spacing[0], spacing[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_plane_drops_z() {
        let s = spacing([0.5, 0.25, 10.0]);
        let p = in_plane(&s);
        assert_eq!(p, Spacing2::new(0.5, 0.25));
    }

    #[test]
    fn test_point_from_array() {
        let p = point([1.0, 2.0, 3.0]);
        assert_eq!(p.coords, Vector3::new(1.0, 2.0, 3.0));
    }
}
