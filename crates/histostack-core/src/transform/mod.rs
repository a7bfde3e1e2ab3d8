//! Slice and volume transforms.
//!
//! `Transform2D` is the closed family used for slices, with its algebra in
//! `algebra`; `Rigid3D` positions the MRI volume. Both implement
//! `ParametricTransform`, which is what registration optimises.

pub mod error;
pub mod kind;
pub mod trait_;
pub mod mapping;
pub mod linear;
pub mod algebra;
pub mod bspline;
pub mod rigid3d;

pub use error::TransformError;
pub use kind::TransformKind;
pub use trait_::ParametricTransform;
pub use mapping::parameter_tensor;
pub use linear::{LinearParts, Transform2D};
pub use bspline::{BSplineDeformable, ControlGrid};
pub use rigid3d::{Rigid3D, RIGID3D_TYPE_TAG};
