//! Core types for reconstructing 3D volumes from 2D histology slices.
//!
//! Images carry physical metadata on top of burn tensors, transforms form a
//! closed family with an explicit algebra, and `Stack`/`Mri` turn collections
//! of slices into resampled, tileable volumes.

pub mod image;
pub mod spatial;
pub mod transform;
pub mod interpolation;
pub mod filter;
pub mod stack;
pub mod mri;

pub use image::Image;
pub use spatial::{Point, Vector, Spacing, Direction};
pub use stack::Stack;
pub use mri::Mri;
