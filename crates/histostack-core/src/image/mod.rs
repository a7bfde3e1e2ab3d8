//! Image types and pixel-grid helpers.

pub mod image;
pub mod grid;

pub use image::Image;
pub use grid::{generate_grid, grid_indices};
