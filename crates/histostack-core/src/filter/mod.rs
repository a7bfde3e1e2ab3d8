//! Image filters: smoothing, decimation, pyramids, resampling, intensity
//! mapping and slice tiling.

pub mod gaussian;
pub mod downsample;
pub mod pyramid;
pub mod resample;
pub mod intensity;
pub mod tile;

pub use gaussian::GaussianFilter;
pub use resample::ResampleImageFilter;
pub use pyramid::MultiResolutionPyramid;
pub use downsample::DownsampleFilter;
pub use intensity::{normalize, rescale_intensity};
pub use tile::{extract_slice, tile_slices};
