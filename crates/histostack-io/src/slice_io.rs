//! 2D slice images through the `image` crate.

use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::backend::Backend;
use image::{DynamicImage, GrayImage};
use tracing::debug;

use histostack_core::image::Image;
use histostack_core::spatial::Spacing2;

/// Read a grayscale slice.
///
/// Returns `None` when `path` does not exist, so a stack can carry a gap for
/// a missing section. A file that exists but cannot be decoded is an error.
/// Spacing is one; stacks overwrite it with their original spacing.
pub fn read_slice<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Option<Image<B, 2>>> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("slice {} is missing", path.display());
        return Ok(None);
    }

    let decoded = image::open(path).with_context(|| format!("Failed to read slice {}", path.display()))?;
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    let pixels: Vec<f32> = match decoded {
        DynamicImage::ImageLuma16(gray) => gray.into_raw().into_iter().map(f32::from).collect(),
        other => other.into_luma8().into_raw().into_iter().map(f32::from).collect(),
    };

    Ok(Some(Image::from_pixels(
        pixels,
        [height, width],
        Spacing2::new(1.0, 1.0),
        device,
    )))
}

/// Read every path in order; missing files become `None`.
pub fn read_slices<B: Backend, P: AsRef<Path>>(paths: &[P], device: &B::Device) -> Result<Vec<Option<Image<B, 2>>>> {
    paths.iter().map(|path| read_slice(path, device)).collect()
}

/// Write a slice as 8-bit grayscale, clamping to `0..=255`.
///
/// The format follows the file extension.
pub fn write_slice<B: Backend, P: AsRef<Path>>(path: P, slice: &Image<B, 2>) -> Result<()> {
    let path = path.as_ref();
    let [height, width] = slice.shape();
    let bytes: Vec<u8> = slice
        .to_pixels()
        .into_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();

    let buffer = GrayImage::from_raw(width as u32, height as u32, bytes)
        .with_context(|| format!("Slice buffer does not match {}x{}", width, height))?;
    buffer
        .save(path)
        .with_context(|| format!("Failed to write slice {}", path.display()))?;
    Ok(())
}
