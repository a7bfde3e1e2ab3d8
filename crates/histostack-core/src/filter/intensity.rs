//! Intensity normalisation and rescaling.

use burn::tensor::backend::Backend;

use crate::image::Image;

/// Shift and scale an image to zero mean and unit variance.
///
/// Uses the sample variance. A constant image is only shifted.
pub fn normalize<B: Backend, const D: usize>(image: &Image<B, D>) -> Image<B, D> {
    let pixels = image.to_pixels();
    let n = pixels.len();
    if n == 0 {
        return image.clone();
    }

    let mean = pixels.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let variance = if n > 1 {
        pixels.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let sigma = variance.sqrt();

    let mut data = image.data().clone().sub_scalar(mean as f32);
    if sigma > 1e-12 {
        data = data.div_scalar(sigma as f32);
    }
    image.clone().with_data(data)
}

/// Linearly map the intensity range of `image` onto `[out_min, out_max]`.
pub fn rescale_intensity<B: Backend, const D: usize>(image: &Image<B, D>, out_min: f32, out_max: f32) -> Image<B, D> {
    let pixels = image.to_pixels();
    let (lo, hi) = pixels
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if pixels.is_empty() || hi - lo <= f32::EPSILON {
        return image.filled_like(out_min);
    }

    let scale = (out_max - out_min) / (hi - lo);
    let data = image.data().clone().sub_scalar(lo).mul_scalar(scale).add_scalar(out_min);
    image.clone().with_data(data)
}
