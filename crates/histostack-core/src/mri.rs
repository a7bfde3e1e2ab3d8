//! The MRI reference volume and its per-z slices.

use burn::tensor::backend::Backend;
use tracing::debug;

use crate::filter::{extract_slice, rescale_intensity, ResampleImageFilter};
use crate::image::Image;
use crate::interpolation::NearestNeighborInterpolator;
use crate::spatial::{Point3, Spacing3};
use crate::stack::MASK_FOREGROUND;
use crate::transform::{ParametricTransform, Rigid3D, TransformError};

/// Value of resampled voxels that fall outside the MRI volume.
pub const MRI_DEFAULT_PIXEL: f32 = 127.0;

/// A 3D reference volume resampled through a rigid transform onto a target
/// grid and cut into z-slices.
#[derive(Debug, Clone)]
pub struct Mri<B: Backend> {
    volume: Image<B, 3>,
    mask: Image<B, 3>,
    transform: Rigid3D,
    spacing: Spacing3,
    size: [usize; 3],
    resampled_volume: Image<B, 3>,
    resampled_mask: Image<B, 3>,
    slices: Vec<Image<B, 2>>,
    mask_slices: Vec<Image<B, 2>>,
}

impl<B: Backend> Mri<B> {
    /// Rescale a raw volume to `0..=255`, multiply its spacing by
    /// `resize_factor` and resample it onto `spacing`/`size`.
    pub fn from_raw(raw: &Image<B, 3>, resize_factor: f64, spacing: Spacing3, size: [usize; 3]) -> Self {
        let rescaled = rescale_intensity(raw, 0.0, 255.0);
        let resized_spacing = rescaled.spacing() * resize_factor;
        Self::new(rescaled.with_spacing(resized_spacing), spacing, size)
    }

    /// Resample `volume` and an all-foreground mask onto the target grid with
    /// an identity transform.
    pub fn new(volume: Image<B, 3>, spacing: Spacing3, size: [usize; 3]) -> Self {
        let mask = volume.filled_like(MASK_FOREGROUND);
        let mut mri = Self {
            resampled_volume: volume.clone(),
            resampled_mask: mask.clone(),
            volume,
            mask,
            transform: Rigid3D::default(),
            spacing,
            size,
            slices: Vec::new(),
            mask_slices: Vec::new(),
        };
        mri.rebuild();
        mri
    }

    /// Replace the rigid transform and rebuild every resampled slice and mask.
    pub fn set_transform_parameters(&mut self, transform: &Rigid3D) -> Result<(), TransformError> {
        self.transform.set_parameters(&transform.parameters())?;
        self.transform.set_fixed_parameters(&transform.fixed_parameters())?;
        self.rebuild();
        Ok(())
    }

    fn rebuild(&mut self) {
        debug!(size = ?self.size, "resampling MRI volume");
        self.resampled_volume = ResampleImageFilter::new(
            self.size,
            Point3::origin(),
            self.spacing,
            self.transform.clone(),
            NearestNeighborInterpolator::new(),
        )
        .with_default_pixel_value(MRI_DEFAULT_PIXEL)
        .apply(&self.volume);
        self.resampled_mask = ResampleImageFilter::new(
            self.size,
            Point3::origin(),
            self.spacing,
            self.transform.clone(),
            NearestNeighborInterpolator::new(),
        )
        .apply(&self.mask);

        self.slices = (0..self.size[2]).map(|z| extract_slice(&self.resampled_volume, z)).collect();
        self.mask_slices = (0..self.size[2]).map(|z| extract_slice(&self.resampled_mask, z)).collect();
    }

    fn check_slice_number(&self, slice_number: usize) {
        if slice_number >= self.len() {
            panic!(
                "slice number {} is out of range for an MRI of {} slices",
                slice_number,
                self.len()
            );
        }
    }

    /// Number of resampled z-slices.
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slice(&self, slice_number: usize) -> &Image<B, 2> {
        self.check_slice_number(slice_number);
        &self.slices[slice_number]
    }

    pub fn mask_slice(&self, slice_number: usize) -> &Image<B, 2> {
        self.check_slice_number(slice_number);
        &self.mask_slices[slice_number]
    }

    /// The rescaled volume before resampling.
    pub fn volume(&self) -> &Image<B, 3> {
        &self.volume
    }

    pub fn mask_volume(&self) -> &Image<B, 3> {
        &self.mask
    }

    pub fn resampled_volume(&self) -> &Image<B, 3> {
        &self.resampled_volume
    }

    pub fn resampled_mask_volume(&self) -> &Image<B, 3> {
        &self.resampled_mask
    }

    pub fn transform(&self) -> &Rigid3D {
        &self.transform
    }
}
