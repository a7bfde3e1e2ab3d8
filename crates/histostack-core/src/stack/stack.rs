//! A stack of 2D slices, their masks and transforms, and the volume they
//! tile into.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use tracing::debug;

use crate::filter::{normalize, tile_slices, ResampleImageFilter};
use crate::image::Image;
use crate::interpolation::{LinearInterpolator, NearestNeighborInterpolator};
use crate::spatial::{in_plane, Direction2, Point2, Spacing2, Spacing3, Vector2};
use crate::transform::{Transform2D, TransformError};

/// Foreground value of a mask.
pub const MASK_FOREGROUND: f32 = 255.0;

/// Default factor by which a mask side shrinks per registration failure.
pub const DEFAULT_MASK_SHRINK_FACTOR: f64 = 0.5;

/// Slices, masks and transforms that resample into one common frame.
///
/// A slice is `None` when its file was missing; such slices are never
/// registered and resample to zeros. Every per-slice vector has the same
/// length as `basenames`.
///
/// `update_volumes` is the only method that rebuilds the resampled slices,
/// the resampled masks and the two volumes; call it after changing
/// transforms.
#[derive(Debug, Clone)]
pub struct Stack<B: Backend> {
    basenames: Vec<String>,
    original_images: Vec<Option<Image<B, 2>>>,
    original_masks: Vec<Option<Image<B, 2>>>,
    original_spacing: Spacing2,
    spacing: Spacing3,
    origin: Point2,
    max_size: [usize; 2],
    resampler_size: [usize; 2],
    transforms: Vec<Transform2D>,
    slices: Vec<Image<B, 2>>,
    unshrunk_masks: Vec<Image<B, 2>>,
    masks: Vec<Image<B, 2>>,
    volume: Option<Image<B, 3>>,
    mask_volume: Option<Image<B, 3>>,
    times_too_big: Vec<u32>,
    mask_shrink_factor: f64,
    device: B::Device,
}

impl<B: Backend> Stack<B> {
    /// Build a stack from loaded slices.
    ///
    /// Every present slice gets `original_spacing` and an all-foreground
    /// mask. The resampler size defaults to the largest slice extent; the
    /// output origin defaults to zero.
    ///
    /// # Panics
    /// Panics if `slices` and `basenames` differ in length.
    pub fn new(
        slices: Vec<Option<Image<B, 2>>>,
        basenames: Vec<String>,
        original_spacing: Spacing2,
        spacing: Spacing3,
        device: &B::Device,
    ) -> Self {
        assert_eq!(
            slices.len(),
            basenames.len(),
            "a stack needs exactly one basename per slice"
        );

        let original_images: Vec<Option<Image<B, 2>>> = slices
            .into_iter()
            .map(|slice| slice.map(|image| image.with_spacing(original_spacing)))
            .collect();
        let original_masks = original_images
            .iter()
            .map(|slice| slice.as_ref().map(|image| image.filled_like(MASK_FOREGROUND)))
            .collect();

        let max_size = original_images.iter().flatten().fold([0, 0], |acc, image| {
            let size = image.size();
            [acc[0].max(size[0]), acc[1].max(size[1])]
        });
        let n = original_images.len();

        Self {
            basenames,
            original_images,
            original_masks,
            original_spacing,
            spacing,
            origin: Point2::origin(),
            max_size,
            resampler_size: max_size,
            transforms: vec![Transform2D::Identity; n],
            slices: Vec::new(),
            unshrunk_masks: Vec::new(),
            masks: Vec::new(),
            volume: None,
            mask_volume: None,
            times_too_big: vec![0; n],
            mask_shrink_factor: DEFAULT_MASK_SHRINK_FACTOR,
            device: device.clone(),
        }
    }

    /// Build a stack whose originals are already-resampled images and masks.
    ///
    /// The original spacing is the in-plane part of `spacing`.
    ///
    /// # Panics
    /// Panics if the three vectors differ in length.
    pub fn from_resampled(
        images: Vec<Image<B, 2>>,
        masks: Vec<Image<B, 2>>,
        basenames: Vec<String>,
        spacing: Spacing3,
        device: &B::Device,
    ) -> Self {
        assert_eq!(images.len(), masks.len(), "a stack needs exactly one mask per slice");
        let slices = images.into_iter().map(Some).collect();
        let mut stack = Self::new(slices, basenames, in_plane(&spacing), spacing, device);
        stack.original_masks = masks
            .into_iter()
            .map(|mask| Some(mask.with_spacing(stack.original_spacing)))
            .collect();
        stack
    }

    /// Resample onto a grid of `size` pixels instead of the largest slice.
    pub fn with_size(mut self, size: [usize; 2]) -> Self {
        self.resampler_size = size;
        self
    }

    /// Physical position of the first output pixel.
    pub fn with_origin(mut self, origin: Point2) -> Self {
        self.origin = origin;
        self
    }

    /// # Panics
    /// Panics unless `factor` lies in `(0, 1)`.
    pub fn with_mask_shrink_factor(mut self, factor: f64) -> Self {
        assert!(factor > 0.0 && factor < 1.0, "mask shrink factor must lie in (0, 1), got {}", factor);
        self.mask_shrink_factor = factor;
        self
    }

    /// Normalise every present slice to zero mean and unit variance.
    pub fn normalized(mut self) -> Self {
        for image in self.original_images.iter_mut().flatten() {
            *image = normalize(image);
        }
        self
    }

    fn check_slice_number(&self, slice_number: usize) {
        if slice_number >= self.len() {
            panic!(
                "slice number {} is out of range for a stack of {} slices",
                slice_number,
                self.len()
            );
        }
    }

    fn built<'a, T>(items: &'a [T], slice_number: usize) -> &'a T {
        items
            .get(slice_number)
            .unwrap_or_else(|| panic!("volumes have not been built; call update_volumes first"))
    }

    /// Number of slices, present or not.
    pub fn len(&self) -> usize {
        self.original_images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original_images.is_empty()
    }

    pub fn basenames(&self) -> &[String] {
        &self.basenames
    }

    pub fn basename(&self, slice_number: usize) -> &str {
        self.check_slice_number(slice_number);
        &self.basenames[slice_number]
    }

    /// # Panics
    /// Panics if the length differs from the number of slices.
    pub fn set_basenames(&mut self, basenames: Vec<String>) {
        assert_eq!(basenames.len(), self.len(), "a stack needs exactly one basename per slice");
        self.basenames = basenames;
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn max_size(&self) -> [usize; 2] {
        self.max_size
    }

    pub fn resampler_size(&self) -> [usize; 2] {
        self.resampler_size
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn original_spacing(&self) -> &Spacing2 {
        &self.original_spacing
    }

    pub fn origin(&self) -> &Point2 {
        &self.origin
    }

    pub fn mask_shrink_factor(&self) -> f64 {
        self.mask_shrink_factor
    }

    /// True when the slice was loaded.
    pub fn image_exists(&self, slice_number: usize) -> bool {
        self.check_slice_number(slice_number);
        self.original_images[slice_number].is_some()
    }

    pub fn original_image(&self, slice_number: usize) -> Option<&Image<B, 2>> {
        self.check_slice_number(slice_number);
        self.original_images[slice_number].as_ref()
    }

    pub fn original_mask(&self, slice_number: usize) -> Option<&Image<B, 2>> {
        self.check_slice_number(slice_number);
        self.original_masks[slice_number].as_ref()
    }

    /// Size of the original slice, `[0, 0]` when it is missing.
    pub fn original_size(&self, slice_number: usize) -> [usize; 2] {
        self.original_image(slice_number).map(|image| image.size()).unwrap_or([0, 0])
    }

    pub fn resampled_slice(&self, slice_number: usize) -> &Image<B, 2> {
        self.check_slice_number(slice_number);
        Self::built(&self.slices, slice_number)
    }

    pub fn resampled_slices(&self) -> &[Image<B, 2>] {
        &self.slices
    }

    pub fn resampled_mask(&self, slice_number: usize) -> &Image<B, 2> {
        self.check_slice_number(slice_number);
        Self::built(&self.masks, slice_number)
    }

    pub fn resampled_masks(&self) -> &[Image<B, 2>] {
        &self.masks
    }

    /// The tiled volume, once `update_volumes` has run.
    pub fn volume(&self) -> Option<&Image<B, 3>> {
        self.volume.as_ref()
    }

    /// The tiled mask volume, once `update_volumes` has run.
    pub fn mask_volume(&self) -> Option<&Image<B, 3>> {
        self.mask_volume.as_ref()
    }

    pub fn transform(&self, slice_number: usize) -> &Transform2D {
        self.check_slice_number(slice_number);
        &self.transforms[slice_number]
    }

    pub fn transforms(&self) -> &[Transform2D] {
        &self.transforms
    }

    /// Replace every transform at once.
    ///
    /// # Panics
    /// Panics if the length differs from the number of slices.
    pub fn set_transforms(&mut self, transforms: Vec<Transform2D>) {
        assert_eq!(
            transforms.len(),
            self.len(),
            "a stack needs exactly one transform per slice"
        );
        self.transforms = transforms;
    }

    /// Pre-compose a translation into one slice's transform.
    pub fn translate_transform(&mut self, slice_number: usize, v: Vector2) -> Result<(), TransformError> {
        self.check_slice_number(slice_number);
        self.transforms[slice_number] = self.transforms[slice_number].translate(v)?;
        Ok(())
    }

    pub(crate) fn transform_mut(&mut self, slice_number: usize) -> &mut Transform2D {
        self.check_slice_number(slice_number);
        &mut self.transforms[slice_number]
    }

    pub fn number_of_times_too_big(&self) -> &[u32] {
        &self.times_too_big
    }

    /// Rebuild the resampled slices, masks and both volumes from the current
    /// transforms.
    pub fn update_volumes(&mut self) {
        debug!(slices = self.len(), size = ?self.resampler_size, "updating stack volumes");
        self.build_slices();
        self.build_volume();
        self.build_mask_slices();
        self.build_mask_volume();
    }

    fn output_spacing(&self) -> Spacing2 {
        in_plane(&self.spacing)
    }

    fn blank_slice(&self) -> Image<B, 2> {
        let [width, height] = self.resampler_size;
        let data = Tensor::<B, 2>::zeros([height, width], &self.device);
        Image::new(data, self.origin, self.output_spacing(), Direction2::identity())
    }

    fn build_slices(&mut self) {
        self.slices = (0..self.len())
            .map(|i| match &self.original_images[i] {
                Some(image) => ResampleImageFilter::new(
                    self.resampler_size,
                    self.origin,
                    self.output_spacing(),
                    self.transforms[i].clone(),
                    LinearInterpolator::new(),
                )
                .apply(image),
                None => self.blank_slice(),
            })
            .collect();
    }

    fn build_volume(&mut self) {
        if self.slices.is_empty() {
            return;
        }
        self.volume = Some(tile_slices(&self.slices, self.spacing[2]));
    }

    fn build_mask_slices(&mut self) {
        self.unshrunk_masks = (0..self.len())
            .map(|i| match &self.original_masks[i] {
                Some(mask) => ResampleImageFilter::new(
                    self.resampler_size,
                    self.origin,
                    self.output_spacing(),
                    self.transforms[i].clone(),
                    NearestNeighborInterpolator::new(),
                )
                .apply(mask),
                None => self.blank_slice(),
            })
            .collect();
        self.masks = (0..self.len()).map(|i| self.generate_mask_slice(i)).collect();
    }

    fn build_mask_volume(&mut self) {
        if self.masks.is_empty() {
            return;
        }
        self.mask_volume = Some(tile_slices(&self.masks, self.spacing[2]));
    }

    /// Shrink a slice's resampled mask around its center after a failed
    /// registration.
    ///
    /// Only that slice's resampled mask is rebuilt; the 3D mask follows on
    /// the next `update_volumes`.
    pub fn shrink_mask_slice(&mut self, slice_number: usize) {
        self.check_slice_number(slice_number);
        self.times_too_big[slice_number] += 1;
        debug!(
            slice = slice_number,
            times_too_big = self.times_too_big[slice_number],
            "shrinking mask"
        );
        if slice_number < self.unshrunk_masks.len() {
            self.masks[slice_number] = self.generate_mask_slice(slice_number);
        }
    }

    /// The unshrunk resampled mask with everything outside the centered
    /// window of side `size * f^n` set to zero.
    fn generate_mask_slice(&self, slice_number: usize) -> Image<B, 2> {
        let unshrunk = &self.unshrunk_masks[slice_number];
        let factor = self.mask_shrink_factor.powi(self.times_too_big[slice_number] as i32);
        let window = centered_window(unshrunk.size(), factor);

        let [height, width] = unshrunk.shape();
        let mut keep = vec![0.0f32; height * width];
        for y in window[1].clone() {
            for x in window[0].clone() {
                keep[y * width + x] = 1.0;
            }
        }
        let keep = Tensor::<B, 2>::from_data(TensorData::new(keep, Shape::new([height, width])), &self.device);
        unshrunk.clone().with_data(unshrunk.data().clone() * keep)
    }
}

/// Index ranges `[x, y]` of the region of size `size * factor` starting at
/// `size * (1 - factor) / 2`.
fn centered_window(size: [usize; 2], factor: f64) -> [std::ops::Range<usize>; 2] {
    let range = |n: usize| {
        let len = (n as f64 * factor) as usize;
        let start = (n as f64 * (1.0 - factor) / 2.0) as usize;
        start.min(n)..(start + len).min(n)
    };
    [range(size[0]), range(size[1])]
}
