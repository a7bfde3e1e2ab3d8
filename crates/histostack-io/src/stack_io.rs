//! Building stacks from disk and persisting their per-slice state.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use burn::tensor::backend::Backend;
use tracing::info;

use histostack_core::stack::Stack;

use crate::config::PipelineConfig;
use crate::dirs::{ensure_dir, Dirs};
use crate::lists::{construct_paths, load_vector_from_files, save_vector_to_files};
use crate::slice_io::read_slices;
use crate::transform_io::{read_transform, write_transform};
use crate::volume_io::write_volume;

/// Extension of the slice images.
pub const SLICE_EXTENSION: &str = ".bmp";

/// Which image set a stack is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Block-face photographs.
    LoRes,
    /// Histology slices.
    HiRes,
}

/// Load the slices named by `basenames` and build a stack on the LoRes grid
/// of `roi`.
///
/// Missing slice files become gaps. Slices are normalised when the
/// registration parameters ask for it.
pub fn read_stack<B: Backend>(
    config: &PipelineConfig,
    dirs: &Dirs,
    resolution: Resolution,
    basenames: &[String],
    roi: &str,
    device: &B::Device,
) -> Result<Stack<B>> {
    let (dir, original_spacing) = match resolution {
        Resolution::LoRes => (dirs.lo_res_dir(), config.lo_res_original_spacing()),
        Resolution::HiRes => (dirs.hi_res_dir(), config.hi_res_original_spacing()),
    };
    let paths = construct_paths(&dir, basenames, SLICE_EXTENSION);
    let slices = read_slices::<B, _>(&paths, device)?;
    let present = slices.iter().filter(|s| s.is_some()).count();
    info!("{:?}: loaded {} of {} slices from {}", resolution, present, slices.len(), dir.display());

    let mut stack = Stack::new(
        slices,
        basenames.to_vec(),
        original_spacing,
        config.lo_res_spacing(),
        device,
    )
    .with_size(config.roi_size(roi)?)
    .with_mask_shrink_factor(config.registration.mask_shrink_factor);
    if config.registration.normalize_images {
        stack = stack.normalized();
    }
    Ok(stack)
}

/// Write each slice's transform to `dir/<basename>`.
pub fn save_stack_transforms<B: Backend, P: AsRef<Path>>(stack: &Stack<B>, dir: P) -> Result<()> {
    let dir = ensure_dir(dir)?;
    for (basename, transform) in stack.basenames().iter().zip(stack.transforms()) {
        write_transform(dir.join(basename), transform)?;
    }
    info!("saved {} transforms to {}", stack.len(), dir.display());
    Ok(())
}

/// Replace every transform with the one stored in `dir/<basename>`.
///
/// Every basename needs a file.
pub fn load_stack_transforms<B: Backend, P: AsRef<Path>>(stack: &mut Stack<B>, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    let transforms = stack
        .basenames()
        .iter()
        .map(|basename| read_transform(dir.join(basename)))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to load stack transforms from {}", dir.display()))?;
    stack.set_transforms(transforms);
    Ok(())
}

/// Write the per-slice mask shrink counts, one file per basename.
pub fn save_number_of_times_too_big<B: Backend, P: AsRef<Path>>(stack: &Stack<B>, dir: P) -> Result<()> {
    save_vector_to_files(stack.number_of_times_too_big(), dir, stack.basenames())
}

/// Replay stored mask shrink counts onto a stack.
pub fn load_number_of_times_too_big<B: Backend, P: AsRef<Path>>(stack: &mut Stack<B>, dir: P) -> Result<()> {
    let counts: Vec<u32> = load_vector_from_files(dir, stack.basenames())?;
    for (slice, count) in counts.into_iter().enumerate() {
        for _ in 0..count {
            stack.shrink_mask_slice(slice);
        }
    }
    Ok(())
}

/// Write `<prefix>.nii.gz` and `<prefix>_mask.nii.gz` into `dir`.
pub fn write_stack_volumes<B: Backend, P: AsRef<Path>>(stack: &Stack<B>, dir: P, prefix: &str) -> Result<()> {
    let dir = ensure_dir(dir)?;
    let volume = stack
        .volume()
        .ok_or_else(|| anyhow!("stack volumes must be built before writing {}", prefix))?;
    let mask = stack
        .mask_volume()
        .ok_or_else(|| anyhow!("stack volumes must be built before writing {}", prefix))?;
    write_volume(dir.join(format!("{}.nii.gz", prefix)), volume)?;
    write_volume(dir.join(format!("{}_mask.nii.gz", prefix)), mask)
}
