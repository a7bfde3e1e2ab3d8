//! Rigid 3D registration of the MRI onto the LoRes stack volume.

use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::info;

use histostack_io::{
    ensure_dir, load_stack_transforms, read_mri, write_rigid3d, write_slice, write_volume, Resolution,
    WHOLE_HEART_ROI,
};
use histostack_registration::observer::{file_observer, stdout_observer};
use histostack_registration::{standard_level_schedule, VolumeInputs, VolumeRegistration};

use crate::session::{PipelineBackend, Session};

pub const ITERATIONS_FILE: &str = "output3D.txt";
pub const TRANSFORM_FILE: &str = "finalParameters3D.transform";

pub fn run(session: &Session, mri_path: Option<&Path>) -> Result<()> {
    let dirs = &session.dirs;
    let parameters = &session.config.registration;
    let basenames = session.basenames()?;

    let mut lo_res = session.read_stack(Resolution::LoRes, &basenames, WHOLE_HEART_ROI)?;
    load_stack_transforms(&mut lo_res, dirs.lo_res_transforms_dir())?;
    lo_res.update_volumes();
    let (Some(volume), Some(mask)) = (lo_res.volume(), lo_res.mask_volume()) else {
        return Err(anyhow!("the LoRes stack has no volume"));
    };

    // the MRI is resampled onto the LoRes stack grid
    let [width, height] = lo_res.resampler_size();
    let mri_file = mri_path.map(Path::to_path_buf).unwrap_or_else(|| dirs.mri_file());
    let mut mri = read_mri::<PipelineBackend, _>(
        &mri_file,
        parameters.mri_resize_factor,
        *lo_res.spacing(),
        [width, height, lo_res.len()],
        &session.device,
    )?;
    info!("MRI {} resampled to {:?}", mri_file.display(), mri.resampled_volume().size());

    let out = ensure_dir(dirs.mri_results_dir())?;
    let registration = VolumeRegistration::from_parameters(parameters);
    let mut engine = registration.engine(parameters)?;
    if session.show_iterations() {
        engine.add_observer(stdout_observer());
    }
    engine.add_observer(file_observer(&out.join(ITERATIONS_FILE))?);

    let mut transform = VolumeRegistration::initial_transform(volume, mri.volume());
    let inputs = VolumeInputs {
        fixed: volume,
        fixed_mask: mask,
        moving: mri.volume(),
        moving_mask: mri.mask_volume(),
    };
    let mut schedule = standard_level_schedule;
    let outcome = registration.register(&mut engine, &inputs, &mut transform, &mut schedule)?;
    info!(
        "MRI registered over {} levels: value {} ({:?})",
        registration.levels(),
        outcome.value,
        outcome.stop_condition
    );

    mri.set_transform_parameters(&transform)?;
    write_rigid3d(out.join(TRANSFORM_FILE), &transform)?;
    write_volume(out.join("mri.nii.gz"), mri.resampled_volume())?;
    write_volume(out.join("mri_mask.nii.gz"), mri.resampled_mask_volume())?;

    let slices_dir = ensure_dir(out.join("slices"))?;
    for (slice, basename) in basenames.iter().enumerate() {
        write_slice(slices_dir.join(format!("{}.bmp", basename)), mri.slice(slice))?;
    }
    info!("wrote {} MRI slices to {}", basenames.len(), slices_dir.display());
    Ok(())
}
