use std::path::Path;

use anyhow::Result;
use tracing::info;

use histostack_io::{
    load_number_of_times_too_big, load_stack_transforms, write_stack_volumes, Resolution, WHOLE_HEART_ROI,
};

use crate::session::Session;

/// Rebuild the stacks from saved transforms and write their volumes.
///
/// `transforms_dir` is relative to the results directory, for example
/// `HiResTransforms/CenteredAffineTransform`.
pub fn run(session: &Session, transforms_dir: &Path, hires_only: bool) -> Result<()> {
    let dirs = &session.dirs;
    let basenames = session.basenames()?;
    let out = dirs.volumes_dir();

    if !hires_only {
        let mut lo_res = session.read_stack(Resolution::LoRes, &basenames, WHOLE_HEART_ROI)?;
        load_stack_transforms(&mut lo_res, dirs.lo_res_transforms_dir())?;
        lo_res.update_volumes();
        let times_too_big = dirs.number_of_times_too_big_dir();
        if times_too_big.is_dir() {
            load_number_of_times_too_big(&mut lo_res, &times_too_big)?;
        }
        write_stack_volumes(&lo_res, &out, "LoResStack")?;
    }

    let mut hi_res = session.read_stack(Resolution::HiRes, &basenames, WHOLE_HEART_ROI)?;
    load_stack_transforms(&mut hi_res, dirs.results_dir().join(transforms_dir))?;
    hi_res.update_volumes();
    let prefix = volume_prefix(transforms_dir);
    write_stack_volumes(&hi_res, &out, &prefix)?;

    info!("wrote {} volumes to {}", prefix, out.display());
    Ok(())
}

/// `HiRes_<last component>` of the transforms directory.
fn volume_prefix(transforms_dir: &Path) -> String {
    match transforms_dir.file_name() {
        Some(name) => format!("HiRes_{}", name.to_string_lossy()),
        None => "HiResStack".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_prefix() {
        assert_eq!(
            volume_prefix(Path::new("HiResTransforms/CenteredAffineTransform")),
            "HiRes_CenteredAffineTransform"
        );
        assert_eq!(volume_prefix(Path::new("")), "HiResStack");
    }
}
