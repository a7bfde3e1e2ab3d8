//! The on-disk layout of a data set and its results.
//!
//! ```text
//! <root>/images/<dataSet>/{LoRes,HiRes,MRI}/
//! <root>/images/<dataSet>/image_list.txt
//! <root>/config/
//! <root>/results/<dataSet>/<outputDir>/
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use histostack_core::transform::TransformKind;

/// Paths for one data set and output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    root: PathBuf,
    data_set: String,
    output_dir: String,
}

impl Dirs {
    pub fn new(root: impl Into<PathBuf>, data_set: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            data_set: data_set.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_set(&self) -> &str {
        &self.data_set
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images").join(&self.data_set)
    }

    /// Block-face photographs.
    pub fn lo_res_dir(&self) -> PathBuf {
        self.images_dir().join("LoRes")
    }

    /// Histology slices.
    pub fn hi_res_dir(&self) -> PathBuf {
        self.images_dir().join("HiRes")
    }

    pub fn image_list(&self) -> PathBuf {
        self.images_dir().join("image_list.txt")
    }

    pub fn mri_dir(&self) -> PathBuf {
        self.images_dir().join("MRI")
    }

    /// Default MRI volume file.
    pub fn mri_file(&self) -> PathBuf {
        self.mri_dir().join("mri.nii.gz")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    pub fn lo_res_adjustments_dir(&self) -> PathBuf {
        self.config_dir().join("LoRes_adjustments")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results").join(&self.data_set).join(&self.output_dir)
    }

    pub fn lo_res_transforms_dir(&self) -> PathBuf {
        self.results_dir().join("LoResTransforms")
    }

    pub fn hi_res_transforms_dir(&self) -> PathBuf {
        self.results_dir().join("HiResTransforms")
    }

    /// `HiResTransforms/<Kind>/`, one directory per registration stage.
    pub fn hi_res_stage_dir(&self, kind: TransformKind) -> PathBuf {
        self.hi_res_transforms_dir().join(kind.name())
    }

    pub fn hi_res_pairs_dir(&self) -> PathBuf {
        self.results_dir().join("HiResPairs")
    }

    pub fn final_transforms_dir(&self, name: &str) -> PathBuf {
        self.hi_res_pairs_dir().join("FinalTransforms").join(name)
    }

    pub fn diffusion_transforms_dir(&self, name: &str) -> PathBuf {
        self.hi_res_pairs_dir().join("DiffusionTransforms").join(name)
    }

    pub fn adjusted_transforms_dir(&self, name: &str) -> PathBuf {
        self.hi_res_pairs_dir().join("AdjustedTransforms").join(name)
    }

    pub fn intermediate_transforms_dir(&self, name: &str) -> PathBuf {
        self.hi_res_pairs_dir().join("IntermediateTransforms").join(name)
    }

    /// Per-iteration metric values of the pair registrations with `name`.
    pub fn pair_metric_values_dir(&self, name: &str) -> PathBuf {
        self.hi_res_pairs_dir().join("MetricValues").join(name)
    }

    pub fn metric_values_dir(&self) -> PathBuf {
        self.results_dir().join("MetricValues")
    }

    /// Volumes written by the stack tools.
    pub fn volumes_dir(&self) -> PathBuf {
        self.results_dir().join("Volumes")
    }

    pub fn number_of_times_too_big_dir(&self) -> PathBuf {
        self.results_dir().join("number_of_times_too_big")
    }

    pub fn mri_results_dir(&self) -> PathBuf {
        self.results_dir().join("MRI")
    }
}

/// Create `dir` and its parents.
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir.to_path_buf())
}

/// Remove `dir` with its contents, then recreate it empty.
pub fn clear_dir<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("Failed to clear {}", dir.display()))?;
    }
    ensure_dir(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dirs = Dirs::new("/work", "Rat24", "run1");
        assert_eq!(dirs.lo_res_dir(), PathBuf::from("/work/images/Rat24/LoRes"));
        assert_eq!(dirs.image_list(), PathBuf::from("/work/images/Rat24/image_list.txt"));
        assert_eq!(dirs.config_dir(), PathBuf::from("/work/config"));
        assert_eq!(
            dirs.hi_res_stage_dir(TransformKind::CenteredAffine),
            PathBuf::from("/work/results/Rat24/run1/HiResTransforms/CenteredAffineTransform")
        );
        assert_eq!(
            dirs.diffusion_transforms_dir("CenteredAffineTransform"),
            PathBuf::from("/work/results/Rat24/run1/HiResPairs/DiffusionTransforms/CenteredAffineTransform")
        );
    }

    #[test]
    fn test_clear_dir_empties() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("a/b");
        ensure_dir(&dir)?;
        fs::write(dir.join("stale"), "x")?;
        clear_dir(&dir)?;
        assert!(dir.exists());
        assert_eq!(fs::read_dir(&dir)?.count(), 0);
        Ok(())
    }
}
