//! Pipeline configuration loaded from the YAML files of the config directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use histostack_core::spatial::{Spacing2, Spacing3, Vector2};
use histostack_registration::RegistrationParameters;

pub const IMAGE_SPACINGS_FILE: &str = "image_spacings.yml";
pub const DOWNSAMPLE_RATIOS_FILE: &str = "downsample_ratios.yml";
pub const REGISTRATION_PARAMETERS_FILE: &str = "registration_parameters.yml";
pub const HI_RES_PAIR_PARAMETERS_FILE: &str = "HiRes_pair_parameters.yml";
pub const ROI_DIR: &str = "ROIs";

/// ROI covering the whole block; stack sizes and the LoRes translation
/// default to it.
pub const WHOLE_HEART_ROI: &str = "whole_heart";

/// Physical pixel sizes before downsampling.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ImageSpacings {
    pub lo_res: [f64; 3],
    pub hi_res: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DownsampleRatios {
    pub lo_res: f64,
    pub hi_res: f64,
}

/// A region of interest in LoRes pixels at full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Roi {
    pub size: [f64; 2],
    pub translation: [f64; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Adjustment {
    translation: [f64; 2],
}

/// Everything the pipeline reads from `<root>/config/`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub image_spacings: ImageSpacings,
    pub downsample_ratios: DownsampleRatios,
    pub registration: RegistrationParameters,
    /// Parameters for the pair registrations; the main parameters when the
    /// file is absent.
    pub hi_res_pairs: Option<RegistrationParameters>,
    pub rois: BTreeMap<String, Roi>,
}

impl PipelineConfig {
    /// Resampling spacing of every stack: LoRes spacing with x and y
    /// multiplied by the LoRes downsample ratio.
    pub fn lo_res_spacing(&self) -> Spacing3 {
        let [x, y, z] = self.image_spacings.lo_res;
        let ratio = self.downsample_ratios.lo_res;
        Spacing3::new(x * ratio, y * ratio, z)
    }

    /// In-plane spacing of the LoRes originals.
    pub fn lo_res_original_spacing(&self) -> Spacing2 {
        let spacing = self.lo_res_spacing();
        Spacing2::new(spacing[0], spacing[1])
    }

    /// In-plane spacing of the HiRes originals.
    pub fn hi_res_original_spacing(&self) -> Spacing2 {
        let [x, y, _] = self.image_spacings.hi_res;
        let ratio = self.downsample_ratios.hi_res;
        Spacing2::new(x * ratio, y * ratio)
    }

    pub fn roi(&self, name: &str) -> Result<&Roi> {
        self.rois
            .get(name)
            .ok_or_else(|| anyhow!("ROI '{}' is not configured in {}/", name, ROI_DIR))
    }

    /// Resampler size for `name`: the ROI size divided by the LoRes ratio.
    pub fn roi_size(&self, name: &str) -> Result<[usize; 2]> {
        let roi = self.roi(name)?;
        let ratio = self.downsample_ratios.lo_res;
        Ok([(roi.size[0] / ratio) as usize, (roi.size[1] / ratio) as usize])
    }

    pub fn roi_translation(&self, name: &str) -> Result<Vector2> {
        let roi = self.roi(name)?;
        Ok(Vector2::new(roi.translation[0], roi.translation[1]))
    }

    pub fn hi_res_pair_parameters(&self) -> &RegistrationParameters {
        self.hi_res_pairs.as_ref().unwrap_or(&self.registration)
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// `.yml` files of `dir` keyed by file stem. A missing directory is empty.
fn read_yaml_dir<T: DeserializeOwned>(dir: &Path) -> Result<BTreeMap<String, T>> {
    let mut values = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(values);
    }
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yml") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        values.insert(stem.to_string(), read_yaml(&path)?);
    }
    Ok(values)
}

fn read_parameters(path: &Path) -> Result<RegistrationParameters> {
    let parameters: RegistrationParameters = read_yaml(path)?;
    parameters
        .validate()
        .with_context(|| format!("Invalid registration parameters in {}", path.display()))?;
    Ok(parameters)
}

/// Load and validate the configuration directory.
pub fn load_config<P: AsRef<Path>>(dir: P) -> Result<PipelineConfig> {
    let dir = dir.as_ref();
    let hi_res_pairs_path = dir.join(HI_RES_PAIR_PARAMETERS_FILE);
    let config = PipelineConfig {
        image_spacings: read_yaml(&dir.join(IMAGE_SPACINGS_FILE))?,
        downsample_ratios: read_yaml(&dir.join(DOWNSAMPLE_RATIOS_FILE))?,
        registration: read_parameters(&dir.join(REGISTRATION_PARAMETERS_FILE))?,
        hi_res_pairs: if hi_res_pairs_path.exists() {
            Some(read_parameters(&hi_res_pairs_path)?)
        } else {
            None
        },
        rois: read_yaml_dir(&dir.join(ROI_DIR))?,
    };

    let ratios = config.downsample_ratios;
    anyhow::ensure!(
        ratios.lo_res > 0.0 && ratios.hi_res > 0.0,
        "downsample ratios must be positive, got {:?}",
        ratios
    );
    info!("loaded configuration from {} ({} ROIs)", dir.display(), config.rois.len());
    Ok(config)
}

/// Per-slice LoRes translations from `<basename>.yml` files holding
/// `{Translation: [x, y]}`. A missing directory means no adjustments.
pub fn load_adjustments<P: AsRef<Path>>(dir: P) -> Result<HashMap<String, Vector2>> {
    let adjustments: BTreeMap<String, Adjustment> = read_yaml_dir(dir.as_ref())?;
    debug!("loaded {} LoRes adjustments", adjustments.len());
    Ok(adjustments
        .into_iter()
        .map(|(basename, a)| (basename, Vector2::new(a.translation[0], a.translation[1])))
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) const PARAMETERS: &str = "\
metric:
  meanSquares: {}
optimizer:
  maxIterations: 50
  regularStepGradientDescent: {relaxationFactor: 0.5, maxStepLength: 1.0, minStepLength: 0.001, gradientMagnitudeTolerance: 0.0001}
";

    /// A complete config directory.
    pub(crate) fn write_config(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir.join(ROI_DIR))?;
        fs::write(dir.join(IMAGE_SPACINGS_FILE), "LoRes: [0.05, 0.05, 0.1]\nHiRes: [0.01, 0.01, 0.1]\n")?;
        fs::write(dir.join(DOWNSAMPLE_RATIOS_FILE), "LoRes: 4\nHiRes: 8\n")?;
        fs::write(dir.join(REGISTRATION_PARAMETERS_FILE), PARAMETERS)?;
        fs::write(dir.join(ROI_DIR).join("whole_heart.yml"), "Size: [64, 48]\nTranslation: [-1.5, 2.0]\n")?;
        Ok(())
    }

    #[test]
    fn test_load_config() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path())?;
        let config = load_config(dir.path())?;

        assert!((config.lo_res_spacing() - Spacing3::new(0.2, 0.2, 0.1)).norm() < 1e-12);
        assert!((config.hi_res_original_spacing() - Spacing2::new(0.08, 0.08)).norm() < 1e-12);
        assert_eq!(config.roi_size(WHOLE_HEART_ROI)?, [16, 12]);
        assert_eq!(config.roi_translation(WHOLE_HEART_ROI)?, Vector2::new(-1.5, 2.0));
        assert!(config.roi("papillary").is_err());
        assert_eq!(config.hi_res_pair_parameters(), &config.registration);
        Ok(())
    }

    #[test]
    fn test_two_metrics_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path())?;
        fs::write(
            dir.path().join(REGISTRATION_PARAMETERS_FILE),
            PARAMETERS.replace("meanSquares: {}", "meanSquares: {}\n  normalizedCorrelation: {}"),
        )?;
        assert!(load_config(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_pair_parameters_override() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path())?;
        fs::write(
            dir.path().join(HI_RES_PAIR_PARAMETERS_FILE),
            PARAMETERS.replace("maxIterations: 50", "maxIterations: 7"),
        )?;
        let config = load_config(dir.path())?;
        assert_eq!(config.hi_res_pair_parameters().optimizer.max_iterations, 7);
        Ok(())
    }

    #[test]
    fn test_load_adjustments() -> Result<()> {
        let dir = tempdir()?;
        assert!(load_adjustments(dir.path().join("absent"))?.is_empty());

        fs::write(dir.path().join("0003.yml"), "Translation: [1.5, -2]\n")?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;
        let adjustments = load_adjustments(dir.path())?;
        assert_eq!(adjustments.len(), 1);
        assert_eq!(adjustments["0003"], Vector2::new(1.5, -2.0));
        Ok(())
    }
}
