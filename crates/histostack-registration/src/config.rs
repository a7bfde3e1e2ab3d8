//! Registration parameters as read from `registration_parameters.yml`.
//!
//! The metric and optimizer sections are mappings that must name exactly one
//! kind each. Serde checks that each kind carries its sub-parameters;
//! [`RegistrationParameters::validate`] checks the rest.

use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::metric::{MetricKind, MIN_HISTOGRAM_BINS};
use crate::optimizer::OptimizerKind;

/// Marker for metrics that take no parameters (`meanSquares: {}`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParameters {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MattesParameters {
    pub number_of_spatial_samples: usize,
    pub number_of_histogram_bins: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetricParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_squares: Option<NoParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_correlation: Option<NoParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mattes_mutual_information: Option<MattesParameters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegularStepParameters {
    pub relaxation_factor: f64,
    pub max_step_length: f64,
    pub min_step_length: f64,
    pub gradient_magnitude_tolerance: f64,
}

/// Per-group optimizer scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleParameters {
    pub translation: f64,
    pub rotation: f64,
    pub size: f64,
}

impl Default for ScaleParameters {
    fn default() -> Self {
        Self {
            translation: 0.001,
            rotation: 1.0,
            size: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptimizerParameters {
    pub max_iterations: usize,
    #[serde(default)]
    pub maximize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_step_gradient_descent: Option<RegularStepParameters>,
    /// Learning rate of plain gradient descent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_descent: Option<f64>,
    #[serde(default)]
    pub scale: ScaleParameters,
}

/// The full registration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationParameters {
    pub metric: MetricParameters,
    pub optimizer: OptimizerParameters,
    #[serde(default = "default_mask_shrink_factor")]
    pub mask_shrink_factor: f64,
    #[serde(default)]
    pub normalize_images: bool,
    #[serde(default = "default_levels")]
    pub levels: usize,
    #[serde(rename = "optimizerTranslationScale3D", default = "default_translation_scale_3d")]
    pub optimizer_translation_scale_3d: f64,
    #[serde(default = "default_bspline_grid_size")]
    pub bspline_grid_size: usize,
    #[serde(default = "default_mri_resize_factor")]
    pub mri_resize_factor: f64,
}

fn default_mask_shrink_factor() -> f64 {
    histostack_core::stack::DEFAULT_MASK_SHRINK_FACTOR
}

fn default_levels() -> usize {
    3
}

fn default_translation_scale_3d() -> f64 {
    0.001
}

fn default_bspline_grid_size() -> usize {
    8
}

fn default_mri_resize_factor() -> f64 {
    1.0
}

impl RegistrationParameters {
    /// The configured metric. Fails unless exactly one kind is named.
    pub fn metric_kind(&self) -> Result<MetricKind> {
        let m = &self.metric;
        let mut kinds = Vec::new();
        if m.mean_squares.is_some() {
            kinds.push(MetricKind::MeanSquares);
        }
        if m.normalized_correlation.is_some() {
            kinds.push(MetricKind::NormalizedCorrelation);
        }
        if let Some(mattes) = m.mattes_mutual_information {
            kinds.push(MetricKind::MattesMutualInformation {
                spatial_samples: mattes.number_of_spatial_samples,
                histogram_bins: mattes.number_of_histogram_bins,
            });
        }
        exactly_one(kinds, "metric")
    }

    /// The configured optimizer. Fails unless exactly one kind is named.
    pub fn optimizer_kind(&self) -> Result<OptimizerKind> {
        let o = &self.optimizer;
        let mut kinds = Vec::new();
        if let Some(rs) = o.regular_step_gradient_descent {
            kinds.push(OptimizerKind::RegularStepGradientDescent {
                relaxation_factor: rs.relaxation_factor,
                max_step_length: rs.max_step_length,
                min_step_length: rs.min_step_length,
                gradient_magnitude_tolerance: rs.gradient_magnitude_tolerance,
            });
        }
        if let Some(learning_rate) = o.gradient_descent {
            kinds.push(OptimizerKind::GradientDescent { learning_rate });
        }
        exactly_one(kinds, "optimizer")
    }

    /// Check every rule serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if let MetricKind::MattesMutualInformation { spatial_samples, histogram_bins } = self.metric_kind()? {
            if spatial_samples == 0 {
                return Err(RegistrationError::invalid_configuration(
                    "numberOfSpatialSamples must be positive",
                ));
            }
            if histogram_bins < MIN_HISTOGRAM_BINS {
                return Err(RegistrationError::invalid_configuration(format!(
                    "numberOfHistogramBins must be at least {}, got {}",
                    MIN_HISTOGRAM_BINS, histogram_bins
                )));
            }
        }

        match self.optimizer_kind()? {
            OptimizerKind::RegularStepGradientDescent {
                relaxation_factor,
                max_step_length,
                min_step_length,
                gradient_magnitude_tolerance,
            } => {
                if !(relaxation_factor > 0.0 && relaxation_factor < 1.0) {
                    return Err(RegistrationError::invalid_configuration(format!(
                        "relaxationFactor must lie in (0, 1), got {}",
                        relaxation_factor
                    )));
                }
                if !(min_step_length > 0.0 && min_step_length <= max_step_length) {
                    return Err(RegistrationError::invalid_configuration(format!(
                        "step lengths must satisfy 0 < min <= max, got min {} max {}",
                        min_step_length, max_step_length
                    )));
                }
                if gradient_magnitude_tolerance < 0.0 {
                    return Err(RegistrationError::invalid_configuration(
                        "gradientMagnitudeTolerance must not be negative",
                    ));
                }
            }
            OptimizerKind::GradientDescent { learning_rate } => {
                if learning_rate <= 0.0 {
                    return Err(RegistrationError::invalid_configuration(format!(
                        "gradientDescent learning rate must be positive, got {}",
                        learning_rate
                    )));
                }
            }
        }

        if self.optimizer.max_iterations == 0 {
            return Err(RegistrationError::invalid_configuration("maxIterations must be positive"));
        }
        let scale = &self.optimizer.scale;
        if [scale.translation, scale.rotation, scale.size].iter().any(|&s| s <= 0.0) {
            return Err(RegistrationError::invalid_configuration("optimizer scales must be positive"));
        }
        if !(self.mask_shrink_factor > 0.0 && self.mask_shrink_factor < 1.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "maskShrinkFactor must lie in (0, 1), got {}",
                self.mask_shrink_factor
            )));
        }
        if self.levels == 0 {
            return Err(RegistrationError::invalid_configuration("levels must be at least 1"));
        }
        if self.optimizer_translation_scale_3d <= 0.0 {
            return Err(RegistrationError::invalid_configuration(
                "optimizerTranslationScale3D must be positive",
            ));
        }
        if self.bspline_grid_size == 0 {
            return Err(RegistrationError::invalid_configuration("bsplineGridSize must be positive"));
        }
        if self.mri_resize_factor <= 0.0 {
            return Err(RegistrationError::invalid_configuration("mriResizeFactor must be positive"));
        }
        Ok(())
    }
}

fn exactly_one<T>(mut kinds: Vec<T>, section: &str) -> Result<T> {
    match kinds.len() {
        1 => Ok(kinds.remove(0)),
        0 => Err(RegistrationError::invalid_configuration(format!(
            "no {} specified in registration parameters",
            section
        ))),
        n => Err(RegistrationError::invalid_configuration(format!(
            "{} {} kinds specified, expected exactly one",
            n, section
        ))),
    }
}
