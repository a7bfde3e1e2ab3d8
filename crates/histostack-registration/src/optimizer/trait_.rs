//! Optimizer trait for gradient-driven parameter updates.

use std::fmt;

/// Why an optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    MaximumNumberOfIterations,
    GradientMagnitudeTolerance,
    StepTooSmall,
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCondition::MaximumNumberOfIterations => f.write_str("Maximum number of iterations reached"),
            StopCondition::GradientMagnitudeTolerance => f.write_str("Gradient magnitude tolerance met"),
            StopCondition::StepTooSmall => f.write_str("Step length smaller than minimum step length"),
        }
    }
}

/// Optimizer trait.
///
/// The optimizer owns the iteration count: the engine evaluates the metric
/// at the current parameters and calls [`Optimizer::advance`] until it
/// returns a stop condition.
pub trait Optimizer {
    /// Reset the iteration count and step state before a run.
    fn start(&mut self);

    /// Move `parameters` one step using `gradient` of the cost.
    ///
    /// `scales` divide the gradient before it is used, so a large scale makes
    /// a parameter move less.
    ///
    /// # Returns
    /// `Some` when the optimizer stops instead of stepping; `parameters` is
    /// then unchanged.
    fn advance(&mut self, parameters: &mut [f64], gradient: &[f64], scales: &[f64]) -> Option<StopCondition>;

    /// Iterations completed since [`Optimizer::start`].
    fn current_iteration(&self) -> usize;

    fn max_iterations(&self) -> usize;

    fn set_max_iterations(&mut self, iterations: usize);

    fn maximize(&self) -> bool;

    /// Length of the last step taken.
    fn current_step_length(&self) -> f64;

    fn max_step(&self) -> f64;

    fn min_step(&self) -> f64;

    fn set_max_step(&mut self, length: f64);

    fn set_min_step(&mut self, length: f64);

    fn stop_condition(&self) -> Option<StopCondition>;

    fn stop_condition_description(&self) -> String {
        match self.stop_condition() {
            Some(condition) => format!("{}: {}", self.name(), condition),
            None => format!("{}: not stopped", self.name()),
        }
    }

    fn name(&self) -> &'static str;
}

/// `gradient / scales`, element-wise.
pub(crate) fn scaled_gradient(gradient: &[f64], scales: &[f64]) -> Vec<f64> {
    gradient.iter().zip(scales).map(|(g, s)| g / s).collect()
}

/// Direction multiplier: `+1` when maximising, `-1` when minimising.
pub(crate) fn direction(maximize: bool) -> f64 {
    if maximize {
        1.0
    } else {
        -1.0
    }
}
