//! Regular-step gradient descent.

use tracing::debug;

use super::trait_::{direction, scaled_gradient, Optimizer, StopCondition};

/// Gradient descent with a step length that only shrinks.
///
/// Each step has length `current_step_length` along the scaled gradient. When
/// the gradient direction turns by more than 90 degrees between iterations,
/// the step is multiplied by the relaxation factor; once it falls below the
/// minimum step length the optimizer stops.
#[derive(Debug, Clone)]
pub struct RegularStepGradientDescent {
    relaxation_factor: f64,
    max_step: f64,
    min_step: f64,
    gradient_magnitude_tolerance: f64,
    max_iterations: usize,
    maximize: bool,
    current_step: f64,
    previous_gradient: Option<Vec<f64>>,
    iteration: usize,
    stop: Option<StopCondition>,
}

impl RegularStepGradientDescent {
    pub fn new(
        relaxation_factor: f64,
        max_step: f64,
        min_step: f64,
        gradient_magnitude_tolerance: f64,
        max_iterations: usize,
    ) -> Self {
        Self {
            relaxation_factor,
            max_step,
            min_step,
            gradient_magnitude_tolerance,
            max_iterations,
            maximize: false,
            current_step: max_step,
            previous_gradient: None,
            iteration: 0,
            stop: None,
        }
    }

    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    pub fn relaxation_factor(&self) -> f64 {
        self.relaxation_factor
    }

    fn halt(&mut self, condition: StopCondition) -> Option<StopCondition> {
        debug!("regular step descent stopped after {} iterations: {}", self.iteration, condition);
        self.stop = Some(condition);
        Some(condition)
    }
}

impl Optimizer for RegularStepGradientDescent {
    fn start(&mut self) {
        self.current_step = self.max_step;
        self.previous_gradient = None;
        self.iteration = 0;
        self.stop = None;
    }

    fn advance(&mut self, parameters: &mut [f64], gradient: &[f64], scales: &[f64]) -> Option<StopCondition> {
        if self.iteration >= self.max_iterations {
            return self.halt(StopCondition::MaximumNumberOfIterations);
        }

        let scaled = scaled_gradient(gradient, scales);
        let magnitude = scaled.iter().map(|g| g * g).sum::<f64>().sqrt();
        if magnitude < self.gradient_magnitude_tolerance {
            return self.halt(StopCondition::GradientMagnitudeTolerance);
        }

        if let Some(previous) = &self.previous_gradient {
            let turn: f64 = scaled.iter().zip(previous).map(|(a, b)| a * b).sum();
            if turn < 0.0 {
                self.current_step *= self.relaxation_factor;
            }
        }

        if self.current_step < self.min_step {
            return self.halt(StopCondition::StepTooSmall);
        }

        let factor = direction(self.maximize) * self.current_step / magnitude;
        for ((p, g), s) in parameters.iter_mut().zip(&scaled).zip(scales) {
            *p += g * factor / s;
        }

        self.previous_gradient = Some(scaled);
        self.iteration += 1;
        None
    }

    fn current_iteration(&self) -> usize {
        self.iteration
    }

    fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn set_max_iterations(&mut self, iterations: usize) {
        self.max_iterations = iterations;
    }

    fn maximize(&self) -> bool {
        self.maximize
    }

    fn current_step_length(&self) -> f64 {
        self.current_step
    }

    fn max_step(&self) -> f64 {
        self.max_step
    }

    fn min_step(&self) -> f64 {
        self.min_step
    }

    fn set_max_step(&mut self, length: f64) {
        self.max_step = length;
    }

    fn set_min_step(&mut self, length: f64) {
        self.min_step = length;
    }

    fn stop_condition(&self) -> Option<StopCondition> {
        self.stop
    }

    fn name(&self) -> &'static str {
        "RegularStepGradientDescent"
    }
}
