//! Optimizers for registration.

pub mod trait_;
pub mod regular_step;
pub mod gradient_descent;

pub use trait_::{Optimizer, StopCondition};
pub use regular_step::RegularStepGradientDescent;
pub use gradient_descent::GradientDescent;

/// Optimizer settings as read from the configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    RegularStepGradientDescent {
        relaxation_factor: f64,
        max_step_length: f64,
        min_step_length: f64,
        gradient_magnitude_tolerance: f64,
    },
    GradientDescent {
        learning_rate: f64,
    },
}

impl OptimizerKind {
    pub fn build(&self, max_iterations: usize, maximize: bool) -> ConfiguredOptimizer {
        match *self {
            OptimizerKind::RegularStepGradientDescent {
                relaxation_factor,
                max_step_length,
                min_step_length,
                gradient_magnitude_tolerance,
            } => ConfiguredOptimizer::RegularStep(
                RegularStepGradientDescent::new(
                    relaxation_factor,
                    max_step_length,
                    min_step_length,
                    gradient_magnitude_tolerance,
                    max_iterations,
                )
                .with_maximize(maximize),
            ),
            OptimizerKind::GradientDescent { learning_rate } => ConfiguredOptimizer::GradientDescent(
                GradientDescent::new(learning_rate, max_iterations).with_maximize(maximize),
            ),
        }
    }
}

/// Optimizer chosen at runtime.
#[derive(Debug, Clone)]
pub enum ConfiguredOptimizer {
    RegularStep(RegularStepGradientDescent),
    GradientDescent(GradientDescent),
}

impl ConfiguredOptimizer {
    fn inner(&self) -> &dyn Optimizer {
        match self {
            ConfiguredOptimizer::RegularStep(o) => o,
            ConfiguredOptimizer::GradientDescent(o) => o,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Optimizer {
        match self {
            ConfiguredOptimizer::RegularStep(o) => o,
            ConfiguredOptimizer::GradientDescent(o) => o,
        }
    }
}

impl Optimizer for ConfiguredOptimizer {
    fn start(&mut self) {
        self.inner_mut().start()
    }

    fn advance(&mut self, parameters: &mut [f64], gradient: &[f64], scales: &[f64]) -> Option<StopCondition> {
        self.inner_mut().advance(parameters, gradient, scales)
    }

    fn current_iteration(&self) -> usize {
        self.inner().current_iteration()
    }

    fn max_iterations(&self) -> usize {
        self.inner().max_iterations()
    }

    fn set_max_iterations(&mut self, iterations: usize) {
        self.inner_mut().set_max_iterations(iterations)
    }

    fn maximize(&self) -> bool {
        self.inner().maximize()
    }

    fn current_step_length(&self) -> f64 {
        self.inner().current_step_length()
    }

    fn max_step(&self) -> f64 {
        self.inner().max_step()
    }

    fn min_step(&self) -> f64 {
        self.inner().min_step()
    }

    fn set_max_step(&mut self, length: f64) {
        self.inner_mut().set_max_step(length)
    }

    fn set_min_step(&mut self, length: f64) {
        self.inner_mut().set_min_step(length)
    }

    fn stop_condition(&self) -> Option<StopCondition> {
        self.inner().stop_condition()
    }

    fn stop_condition_description(&self) -> String {
        self.inner().stop_condition_description()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_carries_settings() {
        let kind = OptimizerKind::RegularStepGradientDescent {
            relaxation_factor: 0.5,
            max_step_length: 0.2,
            min_step_length: 0.001,
            gradient_magnitude_tolerance: 1e-4,
        };
        let mut optimizer = kind.build(42, true);
        assert_eq!(optimizer.max_iterations(), 42);
        assert!(optimizer.maximize());
        assert_eq!(optimizer.max_step(), 0.2);
        optimizer.set_min_step(0.0001);
        assert_eq!(optimizer.min_step(), 0.0001);
        assert_eq!(optimizer.name(), "RegularStepGradientDescent");
    }

    #[test]
    fn test_gradient_descent_ignores_step_bounds() {
        let mut optimizer = OptimizerKind::GradientDescent { learning_rate: 0.01 }.build(5, false);
        optimizer.set_max_step(3.0);
        assert_eq!(optimizer.max_step(), 0.01);
    }
}
