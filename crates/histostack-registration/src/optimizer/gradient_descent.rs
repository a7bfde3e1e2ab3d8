//! Plain gradient descent with a fixed learning rate, stepped by burn's SGD.

use std::fmt;

use burn::backend::{Autodiff, NdArray};
use burn::module::{Module, Param};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{GradientsParams, Optimizer as BurnOptimizer, Sgd, SgdConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use super::trait_::{direction, scaled_gradient, Optimizer, StopCondition};

type StepBackend = Autodiff<NdArray<f64>>;

/// The parameter vector as a module, so the SGD adaptor can map it.
#[derive(Module, Debug)]
struct StepParameters<B: Backend> {
    values: Param<Tensor<B, 1>>,
}

/// `p ± lr · g / scale` every iteration until the iteration limit.
#[derive(Clone)]
pub struct GradientDescent {
    optimizer: OptimizerAdaptor<Sgd<NdArray<f64>>, StepParameters<StepBackend>, StepBackend>,
    learning_rate: f64,
    max_iterations: usize,
    maximize: bool,
    iteration: usize,
    last_step: f64,
    stop: Option<StopCondition>,
}

impl fmt::Debug for GradientDescent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientDescent")
            .field("learning_rate", &self.learning_rate)
            .field("max_iterations", &self.max_iterations)
            .field("maximize", &self.maximize)
            .field("iteration", &self.iteration)
            .field("last_step", &self.last_step)
            .field("stop", &self.stop)
            .finish()
    }
}

impl GradientDescent {
    pub fn new(learning_rate: f64, max_iterations: usize) -> Self {
        Self {
            optimizer: SgdConfig::new().init(),
            learning_rate,
            max_iterations,
            maximize: false,
            iteration: 0,
            last_step: 0.0,
            stop: None,
        }
    }

    pub fn with_maximize(mut self, maximize: bool) -> Self {
        self.maximize = maximize;
        self
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// One SGD step on `parameters` along the scaled cost gradient.
    fn sgd_step(&mut self, parameters: &mut [f64], scaled: &[f64]) {
        let device = Default::default();
        let values = Tensor::<StepBackend, 1>::from_data(TensorData::new(parameters.to_vec(), [parameters.len()]), &device);
        let module = StepParameters {
            values: Param::from_tensor(values),
        };

        // SGD descends; climbing flips the sign of the gradient it sees
        let sign = -direction(self.maximize);
        let descent: Vec<f64> = scaled.iter().map(|g| sign * g).collect();
        let slope = Tensor::<StepBackend, 1>::from_data(TensorData::new(descent, [scaled.len()]), &device);
        let loss = (module.values.val() * slope).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &module);

        let module = self.optimizer.step(self.learning_rate, module, grads);
        let stepped = module.values.val().into_data();

        let mut squared = 0.0;
        for (p, value) in parameters.iter_mut().zip(stepped.iter::<f64>()) {
            let delta = value - *p;
            *p = value;
            squared += delta * delta;
        }
        self.last_step = squared.sqrt();
    }
}

impl Optimizer for GradientDescent {
    fn start(&mut self) {
        self.iteration = 0;
        self.last_step = 0.0;
        self.stop = None;
    }

    fn advance(&mut self, parameters: &mut [f64], gradient: &[f64], scales: &[f64]) -> Option<StopCondition> {
        if self.iteration >= self.max_iterations {
            self.stop = Some(StopCondition::MaximumNumberOfIterations);
            return self.stop;
        }

        let scaled = scaled_gradient(gradient, scales);
        if parameters.is_empty() {
            self.last_step = 0.0;
        } else {
            self.sgd_step(parameters, &scaled);
        }
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
        self.last_step
    }

    /// Gradient descent has no step bounds; the learning rate stands in.
    fn max_step(&self) -> f64 {
        self.learning_rate
    }

    fn min_step(&self) -> f64 {
        0.0
    }

    fn set_max_step(&mut self, _length: f64) {}

    fn set_min_step(&mut self, _length: f64) {}

    fn stop_condition(&self) -> Option<StopCondition> {
        self.stop
    }

    fn name(&self) -> &'static str {
        "GradientDescent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_follows_scaled_gradient() {
        let mut optimizer = GradientDescent::new(0.1, 5);
        optimizer.start();
        let mut p = [1.0, 1.0];
        optimizer.advance(&mut p, &[2.0, 2.0], &[1.0, 4.0]);
        assert!((p[0] - 0.8).abs() < 1e-12);
        assert!((p[1] - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_maximize_climbs() {
        let mut optimizer = GradientDescent::new(0.5, 5).with_maximize(true);
        optimizer.start();
        let mut p = [0.0];
        optimizer.advance(&mut p, &[1.0], &[1.0]);
        assert_eq!(p[0], 0.5);
    }

    #[test]
    fn test_descends_quadratic_bowl() {
        // cost = (p0 - 3)^2 + 4 (p1 + 1)^2
        let mut optimizer = GradientDescent::new(0.1, 200);
        optimizer.start();
        let mut p = [0.0, 0.0];
        let scales = [1.0, 1.0];
        loop {
            let gradient = [2.0 * (p[0] - 3.0), 8.0 * (p[1] + 1.0)];
            if let Some(stop) = optimizer.advance(&mut p, &gradient, &scales) {
                assert_eq!(stop, StopCondition::MaximumNumberOfIterations);
                break;
            }
        }
        assert_eq!(optimizer.current_iteration(), 200);
        assert!((p[0] - 3.0).abs() < 1e-6, "{:?}", p);
        assert!((p[1] + 1.0).abs() < 1e-6, "{:?}", p);
        assert!(optimizer.current_step_length() < 1e-6);
    }

    #[test]
    fn test_step_length_is_parameter_displacement() {
        let mut optimizer = GradientDescent::new(0.5, 5);
        optimizer.start();
        let mut p = [1.0, 2.0];
        optimizer.advance(&mut p, &[6.0, 8.0], &[1.0, 1.0]);
        assert!((p[0] + 2.0).abs() < 1e-12);
        assert!((p[1] + 2.0).abs() < 1e-12);
        assert!((optimizer.current_step_length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_runs_to_iteration_limit() {
        let mut optimizer = GradientDescent::new(0.1, 2);
        optimizer.start();
        let mut p = [0.0];
        assert!(optimizer.advance(&mut p, &[0.0], &[1.0]).is_none());
        assert!(optimizer.advance(&mut p, &[0.0], &[1.0]).is_none());
        assert_eq!(
            optimizer.advance(&mut p, &[0.0], &[1.0]),
            Some(StopCondition::MaximumNumberOfIterations)
        );
        assert_eq!(
            optimizer.stop_condition_description(),
            "GradientDescent: Maximum number of iterations reached"
        );
    }
}
