//! The registration engine.
//!
//! One engine carries a metric, an optimizer, optimizer scales and a list of
//! observers. Each call to [`RegistrationEngine::run`] supplies the images,
//! masks and transform for that run, so a single engine registers every
//! slice of a stack in turn.

use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::{debug, info};

use histostack_core::image::Image;
use histostack_core::interpolation::{Interpolator, LinearInterpolator, NearestNeighborInterpolator};
use histostack_core::transform::{parameter_tensor, ParametricTransform};

use crate::error::{RegistrationError, Result};
use crate::metric::{intensity_range, FixedSamples, Metric, MetricKind, SampleSet};
use crate::observer::{IterationEvent, Observer};
use crate::optimizer::{ConfiguredOptimizer, Optimizer, StopCondition};

/// Images and masks for one registration run.
///
/// The transform maps fixed physical points into the moving image. Mask
/// pixels above zero are inside.
#[derive(Debug, Clone)]
pub struct RegistrationRequest<'a, B: AutodiffBackend, const D: usize> {
    pub fixed: &'a Image<B, D>,
    pub fixed_mask: Option<&'a Image<B, D>>,
    pub moving: &'a Image<B, D>,
    pub moving_mask: Option<&'a Image<B, D>>,
}

impl<'a, B: AutodiffBackend, const D: usize> RegistrationRequest<'a, B, D> {
    pub fn new(fixed: &'a Image<B, D>, moving: &'a Image<B, D>) -> Self {
        Self {
            fixed,
            fixed_mask: None,
            moving,
            moving_mask: None,
        }
    }

    pub fn with_fixed_mask(mut self, mask: &'a Image<B, D>) -> Self {
        self.fixed_mask = Some(mask);
        self
    }

    pub fn with_moving_mask(mut self, mask: &'a Image<B, D>) -> Self {
        self.moving_mask = Some(mask);
        self
    }
}

/// Result of a completed registration run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub parameters: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub stop_condition: StopCondition,
    pub last_step_length: f64,
}

/// Metric, optimizer, scales and observers for gradient-based registration.
#[derive(Default)]
pub struct RegistrationEngine {
    metric: Option<MetricKind>,
    optimizer: Option<ConfiguredOptimizer>,
    interpolator: LinearInterpolator,
    scales: Vec<f64>,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for RegistrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEngine")
            .field("metric", &self.metric)
            .field("optimizer", &self.optimizer)
            .field("scales", &self.scales)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RegistrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metric(&mut self, metric: MetricKind) {
        self.metric = Some(metric);
    }

    pub fn set_optimizer(&mut self, optimizer: ConfiguredOptimizer) {
        self.optimizer = Some(optimizer);
    }

    /// Set the optimizer scales; an empty vector means all ones.
    pub fn set_scales(&mut self, scales: Vec<f64>) {
        self.scales = scales;
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn add_observer(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    pub fn metric(&self) -> Option<&MetricKind> {
        self.metric.as_ref()
    }

    pub fn metric_mut(&mut self) -> Option<&mut MetricKind> {
        self.metric.as_mut()
    }

    pub fn optimizer(&self) -> Option<&ConfiguredOptimizer> {
        self.optimizer.as_ref()
    }

    pub fn optimizer_mut(&mut self) -> Option<&mut ConfiguredOptimizer> {
        self.optimizer.as_mut()
    }

    /// Fails unless both a metric and an optimizer are set.
    pub fn check_assembled(&self) -> Result<()> {
        if self.metric.is_none() {
            return Err(RegistrationError::invalid_configuration("registration has no metric"));
        }
        if self.optimizer.is_none() {
            return Err(RegistrationError::invalid_configuration("registration has no optimizer"));
        }
        Ok(())
    }

    /// Register `request.moving` onto `request.fixed`, starting from and
    /// updating `transform`.
    ///
    /// Fails with `TooFewSamples` when the fixed mask is empty or when fewer
    /// than a quarter of the fixed samples map inside the moving image and
    /// mask. `transform` is only updated on success.
    pub fn run<B, T, const D: usize>(
        &mut self,
        request: &RegistrationRequest<'_, B, D>,
        transform: &mut T,
    ) -> Result<RegistrationOutcome>
    where
        B: AutodiffBackend,
        T: ParametricTransform<D>,
    {
        let metric = self
            .metric
            .ok_or_else(|| RegistrationError::invalid_configuration("registration has no metric"))?;

        let mut parameters = transform.parameters();
        if parameters.is_empty() {
            return Err(RegistrationError::invalid_configuration(format!(
                "{} has no parameters to optimise",
                transform.type_tag()
            )));
        }
        let scales = self.resolve_scales(parameters.len())?;

        let samples = FixedSamples::gather(request.fixed, request.fixed_mask, metric.max_samples())?;
        let moving_range = intensity_range(request.moving);

        let interpolator = self.interpolator;
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| RegistrationError::invalid_configuration("registration has no optimizer"))?;

        info!(
            "registering with {} and {} on {} ({} parameters, {} samples)",
            metric.name(),
            optimizer.name(),
            transform.type_tag(),
            parameters.len(),
            samples.len()
        );

        let mut working = transform.clone();
        let started = Instant::now();
        optimizer.start();

        let (stop, value) = loop {
            let (value, gradient) =
                evaluate(&metric, &interpolator, request, &samples, moving_range, &working, &parameters)?;

            if let Some(stop) = optimizer.advance(&mut parameters, &gradient, &scales) {
                break (stop, value);
            }
            working.set_parameters(&parameters)?;
            parameters = working.parameters();

            let iteration = optimizer.current_iteration() - 1;
            if iteration % 50 == 0 {
                debug!("Iteration {}: value {:.6}", iteration, value);
            }
            let event = IterationEvent {
                iteration,
                value,
                parameters: &parameters,
                step_length: optimizer.current_step_length(),
                elapsed: started.elapsed(),
            };
            for observer in self.observers.iter_mut() {
                observer(&event);
            }
        };

        info!("Optimizer stop condition: {}", optimizer.stop_condition_description());

        transform.set_parameters(&parameters)?;
        Ok(RegistrationOutcome {
            parameters,
            value,
            iterations: optimizer.current_iteration(),
            stop_condition: stop,
            last_step_length: optimizer.current_step_length(),
        })
    }

    fn resolve_scales(&self, count: usize) -> Result<Vec<f64>> {
        if self.scales.is_empty() {
            return Ok(vec![1.0; count]);
        }
        if self.scales.len() != count {
            return Err(RegistrationError::ShapeMismatch {
                expected: vec![count],
                actual: vec![self.scales.len()],
            });
        }
        Ok(self.scales.clone())
    }
}

/// Metric value and gradient at `parameters`.
fn evaluate<B, T, const D: usize>(
    metric: &MetricKind,
    interpolator: &LinearInterpolator,
    request: &RegistrationRequest<'_, B, D>,
    samples: &FixedSamples<B>,
    moving_range: (f64, f64),
    transform: &T,
    parameters: &[f64],
) -> Result<(f64, Vec<f64>)>
where
    B: AutodiffBackend,
    T: ParametricTransform<D>,
{
    let device = samples.points.device();
    let p = parameter_tensor::<B>(parameters, &device).require_grad();

    let mapped = transform.map_points(p.clone(), samples.points.clone());
    let indices = request.moving.world_to_index_tensor(mapped.clone());
    let moving = interpolator.interpolate(request.moving.data(), indices.clone());
    let mut weights = interpolator.inside_buffer(request.moving.data(), indices);

    if let Some(mask) = request.moving_mask {
        let nearest = NearestNeighborInterpolator::new();
        let mask_indices = mask.world_to_index_tensor(mapped);
        let inside = nearest.inside_buffer(mask.data(), mask_indices.clone());
        let foreground = nearest.interpolate(mask.data(), mask_indices).greater_elem(0.0).float();
        weights = weights * inside * foreground;
    }
    let weights = weights.detach();

    let valid = weights.clone().sum().into_scalar().elem::<f64>().round() as usize;
    let required = samples.required_valid();
    if valid < required {
        return Err(RegistrationError::too_few_samples(valid, required));
    }

    let set = SampleSet {
        fixed: samples.values.clone(),
        moving,
        weights,
        valid,
        fixed_range: samples.range,
        moving_range,
    };
    let loss = metric.evaluate(&set);
    let value = loss.clone().into_scalar().elem::<f64>();
    if !value.is_finite() {
        return Err(RegistrationError::metric(format!("{} is not finite", metric.name())));
    }

    let grads = loss.backward();
    let gradient = match p.grad(&grads) {
        Some(g) => g.into_data().iter::<f32>().map(f64::from).collect(),
        None => vec![0.0; parameters.len()],
    };
    Ok((value, gradient))
}
