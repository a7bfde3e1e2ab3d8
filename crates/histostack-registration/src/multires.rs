//! Coarse-to-fine rigid registration of the stack volume against the MRI.
//!
//! Fixed and moving volumes are smoothed and shrunk into matching pyramids.
//! The same engine runs once per level, coarsest first, each level starting
//! from the previous level's parameters. A level observer closure
//! reconfigures the engine before every level.

use burn::tensor::backend::AutodiffBackend;
use tracing::info;

use histostack_core::filter::MultiResolutionPyramid;
use histostack_core::image::Image;
use histostack_core::spatial::{Point3, Vector3};
use histostack_core::transform::Rigid3D;

use crate::config::RegistrationParameters;
use crate::engine::{RegistrationEngine, RegistrationOutcome, RegistrationRequest};
use crate::error::{RegistrationError, Result};
use crate::metric::MetricKind;
use crate::optimizer::{Optimizer, OptimizerKind};

/// Called with the level index before each level runs.
pub type LevelObserver<'a> = dyn FnMut(usize, &mut RegistrationEngine) + 'a;

/// Images and masks for the volume registration.
pub struct VolumeInputs<'a, B: AutodiffBackend> {
    /// The tiled stack volume.
    pub fixed: &'a Image<B, 3>,
    pub fixed_mask: &'a Image<B, 3>,
    /// The MRI volume.
    pub moving: &'a Image<B, 3>,
    pub moving_mask: &'a Image<B, 3>,
}

/// Multi-resolution `Rigid3D` registration with Mattes mutual information
/// and regular-step descent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRegistration {
    levels: usize,
    translation_scale: f64,
}

impl VolumeRegistration {
    pub fn new(levels: usize, translation_scale: f64) -> Self {
        Self {
            levels: levels.max(1),
            translation_scale,
        }
    }

    pub fn from_parameters(parameters: &RegistrationParameters) -> Self {
        Self::new(parameters.levels, parameters.optimizer_translation_scale_3d)
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// `[1, 1, 1, s, s, s]`: versor components unscaled, translations by `s`.
    pub fn scales(&self) -> Vec<f64> {
        let s = self.translation_scale;
        vec![1.0, 1.0, 1.0, s, s, s]
    }

    /// An engine with Mattes mutual information and regular-step descent.
    ///
    /// The regular-step settings come from `parameters` when it configures
    /// that optimizer; the level observer overrides the step bounds anyway.
    pub fn engine(&self, parameters: &RegistrationParameters) -> Result<RegistrationEngine> {
        let (relaxation_factor, gradient_magnitude_tolerance) = match parameters.optimizer_kind()? {
            OptimizerKind::RegularStepGradientDescent {
                relaxation_factor,
                gradient_magnitude_tolerance,
                ..
            } => (relaxation_factor, gradient_magnitude_tolerance),
            OptimizerKind::GradientDescent { .. } => (0.5, 1e-4),
        };
        let optimizer = OptimizerKind::RegularStepGradientDescent {
            relaxation_factor,
            max_step_length: LEVEL_ZERO_MAX_STEP,
            min_step_length: LEVEL_ZERO_MIN_STEP,
            gradient_magnitude_tolerance,
        }
        .build(LEVEL_ZERO_ITERATIONS, false);

        let mut engine = RegistrationEngine::new();
        engine.set_metric(MetricKind::MattesMutualInformation {
            spatial_samples: LEVEL_ZERO_SAMPLES,
            histogram_bins: LEVEL_ZERO_BINS,
        });
        engine.set_optimizer(optimizer);
        engine.set_scales(self.scales());
        Ok(engine)
    }

    /// The starting transform: centres aligned, then a half turn about
    /// `(1, 0, -1)`, the orientation the MRI is acquired in relative to the
    /// sectioned block.
    pub fn initial_transform<B: AutodiffBackend>(fixed: &Image<B, 3>, moving: &Image<B, 3>) -> Rigid3D {
        let fixed_centre = geometric_centre(fixed);
        let moving_centre = geometric_centre(moving);
        Rigid3D::from_axis_angle(
            Vector3::new(1.0, 0.0, -1.0),
            std::f64::consts::PI,
            moving_centre - fixed_centre,
            fixed_centre,
        )
    }

    /// Run every level, updating `transform` in place.
    pub fn register<B: AutodiffBackend>(
        &self,
        engine: &mut RegistrationEngine,
        inputs: &VolumeInputs<'_, B>,
        transform: &mut Rigid3D,
        level_observer: &mut LevelObserver<'_>,
    ) -> Result<RegistrationOutcome> {
        let (factors, sigmas) = MultiResolutionPyramid::<B, 3>::default_schedule(self.levels, inputs.fixed.spacing());
        let (_, moving_sigmas) = MultiResolutionPyramid::<B, 3>::default_schedule(self.levels, inputs.moving.spacing());

        let fixed_pyramid = MultiResolutionPyramid::new(inputs.fixed, &factors, &sigmas);
        let fixed_masks = MultiResolutionPyramid::shrink_only(inputs.fixed_mask, &factors);
        let moving_pyramid = MultiResolutionPyramid::new(inputs.moving, &factors, &moving_sigmas);

        let mut outcome = None;
        for level in 0..self.levels {
            level_observer(level, engine);

            let fixed_level = fixed_pyramid.get_level(level);
            let moving_level = moving_pyramid.get_level(level);
            info!("-------------------------------------");
            info!("MultiResolution Level : {}", level);
            info!("  Fixed size: {:?}", fixed_level.size());
            info!("  Moving size: {:?}", moving_level.size());

            let request = RegistrationRequest::new(fixed_level, moving_level)
                .with_fixed_mask(fixed_masks.get_level(level))
                .with_moving_mask(inputs.moving_mask);
            outcome = Some(engine.run(&request, transform)?);
        }

        outcome.ok_or_else(|| RegistrationError::invalid_configuration("volume registration needs at least one level"))
    }
}

const LEVEL_ZERO_MAX_STEP: f64 = 0.25;
const LEVEL_ZERO_MIN_STEP: f64 = 0.00125;
const LEVEL_ZERO_ITERATIONS: usize = 100;
const LEVEL_ZERO_SAMPLES: usize = 24000;
const LEVEL_ZERO_BINS: usize = 50;

/// The standard level schedule.
///
/// Level 0 resets the step bounds, iteration count and Mattes sampling.
/// Every later level starts at the step length the previous level ended
/// with and divides the minimum step by ten.
pub fn standard_level_schedule(level: usize, engine: &mut RegistrationEngine) {
    if let Some(metric) = engine.metric_mut() {
        if level == 0 {
            metric.set_spatial_samples(LEVEL_ZERO_SAMPLES);
            metric.set_histogram_bins(LEVEL_ZERO_BINS);
        }
    }
    let samples = engine.metric().and_then(|m| m.max_samples());
    if let Some(optimizer) = engine.optimizer_mut() {
        if level == 0 {
            optimizer.set_max_step(LEVEL_ZERO_MAX_STEP);
            optimizer.set_min_step(LEVEL_ZERO_MIN_STEP);
            optimizer.set_max_iterations(LEVEL_ZERO_ITERATIONS);
        } else {
            info!("Optimizer stop condition: {}", optimizer.stop_condition_description());
            let last_step = optimizer.current_step_length();
            let min_step = optimizer.min_step() / 10.0;
            optimizer.set_max_step(last_step);
            optimizer.set_min_step(min_step);
        }
        info!("Max step length : {}", optimizer.max_step());
        info!("Min step length : {}", optimizer.min_step());
    }
    if let Some(samples) = samples {
        info!("Spatial samples : {}", samples);
    }
}

/// Physical position of the middle of the pixel grid.
fn geometric_centre<B: AutodiffBackend>(image: &Image<B, 3>) -> Point3 {
    let size = image.size();
    let index = Point3::new(
        (size[0] as f64 - 1.0) / 2.0,
        (size[1] as f64 - 1.0) / 2.0,
        (size[2] as f64 - 1.0) / 2.0,
    );
    image.transform_continuous_index_to_physical_point(&index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::mean_squares_parameters;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use histostack_core::spatial::spacing;
    use histostack_core::transform::ParametricTransform;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_scales() {
        let registration = VolumeRegistration::new(3, 0.001);
        assert_eq!(registration.scales(), vec![1.0, 1.0, 1.0, 0.001, 0.001, 0.001]);
    }

    #[test]
    fn test_engine_uses_mattes_and_regular_step() {
        let registration = VolumeRegistration::from_parameters(&mean_squares_parameters());
        let engine = registration.engine(&mean_squares_parameters()).unwrap();
        assert_eq!(
            engine.metric(),
            Some(&MetricKind::MattesMutualInformation { spatial_samples: 24000, histogram_bins: 50 })
        );
        assert_eq!(engine.optimizer().unwrap().name(), "RegularStepGradientDescent");
        assert_eq!(engine.scales().len(), 6);
    }

    #[test]
    fn test_level_schedule() {
        let registration = VolumeRegistration::new(3, 0.001);
        let mut engine = registration.engine(&mean_squares_parameters()).unwrap();
        if let Some(optimizer) = engine.optimizer_mut() {
            optimizer.set_max_step(9.0);
        }

        standard_level_schedule(0, &mut engine);
        let optimizer = engine.optimizer().unwrap();
        assert_eq!(optimizer.max_step(), 0.25);
        assert_eq!(optimizer.min_step(), 0.00125);
        assert_eq!(optimizer.max_iterations(), 100);

        // Before any run the current step equals the configured maximum.
        standard_level_schedule(1, &mut engine);
        let optimizer = engine.optimizer().unwrap();
        assert!((optimizer.min_step() - 0.000125).abs() < 1e-12);
    }

    fn blob_volume(centre: [f32; 3]) -> Image<TestBackend, 3> {
        let device = Default::default();
        let mut pixels = Vec::with_capacity(12 * 12 * 12);
        for z in 0..12 {
            for y in 0..12 {
                for x in 0..12 {
                    let d2 = (x as f32 - centre[0]).powi(2) + (y as f32 - centre[1]).powi(2) + (z as f32 - centre[2]).powi(2);
                    pixels.push(200.0 * (-d2 / 8.0).exp());
                }
            }
        }
        Image::from_pixels(pixels, [12, 12, 12], spacing([1.0, 1.0, 1.0]), &device)
    }

    #[test]
    fn test_next_level_starts_at_last_step_length() {
        let fixed = blob_volume([5.5, 5.5, 5.5]);
        let moving = blob_volume([6.5, 5.5, 5.5]);
        let mask = fixed.filled_like(255.0);

        let registration = VolumeRegistration::new(2, 0.1);
        let mut engine = registration.engine(&mean_squares_parameters()).unwrap();
        engine.set_metric(MetricKind::MeanSquares);
        standard_level_schedule(0, &mut engine);
        if let Some(optimizer) = engine.optimizer_mut() {
            optimizer.set_max_iterations(15);
        }

        let mut transform = Rigid3D::identity(Point3::new(5.5, 5.5, 5.5));
        let request = RegistrationRequest::new(&fixed, &moving)
            .with_fixed_mask(&mask)
            .with_moving_mask(&mask);
        let outcome = engine.run(&request, &mut transform).unwrap();
        assert!(outcome.last_step_length > 0.0);
        assert!(outcome.last_step_length <= 0.25);

        standard_level_schedule(1, &mut engine);
        let optimizer = engine.optimizer().unwrap();
        assert_eq!(optimizer.max_step(), outcome.last_step_length);
        assert!((optimizer.min_step() - 0.000125).abs() < 1e-12);
    }

    #[test]
    fn test_initial_transform_aligns_centres() {
        let device = Default::default();
        let fixed = Image::<TestBackend, 3>::from_pixels(vec![0.0; 4 * 6 * 8], [4, 6, 8], spacing([1.0, 1.0, 2.0]), &device);
        let moving = Image::<TestBackend, 3>::from_pixels(vec![0.0; 8 * 8 * 8], [8, 8, 8], spacing([1.0, 1.0, 1.0]), &device);

        let transform = VolumeRegistration::initial_transform(&fixed, &moving);
        let fixed_centre = geometric_centre(&fixed);
        let mapped = transform.transform_point(&fixed_centre);
        assert!((mapped - geometric_centre(&moving)).norm() < 1e-9);
        assert_eq!(transform.fixed_parameters(), vec![fixed_centre.x, fixed_centre.y, fixed_centre.z]);
    }

    #[test]
    fn test_levels_run_in_order() {
        let device = Default::default();
        let mut pixels = Vec::with_capacity(8 * 8 * 8);
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    pixels.push(((x + 2 * y + 3 * z) % 7) as f32 * 30.0);
                }
            }
        }
        let volume = Image::<TestBackend, 3>::from_pixels(pixels, [8, 8, 8], spacing([1.0, 1.0, 1.0]), &device);
        let mask = volume.filled_like(255.0);

        let registration = VolumeRegistration::new(2, 0.1);
        let mut engine = registration.engine(&mean_squares_parameters()).unwrap();
        if let Some(metric) = engine.metric_mut() {
            metric.set_histogram_bins(12);
        }
        let mut seen = Vec::new();
        let mut observer = |level: usize, engine: &mut RegistrationEngine| {
            seen.push(level);
            if let Some(optimizer) = engine.optimizer_mut() {
                optimizer.set_max_iterations(2);
            }
        };

        let mut transform = Rigid3D::identity(Point3::new(3.5, 3.5, 3.5));
        let inputs = VolumeInputs {
            fixed: &volume,
            fixed_mask: &mask,
            moving: &volume,
            moving_mask: &mask,
        };
        let outcome = registration.register(&mut engine, &inputs, &mut transform, &mut observer).unwrap();
        assert_eq!(seen, vec![0, 1]);
        assert!(outcome.iterations <= 2);
        assert_eq!(transform.parameters().len(), 6);
    }
}
