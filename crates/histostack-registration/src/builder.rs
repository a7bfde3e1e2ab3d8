//! Assembles a [`RegistrationEngine`] from [`RegistrationParameters`].

use std::path::PathBuf;

use tracing::info;

use histostack_core::transform::{ParametricTransform, Transform2D, TransformKind};

use crate::config::{RegistrationParameters, ScaleParameters};
use crate::engine::RegistrationEngine;
use crate::error::{RegistrationError, Result};
use crate::observer::{file_observer, stdout_observer, Observer};
use crate::optimizer::Optimizer;

/// Builds a registration engine with the configured metric, optimizer and
/// the standard observers.
///
/// # Examples
/// ```rust,no_run
/// # fn demo(parameters: &histostack_registration::RegistrationParameters) -> histostack_registration::Result<()> {
/// use histostack_registration::RegistrationBuilder;
///
/// let engine = RegistrationBuilder::new(parameters)
///     .with_iteration_file("iterations.txt")
///     .registration()?;
/// # Ok(())
/// # }
/// ```
pub struct RegistrationBuilder<'a> {
    parameters: &'a RegistrationParameters,
    stdout: bool,
    iteration_file: Option<PathBuf>,
    observers: Vec<Observer>,
}

impl<'a> RegistrationBuilder<'a> {
    pub fn new(parameters: &'a RegistrationParameters) -> Self {
        Self {
            parameters,
            stdout: true,
            iteration_file: None,
            observers: Vec::new(),
        }
    }

    /// Do not print iterations to stdout.
    pub fn quiet(mut self) -> Self {
        self.stdout = false;
        self
    }

    /// Also write iterations to `path`.
    pub fn with_iteration_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.iteration_file = Some(path.into());
        self
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate the parameters and return the assembled engine.
    pub fn registration(self) -> Result<RegistrationEngine> {
        self.parameters.validate()?;
        let metric = self.parameters.metric_kind()?;
        let optimizer = self
            .parameters
            .optimizer_kind()?
            .build(self.parameters.optimizer.max_iterations, self.parameters.optimizer.maximize);

        info!("Using {} metric and {} optimizer", metric.name(), optimizer.name());

        let mut engine = RegistrationEngine::new();
        engine.set_metric(metric);
        engine.set_optimizer(optimizer);

        if self.stdout {
            engine.add_observer(stdout_observer());
        }
        if let Some(path) = &self.iteration_file {
            let observer = file_observer(path).map_err(|err| {
                RegistrationError::invalid_configuration(format!(
                    "cannot open iteration file {}: {}",
                    path.display(),
                    err
                ))
            })?;
            engine.add_observer(observer);
        }
        for observer in self.observers {
            engine.add_observer(observer);
        }

        engine.check_assembled()?;
        Ok(engine)
    }
}

/// Optimizer scales for a slice transform.
///
/// Translations and centres get the translation scale and matrix entries the
/// size scale. The rigid angle is unscaled; the similarity angle takes the
/// rotation scale. B-spline coefficients are all one.
pub fn scales_for(transform: &Transform2D, scale: &ScaleParameters) -> Vec<f64> {
    let t = scale.translation;
    match transform.kind() {
        TransformKind::Identity => Vec::new(),
        TransformKind::Translation => vec![t, t],
        TransformKind::CenteredRigid2D => vec![1.0, t, t, t, t],
        TransformKind::CenteredSimilarity2D => vec![scale.size, scale.rotation, t, t, t, t],
        TransformKind::CenteredAffine => [[scale.size; 4], [t; 4]].concat(),
        TransformKind::Affine => [vec![scale.size; 4], vec![t; 2]].concat(),
        TransformKind::BSplineDeformable => vec![1.0; transform.number_of_parameters()],
    }
}
