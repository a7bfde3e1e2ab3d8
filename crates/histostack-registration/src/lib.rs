//! Registration of histology slices and volumes.
//!
//! A [`RegistrationEngine`] drives one metric and one optimizer over any
//! [`ParametricTransform`](histostack_core::transform::ParametricTransform),
//! with gradients taken through burn's autodiff backend. On top of it sit
//! the [`StackAligner`] for slice-by-slice stack alignment and
//! [`VolumeRegistration`] for the multi-resolution stack-to-MRI rigid step.

pub mod config;
pub mod error;
pub mod metric;
pub mod optimizer;
pub mod observer;
pub mod engine;
pub mod builder;
pub mod aligner;
pub mod multires;

pub use error::{RegistrationError, Result};
pub use config::RegistrationParameters;
pub use builder::{scales_for, RegistrationBuilder};
pub use engine::{RegistrationEngine, RegistrationOutcome, RegistrationRequest};
pub use aligner::{register_pair, AlignmentReport, SliceState, StackAligner};
pub use multires::{standard_level_schedule, VolumeInputs, VolumeRegistration};
pub use metric::MetricKind;
pub use optimizer::{Optimizer, OptimizerKind, StopCondition};
pub use observer::{IterationEvent, MetricHistory, Observer};
