//! What every command starts from: the directory layout, the loaded
//! configuration and the compute device.

use std::path::Path;

use anyhow::{ensure, Result};
use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use tracing::info;

use histostack_core::Stack;
use histostack_io::{load_config, read_basenames, read_stack, Dirs, PipelineConfig, Resolution};
use histostack_registration::{RegistrationBuilder, RegistrationEngine, RegistrationParameters};

/// Registration runs on the CPU with gradients.
pub type PipelineBackend = Autodiff<NdArray<f32>>;
pub type Device = <PipelineBackend as Backend>::Device;

pub struct Session {
    pub dirs: Dirs,
    pub config: PipelineConfig,
    pub device: Device,
    show_iterations: bool,
}

impl Session {
    pub fn open(root: &Path, data_set: &str, output_dir: &str, show_iterations: bool) -> Result<Self> {
        let dirs = Dirs::new(root, data_set, output_dir);
        let config = load_config(dirs.config_dir())?;
        info!("data set {} -> {}", data_set, dirs.results_dir().display());
        Ok(Self {
            dirs,
            config,
            device: Default::default(),
            show_iterations,
        })
    }

    /// The image list of the data set. An empty list is an error.
    pub fn basenames(&self) -> Result<Vec<String>> {
        let path = self.dirs.image_list();
        let basenames = read_basenames(&path)?;
        ensure!(!basenames.is_empty(), "{} lists no slices", path.display());
        Ok(basenames)
    }

    pub fn read_stack(&self, resolution: Resolution, basenames: &[String], roi: &str) -> Result<Stack<PipelineBackend>> {
        read_stack(&self.config, &self.dirs, resolution, basenames, roi, &self.device)
    }

    /// An engine assembled from `parameters`, printing iterations only when
    /// asked to.
    pub fn engine(&self, parameters: &RegistrationParameters) -> Result<RegistrationEngine> {
        let builder = RegistrationBuilder::new(parameters);
        let builder = if self.show_iterations { builder } else { builder.quiet() };
        Ok(builder.registration()?)
    }

    pub fn show_iterations(&self) -> bool {
        self.show_iterations
    }
}
