//! One module per subcommand.

pub mod build_volumes;
pub mod diffusion;
pub mod hires_pairs;
pub mod register_mri;
pub mod register_volumes;
