//! `histostack`: align histology slices and block-face photographs into
//! volumes and register the result to an MRI.

mod commands;
mod progress;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::diffusion::DiffusionMethod;
use session::Session;

#[derive(Parser)]
#[command(name = "histostack", about = "Histology stack registration pipeline", version)]
struct Cli {
    /// Directory holding `images/`, `config/` and `results/`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Print every optimizer iteration to stdout
    #[arg(long, global = true)]
    iterations: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Data set and output directory shared by every command.
#[derive(Args, Debug, Clone)]
struct Target {
    /// Data set under `images/`
    data_set: String,
    /// Run name under `results/<data_set>/`
    output_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the HiRes stack onto the LoRes stack, stage by stage
    RegisterVolumes {
        #[command(flatten)]
        target: Target,
        /// Register a single slice instead of the whole image list
        #[arg(long)]
        slice: Option<String>,
        /// Write the stack volumes after every stage
        #[arg(long)]
        write_images: bool,
        /// Finish with a B-spline stage
        #[arg(long)]
        deformable: bool,
    },
    /// Register every pair of neighbouring HiRes slices
    RegisterHiresPairs {
        #[command(flatten)]
        target: Target,
        /// Stage directory under `HiResTransforms/` to start from
        transform: String,
        #[arg(long, default_value = histostack_io::WHOLE_HEART_ROI)]
        roi: String,
    },
    /// Turn pair transforms into per-slice diffusion transforms
    ComputeDiffusionTransforms {
        #[command(flatten)]
        target: Target,
        /// Name under `HiResPairs/FinalTransforms/`
        transforms_name: String,
        /// Diffusion weight
        alpha: f64,
        #[arg(long, value_enum, default_value_t = DiffusionMethod::Root)]
        method: DiffusionMethod,
    },
    /// Apply diffusion transforms to a stage's stack transforms
    ComposeTransformSeries {
        #[command(flatten)]
        target: Target,
        /// Stage directory under `HiResTransforms/`
        transforms_name: String,
        /// Name under `HiResPairs/DiffusionTransforms/`
        diffusion_name: String,
    },
    /// Build and write stack volumes from saved transforms
    BuildVolumes {
        #[command(flatten)]
        target: Target,
        /// HiRes transforms directory, relative to the results directory
        transforms_dir: PathBuf,
        /// Skip the LoRes stack
        #[arg(long)]
        hires_only: bool,
    },
    /// Rigidly register the MRI onto the LoRes stack volume
    RegisterMri {
        #[command(flatten)]
        target: Target,
        /// MRI volume; defaults to `images/<data_set>/MRI/mri.nii.gz`
        #[arg(long)]
        mri: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let open = |target: &Target| Session::open(&cli.root, &target.data_set, &target.output_dir, cli.iterations);

    match &cli.command {
        Commands::RegisterVolumes {
            target,
            slice,
            write_images,
            deformable,
        } => {
            let options = commands::register_volumes::Options {
                slice: slice.clone(),
                write_images: *write_images,
                deformable: *deformable,
            };
            commands::register_volumes::run(&open(target)?, &options)?;
        }
        Commands::RegisterHiresPairs { target, transform, roi } => {
            commands::hires_pairs::run(&open(target)?, transform, roi)?;
        }
        Commands::ComputeDiffusionTransforms {
            target,
            transforms_name,
            alpha,
            method,
        } => {
            commands::diffusion::compute(&open(target)?, transforms_name, *alpha, *method)?;
        }
        Commands::ComposeTransformSeries {
            target,
            transforms_name,
            diffusion_name,
        } => {
            commands::diffusion::compose_series(&open(target)?, transforms_name, diffusion_name)?;
        }
        Commands::BuildVolumes {
            target,
            transforms_dir,
            hires_only,
        } => {
            commands::build_volumes::run(&open(target)?, transforms_dir, *hires_only)?;
        }
        Commands::RegisterMri { target, mri } => {
            commands::register_mri::run(&open(target)?, mri.as_deref())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_diffusion_arguments() {
        let cli = Cli::try_parse_from([
            "histostack",
            "--root",
            "/data",
            "compute-diffusion-transforms",
            "Rat24",
            "run1",
            "CenteredAffineTransform",
            "0.25",
            "--method",
            "linear",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/data"));
        match cli.command {
            Commands::ComputeDiffusionTransforms {
                target,
                transforms_name,
                alpha,
                method,
            } => {
                assert_eq!(target.data_set, "Rat24");
                assert_eq!(target.output_dir, "run1");
                assert_eq!(transforms_name, "CenteredAffineTransform");
                assert_eq!(alpha, 0.25);
                assert_eq!(method, DiffusionMethod::Linear);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_pairs_default_roi() {
        let cli = Cli::try_parse_from(["histostack", "register-hires-pairs", "Rat24", "run1", "CenteredAffineTransform"])
            .unwrap();
        match cli.command {
            Commands::RegisterHiresPairs { roi, .. } => assert_eq!(roi, "whole_heart"),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_missing_positional_rejected() {
        assert!(Cli::try_parse_from(["histostack", "build-volumes", "Rat24", "run1"]).is_err());
    }
}
