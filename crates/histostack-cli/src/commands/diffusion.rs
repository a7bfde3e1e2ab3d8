//! Smoothing the HiRes stack through its pair transforms.
//!
//! Every slice gets a diffusion transform that moves it part of the way
//! towards its neighbours; applying it after the slice's stack transform
//! gives the adjusted series.

use anyhow::{anyhow, ensure, Context, Result};
use clap::ValueEnum;
use tracing::info;

use histostack_core::spatial::Point2;
use histostack_core::transform::{Transform2D, TransformKind};
use histostack_io::{clear_dir, directory_contents, read_transform, write_transform};

use crate::session::Session;

/// How the two neighbour transforms of a middle slice are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DiffusionMethod {
    /// Compose the square roots of both transforms.
    #[default]
    Root,
    /// Blend matrices and offsets half way.
    Linear,
}

pub fn compute(session: &Session, transforms_name: &str, alpha: f64, method: DiffusionMethod) -> Result<()> {
    let dirs = &session.dirs;
    let pairs_dir = dirs.final_transforms_dir(transforms_name);
    let pairs = directory_contents(&pairs_dir)?
        .into_iter()
        .map(|name| {
            let transform = read_transform(pairs_dir.join(&name))?;
            Ok((name, transform))
        })
        .collect::<Result<Vec<_>>>()?;

    let diffusion = diffusion_transforms(&pairs, alpha, method)?;

    let out = clear_dir(dirs.diffusion_transforms_dir(transforms_name))?;
    for (slice, transform) in &diffusion {
        write_transform(out.join(slice), transform)?;
    }
    info!(
        "wrote {} diffusion transforms ({:?}, alpha {}) to {}",
        diffusion.len(),
        method,
        alpha,
        out.display()
    );
    Ok(())
}

/// Adjust each middle stage transform with the diffusion transform of its
/// slice. The bottom and top slices keep their stage transform.
pub fn compose_series(session: &Session, transforms_name: &str, diffusion_name: &str) -> Result<()> {
    let dirs = &session.dirs;
    let stage_dir = dirs.hi_res_transforms_dir().join(transforms_name);
    let diffusion_dir = dirs.diffusion_transforms_dir(diffusion_name);
    let out = clear_dir(dirs.adjusted_transforms_dir(diffusion_name))?;

    let basenames = session.basenames()?;
    let last = basenames.len().saturating_sub(1);
    for (slice, basename) in basenames.iter().enumerate() {
        let stage = read_transform(stage_dir.join(basename))?;
        let transform = if slice == 0 || slice == last {
            stage
        } else {
            let diffusion = read_transform(diffusion_dir.join(basename))
                .with_context(|| format!("no diffusion transform for slice {}", basename))?;
            adjust_transform(&stage, &diffusion)?
        };
        write_transform(out.join(basename), &transform)?;
    }
    info!(
        "adjusted {} transforms into {}",
        basenames.len().saturating_sub(2),
        out.display()
    );
    Ok(())
}

/// The affine transform applying `stage` first, then `diffusion`.
pub fn adjust_transform(stage: &Transform2D, diffusion: &Transform2D) -> Result<Transform2D> {
    Ok(stage
        .reinitialize_as(TransformKind::Affine)?
        .compose(diffusion, false)?)
}

/// Split `<a>_<b>` into its two slice basenames.
fn split_pair(name: &str) -> Result<(&str, &str)> {
    name.split_once('_')
        .ok_or_else(|| anyhow!("pair transform name '{}' is not of the form <a>_<b>", name))
}

/// Per-slice diffusion transforms from the sorted pair transforms.
///
/// For `n` pairs this yields `n + 1` transforms named by slice: the bottom
/// slice, every slice shared by two consecutive pairs, then the top slice.
pub fn diffusion_transforms(
    pairs: &[(String, Transform2D)],
    alpha: f64,
    method: DiffusionMethod,
) -> Result<Vec<(String, Transform2D)>> {
    let (Some((first_name, first)), Some((last_name, last))) = (pairs.first(), pairs.last()) else {
        return Err(anyhow!("no pair transforms to diffuse"));
    };
    let identity = Transform2D::identity(TransformKind::CenteredAffine, Point2::origin());

    let mut diffusion = Vec::with_capacity(pairs.len() + 1);
    let (bottom, _) = split_pair(first_name)?;
    diffusion.push((bottom.to_string(), Transform2D::interpolate(&identity, first, alpha)?));

    for window in pairs.windows(2) {
        let (below_name, below_pair) = &window[0];
        let (above_name, above) = &window[1];
        let (_, shared) = split_pair(below_name)?;
        let (next, _) = split_pair(above_name)?;
        ensure!(
            shared == next,
            "pairs {} and {} do not share a slice",
            below_name,
            above_name
        );

        let below = below_pair.inverse()?;
        let mean = match method {
            DiffusionMethod::Root => below.square_root()?.compose(&above.square_root()?, false)?,
            DiffusionMethod::Linear => Transform2D::interpolate(&below, above, 0.5)?,
        };
        diffusion.push((shared.to_string(), Transform2D::interpolate(&identity, &mean, 2.0 * alpha)?));
    }

    let (_, top) = split_pair(last_name)?;
    diffusion.push((top.to_string(), Transform2D::interpolate(&identity, &last.inverse()?, alpha)?));
    Ok(diffusion)
}
