//! Registration of neighbouring HiRes slices.
//!
//! Slice `i` of the moving stack is registered onto slice `i + 1` of the
//! original stack; the result is stored under the pair name
//! `<basename i>_<basename i+1>`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use burn::tensor::backend::Backend;
use tracing::{info, warn};

use histostack_core::stack::initializers::{
    initialize_from_current_transforms, initialize_to_common_centre, set_moving_stack_center_with_fixed_stack,
    translate,
};
use histostack_core::transform::{ParametricTransform, Transform2D, TransformKind};
use histostack_core::Stack;
use histostack_io::{
    clear_dir, ensure_dir, load_stack_transforms, save_stack_transforms, write_stack_volumes, write_transform,
    Resolution, WHOLE_HEART_ROI,
};
use histostack_registration::{register_pair, scales_for, Observer};

use crate::progress::slice_bar;
use crate::session::Session;

pub fn run(session: &Session, transform: &str, roi: &str) -> Result<()> {
    let dirs = &session.dirs;
    let config = &session.config;
    let parameters = config.hi_res_pair_parameters();
    let basenames = session.basenames()?;
    ensure!(
        basenames.len() >= 2,
        "pair registration needs at least two slices, the image list has {}",
        basenames.len()
    );

    let mut original = session.read_stack(Resolution::HiRes, &basenames, roi)?;
    load_stack_transforms(&mut original, dirs.hi_res_transforms_dir().join(transform))?;
    translate(
        &mut original,
        config.roi_translation(roi)? - config.roi_translation(WHOLE_HEART_ROI)?,
    )?;
    original.update_volumes();

    let (mut fixed, mut moving) = pair_stacks(&original);
    initialize_to_common_centre(&mut fixed);
    initialize_to_common_centre(&mut moving);
    set_moving_stack_center_with_fixed_stack(&fixed, &mut moving);
    initialize_from_current_transforms(&mut moving, TransformKind::CenteredAffine)?;

    let scales = scales_for(moving.transform(0), &parameters.optimizer.scale);
    let intermediate_root = clear_dir(dirs.intermediate_transforms_dir(transform))?;
    let metric_dir = clear_dir(dirs.pair_metric_values_dir(transform))?;

    let bar = slice_bar(moving.len(), "pairs")?;
    for pair in 0..moving.len() {
        let name = moving.basename(pair).to_string();
        bar.set_message(name.clone());
        if !(original.image_exists(pair) && original.image_exists(pair + 1)) {
            warn!("pair {} has a missing slice, skipping", name);
            bar.inc(1);
            continue;
        }

        let mut engine = session.engine(parameters)?;
        engine.set_scales(scales.clone());
        engine.add_observer(intermediate_transform_writer(
            ensure_dir(intermediate_root.join(&name))?,
            moving.transform(pair).clone(),
        ));
        engine.add_observer(metric_value_writer(&metric_dir.join(&name))?);

        let outcome = register_pair(&mut engine, &fixed, &mut moving, pair)
            .with_context(|| format!("Failed to register pair {}", name))?;
        info!(
            "pair {}: value {} after {} iterations ({:?})",
            name, outcome.value, outcome.iterations, outcome.stop_condition
        );
        bar.inc(1);
    }
    bar.finish_with_message("pairs registered");

    save_stack_transforms(&moving, dirs.final_transforms_dir(transform))?;

    fixed.update_volumes();
    moving.update_volumes();
    let volumes_dir = dirs.hi_res_pairs_dir().join("Volumes").join(transform);
    write_stack_volumes(&fixed, &volumes_dir, "fixed")?;
    write_stack_volumes(&moving, &volumes_dir, "moving")?;
    Ok(())
}

/// `<a>_<b>` for every pair of neighbouring basenames.
pub fn pair_names(basenames: &[String]) -> Vec<String> {
    basenames.windows(2).map(|w| format!("{}_{}", w[0], w[1])).collect()
}

/// Fixed stack of slices `1..n` and moving stack of slices `0..n-1`, both
/// built from the resampled slices of `original`.
pub fn pair_stacks<B: Backend>(original: &Stack<B>) -> (Stack<B>, Stack<B>) {
    let n = original.len();
    let images = original.resampled_slices();
    let masks = original.resampled_masks();
    let spacing = *original.spacing();
    let size = original.resampler_size();

    let fixed = Stack::from_resampled(
        images[1..].to_vec(),
        masks[1..].to_vec(),
        original.basenames()[1..].to_vec(),
        spacing,
        original.device(),
    )
    .with_size(size);
    let moving = Stack::from_resampled(
        images[..n - 1].to_vec(),
        masks[..n - 1].to_vec(),
        pair_names(original.basenames()),
        spacing,
        original.device(),
    )
    .with_size(size);
    (fixed, moving)
}

/// Write the transform at every iteration to `dir/<iteration>`.
fn intermediate_transform_writer(dir: PathBuf, mut transform: Transform2D) -> Observer {
    Box::new(move |event| {
        let path = dir.join(event.iteration.to_string());
        let written = transform
            .set_parameters(event.parameters)
            .map_err(anyhow::Error::from)
            .and_then(|_| write_transform(&path, &transform));
        if let Err(err) = written {
            warn!("could not write {}: {:#}", path.display(), err);
        }
    })
}

/// Append each iteration's metric value to `path`, one per line.
fn metric_value_writer(path: &Path) -> Result<Observer> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let target = path.display().to_string();
    Ok(Box::new(move |event| {
        if let Err(err) = writeln!(writer, "{}", event.value).and_then(|_| writer.flush()) {
            warn!("could not write metric value to {}: {}", target, err);
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use histostack_core::image::Image;
    use histostack_core::spatial::{spacing, Spacing2};
    use histostack_registration::IterationEvent;
    use std::time::Duration;

    type TestBackend = NdArray<f32>;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pair_names() {
        assert_eq!(pair_names(&names(&["0001", "0002", "0004"])), names(&["0001_0002", "0002_0004"]));
        assert!(pair_names(&names(&["0001"])).is_empty());
    }

    #[test]
    fn test_pair_stacks_offset_by_one() {
        let device = Default::default();
        let slices = (0..3)
            .map(|i| Some(Image::from_pixels(vec![i as f32 * 10.0; 16], [4, 4], Spacing2::new(1.0, 1.0), &device)))
            .collect();
        let mut original = Stack::<TestBackend>::new(
            slices,
            names(&["a", "b", "c"]),
            Spacing2::new(1.0, 1.0),
            spacing([1.0, 1.0, 2.0]),
            &device,
        );
        original.update_volumes();

        let (fixed, moving) = pair_stacks(&original);
        assert_eq!(fixed.basenames(), &names(&["b", "c"])[..]);
        assert_eq!(moving.basenames(), &names(&["a_b", "b_c"])[..]);
        assert_eq!(fixed.resampler_size(), original.resampler_size());
        let fixed_first = fixed.original_image(0).unwrap().to_pixels();
        assert_eq!(fixed_first, original.resampled_slice(1).to_pixels());
        let moving_last = moving.original_image(1).unwrap().to_pixels();
        assert_eq!(moving_last, original.resampled_slice(1).to_pixels());
    }

    #[test]
    fn test_observers_write_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let transform = Transform2D::Translation {
            offset: histostack_core::spatial::Vector2::new(0.0, 0.0),
        };
        let mut transforms = intermediate_transform_writer(dir.path().to_path_buf(), transform);
        let values_path = dir.path().join("values");
        let mut values = metric_value_writer(&values_path)?;

        for (iteration, value) in [(0, 4.0), (1, 2.5)] {
            let event = IterationEvent {
                iteration,
                value,
                parameters: &[iteration as f64, -1.0],
                step_length: 1.0,
                elapsed: Duration::ZERO,
            };
            transforms(&event);
            values(&event);
        }

        assert_eq!(std::fs::read_to_string(&values_path)?, "4\n2.5\n");
        let last = histostack_io::read_transform(dir.path().join("1"))?;
        assert_eq!(last.parameters(), vec![1.0, -1.0]);
        Ok(())
    }
}
