//! Staged HiRes-to-LoRes stack registration.

use anyhow::Result;
use tracing::info;

use histostack_core::stack::initializers::{
    apply_adjustments, initialize_bspline_from_bulk, initialize_from_current_transforms, initialize_to_common_centre,
    initialize_with_translation, set_moving_stack_center_with_fixed_stack,
};
use histostack_core::transform::TransformKind;
use histostack_core::Stack;
use histostack_io::{
    load_adjustments, save_number_of_times_too_big, save_stack_transforms, save_vector_to_files, write_stack_volumes,
    Resolution, WHOLE_HEART_ROI,
};
use histostack_registration::{scales_for, AlignmentReport, RegistrationEngine, SliceState, StackAligner};

use crate::progress::stage_spinner;
use crate::session::{PipelineBackend, Session};

/// Linear stages, each starting from the previous stage's transforms.
pub const LINEAR_STAGES: [TransformKind; 3] = [
    TransformKind::CenteredRigid2D,
    TransformKind::CenteredSimilarity2D,
    TransformKind::CenteredAffine,
];

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub slice: Option<String>,
    pub write_images: bool,
    pub deformable: bool,
}

pub fn run(session: &Session, options: &Options) -> Result<()> {
    let dirs = &session.dirs;
    let config = &session.config;
    let basenames = match &options.slice {
        Some(basename) => vec![basename.clone()],
        None => session.basenames()?,
    };

    let mut lo_res = session.read_stack(Resolution::LoRes, &basenames, WHOLE_HEART_ROI)?;
    let mut hi_res = session.read_stack(Resolution::HiRes, &basenames, WHOLE_HEART_ROI)?;

    initialize_with_translation(&mut lo_res, config.roi_translation(WHOLE_HEART_ROI)?);
    let adjustments = load_adjustments(dirs.lo_res_adjustments_dir())?;
    apply_adjustments(&mut lo_res, &adjustments)?;
    lo_res.update_volumes();
    save_stack_transforms(&lo_res, dirs.lo_res_transforms_dir())?;
    if options.write_images {
        write_stack_volumes(&lo_res, dirs.volumes_dir(), "LoResStack")?;
    }

    initialize_to_common_centre(&mut hi_res);
    set_moving_stack_center_with_fixed_stack(&lo_res, &mut hi_res);

    let mut engine = session.engine(&config.registration)?;
    let aligner = StackAligner::new();
    for kind in LINEAR_STAGES {
        initialize_from_current_transforms(&mut hi_res, kind)?;
        run_stage(session, &aligner, &mut engine, &mut lo_res, &mut hi_res, kind, options.write_images)?;
    }

    if options.deformable {
        initialize_bspline_from_bulk(&lo_res, &mut hi_res, config.registration.bspline_grid_size)?;
        run_stage(
            session,
            &aligner,
            &mut engine,
            &mut lo_res,
            &mut hi_res,
            TransformKind::BSplineDeformable,
            options.write_images,
        )?;
    }

    // masks shrunk during alignment are rebuilt at full size
    lo_res.update_volumes();
    save_number_of_times_too_big(&lo_res, dirs.number_of_times_too_big_dir())?;
    info!("registered {} slices", basenames.len());
    Ok(())
}

fn run_stage(
    session: &Session,
    aligner: &StackAligner,
    engine: &mut RegistrationEngine,
    lo_res: &mut Stack<PipelineBackend>,
    hi_res: &mut Stack<PipelineBackend>,
    kind: TransformKind,
    write_images: bool,
) -> Result<()> {
    let dirs = &session.dirs;
    // every slice shares the kind and, for B-splines, the grid
    engine.set_scales(scales_for(hi_res.transform(0), &session.config.registration.optimizer.scale));

    let spinner = stage_spinner(&format!("{} stage, {} slices", kind, hi_res.len()))?;
    let report = aligner.update(lo_res, hi_res, engine)?;
    spinner.finish_with_message(format!(
        "{}: {} aligned, {} skipped",
        kind,
        report.succeeded(),
        report.skipped()
    ));

    save_stack_transforms(hi_res, dirs.hi_res_stage_dir(kind))?;
    save_vector_to_files(&final_metric_values(&report), dirs.metric_values_dir().join(kind.name()), hi_res.basenames())?;

    if write_images {
        hi_res.update_volumes();
        write_stack_volumes(hi_res, dirs.volumes_dir(), &format!("HiRes_{}", kind.name()))?;
    }
    Ok(())
}

/// Final metric value per slice; NaN where nothing was registered.
fn final_metric_values(report: &AlignmentReport) -> Vec<f64> {
    report
        .states
        .iter()
        .map(|state| match state {
            SliceState::Succeeded { outcome, .. } => outcome.value,
            _ => f64::NAN,
        })
        .collect()
}
