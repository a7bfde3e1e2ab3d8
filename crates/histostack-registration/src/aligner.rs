//! Slice-by-slice alignment of a moving stack onto a fixed stack.
//!
//! Each moving slice is registered against the matching resampled fixed
//! slice. When too little of the fixed mask maps inside the moving slice, the
//! fixed mask for that slice is shrunk and the registration retried.

use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use histostack_core::stack::Stack;
use histostack_core::transform::Transform2D;

use crate::engine::{RegistrationEngine, RegistrationOutcome, RegistrationRequest};
use crate::error::{RegistrationError, Result};

pub const DEFAULT_MAX_MASK_SHRINKS: u32 = 8;

/// How one slice of an alignment ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceState {
    /// The fixed or moving image is missing; nothing was registered.
    Skipped,
    Succeeded {
        outcome: RegistrationOutcome,
        mask_shrinks: u32,
    },
    /// Mask shrinking never produced enough samples. Only recorded when the
    /// aligner keeps going past failures.
    Failed { attempts: u32 },
}

/// Per-slice states of one [`StackAligner::update`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    pub states: Vec<SliceState>,
}

impl AlignmentReport {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, SliceState::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, SliceState::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SliceState::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&SliceState) -> bool) -> usize {
        self.states.iter().filter(|s| predicate(s)).count()
    }
}

/// Registers every moving slice onto its fixed counterpart.
#[derive(Debug, Clone, Copy)]
pub struct StackAligner {
    max_mask_shrinks: u32,
    fail_fast: bool,
}

impl Default for StackAligner {
    fn default() -> Self {
        Self {
            max_mask_shrinks: DEFAULT_MAX_MASK_SHRINKS,
            fail_fast: true,
        }
    }
}

impl StackAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_mask_shrinks(mut self, shrinks: u32) -> Self {
        self.max_mask_shrinks = shrinks;
        self
    }

    /// Record slices that exhaust their retries as `Failed` instead of
    /// returning `RetriesExhausted`.
    pub fn keep_going(mut self) -> Self {
        self.fail_fast = false;
        self
    }

    pub fn max_mask_shrinks(&self) -> u32 {
        self.max_mask_shrinks
    }

    /// Register every slice of `moving` onto the resampled slices of `fixed`.
    ///
    /// `fixed` must have built volumes. Successful transforms are stored in
    /// `moving`; shrunk masks stay shrunk in `fixed`.
    pub fn update<B: AutodiffBackend>(
        &self,
        fixed: &mut Stack<B>,
        moving: &mut Stack<B>,
        engine: &mut RegistrationEngine,
    ) -> Result<AlignmentReport> {
        if fixed.len() != moving.len() {
            return Err(RegistrationError::ShapeMismatch {
                expected: vec![fixed.len()],
                actual: vec![moving.len()],
            });
        }
        if fixed.volume().is_none() {
            return Err(RegistrationError::image_validation(
                "fixed stack volumes must be built before alignment",
            ));
        }

        let mut report = AlignmentReport::default();
        for slice in 0..moving.len() {
            info!("slice {} ({})", slice, moving.basename(slice));
            let state = self.align_slice(fixed, moving, engine, slice)?;
            report.states.push(state);
        }
        info!(
            "aligned {} slices, skipped {}, failed {}",
            report.succeeded(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    fn align_slice<B: AutodiffBackend>(
        &self,
        fixed: &mut Stack<B>,
        moving: &mut Stack<B>,
        engine: &mut RegistrationEngine,
        slice: usize,
    ) -> Result<SliceState> {
        if !fixed.image_exists(slice) || !moving.image_exists(slice) {
            warn!("skipping slice {} ({}): image missing", slice, moving.basename(slice));
            return Ok(SliceState::Skipped);
        }

        let mut mask_shrinks = 0;
        loop {
            let mut transform = moving.transform(slice).clone();
            let result = {
                let (Some(moving_image), Some(moving_mask)) =
                    (moving.original_image(slice), moving.original_mask(slice))
                else {
                    return Ok(SliceState::Skipped);
                };
                let request = RegistrationRequest::new(fixed.resampled_slice(slice), moving_image)
                    .with_fixed_mask(fixed.resampled_mask(slice))
                    .with_moving_mask(moving_mask);
                engine.run(&request, &mut transform)
            };

            match result {
                Ok(outcome) => {
                    store_transform(moving, slice, transform);
                    info!(
                        "slice {} done after {} iterations: {}",
                        slice, outcome.iterations, outcome.stop_condition
                    );
                    return Ok(SliceState::Succeeded { outcome, mask_shrinks });
                }
                Err(err) if err.needs_smaller_mask() => {
                    if mask_shrinks >= self.max_mask_shrinks {
                        if self.fail_fast {
                            return Err(RegistrationError::RetriesExhausted {
                                slice,
                                attempts: mask_shrinks,
                            });
                        }
                        warn!("giving up on slice {} after {} mask shrinks", slice, mask_shrinks);
                        return Ok(SliceState::Failed { attempts: mask_shrinks });
                    }
                    warn!("slice {}: {}; shrinking fixed mask", slice, err);
                    fixed.shrink_mask_slice(slice);
                    mask_shrinks += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn store_transform<B: AutodiffBackend>(stack: &mut Stack<B>, slice: usize, transform: Transform2D) {
    let mut transforms = stack.transforms().to_vec();
    transforms[slice] = transform;
    stack.set_transforms(transforms);
}

/// Register moving slice `slice` onto fixed slice `slice`, both at their
/// original resolution and with their original masks.
///
/// No mask shrinking: any failure is returned. On success the transform is
/// stored in `moving`.
pub fn register_pair<B: AutodiffBackend>(
    engine: &mut RegistrationEngine,
    fixed: &Stack<B>,
    moving: &mut Stack<B>,
    slice: usize,
) -> Result<RegistrationOutcome> {
    let (Some(fixed_image), Some(fixed_mask)) = (fixed.original_image(slice), fixed.original_mask(slice)) else {
        return Err(RegistrationError::image_validation(format!(
            "fixed slice {} ({}) is missing",
            slice,
            fixed.basename(slice)
        )));
    };
    let (Some(moving_image), Some(moving_mask)) = (moving.original_image(slice), moving.original_mask(slice)) else {
        return Err(RegistrationError::image_validation(format!(
            "moving slice {} ({}) is missing",
            slice,
            moving.basename(slice)
        )));
    };

    let mut transform = moving.transform(slice).clone();
    let request = RegistrationRequest::new(fixed_image, moving_image)
        .with_fixed_mask(fixed_mask)
        .with_moving_mask(moving_mask);
    let outcome = engine.run(&request, &mut transform)?;
    store_transform(moving, slice, transform);
    Ok(outcome)
}
