//! Slice stacks and their transform initialisers.

pub mod initializers;
#[allow(clippy::module_inception)]
mod stack;

pub use stack::{Stack, DEFAULT_MASK_SHRINK_FACTOR, MASK_FOREGROUND};
