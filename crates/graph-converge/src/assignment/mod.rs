//! Assignment reconciliation: targets, their wire form and the replace-all
//! reconciler.

pub mod reconciler;
pub mod target;
pub mod wire;

pub use reconciler::{carry_unrecognized, diff, resolve, AssignmentDiff, AssignmentReconciler};
pub use target::{Assignment, AssignmentFilter, AssignmentSpec, AssignmentTarget, FilterMode};
