// Trading strategy module
pub mod gap;

pub use gap::{decide, Decision, GapParams, InvariantViolation, LifecycleState};
