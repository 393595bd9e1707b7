//! Security group scope conversion
//!
//! [`gate`] decides, [`commit`] applies.

pub mod commit;
pub mod gate;

pub use commit::{AbortReason, CandidateOutcome, ConflictGate, GateRun, Outcome};
pub use gate::{GateAnalysis, Resolution, ResolutionPlan, ScopeConflict, ScopeRequest};
