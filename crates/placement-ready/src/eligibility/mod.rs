//! Eligibility rules and the cascade that keeps stored flags in step with them.

pub mod cascade;
pub mod domain;
pub mod evaluation;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use cascade::{CascadeError, CascadeFailure, CascadeReport};
pub use domain::{
    Criteria, NewStudent, Profile, ProfileFields, ProfileSubmission, RequestContext, Role,
    StudentAccount, StudentId, StudentWithProfile, ValidationError,
};
pub use evaluation::{assess, evaluate, Assessment, Requirement, RequirementCheck};
pub use router::placement_router;
pub use service::{EligibilityStatus, Missing, PlacementError, PlacementService};
