//! Caller authorization against the base and privileged GRITS groups.
//!
//! # Responsibility
//! - Map a caller onto membership levels through an [`AccessPolicy`].
//! - Apply one decision table regardless of the policy in use.
//!
//! # Invariants
//! - A privileged grant that satisfies the required level always allows.
//! - Without one, privileged requests are denied and plain requests need
//!   a satisfying base grant.

pub mod evaluator;
pub mod policy;

pub use evaluator::{AccessDecision, AccessError, AccessEvaluator};
pub use policy::{AccessPolicy, ApiKeyAccessPolicy, Caller, Grants, GroupAccessPolicy};
