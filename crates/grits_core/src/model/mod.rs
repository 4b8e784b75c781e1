//! Domain model for incidents and the directory entities guarding them.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep one document shape for legacy (flat) and migrated (`events`)
//!   incident metadata.
//!
//! # Invariants
//! - Every stored object is identified by a stable UUID.
//! - Incidents are never deleted by core code.

pub mod identity;
pub mod incident;
