//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Item writes must enforce `IncidentRecord::validate()` before persistence.
//! - Directory find-or-create operations are atomic under concurrent first use.
//! - Repository APIs return semantic errors (`NotFound`, `Timeout`) in
//!   addition to DB transport errors.

pub mod directory_repo;
pub mod item_repo;
