//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate bootstrap, access checks, query compilation and
//!   repository calls into route-level operations.
//! - Keep transport layers decoupled from storage details.

pub mod grits_service;
