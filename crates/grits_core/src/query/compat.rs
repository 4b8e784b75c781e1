//! Well-formedness probe for the flat → `meta.events` metadata migration.
//!
//! # Invariants
//! - The store is well-formed when no record in the folder still carries a
//!   legacy flat `country`, `disease` or `species` field while lacking the
//!   per-event counterpart.
//! - The probe runs at most once per cached lifetime; `invalidate()` forces
//!   the next call to rescan.

use super::compiler::legacy_shape_filter;
use super::filter::Filter;
use crate::model::identity::EntityId;
use crate::repo::item_repo::{ItemRepository, RepoResult};
use log::info;
use std::sync::RwLock;
use std::time::Instant;

/// Filter selecting records that still need the metadata migration.
pub fn legacy_records_filter(folder_id: EntityId) -> Filter {
    legacy_shape_filter(folder_id)
}

/// Process-lifetime cache of the well-formedness probe.
#[derive(Debug, Default)]
pub struct MigrationState {
    well_formed: RwLock<Option<bool>>,
}

impl MigrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the folder is fully migrated, probing on first use.
    pub fn is_well_formed<R: ItemRepository + ?Sized>(
        &self,
        repo: &R,
        folder_id: EntityId,
    ) -> RepoResult<bool> {
        if let Some(cached) = self.cached() {
            return Ok(cached);
        }

        let started_at = Instant::now();
        let has_legacy = repo.exists(&legacy_records_filter(folder_id))?;
        let well_formed = !has_legacy;
        info!(
            "event=wellformed_probe module=query status=ok well_formed={} duration_ms={}",
            well_formed,
            started_at.elapsed().as_millis()
        );

        if let Ok(mut slot) = self.well_formed.write() {
            *slot = Some(well_formed);
        }
        Ok(well_formed)
    }

    /// Cached probe result, if any.
    pub fn cached(&self) -> Option<bool> {
        self.well_formed.read().ok().and_then(|slot| *slot)
    }

    /// Drops the cached result, e.g. after a migration run.
    pub fn invalidate(&self) {
        if let Ok(mut slot) = self.well_formed.write() {
            *slot = None;
        }
    }
}
