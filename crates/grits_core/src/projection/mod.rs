//! Result shaping for search responses.
//!
//! # Invariants
//! - Records returned to non-privileged callers never carry `private`.
//! - GeoJSON properties only include `private` keys for privileged callers.

pub mod geojson;

use crate::model::incident::IncidentRecord;

pub use geojson::{to_feature, to_feature_collection};

/// Removes private metadata unless the caller has privileged read.
pub fn redact_records(records: &mut [IncidentRecord], privileged: bool) {
    if privileged {
        return;
    }
    for record in records.iter_mut() {
        record.redact_private();
    }
}
