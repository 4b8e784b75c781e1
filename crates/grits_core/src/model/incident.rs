//! Incident record domain model.
//!
//! # Responsibility
//! - Define the canonical epidemiological incident document.
//! - Carry both metadata shapes seen in stored data: legacy flat fields
//!   (`meta.country`, `meta.disease`, `meta.species`) and migrated
//!   per-event fields (`meta.events[*]`).
//!
//! # Invariants
//! - `name` is the stable external identifier and is never empty.
//! - `meta.date` is Unix epoch milliseconds (UTC).
//! - `private` is only ever visible to privileged readers.

use crate::model::identity::EntityId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Internal item identifier (distinct from the external `name`).
pub type ItemId = Uuid;

/// Arbitrary key → scalar mapping, visible only to privileged readers.
pub type PrivateMetadata = Map<String, Value>;

/// One epidemiological event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(rename = "folderId")]
    pub folder_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub meta: IncidentMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<PrivateMetadata>,
    /// Epoch milliseconds.
    pub created: i64,
    /// Epoch milliseconds.
    pub updated: i64,
}

/// Public incident metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentMeta {
    /// Epoch milliseconds.
    pub date: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<IncidentEvent>>,
    /// Everything else (`diagnosis`, `symptoms`, feed-specific keys).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sub-record of `meta.events`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diseases: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A field stored either as one string or as a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl IncidentEvent {
    /// Returns `[lon, lat]` when the event carries its own coordinates.
    pub fn coordinates(&self) -> Option<[f64; 2]> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) => Some([lon, lat]),
            _ => None,
        }
    }
}

impl IncidentMeta {
    /// Creates metadata with the required keys and nothing else.
    pub fn new(date: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            date,
            latitude,
            longitude,
            country: None,
            feed: None,
            disease: None,
            species: None,
            description: None,
            link: None,
            rating: None,
            place_id: None,
            place_name: None,
            events: None,
            extra: Map::new(),
        }
    }
}

impl IncidentRecord {
    /// Creates a record with a generated internal id.
    pub fn new(
        folder_id: EntityId,
        name: impl Into<String>,
        description: impl Into<String>,
        meta: IncidentMeta,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            folder_id,
            name: name.into(),
            description: description.into(),
            meta,
            private: None,
            created: now,
            updated: now,
        }
    }

    /// Checks document invariants before persistence.
    pub fn validate(&self) -> Result<(), IncidentValidationError> {
        if self.name.trim().is_empty() {
            return Err(IncidentValidationError::EmptyName);
        }
        check_latitude(self.meta.latitude)?;
        check_longitude(self.meta.longitude)?;
        for event in self.meta.events.iter().flatten() {
            if let Some(lat) = event.latitude {
                check_latitude(lat)?;
            }
            if let Some(lon) = event.longitude {
                check_longitude(lon)?;
            }
        }
        Ok(())
    }

    /// Merges private metadata updates; a JSON `null` deletes the key.
    ///
    /// Deleting an absent key is a no-op.
    pub fn apply_private_updates(&mut self, updates: PrivateMetadata) {
        let private = self.private.get_or_insert_with(Map::new);
        for (key, value) in updates {
            if value.is_null() {
                private.remove(&key);
            } else {
                private.insert(key, value);
            }
        }
    }

    /// Drops the `private` mapping for non-privileged readers.
    pub fn redact_private(&mut self) {
        self.private = None;
    }
}

fn check_latitude(value: f64) -> Result<(), IncidentValidationError> {
    if !value.is_finite() || !(-90.0..=90.0).contains(&value) {
        return Err(IncidentValidationError::LatitudeOutOfRange(value));
    }
    Ok(())
}

fn check_longitude(value: f64) -> Result<(), IncidentValidationError> {
    if !value.is_finite() || !(-180.0..=180.0).contains(&value) {
        return Err(IncidentValidationError::LongitudeOutOfRange(value));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncidentValidationError {
    EmptyName,
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
}

impl Display for IncidentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "incident name must not be empty"),
            Self::LatitudeOutOfRange(value) => {
                write!(f, "latitude {value} is outside [-90, 90]")
            }
            Self::LongitudeOutOfRange(value) => {
                write!(f, "longitude {value} is outside [-180, 180]")
            }
        }
    }
}

impl Error for IncidentValidationError {}
