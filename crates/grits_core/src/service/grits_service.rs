//! GRITS search and private-metadata use cases.
//!
//! # Responsibility
//! - Back the `/grits` routes: search, id lookups, private metadata writes.
//! - Resolve the directory context, check access, compile and run queries,
//!   and shape results for the caller.
//!
//! # Invariants
//! - Every operation resolves the bootstrap context before anything else.
//! - Search results are redacted unless the caller has privileged read.
//! - A failed private-metadata write leaves the stored record unchanged.

use crate::access::{
    AccessError, AccessEvaluator, AccessPolicy, ApiKeyAccessPolicy, Caller, GroupAccessPolicy,
};
use crate::bootstrap::{BootstrapError, BootstrapResolver, GritsContext};
use crate::config::{AccessMode, GritsConfig};
use crate::model::identity::{AccessLevel, EntityId};
use crate::model::incident::{IncidentRecord, PrivateMetadata};
use crate::projection::{redact_records, to_feature_collection};
use crate::query::compat::MigrationState;
use crate::query::compiler::{QueryCompiler, SearchParams};
use crate::query::QueryError;
use crate::repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
use crate::repo::item_repo::{ItemRepository, RepoError, SqliteItemRepository};
use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Message returned for unknown or malformed item ids.
pub const INVALID_ITEM_ID_MESSAGE: &str = "ID was invalid";

/// One HTTP route served by [`GritsService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Route {
    pub method: &'static str,
    pub path: &'static str,
    pub operation: &'static str,
}

const ROUTES: &[Route] = &[
    Route {
        method: "GET",
        path: "/grits",
        operation: "search",
    },
    Route {
        method: "GET",
        path: "/grits/folderId",
        operation: "folder_id",
    },
    Route {
        method: "GET",
        path: "/grits/groupId",
        operation: "group_id",
    },
    Route {
        method: "GET",
        path: "/grits/privilegedId",
        operation: "privileged_group_id",
    },
    Route {
        method: "GET",
        path: "/grits/collectionId",
        operation: "collection_id",
    },
    Route {
        method: "PUT",
        path: "/grits/private/:id",
        operation: "set_private_metadata",
    },
];

/// Method/path pairs backed by the service operations.
pub fn route_table() -> &'static [Route] {
    ROUTES
}

#[derive(Debug)]
pub enum GritsError {
    /// Deployment is not set up (missing owner account).
    Configuration(String),
    AccessDenied(String),
    Validation(String),
    NotFound(String),
    Repo(RepoError),
}

impl GritsError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) => 405,
            Self::AccessDenied(_) => 403,
            Self::Validation(_) | Self::NotFound(_) => 400,
            Self::Repo(_) => 500,
        }
    }
}

impl Display for GritsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "configuration error: {message}"),
            Self::AccessDenied(message) => write!(f, "{message}"),
            Self::Validation(message) => write!(f, "validation error: {message}"),
            Self::NotFound(message) => write!(f, "{message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GritsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for GritsError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Query(err) => Self::Validation(err.to_string()),
            RepoError::Validation(err) => Self::Validation(err.to_string()),
            RepoError::NotFound(_) => Self::NotFound(INVALID_ITEM_ID_MESSAGE.to_string()),
            other => Self::Repo(other),
        }
    }
}

impl From<QueryError> for GritsError {
    fn from(value: QueryError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<BootstrapError> for GritsError {
    fn from(value: BootstrapError) -> Self {
        match value {
            BootstrapError::MissingOwner(_) => Self::Configuration(value.to_string()),
            BootstrapError::Repo(err) => Self::Repo(err),
        }
    }
}

impl From<AccessError> for GritsError {
    fn from(value: AccessError) -> Self {
        match value {
            AccessError::Denied { .. } => Self::AccessDenied(value.to_string()),
            AccessError::Repo(err) => Self::Repo(err),
        }
    }
}

pub type GritsResult<T> = Result<T, GritsError>;

/// Search response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchOutput {
    Records(Vec<IncidentRecord>),
    FeatureCollection(Value),
}

impl SearchOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::FeatureCollection(collection) => collection
                .get("features")
                .and_then(Value::as_array)
                .map_or(0, Vec::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Use-case facade over the item and directory repositories.
pub struct GritsService<I: ItemRepository, D: DirectoryRepository> {
    items: I,
    directory: D,
    resolver: BootstrapResolver,
    migration: MigrationState,
    access: AccessEvaluator,
}

impl<'conn> GritsService<SqliteItemRepository<'conn>, SqliteDirectoryRepository<'conn>> {
    /// Builds a service over one SQLite connection.
    pub fn open(conn: &'conn Connection, config: &GritsConfig) -> Self {
        Self::new(
            config,
            SqliteItemRepository::new(conn).with_time_limit(config.response_timeout),
            SqliteDirectoryRepository::new(conn),
        )
    }
}

impl<I: ItemRepository, D: DirectoryRepository> GritsService<I, D> {
    /// Creates a service; the access policy follows `config.access_mode`.
    pub fn new(config: &GritsConfig, items: I, directory: D) -> Self {
        let policy: Box<dyn AccessPolicy> = match config.access_mode {
            AccessMode::Groups => Box::new(GroupAccessPolicy),
            AccessMode::ApiKeys => Box::new(ApiKeyAccessPolicy::new(config.api_keys.clone())),
        };
        Self::with_policy(config, items, directory, policy)
    }

    pub fn with_policy(
        config: &GritsConfig,
        items: I,
        directory: D,
        policy: Box<dyn AccessPolicy>,
    ) -> Self {
        Self {
            items,
            directory,
            resolver: BootstrapResolver::new(config),
            migration: MigrationState::new(),
            access: AccessEvaluator::new(policy),
        }
    }

    /// `GET /grits`.
    ///
    /// # Errors
    /// - `Configuration` when the owner account is missing.
    /// - `AccessDenied` without base `Read`.
    /// - `Validation` for malformed parameters.
    pub fn search(
        &self,
        caller: &Caller,
        query: &HashMap<String, String>,
    ) -> GritsResult<SearchOutput> {
        let started_at = Instant::now();
        let context = self.authorize(caller, AccessLevel::Read, false)?;

        let params = SearchParams::from_query(query)?;
        let well_formed = self.migration.is_well_formed(&self.items, context.folder.id)?;
        let filter = QueryCompiler::new(context.folder.id).build_filter(&params, !well_formed)?;
        debug!(
            "event=grits_search module=service status=start filter={}",
            filter.to_document()
        );

        let mut records = match self.items.find_items(&filter, &params.page()) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    "event=grits_search module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };
        let result_count = records.len();

        let privileged = self.access.probe(
            caller,
            &context,
            &self.directory,
            AccessLevel::Read,
            true,
        );
        redact_records(&mut records, privileged);

        let output = if params.geojson {
            SearchOutput::FeatureCollection(to_feature_collection(&records))
        } else {
            SearchOutput::Records(records)
        };

        info!(
            "event=grits_search module=service status=ok duration_ms={} results={} legacy_compat={} geojson={}",
            started_at.elapsed().as_millis(),
            result_count,
            !well_formed,
            params.geojson
        );
        Ok(output)
    }

    /// `GET /grits/folderId`.
    pub fn folder_id(&self, caller: &Caller) -> GritsResult<EntityId> {
        Ok(self.authorize(caller, AccessLevel::Read, false)?.folder.id)
    }

    /// `GET /grits/groupId`.
    pub fn group_id(&self, caller: &Caller) -> GritsResult<EntityId> {
        Ok(self.authorize(caller, AccessLevel::Read, false)?.base_group.id)
    }

    /// `GET /grits/privilegedId`; requires privileged membership.
    pub fn privileged_group_id(&self, caller: &Caller) -> GritsResult<EntityId> {
        Ok(self
            .authorize(caller, AccessLevel::Read, true)?
            .privileged_group
            .id)
    }

    /// `GET /grits/collectionId`.
    pub fn collection_id(&self, caller: &Caller) -> GritsResult<EntityId> {
        Ok(self.authorize(caller, AccessLevel::Read, false)?.collection.id)
    }

    /// `PUT /grits/private/:id`.
    ///
    /// `body` must be a JSON object; a `null` value deletes that key.
    /// Returns the updated record.
    ///
    /// # Errors
    /// - `AccessDenied` without privileged `Write`.
    /// - `Validation` when `body` is not a JSON object.
    /// - `NotFound` when `item_id` names no record in the GRITS folder.
    pub fn set_private_metadata(
        &self,
        caller: &Caller,
        item_id: &str,
        body: &str,
    ) -> GritsResult<IncidentRecord> {
        let context = self.authorize(caller, AccessLevel::Write, true)?;

        let updates = parse_private_body(body)?;
        let id = Uuid::parse_str(item_id.trim())
            .map_err(|_| GritsError::NotFound(INVALID_ITEM_ID_MESSAGE.to_string()))?;
        let mut record = self
            .items
            .get_item(id)?
            .filter(|record| record.folder_id == context.folder.id)
            .ok_or_else(|| GritsError::NotFound(INVALID_ITEM_ID_MESSAGE.to_string()))?;

        let keys = updates.len();
        record.apply_private_updates(updates);
        let private = record.private.clone().unwrap_or_default();
        self.items.update_private(id, &private)?;

        info!(
            "event=private_metadata_write module=service status=ok item_id={} keys={}",
            id, keys
        );
        Ok(record)
    }

    /// Drops cached bootstrap and migration state.
    pub fn invalidate_caches(&self) {
        self.resolver.invalidate();
        self.migration.invalidate();
    }

    fn authorize(
        &self,
        caller: &Caller,
        required: AccessLevel,
        needs_privileged: bool,
    ) -> GritsResult<GritsContext> {
        let context = self.resolver.resolve(&self.directory)?;
        self.access.check_access(
            caller,
            &context,
            &self.directory,
            required,
            needs_privileged,
        )?;
        Ok(context)
    }
}

fn parse_private_body(body: &str) -> GritsResult<PrivateMetadata> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GritsError::Validation(
            "private metadata must be a JSON object".to_string(),
        )),
        Err(err) => Err(GritsError::Validation(format!(
            "private metadata must be valid JSON: {err}"
        ))),
    }
}
