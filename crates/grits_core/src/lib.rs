//! Core domain logic for the GRITS incident search service.
//! This crate is the single source of truth for access and query invariants.

pub mod access;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod projection;
pub mod query;
pub mod repo;
pub mod service;

pub use access::{AccessPolicy, ApiKeyAccessPolicy, Caller, Grants, GroupAccessPolicy};
pub use bootstrap::{BootstrapError, BootstrapResolver, GritsContext};
pub use config::{AccessMode, ApiKeyTier, ConfigError, GritsConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::identity::{AccessLevel, EntityId, User};
pub use model::incident::{IncidentEvent, IncidentMeta, IncidentRecord, ItemId, PrivateMetadata};
pub use query::compiler::{QueryCompiler, SearchParams};
pub use query::{Filter, Page, Predicate, QueryError};
pub use repo::directory_repo::{DirectoryRepository, SqliteDirectoryRepository};
pub use repo::item_repo::{ItemRepository, RepoError, RepoResult, SqliteItemRepository};
pub use service::grits_service::{
    route_table, GritsError, GritsResult, GritsService, Route, SearchOutput,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
