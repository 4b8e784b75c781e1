//! Incident item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Execute structured filters against stored incident documents.
//! - Persist private-metadata updates.
//!
//! # Invariants
//! - Write paths must call `IncidentRecord::validate()` before SQL mutations.
//! - Read paths reject invalid persisted documents instead of masking them.
//! - A configured time limit interrupts long scans with `RepoError::Timeout`.

use crate::db::DbError;
use crate::model::incident::{
    IncidentMeta, IncidentRecord, IncidentValidationError, ItemId, PrivateMetadata,
};
use crate::query::sql::{render_page, render_where};
use crate::query::{Filter, Page, QueryError};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    items.id AS id,
    items.folder_id AS folder_id,
    items.name AS name,
    items.description AS description,
    items.meta AS meta,
    items.private_meta AS private_meta,
    items.created_at AS created_at,
    items.updated_at AS updated_at
FROM items";

/// SQLite VM instructions between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 10_000;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(IncidentValidationError),
    Query(QueryError),
    Db(DbError),
    NotFound(String),
    InvalidData(String),
    /// Query exceeded the configured execution ceiling.
    Timeout(Duration),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Timeout(limit) => write!(f, "query exceeded time limit of {limit:?}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) | Self::Timeout(_) => None,
        }
    }
}

impl From<IncidentValidationError> for RepoError {
    fn from(value: IncidentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for incident items.
pub trait ItemRepository {
    fn create_item(&self, record: &IncidentRecord) -> RepoResult<ItemId>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<IncidentRecord>>;
    /// Returns the page of records matching `filter`, in page order.
    fn find_items(&self, filter: &Filter, page: &Page) -> RepoResult<Vec<IncidentRecord>>;
    /// Returns whether any record matches `filter`.
    fn exists(&self, filter: &Filter) -> RepoResult<bool>;
    /// Replaces the whole `private` mapping of one item.
    fn update_private(&self, id: ItemId, private: &PrivateMetadata) -> RepoResult<()>;
}

/// SQLite-backed item repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
    time_limit: Option<Duration>,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            time_limit: None,
        }
    }

    /// Bounds every filter execution by `limit`.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    fn run_bounded<T>(&self, run: impl FnOnce() -> RepoResult<T>) -> RepoResult<T> {
        let Some(limit) = self.time_limit else {
            return run();
        };
        let Some(deadline) = Instant::now().checked_add(limit) else {
            return run();
        };

        self.conn
            .progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() >= deadline));
        let result = run();
        self.conn.progress_handler(0, None::<fn() -> bool>);

        result.map_err(|err| match err {
            RepoError::Db(DbError::Sqlite(ref inner)) if is_interrupted(inner) => {
                RepoError::Timeout(limit)
            }
            other => other,
        })
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, record: &IncidentRecord) -> RepoResult<ItemId> {
        record.validate()?;

        let meta = encode_json(&record.meta)?;
        let private = record.private.as_ref().map(encode_json).transpose()?;
        self.conn.execute(
            "INSERT INTO items (
                id,
                folder_id,
                name,
                description,
                meta,
                private_meta,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                record.id.to_string(),
                record.folder_id.to_string(),
                record.name.as_str(),
                record.description.as_str(),
                meta,
                private,
                record.created,
                record.updated,
            ],
        )?;

        Ok(record.id)
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<IncidentRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE items.id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn find_items(&self, filter: &Filter, page: &Page) -> RepoResult<Vec<IncidentRecord>> {
        let condition = render_where(filter)?;
        let tail = render_page(page)?;
        let sql = format!("{ITEM_SELECT_SQL} WHERE {}{}", condition.sql, tail.sql);
        let mut bind_values = condition.params;
        bind_values.extend(tail.params);

        self.run_bounded(|| {
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(parse_item_row(row)?);
            }
            Ok(records)
        })
    }

    fn exists(&self, filter: &Filter) -> RepoResult<bool> {
        let condition = render_where(filter)?;
        let sql = format!("SELECT EXISTS (SELECT 1 FROM items WHERE {});", condition.sql);

        self.run_bounded(|| {
            let found: i64 = self.conn.query_row(
                &sql,
                params_from_iter(condition.params),
                |row| row.get(0),
            )?;
            Ok(found == 1)
        })
    }

    fn update_private(&self, id: ItemId, private: &PrivateMetadata) -> RepoResult<()> {
        let encoded = encode_json(private)?;
        let changed = self.conn.execute(
            "UPDATE items
             SET
                private_meta = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?2;",
            params![encoded, id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(format!("item {id}")));
        }
        Ok(())
    }
}

fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::OperationInterrupted
    )
}

fn encode_json<T: serde::Serialize>(value: &T) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("unserializable document: {err}")))
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<IncidentRecord> {
    let id = parse_uuid(row, "id")?;
    let folder_id = parse_uuid(row, "folder_id")?;

    let meta_text: String = row.get("meta")?;
    let meta: IncidentMeta = serde_json::from_str(&meta_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid meta document for item {id}: {err}"))
    })?;

    let private = match row.get::<_, Option<String>>("private_meta")? {
        Some(text) => Some(serde_json::from_str::<PrivateMetadata>(&text).map_err(|err| {
            RepoError::InvalidData(format!("invalid private document for item {id}: {err}"))
        })?),
        None => None,
    };

    Ok(IncidentRecord {
        id,
        folder_id,
        name: row.get("name")?,
        description: row.get("description")?,
        meta,
        private,
        created: row.get("created_at")?,
        updated: row.get("updated_at")?,
    })
}

fn parse_uuid(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in items.{column}"))
    })
}
