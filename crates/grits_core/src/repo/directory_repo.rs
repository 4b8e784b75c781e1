//! Directory repository: users, access groups, collections and folders.
//!
//! # Responsibility
//! - Look up directory entities by their natural keys.
//! - Provision entities atomically (`find_or_create_*`).
//! - Store group memberships and per-resource group grants.
//!
//! # Invariants
//! - `find_or_create_*` never yields two rows for one natural key, even
//!   when two connections race on first use.
//! - Levels are persisted as `AccessLevel::as_db` codes.

use crate::model::identity::{
    AccessLevel, Collection, EntityId, Folder, Group, NewEntity, User,
};
use crate::repo::item_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const USER_SELECT_SQL: &str = "SELECT id, login, email, is_admin FROM users";
const GROUP_SELECT_SQL: &str =
    "SELECT id, name, description, creator_id, is_public FROM access_groups";
const COLLECTION_SELECT_SQL: &str =
    "SELECT id, name, description, creator_id, is_public FROM collections";
const FOLDER_SELECT_SQL: &str =
    "SELECT id, collection_id, name, description, creator_id, is_public FROM folders";

/// Resource that can carry group access grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRef {
    Collection(EntityId),
    Folder(EntityId),
}

impl ResourceRef {
    fn kind(self) -> &'static str {
        match self {
            Self::Collection(_) => "collection",
            Self::Folder(_) => "folder",
        }
    }

    fn id(self) -> EntityId {
        match self {
            Self::Collection(id) | Self::Folder(id) => id,
        }
    }
}

/// Repository interface for directory entities.
pub trait DirectoryRepository {
    fn create_user(&self, user: &User) -> RepoResult<()>;
    fn find_user_by_login(&self, login: &str) -> RepoResult<Option<User>>;
    fn find_group_by_name(&self, name: &str) -> RepoResult<Option<Group>>;
    /// Returns the group and whether this call created it.
    fn find_or_create_group(&self, request: &NewEntity<'_>) -> RepoResult<(Group, bool)>;
    /// Inserts or raises/lowers a membership to exactly `level`.
    fn add_group_member(
        &self,
        group_id: EntityId,
        user_id: EntityId,
        level: AccessLevel,
    ) -> RepoResult<()>;
    fn member_level(&self, group_id: EntityId, user_id: EntityId)
        -> RepoResult<Option<AccessLevel>>;
    fn find_or_create_collection(&self, request: &NewEntity<'_>)
        -> RepoResult<(Collection, bool)>;
    fn find_or_create_folder(
        &self,
        collection_id: EntityId,
        request: &NewEntity<'_>,
    ) -> RepoResult<(Folder, bool)>;
    fn get_folder(&self, id: EntityId) -> RepoResult<Option<Folder>>;
    /// Inserts or replaces the grant of `group_id` on `resource`.
    fn grant_group_access(
        &self,
        resource: ResourceRef,
        group_id: EntityId,
        level: AccessLevel,
    ) -> RepoResult<()>;
    fn group_access_level(
        &self,
        resource: ResourceRef,
        group_id: EntityId,
    ) -> RepoResult<Option<AccessLevel>>;
}

/// SQLite-backed directory repository.
pub struct SqliteDirectoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDirectoryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DirectoryRepository for SqliteDirectoryRepository<'_> {
    fn create_user(&self, user: &User) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO users (id, login, email, is_admin) VALUES (?1, ?2, ?3, ?4);",
            params![
                user.id.to_string(),
                user.login.as_str(),
                user.email.as_deref(),
                i64::from(user.admin),
            ],
        )?;
        Ok(())
    }

    fn find_user_by_login(&self, login: &str) -> RepoResult<Option<User>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE login = ?1;"),
                [login],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_group_by_name(&self, name: &str) -> RepoResult<Option<Group>> {
        self.conn
            .query_row(
                &format!("{GROUP_SELECT_SQL} WHERE name = ?1;"),
                [name],
                |row| Ok(parse_group_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_or_create_group(&self, request: &NewEntity<'_>) -> RepoResult<(Group, bool)> {
        let created = self.conn.execute(
            "INSERT INTO access_groups (id, name, description, creator_id, is_public)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (name) DO NOTHING;",
            params![
                Uuid::new_v4().to_string(),
                request.name,
                request.description,
                request.creator_id.to_string(),
                i64::from(request.public),
            ],
        )? == 1;

        let group = self
            .find_group_by_name(request.name)?
            .ok_or_else(|| RepoError::NotFound(format!("group {}", request.name)))?;
        Ok((group, created))
    }

    fn add_group_member(
        &self,
        group_id: EntityId,
        user_id: EntityId,
        level: AccessLevel,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO group_members (group_id, user_id, level)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (group_id, user_id) DO UPDATE SET level = excluded.level;",
            params![group_id.to_string(), user_id.to_string(), level.as_db()],
        )?;
        Ok(())
    }

    fn member_level(
        &self,
        group_id: EntityId,
        user_id: EntityId,
    ) -> RepoResult<Option<AccessLevel>> {
        let code = self
            .conn
            .query_row(
                "SELECT level FROM group_members WHERE group_id = ?1 AND user_id = ?2;",
                params![group_id.to_string(), user_id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        code.map(|code| parse_level(code, "group_members.level"))
            .transpose()
    }

    fn find_or_create_collection(
        &self,
        request: &NewEntity<'_>,
    ) -> RepoResult<(Collection, bool)> {
        let created = self.conn.execute(
            "INSERT INTO collections (id, name, description, creator_id, is_public)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (name) DO NOTHING;",
            params![
                Uuid::new_v4().to_string(),
                request.name,
                request.description,
                request.creator_id.to_string(),
                i64::from(request.public),
            ],
        )? == 1;

        let collection = self
            .conn
            .query_row(
                &format!("{COLLECTION_SELECT_SQL} WHERE name = ?1;"),
                [request.name],
                |row| Ok(parse_collection_row(row)),
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| RepoError::NotFound(format!("collection {}", request.name)))?;
        Ok((collection, created))
    }

    fn find_or_create_folder(
        &self,
        collection_id: EntityId,
        request: &NewEntity<'_>,
    ) -> RepoResult<(Folder, bool)> {
        let created = self.conn.execute(
            "INSERT INTO folders (id, collection_id, name, description, creator_id, is_public)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (collection_id, name) DO NOTHING;",
            params![
                Uuid::new_v4().to_string(),
                collection_id.to_string(),
                request.name,
                request.description,
                request.creator_id.to_string(),
                i64::from(request.public),
            ],
        )? == 1;

        let folder = self
            .conn
            .query_row(
                &format!("{FOLDER_SELECT_SQL} WHERE collection_id = ?1 AND name = ?2;"),
                params![collection_id.to_string(), request.name],
                |row| Ok(parse_folder_row(row)),
            )
            .optional()?
            .transpose()?
            .ok_or_else(|| RepoError::NotFound(format!("folder {}", request.name)))?;
        Ok((folder, created))
    }

    fn get_folder(&self, id: EntityId) -> RepoResult<Option<Folder>> {
        self.conn
            .query_row(
                &format!("{FOLDER_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_folder_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn grant_group_access(
        &self,
        resource: ResourceRef,
        group_id: EntityId,
        level: AccessLevel,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO resource_group_access (resource_kind, resource_id, group_id, level)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (resource_kind, resource_id, group_id)
             DO UPDATE SET level = excluded.level;",
            params![
                resource.kind(),
                resource.id().to_string(),
                group_id.to_string(),
                level.as_db(),
            ],
        )?;
        Ok(())
    }

    fn group_access_level(
        &self,
        resource: ResourceRef,
        group_id: EntityId,
    ) -> RepoResult<Option<AccessLevel>> {
        let code = self
            .conn
            .query_row(
                "SELECT level FROM resource_group_access
                 WHERE resource_kind = ?1 AND resource_id = ?2 AND group_id = ?3;",
                params![
                    resource.kind(),
                    resource.id().to_string(),
                    group_id.to_string()
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        code.map(|code| parse_level(code, "resource_group_access.level"))
            .transpose()
    }
}

fn parse_level(code: i64, column: &str) -> RepoResult<AccessLevel> {
    AccessLevel::from_db(code)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid level `{code}` in {column}")))
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    Ok(User {
        id: parse_uuid(row, "id", "users")?,
        login: row.get("login")?,
        email: row.get("email")?,
        admin: row.get::<_, i64>("is_admin")? == 1,
    })
}

fn parse_group_row(row: &Row<'_>) -> RepoResult<Group> {
    Ok(Group {
        id: parse_uuid(row, "id", "access_groups")?,
        name: row.get("name")?,
        description: row.get("description")?,
        creator_id: parse_optional_uuid(row, "creator_id", "access_groups")?,
        public: row.get::<_, i64>("is_public")? == 1,
    })
}

fn parse_collection_row(row: &Row<'_>) -> RepoResult<Collection> {
    Ok(Collection {
        id: parse_uuid(row, "id", "collections")?,
        name: row.get("name")?,
        description: row.get("description")?,
        creator_id: parse_optional_uuid(row, "creator_id", "collections")?,
        public: row.get::<_, i64>("is_public")? == 1,
    })
}

fn parse_folder_row(row: &Row<'_>) -> RepoResult<Folder> {
    Ok(Folder {
        id: parse_uuid(row, "id", "folders")?,
        collection_id: parse_uuid(row, "collection_id", "folders")?,
        name: row.get("name")?,
        description: row.get("description")?,
        creator_id: parse_optional_uuid(row, "creator_id", "folders")?,
        public: row.get::<_, i64>("is_public")? == 1,
    })
}

fn parse_uuid(row: &Row<'_>, column: &str, table: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in {table}.{column}"))
    })
}

fn parse_optional_uuid(row: &Row<'_>, column: &str, table: &str) -> RepoResult<Option<Uuid>> {
    let text: Option<String> = row.get(column)?;
    text.map(|value| {
        Uuid::parse_str(&value).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{value}` in {table}.{column}"))
        })
    })
    .transpose()
}
