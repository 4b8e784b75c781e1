//! Directory entities: users, access groups, collections and folders.
//!
//! These mirror the external document store's own models. Core code only
//! reads them, except the bootstrap path which provisions the fixed GRITS
//! entities.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for users, groups, collections and folders.
pub type EntityId = Uuid;

/// Ordered access level, `Read < Write < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    /// Integer code persisted in membership and grant tables.
    pub fn as_db(self) -> i64 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::Admin => 2,
        }
    }

    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Read),
            1 => Some(Self::Write),
            2 => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns whether this level satisfies `required`.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self >= required
    }
}

/// Authenticated identity as resolved by the external session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub login: String,
    pub email: Option<String>,
    /// Site administrators satisfy every access level on every resource.
    pub admin: bool,
}

impl User {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            login: login.into(),
            email: None,
            admin: false,
        }
    }

    pub fn new_admin(login: impl Into<String>) -> Self {
        Self {
            admin: true,
            ..Self::new(login)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub creator_id: Option<EntityId>,
    pub public: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    pub creator_id: Option<EntityId>,
    pub public: bool,
}

/// Item container; always a child of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: EntityId,
    pub collection_id: EntityId,
    pub name: String,
    pub description: String,
    pub creator_id: Option<EntityId>,
    pub public: bool,
}

/// Creation request shared by groups, collections and folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntity<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub creator_id: EntityId,
    pub public: bool,
}
