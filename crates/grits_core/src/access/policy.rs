//! Strategies that turn a caller into group grants.

use crate::bootstrap::GritsContext;
use crate::config::ApiKeyTier;
use crate::model::identity::{AccessLevel, User};
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::item_repo::RepoResult;
use std::collections::HashMap;

/// Identity attached to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(User),
    ApiKey(String),
}

impl Caller {
    /// Short label safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::User(user) if user.admin => "site_admin",
            Self::User(_) => "user",
            Self::ApiKey(_) => "api_key",
        }
    }
}

/// Effective levels of one caller in the two GRITS groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Grants {
    pub base: Option<AccessLevel>,
    pub privileged: Option<AccessLevel>,
}

impl Grants {
    pub fn everything() -> Self {
        Self {
            base: Some(AccessLevel::Admin),
            privileged: Some(AccessLevel::Admin),
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn grants(
        &self,
        caller: &Caller,
        context: &GritsContext,
        directory: &dyn DirectoryRepository,
    ) -> RepoResult<Grants>;
}

/// Grants from stored group memberships; site admins get everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupAccessPolicy;

impl AccessPolicy for GroupAccessPolicy {
    fn name(&self) -> &'static str {
        "groups"
    }

    fn grants(
        &self,
        caller: &Caller,
        context: &GritsContext,
        directory: &dyn DirectoryRepository,
    ) -> RepoResult<Grants> {
        let Caller::User(user) = caller else {
            return Ok(Grants::default());
        };
        if user.admin {
            return Ok(Grants::everything());
        }
        Ok(Grants {
            base: directory.member_level(context.base_group.id, user.id)?,
            privileged: directory.member_level(context.privileged_group.id, user.id)?,
        })
    }
}

/// Grants from statically configured API keys.
///
/// Privileged keys satisfy every level; base keys only `Read`.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAccessPolicy {
    keys: HashMap<String, ApiKeyTier>,
}

impl ApiKeyAccessPolicy {
    pub fn new(keys: HashMap<String, ApiKeyTier>) -> Self {
        Self { keys }
    }
}

impl AccessPolicy for ApiKeyAccessPolicy {
    fn name(&self) -> &'static str {
        "api_keys"
    }

    fn grants(
        &self,
        caller: &Caller,
        _context: &GritsContext,
        _directory: &dyn DirectoryRepository,
    ) -> RepoResult<Grants> {
        let grants = match caller {
            Caller::User(user) if user.admin => Grants::everything(),
            Caller::ApiKey(key) => match self.keys.get(key) {
                Some(ApiKeyTier::Privileged) => Grants::everything(),
                Some(ApiKeyTier::Base) => Grants {
                    base: Some(AccessLevel::Read),
                    privileged: None,
                },
                None => Grants::default(),
            },
            Caller::User(_) | Caller::Anonymous => Grants::default(),
        };
        Ok(grants)
    }
}
