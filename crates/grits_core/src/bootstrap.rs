//! Resolution of the fixed GRITS directory entities.
//!
//! # Responsibility
//! - Find the owner account, the base and privileged groups, the
//!   collection and the folder that back the search service.
//! - Provision whatever is missing on first use.
//!
//! # Invariants
//! - A missing owner account is a configuration error; it is never created.
//! - The owner ends up with admin membership in the privileged group on
//!   every resolution, and in the base group when this call created it.
//! - Newly created collections and folders grant the base group `Read`.
//! - A memoized context is reused only while its folder still exists.

use crate::config::GritsConfig;
use crate::model::identity::{AccessLevel, Collection, Folder, Group, NewEntity, User};
use crate::repo::directory_repo::{DirectoryRepository, ResourceRef};
use crate::repo::item_repo::RepoError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::time::Instant;

/// Directory entities every GRITS request runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GritsContext {
    pub owner: User,
    pub base_group: Group,
    pub privileged_group: Group,
    pub collection: Collection,
    pub folder: Folder,
}

#[derive(Debug)]
pub enum BootstrapError {
    /// The configured owner login does not exist.
    MissingOwner(String),
    Repo(RepoError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOwner(login) => write!(f, "owner user `{login}` does not exist"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingOwner(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for BootstrapError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Memoizing resolver for [`GritsContext`].
#[derive(Debug)]
pub struct BootstrapResolver {
    owner_login: String,
    base_group: String,
    privileged_group: String,
    collection: String,
    folder: String,
    memo: Mutex<Option<GritsContext>>,
}

impl BootstrapResolver {
    pub fn new(config: &GritsConfig) -> Self {
        Self {
            owner_login: config.owner_login.clone(),
            base_group: config.base_group.clone(),
            privileged_group: config.privileged_group.clone(),
            collection: config.collection.clone(),
            folder: config.folder.clone(),
            memo: Mutex::new(None),
        }
    }

    /// Returns the context, provisioning missing entities.
    ///
    /// Safe to call on every request.
    ///
    /// # Errors
    /// - `MissingOwner` when the owner login is unknown.
    /// - `Repo` for storage failures.
    pub fn resolve<D: DirectoryRepository + ?Sized>(
        &self,
        directory: &D,
    ) -> Result<GritsContext, BootstrapError> {
        if let Some(context) = self.memoized() {
            if directory.get_folder(context.folder.id)?.is_some() {
                return Ok(context);
            }
            warn!(
                "event=bootstrap_resolve module=bootstrap status=stale folder_id={}",
                context.folder.id
            );
        }

        let started_at = Instant::now();
        let context = match self.derive(directory) {
            Ok(context) => context,
            Err(err) => {
                warn!(
                    "event=bootstrap_resolve module=bootstrap status=error error={}",
                    err
                );
                return Err(err);
            }
        };
        info!(
            "event=bootstrap_resolve module=bootstrap status=ok folder_id={} duration_ms={}",
            context.folder.id,
            started_at.elapsed().as_millis()
        );

        if let Ok(mut memo) = self.memo.lock() {
            *memo = Some(context.clone());
        }
        Ok(context)
    }

    /// Forgets the memoized context.
    pub fn invalidate(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            *memo = None;
        }
    }

    fn memoized(&self) -> Option<GritsContext> {
        self.memo.lock().ok().and_then(|memo| memo.clone())
    }

    fn derive<D: DirectoryRepository + ?Sized>(
        &self,
        directory: &D,
    ) -> Result<GritsContext, BootstrapError> {
        let owner = directory
            .find_user_by_login(&self.owner_login)?
            .ok_or_else(|| BootstrapError::MissingOwner(self.owner_login.clone()))?;

        let (base_group, created) = directory.find_or_create_group(&NewEntity {
            name: &self.base_group,
            description: "Basic GRITS access",
            creator_id: owner.id,
            public: false,
        })?;
        if created {
            directory.add_group_member(base_group.id, owner.id, AccessLevel::Admin)?;
        }

        let (privileged_group, _) = directory.find_or_create_group(&NewEntity {
            name: &self.privileged_group,
            description: "Privileged GRITS access",
            creator_id: owner.id,
            public: false,
        })?;
        directory.add_group_member(privileged_group.id, owner.id, AccessLevel::Admin)?;

        let (collection, created) = directory.find_or_create_collection(&NewEntity {
            name: &self.collection,
            description: "GRITS incident records",
            creator_id: owner.id,
            public: false,
        })?;
        if created {
            directory.grant_group_access(
                ResourceRef::Collection(collection.id),
                base_group.id,
                AccessLevel::Read,
            )?;
        }

        let (folder, created) = directory.find_or_create_folder(
            collection.id,
            &NewEntity {
                name: &self.folder,
                description: "All GRITS alerts",
                creator_id: owner.id,
                public: false,
            },
        )?;
        if created {
            directory.grant_group_access(
                ResourceRef::Folder(folder.id),
                base_group.id,
                AccessLevel::Read,
            )?;
        }

        Ok(GritsContext {
            owner,
            base_group,
            privileged_group,
            collection,
            folder,
        })
    }
}
