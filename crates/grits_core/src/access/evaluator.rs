//! Access decision table.

use super::policy::{AccessPolicy, Caller, Grants};
use crate::bootstrap::GritsContext;
use crate::model::identity::AccessLevel;
use crate::repo::directory_repo::DirectoryRepository;
use crate::repo::item_repo::RepoError;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
}

#[derive(Debug)]
pub enum AccessError {
    Denied {
        required: AccessLevel,
        privileged: bool,
    },
    Repo(RepoError),
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Denied {
                required,
                privileged,
            } => {
                let scope = if *privileged { "privileged" } else { "base" };
                write!(f, "access denied: {scope} {required:?} access required")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Denied { .. } => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for AccessError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Applies the decision table on top of a pluggable [`AccessPolicy`].
pub struct AccessEvaluator {
    policy: Box<dyn AccessPolicy>,
}

impl AccessEvaluator {
    pub fn new(policy: Box<dyn AccessPolicy>) -> Self {
        Self { policy }
    }

    /// Fails with `AccessError::Denied` unless the caller qualifies.
    pub fn check_access(
        &self,
        caller: &Caller,
        context: &GritsContext,
        directory: &dyn DirectoryRepository,
        required: AccessLevel,
        needs_privileged: bool,
    ) -> Result<(), AccessError> {
        let grants = self.policy.grants(caller, context, directory)?;
        let decision = decide(grants, required, needs_privileged);
        let status = match decision {
            AccessDecision::Allow => "ok",
            AccessDecision::Deny => "denied",
        };
        info!(
            "event=access_check module=access status={} policy={} caller={} required={:?} privileged={}",
            status,
            self.policy.name(),
            caller.kind(),
            required,
            needs_privileged
        );

        match decision {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny => Err(AccessError::Denied {
                required,
                privileged: needs_privileged,
            }),
        }
    }

    /// Non-failing variant of [`Self::check_access`].
    ///
    /// Storage errors count as a denial.
    pub fn probe(
        &self,
        caller: &Caller,
        context: &GritsContext,
        directory: &dyn DirectoryRepository,
        required: AccessLevel,
        needs_privileged: bool,
    ) -> bool {
        match self.policy.grants(caller, context, directory) {
            Ok(grants) => decide(grants, required, needs_privileged) == AccessDecision::Allow,
            Err(err) => {
                warn!(
                    "event=access_check module=access status=error mode=probe error={}",
                    err
                );
                false
            }
        }
    }
}

/// The decision table shared by every policy.
pub fn decide(grants: Grants, required: AccessLevel, needs_privileged: bool) -> AccessDecision {
    let satisfies = |level: Option<AccessLevel>| level.is_some_and(|l| l.satisfies(required));

    if satisfies(grants.privileged) {
        return AccessDecision::Allow;
    }
    if !needs_privileged && satisfies(grants.base) {
        return AccessDecision::Allow;
    }
    AccessDecision::Deny
}
