//! Query compilation and execution support.
//!
//! # Responsibility
//! - Translate loosely-typed search parameters into a structured [`Filter`].
//! - Render filters to SQL over the JSON document columns.
//! - Track whether stored incidents still use the legacy flat metadata shape.
//!
//! # Invariants
//! - Every compiled filter is scoped to exactly one folder.
//! - Results are totally ordered (sort key, then internal id).

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod compat;
pub mod compiler;
pub mod date;
pub mod filter;
pub(crate) mod sql;

pub use filter::{Filter, Page, Predicate, SortDirection, SortKey};

pub type QueryResult<T> = Result<T, QueryError>;

/// Caller input that cannot be turned into a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidDate { param: &'static str, value: String },
    InvalidNumber { param: &'static str, value: String },
    InvalidPattern { param: &'static str, message: String },
    InvalidSort(String),
    /// Field path that the store cannot address.
    UnknownField(String),
    Unsupported(String),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDate { param, value } => {
                write!(f, "could not parse `{param}` date `{value}`")
            }
            Self::InvalidNumber { param, value } => {
                write!(f, "`{param}` must be a non-negative integer, got `{value}`")
            }
            Self::InvalidPattern { param, message } => {
                write!(f, "invalid regular expression for `{param}`: {message}")
            }
            Self::InvalidSort(value) => write!(f, "invalid sort parameter `{value}`"),
            Self::UnknownField(path) => write!(f, "unknown field path `{path}`"),
            Self::Unsupported(message) => write!(f, "unsupported filter: {message}"),
        }
    }
}

impl Error for QueryError {}
