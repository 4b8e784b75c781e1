//! Structured filter expressions over stored incident documents.
//!
//! A [`Filter`] is built per request by the compiler and executed by the
//! item repository. Field paths use the document's dotted notation
//! (`meta.country`, `meta.events`, `name`, `folderId`).

use serde_json::{json, Map, Value};

/// Condition applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Value equals the operand exactly.
    Exact(Value),
    /// Text value matches the (unanchored) regular expression.
    Regex(String),
    /// Value is one of the operands.
    SetMembership(Vec<Value>),
    /// Numeric value lies in `[gte, lt)`; a missing side is unbounded.
    Range { gte: Option<i64>, lt: Option<i64> },
    /// Field is present (`true`) or absent (`false`).
    Exists(bool),
    /// Some object element of the array field satisfies `predicate` on
    /// its sub-field `field`.
    ElementMatch {
        field: String,
        predicate: Box<Predicate>,
    },
}

/// Boolean combination of field predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field { path: String, predicate: Predicate },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn field(path: impl Into<String>, predicate: Predicate) -> Self {
        Self::Field {
            path: path.into(),
            predicate,
        }
    }

    pub fn element_match(
        array_path: impl Into<String>,
        field: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self::field(
            array_path,
            Predicate::ElementMatch {
                field: field.into(),
                predicate: Box::new(predicate),
            },
        )
    }

    /// Top-level conjuncts of this filter.
    pub fn conjuncts(&self) -> &[Filter] {
        match self {
            Self::And(parts) => parts,
            other => std::slice::from_ref(other),
        }
    }

    /// Renders the filter in document-query notation for diagnostics.
    pub fn to_document(&self) -> Value {
        match self {
            Self::Field { path, predicate } => {
                let mut doc = Map::new();
                doc.insert(path.clone(), predicate_document(predicate));
                Value::Object(doc)
            }
            Self::And(parts) => {
                let docs: Vec<Value> = parts.iter().map(Filter::to_document).collect();
                json!({ "$and": docs })
            }
            Self::Or(parts) => {
                let docs: Vec<Value> = parts.iter().map(Filter::to_document).collect();
                json!({ "$or": docs })
            }
        }
    }
}

fn predicate_document(predicate: &Predicate) -> Value {
    match predicate {
        Predicate::Exact(value) => value.clone(),
        Predicate::Regex(pattern) => json!({ "$regex": pattern }),
        Predicate::SetMembership(values) => json!({ "$in": values }),
        Predicate::Range { gte, lt } => {
            let mut doc = Map::new();
            if let Some(gte) = gte {
                doc.insert("$gte".to_string(), json!(gte));
            }
            if let Some(lt) = lt {
                doc.insert("$lt".to_string(), json!(lt));
            }
            Value::Object(doc)
        }
        Predicate::Exists(exists) => json!({ "$exists": exists }),
        Predicate::ElementMatch { field, predicate } => {
            let mut inner = Map::new();
            inner.insert(field.clone(), predicate_document(predicate));
            json!({ "$elemMatch": inner })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sort field plus direction. Ties always break on the internal id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }
}

/// Pagination window applied after filtering and sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// `None` means no limit (full scan).
    pub limit: Option<u32>,
    pub offset: u32,
    pub sort: SortKey,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Some(50),
            offset: 0,
            sort: SortKey::ascending("meta.date"),
        }
    }
}
