//! Filter → SQL rendering over the `items` table.
//!
//! Field paths resolve either to a plain column (`name`, `folderId`, ...)
//! or to a JSON path inside `items.meta` / `items.private_meta`. JSON
//! predicates go through `json_each`, so a field holding an array matches
//! when any of its elements matches, the same as a scalar field would.
//!
//! # Invariants
//! - Every caller-controlled operand is bound, never spliced into SQL.
//! - JSON paths spliced into SQL consist of `[A-Za-z0-9_]` segments only.

use super::compiler::is_plain_segment;
use super::filter::{Filter, Page, Predicate, SortDirection};
use super::{QueryError, QueryResult};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Rendered SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Column(&'static str),
    Json { document: String, path: String },
}

/// Renders `filter` as a boolean SQL expression.
pub(crate) fn render_where(filter: &Filter) -> QueryResult<SqlFragment> {
    let mut renderer = Renderer::default();
    let sql = renderer.filter(filter)?;
    Ok(SqlFragment {
        sql,
        params: renderer.params,
    })
}

/// Renders the `ORDER BY ... LIMIT ... OFFSET ...` tail for `page`.
pub(crate) fn render_page(page: &Page) -> QueryResult<SqlFragment> {
    let key = match resolve_item_path(&page.sort.path)? {
        Source::Column(column) => column.to_string(),
        Source::Json { document, path } => format!("json_extract({document}, '{path}')"),
    };
    let direction = match page.sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };

    let mut sql = format!(" ORDER BY {key} {direction}, items.id ASC");
    let mut params = Vec::new();
    match page.limit {
        Some(limit) => {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(i64::from(limit)));
            if page.offset > 0 {
                sql.push_str(" OFFSET ?");
                params.push(SqlValue::Integer(i64::from(page.offset)));
            }
        }
        None if page.offset > 0 => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(SqlValue::Integer(i64::from(page.offset)));
        }
        None => {}
    }

    Ok(SqlFragment { sql, params })
}

fn resolve_item_path(path: &str) -> QueryResult<Source> {
    let column = match path {
        "_id" => Some("items.id"),
        "folderId" => Some("items.folder_id"),
        "name" => Some("items.name"),
        "description" => Some("items.description"),
        "created" => Some("items.created_at"),
        "updated" => Some("items.updated_at"),
        _ => None,
    };
    if let Some(column) = column {
        return Ok(Source::Column(column));
    }

    let (document, rest) = if let Some(rest) = path.strip_prefix("meta.") {
        ("items.meta", rest)
    } else if let Some(rest) = path.strip_prefix("private.") {
        ("items.private_meta", rest)
    } else {
        return Err(QueryError::UnknownField(path.to_string()));
    };
    Ok(Source::Json {
        document: document.to_string(),
        path: json_path(rest)?,
    })
}

fn json_path(dotted: &str) -> QueryResult<String> {
    let mut path = String::from("$");
    for segment in dotted.split('.') {
        if !is_plain_segment(segment) {
            return Err(QueryError::UnknownField(dotted.to_string()));
        }
        path.push('.');
        path.push_str(segment);
    }
    Ok(path)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[derive(Default)]
struct Renderer {
    params: Vec<SqlValue>,
    next_alias: usize,
}

impl Renderer {
    fn alias(&mut self) -> String {
        let alias = format!("j{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn bind(&mut self, value: SqlValue) -> &'static str {
        self.params.push(value);
        "?"
    }

    fn filter(&mut self, filter: &Filter) -> QueryResult<String> {
        match filter {
            Filter::Field { path, predicate } => {
                let source = resolve_item_path(path)?;
                self.predicate(&source, predicate)
            }
            Filter::And(parts) => self.combine(parts, " AND ", "1"),
            Filter::Or(parts) => self.combine(parts, " OR ", "0"),
        }
    }

    fn combine(&mut self, parts: &[Filter], joiner: &str, empty: &str) -> QueryResult<String> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let rendered = parts
            .iter()
            .map(|part| self.filter(part).map(|sql| format!("({sql})")))
            .collect::<QueryResult<Vec<_>>>()?;
        Ok(rendered.join(joiner))
    }

    fn predicate(&mut self, source: &Source, predicate: &Predicate) -> QueryResult<String> {
        match source {
            Source::Column(column) => self.column_predicate(column, predicate),
            Source::Json { document, path } => self.json_predicate(document, path, predicate),
        }
    }

    fn column_predicate(&mut self, column: &str, predicate: &Predicate) -> QueryResult<String> {
        match predicate {
            Predicate::Exists(exists) => Ok(if *exists {
                format!("{column} IS NOT NULL")
            } else {
                format!("{column} IS NULL")
            }),
            Predicate::ElementMatch { .. } => Err(QueryError::Unsupported(format!(
                "element match on scalar column `{column}`"
            ))),
            other => self.value_condition(column, None, other),
        }
    }

    fn json_predicate(
        &mut self,
        document: &str,
        path: &str,
        predicate: &Predicate,
    ) -> QueryResult<String> {
        match predicate {
            Predicate::Exists(exists) => {
                let op = if *exists { "IS NOT NULL" } else { "IS NULL" };
                Ok(format!("json_type({document}, '{path}') {op}"))
            }
            Predicate::Range { gte, lt } => {
                let value = format!("json_extract({document}, '{path}')");
                let mut parts = vec![format!(
                    "json_type({document}, '{path}') IN ('integer', 'real')"
                )];
                if let Some(gte) = gte {
                    parts.push(format!("{value} >= {}", self.bind(SqlValue::Integer(*gte))));
                }
                if let Some(lt) = lt {
                    parts.push(format!("{value} < {}", self.bind(SqlValue::Integer(*lt))));
                }
                Ok(parts.join(" AND "))
            }
            Predicate::ElementMatch { field, predicate } => {
                let alias = self.alias();
                let element = Source::Json {
                    document: format!("{alias}.value"),
                    path: json_path(field)?,
                };
                let inner = self.predicate(&element, predicate)?;
                Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each({document}, '{path}') AS {alias} \
                     WHERE {alias}.type = 'object' AND ({inner}))"
                ))
            }
            other => {
                let alias = self.alias();
                let value = format!("{alias}.value");
                let condition = self.value_condition(&value, Some(&alias), other)?;
                Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each({document}, '{path}') AS {alias} \
                     WHERE {condition})"
                ))
            }
        }
    }

    /// Condition on a scalar expression; `json_alias` enables JSON type checks.
    fn value_condition(
        &mut self,
        value: &str,
        json_alias: Option<&str>,
        predicate: &Predicate,
    ) -> QueryResult<String> {
        let type_guard = |types: &str| {
            json_alias
                .map(|alias| format!("{alias}.type IN ({types}) AND "))
                .unwrap_or_default()
        };

        match predicate {
            Predicate::Exact(operand) => {
                let guard = type_guard("'text', 'integer', 'real', 'true', 'false'");
                Ok(format!("{guard}{value} = {}", self.bind(to_sql_value(operand))))
            }
            Predicate::Regex(pattern) => {
                let guard = type_guard("'text'");
                let placeholder = self.bind(SqlValue::Text(pattern.clone()));
                Ok(format!("{guard}regexp({placeholder}, {value})"))
            }
            Predicate::SetMembership(operands) => {
                if operands.is_empty() {
                    return Ok("0".to_string());
                }
                let guard = type_guard("'text', 'integer', 'real', 'true', 'false'");
                let placeholders = operands
                    .iter()
                    .map(|operand| self.bind(to_sql_value(operand)))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!("{guard}{value} IN ({placeholders})"))
            }
            Predicate::Range { gte, lt } => {
                let mut parts = Vec::new();
                if let Some(gte) = gte {
                    parts.push(format!("{value} >= {}", self.bind(SqlValue::Integer(*gte))));
                }
                if let Some(lt) = lt {
                    parts.push(format!("{value} < {}", self.bind(SqlValue::Integer(*lt))));
                }
                if parts.is_empty() {
                    return Ok("1".to_string());
                }
                Ok(parts.join(" AND "))
            }
            Predicate::Exists(_) | Predicate::ElementMatch { .. } => Err(QueryError::Unsupported(
                "nested predicate in scalar position".to_string(),
            )),
        }
    }
}
