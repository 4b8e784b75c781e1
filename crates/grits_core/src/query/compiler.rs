//! Search parameter parsing and filter compilation.
//!
//! # Responsibility
//! - Parse the raw `GET /grits` parameter map into [`SearchParams`].
//! - Compile parameters into a folder-scoped [`Filter`] and a [`Page`].
//!
//! # Invariants
//! - The folder scope is always the first conjunct and no parameter can
//!   replace it.
//! - Each compatibility field contributes one independent conjunct.
//! - Regex operands are validated before they reach the store.

use super::date::{parse_date_ms, DEFAULT_START_MS};
use super::filter::{Filter, Page, Predicate, SortDirection, SortKey};
use super::{QueryError, QueryResult};
use crate::model::identity::EntityId;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_LIMIT: u32 = 50;
pub const DEFAULT_SORT_PATH: &str = "meta.date";
pub const FOLDER_SCOPE_PATH: &str = "folderId";
pub const EVENTS_PATH: &str = "meta.events";

const SORTABLE_COLUMNS: &[&str] = &["_id", "name", "description", "created", "updated"];

/// How one search parameter maps onto stored fields.
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    /// Direct match on one path.
    Flat { path: &'static str },
    /// Legacy flat field migrated into `meta.events[*].<element_field>`.
    ///
    /// `interim_path` names an intermediate flat shape that is only matched
    /// while legacy records remain; the legacy key is then also matched
    /// inside events when it differs from `element_field`.
    Events {
        legacy_path: &'static str,
        element_field: &'static str,
        interim_path: Option<&'static str>,
        always_regex: bool,
    },
    /// Element match on an array that never had a flat form.
    Nested {
        array_path: &'static str,
        element_field: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    param: &'static str,
    kind: FieldKind,
}

const SEARCH_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        param: "country",
        kind: FieldKind::Events {
            legacy_path: "meta.country",
            element_field: "country",
            interim_path: None,
            always_regex: false,
        },
    },
    FieldSpec {
        param: "disease",
        kind: FieldKind::Events {
            legacy_path: "meta.disease",
            element_field: "diseases",
            interim_path: Some("meta.diseases"),
            always_regex: true,
        },
    },
    FieldSpec {
        param: "species",
        kind: FieldKind::Events {
            legacy_path: "meta.species",
            element_field: "species",
            interim_path: None,
            always_regex: false,
        },
    },
    FieldSpec {
        param: "feed",
        kind: FieldKind::Flat { path: "meta.feed" },
    },
    FieldSpec {
        param: "description",
        kind: FieldKind::Flat {
            path: "meta.description",
        },
    },
    FieldSpec {
        param: "diagnosis",
        kind: FieldKind::Nested {
            array_path: "meta.diagnosis.diseases",
            element_field: "name",
        },
    },
    FieldSpec {
        param: "id",
        kind: FieldKind::Flat { path: "name" },
    },
];

/// Typed view of the search endpoint parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub start: Option<String>,
    pub end: Option<String>,
    /// Field filters keyed by parameter name (`country`, `id`, ...).
    pub fields: HashMap<String, String>,
    /// `0` means no limit.
    pub limit: u32,
    pub offset: u32,
    pub sort: SortKey,
    pub regex: bool,
    pub geojson: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            fields: HashMap::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: SortKey::ascending(DEFAULT_SORT_PATH),
            regex: true,
            geojson: false,
        }
    }
}

impl SearchParams {
    /// Parses a raw query-string map.
    ///
    /// Blank values are treated as absent. Unknown keys are ignored.
    ///
    /// # Errors
    /// - `limit`/`offset` that are not non-negative integers.
    /// - `sort` naming an unsortable field, or `sortdir` other than `1`/`-1`.
    pub fn from_query(query: &HashMap<String, String>) -> QueryResult<Self> {
        let text = |key: &str| {
            query
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let mut params = Self {
            start: text("start"),
            end: text("end"),
            ..Self::default()
        };

        for spec in SEARCH_FIELDS {
            if let Some(value) = text(spec.param) {
                params.fields.insert(spec.param.to_string(), value);
            }
        }

        if let Some(raw) = text("limit") {
            params.limit = parse_count("limit", &raw)?;
        }
        if let Some(raw) = text("offset") {
            params.offset = parse_count("offset", &raw)?;
        }

        if let Some(path) = text("sort") {
            if !is_sortable_path(&path) {
                return Err(QueryError::InvalidSort(path));
            }
            params.sort.path = path;
        }
        if let Some(raw) = text("sortdir") {
            params.sort.direction = match raw.as_str() {
                "1" => SortDirection::Ascending,
                "-1" => SortDirection::Descending,
                _ => return Err(QueryError::InvalidSort(raw)),
            };
        }

        let regex_enabled = query.get("regex").map_or(true, |raw| parse_flag(raw));
        let regex_disabled = query.get("disableRegex").is_some_and(|raw| parse_flag(raw));
        params.regex = regex_enabled && !regex_disabled;
        params.geojson = query.get("geoJSON").is_some_and(|raw| parse_flag(raw));

        Ok(params)
    }

    pub fn with_field(mut self, param: &str, value: impl Into<String>) -> Self {
        self.fields.insert(param.to_string(), value.into());
        self
    }

    fn field_value(&self, param: &str) -> Option<&str> {
        self.fields.get(param).map(String::as_str)
    }

    /// Pagination window for these parameters.
    pub fn page(&self) -> Page {
        Page {
            limit: (self.limit > 0).then_some(self.limit),
            offset: self.offset,
            sort: self.sort.clone(),
        }
    }
}

/// Builds folder-scoped filters for the incident collection.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    folder_id: EntityId,
}

impl QueryCompiler {
    pub fn new(folder_id: EntityId) -> Self {
        Self { folder_id }
    }

    /// Compiles `params` using the current time as the default `end`.
    ///
    /// `legacy_compat` must be `true` while the store still holds records
    /// with flat legacy metadata; compatibility fields then match either
    /// shape.
    pub fn build_filter(&self, params: &SearchParams, legacy_compat: bool) -> QueryResult<Filter> {
        self.build_filter_at(params, legacy_compat, Utc::now().timestamp_millis())
    }

    /// Same as [`Self::build_filter`] with an explicit `now` in epoch ms.
    pub fn build_filter_at(
        &self,
        params: &SearchParams,
        legacy_compat: bool,
        now_ms: i64,
    ) -> QueryResult<Filter> {
        let mut conjuncts = vec![Filter::field(
            FOLDER_SCOPE_PATH,
            Predicate::Exact(Value::String(self.folder_id.to_string())),
        )];

        if let Some(range) = date_range(params, now_ms)? {
            conjuncts.push(Filter::field(DEFAULT_SORT_PATH, range));
        }

        for spec in SEARCH_FIELDS {
            if let Some(raw) = params.field_value(spec.param) {
                conjuncts.push(compile_field(spec, raw, params.regex, legacy_compat)?);
            }
        }

        Ok(Filter::And(conjuncts))
    }
}

fn compile_field(
    spec: &FieldSpec,
    raw: &str,
    use_regex: bool,
    legacy_compat: bool,
) -> QueryResult<Filter> {
    match spec.kind {
        FieldKind::Flat { path } => Ok(Filter::field(
            path,
            value_predicate(spec.param, raw, use_regex)?,
        )),
        FieldKind::Nested {
            array_path,
            element_field,
        } => Ok(Filter::element_match(
            array_path,
            element_field,
            value_predicate(spec.param, raw, use_regex)?,
        )),
        FieldKind::Events {
            legacy_path,
            element_field,
            interim_path,
            always_regex,
        } => {
            let predicate = value_predicate(spec.param, raw, use_regex || always_regex)?;
            let nested = Filter::element_match(EVENTS_PATH, element_field, predicate.clone());
            if !legacy_compat {
                return Ok(nested);
            }

            let mut branches = vec![Filter::field(legacy_path, predicate.clone())];
            if let Some(interim_path) = interim_path {
                branches.push(Filter::element_match(
                    EVENTS_PATH,
                    spec.param,
                    predicate.clone(),
                ));
                branches.push(Filter::field(interim_path, predicate));
            }
            branches.push(nested);
            Ok(Filter::Or(branches))
        }
    }
}

/// Matches records in `folder_id` that still carry any legacy flat field
/// without the migrated per-event counterpart.
pub(crate) fn legacy_shape_filter(folder_id: EntityId) -> Filter {
    let per_field = SEARCH_FIELDS
        .iter()
        .filter_map(|spec| match spec.kind {
            FieldKind::Events {
                legacy_path,
                element_field,
                ..
            } => Some(Filter::And(vec![
                Filter::field(legacy_path, Predicate::Exists(true)),
                Filter::Or(vec![
                    Filter::field(EVENTS_PATH, Predicate::Exists(false)),
                    Filter::element_match(EVENTS_PATH, element_field, Predicate::Exists(false)),
                ]),
            ])),
            _ => None,
        })
        .collect();

    Filter::And(vec![
        Filter::field(
            FOLDER_SCOPE_PATH,
            Predicate::Exact(Value::String(folder_id.to_string())),
        ),
        Filter::Or(per_field),
    ])
}

fn value_predicate(param: &'static str, raw: &str, use_regex: bool) -> QueryResult<Predicate> {
    if use_regex {
        Regex::new(raw).map_err(|err| QueryError::InvalidPattern {
            param,
            message: err.to_string(),
        })?;
        return Ok(Predicate::Regex(raw.to_string()));
    }
    Ok(Predicate::SetMembership(set_values(raw)))
}

/// Decodes a set-mode operand.
///
/// A JSON array yields its elements, a JSON string yields itself, other
/// JSON scalars are matched together with their raw text, and anything
/// that fails to decode is matched as one raw string.
fn set_values(raw: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => values,
        Ok(Value::String(value)) => vec![Value::String(value)],
        Ok(Value::Null) | Err(_) => vec![Value::String(raw.to_string())],
        Ok(other) => vec![other, Value::String(raw.to_string())],
    }
}

fn date_range(params: &SearchParams, now_ms: i64) -> QueryResult<Option<Predicate>> {
    if params.start.is_none() && params.end.is_none() {
        return Ok(None);
    }
    let gte = match params.start.as_deref() {
        Some(raw) => parse_bound("start", raw)?,
        None => DEFAULT_START_MS,
    };
    let lt = match params.end.as_deref() {
        Some(raw) => parse_bound("end", raw)?,
        None => now_ms,
    };
    Ok(Some(Predicate::Range {
        gte: Some(gte),
        lt: Some(lt),
    }))
}

fn parse_bound(param: &'static str, raw: &str) -> QueryResult<i64> {
    parse_date_ms(raw).ok_or_else(|| QueryError::InvalidDate {
        param,
        value: raw.to_string(),
    })
}

fn parse_count(param: &'static str, raw: &str) -> QueryResult<u32> {
    raw.parse::<u32>().map_err(|_| QueryError::InvalidNumber {
        param,
        value: raw.to_string(),
    })
}

/// Flag semantics: present and blank, or one of `true|on|1|yes`.
pub(crate) fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "true" | "on" | "1" | "yes"
    )
}

pub(crate) fn is_sortable_path(path: &str) -> bool {
    if SORTABLE_COLUMNS.contains(&path) {
        return true;
    }
    match path.strip_prefix("meta.") {
        Some(rest) => rest.split('.').all(is_plain_segment),
        None => false,
    }
}

pub(crate) fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::{legacy_shape_filter, set_values, QueryCompiler, SearchParams, DEFAULT_LIMIT};
    use crate::query::{Filter, Predicate, QueryError, SortDirection};
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_enable_regex_and_paginate_by_date() {
        let params = SearchParams::from_query(&HashMap::new()).unwrap();
        assert!(params.regex);
        assert!(!params.geojson);
        let page = params.page();
        assert_eq!(page.limit, Some(DEFAULT_LIMIT));
        assert_eq!(page.offset, 0);
        assert_eq!(page.sort.path, "meta.date");
        assert_eq!(page.sort.direction, SortDirection::Ascending);
    }

    #[test]
    fn regex_can_be_disabled_either_way() {
        let off = SearchParams::from_query(&query(&[("regex", "false")])).unwrap();
        assert!(!off.regex);
        let disabled = SearchParams::from_query(&query(&[("disableRegex", "")])).unwrap();
        assert!(!disabled.regex);
        let kept = SearchParams::from_query(&query(&[("disableRegex", "no")])).unwrap();
        assert!(kept.regex);
    }

    #[test]
    fn limit_zero_means_unbounded_and_bad_numbers_fail() {
        let params = SearchParams::from_query(&query(&[("limit", "0"), ("offset", "5")])).unwrap();
        assert_eq!(params.page().limit, None);
        assert_eq!(params.page().offset, 5);

        let err = SearchParams::from_query(&query(&[("limit", "-1")])).unwrap_err();
        assert!(matches!(err, QueryError::InvalidNumber { param: "limit", .. }));
    }

    #[test]
    fn sort_is_restricted_to_addressable_fields() {
        let params =
            SearchParams::from_query(&query(&[("sort", "meta.feed"), ("sortdir", "-1")])).unwrap();
        assert_eq!(params.sort.path, "meta.feed");
        assert_eq!(params.sort.direction, SortDirection::Descending);

        for bad in ["private.score", "meta.", "meta.a-b", "folderId"] {
            let err = SearchParams::from_query(&query(&[("sort", bad)])).unwrap_err();
            assert!(matches!(err, QueryError::InvalidSort(_)), "sort {bad}");
        }
    }

    #[test]
    fn folder_scope_is_always_first_and_cannot_be_overridden() {
        let folder = Uuid::new_v4();
        let compiler = QueryCompiler::new(folder);
        let params =
            SearchParams::from_query(&query(&[("folderId", "other"), ("id", "x")])).unwrap();

        let filter = compiler.build_filter(&params, false).unwrap();
        let conjuncts = filter.conjuncts();
        assert_eq!(
            conjuncts[0],
            Filter::field("folderId", Predicate::Exact(json!(folder.to_string())))
        );
        assert_eq!(
            conjuncts
                .iter()
                .filter(|part| matches!(part, Filter::Field { path, .. } if path == "folderId"))
                .count(),
            1
        );
    }

    #[test]
    fn date_bounds_fill_missing_side_with_defaults() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams {
            end: Some("2014-03-01".to_string()),
            ..SearchParams::default()
        };
        let filter = compiler.build_filter_at(&params, false, 42).unwrap();
        assert_eq!(
            filter.conjuncts()[1],
            Filter::field(
                "meta.date",
                Predicate::Range {
                    gte: Some(631_152_000_000),
                    lt: Some(1_393_632_000_000)
                }
            )
        );

        let params = SearchParams {
            start: Some("2014-03-01".to_string()),
            ..SearchParams::default()
        };
        let filter = compiler.build_filter_at(&params, false, 42).unwrap();
        assert_eq!(
            filter.conjuncts()[1],
            Filter::field(
                "meta.date",
                Predicate::Range {
                    gte: Some(1_393_632_000_000),
                    lt: Some(42)
                }
            )
        );
    }

    #[test]
    fn no_date_params_means_no_date_conjunct() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let filter = compiler
            .build_filter(&SearchParams::default(), true)
            .unwrap();
        assert_eq!(filter.conjuncts().len(), 1);
    }

    #[test]
    fn unparsable_date_is_a_validation_error() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams {
            start: Some("someday".to_string()),
            ..SearchParams::default()
        };
        let err = compiler.build_filter(&params, false).unwrap_err();
        assert_eq!(
            err,
            QueryError::InvalidDate {
                param: "start",
                value: "someday".to_string()
            }
        );
    }

    #[test]
    fn compat_fields_become_independent_disjunctions() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams::default()
            .with_field("country", "Kenya")
            .with_field("species", "human");

        let filter = compiler.build_filter(&params, true).unwrap();
        let conjuncts = filter.conjuncts();
        assert_eq!(conjuncts.len(), 3);
        assert_eq!(
            conjuncts[1],
            Filter::Or(vec![
                Filter::field("meta.country", Predicate::Regex("Kenya".into())),
                Filter::element_match("meta.events", "country", Predicate::Regex("Kenya".into())),
            ])
        );
        assert_eq!(
            conjuncts[2],
            Filter::Or(vec![
                Filter::field("meta.species", Predicate::Regex("human".into())),
                Filter::element_match("meta.events", "species", Predicate::Regex("human".into())),
            ])
        );
    }

    #[test]
    fn migrated_store_emits_only_element_match() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams::default().with_field("country", "Kenya");

        let filter = compiler.build_filter(&params, false).unwrap();
        assert_eq!(
            filter.conjuncts()[1],
            Filter::element_match("meta.events", "country", Predicate::Regex("Kenya".into()))
        );
    }

    #[test]
    fn legacy_disease_also_matches_interim_shapes() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams::default().with_field("disease", "Ebola");
        let ebola = || Predicate::Regex("Ebola".into());

        let filter = compiler.build_filter(&params, true).unwrap();
        assert_eq!(
            filter.conjuncts()[1],
            Filter::Or(vec![
                Filter::field("meta.disease", ebola()),
                Filter::element_match("meta.events", "disease", ebola()),
                Filter::field("meta.diseases", ebola()),
                Filter::element_match("meta.events", "diseases", ebola()),
            ])
        );
    }

    #[test]
    fn legacy_shape_filter_covers_every_migrated_field() {
        let folder = Uuid::new_v4();
        let filter = legacy_shape_filter(folder);
        let conjuncts = filter.conjuncts();
        assert_eq!(
            conjuncts[0],
            Filter::field("folderId", Predicate::Exact(json!(folder.to_string())))
        );

        let Filter::Or(per_field) = &conjuncts[1] else {
            panic!("expected a disjunction, got {:?}", conjuncts[1]);
        };
        let legacy_paths: Vec<&str> = per_field
            .iter()
            .map(|branch| match branch.conjuncts().first() {
                Some(Filter::Field { path, .. }) => path.as_str(),
                other => panic!("unexpected branch {other:?}"),
            })
            .collect();
        assert_eq!(legacy_paths, vec!["meta.country", "meta.disease", "meta.species"]);
    }

    #[test]
    fn disease_stays_regex_when_regex_is_disabled() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let mut params = SearchParams::default()
            .with_field("disease", "Ebola")
            .with_field("feed", "promed");
        params.regex = false;

        let filter = compiler.build_filter(&params, false).unwrap();
        assert_eq!(
            filter.conjuncts()[1],
            Filter::element_match("meta.events", "diseases", Predicate::Regex("Ebola".into()))
        );
        assert_eq!(
            filter.conjuncts()[2],
            Filter::field(
                "meta.feed",
                Predicate::SetMembership(vec![json!("promed")])
            )
        );
    }

    #[test]
    fn diagnosis_and_id_map_to_their_own_paths() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams::default()
            .with_field("diagnosis", "Cholera")
            .with_field("id", "^hm-1$");

        let filter = compiler.build_filter(&params, true).unwrap();
        assert_eq!(
            filter.conjuncts()[1],
            Filter::element_match(
                "meta.diagnosis.diseases",
                "name",
                Predicate::Regex("Cholera".into())
            )
        );
        assert_eq!(
            filter.conjuncts()[2],
            Filter::field("name", Predicate::Regex("^hm-1$".into()))
        );
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        let compiler = QueryCompiler::new(Uuid::new_v4());
        let params = SearchParams::default().with_field("country", "(");
        let err = compiler.build_filter(&params, false).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern { param: "country", .. }));
    }

    #[test]
    fn set_values_degrade_gracefully() {
        assert_eq!(set_values(r#"["a","b"]"#), vec![json!("a"), json!("b")]);
        assert_eq!(set_values(r#""a""#), vec![json!("a")]);
        assert_eq!(set_values("Kenya"), vec![json!("Kenya")]);
        assert_eq!(set_values("[broken"), vec![json!("[broken")]);
        assert_eq!(set_values("123"), vec![json!(123), json!("123")]);
    }
}
