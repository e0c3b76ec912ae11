//! Query-string interpretation: `where`, `sort`, `select`, `populate`,
//! `skip`, `limit`, `count`.

use std::collections::HashMap;

use serde_json::Value;

use super::filter::{coerce, parse_where, Filter, Scalar};
use super::projection::Projection;
use super::schema::{FieldDef, RelationDef, Schema, TASKS};
use crate::error::TaskhubError;
use crate::models::{Priority, TaskStatus};

pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_LIMIT: u32 = 10;
/// Task listing and search return more by default.
pub const TASK_LIST_LIMIT: u32 = 100;

/// How to treat a parameter whose JSON cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Fall back to the parameter's default.
    Lenient,
    /// Reject with 400 naming the parameter.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: &'static FieldDef,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Populate {
    pub relation: &'static RelationDef,
    pub projection: Projection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub populate: Vec<Populate>,
    pub skip: u32,
    pub limit: u32,
    pub count_only: bool,
}

impl ListQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            filter: Filter::All,
            sort: Vec::new(),
            projection: Projection::All,
            populate: Vec::new(),
            skip: 0,
            limit,
            count_only: false,
        }
    }

    pub fn parse(
        params: &HashMap<String, String>,
        schema: &'static Schema,
        mode: ParseMode,
        default_limit: u32,
    ) -> Result<Self, TaskhubError> {
        let mut query = Self::new(default_limit);

        match json_param(params, "where", mode)? {
            // A bare word is unparsable JSON as far as `where` is concerned.
            Some(Value::String(_)) if mode == ParseMode::Lenient => {}
            Some(v) => query.filter = parse_where(&v, schema)?,
            None => {}
        }
        if let Some(v) = json_param(params, "sort", mode)? {
            query.sort = parse_sort(&v, schema)?;
        }
        if let Some(v) = json_param(params, "select", mode)? {
            query.projection = Projection::parse(&v, schema, "select")?;
        }
        if let Some(v) = json_param(params, "populate", mode)? {
            query.populate = parse_populate(&v, schema)?;
        }
        if let Some(raw) = params.get("skip") {
            query.skip = parse_bounded(raw, "skip", 0, u32::MAX)?;
        }
        if let Some(raw) = params.get("limit") {
            query.limit = parse_bounded(raw, "limit", 1, MAX_LIMIT)?;
        }
        if let Some(raw) = params.get("count") {
            query.count_only = matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1");
        }
        Ok(query)
    }

    /// The `select` and `populate` parameters of single-record reads.
    pub fn parse_shape(
        params: &HashMap<String, String>,
        schema: &'static Schema,
        mode: ParseMode,
    ) -> Result<(Projection, Vec<Populate>), TaskhubError> {
        let projection = match json_param(params, "select", mode)? {
            Some(v) => Projection::parse(&v, schema, "select")?,
            None => Projection::All,
        };
        let populate = match json_param(params, "populate", mode)? {
            Some(v) => parse_populate(&v, schema)?,
            None => Vec::new(),
        };
        Ok((projection, populate))
    }
}

/// Parameters of keyword search: `keyword`, `status`, `priority`,
/// `userId`/`assignedUser`, `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub filter: Filter,
    pub limit: u32,
}

impl SearchQuery {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, TaskhubError> {
        let schema = &TASKS;
        let text = |name: &str| params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
        let mut clauses = Vec::new();
        let mut errors = Vec::new();

        if let Some(raw) = text("status") {
            match TaskStatus::from_str(raw) {
                Some(status) => clauses.push(field_eq(schema, "status", status.as_str())?),
                None => errors.push("status must be one of pending, in-progress, completed, cancelled".to_string()),
            }
        }
        if let Some(raw) = text("priority") {
            match Priority::from_str(raw) {
                Some(priority) => clauses.push(field_eq(schema, "priority", priority.as_str())?),
                None => errors.push("priority must be one of low, medium, high, urgent".to_string()),
            }
        }
        if !errors.is_empty() {
            return Err(TaskhubError::validation(errors));
        }
        if let Some(user) = text("userId").or_else(|| text("assignedUser")) {
            let field = lookup_field(schema, "assignedUser")?;
            clauses.push(Filter::eq(field, coerce(field, &Value::String(user.to_string()))?));
        }
        let limit = match params.get("limit") {
            Some(raw) => parse_bounded(raw, "limit", 1, MAX_LIMIT)?,
            None => TASK_LIST_LIMIT,
        };
        Ok(Self {
            keyword: text("keyword").map(String::from),
            filter: Filter::and(clauses),
            limit,
        })
    }
}

fn lookup_field(schema: &'static Schema, name: &str) -> Result<&'static FieldDef, TaskhubError> {
    schema
        .field(name)
        .ok_or_else(|| TaskhubError::database(format!("{} has no field {name}", schema.collection)))
}

fn field_eq(schema: &'static Schema, name: &str, value: &str) -> Result<Filter, TaskhubError> {
    Ok(Filter::eq(lookup_field(schema, name)?, Scalar::Text(value.to_string())))
}

/// Read a parameter that may be JSON or a bare string. Only text that looks
/// like a JSON object or array can be malformed; anything else is taken as
/// a string.
fn json_param(
    params: &HashMap<String, String>,
    name: &str,
    mode: ParseMode,
) -> Result<Option<Value>, TaskhubError> {
    let Some(raw) = params.get(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => Ok(Some(v)),
        Err(_) if !raw.starts_with('{') && !raw.starts_with('[') => {
            Ok(Some(Value::String(raw.to_string())))
        }
        Err(e) => match mode {
            ParseMode::Lenient => {
                tracing::debug!(param = name, error = %e, "ignoring malformed query parameter");
                Ok(None)
            }
            ParseMode::Strict => Err(TaskhubError::bad_request(name, format!("malformed JSON ({e})"))),
        },
    }
}

fn parse_bounded(raw: &str, name: &str, min: u32, max: u32) -> Result<u32, TaskhubError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|n| (i64::from(min)..=i64::from(max)).contains(n))
        .map(|n| n as u32)
        .ok_or_else(|| {
            if max == u32::MAX {
                TaskhubError::bad_request(name, "must be a non-negative integer")
            } else {
                TaskhubError::bad_request(name, format!("must be an integer between {min} and {max}"))
            }
        })
}

pub fn parse_sort(value: &Value, schema: &'static Schema) -> Result<Vec<SortKey>, TaskhubError> {
    let lookup = |name: &str| {
        schema
            .field(name)
            .ok_or_else(|| TaskhubError::bad_request("sort", format!("unknown field '{name}'")))
    };
    let mut keys = Vec::new();
    match value {
        Value::Null => {}
        Value::Object(obj) => {
            for (name, direction) in obj {
                let descending = match direction {
                    Value::Number(n) if n.as_f64() == Some(1.0) => false,
                    Value::Number(n) if n.as_f64() == Some(-1.0) => true,
                    Value::String(s) => match s.to_ascii_lowercase().as_str() {
                        "1" | "asc" | "ascending" => false,
                        "-1" | "desc" | "descending" => true,
                        _ => return Err(TaskhubError::bad_request("sort", format!("invalid direction for '{name}'"))),
                    },
                    _ => return Err(TaskhubError::bad_request("sort", format!("invalid direction for '{name}'"))),
                };
                keys.push(SortKey {
                    field: lookup(name)?,
                    descending,
                });
            }
        }
        Value::String(s) => {
            for token in s.split_whitespace() {
                let (name, descending) = match token.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (token.trim_start_matches('+'), false),
                };
                keys.push(SortKey {
                    field: lookup(name)?,
                    descending,
                });
            }
        }
        _ => return Err(TaskhubError::bad_request("sort", "expected an object or a string")),
    }
    Ok(keys)
}

pub fn parse_populate(value: &Value, schema: &'static Schema) -> Result<Vec<Populate>, TaskhubError> {
    let relation = |path: &str| {
        schema.relation(path).ok_or_else(|| {
            TaskhubError::bad_request("populate", format!("cannot populate '{path}' on {}", schema.collection))
        })
    };
    let mut out: Vec<Populate> = Vec::new();
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for item in items {
        match item {
            Value::String(paths) => {
                for path in paths.split_whitespace() {
                    out.push(Populate {
                        relation: relation(path)?,
                        projection: Projection::All,
                    });
                }
            }
            Value::Object(obj) => {
                let path = obj
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| TaskhubError::bad_request("populate", "'path' is required"))?;
                let relation = relation(path)?;
                let projection = match obj.get("select") {
                    Some(select) => Projection::parse(select, relation.target, "populate")?,
                    None => Projection::All,
                };
                out.push(Populate { relation, projection });
            }
            _ => return Err(TaskhubError::bad_request("populate", "expected a path or {path, select}")),
        }
    }
    out.dedup_by(|a, b| a.relation == b.relation);
    Ok(out)
}
