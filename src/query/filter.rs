//! Structured filter expressions built from client `where` documents.

use regex::Regex;
use serde_json::{Map, Value};

use super::schema::{FieldDef, FieldKind, Schema};
use crate::error::TaskhubError;
use crate::models::task::COMPLETED_STATUSES;
use crate::models::{json_bool, json_number, timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Compare {
        field: &'static FieldDef,
        op: CompareOp,
        value: Scalar,
    },
    In {
        field: &'static FieldDef,
        values: Vec<Scalar>,
        negated: bool,
    },
    /// `pattern` is a validated `regex` pattern, flags inlined.
    Regex {
        field: &'static FieldDef,
        pattern: String,
    },
    Exists {
        field: &'static FieldDef,
        present: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn and(mut clauses: Vec<Filter>) -> Filter {
        clauses.retain(|c| *c != Filter::All);
        match clauses.len() {
            0 => Filter::All,
            1 => clauses.remove(0),
            _ => Filter::And(clauses),
        }
    }

    pub fn eq(field: &'static FieldDef, value: Scalar) -> Filter {
        Filter::Compare {
            field,
            op: CompareOp::Eq,
            value,
        }
    }

    /// Case-insensitive substring match.
    pub fn contains(field: &'static FieldDef, needle: &str) -> Filter {
        Filter::Regex {
            field,
            pattern: format!("(?i){}", regex::escape(needle)),
        }
    }

    /// Whether a task is completed, in either the boolean or the historical
    /// string-status shape.
    pub fn completion(schema: &'static Schema, completed: bool) -> Result<Filter, TaskhubError> {
        let (Some(flag), Some(status)) = (schema.field("completed"), schema.field("status")) else {
            return Err(TaskhubError::bad_request("where", "collection has no completion state"));
        };
        let statuses = COMPLETED_STATUSES
            .iter()
            .map(|s| Scalar::Text(s.to_string()))
            .collect();
        Ok(if completed {
            Filter::Or(vec![
                Filter::eq(flag, Scalar::Bool(true)),
                Filter::In {
                    field: status,
                    values: statuses,
                    negated: false,
                },
            ])
        } else {
            Filter::And(vec![
                Filter::Compare {
                    field: flag,
                    op: CompareOp::Ne,
                    value: Scalar::Bool(true),
                },
                Filter::In {
                    field: status,
                    values: statuses,
                    negated: true,
                },
            ])
        })
    }
}

/// Interpret a `where` document against `schema`.
pub fn parse_where(value: &Value, schema: &'static Schema) -> Result<Filter, TaskhubError> {
    match value {
        Value::Null => Ok(Filter::All),
        Value::Object(obj) => parse_document(obj, schema),
        _ => Err(TaskhubError::bad_request("where", "expected a JSON object")),
    }
}

fn parse_document(obj: &Map<String, Value>, schema: &'static Schema) -> Result<Filter, TaskhubError> {
    let legacy_status = schema.completion_synonyms
        && !obj.keys().any(|k| schema.canonical(k) == "completed");
    let mut clauses = Vec::new();

    for (key, value) in obj {
        match key.as_str() {
            "$or" | "$and" => {
                let branches = value
                    .as_array()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        TaskhubError::bad_request("where", format!("{key} expects a non-empty array"))
                    })?
                    .iter()
                    .map(|branch| match branch {
                        Value::Object(sub) => parse_document(sub, schema),
                        _ => Err(TaskhubError::bad_request(
                            "where",
                            format!("{key} branches must be objects"),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                clauses.push(if key == "$or" {
                    Filter::Or(branches)
                } else {
                    Filter::And(branches)
                });
            }
            op if op.starts_with('$') => {
                return Err(TaskhubError::bad_request("where", format!("unknown operator {op}")));
            }
            _ => {
                let field = schema.field(key).ok_or_else(|| {
                    TaskhubError::bad_request("where", format!("unknown field '{key}'"))
                })?;
                if schema.completion_synonyms && !value.is_object() {
                    // `status` alone is read as the completion flag.
                    if field.name == "status" && legacy_status {
                        clauses.push(Filter::completion(schema, status_means_completed(value))?);
                        continue;
                    }
                    if field.name == "completed" {
                        let completed = json_bool(value).ok_or_else(|| {
                            TaskhubError::bad_request("where", "completed must be a boolean")
                        })?;
                        clauses.push(Filter::completion(schema, completed)?);
                        continue;
                    }
                }
                clauses.push(parse_condition(field, value)?);
            }
        }
    }

    Ok(Filter::and(clauses))
}

fn status_means_completed(value: &Value) -> bool {
    let s = match value {
        Value::String(s) => s.trim().to_ascii_lowercase(),
        other => other.to_string(),
    };
    matches!(s.as_str(), "completed" | "done" | "true" | "1")
}

fn parse_condition(field: &'static FieldDef, value: &Value) -> Result<Filter, TaskhubError> {
    let ops = match value {
        Value::Object(ops) => ops,
        Value::Array(_) => {
            return Err(TaskhubError::bad_request(
                "where",
                format!("use $in to match '{}' against a list", field.name),
            ))
        }
        scalar => return Ok(Filter::eq(field, coerce(field, scalar)?)),
    };

    let case_insensitive = match ops.get("$options") {
        None => false,
        Some(Value::String(flags)) if flags.chars().all(|c| "imsx".contains(c)) => flags.contains('i'),
        Some(_) => return Err(TaskhubError::bad_request("where", "invalid $options")),
    };

    let mut clauses = Vec::new();
    for (op, operand) in ops {
        let compare = |cmp: CompareOp| -> Result<Filter, TaskhubError> {
            if field.kind == FieldKind::Tags && !matches!(cmp, CompareOp::Eq | CompareOp::Ne) {
                return Err(TaskhubError::bad_request(
                    "where",
                    format!("'{}' only supports equality", field.name),
                ));
            }
            Ok(Filter::Compare {
                field,
                op: cmp,
                value: coerce(field, operand)?,
            })
        };
        let clause = match op.as_str() {
            "$eq" => compare(CompareOp::Eq)?,
            "$ne" => compare(CompareOp::Ne)?,
            "$gt" => compare(CompareOp::Gt)?,
            "$gte" => compare(CompareOp::Gte)?,
            "$lt" => compare(CompareOp::Lt)?,
            "$lte" => compare(CompareOp::Lte)?,
            "$in" | "$nin" => {
                let items = operand.as_array().ok_or_else(|| {
                    TaskhubError::bad_request("where", format!("{op} expects an array"))
                })?;
                Filter::In {
                    field,
                    values: items
                        .iter()
                        .map(|item| coerce(field, item))
                        .collect::<Result<_, _>>()?,
                    negated: op == "$nin",
                }
            }
            "$regex" => {
                if !matches!(field.kind, FieldKind::Text | FieldKind::Tags | FieldKind::Id) {
                    return Err(TaskhubError::bad_request(
                        "where",
                        format!("$regex is not supported on '{}'", field.name),
                    ));
                }
                let source = operand
                    .as_str()
                    .ok_or_else(|| TaskhubError::bad_request("where", "$regex expects a string"))?;
                let pattern = if case_insensitive {
                    format!("(?i){source}")
                } else {
                    source.to_string()
                };
                Regex::new(&pattern).map_err(|e| TaskhubError::bad_request("where", e.to_string()))?;
                Filter::Regex { field, pattern }
            }
            "$options" if ops.contains_key("$regex") => continue,
            "$exists" => Filter::Exists {
                field,
                present: json_bool(operand)
                    .ok_or_else(|| TaskhubError::bad_request("where", "$exists expects a boolean"))?,
            },
            other => {
                return Err(TaskhubError::bad_request(
                    "where",
                    format!("unsupported operator {other} on '{}'", field.name),
                ))
            }
        };
        clauses.push(clause);
    }

    if clauses.is_empty() {
        return Err(TaskhubError::bad_request(
            "where",
            format!("empty condition on '{}'", field.name),
        ));
    }
    Ok(Filter::and(clauses))
}

/// Convert a JSON operand to the storage representation of `field`.
pub fn coerce(field: &FieldDef, value: &Value) -> Result<Scalar, TaskhubError> {
    let invalid = || {
        TaskhubError::bad_request(
            "where",
            format!("invalid value {value} for '{}'", field.name),
        )
    };
    if value.is_null() {
        return Ok(Scalar::Null);
    }
    match field.kind {
        FieldKind::Id => match value.as_str().map(str::trim) {
            Some("") => Ok(Scalar::Null),
            Some(id) if ulid::Ulid::from_string(id).is_ok() => Ok(Scalar::Text(id.to_string())),
            _ => Err(TaskhubError::bad_identifier(&value.to_string())),
        },
        FieldKind::Text => match value {
            Value::String(s) => Ok(Scalar::Text(s.clone())),
            Value::Number(n) => Ok(Scalar::Text(n.to_string())),
            Value::Bool(b) => Ok(Scalar::Text(b.to_string())),
            _ => Err(invalid()),
        },
        FieldKind::Tags => value
            .as_str()
            .map(|s| Scalar::Text(s.trim().to_lowercase()))
            .ok_or_else(invalid),
        FieldKind::Bool => json_bool(value).map(Scalar::Bool).ok_or_else(invalid),
        FieldKind::Number => match value.as_i64() {
            Some(i) => Ok(Scalar::Int(i)),
            None => json_number(value).map(Scalar::Real).ok_or_else(invalid),
        },
        FieldKind::Timestamp => timestamp::from_json(value)
            .map(|ts| Scalar::Text(timestamp::format(&ts)))
            .ok_or_else(invalid),
    }
}
