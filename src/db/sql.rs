//! Filter and sort compilation to SQLite.

use rusqlite::types::Value as SqlValue;

use crate::query::{CompareOp, FieldKind, Filter, Scalar, SortKey};

/// A `WHERE` expression with its positional parameters.
#[derive(Debug, Default)]
pub struct Clause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Clause {
    pub fn compile(filter: &Filter) -> Self {
        let mut clause = Self::default();
        clause.sql = clause.push(filter);
        clause
    }

    fn bind(&mut self, value: &Scalar) -> &'static str {
        self.params.push(match value {
            Scalar::Null => SqlValue::Null,
            Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Scalar::Int(i) => SqlValue::Integer(*i),
            Scalar::Real(f) => SqlValue::Real(*f),
            Scalar::Text(s) => SqlValue::Text(s.clone()),
        });
        "?"
    }

    fn push(&mut self, filter: &Filter) -> String {
        match filter {
            Filter::All => "1".to_string(),
            Filter::And(parts) | Filter::Or(parts) if parts.is_empty() => "1".to_string(),
            Filter::And(parts) => self.join(parts, " AND "),
            Filter::Or(parts) => self.join(parts, " OR "),
            Filter::Exists { field, present } => {
                format!("{} IS {}NULL", field.column, if *present { "NOT " } else { "" })
            }
            Filter::Regex { field, pattern } => {
                let p = self.bind(&Scalar::Text(pattern.clone()));
                if field.kind == FieldKind::Tags {
                    format!("EXISTS (SELECT 1 FROM json_each({}) WHERE value REGEXP {p})", field.column)
                } else {
                    format!("{} REGEXP {p}", field.column)
                }
            }
            Filter::Compare { field, op, value } => {
                let column = field.column;
                match (op, value) {
                    (CompareOp::Eq, Scalar::Null) => format!("{column} IS NULL"),
                    (CompareOp::Ne, Scalar::Null) => format!("{column} IS NOT NULL"),
                    (_, Scalar::Null) => "0".to_string(),
                    (CompareOp::Eq | CompareOp::Ne, value) => {
                        let p = self.bind(value);
                        let positive = if field.kind == FieldKind::Tags {
                            format!("EXISTS (SELECT 1 FROM json_each({column}) WHERE value = {p})")
                        } else {
                            format!("{column} = {p}")
                        };
                        if *op == CompareOp::Eq {
                            positive
                        } else {
                            // Absent values are "not equal".
                            format!("NOT COALESCE({positive}, 0)")
                        }
                    }
                    (op, value) => {
                        let symbol = match op {
                            CompareOp::Gt => ">",
                            CompareOp::Gte => ">=",
                            CompareOp::Lt => "<",
                            _ => "<=",
                        };
                        let p = self.bind(value);
                        format!("{column} {symbol} {p}")
                    }
                }
            }
            Filter::In {
                field,
                values,
                negated,
            } => {
                let column = field.column;
                let has_null = values.iter().any(|v| *v == Scalar::Null);
                let placeholders: Vec<&str> = values
                    .iter()
                    .filter(|v| **v != Scalar::Null)
                    .map(|v| self.bind(v))
                    .collect();
                let mut alternatives = Vec::new();
                if !placeholders.is_empty() {
                    let list = placeholders.join(", ");
                    alternatives.push(if field.kind == FieldKind::Tags {
                        format!("EXISTS (SELECT 1 FROM json_each({column}) WHERE value IN ({list}))")
                    } else {
                        format!("{column} IN ({list})")
                    });
                }
                if has_null {
                    alternatives.push(format!("{column} IS NULL"));
                }
                let positive = if alternatives.is_empty() {
                    "0".to_string()
                } else {
                    format!("({})", alternatives.join(" OR "))
                };
                if *negated {
                    format!("NOT COALESCE({positive}, 0)")
                } else {
                    positive
                }
            }
        }
    }

    fn join(&mut self, parts: &[Filter], separator: &str) -> String {
        let compiled: Vec<String> = parts.iter().map(|p| format!("({})", self.push(p))).collect();
        compiled.join(separator)
    }
}

/// `ORDER BY` for the requested keys; insertion order breaks ties.
pub fn order_by(sort: &[SortKey]) -> String {
    let mut terms: Vec<String> = sort
        .iter()
        .map(|key| format!("{} {}", key.field.column, if key.descending { "DESC" } else { "ASC" }))
        .collect();
    terms.push("rowid ASC".to_string());
    format!("ORDER BY {}", terms.join(", "))
}
