use serde_json::Value;

use super::schema::Schema;
use crate::error::TaskhubError;
use crate::models::json_bool;

/// Which document keys to emit.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    #[default]
    All,
    Include {
        fields: Vec<&'static str>,
        keep_id: bool,
    },
    Exclude(Vec<&'static str>),
}

impl Projection {
    /// Accepts `["name", "deadline"]`, `{"name": 1}` / `{"description": 0}`,
    /// or `"name -_id"`. Any other shape selects every field.
    pub fn parse(value: &Value, schema: &'static Schema, param: &str) -> Result<Self, TaskhubError> {
        let mut entries: Vec<(String, bool)> = Vec::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    let name = item
                        .as_str()
                        .ok_or_else(|| TaskhubError::bad_request(param, "field names must be strings"))?;
                    entries.push((name.to_string(), true));
                }
            }
            Value::String(s) => {
                for token in s.split(|c: char| c.is_whitespace() || c == ',') {
                    match token.strip_prefix('-') {
                        Some(name) => entries.push((name.to_string(), false)),
                        None => entries.push((token.trim_start_matches('+').to_string(), true)),
                    }
                }
            }
            Value::Object(obj) => {
                for (name, flag) in obj {
                    let include = json_bool(flag).ok_or_else(|| {
                        TaskhubError::bad_request(param, format!("'{name}' must be 1 or 0"))
                    })?;
                    entries.push((name.clone(), include));
                }
            }
            _ => return Ok(Projection::All),
        }

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        let mut id = None;
        for (name, wanted) in entries.iter().filter(|(name, _)| !name.is_empty()) {
            let key = schema
                .document_key(name)
                .ok_or_else(|| TaskhubError::bad_request(param, format!("unknown field '{name}'")))?;
            match (key, *wanted) {
                ("_id", wanted) => id = Some(wanted),
                (key, true) if !include.contains(&key) => include.push(key),
                (key, false) if !exclude.contains(&key) => exclude.push(key),
                _ => {}
            }
        }

        if !include.is_empty() && !exclude.is_empty() {
            return Err(TaskhubError::bad_request(
                param,
                "cannot mix inclusion and exclusion",
            ));
        }
        Ok(match id {
            _ if !include.is_empty() => Projection::Include {
                fields: include,
                keep_id: id != Some(false),
            },
            Some(true) => Projection::Include {
                fields: Vec::new(),
                keep_id: true,
            },
            Some(false) => {
                exclude.push("_id");
                Projection::Exclude(exclude)
            }
            None if exclude.is_empty() => Projection::All,
            None => Projection::Exclude(exclude),
        })
    }

    pub fn includes(&self, key: &str) -> bool {
        match self {
            Projection::All => true,
            Projection::Include { fields, keep_id } => {
                (key == "_id" && *keep_id) || fields.contains(&key)
            }
            Projection::Exclude(fields) => !fields.contains(&key),
        }
    }

    pub fn apply(&self, doc: &mut Value) {
        if *self == Projection::All {
            return;
        }
        if let Value::Object(obj) = doc {
            obj.retain(|key, _| self.includes(key));
        }
    }
}
