use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_bool, json_number, optional_text, pick, timestamp};
use crate::error::TaskhubError;

pub const AGE_MAX: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Manager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// `user` is the older spelling of `member`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "user" => Some(Self::Member),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub age: Option<f64>,
    pub role: Role,
    pub is_active: bool,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    /// Ids of assigned, incomplete tasks in assignment order.
    pub pending_tasks: Vec<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub age: Option<f64>,
    pub role: Role,
    pub is_active: bool,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

/// User fields as supplied by a client. `pendingTasks` is never accepted
/// from clients and is ignored here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<Option<f64>>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub phone_number: Option<Option<String>>,
    pub address: Option<Option<String>>,
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"))
}

impl UserPayload {
    pub fn from_json(body: &Value) -> Result<Self, TaskhubError> {
        let Some(obj) = body.as_object() else {
            return Err(TaskhubError::bad_request("body", "expected a JSON object"));
        };
        let mut errors = Vec::new();
        let mut payload = Self::default();

        if let Some(v) = pick(obj, &["name"]) {
            match v.as_str().map(str::trim) {
                Some(s) if s.chars().count() >= 2 => payload.name = Some(s.to_string()),
                _ => errors.push("name must be at least 2 characters".to_string()),
            }
        }

        if let Some(v) = pick(obj, &["email"]) {
            match v.as_str().map(|s| s.trim().to_lowercase()) {
                Some(s) if email_pattern().is_match(&s) => payload.email = Some(s),
                _ => errors.push("email must be a valid email address".to_string()),
            }
        }

        match obj.get("age") {
            None => {}
            Some(Value::Null) => payload.age = Some(None),
            Some(v) => match json_number(v) {
                Some(age) if (0.0..=AGE_MAX).contains(&age) => payload.age = Some(Some(age)),
                _ => errors.push(format!("age must be a number between 0 and {AGE_MAX}")),
            },
        }

        if let Some(v) = pick(obj, &["role"]).filter(|v| !v.is_null()) {
            match v.as_str().and_then(Role::from_str) {
                Some(role) => payload.role = Some(role),
                None => errors.push("role must be one of member, manager, admin".to_string()),
            }
        }

        if let Some(v) = pick(obj, &["isActive"]).filter(|v| !v.is_null()) {
            match json_bool(v) {
                Some(b) => payload.is_active = Some(b),
                None => errors.push("isActive must be a boolean".to_string()),
            }
        }

        if let Some(v) = obj.get("phoneNumber") {
            payload.phone_number = Some(optional_text(v));
        }
        if let Some(v) = obj.get("address") {
            payload.address = Some(optional_text(v));
        }

        if errors.is_empty() {
            Ok(payload)
        } else {
            Err(TaskhubError::validation(errors))
        }
    }

    pub fn into_draft(self) -> Result<UserDraft, TaskhubError> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name is required".to_string());
        }
        if self.email.is_none() {
            missing.push("email is required".to_string());
        }
        let (Some(name), Some(email)) = (self.name, self.email) else {
            return Err(TaskhubError::validation(missing));
        };

        Ok(UserDraft {
            name,
            email,
            age: self.age.flatten(),
            role: self.role.unwrap_or(Role::Member),
            is_active: self.is_active.unwrap_or(true),
            phone_number: self.phone_number.flatten(),
            address: self.address.flatten(),
        })
    }

    pub fn merge_onto(self, current: &User) -> UserDraft {
        UserDraft {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            email: self.email.unwrap_or_else(|| current.email.clone()),
            age: self.age.unwrap_or(current.age),
            role: self.role.unwrap_or(current.role),
            is_active: self.is_active.unwrap_or(current.is_active),
            phone_number: self.phone_number.unwrap_or_else(|| current.phone_number.clone()),
            address: self.address.unwrap_or_else(|| current.address.clone()),
        }
    }
}
