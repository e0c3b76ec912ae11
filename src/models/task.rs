use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_bool, json_number, optional_text, pick, timestamp};
use crate::error::TaskhubError;

pub const NAME_MAX_LEN: usize = 200;
pub const UNASSIGNED: &str = "unassigned";

/// Historical status strings that mean "completed".
pub const COMPLETED_STATUSES: [&str; 2] = ["completed", "done"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in-progress" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub completed: bool,
    pub priority: Priority,
    #[serde(with = "timestamp")]
    pub deadline: DateTime<Utc>,
    #[serde(with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    pub assigned_user: Option<String>,
    pub assigned_user_name: String,
    pub tags: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// A complete set of client-controlled task fields, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub assigned_user: Option<String>,
    /// `None` means "derive from the assigned user".
    pub assigned_user_name: Option<String>,
    pub tags: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
}

impl TaskDraft {
    pub fn completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Task fields as supplied by a client, with legacy spellings already
/// folded into canonical ones. Absent fields are `None`; for clearable
/// fields an explicit `null` is `Some(None)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub deadline: Option<DateTime<Utc>>,
    pub assigned_user: Option<Option<String>>,
    pub assigned_user_name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub estimated_hours: Option<Option<f64>>,
    pub actual_hours: Option<Option<f64>>,
}

impl TaskPayload {
    pub fn from_json(body: &Value) -> Result<Self, TaskhubError> {
        let Some(obj) = body.as_object() else {
            return Err(TaskhubError::bad_request("body", "expected a JSON object"));
        };
        let mut errors = Vec::new();
        let mut payload = Self::default();

        if let Some(v) = pick(obj, &["name", "title"]) {
            match v.as_str().map(str::trim) {
                Some("") | None => errors.push("name must be a non-empty string".to_string()),
                Some(s) if s.chars().count() > NAME_MAX_LEN => {
                    errors.push(format!("name must be at most {NAME_MAX_LEN} characters"))
                }
                Some(s) => payload.name = Some(s.to_string()),
            }
        }

        if let Some(v) = obj.get("description") {
            match v {
                Value::Null => payload.description = Some(String::new()),
                Value::String(s) => payload.description = Some(s.trim().to_string()),
                _ => errors.push("description must be a string".to_string()),
            }
        }

        if let Some(v) = pick(obj, &["completed"]).filter(|v| !v.is_null()) {
            match json_bool(v) {
                Some(b) => payload.completed = Some(b),
                None => errors.push("completed must be a boolean".to_string()),
            }
        }

        if let Some(v) = pick(obj, &["status"]).filter(|v| !v.is_null()) {
            match v.as_str().and_then(TaskStatus::from_str) {
                Some(s) => payload.status = Some(s),
                None => errors.push(
                    "status must be one of pending, in-progress, completed, cancelled".to_string(),
                ),
            }
        }

        if let Some(v) = pick(obj, &["priority"]).filter(|v| !v.is_null()) {
            match v.as_str().and_then(Priority::from_str) {
                Some(p) => payload.priority = Some(p),
                None => errors.push("priority must be one of low, medium, high, urgent".to_string()),
            }
        }

        if let Some(v) = pick(obj, &["deadline", "dueDate"]).filter(|v| !v.is_null()) {
            match timestamp::from_json(v) {
                Some(ts) => payload.deadline = Some(ts),
                None => errors.push("deadline must be a valid date".to_string()),
            }
        }

        if let Some(v) = pick(obj, &["assignedUser", "userId"]) {
            match v {
                Value::Null => payload.assigned_user = Some(None),
                Value::String(s) if s.trim().is_empty() => payload.assigned_user = Some(None),
                Value::String(s) if ulid::Ulid::from_string(s.trim()).is_ok() => {
                    payload.assigned_user = Some(Some(s.trim().to_string()))
                }
                _ => return Err(TaskhubError::bad_identifier(&v.to_string())),
            }
        }

        if let Some(v) = pick(obj, &["assignedUserName", "userName"]) {
            payload.assigned_user_name = optional_text(v);
        }

        if let Some(v) = obj.get("tags") {
            match parse_tags(v) {
                Some(tags) => payload.tags = Some(tags),
                None => errors.push("tags must be an array of strings".to_string()),
            }
        }

        for (key, slot) in [
            ("estimatedHours", &mut payload.estimated_hours),
            ("actualHours", &mut payload.actual_hours),
        ] {
            match obj.get(key) {
                None => {}
                Some(Value::Null) => *slot = Some(None),
                Some(v) => match json_number(v) {
                    Some(h) if h >= 0.0 => *slot = Some(Some(h)),
                    _ => errors.push(format!("{key} must be a non-negative number")),
                },
            }
        }

        if errors.is_empty() {
            Ok(payload)
        } else {
            Err(TaskhubError::validation(errors))
        }
    }

    /// Full-record semantics: required fields must be present and every
    /// absent optional field takes its default.
    pub fn into_draft(self) -> Result<TaskDraft, TaskhubError> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name (or title) is required".to_string());
        }
        if self.deadline.is_none() {
            missing.push("deadline (or dueDate) is required".to_string());
        }
        let (Some(name), Some(deadline)) = (self.name, self.deadline) else {
            return Err(TaskhubError::validation(missing));
        };

        Ok(TaskDraft {
            name,
            description: self.description.unwrap_or_default(),
            status: resolve_status(self.status, self.completed, None),
            priority: self.priority.unwrap_or(Priority::Medium),
            deadline,
            assigned_user: self.assigned_user.flatten(),
            assigned_user_name: self.assigned_user_name,
            tags: self.tags.unwrap_or_default(),
            estimated_hours: self.estimated_hours.flatten(),
            actual_hours: self.actual_hours.flatten(),
        })
    }

    /// Partial-update semantics: absent fields keep their current value.
    pub fn merge_onto(self, current: &Task) -> TaskDraft {
        let assigned_user = match self.assigned_user {
            Some(user) => user,
            None => current.assigned_user.clone(),
        };
        // A stale denormalized name must not survive a reassignment.
        let assigned_user_name = match self.assigned_user_name {
            Some(name) => Some(name),
            None if assigned_user == current.assigned_user => {
                Some(current.assigned_user_name.clone())
            }
            None => None,
        };

        TaskDraft {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            description: self.description.unwrap_or_else(|| current.description.clone()),
            status: resolve_status(self.status, self.completed, Some(current.status)),
            priority: self.priority.unwrap_or(current.priority),
            deadline: self.deadline.unwrap_or(current.deadline),
            assigned_user,
            assigned_user_name,
            tags: self.tags.unwrap_or_else(|| current.tags.clone()),
            estimated_hours: self.estimated_hours.unwrap_or(current.estimated_hours),
            actual_hours: self.actual_hours.unwrap_or(current.actual_hours),
        }
    }
}

/// Body of a batch status change: `{taskIds, status?, completed?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchUpdate {
    pub task_ids: Vec<String>,
    pub status: Option<TaskStatus>,
    pub completed: Option<bool>,
}

impl BatchUpdate {
    pub fn from_json(body: &Value) -> Result<Self, TaskhubError> {
        let Some(obj) = body.as_object() else {
            return Err(TaskhubError::bad_request("body", "expected a JSON object"));
        };
        let mut errors = Vec::new();
        let task_ids = match obj.get("taskIds") {
            Some(Value::Array(items)) => match items
                .iter()
                .map(|v| v.as_str().map(|s| s.trim().to_string()))
                .collect::<Option<Vec<_>>>()
            {
                Some(ids) => ids,
                None => {
                    errors.push("taskIds must contain only string ids".to_string());
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };
        let status = match pick(obj, &["status"]).filter(|v| !v.is_null()) {
            Some(v) => match v.as_str().and_then(TaskStatus::from_str) {
                Some(s) => Some(s),
                None => {
                    errors.push(
                        "status must be one of pending, in-progress, completed, cancelled".to_string(),
                    );
                    None
                }
            },
            None => None,
        };
        let completed = match pick(obj, &["completed"]).filter(|v| !v.is_null()) {
            Some(v) => match json_bool(v) {
                Some(b) => Some(b),
                None => {
                    errors.push("completed must be a boolean".to_string());
                    None
                }
            },
            None => None,
        };
        if !errors.is_empty() {
            return Err(TaskhubError::validation(errors));
        }
        Ok(Self {
            task_ids,
            status,
            completed,
        })
    }
}

/// `completed` wins over `status`; the stored pair is always consistent.
pub fn resolve_status(
    status: Option<TaskStatus>,
    completed: Option<bool>,
    current: Option<TaskStatus>,
) -> TaskStatus {
    let open = |s: &TaskStatus| *s != TaskStatus::Completed;
    match completed {
        Some(true) => TaskStatus::Completed,
        Some(false) => status
            .filter(open)
            .or(current.filter(open))
            .unwrap_or(TaskStatus::Pending),
        None => status.or(current).unwrap_or(TaskStatus::Pending),
    }
}

fn parse_tags(value: &Value) -> Option<Vec<String>> {
    let mut tags: Vec<String> = Vec::new();
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                let tag = item.as_str()?.trim().to_lowercase();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        _ => return None,
    }
    Some(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_spellings_are_folded() {
        let p = TaskPayload::from_json(&json!({
            "title": "Write docs",
            "dueDate": "2099-01-01",
            "userId": "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "userName": "Ann"
        }))
        .unwrap();
        assert_eq!(p.name.as_deref(), Some("Write docs"));
        assert!(p.deadline.is_some());
        assert_eq!(
            p.assigned_user,
            Some(Some("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string()))
        );
        assert_eq!(p.assigned_user_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn canonical_name_wins_over_alias() {
        let p = TaskPayload::from_json(&json!({"name": "A", "title": "B"})).unwrap();
        assert_eq!(p.name.as_deref(), Some("A"));
    }

    #[test]
    fn missing_required_fields_are_enumerated() {
        let err = TaskPayload::from_json(&json!({"description": "x"}))
            .unwrap()
            .into_draft()
            .unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err.message.contains("name"));
        assert!(err.message.contains("deadline"));
    }

    #[test]
    fn defaults_on_full_record() {
        let draft = TaskPayload::from_json(&json!({"name": "A", "deadline": "2099-01-01"}))
            .unwrap()
            .into_draft()
            .unwrap();
        assert_eq!(draft.status, TaskStatus::Pending);
        assert!(!draft.completed());
        assert_eq!(draft.priority, Priority::Medium);
        assert_eq!(draft.description, "");
        assert!(draft.assigned_user.is_none());
    }

    #[test]
    fn completed_flag_overrides_status() {
        assert_eq!(
            resolve_status(Some(TaskStatus::Pending), Some(true), None),
            TaskStatus::Completed
        );
        assert_eq!(
            resolve_status(Some(TaskStatus::Completed), Some(false), None),
            TaskStatus::Pending
        );
        assert_eq!(
            resolve_status(None, Some(false), Some(TaskStatus::InProgress)),
            TaskStatus::InProgress
        );
        assert_eq!(
            resolve_status(Some(TaskStatus::from_str("done").unwrap()), None, None),
            TaskStatus::Completed
        );
    }

    #[test]
    fn string_completed_is_coerced() {
        let p = TaskPayload::from_json(&json!({"completed": "true"})).unwrap();
        assert_eq!(p.completed, Some(true));
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = TaskPayload::from_json(&json!({
            "priority": "whenever",
            "estimatedHours": -1,
            "deadline": "soon"
        }))
        .unwrap_err();
        assert_eq!(err.errors.len(), 3);
    }

    #[test]
    fn malformed_assignee_is_bad_identifier() {
        let err = TaskPayload::from_json(&json!({"assignedUser": "42"})).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::BadIdentifier);
    }

    #[test]
    fn tags_are_normalized() {
        let p = TaskPayload::from_json(&json!({"tags": [" Backend", "backend", "DevOps"]})).unwrap();
        assert_eq!(p.tags, Some(vec!["backend".to_string(), "devops".to_string()]));
    }

    #[test]
    fn batch_body_is_parsed() {
        let b = BatchUpdate::from_json(&json!({"taskIds": ["a", "b"], "completed": "true"})).unwrap();
        assert_eq!(b.task_ids, vec!["a", "b"]);
        assert_eq!(b.completed, Some(true));
        let b = BatchUpdate::from_json(&json!({"status": "done"})).unwrap();
        assert!(b.task_ids.is_empty());
        assert_eq!(b.status, Some(TaskStatus::Completed));
        assert!(BatchUpdate::from_json(&json!({"taskIds": [1]})).is_err());
    }

    #[test]
    fn explicit_null_unassigns_on_merge() {
        let current = Task {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".into(),
            name: "A".into(),
            description: String::new(),
            status: TaskStatus::Pending,
            completed: false,
            priority: Priority::Low,
            deadline: timestamp::parse("2099-01-01").unwrap(),
            completed_at: None,
            assigned_user: Some("01BX5ZZKBKACTAV9WEVGEMMVRZ".into()),
            assigned_user_name: "Ann".into(),
            tags: vec![],
            estimated_hours: None,
            actual_hours: None,
            created_at: timestamp::now(),
            updated_at: timestamp::now(),
        };
        let draft = TaskPayload::from_json(&json!({"assignedUser": null}))
            .unwrap()
            .merge_onto(&current);
        assert!(draft.assigned_user.is_none());
        assert!(draft.assigned_user_name.is_none());
        assert_eq!(draft.priority, Priority::Low);
    }
}
