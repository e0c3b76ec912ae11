use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    BadRequest,
    BadIdentifier,
    NotFound,
    Conflict,
    DatabaseError,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::BadIdentifier => "BAD_IDENTIFIER",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ServerError => "SERVER_ERROR",
        }
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct TaskhubError {
    pub code: ErrorCode,
    pub message: String,
    /// Per-field messages for validation failures.
    pub errors: Vec<String>,
}

impl TaskhubError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// A validation failure that enumerates every offending field.
    pub fn validation(errors: Vec<String>) -> Self {
        Self {
            code: ErrorCode::ValidationError,
            message: format!("Validation failed: {}", errors.join(", ")),
            errors,
        }
    }

    /// Settings from the environment or flags that cannot be used.
    pub fn config(reason: impl AsRef<str>) -> Self {
        Self::new(
            ErrorCode::ValidationError,
            format!("Invalid configuration: {}", reason.as_ref()),
        )
    }

    /// A query parameter or body that could not be interpreted.
    pub fn bad_request(param: &str, reason: impl AsRef<str>) -> Self {
        Self::new(
            ErrorCode::BadRequest,
            format!("Invalid '{param}' parameter: {}", reason.as_ref()),
        )
    }

    pub fn bad_identifier(id: &str) -> Self {
        Self::new(ErrorCode::BadIdentifier, format!("Invalid resource id: {id}"))
    }

    pub fn task_not_found(id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("Task not found: {id}"))
    }

    pub fn user_not_found(id: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("User not found: {id}"))
    }

    pub fn conflict(field: &str) -> Self {
        Self::new(
            ErrorCode::Conflict,
            format!("{field} already exists, please use another value"),
        )
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl From<rusqlite::Error> for TaskhubError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, Some(ref msg)) = e {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                // "UNIQUE constraint failed: users.email"
                if let Some(column) = msg
                    .strip_prefix("UNIQUE constraint failed: ")
                    .and_then(|cols| cols.split(',').next())
                    .and_then(|col| col.trim().rsplit('.').next())
                {
                    return Self::conflict(column);
                }
            }
        }
        Self::database(e.to_string())
    }
}

impl From<serde_json::Error> for TaskhubError {
    fn from(e: serde_json::Error) -> Self {
        Self::database(format!("serialization: {e}"))
    }
}
