use axum::extract::State;
use axum::http::{Method, Uri};
use axum::Json;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::error::{ErrorCode, TaskhubError};
use crate::models::timestamp;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "ok",
        "timestamp": timestamp::format(&timestamp::now()),
        "uptimeSeconds": state.started.elapsed().as_secs()
    }))
}

/// GET /api
pub async fn index() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Taskhub API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "tasks": [
                "GET /api/tasks",
                "POST /api/tasks",
                "GET /api/tasks/stats",
                "GET /api/tasks/search",
                "PATCH /api/tasks/batch-update",
                "GET /api/tasks/{id}",
                "PUT /api/tasks/{id}",
                "PATCH /api/tasks/{id}",
                "DELETE /api/tasks/{id}"
            ],
            "users": [
                "GET /api/users",
                "POST /api/users",
                "GET /api/users/stats",
                "GET /api/users/{id}",
                "PUT /api/users/{id}",
                "PATCH /api/users/{id}",
                "DELETE /api/users/{id}",
                "GET /api/users/{id}/tasks"
            ]
        }
    }))
}

pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError(TaskhubError::new(
        ErrorCode::NotFound,
        format!("Route not found: {method} {}", uri.path()),
    ))
}
