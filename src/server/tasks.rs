use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::error::ApiError;
use super::AppState;
use crate::db::{populate, task_repo};
use crate::error::TaskhubError;
use crate::models::{BatchUpdate, Task, TaskPayload};
use crate::output::json;
use crate::query::params::TASK_LIST_LIMIT;
use crate::query::{ListQuery, ParseMode, Projection, SearchQuery, TASKS};

type ApiResult<T> = Result<T, ApiError>;

/// Path ids must be well-formed before they reach storage.
pub(super) fn parse_id(id: &str) -> Result<String, TaskhubError> {
    let id = id.trim();
    ulid::Ulid::from_string(id)
        .map(|_| id.to_string())
        .map_err(|_| TaskhubError::bad_identifier(id))
}

/// GET /api/tasks
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let query = ListQuery::parse(&params, &TASKS, ParseMode::Lenient, TASK_LIST_LIMIT)?;
    let body = state
        .run(move |conn| {
            let total = task_repo::count_tasks(conn, &query.filter)?;
            if query.count_only {
                return Ok(json::count_only(total));
            }
            let tasks = task_repo::find_tasks(conn, &query.filter, &query.sort, query.skip, query.limit)?;
            let docs = populate::render(conn, &tasks, &query.projection, &query.populate)?;
            Ok(json::page(docs, total, query.skip, query.limit))
        })
        .await?;
    Ok(Json(body))
}

/// GET /api/tasks/{id}
pub async fn show(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let Query(params) = params?;
    let id = parse_id(&id)?;
    let (projection, populate) = ListQuery::parse_shape(&params, &TASKS, ParseMode::Lenient)?;
    let doc = state
        .run(move |conn| {
            let task = task_repo::get_task(conn, &id)?;
            populate::render_one(conn, &task, &projection, &populate)
        })
        .await?;
    Ok(Json(json::success(doc)))
}

/// POST /api/tasks
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let draft = TaskPayload::from_json(&body)?.into_draft()?;
    let task = state.run(move |conn| task_repo::create_task(conn, draft)).await?;
    let doc = serde_json::to_value(task).map_err(TaskhubError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(json::success_with_message("Task created successfully", doc)),
    ))
}

/// PUT /api/tasks/{id}: full replacement.
pub async fn replace(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let draft = TaskPayload::from_json(&body)?.into_draft()?;
    let task = state.run(move |conn| task_repo::replace_task(conn, &id, draft)).await?;
    updated(task)
}

/// PATCH /api/tasks/{id}: partial update.
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let payload = TaskPayload::from_json(&body)?;
    let task = state.run(move |conn| task_repo::update_task(conn, &id, payload)).await?;
    updated(task)
}

fn updated(task: Task) -> ApiResult<Json<Value>> {
    let doc = serde_json::to_value(task).map_err(TaskhubError::from)?;
    Ok(Json(json::success_with_message("Task updated successfully", doc)))
}

/// DELETE /api/tasks/{id}
pub async fn destroy(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    state.run(move |conn| task_repo::delete_task(conn, &id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /api/tasks/batch-update
pub async fn batch_update(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let batch = BatchUpdate::from_json(&body)?;
    let outcome = state
        .run(move |conn| task_repo::batch_update(conn, &batch.task_ids, batch.status, batch.completed))
        .await?;
    Ok(Json(json::success_with_message(
        &format!("{} tasks updated", outcome.modified_count),
        json!(outcome),
    )))
}

/// GET /api/tasks/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = state.run(task_repo::task_stats).await?;
    Ok(Json(json::success(json!(stats))))
}

/// GET /api/tasks/search
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let query = SearchQuery::parse(&params)?;
    let docs = state
        .run(move |conn| {
            let tasks = task_repo::search_tasks(conn, query.keyword.as_deref(), query.filter, query.limit)?;
            populate::render(conn, &tasks, &Projection::All, &[])
        })
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": docs.len(),
        "data": docs
    })))
}
