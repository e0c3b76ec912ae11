use std::collections::HashMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::error::ApiError;
use super::tasks::parse_id;
use super::AppState;
use crate::db::{populate, user_repo};
use crate::models::UserPayload;
use crate::output::json;
use crate::query::params::DEFAULT_LIMIT;
use crate::query::{ListQuery, ParseMode, Projection, TASKS, USERS};

type ApiResult<T> = Result<T, ApiError>;

/// GET /api/users
pub async fn list(
    State(state): State<AppState>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let query = ListQuery::parse(&params, &USERS, ParseMode::Strict, DEFAULT_LIMIT)?;
    let body = state
        .run(move |conn| {
            let total = user_repo::count_users(conn, &query.filter)?;
            if query.count_only {
                return Ok(json::count_only(total));
            }
            let users = user_repo::find_users(conn, &query.filter, &query.sort, query.skip, query.limit)?;
            let docs = populate::render(conn, &users, &query.projection, &query.populate)?;
            Ok(json::page(docs, total, query.skip, query.limit))
        })
        .await?;
    Ok(Json(body))
}

/// GET /api/users/{id}
pub async fn show(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let Query(params) = params?;
    let id = parse_id(&id)?;
    let (projection, populate) = ListQuery::parse_shape(&params, &USERS, ParseMode::Strict)?;
    let doc = state
        .run(move |conn| {
            let user = user_repo::get_user(conn, &id)?;
            populate::render_one(conn, &user, &projection, &populate)
        })
        .await?;
    Ok(Json(json::success(doc)))
}

/// POST /api/users
pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let draft = UserPayload::from_json(&body)?.into_draft()?;
    let doc = state
        .run(move |conn| {
            let user = user_repo::create_user(conn, draft)?;
            populate::render_one(conn, &user, &Projection::All, &[])
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json::success_with_message("User created successfully", doc)),
    ))
}

/// PUT|PATCH /api/users/{id}: partial update.
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    let Json(body) = body?;
    let payload = UserPayload::from_json(&body)?;
    let doc = state
        .run(move |conn| {
            let user = user_repo::update_user(conn, &id, payload)?;
            populate::render_one(conn, &user, &Projection::All, &[])
        })
        .await?;
    Ok(Json(json::success_with_message("User updated successfully", doc)))
}

/// DELETE /api/users/{id}: removes the user's tasks too.
pub async fn destroy(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let id = parse_id(&id)?;
    let deleted_tasks = state.run(move |conn| user_repo::delete_user(conn, &id)).await?;
    Ok(Json(json::success_with_message(
        "User and assigned tasks deleted successfully",
        json!({ "deletedTasks": deleted_tasks }),
    )))
}

/// GET /api/users/{id}/tasks
pub async fn tasks(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    params: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id?;
    let Query(params) = params?;
    let id = parse_id(&id)?;
    let query = ListQuery::parse(&params, &TASKS, ParseMode::Strict, DEFAULT_LIMIT)?;
    let body = state
        .run(move |conn| {
            let (tasks, total) =
                user_repo::tasks_for_user(conn, &id, query.filter, &query.sort, query.skip, query.limit)?;
            if query.count_only {
                return Ok(json::count_only(total));
            }
            let docs = populate::render(conn, &tasks, &query.projection, &query.populate)?;
            Ok(json::page(docs, total, query.skip, query.limit))
        })
        .await?;
    Ok(Json(body))
}

/// GET /api/users/stats
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = state.run(user_repo::user_stats).await?;
    Ok(Json(json::success(json!(stats))))
}
