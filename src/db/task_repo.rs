use std::collections::HashSet;

use chrono::Duration;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use super::connection::in_transaction;
use super::sql::{order_by, Clause};
use super::user_repo;
use crate::error::TaskhubError;
use crate::models::{
    resolve_status, timestamp, Priority, Task, TaskDraft, TaskPayload, TaskStatus, UNASSIGNED,
};
use crate::query::{Filter, Scalar, SortKey, TASKS};
use crate::relations;

const TASK_COLUMNS: &str = "id, name, description, status, completed, priority, deadline,
    completed_at, assigned_user, assigned_user_name, tags, estimated_hours, actual_hours,
    created_at, updated_at";

/// Stored completion check, matching both the flag and the status string.
const OPEN_TASK: &str = "completed = 0 AND status NOT IN ('completed', 'done')";

pub fn find_tasks(
    conn: &Connection,
    filter: &Filter,
    sort: &[SortKey],
    skip: u32,
    limit: u32,
) -> Result<Vec<Task>, TaskhubError> {
    let clause = Clause::compile(filter);
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE {} {} LIMIT {limit} OFFSET {skip}",
        clause.sql,
        order_by(sort)
    );
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_from_iter(clause.params.iter()), row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn count_tasks(conn: &Connection, filter: &Filter) -> Result<u64, TaskhubError> {
    let clause = Clause::compile(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM tasks WHERE {}", clause.sql),
        params_from_iter(clause.params.iter()),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn find_task(conn: &Connection, id: &str) -> Result<Option<Task>, TaskhubError> {
    Ok(conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            row_to_task,
        )
        .optional()?)
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Task, TaskhubError> {
    find_task(conn, id)?.ok_or_else(|| TaskhubError::task_not_found(id))
}

/// Create a task and attach it to its assignee's pending list.
pub fn create_task(conn: &Connection, draft: TaskDraft) -> Result<Task, TaskhubError> {
    in_transaction(conn, |conn| {
        let now = timestamp::now();
        let task = materialize(
            conn,
            ulid::Ulid::new().to_string(),
            draft,
            None,
            now,
            now,
        )?;
        conn.execute(
            &format!(
                "INSERT INTO tasks ({TASK_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                task.id,
                task.name,
                task.description,
                task.status.as_str(),
                task.completed,
                task.priority.as_str(),
                timestamp::format(&task.deadline),
                task.completed_at.as_ref().map(timestamp::format),
                task.assigned_user,
                task.assigned_user_name,
                serde_json::to_string(&task.tags)?,
                task.estimated_hours,
                task.actual_hours,
                timestamp::format(&task.created_at),
                timestamp::format(&task.updated_at),
            ],
        )?;
        relations::attach(conn, &task, task.assigned_user.as_deref())?;
        debug!(task = %task.id, "task created");
        Ok(task)
    })
}

/// Full replacement: every field not in `draft` takes its default.
pub fn replace_task(conn: &Connection, id: &str, draft: TaskDraft) -> Result<Task, TaskhubError> {
    in_transaction(conn, |conn| {
        let current = get_task(conn, id)?;
        write_over(conn, &current, draft)
    })
}

/// Partial update: fields absent from `payload` keep their values.
pub fn update_task(conn: &Connection, id: &str, payload: TaskPayload) -> Result<Task, TaskhubError> {
    in_transaction(conn, |conn| {
        let current = get_task(conn, id)?;
        let draft = payload.merge_onto(&current);
        write_over(conn, &current, draft)
    })
}

fn write_over(conn: &Connection, current: &Task, draft: TaskDraft) -> Result<Task, TaskhubError> {
    let task = materialize(
        conn,
        current.id.clone(),
        draft,
        current.completed_at,
        current.created_at,
        timestamp::now(),
    )?;
    store(conn, &task)?;
    relations::reconcile(conn, Some(current), &task)?;
    debug!(task = %task.id, status = task.status.as_str(), "task updated");
    Ok(task)
}

fn store(conn: &Connection, task: &Task) -> Result<(), TaskhubError> {
    conn.execute(
        "UPDATE tasks SET name = ?2, description = ?3, status = ?4, completed = ?5,
            priority = ?6, deadline = ?7, completed_at = ?8, assigned_user = ?9,
            assigned_user_name = ?10, tags = ?11, estimated_hours = ?12, actual_hours = ?13,
            updated_at = ?14
         WHERE id = ?1",
        params![
            task.id,
            task.name,
            task.description,
            task.status.as_str(),
            task.completed,
            task.priority.as_str(),
            timestamp::format(&task.deadline),
            task.completed_at.as_ref().map(timestamp::format),
            task.assigned_user,
            task.assigned_user_name,
            serde_json::to_string(&task.tags)?,
            task.estimated_hours,
            task.actual_hours,
            timestamp::format(&task.updated_at),
        ],
    )?;
    Ok(())
}

/// Derive the stored record: completion flag from status, first completion
/// time, and the display name of the assignee.
fn materialize(
    conn: &Connection,
    id: String,
    draft: TaskDraft,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
) -> Result<Task, TaskhubError> {
    let completed = draft.completed();
    let assigned_user_name = match draft.assigned_user_name {
        Some(name) => name,
        None => match draft.assigned_user.as_deref() {
            Some(user_id) => user_repo::find_user(conn, user_id)?
                .map(|u| u.name)
                .unwrap_or_else(|| UNASSIGNED.to_string()),
            None => UNASSIGNED.to_string(),
        },
    };
    Ok(Task {
        id,
        name: draft.name,
        description: draft.description,
        status: draft.status,
        completed,
        priority: draft.priority,
        deadline: draft.deadline,
        completed_at: completed_at.or(completed.then_some(updated_at)),
        assigned_user: draft.assigned_user,
        assigned_user_name,
        tags: draft.tags,
        estimated_hours: draft.estimated_hours,
        actual_hours: draft.actual_hours,
        created_at,
        updated_at,
    })
}

/// Detach from the assignee, then remove the record.
pub fn delete_task(conn: &Connection, id: &str) -> Result<(), TaskhubError> {
    in_transaction(conn, |conn| {
        let task = get_task(conn, id)?;
        relations::detach(conn, &task.id, task.assigned_user.as_deref())?;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        debug!(task = id, "task deleted");
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Set status/completion on many tasks at once.
pub fn batch_update(
    conn: &Connection,
    ids: &[String],
    status: Option<TaskStatus>,
    completed: Option<bool>,
) -> Result<BatchOutcome, TaskhubError> {
    let mut errors = Vec::new();
    if ids.is_empty() {
        errors.push("taskIds must be a non-empty array".to_string());
    }
    if status.is_none() && completed.is_none() {
        errors.push("at least one of status or completed is required".to_string());
    }
    if !errors.is_empty() {
        return Err(TaskhubError::validation(errors));
    }
    if let Some(bad) = ids.iter().find(|id| ulid::Ulid::from_string(id).is_err()) {
        return Err(TaskhubError::bad_identifier(bad));
    }

    in_transaction(conn, |conn| {
        let mut outcome = BatchOutcome {
            matched_count: 0,
            modified_count: 0,
        };
        let mut seen = HashSet::new();
        for id in ids.iter().filter(|id| seen.insert(id.as_str())) {
            let Some(current) = find_task(conn, id)? else {
                continue;
            };
            outcome.matched_count += 1;
            let next = resolve_status(status, completed, Some(current.status));
            if next == current.status {
                continue;
            }
            let mut task = current.clone();
            task.status = next;
            task.completed = next == TaskStatus::Completed;
            task.updated_at = timestamp::now();
            if task.completed && task.completed_at.is_none() {
                task.completed_at = Some(task.updated_at);
            }
            store(conn, &task)?;
            relations::reconcile(conn, Some(&current), &task)?;
            outcome.modified_count += 1;
        }
        debug!(
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            "batch update applied"
        );
        Ok(outcome)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    #[serde(rename = "_id")]
    pub key: Option<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUser {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub task_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total_tasks: u64,
    pub status_distribution: Vec<Bucket>,
    pub priority_distribution: Vec<Bucket>,
    pub upcoming_deadline: u64,
    pub overdue_tasks: u64,
    pub top_users_with_most_tasks: Vec<TopUser>,
}

pub const TOP_USERS: u32 = 5;
pub const UPCOMING_DAYS: i64 = 7;

pub fn task_stats(conn: &Connection) -> Result<TaskStats, TaskhubError> {
    let now = timestamp::now();
    let soon = now + Duration::days(UPCOMING_DAYS);
    let count = |sql: &str, args: &[&str]| -> Result<u64, TaskhubError> {
        let n: i64 = conn.query_row(sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(n as u64)
    };

    let total_tasks = count("SELECT COUNT(*) FROM tasks", &[])?;
    let (now, soon) = (timestamp::format(&now), timestamp::format(&soon));
    let upcoming_deadline = count(
        &format!("SELECT COUNT(*) FROM tasks WHERE deadline >= ?1 AND deadline <= ?2 AND {OPEN_TASK}"),
        &[now.as_str(), soon.as_str()],
    )?;
    let overdue_tasks = count(
        &format!("SELECT COUNT(*) FROM tasks WHERE deadline < ?1 AND {OPEN_TASK}"),
        &[now.as_str()],
    )?;

    let mut stmt = conn.prepare(
        "SELECT t.assigned_user, u.name, u.email, COUNT(*) AS n
         FROM tasks t JOIN users u ON u.id = t.assigned_user
         GROUP BY t.assigned_user
         ORDER BY n DESC, MIN(t.rowid) ASC
         LIMIT ?1",
    )?;
    let top_users_with_most_tasks = stmt
        .query_map(params![TOP_USERS], |row| {
            Ok(TopUser {
                user_id: row.get(0)?,
                user_name: row.get(1)?,
                user_email: row.get(2)?,
                task_count: row.get::<_, i64>(3)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TaskStats {
        total_tasks,
        status_distribution: distribution(conn, "tasks", "status")?,
        priority_distribution: distribution(conn, "tasks", "priority")?,
        upcoming_deadline,
        overdue_tasks,
        top_users_with_most_tasks,
    })
}

/// Histogram over one text column, largest bucket first. Null keys are kept.
pub(crate) fn distribution(conn: &Connection, table: &str, column: &str) -> Result<Vec<Bucket>, TaskhubError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) AS n FROM {table} GROUP BY {column} ORDER BY n DESC, {column} ASC"
    ))?;
    let buckets = stmt
        .query_map([], |row| {
            Ok(Bucket {
                key: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(buckets)
}

/// Keyword search: case-insensitive substring on name or description,
/// narrowed by the equality filters, newest first.
pub fn search_tasks(
    conn: &Connection,
    keyword: Option<&str>,
    equalities: Filter,
    limit: u32,
) -> Result<Vec<Task>, TaskhubError> {
    let mut clauses = vec![equalities];
    if let Some(keyword) = keyword.map(str::trim).filter(|k| !k.is_empty()) {
        let (Some(name), Some(description)) = (TASKS.field("name"), TASKS.field("description")) else {
            return Err(TaskhubError::database("task schema is missing searchable fields"));
        };
        clauses.push(Filter::Or(vec![
            Filter::contains(name, keyword),
            Filter::contains(description, keyword),
        ]));
    }
    let newest_first = TASKS
        .field("createdAt")
        .map(|field| SortKey {
            field,
            descending: true,
        })
        .into_iter()
        .collect::<Vec<_>>();
    find_tasks(conn, &Filter::and(clauses), &newest_first, 0, limit)
}

/// Filter matching the tasks assigned to `user_id`.
pub fn assigned_to(user_id: &str) -> Filter {
    match TASKS.field("assignedUser") {
        Some(field) => Filter::eq(field, Scalar::Text(user_id.to_string())),
        None => Filter::All,
    }
}

pub fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let tags: String = row.get(10)?;
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: TaskStatus::from_str(&row.get::<_, String>(3)?).unwrap_or(TaskStatus::Pending),
        completed: row.get(4)?,
        priority: Priority::from_str(&row.get::<_, String>(5)?).unwrap_or(Priority::Medium),
        deadline: timestamp::from_sql(6, &row.get::<_, String>(6)?)?,
        completed_at: row
            .get::<_, Option<String>>(7)?
            .map(|s| timestamp::from_sql(7, &s))
            .transpose()?,
        assigned_user: row.get(8)?,
        assigned_user_name: row.get(9)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        estimated_hours: row.get(11)?,
        actual_hours: row.get(12)?,
        created_at: timestamp::from_sql(13, &row.get::<_, String>(13)?)?,
        updated_at: timestamp::from_sql(14, &row.get::<_, String>(14)?)?,
    })
}
