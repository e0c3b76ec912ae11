//! Keeps each user's pending-task list in step with task assignment and
//! completion. A missing user is never an error: the task write goes on.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, trace};

use crate::error::TaskhubError;
use crate::models::{timestamp, Task};

fn user_exists(conn: &Connection, user_id: &str) -> Result<bool, TaskhubError> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn touch_user(conn: &Connection, user_id: &str) -> Result<(), TaskhubError> {
    conn.execute(
        "UPDATE users SET updated_at = ?1 WHERE id = ?2",
        params![timestamp::format(&timestamp::now()), user_id],
    )?;
    Ok(())
}

/// Add an incomplete task to its user's pending list (once).
pub fn attach(conn: &Connection, task: &Task, user_id: Option<&str>) -> Result<(), TaskhubError> {
    let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
        return Ok(());
    };
    if !user_exists(conn, user_id)? {
        trace!(task = %task.id, user = user_id, "attach skipped: no such user");
        return Ok(());
    }
    if task.completed {
        return Ok(());
    }
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO user_pending_tasks (user_id, task_id) VALUES (?1, ?2)",
        params![user_id, task.id],
    )?;
    if inserted > 0 {
        touch_user(conn, user_id)?;
        debug!(task = %task.id, user = user_id, "task added to pending list");
    }
    Ok(())
}

/// Remove a task from a user's pending list; the user is only rewritten when
/// something was removed.
pub fn detach(conn: &Connection, task_id: &str, user_id: Option<&str>) -> Result<(), TaskhubError> {
    let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
        return Ok(());
    };
    if !user_exists(conn, user_id)? {
        trace!(task = task_id, user = user_id, "detach skipped: no such user");
        return Ok(());
    }
    let removed = conn.execute(
        "DELETE FROM user_pending_tasks WHERE user_id = ?1 AND task_id = ?2",
        params![user_id, task_id],
    )?;
    if removed > 0 {
        touch_user(conn, user_id)?;
        debug!(task = task_id, user = user_id, "task removed from pending list");
    }
    Ok(())
}

/// Apply the effect of a task write on the pending lists. `before` is the
/// prior record, if any.
pub fn reconcile(conn: &Connection, before: Option<&Task>, after: &Task) -> Result<(), TaskhubError> {
    let old_user = before.and_then(|t| t.assigned_user.as_deref());
    let new_user = after.assigned_user.as_deref();
    if old_user != new_user {
        detach(conn, &after.id, old_user)?;
    }
    if new_user.is_some() {
        if after.completed {
            detach(conn, &after.id, new_user)?;
        } else {
            attach(conn, after, new_user)?;
        }
    }
    Ok(())
}

/// Pending task ids for a user, in the order they were attached.
pub fn pending_task_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>, TaskhubError> {
    let mut stmt = conn.prepare(
        "SELECT task_id FROM user_pending_tasks WHERE user_id = ?1 ORDER BY rowid ASC",
    )?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}
