use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use super::connection::in_transaction;
use super::sql::{order_by, Clause};
use super::task_repo::{self, distribution, Bucket};
use crate::error::TaskhubError;
use crate::models::{timestamp, Role, Task, User, UserDraft, UserPayload};
use crate::query::{Filter, SortKey};
use crate::relations;

const USER_COLUMNS: &str =
    "id, name, email, age, role, is_active, phone_number, address, created_at, updated_at";

pub fn find_users(
    conn: &Connection,
    filter: &Filter,
    sort: &[SortKey],
    skip: u32,
    limit: u32,
) -> Result<Vec<User>, TaskhubError> {
    let clause = Clause::compile(filter);
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {} {} LIMIT {limit} OFFSET {skip}",
        clause.sql,
        order_by(sort)
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut users = stmt
        .query_map(params_from_iter(clause.params.iter()), row_to_user)?
        .collect::<Result<Vec<_>, _>>()?;
    for user in &mut users {
        user.pending_tasks = relations::pending_task_ids(conn, &user.id)?;
    }
    Ok(users)
}

pub fn count_users(conn: &Connection, filter: &Filter) -> Result<u64, TaskhubError> {
    let clause = Clause::compile(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users WHERE {}", clause.sql),
        params_from_iter(clause.params.iter()),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn find_user(conn: &Connection, id: &str) -> Result<Option<User>, TaskhubError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()?;
    match user {
        Some(mut user) => {
            user.pending_tasks = relations::pending_task_ids(conn, &user.id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

pub fn get_user(conn: &Connection, id: &str) -> Result<User, TaskhubError> {
    find_user(conn, id)?.ok_or_else(|| TaskhubError::user_not_found(id))
}

/// Duplicate emails surface as `Conflict` through the unique index.
pub fn create_user(conn: &Connection, draft: UserDraft) -> Result<User, TaskhubError> {
    let id = ulid::Ulid::new().to_string();
    let now = timestamp::format(&timestamp::now());
    conn.execute(
        &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"),
        params![
            id,
            draft.name,
            draft.email,
            draft.age,
            draft.role.as_str(),
            draft.is_active,
            draft.phone_number,
            draft.address,
            now,
        ],
    )?;
    debug!(user = %id, "user created");
    get_user(conn, &id)
}

pub fn update_user(conn: &Connection, id: &str, payload: UserPayload) -> Result<User, TaskhubError> {
    let current = get_user(conn, id)?;
    let draft = payload.merge_onto(&current);
    conn.execute(
        "UPDATE users SET name = ?2, email = ?3, age = ?4, role = ?5, is_active = ?6,
            phone_number = ?7, address = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            id,
            draft.name,
            draft.email,
            draft.age,
            draft.role.as_str(),
            draft.is_active,
            draft.phone_number,
            draft.address,
            timestamp::format(&timestamp::now()),
        ],
    )?;
    debug!(user = id, "user updated");
    get_user(conn, id)
}

/// Delete a user and every task assigned to them. Tasks go first, in the same
/// transaction. Returns the number of tasks removed.
pub fn delete_user(conn: &Connection, id: &str) -> Result<u64, TaskhubError> {
    in_transaction(conn, |conn| {
        get_user(conn, id)?;
        let deleted_tasks = conn.execute("DELETE FROM tasks WHERE assigned_user = ?1", params![id])?;
        conn.execute("DELETE FROM user_pending_tasks WHERE user_id = ?1", params![id])?;
        conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        info!(user = id, deleted_tasks, "user deleted with their tasks");
        Ok(deleted_tasks as u64)
    })
}

/// A page of the user's assigned tasks, with the total before paging.
pub fn tasks_for_user(
    conn: &Connection,
    id: &str,
    filter: Filter,
    sort: &[SortKey],
    skip: u32,
    limit: u32,
) -> Result<(Vec<Task>, u64), TaskhubError> {
    get_user(conn, id)?;
    let filter = Filter::and(vec![task_repo::assigned_to(id), filter]);
    let tasks = task_repo::find_tasks(conn, &filter, sort, skip, limit)?;
    let total = task_repo::count_tasks(conn, &filter)?;
    Ok((tasks, total))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: u64,
    pub active_users: u64,
    pub inactive_users: u64,
    pub role_distribution: Vec<Bucket>,
}

pub fn user_stats(conn: &Connection) -> Result<UserStats, TaskhubError> {
    let (total, active): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM users",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(UserStats {
        total_users: total as u64,
        active_users: active as u64,
        inactive_users: (total - active) as u64,
        role_distribution: distribution(conn, "users", "role")?,
    })
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        age: row.get(3)?,
        role: Role::from_str(&row.get::<_, String>(4)?).unwrap_or(Role::Member),
        is_active: row.get(5)?,
        phone_number: row.get(6)?,
        address: row.get(7)?,
        pending_tasks: Vec::new(),
        created_at: timestamp::from_sql(8, &row.get::<_, String>(8)?)?,
        updated_at: timestamp::from_sql(9, &row.get::<_, String>(9)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::ErrorCode;
    use crate::models::TaskPayload;
    use serde_json::json;

    fn create(db: &Database, body: serde_json::Value) -> Result<User, TaskhubError> {
        db.with_conn(|conn| create_user(conn, UserPayload::from_json(&body)?.into_draft()?))
    }

    #[test]
    fn duplicate_email_conflicts() {
        let db = Database::in_memory().unwrap();
        create(&db, json!({"name": "Ann", "email": "ann@example.com"})).unwrap();
        let err = create(&db, json!({"name": "Other", "email": "ANN@example.com"})).unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
        assert!(err.message.contains("email"));
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let db = Database::in_memory().unwrap();
        let user = create(&db, json!({"name": "Ann", "email": "ann@example.com", "age": 30})).unwrap();
        let updated = db
            .with_conn(|conn| update_user(conn, &user.id, UserPayload::from_json(&json!({"role": "admin"}))?))
            .unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.age, Some(30.0));
        assert_eq!(updated.email, "ann@example.com");
    }

    #[test]
    fn delete_cascades_to_tasks() {
        let db = Database::in_memory().unwrap();
        let ann = create(&db, json!({"name": "Ann", "email": "ann@example.com"})).unwrap();
        let bob = create(&db, json!({"name": "Bob", "email": "bob@example.com"})).unwrap();
        let task_ids: Vec<String> = db
            .with_conn(|conn| {
                let mut ids = Vec::new();
                for owner in [&ann.id, &ann.id, &bob.id] {
                    let draft = TaskPayload::from_json(&json!({
                        "name": "T", "deadline": "2099-01-01", "assignedUser": owner
                    }))?
                    .into_draft()?;
                    ids.push(task_repo::create_task(conn, draft)?.id);
                }
                Ok(ids)
            })
            .unwrap();

        let deleted = db.with_conn(|conn| delete_user(conn, &ann.id)).unwrap();
        assert_eq!(deleted, 2);
        db.with_conn(|conn| {
            assert!(task_repo::find_task(conn, &task_ids[0])?.is_none());
            assert!(task_repo::find_task(conn, &task_ids[1])?.is_none());
            assert!(task_repo::find_task(conn, &task_ids[2])?.is_some());
            assert!(find_user(conn, &ann.id)?.is_none());
            Ok(())
        })
        .unwrap();

        let err = db.with_conn(|conn| delete_user(conn, &ann.id)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn tasks_for_user_pages() {
        let db = Database::in_memory().unwrap();
        let ann = create(&db, json!({"name": "Ann", "email": "ann@example.com"})).unwrap();
        db.with_conn(|conn| {
            for i in 0..3 {
                let draft = TaskPayload::from_json(&json!({
                    "name": format!("T{i}"), "deadline": "2099-01-01", "userId": ann.id
                }))?
                .into_draft()?;
                task_repo::create_task(conn, draft)?;
            }
            Ok(())
        })
        .unwrap();
        let (page, total) = db
            .with_conn(|conn| tasks_for_user(conn, &ann.id, Filter::All, &[], 1, 10))
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "T1");

        let missing = ulid::Ulid::new().to_string();
        let err = db
            .with_conn(|conn| tasks_for_user(conn, &missing, Filter::All, &[], 0, 10))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn stats_by_role_and_activity() {
        let db = Database::in_memory().unwrap();
        create(&db, json!({"name": "Ann", "email": "a@example.com", "role": "admin"})).unwrap();
        create(&db, json!({"name": "Bob", "email": "b@example.com", "isActive": false})).unwrap();
        create(&db, json!({"name": "Cy", "email": "c@example.com"})).unwrap();
        let stats = db.with_conn(user_stats).unwrap();
        assert_eq!((stats.total_users, stats.active_users, stats.inactive_users), (3, 2, 1));
        assert_eq!(stats.role_distribution[0], Bucket { key: Some("member".into()), count: 2 });
    }
}
