//! Rendering records as client documents: projection, then relation
//! expansion.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use super::{task_repo, user_repo};
use crate::error::TaskhubError;
use crate::query::{Populate, Projection, Schema};

pub fn render<T: Serialize>(
    conn: &Connection,
    records: &[T],
    projection: &Projection,
    populate: &[Populate],
) -> Result<Vec<Value>, TaskhubError> {
    records
        .iter()
        .map(|record| render_one(conn, record, projection, populate))
        .collect()
}

pub fn render_one<T: Serialize>(
    conn: &Connection,
    record: &T,
    projection: &Projection,
    populate: &[Populate],
) -> Result<Value, TaskhubError> {
    let mut doc = serde_json::to_value(record)?;
    projection.apply(&mut doc);
    for directive in populate {
        expand(conn, &mut doc, directive)?;
    }
    Ok(doc)
}

/// Replace the id(s) at the relation path with projected documents.
/// Dangling single references become `null`; dangling list entries are
/// dropped.
fn expand(conn: &Connection, doc: &mut Value, directive: &Populate) -> Result<(), TaskhubError> {
    let target = directive.relation.target;
    let Some(slot) = doc.get_mut(directive.relation.path) else {
        return Ok(());
    };
    match slot {
        Value::String(id) => {
            let id = id.clone();
            *slot = fetch(conn, target, &id, &directive.projection)?.unwrap_or(Value::Null);
        }
        Value::Array(ids) => {
            let mut expanded = Vec::with_capacity(ids.len());
            for id in ids.iter().filter_map(Value::as_str) {
                if let Some(found) = fetch(conn, target, id, &directive.projection)? {
                    expanded.push(found);
                }
            }
            *ids = expanded;
        }
        _ => {}
    }
    Ok(())
}

fn fetch(
    conn: &Connection,
    target: &Schema,
    id: &str,
    projection: &Projection,
) -> Result<Option<Value>, TaskhubError> {
    let doc = match target.collection {
        "users" => user_repo::find_user(conn, id)?.map(serde_json::to_value),
        "tasks" => task_repo::find_task(conn, id)?.map(serde_json::to_value),
        _ => None,
    };
    let Some(mut doc) = doc.transpose()? else {
        return Ok(None);
    };
    projection.apply(&mut doc);
    Ok(Some(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{TaskPayload, UserPayload};
    use crate::query::params::parse_populate;
    use crate::query::{TASKS, USERS};
    use serde_json::json;

    #[test]
    fn populates_both_directions() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let ann = user_repo::create_user(
                conn,
                UserPayload::from_json(&json!({"name": "Ann", "email": "ann@example.com"}))?.into_draft()?,
            )?;
            let task = task_repo::create_task(
                conn,
                TaskPayload::from_json(&json!({"name": "T", "deadline": "2099-01-01", "userId": ann.id}))?
                    .into_draft()?,
            )?;

            let pops = parse_populate(&json!({"path": "userId", "select": "name"}), &TASKS)?;
            let doc = render_one(conn, &task, &Projection::All, &pops)?;
            assert_eq!(doc["assignedUser"], json!({"_id": ann.id, "name": "Ann"}));

            let ann = user_repo::get_user(conn, &ann.id)?;
            let pops = parse_populate(&json!("pendingTasks"), &USERS)?;
            let doc = render_one(conn, &ann, &Projection::All, &pops)?;
            assert_eq!(doc["pendingTasks"][0]["name"], "T");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn dangling_reference_becomes_null() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let ghost = ulid::Ulid::new().to_string();
            let task = task_repo::create_task(
                conn,
                TaskPayload::from_json(&json!({"name": "T", "deadline": "2099-01-01", "userId": ghost}))?
                    .into_draft()?,
            )?;
            assert_eq!(task.assigned_user_name, "unassigned");
            let pops = parse_populate(&json!("assignedUser"), &TASKS)?;
            let doc = render_one(conn, &task, &Projection::All, &pops)?;
            assert!(doc["assignedUser"].is_null());
            Ok(())
        })
        .unwrap();
    }
}
