use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::info;

use crate::error::TaskhubError;

use super::migrations;

/// Shared SQLite connection. rusqlite connections are not `Sync`, so every
/// request takes the lock for the duration of its storage work.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) and migrate the database at `path`.
    pub fn open(path: &Path) -> Result<Self, TaskhubError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TaskhubError::database(format!("create dir: {e}")))?;
        }
        let conn = Connection::open(path)?;
        configure_connection(&conn)?;
        migrations::run_migrations(&conn)?;
        info!(path = %path.display(), "database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_owned(),
        })
    }

    pub fn in_memory() -> Result<Self, TaskhubError> {
        let conn = Connection::open_in_memory()?;
        configure_connection(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TaskhubError>
    where
        F: FnOnce(&Connection) -> Result<T, TaskhubError>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling
/// back on error.
pub fn in_transaction<F, T>(conn: &Connection, f: F) -> Result<T, TaskhubError>
where
    F: FnOnce(&Connection) -> Result<T, TaskhubError>,
{
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn configure_connection(conn: &Connection) -> Result<(), TaskhubError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA busy_timeout=5000;
         PRAGMA foreign_keys=ON;",
    )?;
    register_regexp(conn)?;
    Ok(())
}

/// `text REGEXP pattern`, backed by the `regex` crate. The compiled pattern
/// is cached per statement. Non-text operands never match.
fn register_regexp(conn: &Connection) -> Result<(), TaskhubError> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let re = ctx.get_or_create_aux(0, |vr| -> Result<Regex, Box<dyn std::error::Error + Send + Sync>> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            Ok(match ctx.get_raw(1) {
                ValueRef::Text(bytes) => std::str::from_utf8(bytes).map(|s| re.is_match(s)).unwrap_or(false),
                _ => false,
            })
        },
    )?;
    Ok(())
}
