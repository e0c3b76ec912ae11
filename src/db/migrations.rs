use rusqlite::Connection;

use crate::error::TaskhubError;

pub fn run_migrations(conn: &Connection) -> Result<(), TaskhubError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            age REAL,
            role TEXT NOT NULL DEFAULT 'member'
                CHECK (role IN ('member', 'manager', 'admin')),
            is_active INTEGER NOT NULL DEFAULT 1,
            phone_number TEXT,
            address TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in-progress', 'completed', 'cancelled')),
            completed INTEGER NOT NULL DEFAULT 0,
            priority TEXT NOT NULL DEFAULT 'medium'
                CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
            deadline TEXT NOT NULL,
            completed_at TEXT,
            assigned_user TEXT,
            assigned_user_name TEXT NOT NULL DEFAULT 'unassigned',
            tags TEXT NOT NULL DEFAULT '[]',
            estimated_hours REAL,
            actual_hours REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_pending_tasks (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            task_id TEXT NOT NULL,
            PRIMARY KEY (user_id, task_id)
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);
        CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks(deadline);
        CREATE INDEX IF NOT EXISTS idx_tasks_assigned_user ON tasks(assigned_user);
        CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);
        CREATE INDEX IF NOT EXISTS idx_users_is_active ON users(is_active);
        CREATE INDEX IF NOT EXISTS idx_pending_task ON user_pending_tasks(task_id);
        ",
    )?;
    Ok(())
}
