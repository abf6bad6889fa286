// Communication with the task table
// Philosophy of CRUD lives here, ordering and validation live in the service
// Based on https://github.com/rusqlite/rusqlite/blob/master/examples/persons/main.rs
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::app::error::TaskError;
use crate::app::models::{NewTask, Priority, Task, TaskPatch};

// Persistence contract the task service is written against.
// Every method is atomic on its own. Nothing here sorts, validates or
// defaults; that is the service's job, so any backend behaves the same.
pub trait TaskStore: Send + Sync {
    // Every stored task, in no particular order.
    fn list_all(&self) -> Result<Vec<Task>, TaskError>;

    fn get_by_id(&self, id: i64) -> Result<Task, TaskError>;

    // Persist a new task. The store assigns `id`, `created_at` and `updated_at`.
    fn insert(&self, task: NewTask) -> Result<Task, TaskError>;

    // Apply the present fields of `patch` and refresh `updated_at`.
    fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, TaskError>;

    fn delete(&self, id: i64) -> Result<(), TaskError>;

    // Highest `order` currently stored, 0 for an empty table.
    fn max_order(&self) -> Result<i64, TaskError>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS todos (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    completed   INTEGER NOT NULL DEFAULT 0,
    priority    TEXT NOT NULL DEFAULT 'medium',
    \"order\"   INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);";

const COLUMNS: &str =
    "id, title, description, completed, priority, \"order\", created_at, updated_at";

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Priority::parse)
    }
}

// SQLite backed store, either a file on disk or a private in-memory database
pub struct SqliteStore {
    db_con: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<SqliteStore, TaskError> {
        SqliteStore::with_connection(Connection::open(path)?)
    }

    // Used for serverless deployments and tests; data lives as long as the process
    pub fn open_in_memory() -> Result<SqliteStore, TaskError> {
        SqliteStore::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db_con: Connection) -> Result<SqliteStore, TaskError> {
        db_con.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            db_con: Mutex::new(db_con),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.db_con
            .lock()
            .map_err(|_| TaskError::Backend("sqlite connection lock poisoned".into()))
    }
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        priority: row.get(4)?,
        order: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl TaskStore for SqliteStore {
    // READ
    fn list_all(&self) -> Result<Vec<Task>, TaskError> {
        let db_con = self.connection()?;
        let mut stmt = db_con.prepare(&format!("SELECT {COLUMNS} FROM todos ORDER BY id"))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?;
        Ok(tasks)
    }

    fn get_by_id(&self, id: i64) -> Result<Task, TaskError> {
        self.connection()?
            .query_row(
                &format!("SELECT {COLUMNS} FROM todos WHERE id = ?1"),
                [id],
                row_to_task,
            )
            .optional()?
            .ok_or(TaskError::NotFound(id))
    }

    // CREATE
    fn insert(&self, task: NewTask) -> Result<Task, TaskError> {
        let now = Utc::now();
        let created = self.connection()?.query_row(
            &format!(
                "INSERT INTO todos (title, description, completed, priority, \"order\", created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING {COLUMNS}"
            ),
            params![
                task.title,
                task.description,
                task.completed,
                task.priority,
                task.order,
                now,
                now
            ],
            row_to_task,
        )?;
        Ok(created)
    }

    // UPDATE
    fn update(&self, id: i64, patch: &TaskPatch) -> Result<Task, TaskError> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(title) = &patch.title {
            assignments.push("title = ?");
            values.push(Box::new(title.clone()));
        }
        if let Some(description) = &patch.description {
            assignments.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(completed) = patch.completed {
            assignments.push("completed = ?");
            values.push(Box::new(completed));
        }
        if let Some(priority) = &patch.priority {
            assignments.push("priority = ?");
            values.push(Box::new(priority.clone()));
        }
        if let Some(order) = patch.order {
            assignments.push("\"order\" = ?");
            values.push(Box::new(order));
        }
        assignments.push("updated_at = ?");
        values.push(Box::new(Utc::now()));
        values.push(Box::new(id));

        let sql = format!(
            "UPDATE todos SET {} WHERE id = ? RETURNING {COLUMNS}",
            assignments.join(", ")
        );
        let value_refs: Vec<&dyn ToSql> = values.iter().map(|value| value.as_ref()).collect();

        self.connection()?
            .query_row(&sql, value_refs.as_slice(), row_to_task)
            .optional()?
            .ok_or(TaskError::NotFound(id))
    }

    // DELETE
    fn delete(&self, id: i64) -> Result<(), TaskError> {
        let affected = self
            .connection()?
            .execute("DELETE FROM todos WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(TaskError::NotFound(id));
        }
        Ok(())
    }

    fn max_order(&self) -> Result<i64, TaskError> {
        let max = self.connection()?.query_row(
            "SELECT COALESCE(MAX(\"order\"), 0) FROM todos",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }
}
