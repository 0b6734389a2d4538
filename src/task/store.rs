//! SQLite-backed task store.
//!
//! Persists task records and serves owner-scoped listing queries. All
//! writes to a given row come from the single submit invocation that
//! created it; the mutex only guards the shared connection.

use super::{Task, TaskFilter, TaskKind, TaskStatus};
use crate::error::{GranskaError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    input TEXT NOT NULL,
    output TEXT,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_owner_id ON tasks(owner_id);
CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
"#;

/// SQLite-based task store.
pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (or create) a task store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized task store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory task store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a newly created task. Exactly one row per submit call.
    pub fn insert(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tasks (id, owner_id, kind, status, input, output, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.id.to_string(),
                task.owner_id,
                task.kind.to_string(),
                task.status.to_string(),
                task.input,
                task.output,
                serde_json::to_string(&task.metadata)?,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        debug!("Inserted task {} ({})", task.id, task.kind);
        Ok(())
    }

    /// Replace the task input reference (e.g., with the stored file path).
    pub fn update_input(&self, id: Uuid, input: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tasks SET input = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), input, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Merge metadata keys into the task's metadata. Later writes
    /// add/override keys but never drop prior keys.
    pub fn merge_metadata(&self, id: Uuid, updates: &Map<String, Value>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let existing: String = conn.query_row(
            "SELECT metadata FROM tasks WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;

        let mut merged: Map<String, Value> = serde_json::from_str(&existing)?;
        for (key, value) in updates {
            merged.insert(key.clone(), value.clone());
        }

        conn.execute(
            "UPDATE tasks SET metadata = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(&merged)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Transition a task to Completed with its serialized output.
    ///
    /// Terminal states are sticky: an already-terminal row is left
    /// untouched.
    pub fn complete(&self, id: Uuid, output: &str) -> Result<()> {
        self.finalize(id, TaskStatus::Completed, output)
    }

    /// Transition a task to Failed with a human-readable description.
    pub fn fail(&self, id: Uuid, message: &str) -> Result<()> {
        self.finalize(id, TaskStatus::Failed, message)
    }

    fn finalize(&self, id: Uuid, status: TaskStatus, output: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tasks SET status = ?2, output = ?3, updated_at = ?4
             WHERE id = ?1 AND status NOT IN ('COMPLETED', 'FAILED')",
            params![id.to_string(), status.to_string(), output, Utc::now().to_rfc3339()],
        )?;

        if changed == 0 {
            warn!("Refusing to finalize task {}: already terminal or missing", id);
        }
        Ok(())
    }

    /// Fetch a single task by ID.
    pub fn get(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, kind, status, input, output, metadata, created_at, updated_at
             FROM tasks WHERE id = ?1",
        )?;

        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_task(row)?)),
            None => Ok(None),
        }
    }

    /// List tasks for an owner, newest first, with optional kind/status
    /// filters. Returns the page and the total matching count.
    #[instrument(skip(self))]
    pub fn list(
        &self,
        owner_id: &str,
        filter: &TaskFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Task>, usize)> {
        let conn = self.conn.lock().unwrap();

        let mut where_clause = String::from("owner_id = ?1");
        if filter.kind.is_some() {
            where_clause.push_str(" AND kind = ?2");
        }
        if filter.status.is_some() {
            where_clause.push_str(if filter.kind.is_some() {
                " AND status = ?3"
            } else {
                " AND status = ?2"
            });
        }

        let mut bindings: Vec<String> = vec![owner_id.to_string()];
        if let Some(kind) = filter.kind {
            bindings.push(kind.to_string());
        }
        if let Some(status) = filter.status {
            bindings.push(status.to_string());
        }

        let total: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM tasks WHERE {}", where_clause),
            rusqlite::params_from_iter(bindings.iter()),
            |row| row.get::<_, i64>(0).map(|n| n as usize),
        )?;

        let sql = format!(
            "SELECT id, owner_id, kind, status, input, output, metadata, created_at, updated_at
             FROM tasks WHERE {} ORDER BY created_at DESC LIMIT {} OFFSET {}",
            where_clause, limit, offset
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(bindings.iter()))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(Self::row_to_task(row)?);
        }

        Ok((tasks, total))
    }

    /// Fail out Processing rows that have not been touched since the
    /// cutoff. Reconciliation for tasks orphaned by a crash or client
    /// disconnect; invoked explicitly, never from a background loop.
    pub fn sweep_stale(&self, older_than: chrono::Duration) -> Result<usize> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tasks SET status = 'FAILED',
                 output = 'Task abandoned: processing did not complete',
                 updated_at = ?2
             WHERE status = 'PROCESSING' AND updated_at < ?1",
            params![cutoff, Utc::now().to_rfc3339()],
        )?;

        if changed > 0 {
            info!("Swept {} stale processing task(s)", changed);
        }
        Ok(changed)
    }

    fn row_to_task(row: &Row<'_>) -> Result<Task> {
        let id: String = row.get(0)?;
        let kind: String = row.get(2)?;
        let status: String = row.get(3)?;
        let metadata: String = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(Task {
            id: Uuid::parse_str(&id)
                .map_err(|e| GranskaError::StorageError(format!("Invalid task ID: {}", e)))?,
            owner_id: row.get(1)?,
            kind: kind
                .parse::<TaskKind>()
                .map_err(GranskaError::StorageError)?,
            status: status
                .parse::<TaskStatus>()
                .map_err(GranskaError::StorageError)?,
            input: row.get(4)?,
            output: row.get(5)?,
            metadata: serde_json::from_str(&metadata)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GranskaError::StorageError(format!("Invalid timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task(owner: &str, kind: TaskKind) -> Task {
        let mut metadata = Map::new();
        metadata.insert("fileSize".to_string(), json!(1024));
        Task::new(owner, kind, "sample.mp3", metadata)
    }

    #[test]
    fn insert_and_get() {
        let store = TaskStore::in_memory().unwrap();
        let task = sample_task("user-1", TaskKind::ConversationAnalysis);
        store.insert(&task).unwrap();

        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.owner_id, "user-1");
        assert_eq!(loaded.kind, TaskKind::ConversationAnalysis);
        assert_eq!(loaded.status, TaskStatus::Processing);
        assert_eq!(loaded.metadata["fileSize"], json!(1024));
    }

    #[test]
    fn metadata_merge_keeps_prior_keys() {
        let store = TaskStore::in_memory().unwrap();
        let task = sample_task("user-1", TaskKind::DocumentSummarization);
        store.insert(&task).unwrap();

        let mut updates = Map::new();
        updates.insert("wordCount".to_string(), json!(250));
        updates.insert("fileSize".to_string(), json!(2048));
        store.merge_metadata(task.id, &updates).unwrap();

        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.metadata["fileSize"], json!(2048));
        assert_eq!(loaded.metadata["wordCount"], json!(250));
    }

    #[test]
    fn terminal_states_are_sticky() {
        let store = TaskStore::in_memory().unwrap();
        let task = sample_task("user-1", TaskKind::ImageAnalysis);
        store.insert(&task).unwrap();

        store.complete(task.id, r#"{"description":"a cat"}"#).unwrap();
        store.fail(task.id, "should not apply").unwrap();

        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.output.as_deref(), Some(r#"{"description":"a cat"}"#));
    }

    #[test]
    fn list_is_owner_scoped_and_filtered() {
        let store = TaskStore::in_memory().unwrap();
        let mine = sample_task("user-1", TaskKind::UrlSummarization);
        let theirs = sample_task("user-2", TaskKind::UrlSummarization);
        store.insert(&mine).unwrap();
        store.insert(&theirs).unwrap();
        store.fail(mine.id, "boom").unwrap();

        let (tasks, total) = store
            .list("user-1", &TaskFilter::default(), 50, 0)
            .unwrap();
        assert_eq!(total, 1);
        assert!(tasks.iter().all(|t| t.owner_id == "user-1"));

        let filter = TaskFilter {
            kind: Some(TaskKind::UrlSummarization),
            status: Some(TaskStatus::Failed),
        };
        let (tasks, total) = store.list("user-1", &filter, 50, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);

        let filter = TaskFilter {
            kind: None,
            status: Some(TaskStatus::Completed),
        };
        let (tasks, _) = store.list("user-1", &filter, 50, 0).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn sweep_stale_fails_old_processing_rows() {
        let store = TaskStore::in_memory().unwrap();
        let task = sample_task("user-1", TaskKind::ConversationAnalysis);
        store.insert(&task).unwrap();

        // Nothing stale yet
        assert_eq!(store.sweep_stale(chrono::Duration::hours(1)).unwrap(), 0);

        // Everything updated before "now" is stale
        assert_eq!(store.sweep_stale(chrono::Duration::seconds(-1)).unwrap(), 1);
        let loaded = store.get(task.id).unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Failed);
    }
}
