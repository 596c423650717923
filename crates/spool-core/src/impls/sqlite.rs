//! SQLite-backed item and task-statistics store.
//!
//! Several processes may open the same database file. Every mutation runs in
//! an IMMEDIATE transaction, which takes the database write lock up front, so
//! the `UPDATE ... WHERE queue_expire = ?` claim is atomic across processes.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use crate::domain::{ItemId, Pid, QueueItem, StoreError, TaskRecord};
use crate::ports::{ItemStore, TaskStatsStore};

const SCHEMA_VERSION: i64 = 1;

/// How long a writer waits for another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str = "queue_id, queue_name, queue_data, queue_created, queue_expire";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StoreError::Driver(format!("open sqlite store: {e}")))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Driver(format!("open sqlite store: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StoreError::Driver(format!("set busy timeout: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS spool_schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )
        .map_err(|e| StoreError::Driver(format!("init migration table: {e}")))?;

        let current: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM spool_schema_migrations",
                [],
                |r| r.get(0),
            )
            .map_err(|e| StoreError::Driver(format!("read schema version: {e}")))?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::Driver(format!(
                "schema version {current} is newer than supported {SCHEMA_VERSION}"
            )));
        }
        if current < 1 {
            apply_migration_v1(&conn)?;
            record_migration(&conn, 1, "queue_and_tasks")?;
        }
        Ok(())
    }

    /// Run `f` in an IMMEDIATE transaction on the blocking pool; commit on
    /// `Ok`, roll back on `Err`.
    ///
    /// The lock wait (up to [`BUSY_TIMEOUT`]) happens off the async workers.
    async fn write<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            let tx = guard
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| StoreError::transaction(op, e))?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit().map_err(|e| StoreError::transaction(op, e))?;
                    Ok(value)
                }
                Err(e) => {
                    if let Err(rollback) = tx.rollback() {
                        tracing::warn!(op, error = %rollback, "sqlite rollback failed");
                    }
                    Err(StoreError::Driver(format!("{op}: {e}")))
                }
            }
        })
        .await
        .map_err(|e| StoreError::Driver(format!("{op}: spawn_blocking failed: {e}")))?
    }

    async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard).map_err(|e| StoreError::Driver(format!("{op}: {e}")))
        })
        .await
        .map_err(|e| StoreError::Driver(format!("{op}: spawn_blocking failed: {e}")))?
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn insert(
        &self,
        queue_name: &str,
        payload: &[u8],
        created_at: i64,
    ) -> Result<ItemId, StoreError> {
        let queue_name = queue_name.to_string();
        let payload = payload.to_vec();
        self.write("insert item", move |tx| {
            tx.execute(
                "INSERT INTO queue (queue_name, queue_data, queue_created, queue_expire)
                 VALUES (?1, ?2, ?3, 0)",
                params![queue_name, payload, created_at.to_string()],
            )?;
            Ok(ItemId::new(tx.last_insert_rowid()))
        })
        .await
    }

    async fn oldest_unclaimed(&self, queue_name: &str) -> Result<Option<QueueItem>, StoreError> {
        let queue_name = queue_name.to_string();
        self.read("select oldest unclaimed", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM queue
                     WHERE queue_name = ?1 AND queue_expire = 0
                     ORDER BY CAST(queue_created AS INTEGER) ASC, queue_id ASC
                     LIMIT 1"
                ),
                params![queue_name],
                map_item,
            )
            .optional()
        })
        .await
    }

    async fn compare_and_set_expire(
        &self,
        id: ItemId,
        expected: i64,
        new: i64,
    ) -> Result<bool, StoreError> {
        self.write("claim item", move |tx| {
            let changed = tx.execute(
                "UPDATE queue SET queue_expire = ?3 WHERE queue_id = ?1 AND queue_expire = ?2",
                params![id.as_i64(), expected, new],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn reset_expire(&self, id: ItemId) -> Result<(), StoreError> {
        self.write("release item", move |tx| {
            tx.execute(
                "UPDATE queue SET queue_expire = 0 WHERE queue_id = ?1",
                params![id.as_i64()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: ItemId) -> Result<(), StoreError> {
        self.write("delete item", move |tx| {
            tx.execute("DELETE FROM queue WHERE queue_id = ?1", params![id.as_i64()])?;
            Ok(())
        })
        .await
    }

    async fn delete_older_than(&self, queue_name: &str, cutoff: i64) -> Result<u64, StoreError> {
        let queue_name = queue_name.to_string();
        self.write("evict aged items", move |tx| {
            let deleted = tx.execute(
                "DELETE FROM queue
                 WHERE queue_name = ?1 AND CAST(queue_created AS INTEGER) < ?2",
                params![queue_name, cutoff],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn reclaim_expired(&self, now: i64) -> Result<u64, StoreError> {
        self.write("reclaim leases", move |tx| {
            let reset = tx.execute(
                "UPDATE queue SET queue_expire = 0 WHERE queue_expire > 0 AND queue_expire < ?1",
                params![now],
            )?;
            Ok(reset as u64)
        })
        .await
    }

    async fn delete_queue(&self, queue_name: &str) -> Result<u64, StoreError> {
        let queue_name = queue_name.to_string();
        self.write("delete queue", move |tx| {
            let deleted = tx.execute("DELETE FROM queue WHERE queue_name = ?1", params![queue_name])?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn count(&self, queue_name: &str) -> Result<u64, StoreError> {
        let queue_name = queue_name.to_string();
        self.read("count items", move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM queue WHERE queue_name = ?1",
                params![queue_name],
                |r| r.get::<_, i64>(0),
            )
            .map(|n| n as u64)
        })
        .await
    }

    async fn list(&self, queue_name: &str) -> Result<Vec<QueueItem>, StoreError> {
        let queue_name = queue_name.to_string();
        self.read("list items", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM queue
                 WHERE queue_name = ?1
                 ORDER BY CAST(queue_created AS INTEGER) ASC, queue_id ASC"
            ))?;
            let rows = stmt.query_map(params![queue_name], map_item)?;
            rows.collect()
        })
        .await
    }
}

#[async_trait]
impl TaskStatsStore for SqliteStore {
    async fn get(&self, pid: &Pid) -> Result<Option<TaskRecord>, StoreError> {
        let pid = pid.as_str().to_string();
        self.read("select task", move |conn| {
            conn.query_row(
                "SELECT tasks_pid, tasks_executions, tasks_lastrun, tasks_last_runtime
                 FROM tasks WHERE tasks_pid = ?1",
                params![pid],
                map_task,
            )
            .optional()
        })
        .await
    }

    async fn register(&self, pid: &Pid) -> Result<(), StoreError> {
        let pid = pid.as_str().to_string();
        self.write("register task", move |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO tasks (tasks_pid, tasks_executions, tasks_lastrun, tasks_last_runtime)
                 VALUES (?1, 0, NULL, 0)",
                params![pid],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_run(
        &self,
        pid: &Pid,
        ran_at: DateTime<Utc>,
        runtime_secs: f64,
    ) -> Result<bool, StoreError> {
        let pid = pid.as_str().to_string();
        let ran_at = ran_at.to_rfc3339();
        self.write("update task statistics", move |tx| {
            let changed = tx.execute(
                "UPDATE tasks
                 SET tasks_executions = COALESCE(tasks_executions, 0) + 1,
                     tasks_lastrun = ?2,
                     tasks_last_runtime = ?3
                 WHERE tasks_pid = ?1",
                params![pid, ran_at, runtime_secs],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}

fn map_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let created: String = row.get(3)?;
    let created_at = created
        .trim()
        .parse::<i64>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(QueueItem {
        id: ItemId::new(row.get(0)?),
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        created_at,
        expire_at: row.get(4)?,
    })
}

fn map_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let pid: String = row.get(0)?;
    let executions: Option<i64> = row.get(1)?;
    let last_run: Option<String> = row.get(2)?;
    let last_runtime: Option<f64> = row.get(3)?;

    let last_run = last_run
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(TaskRecord {
        pid: Pid::new(pid),
        executions: executions.unwrap_or(0).max(0) as u64,
        last_run,
        last_runtime: last_runtime.unwrap_or(0.0),
    })
}

fn apply_migration_v1(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS queue (
            queue_id INTEGER PRIMARY KEY AUTOINCREMENT,
            queue_name TEXT NOT NULL,
            queue_data BLOB NOT NULL,
            queue_created TEXT NOT NULL,
            queue_expire INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_queue_claim
            ON queue (queue_name, queue_expire, queue_created, queue_id);
        CREATE INDEX IF NOT EXISTS idx_queue_expire ON queue (queue_expire);

        CREATE TABLE IF NOT EXISTS tasks (
            tasks_pid TEXT PRIMARY KEY,
            tasks_executions INTEGER,
            tasks_lastrun TEXT,
            tasks_last_runtime REAL
        );",
    )
    .map_err(|e| StoreError::Driver(format!("apply migration v1: {e}")))
}

fn record_migration(conn: &Connection, version: i64, name: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO spool_schema_migrations (version, name, applied_at)
         VALUES (?1, ?2, ?3)",
        params![version, name, Utc::now().to_rfc3339()],
    )
    .map_err(|e| StoreError::Driver(format!("record migration {version}: {e}")))?;
    Ok(())
}
