//! Schema bootstrap.
//!
//! Both binaries run this at startup; every statement is idempotent so
//! the gateway and any number of workers can race on first boot.

use crate::error::Result;
use crate::pool::DbPool;

const CREATE_JOBS: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id         TEXT PRIMARY KEY,
    filename   TEXT NOT NULL DEFAULT '',
    status     TEXT NOT NULL DEFAULT 'QUEUED',
    created_at TEXT NOT NULL,
    logs       TEXT
)
"#;

#[cfg(feature = "sqlite")]
const CREATE_WORK_QUEUE: &str = r#"
CREATE TABLE IF NOT EXISTS work_queue (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    payload     TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    claimed_by  TEXT,
    claimed_at  TEXT,
    attempts    INTEGER NOT NULL DEFAULT 0
)
"#;

#[cfg(all(feature = "postgres", not(feature = "sqlite")))]
const CREATE_WORK_QUEUE: &str = r#"
CREATE TABLE IF NOT EXISTS work_queue (
    id          BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
    payload     TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    claimed_by  TEXT,
    claimed_at  TEXT,
    attempts    BIGINT NOT NULL DEFAULT 0
)
"#;

const CREATE_QUEUE_READY_IDX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_work_queue_ready
ON work_queue (claimed_at, id)
"#;

/// Create tables and indexes if they do not exist.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(CREATE_JOBS).execute(pool).await?;
    sqlx::query(CREATE_WORK_QUEUE).execute(pool).await?;
    sqlx::query(CREATE_QUEUE_READY_IDX).execute(pool).await?;
    Ok(())
}
