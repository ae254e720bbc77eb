//! Job registry: the durable record of every submission.
//!
//! Rows are created by the ingress gate and mutated only by workers.
//! Status advances along exactly one of two paths
//! (`QUEUED -> PROCESSING -> COMPLETED|FAILED`); every mutation here is
//! guarded by a `WHERE status = ...` clause so an illegal transition is
//! a no-op at the SQL level, not just a convention.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::info;

use crucible_protocol::{JobId, JobStatus};

use crate::error::Result;
use crate::pool::DbPool;

/// One registry row.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub logs: Option<String>,
}

/// Outcome of a worker's attempt to take a job into `PROCESSING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingGate {
    /// Row advanced `QUEUED -> PROCESSING`; run the pipeline.
    Started,
    /// Row was already `PROCESSING` (a prior consumer died mid-run and
    /// the message was redelivered); run the pipeline again.
    Resumed,
    /// Row is terminal; this is a redelivered message for finished work.
    /// Ack without touching anything.
    AlreadyTerminal(JobStatus),
    /// No such row. Only possible under operator intervention; ack and
    /// drop, never retry.
    Missing,
}

pub struct JobRegistry {
    pool: DbPool,
}

impl JobRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a fresh `QUEUED` row. `created_at` is assigned here.
    pub async fn insert_queued(&self, job_id: &JobId, filename: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, filename, status, created_at, logs)
            VALUES (?, ?, 'QUEUED', ?, NULL)
            "#,
        )
        .bind(job_id.as_str())
        .bind(filename)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!("Registered job {} ({})", job_id, filename);
        Ok(())
    }

    pub async fn fetch(&self, job_id: &JobId) -> Result<Option<Job>> {
        let job: Option<Job> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Advance a job into `PROCESSING`, with the idempotency guard for
    /// redelivered messages: terminal rows are left untouched.
    pub async fn begin_processing(&self, job_id: &JobId) -> Result<ProcessingGate> {
        let advanced = sqlx::query(
            r#"
            UPDATE jobs SET status = 'PROCESSING'
            WHERE id = ? AND status = 'QUEUED'
            "#,
        )
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if advanced == 1 {
            return Ok(ProcessingGate::Started);
        }

        match self.fetch(job_id).await? {
            None => Ok(ProcessingGate::Missing),
            Some(job) if job.status.is_terminal() => {
                Ok(ProcessingGate::AlreadyTerminal(job.status))
            }
            Some(_) => Ok(ProcessingGate::Resumed),
        }
    }

    /// Commit a terminal `COMPLETED` row with the merged output.
    pub async fn complete(&self, job_id: &JobId, logs: &str) -> Result<()> {
        self.finish(job_id, JobStatus::Completed, logs).await
    }

    /// Commit a terminal `FAILED` row with the diagnostic.
    pub async fn fail(&self, job_id: &JobId, logs: &str) -> Result<()> {
        self.finish(job_id, JobStatus::Failed, logs).await
    }

    async fn finish(&self, job_id: &JobId, status: JobStatus, logs: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET status = ?, logs = ?
            WHERE id = ? AND status = 'PROCESSING'
            "#,
        )
        .bind(status)
        .bind(logs)
        .bind(job_id.as_str())
        .execute(&self.pool)
        .await?;

        info!("Job {} -> {}", job_id, status);
        Ok(())
    }
}
