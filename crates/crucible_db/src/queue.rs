//! Work queue: durable point-to-point delivery of pending job ids.
//!
//! At-least-once semantics via atomic claim (UPDATE ... WHERE the row is
//! unclaimed), explicit ack (row deletion), and lease expiry (a claim
//! held past the lease is released for redelivery). A worker that claims
//! one message at a time gets the prefetch-1 behaviour of the design.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info};

use crucible_protocol::QueueMessage;

use crate::error::Result;
use crate::pool::DbPool;

/// A claimed queue message awaiting ack.
#[derive(Debug, Clone, FromRow)]
pub struct Delivery {
    pub id: i64,
    pub payload: String,
    pub attempts: i64,
}

#[derive(Debug, Clone, Copy, FromRow)]
pub struct QueueStats {
    pub ready: i64,
    pub in_flight: i64,
}

pub struct WorkQueue {
    pool: DbPool,
}

impl WorkQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a message. The payload is the serialized wire body
    /// (`{"job_id": "<uuid>"}`).
    pub async fn enqueue(&self, message: &QueueMessage) -> Result<()> {
        let payload = serde_json::to_string(message)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO work_queue (payload, enqueued_at, attempts)
            VALUES (?, ?, 0)
            "#,
        )
        .bind(&payload)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!("Enqueued {}", payload);
        Ok(())
    }

    /// Atomically claim the oldest unclaimed message.
    ///
    /// Claimed messages stay invisible to other consumers until acked or
    /// until their lease expires. Returns `None` when the queue is empty
    /// (or another consumer won the race).
    pub async fn claim(&self, worker_id: &str) -> Result<Option<Delivery>> {
        let mut tx = self.pool.begin().await?;

        let row_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM work_queue
            WHERE claimed_at IS NULL
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row_id) = row_id else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        let rows_affected = sqlx::query(
            r#"
            UPDATE work_queue
            SET claimed_by = ?,
                claimed_at = ?,
                attempts = attempts + 1
            WHERE id = ? AND claimed_at IS NULL
            "#,
        )
        .bind(worker_id)
        .bind(&now)
        .bind(row_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Another consumer claimed it between SELECT and UPDATE.
            tx.commit().await?;
            return Ok(None);
        }

        let delivery: Delivery = sqlx::query_as(
            "SELECT id, payload, attempts FROM work_queue WHERE id = ?",
        )
        .bind(row_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Claimed delivery {} for {}", delivery.id, worker_id);

        Ok(Some(delivery))
    }

    /// Acknowledge a delivery, removing it permanently.
    ///
    /// Callers must commit the registry row first; ack is the last step.
    pub async fn ack(&self, delivery_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM work_queue WHERE id = ?")
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Release claims older than `lease`, making them deliverable again.
    ///
    /// This is the redelivery path for consumers that died between claim
    /// and ack.
    pub async fn release_expired(&self, lease: Duration) -> Result<u64> {
        let cutoff = (Utc::now()
            - ChronoDuration::from_std(lease).unwrap_or_else(|_| ChronoDuration::seconds(60)))
        .to_rfc3339();

        let released = sqlx::query(
            r#"
            UPDATE work_queue
            SET claimed_by = NULL,
                claimed_at = NULL
            WHERE claimed_at IS NOT NULL AND claimed_at < ?
            "#,
        )
        .bind(&cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if released > 0 {
            info!("Released {} expired claim(s) for redelivery", released);
        }
        Ok(released)
    }

    /// Requeue hook for orphaned registry rows: jobs still `QUEUED` after
    /// `older_than` with no corresponding queue message (the crash window
    /// between registry commit and enqueue). Returns how many messages
    /// were re-created.
    pub async fn sweep_orphaned(&self, older_than: Duration) -> Result<u64> {
        let cutoff = (Utc::now()
            - ChronoDuration::from_std(older_than)
                .unwrap_or_else(|_| ChronoDuration::seconds(300)))
        .to_rfc3339();
        let now = Utc::now().to_rfc3339();

        let requeued = sqlx::query(
            r#"
            INSERT INTO work_queue (payload, enqueued_at, attempts)
            SELECT '{"job_id":"' || jobs.id || '"}', ?, 0
            FROM jobs
            WHERE jobs.status = 'QUEUED'
              AND jobs.created_at < ?
              AND NOT EXISTS (
                  SELECT 1 FROM work_queue
                  WHERE work_queue.payload = '{"job_id":"' || jobs.id || '"}'
              )
            "#,
        )
        .bind(&now)
        .bind(&cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if requeued > 0 {
            info!("Requeued {} orphaned job(s)", requeued);
        }
        Ok(requeued)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let stats: QueueStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE claimed_at IS NULL) AS ready,
                COUNT(*) FILTER (WHERE claimed_at IS NOT NULL) AS in_flight
            FROM work_queue
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::JobRegistry;
    use crate::schema::init_schema;
    use crucible_protocol::JobId;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> DbPool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_claim_empty_queue() {
        let queue = WorkQueue::new(setup().await);
        assert!(queue.claim("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_claim_ack() {
        let queue = WorkQueue::new(setup().await);
        let id = JobId::new();
        queue.enqueue(&QueueMessage::new(&id)).await.unwrap();

        let delivery = queue.claim("w1").await.unwrap().unwrap();
        let body: QueueMessage = serde_json::from_str(&delivery.payload).unwrap();
        assert_eq!(body.job_id, id.as_str());
        assert_eq!(delivery.attempts, 1);

        // Claimed: invisible to other consumers.
        assert!(queue.claim("w2").await.unwrap().is_none());

        queue.ack(delivery.id).await.unwrap();
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.ready, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new(setup().await);
        let first = JobId::new();
        let second = JobId::new();
        queue.enqueue(&QueueMessage::new(&first)).await.unwrap();
        queue.enqueue(&QueueMessage::new(&second)).await.unwrap();

        let d = queue.claim("w1").await.unwrap().unwrap();
        let body: QueueMessage = serde_json::from_str(&d.payload).unwrap();
        assert_eq!(body.job_id, first.as_str());
    }

    #[tokio::test]
    async fn test_expired_claim_is_redelivered() {
        let queue = WorkQueue::new(setup().await);
        let id = JobId::new();
        queue.enqueue(&QueueMessage::new(&id)).await.unwrap();

        let first = queue.claim("w1").await.unwrap().unwrap();

        // Zero lease: the claim is immediately stale.
        let released = queue.release_expired(Duration::ZERO).await.unwrap();
        assert_eq!(released, 1);

        let second = queue.claim("w2").await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempts, 2);
    }

    #[tokio::test]
    async fn test_release_respects_live_leases() {
        let queue = WorkQueue::new(setup().await);
        queue
            .enqueue(&QueueMessage::new(&JobId::new()))
            .await
            .unwrap();
        queue.claim("w1").await.unwrap().unwrap();

        let released = queue
            .release_expired(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(released, 0);
        assert!(queue.claim("w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_orphaned_requeues() {
        let pool = setup().await;
        let registry = JobRegistry::new(pool.clone());
        let queue = WorkQueue::new(pool);

        // QUEUED row with no queue message: the crash window after the
        // registry commit.
        let orphan = JobId::new();
        registry.insert_queued(&orphan, "lost.py").await.unwrap();

        // QUEUED row whose message is still present: must not duplicate.
        let healthy = JobId::new();
        registry.insert_queued(&healthy, "ok.py").await.unwrap();
        queue.enqueue(&QueueMessage::new(&healthy)).await.unwrap();

        let requeued = queue.sweep_orphaned(Duration::ZERO).await.unwrap();
        assert_eq!(requeued, 1);

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.ready, 2);

        // Second sweep finds nothing new.
        assert_eq!(queue.sweep_orphaned(Duration::ZERO).await.unwrap(), 0);
    }
}
