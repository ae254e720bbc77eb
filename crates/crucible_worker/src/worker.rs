//! Worker loop.
//!
//! One message in flight at a time: claim, guard, scan, run, commit,
//! publish, ack. The registry commit always precedes the ack - a crash
//! in between redelivers the message, and the terminal guard turns the
//! redelivery into a bare ack. That ordering is the one subtle
//! correctness point of the pipeline; everything else here is plumbing.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crucible_db::{
    connect_pool, init_schema, Delivery, DbPool, JobRegistry, ProcessingGate, WorkQueue,
};
use crucible_protocol::{EventMessage, JobId, JobStatus, QueueMessage};
use crucible_sandbox::{SandboxConfig, SandboxExecutor, ScriptRunner};
use crucible_scanner::Scanner;
use crucible_store::{ArtifactStore, FsArtifactStore};

use crate::events::EventPublisher;
use crate::metrics::METRICS;
use crate::shutdown::ShutdownToken;

/// Worker configuration (plain data).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub database_url: String,
    pub artifact_root: PathBuf,
    /// Event-hub addresses; empty means events are dropped locally.
    pub event_addrs: Vec<String>,
    pub poll_interval: Duration,
    pub claim_lease: Duration,
    pub sandbox: SandboxConfig,
}

/// Active worker with connected queue, store and event bus.
pub struct Worker {
    config: WorkerConfig,
    registry: JobRegistry,
    queue: WorkQueue,
    store: Arc<dyn ArtifactStore>,
    scanner: Scanner,
    runner: Arc<dyn ScriptRunner>,
    events: EventPublisher,
    shutdown: ShutdownToken,
}

impl Worker {
    /// Wire up against a live database, artifact root and container
    /// runtime. The sandbox profile check happens here, so a
    /// misconfigured worker dies at startup, not at its first job.
    pub async fn connect(config: WorkerConfig) -> Result<Self> {
        let pool = connect_pool(&config.database_url, 5).await?;
        init_schema(&pool).await?;

        let store: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(&config.artifact_root)?);
        let runner: Arc<dyn ScriptRunner> =
            Arc::new(SandboxExecutor::new(config.sandbox.clone())?);
        let events = if config.event_addrs.is_empty() {
            warn!("No event-hub addresses configured; events will be dropped");
            EventPublisher::disconnected()
        } else {
            EventPublisher::connect(&config.event_addrs).await?
        };

        Ok(Self::new(config, pool, store, runner, events))
    }

    /// Assemble from parts. Used by `connect` and by tests that swap in
    /// a stub runner or a disconnected publisher.
    pub fn new(
        config: WorkerConfig,
        pool: DbPool,
        store: Arc<dyn ArtifactStore>,
        runner: Arc<dyn ScriptRunner>,
        events: EventPublisher,
    ) -> Self {
        Self {
            registry: JobRegistry::new(pool.clone()),
            queue: WorkQueue::new(pool),
            store,
            scanner: Scanner::new(),
            runner,
            events,
            shutdown: ShutdownToken::new(),
            config,
        }
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Main claim loop. Exits after the in-flight job (if any) reaches a
    /// terminal state once the shutdown token fires.
    pub async fn run(&mut self) -> Result<()> {
        info!("Worker {} entering claim loop", self.config.worker_id);

        while !self.shutdown.is_triggered() {
            if let Err(e) = self.queue.release_expired(self.config.claim_lease).await {
                error!("Failed to release expired claims: {}", e);
                METRICS.inc_db_errors();
            }

            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!("Queue receive error: {}", e);
                    METRICS.inc_db_errors();
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!("Worker stopped. {}", METRICS.snapshot().summary());
        info!("{}", crucible_sandbox::METRICS.snapshot().summary());
        Ok(())
    }

    /// Claim and process at most one message. Returns whether a message
    /// was handled.
    pub async fn poll_once(&mut self) -> Result<bool> {
        match self.queue.claim(&self.config.worker_id).await? {
            Some(delivery) => {
                self.process(delivery).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drive one claimed message through the pipeline.
    ///
    /// Never returns an error: every failure mode either concludes the
    /// job as FAILED, or deliberately leaves the message un-acked so the
    /// lease expiry redelivers it.
    async fn process(&mut self, delivery: Delivery) {
        let job_id = match decode_job_id(&delivery.payload) {
            Ok(job_id) => job_id,
            Err(reason) => {
                warn!("Dropping malformed message {}: {}", delivery.id, reason);
                METRICS.inc_malformed_dropped();
                self.ack(delivery.id).await;
                return;
            }
        };

        METRICS.inc_jobs_claimed();
        info!("Processing job {} (attempt {})", job_id, delivery.attempts);

        match self.registry.begin_processing(&job_id).await {
            Ok(ProcessingGate::Started) | Ok(ProcessingGate::Resumed) => {}
            Ok(ProcessingGate::AlreadyTerminal(status)) => {
                // Crash window between a previous commit and its ack.
                info!("Job {} already {}; acking redelivery", job_id, status);
                METRICS.inc_redeliveries_acked();
                self.ack(delivery.id).await;
                return;
            }
            Ok(ProcessingGate::Missing) => {
                // Ingress ordering makes this impossible without operator
                // intervention. Do not retry.
                warn!("Job {} not found in registry; dropping", job_id);
                self.ack(delivery.id).await;
                return;
            }
            Err(e) => {
                error!("Registry error for job {}: {}; leaving for redelivery", job_id, e);
                METRICS.inc_db_errors();
                return;
            }
        }

        let artifact = match self.store.fetch(&job_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let logs = format!("System Error: {}", e);
                self.conclude(delivery.id, &job_id, JobStatus::Failed, &logs)
                    .await;
                return;
            }
        };

        if let Err(violation) = self.scanner.scan(&artifact) {
            info!("Job {} rejected by static scan", job_id);
            METRICS.inc_jobs_rejected();
            self.conclude(delivery.id, &job_id, JobStatus::Failed, &violation.to_string())
                .await;
            return;
        }

        let report = self.runner.run(&artifact).await;
        let status = if report.failed() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.conclude(delivery.id, &job_id, status, &report.output)
            .await;
    }

    /// Commit the terminal row, publish the event, then ack.
    ///
    /// A failed commit leaves the message un-acked (redelivery). A
    /// failed publish is logged and swallowed - the registry row is the
    /// durable record and `/status` remains correct.
    async fn conclude(&mut self, delivery_id: i64, job_id: &JobId, status: JobStatus, logs: &str) {
        let committed = match status {
            JobStatus::Completed => self.registry.complete(job_id, logs).await,
            _ => self.registry.fail(job_id, logs).await,
        };
        if let Err(e) = committed {
            error!(
                "Failed to commit job {} as {}: {}; leaving for redelivery",
                job_id, status, e
            );
            METRICS.inc_db_errors();
            return;
        }

        match status {
            JobStatus::Completed => METRICS.inc_jobs_completed(),
            _ => METRICS.inc_jobs_failed(),
        }

        let event = EventMessage::new(job_id, status, logs);
        match self.events.publish(&event).await {
            Ok(()) => METRICS.inc_events_published(),
            Err(e) => {
                warn!("Failed to publish event for job {}: {}", job_id, e);
                METRICS.inc_event_publish_failures();
            }
        }

        self.ack(delivery_id).await;
    }

    async fn ack(&self, delivery_id: i64) {
        if let Err(e) = self.queue.ack(delivery_id).await {
            // Redelivery of an already-terminal job ends in a bare ack.
            error!("Failed to ack delivery {}: {}", delivery_id, e);
            METRICS.inc_db_errors();
        }
    }
}

fn decode_job_id(payload: &str) -> std::result::Result<JobId, String> {
    let message: QueueMessage =
        serde_json::from_str(payload).map_err(|e| format!("bad body: {}", e))?;
    JobId::parse(&message.job_id).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_job_id() {
        let id = JobId::new();
        let payload = format!(r#"{{"job_id":"{}"}}"#, id);
        assert_eq!(decode_job_id(&payload).unwrap(), id);

        assert!(decode_job_id("not json").is_err());
        assert!(decode_job_id(r#"{"job_id":"not-a-uuid"}"#).is_err());
        assert!(decode_job_id(r#"{"other":"field"}"#).is_err());
    }
}
