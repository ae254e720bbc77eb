//! End-to-end pipeline tests against an in-memory registry/queue, a
//! temp-dir artifact store and a stub runner standing in for the
//! container runtime.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crucible_db::{init_schema, DbPool, JobRegistry, WorkQueue};
use crucible_protocol::{JobId, JobStatus, QueueMessage};
use crucible_sandbox::{RunReport, ScriptRunner, Verdict};
use crucible_store::{ArtifactStore, FsArtifactStore};
use crucible_worker::{EventPublisher, Worker, WorkerConfig};

struct StubRunner {
    report: RunReport,
    calls: AtomicUsize,
}

impl StubRunner {
    fn new(verdict: Verdict, output: &str) -> Arc<Self> {
        Arc::new(Self {
            report: RunReport {
                verdict,
                output: output.to_string(),
            },
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScriptRunner for StubRunner {
    async fn run(&self, _artifact: &[u8]) -> RunReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.report.clone()
    }
}

struct Harness {
    worker: Worker,
    registry: JobRegistry,
    queue: WorkQueue,
    store: Arc<FsArtifactStore>,
    _artifacts: tempfile::TempDir,
}

async fn harness(runner: Arc<StubRunner>) -> Harness {
    let pool: DbPool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    let artifacts = tempfile::tempdir().unwrap();
    let store = Arc::new(FsArtifactStore::new(artifacts.path()).unwrap());

    let config = WorkerConfig {
        worker_id: "test-worker".to_string(),
        database_url: ":memory:".to_string(),
        artifact_root: PathBuf::from(artifacts.path()),
        event_addrs: vec![],
        poll_interval: Duration::from_millis(10),
        claim_lease: Duration::from_secs(60),
        sandbox: Default::default(),
    };

    let worker = Worker::new(
        config,
        pool.clone(),
        store.clone(),
        runner,
        EventPublisher::disconnected(),
    );

    Harness {
        worker,
        registry: JobRegistry::new(pool.clone()),
        queue: WorkQueue::new(pool),
        store,
        _artifacts: artifacts,
    }
}

/// Ingress-gate ordering: artifact, then registry row, then message.
async fn submit(h: &Harness, script: &[u8]) -> JobId {
    let id = JobId::new();
    h.store.put(&id, script.to_vec()).await.unwrap();
    h.registry.insert_queued(&id, "script.py").await.unwrap();
    h.queue.enqueue(&QueueMessage::new(&id)).await.unwrap();
    id
}

#[tokio::test]
async fn test_clean_script_completes() {
    let runner = StubRunner::new(Verdict::Clean, "hi\n");
    let mut h = harness(runner.clone()).await;

    let id = submit(&h, b"print('hi')\n").await;
    assert!(h.worker.poll_once().await.unwrap());

    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.logs.as_deref(), Some("hi\n"));
    assert_eq!(runner.calls(), 1);

    // Acked: nothing left to claim.
    let stats = h.queue.stats().await.unwrap();
    assert_eq!((stats.ready, stats.in_flight), (0, 0));
}

#[tokio::test]
async fn test_forbidden_import_fails_without_sandbox_launch() {
    let runner = StubRunner::new(Verdict::Clean, "unreachable");
    let mut h = harness(runner.clone()).await;

    let id = submit(&h, b"import os\nprint(1)").await;
    assert!(h.worker.poll_once().await.unwrap());

    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.logs.as_deref(),
        Some("Security Violation: Import 'os' is forbidden.")
    );
    // The scan rejected it; the sandbox must never have been asked.
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_syntax_error_fails_without_sandbox_launch() {
    let runner = StubRunner::new(Verdict::Clean, "unreachable");
    let mut h = harness(runner.clone()).await;

    let id = submit(&h, b"print(").await;
    assert!(h.worker.poll_once().await.unwrap());

    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.logs.unwrap().starts_with("Syntax Error"));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_timeout_fails_with_distinguished_diagnostic() {
    let runner = StubRunner::new(Verdict::TimedOut, "Error: Execution timed out.");
    let mut h = harness(runner).await;

    let id = submit(&h, b"while True: pass").await;
    assert!(h.worker.poll_once().await.unwrap());

    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.logs.as_deref(), Some("Error: Execution timed out."));
}

#[tokio::test]
async fn test_nonzero_exit_fails_with_exit_code() {
    let runner = StubRunner::new(Verdict::NonZeroExit, "Error (Exit Code 3):\n");
    let mut h = harness(runner).await;

    let id = submit(&h, b"raise SystemExit(3)").await;
    assert!(h.worker.poll_once().await.unwrap());

    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.logs.unwrap().starts_with("Error (Exit Code 3):"));
}

#[tokio::test]
async fn test_redelivered_terminal_job_acks_without_mutation() {
    let runner = StubRunner::new(Verdict::Clean, "hi\n");
    let mut h = harness(runner.clone()).await;

    let id = submit(&h, b"print('hi')\n").await;
    assert!(h.worker.poll_once().await.unwrap());
    assert_eq!(runner.calls(), 1);

    // Simulate a crash between commit and ack: the same message comes back.
    h.queue.enqueue(&QueueMessage::new(&id)).await.unwrap();
    assert!(h.worker.poll_once().await.unwrap());

    // Idempotent: acked, no second execution, row untouched.
    assert_eq!(runner.calls(), 1);
    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.logs.as_deref(), Some("hi\n"));
    let stats = h.queue.stats().await.unwrap();
    assert_eq!((stats.ready, stats.in_flight), (0, 0));
}

#[tokio::test]
async fn test_unknown_job_id_is_acked_and_dropped() {
    let runner = StubRunner::new(Verdict::Clean, "unreachable");
    let mut h = harness(runner.clone()).await;

    // Message without a registry row: operator intervention.
    h.queue
        .enqueue(&QueueMessage::new(&JobId::new()))
        .await
        .unwrap();
    assert!(h.worker.poll_once().await.unwrap());

    assert_eq!(runner.calls(), 0);
    let stats = h.queue.stats().await.unwrap();
    assert_eq!((stats.ready, stats.in_flight), (0, 0));
}

#[tokio::test]
async fn test_malformed_message_is_acked_and_dropped() {
    let runner = StubRunner::new(Verdict::Clean, "unreachable");
    let mut h = harness(runner.clone()).await;

    h.queue
        .enqueue(&QueueMessage {
            job_id: "not-a-uuid".to_string(),
        })
        .await
        .unwrap();
    assert!(h.worker.poll_once().await.unwrap());

    assert_eq!(runner.calls(), 0);
    let stats = h.queue.stats().await.unwrap();
    assert_eq!((stats.ready, stats.in_flight), (0, 0));
}

#[tokio::test]
async fn test_missing_artifact_is_a_system_error() {
    let runner = StubRunner::new(Verdict::Clean, "unreachable");
    let mut h = harness(runner.clone()).await;

    // Registry row and message exist, artifact does not.
    let id = JobId::new();
    h.registry.insert_queued(&id, "ghost.py").await.unwrap();
    h.queue.enqueue(&QueueMessage::new(&id)).await.unwrap();

    assert!(h.worker.poll_once().await.unwrap());

    let job = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.logs.unwrap().starts_with("System Error: "));
    assert_eq!(runner.calls(), 0);
}

#[tokio::test]
async fn test_logs_are_populated_exactly_at_terminal() {
    let runner = StubRunner::new(Verdict::Clean, "out\n");
    let mut h = harness(runner).await;

    let id = submit(&h, b"print('out')\n").await;
    let before = h.registry.fetch(&id).await.unwrap().unwrap();
    assert_eq!(before.status, JobStatus::Queued);
    assert!(before.logs.is_none());

    assert!(h.worker.poll_once().await.unwrap());

    let after = h.registry.fetch(&id).await.unwrap().unwrap();
    assert!(after.status.is_terminal());
    assert!(after.logs.is_some());
}
