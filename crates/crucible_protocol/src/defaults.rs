//! Canonical default values shared across the gateway and worker binaries.

pub const DEFAULT_DB_URL: &str = "sqlite:crucible.db?mode=rwc";
pub const DEFAULT_EVENT_BUS_ADDR: &str = "tcp://127.0.0.1:5556";
pub const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_ARTIFACT_ROOT: &str = "artifacts";

/// How often an idle worker polls the queue for new messages.
pub const DEFAULT_QUEUE_POLL_MS: u64 = 500;

/// How long a claim may stay un-acked before it is considered lost and
/// redelivered to another consumer.
pub const DEFAULT_CLAIM_LEASE_SECS: u64 = 60;
