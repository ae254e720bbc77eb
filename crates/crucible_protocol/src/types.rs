//! Data model and wire types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Error returned when parsing a job identifier fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdParseError {
    message: String,
}

impl fmt::Display for JobIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for JobIdParseError {}

/// Client-opaque job identifier, the string form of a v4 UUID.
///
/// The string representation is the canonical one: it is what travels in
/// queue messages, event bodies, URLs and registry rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn parse(value: &str) -> Result<Self, JobIdParseError> {
        Uuid::parse_str(value).map_err(|e| JobIdParseError {
            message: format!("Invalid job ID: {}", e),
        })?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = JobIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Lifecycle status of a job.
///
/// Legal transitions form exactly two paths:
/// `QUEUED -> PROCESSING -> COMPLETED` and `QUEUED -> PROCESSING -> FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Body of a work-queue message: `{"job_id": "<uuid>"}`.
///
/// Durable, delivered at least once. The id is a plain string here so a
/// corrupted body surfaces at decode time in the worker (which acks and
/// drops it) instead of poisoning the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: String,
}

impl QueueMessage {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.as_str().to_string(),
        }
    }
}

/// Body of an event-bus message: `{"job_id", "status", "logs"}`.
///
/// Ephemeral broadcast; never persisted. The registry row is the durable
/// record of the same transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub job_id: String,
    pub status: JobStatus,
    pub logs: String,
}

impl EventMessage {
    pub fn new(job_id: &JobId, status: JobStatus, logs: impl Into<String>) -> Self {
        Self {
            job_id: job_id.as_str().to_string(),
            status,
            logs: logs.into(),
        }
    }
}
