//! Durable state for the Crucible pipeline: the job registry and the
//! work queue, both on one sqlx pool.
//!
//! The registry is the source of truth for job lifecycle; the queue is a
//! point-to-point delivery mechanism with at-least-once semantics
//! (atomic claim, explicit ack, lease-based redelivery).

pub mod error;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod schema;

pub use error::{DbError, Result};
pub use pool::{connect_pool, DbPool};
pub use queue::{Delivery, QueueStats, WorkQueue};
pub use registry::{Job, JobRegistry, ProcessingGate};
pub use schema::init_schema;
