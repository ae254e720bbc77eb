//! Shared types for the Crucible execution pipeline.
//!
//! Two planes share these definitions:
//! - the durable plane (registry rows, work-queue message bodies)
//! - the ephemeral plane (lifecycle events fanned out over the bus)
//!
//! The durable plane is the source of truth; events are advisory copies
//! of registry transitions and carry no guarantees.

pub mod defaults;
pub mod types;

pub use types::{EventMessage, JobId, JobIdParseError, JobStatus, QueueMessage};
