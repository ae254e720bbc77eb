//! Crucible worker library.
//!
//! Exposes the claim/scan/run/commit/ack pipeline for the binary and for
//! integration tests.

pub mod events;
pub mod metrics;
pub mod shutdown;
pub mod worker;

pub use events::EventPublisher;
pub use metrics::METRICS;
pub use shutdown::ShutdownToken;
pub use worker::{Worker, WorkerConfig};
