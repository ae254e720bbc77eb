//! Crucible gateway library.
//!
//! The thin outer layer of the pipeline: HTTP ingress, job status reads,
//! the live websocket hub, and the subscriber end of the event bus.

pub mod events;
pub mod hub;
pub mod metrics;
pub mod routes;
pub mod state;

pub use hub::LiveHub;
pub use metrics::METRICS;
pub use routes::build_router;
pub use state::AppState;
