//! Shared application state for route handlers.

use std::sync::Arc;

use crucible_db::{DbPool, JobRegistry, WorkQueue};
use crucible_store::ArtifactStore;

use crate::hub::LiveHub;

pub struct AppState {
    pub registry: JobRegistry,
    pub queue: WorkQueue,
    pub store: Arc<dyn ArtifactStore>,
    pub hub: LiveHub,
}

impl AppState {
    pub fn new(pool: DbPool, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            registry: JobRegistry::new(pool.clone()),
            queue: WorkQueue::new(pool),
            store,
            hub: LiveHub::new(),
        }
    }
}
