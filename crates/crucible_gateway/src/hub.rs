//! Live subscription hub: job id -> at most one attached viewer.
//!
//! A new viewer for a job id replaces any stale one (the old receiver
//! closes, which ends its websocket loop). A send to a gone peer removes
//! the entry. Tokens guard the unsubscribe path so an evicted viewer's
//! cleanup cannot tear down its replacement.
//!
//! Accessed from every websocket task and the event loop; one mutex,
//! never held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Entry {
    token: u64,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Clone, Default)]
pub struct LiveHub {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    next_token: Arc<AtomicU64>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a viewer for a job id, evicting any previous one. Returns
    /// the entry token (needed to unsubscribe) and the event receiver.
    /// Returns `true` in the last slot when a previous viewer was evicted.
    pub fn subscribe(&self, job_id: &str) -> (u64, mpsc::UnboundedReceiver<String>, bool) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().expect("hub lock poisoned");
        let evicted = inner
            .insert(job_id.to_string(), Entry { token, sender })
            .is_some();
        (token, receiver, evicted)
    }

    /// Detach a viewer. A stale token (the viewer was already evicted)
    /// is a no-op, leaving the replacement in place.
    pub fn unsubscribe(&self, job_id: &str, token: u64) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if inner.get(job_id).is_some_and(|entry| entry.token == token) {
            inner.remove(job_id);
        }
    }

    /// Forward an event payload to the viewer of `job_id`, if any.
    /// Returns whether it was delivered; a dead peer is pruned.
    pub fn send(&self, job_id: &str, payload: &str) -> bool {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        match inner.get(job_id) {
            Some(entry) => {
                if entry.sender.send(payload.to_string()).is_ok() {
                    true
                } else {
                    inner.remove(job_id);
                    false
                }
            }
            None => false,
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.lock().expect("hub lock poisoned").len()
    }
}
