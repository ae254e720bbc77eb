//! Artifact store: opaque script bytes keyed by job id.
//!
//! The store itself is an external collaborator; this crate owns the
//! seam (`ArtifactStore`) and a filesystem implementation for
//! deployments backed by a shared volume. Artifacts are written once by
//! the ingress gate, read once per execution attempt, and never mutated.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

use crucible_protocol::JobId;

/// Size of the blocking pool used for store I/O, matching the expected
/// concurrent upload count of the ingress side.
pub const DEFAULT_IO_PERMITS: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Artifact {0} not found")]
    NotFound(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Blob storage keyed by job id.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under the job id. Must be called before the job is
    /// registered so a queued id always has a fetchable artifact.
    async fn put(&self, job_id: &JobId, bytes: Vec<u8>) -> Result<()>;

    /// Fetch the exact bytes previously stored under the job id.
    async fn fetch(&self, job_id: &JobId) -> Result<Vec<u8>>;
}

/// Filesystem-backed store: one file per job id under a root directory.
///
/// All I/O is blocking and runs on `spawn_blocking`, bounded by a
/// semaphore so a burst of uploads cannot exhaust the blocking pool.
pub struct FsArtifactStore {
    root: PathBuf,
    permits: Arc<Semaphore>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        Self::with_permits(root, DEFAULT_IO_PERMITS)
    }

    pub fn with_permits(root: impl Into<PathBuf>, permits: usize) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            permits: Arc::new(Semaphore::new(permits.max(1))),
        })
    }

    fn object_path(&self, job_id: &JobId) -> PathBuf {
        // Job ids are UUID strings, so the key is always a safe filename.
        self.root.join(job_id.as_str())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, job_id: &JobId, bytes: Vec<u8>) -> Result<()> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        let path = self.object_path(job_id);
        let written = bytes.len();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        debug!("Stored artifact {} ({} bytes)", job_id, written);
        Ok(())
    }

    async fn fetch(&self, job_id: &JobId) -> Result<Vec<u8>> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
        let path = self.object_path(job_id);
        let key = job_id.as_str().to_string();

        tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(key)),
            Err(e) => Err(StoreError::Io(e)),
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

/// Write via a temp file + rename so readers never observe a partial
/// artifact.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
