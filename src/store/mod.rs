//! Remote snapshot store
//!
//! The pipeline reads its source graph from one repository and publishes
//! artifacts to another. Both sides go through [`SnapshotStore`]:
//! revision-tagged reads and conditional writes against a path-addressed
//! blob store. The store is eventually consistent across paths; the only
//! guarantee used here is per-path compare-and-swap on the revision.

mod github;
pub mod memory;

pub use github::GithubStore;
pub use memory::MemoryStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{path}: not found")]
    NotFound { path: String },

    #[error("{path}: revision conflict, the file changed underneath the write")]
    Conflict { path: String },

    #[error("{path}: transport failure: {message}")]
    Transport { path: String, message: String },

    #[error("{path}: store API error {status}: {message}")]
    Api {
        path: String,
        status: u16,
        message: String,
    },

    #[error("{path}: malformed store response: {message}")]
    Decode { path: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A blob plus the content revision it was read at.
#[derive(Debug, Clone)]
pub struct RemoteBlob {
    pub content: String,
    pub revision: String,
}

/// Revision-tagged blob store operations.
pub trait SnapshotStore {
    /// Read a blob and its current content revision.
    fn read(&self, path: &str) -> StoreResult<RemoteBlob>;

    /// Create (`revision = None`) or conditionally update a blob. Returns
    /// the new content revision. A stale or missing revision for an
    /// existing file fails with [`StoreError::Conflict`].
    fn write(
        &self,
        path: &str,
        content: &str,
        revision: Option<&str>,
        message: &str,
    ) -> StoreResult<String>;

    /// `read`, with `NotFound` flattened to `None`.
    fn read_optional(&self, path: &str) -> StoreResult<Option<RemoteBlob>> {
        match self.read(path) {
            Ok(blob) => Ok(Some(blob)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
