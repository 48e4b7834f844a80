//! In-memory store double
//!
//! Backs unit and end-to-end tests. Revisions are md5 content hashes, so
//! they are content-addressed like the real store's blob shas. Writes can
//! be failed per path to exercise partial-publication handling.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{RemoteBlob, SnapshotStore, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, RemoteBlob>>,
    fail_writes: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load a file, e.g. the source snapshot.
    pub fn put(&self, path: &str, content: &str) {
        let blob = RemoteBlob {
            content: content.to_string(),
            revision: content_revision(content),
        };
        self.files.lock().unwrap().insert(path.to_string(), blob);
    }

    /// Make every subsequent write to `path` fail with a transport error.
    pub fn fail_writes_to(&self, path: &str) {
        self.fail_writes.lock().unwrap().insert(path.to_string());
    }

    pub fn contents(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|blob| blob.content.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

fn content_revision(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

impl SnapshotStore for MemoryStore {
    fn read(&self, path: &str) -> StoreResult<RemoteBlob> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    fn write(
        &self,
        path: &str,
        content: &str,
        revision: Option<&str>,
        _message: &str,
    ) -> StoreResult<String> {
        if self.fail_writes.lock().unwrap().contains(path) {
            return Err(StoreError::Transport {
                path: path.to_string(),
                message: "injected write failure".to_string(),
            });
        }

        let mut files = self.files.lock().unwrap();
        let current = files.get(path).map(|blob| blob.revision.clone());
        match (current.as_deref(), revision) {
            (None, None) => {}
            (Some(cur), Some(given)) if cur == given => {}
            _ => {
                return Err(StoreError::Conflict {
                    path: path.to_string(),
                })
            }
        }

        let new_revision = content_revision(content);
        files.insert(
            path.to_string(),
            RemoteBlob {
                content: content.to_string(),
                revision: new_revision.clone(),
            },
        );
        Ok(new_revision)
    }
}
