/*
 * Upstream Snapshot Reader. Answers "what does upstream look like" for a project: one
 * bulk path -> blob hash map per (project root, upstream branch, watch filters), plus
 * per-path content, existence and hash reads.
 *
 * Bulk reads are cached until invalidated (fetch, upstream switch, sync, project clear).
 * A failed bulk read yields an empty map which is returned but never cached, so the next
 * call retries.
 */
use crate::core::models::ContentHash;
use crate::core::project::Project;
use crate::core::vcs::{self, VcsError, VersionControlOperations};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub type UpstreamHashMap = HashMap<String, ContentHash>;

type SnapshotKey = (PathBuf, String, Vec<String>);

pub struct UpstreamSnapshotReader {
    vcs: Arc<dyn VersionControlOperations>,
    snapshots: Mutex<HashMap<SnapshotKey, Arc<UpstreamHashMap>>>,
}

impl UpstreamSnapshotReader {
    pub fn new(vcs: Arc<dyn VersionControlOperations>) -> Self {
        UpstreamSnapshotReader {
            vcs,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &SnapshotKey) -> Option<Arc<UpstreamHashMap>> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.get(key).cloned()
    }

    pub async fn bulk_hashes(&self, project: &Project, upstream_branch: &str) -> Arc<UpstreamHashMap> {
        let filters = project.watch_filters();
        let key = (project.root.clone(), upstream_branch.to_string(), filters.clone());
        if let Some(snapshot) = self.cached(&key) {
            return snapshot;
        }

        let reference = project.upstream_ref(upstream_branch);
        match self
            .vcs
            .bulk_list_tree(&project.root, &reference, &filters)
            .await
        {
            Ok(entries) => {
                let snapshot: Arc<UpstreamHashMap> = Arc::new(
                    entries
                        .into_iter()
                        .map(|entry| (entry.path, entry.hash))
                        .collect(),
                );
                log::debug!(
                    "UpstreamSnapshot: Listed {} blobs at '{reference}' for {:?}.",
                    snapshot.len(),
                    project.root
                );
                let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
                snapshots.insert(key, Arc::clone(&snapshot));
                snapshot
            }
            Err(e) => {
                log::warn!(
                    "UpstreamSnapshot: Bulk listing of '{reference}' failed for {:?}: {e}",
                    project.root
                );
                Arc::new(UpstreamHashMap::new())
            }
        }
    }

    pub async fn read_at(&self, project: &Project, reference: &str, path: &str) -> vcs::Result<Vec<u8>> {
        self.vcs.read_file_at(&project.root, reference, path).await
    }

    pub async fn exists_at(&self, project: &Project, reference: &str, path: &str) -> bool {
        match self.vcs.file_exists_at(&project.root, reference, path).await {
            Ok(exists) => exists,
            Err(e) => {
                log::warn!("UpstreamSnapshot: Existence check of '{path}' at '{reference}' failed: {e}");
                false
            }
        }
    }

    /// Blob hash of `path` at `reference`, comparable with the bulk map values.
    pub async fn file_hash(&self, project: &Project, path: &str, reference: &str) -> Option<ContentHash> {
        match self.vcs.blob_hash_at(&project.root, reference, path).await {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("UpstreamSnapshot: Hash lookup of '{path}' at '{reference}' failed: {e}");
                None
            }
        }
    }

    pub async fn last_commit(&self, project: &Project, path: &str, reference: &str) -> Option<String> {
        match self.vcs.last_commit_hash(&project.root, reference, path).await {
            Ok(id) => id,
            Err(VcsError::NotFound { .. }) => None,
            Err(e) => {
                log::warn!("UpstreamSnapshot: Last commit lookup of '{path}' failed: {e}");
                None
            }
        }
    }

    pub fn invalidate(&self, project_root: &Path, upstream_branch: &str) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.retain(|(root, branch, _), _| root != project_root || branch != upstream_branch);
    }

    pub fn clear_project(&self, project_root: &Path) {
        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.retain(|(root, _, _), _| root != project_root);
    }

    pub fn is_cached(&self, project_root: &Path, upstream_branch: &str) -> bool {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .keys()
            .any(|(root, branch, _)| root == project_root && branch == upstream_branch)
    }
}
