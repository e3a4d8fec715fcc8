/*
 * Working-Tree Probe: live queries against the checked-out working branch. Nothing here
 * is cached; the modified flag is recomputed on every read. Status query failures degrade
 * to "not modified".
 */
use crate::core::path_utils;
use crate::core::project::Project;
use crate::core::vcs::VersionControlOperations;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;

pub struct WorkingTreeProbe {
    vcs: Arc<dyn VersionControlOperations>,
}

impl WorkingTreeProbe {
    pub fn new(vcs: Arc<dyn VersionControlOperations>) -> Self {
        WorkingTreeProbe { vcs }
    }

    pub async fn is_modified(&self, project: &Project, path: &str) -> bool {
        let filter = [path_utils::to_canonical(path)];
        match self.vcs.working_tree_status(&project.root, &filter).await {
            Ok(entries) => entries.iter().any(|entry| entry.path == filter[0]),
            Err(e) => {
                log::warn!("WorkingTreeProbe: Status query for '{path}' failed: {e}");
                false
            }
        }
    }

    /// Modified (or untracked) paths inside the project's watched directories.
    pub async fn modified_paths(&self, project: &Project) -> HashSet<String> {
        match self
            .vcs
            .working_tree_status(&project.root, &project.watch_filters())
            .await
        {
            Ok(entries) => entries.into_iter().map(|entry| entry.path).collect(),
            Err(e) => {
                log::warn!(
                    "WorkingTreeProbe: Bulk status query failed for {:?}: {e}",
                    project.root
                );
                HashSet::new()
            }
        }
    }

    pub async fn exists_locally(&self, project: &Project, path: &str) -> bool {
        let native = path_utils::to_native(&project.root, path);
        tokio::fs::try_exists(&native).await.unwrap_or(false)
    }

    pub async fn read_local(&self, project: &Project, path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(path_utils::to_native(&project.root, path)).await
    }

    pub async fn write_local(&self, project: &Project, path: &str, content: &[u8]) -> io::Result<()> {
        let native = path_utils::to_native(&project.root, path);
        if let Some(parent) = native.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&native, content).await?;
        log::debug!("WorkingTreeProbe: Wrote {} bytes to {native:?}", content.len());
        Ok(())
    }

    /// Sizes of the given files; missing or unreadable files are omitted.
    pub async fn file_sizes(&self, project: &Project, paths: &[String]) -> HashMap<String, u64> {
        let mut sizes = HashMap::with_capacity(paths.len());
        for path in paths {
            let native = path_utils::to_native(&project.root, path);
            if let Ok(metadata) = tokio::fs::metadata(&native).await
                && metadata.is_file()
            {
                sizes.insert(path.clone(), metadata.len());
            }
        }
        sizes
    }
}
