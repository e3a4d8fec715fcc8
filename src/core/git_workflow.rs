/*
 * A thin publishing workflow over the version-control oracle: branch listing, fetch,
 * checkout, staging, commit and push. Operations that change what upstream or the working
 * branch look like invalidate the matching reconciler caches.
 */
use crate::core::engine_error::{EngineError, Result};
use crate::core::path_utils;
use crate::core::project::Project;
use crate::core::reconciler::StatusReconciler;
use crate::core::vcs::{CommitSummary, VersionControlOperations};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchListing {
    pub current: Option<String>,
    pub local: Vec<String>,
    pub upstream_remote: String,
    pub upstream: Vec<String>,
}

pub struct GitWorkflow {
    vcs: Arc<dyn VersionControlOperations>,
    reconciler: Arc<StatusReconciler>,
}

impl GitWorkflow {
    pub fn new(vcs: Arc<dyn VersionControlOperations>, reconciler: Arc<StatusReconciler>) -> Self {
        GitWorkflow { vcs, reconciler }
    }

    pub async fn list_branches(&self, project: &Project) -> Result<BranchListing> {
        let local = self.vcs.list_local_branches(&project.root).await?;
        let upstream = self
            .vcs
            .list_remote_branches(&project.root, &project.upstream_remote)
            .await?;
        let current = match self.vcs.current_branch(&project.root).await {
            Ok(branch) => Some(branch),
            Err(e) => {
                log::warn!("GitWorkflow: Could not determine current branch: {e}");
                None
            }
        };
        Ok(BranchListing {
            current,
            local,
            upstream_remote: project.upstream_remote.clone(),
            upstream,
        })
    }

    /// Fetches the upstream remote and drops every upstream snapshot of the project.
    pub async fn fetch_upstream(&self, project: &Project) -> Result<()> {
        log::info!(
            "GitWorkflow: Fetching '{}' for {:?}.",
            project.upstream_remote,
            project.root
        );
        self.vcs
            .fetch(&project.root, &project.upstream_remote)
            .await?;
        self.reconciler.upstream().clear_project(&project.root);
        Ok(())
    }

    /*
     * Switches the working branch. The branch must exist locally. The new branch's status
     * file is loaded so later lookups start from its own history.
     */
    pub async fn checkout(&self, project: &Project, branch: &str) -> Result<()> {
        let branch = branch.trim();
        let local = self.vcs.list_local_branches(&project.root).await?;
        if !local.iter().any(|candidate| candidate == branch) {
            return Err(EngineError::BranchNotFound(branch.to_string()));
        }
        self.vcs.checkout(&project.root, branch).await?;
        self.reconciler.store().load(project, branch);
        log::info!("GitWorkflow: Checked out '{branch}' in {:?}.", project.root);
        Ok(())
    }

    pub async fn stage(&self, project: &Project, path: &str) -> Result<()> {
        let path = project_path(path)?;
        self.vcs.stage(&project.root, &path).await?;
        Ok(())
    }

    pub async fn stage_all(&self, project: &Project) -> Result<()> {
        self.vcs.stage_all(&project.root).await?;
        Ok(())
    }

    pub async fn unstage(&self, project: &Project, path: &str) -> Result<()> {
        let path = project_path(path)?;
        self.vcs.unstage(&project.root, &path).await?;
        Ok(())
    }

    pub async fn commit(&self, project: &Project, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            return Err(EngineError::EmptyCommitMessage);
        }
        let staged = self.vcs.staged_paths(&project.root).await?;
        if staged.is_empty() {
            return Err(EngineError::NothingStaged);
        }
        self.vcs.commit(&project.root, message).await?;
        log::info!("GitWorkflow: Committed {} path(s).", staged.len());
        Ok(())
    }

    pub async fn push(&self, project: &Project) -> Result<()> {
        self.vcs
            .push(&project.root, &project.push_remote, &project.working_branch)
            .await?;
        log::info!(
            "GitWorkflow: Pushed '{}' to '{}'.",
            project.working_branch,
            project.push_remote
        );
        Ok(())
    }

    pub async fn history(
        &self,
        project: &Project,
        limit: usize,
        path: Option<&str>,
    ) -> Result<Vec<CommitSummary>> {
        let path = path.map(project_path).transpose()?;
        Ok(self
            .vcs
            .log(&project.root, limit, path.as_deref())
            .await?)
    }

    pub async fn remote_url(&self, project: &Project, remote: &str) -> Result<String> {
        Ok(self.vcs.remote_url(&project.root, remote).await?)
    }
}

fn project_path(path: &str) -> Result<String> {
    path_utils::to_project_relative(path).ok_or_else(|| EngineError::InvalidPath(path.to_string()))
}
