/*
 * The Status Reconciliation Engine. It owns every cache (ignore rules, upstream snapshots,
 * status entries) and combines them with live working-tree queries into per-path and
 * whole-tree translation statuses.
 *
 * Persistence differs by entry point: single-path lookups only touch memory, a batch
 * reconciliation persists once at the end, and a recorded translation is written through
 * immediately.
 */
use crate::core::file_node::{FileTree, FileTreeEntry, StatusSummary, build_file_tree};
use crate::core::file_system::FileSystemScannerOperations;
use crate::core::ignore_rules::{IgnoreRuleCache, RuleSet};
use crate::core::models::{self, ContentHash, FileStatus, StatusCacheEntry};
use crate::core::path_utils;
use crate::core::project::{Project, is_internal_config_path};
use crate::core::status_cache::{self, StatusCacheStore};
use crate::core::upstream::UpstreamSnapshotReader;
use crate::core::vcs::VersionControlOperations;
use crate::core::working_tree::WorkingTreeProbe;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

pub struct StatusReconciler {
    ignore_rules: IgnoreRuleCache,
    scanner: Arc<dyn FileSystemScannerOperations>,
    upstream: UpstreamSnapshotReader,
    probe: WorkingTreeProbe,
    store: StatusCacheStore,
}

impl StatusReconciler {
    pub fn new(
        vcs: Arc<dyn VersionControlOperations>,
        scanner: Arc<dyn FileSystemScannerOperations>,
    ) -> Self {
        StatusReconciler {
            ignore_rules: IgnoreRuleCache::new(),
            scanner,
            upstream: UpstreamSnapshotReader::new(Arc::clone(&vcs)),
            probe: WorkingTreeProbe::new(vcs),
            store: StatusCacheStore::new(),
        }
    }

    pub fn upstream(&self) -> &UpstreamSnapshotReader {
        &self.upstream
    }

    pub fn probe(&self) -> &WorkingTreeProbe {
        &self.probe
    }

    pub fn store(&self) -> &StatusCacheStore {
        &self.store
    }

    /*
     * Single-path status. A cache hit is returned as recorded with `modified` refreshed;
     * a miss runs the fresh computation and keeps a translated/outdated result in memory.
     */
    pub async fn get_status(
        &self,
        project: &Project,
        path: &str,
        upstream_branch: &str,
        working_branch: &str,
    ) -> FileStatus {
        let path = path_utils::to_canonical(path);
        if !self.store.is_loaded(&project.root, working_branch) {
            self.store.load(project, working_branch);
        }
        let modified = self.probe.is_modified(project, &path).await;

        if let Some(entry) = self.store.get(project, working_branch, &path) {
            return FileStatus::from_entry(path, &entry, modified);
        }

        match self
            .compute_fresh_status(project, &path, upstream_branch, None)
            .await
        {
            Some(entry) => {
                self.store.put(project, working_branch, &path, entry.clone());
                FileStatus::from_entry(path, &entry, modified)
            }
            None => FileStatus::untranslated(path, modified),
        }
    }

    /*
     * The three-way rule against per-path upstream reads. With no recorded hash the
     * result is untranslated without asking for the current hash.
     */
    pub async fn compute_fresh_status(
        &self,
        project: &Project,
        path: &str,
        upstream_branch: &str,
        recorded: Option<&ContentHash>,
    ) -> Option<StatusCacheEntry> {
        let reference = project.upstream_ref(upstream_branch);
        if !self.upstream.exists_at(project, &reference, path).await {
            return None;
        }
        let recorded = recorded?;
        let current = self.upstream.file_hash(project, path, &reference).await;
        models::classify(current.as_ref(), Some(recorded))
    }

    /*
     * Whole-tree reconciliation: load the branch's status file, scan candidates, fetch the
     * upstream map, modified set and sizes concurrently, then classify every path from the
     * bulk maps alone. The store is persisted once if anything is recorded.
     */
    pub async fn get_file_tree(
        &self,
        project: &Project,
        upstream_branch: &str,
        working_branch: &str,
    ) -> FileTree {
        self.store.load(project, working_branch);
        let rules = self.ignore_rules.rules_for(&project.root);
        let local_paths = self.scan_candidates(project, Arc::clone(&rules)).await;

        let (upstream_hashes, modified, sizes) = tokio::join!(
            self.upstream.bulk_hashes(project, upstream_branch),
            self.probe.modified_paths(project),
            self.probe.file_sizes(project, &local_paths),
        );

        let mut candidates: BTreeSet<String> = local_paths.into_iter().collect();
        let local_count = candidates.len();
        candidates.extend(
            upstream_hashes
                .keys()
                .filter(|path| is_upstream_candidate(project, &rules, path))
                .cloned(),
        );
        log::debug!(
            "StatusReconciler: {} local and {} upstream-only candidates for {:?}.",
            local_count,
            candidates.len() - local_count,
            project.root
        );

        let recorded = self.store.entries(project, working_branch);
        let mut any_recorded = false;
        let mut entries = Vec::with_capacity(candidates.len());
        for path in candidates {
            let is_modified = modified.contains(&path);
            let classified = models::classify(
                upstream_hashes.get(&path),
                recorded.get(&path).map(|entry| &entry.last_hash),
            );
            let status = match classified {
                Some(entry) => {
                    any_recorded |= self.store.put(project, working_branch, &path, entry.clone());
                    FileStatus::from_entry(path.clone(), &entry, is_modified)
                }
                None => FileStatus::untranslated(path.clone(), is_modified),
            };
            let size = sizes.get(&path).copied();
            entries.push(FileTreeEntry {
                status,
                size: size.unwrap_or(0),
                exists_locally: size.is_some(),
            });
        }

        let summary = StatusSummary::from_entries(&entries);
        let nodes = build_file_tree(entries);

        if any_recorded && let Err(e) = self.store.save(project, working_branch) {
            log::error!(
                "StatusReconciler: Failed to persist statuses for '{working_branch}': {e}"
            );
        }

        FileTree { nodes, summary }
    }

    /// Drops the branch's in-memory statuses and the upstream snapshot, then reconciles.
    pub async fn sync_file_statuses(
        &self,
        project: &Project,
        upstream_branch: &str,
        working_branch: &str,
    ) -> FileTree {
        log::info!(
            "StatusReconciler: Syncing '{working_branch}' against '{upstream_branch}' for {:?}.",
            project.root
        );
        self.clear_branch_cache(&project.root, working_branch, upstream_branch);
        self.get_file_tree(project, upstream_branch, working_branch)
            .await
    }

    /// Upserts a translated entry and persists the branch immediately.
    pub fn record_translation(
        &self,
        project: &Project,
        working_branch: &str,
        path: &str,
        hash: ContentHash,
    ) -> status_cache::Result<()> {
        if !self.store.is_loaded(&project.root, working_branch) {
            self.store.load(project, working_branch);
        }
        self.store.put(
            project,
            working_branch,
            path,
            StatusCacheEntry::translated(hash),
        );
        self.store.save(project, working_branch)
    }

    pub fn clear_branch_cache(&self, project_root: &Path, working_branch: &str, upstream_branch: &str) {
        self.store.clear_branch(project_root, working_branch);
        self.upstream.invalidate(project_root, upstream_branch);
    }

    pub fn clear_project_cache(&self, project_root: &Path) {
        log::debug!("StatusReconciler: Clearing all caches for {project_root:?}.");
        self.store.clear_project(project_root);
        self.upstream.clear_project(project_root);
        self.ignore_rules.invalidate(project_root);
    }

    async fn scan_candidates(&self, project: &Project, rules: Arc<RuleSet>) -> Vec<String> {
        let scanner = Arc::clone(&self.scanner);
        let root = project.root.clone();
        let root_dirs = project.watch_dirs.clone();
        let extensions = project.extensions.clone();
        match tokio::task::spawn_blocking(move || scanner.scan(&root, &root_dirs, &extensions, rules))
            .await
        {
            Ok(paths) => paths,
            Err(e) => {
                log::error!("StatusReconciler: Directory scan task failed: {e}");
                Vec::new()
            }
        }
    }
}

fn is_upstream_candidate(project: &Project, rules: &RuleSet, path: &str) -> bool {
    project.is_watched(path)
        && project.accepts_extension(path)
        && !is_internal_config_path(path)
        && !rules.is_ignored(path, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::file_node::FileTreeNode;
    use crate::core::file_system::CoreFileSystemScanner;
    use crate::core::models::TranslationStatus;
    use crate::core::test_support::MockVersionControl;
    use std::fs;
    use std::sync::atomic::Ordering;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        _dir: TempDir,
        vcs: Arc<MockVersionControl>,
        reconciler: StatusReconciler,
        project: Project,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let vcs = Arc::new(MockVersionControl::new());
        let reconciler = StatusReconciler::new(vcs.clone(), Arc::new(CoreFileSystemScanner::new()));
        let project = Project::new("demo", dir.path().to_path_buf(), "main", "zh");
        Fixture {
            _dir: dir,
            vcs,
            reconciler,
            project,
        }
    }

    fn write_local(project: &Project, path: &str, content: &str) {
        let native = path_utils::to_native(&project.root, path);
        fs::create_dir_all(native.parent().unwrap()).unwrap();
        fs::write(native, content).unwrap();
    }

    fn find<'a>(nodes: &'a [FileTreeNode], path: &str) -> Option<&'a FileTreeNode> {
        nodes.iter().find_map(|node| {
            if node.path == path {
                Some(node)
            } else {
                find(&node.children, path)
            }
        })
    }

    #[tokio::test]
    async fn test_no_history_means_untranslated_even_if_local_file_exists() {
        // Arrange
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        write_local(&f.project, "docs/a.md", "# 甲");

        // Act
        let status = f.reconciler.get_status(&f.project, "docs/a.md", "main", "zh").await;
        let tree = f.reconciler.get_file_tree(&f.project, "main", "zh").await;

        // Assert
        assert_eq!(status.status, TranslationStatus::Untranslated);
        assert!(status.last_hash.is_none());
        let node = find(&tree.nodes, "docs/a.md").unwrap();
        assert_eq!(node.status, TranslationStatus::Untranslated);
        assert!(node.exists_locally);
        assert!(!f.project.resolve_status_file("zh").exists(), "nothing to persist");
    }

    #[tokio::test]
    async fn test_hash_equality_decides_translated_versus_outdated() {
        // Arrange
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        write_local(&f.project, "docs/a.md", "# 甲");
        f.reconciler
            .record_translation(&f.project, "zh", "docs/a.md", ContentHash::new("h1"))
            .unwrap();

        // Act
        let before = f.reconciler.get_file_tree(&f.project, "main", "zh").await;
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h2", "# A v2");
        let cached = f.reconciler.get_file_tree(&f.project, "main", "zh").await;
        let synced = f.reconciler.sync_file_statuses(&f.project, "main", "zh").await;

        // Assert
        let node = find(&before.nodes, "docs/a.md").unwrap();
        assert_eq!(node.status, TranslationStatus::Translated);
        assert_eq!(node.last_hash, Some(ContentHash::new("h1")));

        let node = find(&cached.nodes, "docs/a.md").unwrap();
        assert_eq!(
            node.status,
            TranslationStatus::Translated,
            "upstream snapshot is cached until sync"
        );

        let node = find(&synced.nodes, "docs/a.md").unwrap();
        assert_eq!(node.status, TranslationStatus::Outdated);
        assert_eq!(node.last_hash, Some(ContentHash::new("h1")));

        let status = f.reconciler.get_status(&f.project, "docs/a.md", "main", "zh").await;
        assert_eq!(status.status, TranslationStatus::Outdated);
        assert_eq!(status.last_hash, Some(ContentHash::new("h1")));
    }

    #[tokio::test]
    async fn test_get_file_tree_is_idempotent() {
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        f.vcs.set_upstream_file("upstream/main", "docs/b.md", "h2", "# B");
        write_local(&f.project, "docs/a.md", "# 甲");
        f.reconciler
            .record_translation(&f.project, "zh", "docs/a.md", ContentHash::new("h1"))
            .unwrap();

        let first = f.reconciler.get_file_tree(&f.project, "main", "zh").await;
        let persisted_first = fs::read_to_string(f.project.resolve_status_file("zh")).unwrap();
        let second = f.reconciler.get_file_tree(&f.project, "main", "zh").await;
        let persisted_second = fs::read_to_string(f.project.resolve_status_file("zh")).unwrap();

        assert_eq!(first, second);
        assert_eq!(persisted_first, persisted_second);
    }

    #[tokio::test]
    async fn test_upstream_only_files_are_listed_as_missing_locally() {
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/new.md", "h9", "# New");
        f.vcs.set_upstream_file("upstream/main", "docs/image.png", "h8", "png");
        f.vcs.set_upstream_file("upstream/main", "node_modules/x.md", "h7", "dep");

        let tree = f.reconciler.get_file_tree(&f.project, "main", "zh").await;

        let node = find(&tree.nodes, "docs/new.md").unwrap();
        assert!(!node.exists_locally);
        assert_eq!(node.size, 0);
        assert!(find(&tree.nodes, "docs/image.png").is_none());
        assert!(find(&tree.nodes, "node_modules/x.md").is_none());
        assert_eq!(tree.summary.untranslated, 1);
    }

    #[tokio::test]
    async fn test_widening_watch_dirs_recomputes_statuses() {
        // Arrange
        let mut f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        f.vcs.set_upstream_file("upstream/main", "blog/c.md", "h3", "# C");
        write_local(&f.project, "docs/a.md", "# 甲");
        write_local(&f.project, "blog/c.md", "# 丙");
        f.project.watch_dirs = vec!["docs".to_string()];
        f.reconciler
            .record_translation(&f.project, "zh", "blog/c.md", ContentHash::new("h3"))
            .unwrap();
        let narrow = f.reconciler.get_file_tree(&f.project, "main", "zh").await;

        // Act
        f.project.watch_dirs = vec!["docs".to_string(), "blog".to_string()];
        let wide = f.reconciler.get_file_tree(&f.project, "main", "zh").await;

        // Assert
        assert!(find(&narrow.nodes, "blog/c.md").is_none());
        let node = find(&wide.nodes, "blog/c.md").unwrap();
        assert_eq!(node.status, TranslationStatus::Translated);
        assert_eq!(node.last_hash, Some(ContentHash::new("h3")));
    }

    #[tokio::test]
    async fn test_failed_upstream_read_keeps_history() {
        // Arrange
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        write_local(&f.project, "docs/a.md", "# 甲");
        f.reconciler
            .record_translation(&f.project, "zh", "docs/a.md", ContentHash::new("h1"))
            .unwrap();
        let persisted_before = fs::read_to_string(f.project.resolve_status_file("zh")).unwrap();
        f.vcs.fail_bulk.store(true, Ordering::SeqCst);

        // Act
        let tree = f.reconciler.sync_file_statuses(&f.project, "main", "zh").await;

        // Assert
        let node = find(&tree.nodes, "docs/a.md").unwrap();
        assert_eq!(node.status, TranslationStatus::Untranslated);
        let persisted_after = fs::read_to_string(f.project.resolve_status_file("zh")).unwrap();
        assert_eq!(persisted_before, persisted_after);

        f.vcs.fail_bulk.store(false, Ordering::SeqCst);
        let recovered = f.reconciler.get_file_tree(&f.project, "main", "zh").await;
        assert_eq!(
            find(&recovered.nodes, "docs/a.md").unwrap().status,
            TranslationStatus::Translated
        );
    }

    #[tokio::test]
    async fn test_branches_do_not_share_statuses() {
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        write_local(&f.project, "docs/a.md", "# 甲");
        f.reconciler
            .record_translation(&f.project, "zh", "docs/a.md", ContentHash::new("h1"))
            .unwrap();

        let other = f.reconciler.get_status(&f.project, "docs/a.md", "main", "ja").await;
        let tree = f.reconciler.get_file_tree(&f.project, "main", "ja").await;

        assert_eq!(other.status, TranslationStatus::Untranslated);
        assert_eq!(tree.summary.translated, 0);
        assert!(!f.project.resolve_status_file("ja").exists());
    }

    #[tokio::test]
    async fn test_modified_flag_is_live() {
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        write_local(&f.project, "docs/a.md", "# 甲");
        f.reconciler
            .record_translation(&f.project, "zh", "docs/a.md", ContentHash::new("h1"))
            .unwrap();

        let clean = f.reconciler.get_status(&f.project, "docs/a.md", "main", "zh").await;
        f.vcs.set_modified(&["docs/a.md"]);
        let dirty = f.reconciler.get_status(&f.project, "docs/a.md", "main", "zh").await;
        let tree = f.reconciler.get_file_tree(&f.project, "main", "zh").await;

        assert!(!clean.modified);
        assert!(dirty.modified);
        assert_eq!(dirty.status, TranslationStatus::Translated);
        assert_eq!(tree.summary.modified, 1);
    }

    #[tokio::test]
    async fn test_single_path_miss_consults_per_path_reads() {
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");

        let missing = f.reconciler.get_status(&f.project, "docs/zz.md", "main", "zh").await;
        let fresh = f
            .reconciler
            .compute_fresh_status(&f.project, "docs/a.md", "main", Some(&ContentHash::new("h0")))
            .await
            .unwrap();

        assert_eq!(missing.status, TranslationStatus::Untranslated);
        assert_eq!(fresh.status, TranslationStatus::Outdated);
        assert_eq!(fresh.last_hash, ContentHash::new("h0"));
        assert_eq!(f.vcs.call_count("bulk_list_tree"), 0);
    }

    #[tokio::test]
    async fn test_clear_project_cache_reloads_from_disk() {
        let f = fixture();
        f.vcs.set_upstream_file("upstream/main", "docs/a.md", "h1", "# A");
        write_local(&f.project, "docs/a.md", "# 甲");
        f.reconciler
            .record_translation(&f.project, "zh", "docs/a.md", ContentHash::new("h1"))
            .unwrap();
        f.reconciler.get_file_tree(&f.project, "main", "zh").await;

        f.reconciler.clear_project_cache(&f.project.root);

        assert!(!f.reconciler.upstream().is_cached(&f.project.root, "main"));
        assert!(!f.reconciler.store().is_loaded(&f.project.root, "zh"));
        let status = f.reconciler.get_status(&f.project, "docs/a.md", "main", "zh").await;
        assert_eq!(status.status, TranslationStatus::Translated);
    }
}
