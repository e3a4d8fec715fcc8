/*
 * Hand-written test doubles for the `*Operations` traits. State lives behind `Mutex`es so
 * tests can arrange and inspect it through shared `Arc`s.
 */
use crate::core::models::ContentHash;
use crate::core::translator::{self, TranslateError, TranslatorOperations};
use crate::core::vcs::{
    self, CommitSummary, StatusEntry, TreeEntry, VcsError, VersionControlOperations,
};
use crate::core::path_utils;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Clone)]
struct UpstreamBlob {
    hash: ContentHash,
    content: Vec<u8>,
}

pub struct MockVersionControl {
    upstream: Mutex<HashMap<String, BTreeMap<String, UpstreamBlob>>>,
    modified: Mutex<Vec<StatusEntry>>,
    local_branches: Mutex<Vec<String>>,
    remote_branches: Mutex<Vec<String>>,
    staged: Mutex<Vec<String>>,
    commits: Mutex<Vec<String>>,
    current: Mutex<String>,
    calls: Mutex<Vec<String>>,
    pub fail_bulk: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_push: AtomicBool,
}

impl MockVersionControl {
    pub fn new() -> Self {
        MockVersionControl {
            upstream: Mutex::new(HashMap::new()),
            modified: Mutex::new(Vec::new()),
            local_branches: Mutex::new(vec!["main".to_string()]),
            remote_branches: Mutex::new(vec!["main".to_string()]),
            staged: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            current: Mutex::new("main".to_string()),
            calls: Mutex::new(Vec::new()),
            fail_bulk: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
        }
    }

    pub fn set_upstream_file(&self, reference: &str, path: &str, hash: &str, content: &str) {
        self.upstream
            .lock()
            .unwrap()
            .entry(reference.to_string())
            .or_default()
            .insert(
                path.to_string(),
                UpstreamBlob {
                    hash: ContentHash::new(hash),
                    content: content.as_bytes().to_vec(),
                },
            );
    }

    pub fn remove_upstream_file(&self, reference: &str, path: &str) {
        if let Some(files) = self.upstream.lock().unwrap().get_mut(reference) {
            files.remove(path);
        }
    }

    pub fn set_modified(&self, paths: &[&str]) {
        *self.modified.lock().unwrap() = paths
            .iter()
            .map(|path| StatusEntry {
                path: path.to_string(),
            })
            .collect();
    }

    pub fn set_local_branches(&self, branches: &[&str]) {
        *self.local_branches.lock().unwrap() = branches.iter().map(|b| b.to_string()).collect();
    }

    pub fn set_remote_branches(&self, branches: &[&str]) {
        *self.remote_branches.lock().unwrap() = branches.iter().map(|b| b.to_string()).collect();
    }

    pub fn staged(&self) -> Vec<String> {
        self.staged.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    pub fn current(&self) -> String {
        self.current.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    fn blob(&self, reference: &str, path: &str) -> Option<UpstreamBlob> {
        self.upstream
            .lock()
            .unwrap()
            .get(reference)
            .and_then(|files| files.get(path).cloned())
    }

    fn failure(command: &str) -> VcsError {
        VcsError::CommandFailed {
            command: command.to_string(),
            code: Some(128),
            stderr: "simulated failure".to_string(),
        }
    }
}

fn matches_filters(path: &str, filters: &[String]) -> bool {
    filters.is_empty() || filters.iter().any(|f| path_utils::is_within(path, f))
}

#[async_trait]
impl VersionControlOperations for MockVersionControl {
    async fn list_local_branches(&self, _repo: &Path) -> vcs::Result<Vec<String>> {
        self.record("list_local_branches");
        Ok(self.local_branches.lock().unwrap().clone())
    }

    async fn list_remote_branches(&self, _repo: &Path, _remote: &str) -> vcs::Result<Vec<String>> {
        self.record("list_remote_branches");
        Ok(self.remote_branches.lock().unwrap().clone())
    }

    async fn fetch(&self, _repo: &Path, _remote: &str) -> vcs::Result<()> {
        self.record("fetch");
        Ok(())
    }

    async fn checkout(&self, _repo: &Path, branch: &str) -> vcs::Result<()> {
        self.record("checkout");
        *self.current.lock().unwrap() = branch.to_string();
        Ok(())
    }

    async fn read_file_at(&self, _repo: &Path, reference: &str, path: &str) -> vcs::Result<Vec<u8>> {
        self.record("read_file_at");
        self.blob(reference, path)
            .map(|blob| blob.content)
            .ok_or_else(|| VcsError::NotFound {
                reference: reference.to_string(),
                path: path.to_string(),
            })
    }

    async fn file_exists_at(&self, _repo: &Path, reference: &str, path: &str) -> vcs::Result<bool> {
        self.record("file_exists_at");
        Ok(self.blob(reference, path).is_some())
    }

    async fn bulk_list_tree(
        &self,
        _repo: &Path,
        reference: &str,
        filters: &[String],
    ) -> vcs::Result<Vec<TreeEntry>> {
        self.record("bulk_list_tree");
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(Self::failure("git ls-tree"));
        }
        let upstream = self.upstream.lock().unwrap();
        Ok(upstream
            .get(reference)
            .map(|files| {
                files
                    .iter()
                    .filter(|(path, _)| matches_filters(path, filters))
                    .map(|(path, blob)| TreeEntry {
                        path: path.clone(),
                        hash: blob.hash.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn blob_hash_at(
        &self,
        _repo: &Path,
        reference: &str,
        path: &str,
    ) -> vcs::Result<Option<ContentHash>> {
        self.record("blob_hash_at");
        Ok(self.blob(reference, path).map(|blob| blob.hash))
    }

    async fn last_commit_hash(
        &self,
        _repo: &Path,
        reference: &str,
        path: &str,
    ) -> vcs::Result<Option<String>> {
        self.record("last_commit_hash");
        Ok(self
            .blob(reference, path)
            .map(|blob| format!("commit-{}", blob.hash)))
    }

    async fn working_tree_status(
        &self,
        _repo: &Path,
        filters: &[String],
    ) -> vcs::Result<Vec<StatusEntry>> {
        self.record("working_tree_status");
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Self::failure("git status"));
        }
        Ok(self
            .modified
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| matches_filters(&entry.path, filters))
            .cloned()
            .collect())
    }

    async fn staged_paths(&self, _repo: &Path) -> vcs::Result<Vec<String>> {
        self.record("staged_paths");
        Ok(self.staged())
    }

    async fn stage(&self, _repo: &Path, path: &str) -> vcs::Result<()> {
        self.record("stage");
        let mut staged = self.staged.lock().unwrap();
        if !staged.iter().any(|p| p == path) {
            staged.push(path.to_string());
        }
        Ok(())
    }

    async fn stage_all(&self, _repo: &Path) -> vcs::Result<()> {
        self.record("stage_all");
        let modified: Vec<String> = self
            .modified
            .lock()
            .unwrap()
            .iter()
            .map(|entry| entry.path.clone())
            .collect();
        let mut staged = self.staged.lock().unwrap();
        for path in modified {
            if !staged.contains(&path) {
                staged.push(path);
            }
        }
        Ok(())
    }

    async fn unstage(&self, _repo: &Path, path: &str) -> vcs::Result<()> {
        self.record("unstage");
        self.staged.lock().unwrap().retain(|p| p != path);
        Ok(())
    }

    async fn commit(&self, _repo: &Path, message: &str) -> vcs::Result<()> {
        self.record("commit");
        self.commits.lock().unwrap().push(message.to_string());
        self.staged.lock().unwrap().clear();
        Ok(())
    }

    async fn push(&self, _repo: &Path, _remote: &str, _branch: &str) -> vcs::Result<()> {
        self.record("push");
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Self::failure("git push"));
        }
        Ok(())
    }

    async fn current_branch(&self, _repo: &Path) -> vcs::Result<String> {
        self.record("current_branch");
        Ok(self.current())
    }

    async fn remote_url(&self, _repo: &Path, remote: &str) -> vcs::Result<String> {
        self.record("remote_url");
        Ok(format!("https://example.invalid/{remote}.git"))
    }

    async fn log(
        &self,
        _repo: &Path,
        limit: usize,
        _path: Option<&str>,
    ) -> vcs::Result<Vec<CommitSummary>> {
        self.record("log");
        Ok(self
            .commits()
            .iter()
            .rev()
            .take(limit)
            .enumerate()
            .map(|(index, subject)| CommitSummary {
                id: format!("c{index}"),
                author: "Tester".to_string(),
                timestamp: 1_700_000_000,
                subject: subject.clone(),
            })
            .collect())
    }
}

/*
 * Prefixes every text with "[zh] ". Texts containing a configured failure needle produce
 * an API error. An optional delay makes concurrency observable: `max_in_flight` records
 * the highest number of simultaneous calls.
 */
pub struct MockTranslator {
    failing_needles: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<Option<String>>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        MockTranslator {
            failing_needles: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        MockTranslator {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn fail_on(&self, needle: &str) {
        self.failing_needles.lock().unwrap().push(needle.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<Option<String>> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslatorOperations for MockTranslator {
    async fn translate(&self, text: &str, prompt: Option<&str>) -> translator::Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        self.prompts.lock().unwrap().push(prompt.map(str::to_string));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let should_fail = self
            .failing_needles
            .lock()
            .unwrap()
            .iter()
            .any(|needle| text.contains(needle.as_str()));
        if should_fail {
            return Err(TranslateError::Api {
                status: 500,
                body: "simulated backend failure".to_string(),
            });
        }
        Ok(format!("[zh] {text}"))
    }
}
