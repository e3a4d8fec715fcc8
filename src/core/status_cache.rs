use crate::core::models::{StatusCacheEntry, TranslationStatus};
use crate::core::project::Project;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/*
 * The Status Cache Store: the durable record, per (project root, working branch), of which
 * paths were translated and against which upstream hash. In memory it is a map keyed by
 * that tuple; on disk each branch gets one pretty-printed JSON object at
 * `<root>/.transync/status/<sanitized-branch>.json`, sorted by path.
 *
 * Only translated and outdated entries exist. Loss or corruption of the file degrades to
 * "everything untranslated".
 */

#[derive(Debug)]
pub enum StatusCacheError {
    Io(io::Error),
    Serde(serde_json::Error),
}

impl From<io::Error> for StatusCacheError {
    fn from(err: io::Error) -> Self {
        StatusCacheError::Io(err)
    }
}

impl From<serde_json::Error> for StatusCacheError {
    fn from(err: serde_json::Error) -> Self {
        StatusCacheError::Serde(err)
    }
}

impl std::fmt::Display for StatusCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCacheError::Io(e) => write!(f, "Status cache I/O error: {e}"),
            StatusCacheError::Serde(e) => write!(f, "Status cache format error: {e}"),
        }
    }
}

impl std::error::Error for StatusCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusCacheError::Io(e) => Some(e),
            StatusCacheError::Serde(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StatusCacheError>;

/*
 * Maps a branch name to a file-name-safe token. Characters unsafe in file names on any
 * platform, and control characters, become `_`.
 */
pub fn sanitize_branch_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if sanitized.chars().all(|c| c == '.') {
        // "", "." and ".." are not usable as file stems.
        return "_".repeat(sanitized.len().max(1));
    }
    sanitized
}

type BranchKey = (PathBuf, String);
type BranchEntries = BTreeMap<String, StatusCacheEntry>;

#[derive(Default)]
pub struct StatusCacheStore {
    branches: Mutex<HashMap<BranchKey, BranchEntries>>,
}

impl StatusCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(project: &Project, working_branch: &str) -> BranchKey {
        (project.root.clone(), working_branch.to_string())
    }

    /*
     * Replaces the in-memory entries for (project, branch) with the persisted file.
     * A missing file yields an empty cache; a corrupt one is logged and also yields an
     * empty cache. Returns the number of entries loaded.
     */
    pub fn load(&self, project: &Project, working_branch: &str) -> usize {
        let file_path = project.resolve_status_file(working_branch);
        let entries = match read_status_file(&file_path) {
            Ok(entries) => entries,
            Err(StatusCacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                log::trace!("StatusCacheStore: No status file at {file_path:?}.");
                BranchEntries::new()
            }
            Err(e) => {
                log::warn!(
                    "StatusCacheStore: Ignoring unreadable status file {file_path:?}: {e}"
                );
                BranchEntries::new()
            }
        };
        let count = entries.len();
        let mut branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches.insert(Self::key(project, working_branch), entries);
        log::debug!(
            "StatusCacheStore: Loaded {count} entries for branch '{working_branch}' of {:?}.",
            project.root
        );
        count
    }

    pub fn get(&self, project: &Project, working_branch: &str, path: &str) -> Option<StatusCacheEntry> {
        let branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches
            .get(&Self::key(project, working_branch))
            .and_then(|entries| entries.get(path).cloned())
    }

    /// Returns false (and stores nothing) for an untranslated entry.
    pub fn put(
        &self,
        project: &Project,
        working_branch: &str,
        path: &str,
        entry: StatusCacheEntry,
    ) -> bool {
        if !entry.status.is_recorded() {
            log::warn!(
                "StatusCacheStore: Refusing to record untranslated status for '{path}' on '{working_branch}'."
            );
            return false;
        }
        let mut branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches
            .entry(Self::key(project, working_branch))
            .or_default()
            .insert(path.to_string(), entry);
        true
    }

    pub fn entries(&self, project: &Project, working_branch: &str) -> BranchEntries {
        let branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches
            .get(&Self::key(project, working_branch))
            .cloned()
            .unwrap_or_default()
    }

    /*
     * Overwrites the branch's status file with its current in-memory entries. When no
     * entries remain, the file is deleted instead, along with the status directory and
     * the project-local directory if they end up empty.
     */
    pub fn save(&self, project: &Project, working_branch: &str) -> Result<()> {
        let entries: BranchEntries = self
            .entries(project, working_branch)
            .into_iter()
            .filter(|(_, entry)| entry.status.is_recorded())
            .collect();
        let file_path = project.resolve_status_file(working_branch);

        if entries.is_empty() {
            match fs::remove_file(&file_path) {
                Ok(()) => log::debug!("StatusCacheStore: Removed empty status file {file_path:?}."),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            // Only succeeds on empty directories.
            let _ = fs::remove_dir(project.resolve_status_dir());
            let _ = fs::remove_dir(project.resolve_config_dir());
            return Ok(());
        }

        fs::create_dir_all(project.resolve_status_dir())?;
        let file = File::create(&file_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &entries)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        log::debug!(
            "StatusCacheStore: Saved {} entries to {file_path:?}.",
            entries.len()
        );
        Ok(())
    }

    pub fn clear_project(&self, project_root: &Path) {
        let mut branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches.retain(|(root, _), _| root != project_root);
    }

    pub fn clear_branch(&self, project_root: &Path, working_branch: &str) {
        let mut branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches.remove(&(project_root.to_path_buf(), working_branch.to_string()));
    }

    pub fn is_loaded(&self, project_root: &Path, working_branch: &str) -> bool {
        let branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        branches.contains_key(&(project_root.to_path_buf(), working_branch.to_string()))
    }
}

fn read_status_file(file_path: &Path) -> Result<BranchEntries> {
    let file = File::open(file_path)?;
    let entries: BranchEntries = serde_json::from_reader(BufReader::new(file))?;
    Ok(entries
        .into_iter()
        .filter(|(_, entry)| entry.status != TranslationStatus::Untranslated)
        .collect())
}
