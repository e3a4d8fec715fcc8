use crate::core::models::ContentHash;
use crate::core::path_utils;
use async_trait::async_trait;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/*
 * This module is the boundary to the version-control oracle. The engine treats `git`
 * as a black box: every query is an async, fallible call, abstracted behind
 * `VersionControlOperations` so the reconciler and workflow can run against a test
 * double. `CoreGitCli` drives the real `git` binary through `tokio::process`, uses `-z`
 * output wherever paths are parsed, and enforces a per-command timeout.
 *
 * The output parsers are free functions so they can be tested without a repository.
 */

#[derive(Debug)]
pub enum VcsError {
    Io(io::Error),
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    Timeout {
        command: String,
        after: Duration,
    },
    NotFound {
        reference: String,
        path: String,
    },
}

impl From<io::Error> for VcsError {
    fn from(err: io::Error) -> Self {
        VcsError::Io(err)
    }
}

impl std::fmt::Display for VcsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VcsError::Io(e) => write!(f, "Failed to run git: {e}"),
            VcsError::CommandFailed {
                command,
                code,
                stderr,
            } => match code {
                Some(code) => write!(f, "'{command}' exited with code {code}: {stderr}"),
                None => write!(f, "'{command}' was terminated: {stderr}"),
            },
            VcsError::Timeout { command, after } => {
                write!(f, "'{command}' timed out after {}s", after.as_secs())
            }
            VcsError::NotFound { reference, path } => {
                write!(f, "'{path}' does not exist at '{reference}'")
            }
        }
    }
}

impl std::error::Error for VcsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VcsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;

/// One blob of a bulk tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub hash: ContentHash,
}

/// One changed, staged or untracked path reported by `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub id: String,
    pub author: String,
    pub timestamp: i64,
    pub subject: String,
}

/*
 * Every call takes the repository root it runs in, so one oracle instance serves any
 * number of projects.
 */
#[async_trait]
pub trait VersionControlOperations: Send + Sync {
    async fn list_local_branches(&self, repo: &Path) -> Result<Vec<String>>;
    async fn list_remote_branches(&self, repo: &Path, remote: &str) -> Result<Vec<String>>;
    async fn fetch(&self, repo: &Path, remote: &str) -> Result<()>;
    async fn checkout(&self, repo: &Path, branch: &str) -> Result<()>;
    async fn read_file_at(&self, repo: &Path, reference: &str, path: &str) -> Result<Vec<u8>>;
    async fn file_exists_at(&self, repo: &Path, reference: &str, path: &str) -> Result<bool>;
    /// Lists every blob under `reference`, restricted to `filters` (whole tree if empty).
    async fn bulk_list_tree(
        &self,
        repo: &Path,
        reference: &str,
        filters: &[String],
    ) -> Result<Vec<TreeEntry>>;
    async fn blob_hash_at(
        &self,
        repo: &Path,
        reference: &str,
        path: &str,
    ) -> Result<Option<ContentHash>>;
    async fn last_commit_hash(
        &self,
        repo: &Path,
        reference: &str,
        path: &str,
    ) -> Result<Option<String>>;
    async fn working_tree_status(&self, repo: &Path, filters: &[String])
    -> Result<Vec<StatusEntry>>;
    async fn staged_paths(&self, repo: &Path) -> Result<Vec<String>>;
    async fn stage(&self, repo: &Path, path: &str) -> Result<()>;
    async fn stage_all(&self, repo: &Path) -> Result<()>;
    async fn unstage(&self, repo: &Path, path: &str) -> Result<()>;
    async fn commit(&self, repo: &Path, message: &str) -> Result<()>;
    async fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()>;
    async fn current_branch(&self, repo: &Path) -> Result<String>;
    async fn remote_url(&self, repo: &Path, remote: &str) -> Result<String>;
    async fn log(&self, repo: &Path, limit: usize, path: Option<&str>)
    -> Result<Vec<CommitSummary>>;
}

pub struct CoreGitCli {
    git_binary: PathBuf,
    command_timeout: Duration,
}

impl CoreGitCli {
    pub fn new(command_timeout: Duration) -> Self {
        CoreGitCli {
            git_binary: PathBuf::from("git"),
            command_timeout,
        }
    }

    /*
     * Runs `git <args>` in `repo` and returns stdout. A non-zero exit becomes
     * `CommandFailed` carrying the trimmed stderr; exceeding the timeout kills the child.
     */
    async fn run(&self, repo: &Path, args: &[String]) -> Result<Vec<u8>> {
        let rendered = format!("git {}", args.join(" "));
        log::trace!("GitCli: Running '{rendered}' in {repo:?}");

        let mut command = Command::new(&self.git_binary);
        command
            .args(args)
            .current_dir(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.command_timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!("GitCli: '{rendered}' timed out in {repo:?}");
                return Err(VcsError::Timeout {
                    command: rendered,
                    after: self.command_timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: rendered,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    async fn run_text(&self, repo: &Path, args: &[String]) -> Result<String> {
        let stdout = self.run(repo, args).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn object_spec(reference: &str, path: &str) -> String {
    format!("{reference}:{}", path_utils::to_vcs_path(path))
}

#[async_trait]
impl VersionControlOperations for CoreGitCli {
    async fn list_local_branches(&self, repo: &Path) -> Result<Vec<String>> {
        let text = self
            .run_text(repo, &args(&["branch", "--format=%(refname:short)"]))
            .await?;
        Ok(parse_branch_list(&text))
    }

    async fn list_remote_branches(&self, repo: &Path, remote: &str) -> Result<Vec<String>> {
        let text = self
            .run_text(repo, &args(&["branch", "-r", "--format=%(refname:short)"]))
            .await?;
        Ok(parse_remote_branches(&text, remote))
    }

    async fn fetch(&self, repo: &Path, remote: &str) -> Result<()> {
        self.run(repo, &args(&["fetch", "--prune", remote])).await?;
        Ok(())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> Result<()> {
        self.run(repo, &args(&["checkout", branch])).await?;
        Ok(())
    }

    async fn read_file_at(&self, repo: &Path, reference: &str, path: &str) -> Result<Vec<u8>> {
        let spec = object_spec(reference, path);
        match self.run(repo, &[String::from("show"), spec]).await {
            Err(VcsError::CommandFailed { stderr, .. }) if is_missing_object(&stderr) => {
                Err(VcsError::NotFound {
                    reference: reference.to_string(),
                    path: path.to_string(),
                })
            }
            other => other,
        }
    }

    async fn file_exists_at(&self, repo: &Path, reference: &str, path: &str) -> Result<bool> {
        let spec = object_spec(reference, path);
        match self.run(repo, &[String::from("cat-file"), "-e".into(), spec]).await {
            Ok(_) => Ok(true),
            Err(VcsError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn bulk_list_tree(
        &self,
        repo: &Path,
        reference: &str,
        filters: &[String],
    ) -> Result<Vec<TreeEntry>> {
        let mut command = args(&["ls-tree", "-r", "-z", reference, "--"]);
        command.extend(filters.iter().map(|f| path_utils::to_vcs_path(f)));
        let stdout = self.run(repo, &command).await?;
        Ok(parse_ls_tree(&stdout))
    }

    async fn blob_hash_at(
        &self,
        repo: &Path,
        reference: &str,
        path: &str,
    ) -> Result<Option<ContentHash>> {
        let spec = object_spec(reference, path);
        let command = vec![
            String::from("rev-parse"),
            "--verify".into(),
            "--quiet".into(),
            spec,
        ];
        match self.run_text(repo, &command).await {
            Ok(text) => {
                let hash = text.trim();
                Ok((!hash.is_empty()).then(|| ContentHash::new(hash)))
            }
            Err(VcsError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn last_commit_hash(
        &self,
        repo: &Path,
        reference: &str,
        path: &str,
    ) -> Result<Option<String>> {
        let command = args(&[
            "log",
            "-1",
            "--format=%H",
            reference,
            "--",
            &path_utils::to_vcs_path(path),
        ]);
        let text = self.run_text(repo, &command).await?;
        let id = text.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }

    async fn working_tree_status(
        &self,
        repo: &Path,
        filters: &[String],
    ) -> Result<Vec<StatusEntry>> {
        let mut command = args(&["status", "--porcelain=v1", "-z", "--untracked-files=all", "--"]);
        command.extend(filters.iter().map(|f| path_utils::to_vcs_path(f)));
        let stdout = self.run(repo, &command).await?;
        Ok(parse_porcelain_status(&stdout))
    }

    async fn staged_paths(&self, repo: &Path) -> Result<Vec<String>> {
        let stdout = self
            .run(repo, &args(&["diff", "--cached", "--name-only", "-z"]))
            .await?;
        Ok(split_nul(&stdout).map(path_utils::from_vcs_path).collect())
    }

    async fn stage(&self, repo: &Path, path: &str) -> Result<()> {
        self.run(repo, &args(&["add", "--", &path_utils::to_vcs_path(path)]))
            .await?;
        Ok(())
    }

    async fn stage_all(&self, repo: &Path) -> Result<()> {
        self.run(repo, &args(&["add", "-A"])).await?;
        Ok(())
    }

    async fn unstage(&self, repo: &Path, path: &str) -> Result<()> {
        self.run(
            repo,
            &args(&["restore", "--staged", "--", &path_utils::to_vcs_path(path)]),
        )
        .await?;
        Ok(())
    }

    async fn commit(&self, repo: &Path, message: &str) -> Result<()> {
        self.run(repo, &args(&["commit", "-m", message])).await?;
        Ok(())
    }

    async fn push(&self, repo: &Path, remote: &str, branch: &str) -> Result<()> {
        self.run(repo, &args(&["push", remote, branch])).await?;
        Ok(())
    }

    async fn current_branch(&self, repo: &Path) -> Result<String> {
        let text = self
            .run_text(repo, &args(&["rev-parse", "--abbrev-ref", "HEAD"]))
            .await?;
        Ok(text.trim().to_string())
    }

    async fn remote_url(&self, repo: &Path, remote: &str) -> Result<String> {
        let text = self
            .run_text(repo, &args(&["remote", "get-url", remote]))
            .await?;
        Ok(text.trim().to_string())
    }

    async fn log(
        &self,
        repo: &Path,
        limit: usize,
        path: Option<&str>,
    ) -> Result<Vec<CommitSummary>> {
        let mut command = args(&["log", "--format=%H%x1f%an%x1f%at%x1f%s"]);
        command.push(format!("-n{limit}"));
        if let Some(path) = path {
            command.push("--".into());
            command.push(path_utils::to_vcs_path(path));
        }
        let text = self.run_text(repo, &command).await?;
        Ok(parse_log(&text))
    }
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("does not exist")
        || stderr.contains("exists on disk, but not in")
        || stderr.contains("invalid object name")
        || stderr.contains("not a valid object name")
}

fn split_nul(bytes: &[u8]) -> impl Iterator<Item = &str> {
    bytes
        .split(|b| *b == 0)
        .filter(|record| !record.is_empty())
        .filter_map(|record| std::str::from_utf8(record).ok())
}

/*
 * Parses `git ls-tree -r -z` output: records of `<mode> SP <type> SP <object> TAB <path>`
 * separated by NUL. Non-blob entries (submodule commits) are skipped.
 */
pub(crate) fn parse_ls_tree(bytes: &[u8]) -> Vec<TreeEntry> {
    split_nul(bytes)
        .filter_map(|record| {
            let (meta, path) = record.split_once('\t')?;
            let mut fields = meta.split(' ');
            let (_mode, kind, object) = (fields.next()?, fields.next()?, fields.next()?);
            (kind == "blob").then(|| TreeEntry {
                path: path_utils::from_vcs_path(path),
                hash: ContentHash::new(object),
            })
        })
        .collect()
}

/*
 * Parses `git status --porcelain=v1 -z`. Each record is `XY SP <path>`; renames and
 * copies are followed by an extra record holding the original path, which is skipped.
 */
pub(crate) fn parse_porcelain_status(bytes: &[u8]) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut records = split_nul(bytes);
    while let Some(record) = records.next() {
        if record.len() < 4 {
            continue;
        }
        let (code, path) = record.split_at(2);
        if code.contains('R') || code.contains('C') {
            records.next();
        }
        entries.push(StatusEntry {
            path: path_utils::from_vcs_path(&path[1..]),
        });
    }
    entries
}

pub(crate) fn parse_branch_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('('))
        .map(str::to_string)
        .collect()
}

/// Keeps `<remote>/<branch>` entries for `remote`, stripped of the prefix, without `HEAD`.
pub(crate) fn parse_remote_branches(text: &str, remote: &str) -> Vec<String> {
    let prefix = format!("{remote}/");
    parse_branch_list(text)
        .into_iter()
        .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
        .filter(|branch| branch != "HEAD")
        .collect()
}

pub(crate) fn parse_log(text: &str) -> Vec<CommitSummary> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.splitn(4, '\x1f');
            let id = fields.next()?.trim();
            let author = fields.next()?;
            let timestamp = fields.next()?.trim().parse().ok()?;
            let subject = fields.next().unwrap_or_default();
            (!id.is_empty()).then(|| CommitSummary {
                id: id.to_string(),
                author: author.to_string(),
                timestamp,
                subject: subject.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_tree_keeps_blobs_only() {
        let output = b"100644 blob aaa111\tdocs/a.md\0160000 commit bbb222\tvendor/sub\0100644 blob ccc333\tdocs/with space.md\0";

        let entries = parse_ls_tree(output);

        assert_eq!(
            entries,
            vec![
                TreeEntry {
                    path: "docs/a.md".to_string(),
                    hash: ContentHash::new("aaa111"),
                },
                TreeEntry {
                    path: "docs/with space.md".to_string(),
                    hash: ContentHash::new("ccc333"),
                },
            ]
        );
    }

    #[test]
    fn test_parse_porcelain_status_skips_rename_origin() {
        let output = b" M docs/a.md\0R  docs/new.md\0docs/old.md\0?? docs/untracked.md\0";

        let entries = parse_porcelain_status(output);

        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/a.md", "docs/new.md", "docs/untracked.md"]);
    }

    #[test]
    fn test_parse_branches() {
        let local = "main\n  zh-cn\n(HEAD detached at 1234)\n";
        assert_eq!(parse_branch_list(local), vec!["main", "zh-cn"]);

        let remote = "upstream\nupstream/HEAD\nupstream/main\nupstream/v2\norigin/main\n";
        assert_eq!(parse_remote_branches(remote, "upstream"), vec!["main", "v2"]);
    }

    #[test]
    fn test_parse_log() {
        let text = "abc\x1fAda\x1f1700000000\x1fTranslate docs/a.md\nbad line\n";

        let commits = parse_log(text);

        assert_eq!(
            commits,
            vec![CommitSummary {
                id: "abc".to_string(),
                author: "Ada".to_string(),
                timestamp: 1_700_000_000,
                subject: "Translate docs/a.md".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_object_detection() {
        assert!(is_missing_object(
            "fatal: path 'docs/x.md' does not exist in 'upstream/main'"
        ));
        assert!(!is_missing_object("fatal: unable to access remote"));
    }
}
