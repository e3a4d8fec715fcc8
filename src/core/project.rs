/*
 * Domain object representing a translated fork under management. It carries the
 * user-configured branch names, watched directories and accepted extensions, and
 * centralizes the project-local storage layout (`.transync/status/...`) so callers use
 * semantic resolvers instead of hand-built paths.
 */
use crate::core::path_utils;
use crate::core::status_cache::sanitize_branch_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const PROJECT_CONFIG_DIR_NAME: &str = ".transync";
pub(super) const STATUS_SUBFOLDER_NAME: &str = "status";
pub(super) const STATUS_FILE_EXTENSION: &str = "json";
pub const DEFAULT_UPSTREAM_REMOTE: &str = "upstream";
pub const DEFAULT_PUSH_REMOTE: &str = "origin";

/// Configured root-directory values that mean "scan the whole project".
pub(crate) const WHOLE_PROJECT_SENTINELS: [&str; 3] = ["", ".", "/"];

fn default_upstream_remote() -> String {
    DEFAULT_UPSTREAM_REMOTE.to_string()
}

fn default_push_remote() -> String {
    DEFAULT_PUSH_REMOTE.to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "mdx".to_string(), "ipynb".to_string()]
}

/*
 * A project is an immutable input for every core call. It is owned by the user-editable
 * settings; the engine never mutates it.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub root: PathBuf,
    #[serde(default = "default_upstream_remote")]
    pub upstream_remote: String,
    pub upstream_branch: String,
    pub working_branch: String,
    #[serde(default = "default_push_remote")]
    pub push_remote: String,
    #[serde(default)]
    pub watch_dirs: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        root: PathBuf,
        upstream_branch: impl Into<String>,
        working_branch: impl Into<String>,
    ) -> Self {
        Project {
            name: name.into(),
            root,
            upstream_remote: default_upstream_remote(),
            upstream_branch: upstream_branch.into(),
            working_branch: working_branch.into(),
            push_remote: default_push_remote(),
            watch_dirs: Vec::new(),
            extensions: default_extensions(),
            custom_prompt: None,
        }
    }

    /// The remote-tracking ref for an upstream branch, e.g. `upstream/main`.
    pub fn upstream_ref(&self, upstream_branch: &str) -> String {
        format!("{}/{}", self.upstream_remote, upstream_branch)
    }

    /*
     * Canonical watched directories. An empty list (or the single whole-project
     * sentinel) yields an empty vector, meaning no path filter.
     */
    pub fn watch_filters(&self) -> Vec<String> {
        if self.scans_whole_project() {
            return Vec::new();
        }
        self.watch_dirs
            .iter()
            .map(|dir| path_utils::to_canonical(dir))
            .filter(|dir| !dir.is_empty())
            .collect()
    }

    pub fn scans_whole_project(&self) -> bool {
        match self.watch_dirs.as_slice() {
            [] => true,
            [single] => WHOLE_PROJECT_SENTINELS.contains(&single.trim()),
            _ => false,
        }
    }

    pub fn is_watched(&self, canonical: &str) -> bool {
        let filters = self.watch_filters();
        filters.is_empty() || filters.iter().any(|dir| path_utils::is_within(canonical, dir))
    }

    pub fn accepts_extension(&self, canonical: &str) -> bool {
        let Some(extension) = path_utils::extension_of(canonical) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|accepted| accepted.trim_start_matches('.').eq_ignore_ascii_case(&extension))
    }

    pub(super) fn resolve_config_dir(&self) -> PathBuf {
        self.root.join(PROJECT_CONFIG_DIR_NAME)
    }

    pub(super) fn resolve_status_dir(&self) -> PathBuf {
        self.resolve_config_dir().join(STATUS_SUBFOLDER_NAME)
    }

    pub(super) fn resolve_status_file(&self, working_branch: &str) -> PathBuf {
        let sanitized = sanitize_branch_name(working_branch);
        self.resolve_status_dir()
            .join(format!("{sanitized}.{STATUS_FILE_EXTENSION}"))
    }
}

/// True for paths inside the tool's own project-local directory.
pub fn is_internal_config_path(canonical: &str) -> bool {
    canonical
        .split('/')
        .any(|segment| segment == PROJECT_CONFIG_DIR_NAME)
}
