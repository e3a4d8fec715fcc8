/*
 * This module provides utility functions for path manipulation. It covers two concerns:
 * retrieving and ensuring the existence of the per-user application configuration
 * directory, and the single boundary where paths cross between the host filesystem,
 * the version-control oracle and the engine's canonical representation.
 *
 * Canonical form: relative to the project root, forward slashes only, no leading "./",
 * no trailing separator. Every path stored in a cache or sent to `git` is canonical.
 */
use directories::ProjectDirs;
use std::fs;
use std::path::{Component, Path, PathBuf};

/*
 * Retrieves the application's primary local configuration directory.
 * This function determines the platform-specific path for local (non-roaming)
 * application configuration data. It ensures the directory exists, creating it
 * if necessary.
 *
 * Returns `None` if the directory could not be determined or created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Attempting to get base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!(
                    "PathUtils: Failed to create base app config directory {config_path:?}: {e}"
                );
                return None;
            }
            log::debug!("PathUtils: Created base app config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

/*
 * Normalizes a user- or oracle-supplied relative path into canonical form.
 * Backslashes become forward slashes, empty and "." segments are dropped.
 */
pub fn to_canonical(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/*
 * Canonical form of a client-supplied path that must name something inside the project.
 * Rooted paths, drive prefixes, `..` segments and paths that normalize to nothing are
 * rejected.
 */
pub fn to_project_relative(path: &str) -> Option<String> {
    if path.starts_with(['/', '\\']) {
        return None;
    }
    let canonical = to_canonical(path);
    let escapes = canonical
        .split('/')
        .any(|segment| segment == ".." || segment.contains(':'));
    if canonical.is_empty() || escapes {
        return None;
    }
    Some(canonical)
}

/// Paths reported by `git` are already slash-separated, but quoting or a Windows
/// checkout can still leak backslashes in.
pub fn from_vcs_path(path: &str) -> String {
    to_canonical(path)
}

/// Git accepts forward slashes on every platform.
pub fn to_vcs_path(path: &str) -> String {
    to_canonical(path)
}

/*
 * Converts an absolute path found on disk into the canonical relative form.
 * Returns `None` when `full_path` is not under `root`, or contains components
 * that cannot be expressed relative to it. The root itself maps to "".
 */
pub fn relative_canonical(root: &Path, full_path: &Path) -> Option<String> {
    let relative = full_path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

/// Resolves a canonical relative path against the project root using host separators.
pub fn to_native(root: &Path, canonical: &str) -> PathBuf {
    let mut native = root.to_path_buf();
    for segment in canonical.split('/').filter(|s| !s.is_empty()) {
        native.push(segment);
    }
    native
}

pub fn path_depth(canonical: &str) -> usize {
    canonical.split('/').filter(|s| !s.is_empty()).count()
}

/*
 * Checks whether a canonical path lies inside (or is) the canonical directory `dir`.
 * An empty `dir` stands for the whole project.
 */
pub fn is_within(canonical: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    canonical == dir
        || canonical
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Lower-cased extension of the last path segment, without the dot.
pub fn extension_of(canonical: &str) -> Option<String> {
    let file_name = canonical.rsplit('/').next()?;
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
