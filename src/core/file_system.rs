use super::ignore_rules::RuleSet;
use super::path_utils;
use super::project::{WHOLE_PROJECT_SENTINELS, is_internal_config_path};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/*
 * This module provides the directory scanner: a recursive walk over a set of configured
 * root directories that yields the flat list of candidate translation files. It defines
 * the trait `FileSystemScannerOperations` so the reconciler can be tested with a fake,
 * and the concrete implementation `CoreFileSystemScanner`.
 *
 * Scanning never fails as a whole. Unreadable directories are logged and skipped, and
 * missing roots contribute nothing.
 */

pub trait FileSystemScannerOperations: Send + Sync {
    /*
     * Returns canonical paths (relative to `project_root`) of every non-ignored file
     * below the given roots whose extension is in `extensions`. No ordering guarantee.
     */
    fn scan(
        &self,
        project_root: &Path,
        root_dirs: &[String],
        extensions: &[String],
        rules: Arc<RuleSet>,
    ) -> Vec<String>;
}

pub struct CoreFileSystemScanner {}

impl CoreFileSystemScanner {
    pub fn new() -> Self {
        CoreFileSystemScanner {}
    }
}

impl Default for CoreFileSystemScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemScannerOperations for CoreFileSystemScanner {
    fn scan(
        &self,
        project_root: &Path,
        root_dirs: &[String],
        extensions: &[String],
        rules: Arc<RuleSet>,
    ) -> Vec<String> {
        let extensions = normalize_extensions(extensions);
        let mut seen: HashSet<String> = HashSet::new();
        let mut found = Vec::new();

        for root_dir in scan_roots(root_dirs) {
            let start = path_utils::to_native(project_root, &root_dir);
            if !start.is_dir() {
                log::debug!("FileSystemScanner: Root {start:?} does not exist, skipping.");
                continue;
            }
            log::debug!("FileSystemScanner: Scanning {start:?}.");

            let filter_root = project_root.to_path_buf();
            let filter_rules = Arc::clone(&rules);
            let walker = WalkBuilder::new(&start)
                .standard_filters(false) // Ignore rules come from RuleSet only.
                .follow_links(false)
                .filter_entry(move |entry| {
                    let Some(relative) = path_utils::relative_canonical(&filter_root, entry.path())
                    else {
                        return false;
                    };
                    if relative.is_empty() {
                        return true;
                    }
                    let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                    !is_internal_config_path(&relative) && !filter_rules.is_ignored(&relative, is_dir)
                })
                .build();

            for entry_result in walker {
                let entry = match entry_result {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("FileSystemScanner: Skipping unreadable entry: {e}");
                        continue;
                    }
                };
                if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                    continue;
                }
                let Some(relative) = path_utils::relative_canonical(project_root, entry.path())
                else {
                    continue;
                };
                if !has_accepted_extension(&relative, &extensions) {
                    continue;
                }
                if seen.insert(relative.clone()) {
                    found.push(relative);
                }
            }
        }

        log::debug!(
            "FileSystemScanner: Scan complete. Found {} candidate files under {:?}.",
            found.len(),
            project_root
        );
        found
    }
}

/*
 * Empty root list, or the single sentinel, means the project root (canonical "").
 * Other entries are canonicalized; duplicates are harmless since results are deduplicated.
 */
fn scan_roots(root_dirs: &[String]) -> Vec<String> {
    match root_dirs {
        [] => vec![String::new()],
        [single] if WHOLE_PROJECT_SENTINELS.contains(&single.trim()) => vec![String::new()],
        dirs => dirs.iter().map(|dir| path_utils::to_canonical(dir)).collect(),
    }
}

fn normalize_extensions(extensions: &[String]) -> HashSet<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn has_accepted_extension(relative: &str, extensions: &HashSet<String>) -> bool {
    path_utils::extension_of(relative).is_some_and(|ext| extensions.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ignore_rules::IGNORE_FILE_NAME;
    use std::fs::{self, File};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str) -> PathBuf {
        let path = path_utils::to_native(root, relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        File::create(&path).unwrap();
        path
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn scan_sorted(root: &Path, dirs: &[&str], extensions: &[&str]) -> Vec<String> {
        let rules = Arc::new(RuleSet::load(root));
        let mut result =
            CoreFileSystemScanner::new().scan(root, &strings(dirs), &strings(extensions), rules);
        result.sort();
        result
    }

    #[test]
    fn test_scan_filters_by_extension_case_insensitively() {
        // Arrange
        let dir = tempdir().unwrap();
        touch(dir.path(), "docs/intro.md");
        touch(dir.path(), "docs/Guide.MD");
        touch(dir.path(), "docs/image.png");
        touch(dir.path(), "notebooks/demo.ipynb");

        // Act
        let result = scan_sorted(dir.path(), &[], &["md", ".ipynb"]);

        // Assert
        assert_eq!(
            result,
            vec!["docs/Guide.MD", "docs/intro.md", "notebooks/demo.ipynb"]
        );
    }

    #[test]
    fn test_scan_honors_roots_and_sentinels() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "docs/a.md");
        touch(dir.path(), "blog/b.md");
        touch(dir.path(), "top.md");

        assert_eq!(scan_sorted(dir.path(), &["docs"], &["md"]), vec!["docs/a.md"]);
        assert_eq!(scan_sorted(dir.path(), &["."], &["md"]).len(), 3);
        assert_eq!(scan_sorted(dir.path(), &["/"], &["md"]).len(), 3);
        assert!(scan_sorted(dir.path(), &["missing"], &["md"]).is_empty());
        assert_eq!(
            scan_sorted(dir.path(), &["docs", "docs/"], &["md"]),
            vec!["docs/a.md"],
            "overlapping roots must not produce duplicates"
        );
    }

    #[test]
    fn test_scan_prunes_ignored_and_internal_directories() {
        // Arrange
        let dir = tempdir().unwrap();
        touch(dir.path(), "docs/a.md");
        touch(dir.path(), "node_modules/pkg/readme.md");
        touch(dir.path(), "drafts/wip.md");
        touch(dir.path(), ".transync/status/notes.md");
        fs::write(dir.path().join(IGNORE_FILE_NAME), "drafts/\n").unwrap();

        // Act
        let result = scan_sorted(dir.path(), &[], &["md"]);

        // Assert
        assert_eq!(result, vec!["docs/a.md"]);
    }

    #[test]
    fn test_scan_uses_defaults_without_ignore_file() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "docs/a.md");
        touch(dir.path(), "build/generated.md");
        touch(dir.path(), "dist/bundle.md");

        assert_eq!(scan_sorted(dir.path(), &[], &["md"]), vec!["docs/a.md"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped_and_siblings_scanned() {
        use std::os::unix::fs::PermissionsExt;

        // Arrange
        let dir = tempdir().unwrap();
        touch(dir.path(), "docs/a.md");
        touch(dir.path(), "locked/secret.md");
        touch(dir.path(), "zeta/z.md");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits are not enforced (running as root).
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        // Act
        let result = scan_sorted(dir.path(), &[], &["md"]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Assert
        assert_eq!(result, vec!["docs/a.md", "zeta/z.md"]);
    }

    #[test]
    fn test_empty_extension_set_matches_nothing() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "docs/a.md");
        assert!(scan_sorted(dir.path(), &[], &[]).is_empty());
    }
}
