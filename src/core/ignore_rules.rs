/*
 * Resolves path-exclusion rules for a project. Rules come from the project's root
 * `.gitignore` (plus a short always-ignored list) or, when that file is missing or
 * unreadable, from a built-in default set. Matching follows gitignore semantics through
 * the `ignore` crate: a path is excluded when it or any parent directory matches, and
 * negations are honored.
 *
 * Rule sets are cached per project root and only invalidated explicitly.
 */
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const IGNORE_FILE_NAME: &str = ".gitignore";

const DEFAULT_PATTERNS: &[&str] = &[
    ".git/",
    "node_modules/",
    "bower_components/",
    ".DS_Store",
    "Thumbs.db",
    ".vscode/",
    ".idea/",
    "dist/",
    "build/",
    "out/",
    ".env",
    ".env.*",
    "__pycache__/",
    "*.swp",
    ".cache/",
];

const ALWAYS_IGNORED_PATTERNS: &[&str] = &[
    ".git/",
    "node_modules/",
    ".DS_Store",
    "Thumbs.db",
    ".vscode/",
    ".idea/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Defaults,
    IgnoreFile,
}

#[derive(Debug)]
pub struct RuleSet {
    matcher: Gitignore,
    source: RuleSource,
}

impl RuleSet {
    /*
     * Loads the rules for `project_root`. Never fails: an unreadable ignore file falls
     * back to the defaults and is logged.
     */
    pub fn load(project_root: &Path) -> RuleSet {
        let ignore_file = project_root.join(IGNORE_FILE_NAME);
        match fs::read_to_string(&ignore_file) {
            Ok(content) => {
                log::debug!("IgnoreRules: Using {ignore_file:?} plus always-ignored patterns.");
                let lines = content
                    .lines()
                    .chain(ALWAYS_IGNORED_PATTERNS.iter().copied());
                Self::from_lines(project_root, lines, RuleSource::IgnoreFile)
            }
            Err(e) => {
                log::debug!(
                    "IgnoreRules: No readable {ignore_file:?} ({e}). Using built-in defaults."
                );
                Self::from_lines(
                    project_root,
                    DEFAULT_PATTERNS.iter().copied(),
                    RuleSource::Defaults,
                )
            }
        }
    }

    fn from_lines<'a>(
        project_root: &Path,
        lines: impl Iterator<Item = &'a str>,
        source: RuleSource,
    ) -> RuleSet {
        let mut builder = GitignoreBuilder::new(project_root);
        for line in lines {
            if let Err(e) = builder.add_line(None, line) {
                log::warn!("IgnoreRules: Skipping invalid pattern '{line}': {e}");
            }
        }
        let matcher = builder.build().unwrap_or_else(|e| {
            log::error!("IgnoreRules: Failed to build matcher for {project_root:?}: {e}");
            Gitignore::empty()
        });
        RuleSet { matcher, source }
    }

    /// `relative_path` is canonical (relative to the project root).
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        if relative_path.is_empty() {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(Path::new(relative_path), is_dir)
            .is_ignore()
    }

    pub fn source(&self) -> RuleSource {
        self.source
    }
}

#[derive(Default)]
pub struct IgnoreRuleCache {
    rules: Mutex<HashMap<PathBuf, Arc<RuleSet>>>,
}

impl IgnoreRuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules_for(&self, project_root: &Path) -> Arc<RuleSet> {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            rules
                .entry(project_root.to_path_buf())
                .or_insert_with(|| {
                    let loaded = RuleSet::load(project_root);
                    log::debug!(
                        "IgnoreRules: Cached {:?} rules for {project_root:?}.",
                        loaded.source()
                    );
                    Arc::new(loaded)
                }),
        )
    }

    pub fn invalidate(&self, project_root: &Path) {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        if rules.remove(project_root).is_some() {
            log::debug!("IgnoreRules: Invalidated cached rules for {project_root:?}.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_apply_without_ignore_file() {
        // Arrange
        let dir = tempdir().unwrap();

        // Act
        let rules = RuleSet::load(dir.path());

        // Assert
        assert_eq!(rules.source(), RuleSource::Defaults);
        assert!(rules.is_ignored("node_modules/pkg/readme.md", false));
        assert!(rules.is_ignored("build", true));
        assert!(rules.is_ignored("docs/.env.local", false));
        assert!(rules.is_ignored("notes/draft.md.swp", false));
        assert!(!rules.is_ignored("docs/intro.md", false));
    }

    #[test]
    fn test_ignore_file_replaces_defaults_but_keeps_always_ignored() {
        // Arrange
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(IGNORE_FILE_NAME), "drafts/\n*.tmp.md\n").unwrap();

        // Act
        let rules = RuleSet::load(dir.path());

        // Assert
        assert_eq!(rules.source(), RuleSource::IgnoreFile);
        assert!(rules.is_ignored("drafts/a.md", false));
        assert!(rules.is_ignored("docs/x.tmp.md", false));
        assert!(rules.is_ignored(".git/config", false), "always-ignored still applies");
        assert!(rules.is_ignored("node_modules/a.md", false));
        assert!(
            !rules.is_ignored("build/a.md", false),
            "defaults-only pattern must not apply when an ignore file exists"
        );
    }

    #[test]
    fn test_negation_is_honored() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(IGNORE_FILE_NAME), "*.md\n!keep.md\n").unwrap();

        let rules = RuleSet::load(dir.path());

        assert!(rules.is_ignored("docs/a.md", false));
        assert!(!rules.is_ignored("docs/keep.md", false));
    }

    #[test]
    fn test_cache_returns_same_rules_until_invalidated() {
        let dir = tempdir().unwrap();
        let cache = IgnoreRuleCache::new();

        let first = cache.rules_for(dir.path());
        assert_eq!(first.source(), RuleSource::Defaults);

        fs::write(dir.path().join(IGNORE_FILE_NAME), "drafts/\n").unwrap();
        let second = cache.rules_for(dir.path());
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate(dir.path());
        let third = cache.rules_for(dir.path());
        assert_eq!(third.source(), RuleSource::IgnoreFile);
    }
}
