/*
 * This module consolidates the platform-agnostic engine: project and settings models, the
 * version-control oracle, upstream snapshots, the working-tree probe, the persistent status
 * cache, the reconciler that classifies every file, and the translation orchestrator with
 * its git publishing workflow. Key abstractions (`VersionControlOperations`,
 * `FileSystemScannerOperations`, `TranslatorOperations`, `ConfigManagerOperations`) are
 * re-exported so the request handler can depend on them without reaching into submodules.
 */
pub mod config;
pub mod engine_error;
pub mod file_node;
pub mod file_system;
pub mod git_workflow;
pub mod ignore_rules;
pub mod models;
pub mod notebook;
pub mod orchestrator;
pub mod path_utils;
pub mod project;
pub mod reconciler;
pub mod status_cache;
pub mod translation_progress;
pub mod translator;
pub mod upstream;
pub mod vcs;
pub mod working_tree;

#[cfg(test)]
pub mod test_support;

// Re-export key structures and enums
pub use file_node::{FileTree, FileTreeNode, StatusSummary};
pub use models::{ContentHash, FileStatus, StatusCacheEntry, TranslationStatus};
pub use project::Project;

// Re-export config related items
pub use config::{
    AppSettings, ConfigError, ConfigManagerOperations, CoreConfigManager, LlmSettings,
};

// Re-export file system and version control items
pub use file_system::{CoreFileSystemScanner, FileSystemScannerOperations};
pub use vcs::{CoreGitCli, VcsError, VersionControlOperations};

// Re-export engine items
pub use engine_error::EngineError;
pub use git_workflow::GitWorkflow;
pub use orchestrator::{ProgressSender, TranslationOrchestrator};
pub use reconciler::StatusReconciler;
pub use translation_progress::{BatchTranslationReport, TranslationProgress, TranslationResult};

// Re-export translator items
pub use translator::{FallbackTranslator, LlmTranslator, TranslateError, TranslatorOperations};
