/*
 * Hard failures surfaced by engine operations (translate-and-record and the git workflow).
 * Degradable conditions never reach this type; they are logged and defaulted where they
 * occur.
 */
use crate::core::status_cache::StatusCacheError;
use crate::core::translator::TranslateError;
use crate::core::vcs::VcsError;
use std::io;

#[derive(Debug)]
pub enum EngineError {
    Vcs(VcsError),
    Translate(TranslateError),
    Io(io::Error),
    Cache(StatusCacheError),
    UpstreamContentMissing { path: String, reference: String },
    UpstreamHashMissing { path: String, reference: String },
    NotUtf8 { path: String },
    EmptyCommitMessage,
    NothingStaged,
    BranchNotFound(String),
    UnknownProject(String),
    InvalidPath(String),
}

impl From<VcsError> for EngineError {
    fn from(err: VcsError) -> Self {
        EngineError::Vcs(err)
    }
}

impl From<TranslateError> for EngineError {
    fn from(err: TranslateError) -> Self {
        EngineError::Translate(err)
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Io(err)
    }
}

impl From<StatusCacheError> for EngineError {
    fn from(err: StatusCacheError) -> Self {
        EngineError::Cache(err)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Vcs(e) => write!(f, "{e}"),
            EngineError::Translate(e) => write!(f, "{e}"),
            EngineError::Io(e) => write!(f, "I/O error: {e}"),
            EngineError::Cache(e) => write!(f, "{e}"),
            EngineError::UpstreamContentMissing { path, reference } => {
                write!(f, "'{path}' has no content at '{reference}'")
            }
            EngineError::UpstreamHashMissing { path, reference } => {
                write!(f, "Could not determine the upstream hash of '{path}' at '{reference}'")
            }
            EngineError::NotUtf8 { path } => write!(f, "'{path}' is not valid UTF-8 text"),
            EngineError::EmptyCommitMessage => write!(f, "Commit message must not be empty"),
            EngineError::NothingStaged => write!(f, "Nothing is staged for commit"),
            EngineError::BranchNotFound(branch) => write!(f, "Branch '{branch}' does not exist"),
            EngineError::UnknownProject(name) => write!(f, "Unknown project '{name}'"),
            EngineError::InvalidPath(path) => {
                write!(f, "'{path}' is not a path inside the project")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Vcs(e) => Some(e),
            EngineError::Translate(e) => Some(e),
            EngineError::Io(e) => Some(e),
            EngineError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
