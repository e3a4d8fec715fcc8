/*
 * Core value types shared by the reconciliation engine: the three-valued translation
 * status, the opaque upstream content hash, the persisted status-cache entry and the
 * per-path status returned to callers.
 */
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    Translated,
    Outdated,
    Untranslated,
}

impl TranslationStatus {
    /// Only translated and outdated statuses are ever written to the status cache.
    pub fn is_recorded(self) -> bool {
        !matches!(self, TranslationStatus::Untranslated)
    }
}

/*
 * Opaque content identity of a file at an upstream ref, as reported by the VCS.
 * Only equality is meaningful.
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hash: impl Into<String>) -> Self {
        ContentHash(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCacheEntry {
    pub status: TranslationStatus,
    pub last_hash: ContentHash,
}

impl StatusCacheEntry {
    pub fn translated(hash: ContentHash) -> Self {
        StatusCacheEntry {
            status: TranslationStatus::Translated,
            last_hash: hash,
        }
    }
}

/*
 * The three-way rule used by both single-path and batch reconciliation.
 *
 * `upstream` is the current upstream hash (None when upstream lacks the path) and
 * `recorded` the hash the path was last translated against. Returns the entry to record,
 * or None when the path is untranslated. An outdated entry keeps the recorded hash.
 */
pub fn classify(
    upstream: Option<&ContentHash>,
    recorded: Option<&ContentHash>,
) -> Option<StatusCacheEntry> {
    let (current, recorded) = (upstream?, recorded?);
    let status = if current == recorded {
        TranslationStatus::Translated
    } else {
        TranslationStatus::Outdated
    };
    Some(StatusCacheEntry {
        status,
        last_hash: recorded.clone(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    pub path: String,
    pub status: TranslationStatus,
    pub modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<ContentHash>,
}

impl FileStatus {
    pub fn untranslated(path: impl Into<String>, modified: bool) -> Self {
        FileStatus {
            path: path.into(),
            status: TranslationStatus::Untranslated,
            modified,
            last_hash: None,
        }
    }

    pub fn from_entry(path: impl Into<String>, entry: &StatusCacheEntry, modified: bool) -> Self {
        FileStatus {
            path: path.into(),
            status: entry.status,
            modified,
            last_hash: Some(entry.last_hash.clone()),
        }
    }
}
