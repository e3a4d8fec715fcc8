/*
 * Defines the data structures shuttled from batch translation workers to whoever drives
 * the batch: the per-path result, the final report and the progress events. They are
 * serializable so the request handler can forward them to the client unchanged.
 */
use crate::core::models::ContentHash;
use serde::Serialize;
use std::collections::BTreeMap;

pub const CANCELLED_REASON: &str = "cancelled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutcome {
    pub path: String,
    pub last_hash: ContentHash,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum TranslationResult {
    Success(TranslationOutcome),
    Failure { reason: String },
}

impl TranslationResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        TranslationResult::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TranslationResult::Success(_))
    }
}

/// Exactly one entry per requested path.
pub type BatchTranslationReport = BTreeMap<String, TranslationResult>;

/*
 * Emitted once per finished path. `completed` counts finished paths across all workers at
 * the time of the event, so consumers can show coarse progress without tracking order.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationProgress {
    pub path: String,
    pub result: TranslationResult,
    pub completed: usize,
    pub total: usize,
}
