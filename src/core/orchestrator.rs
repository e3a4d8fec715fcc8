/*
 * Translation Orchestrator: translate-and-record for one file, and batch translation with
 * N pull-workers. Workers claim the next path through a shared atomic index, so there is
 * no up-front partitioning and a slow file never blocks the rest of the queue.
 */
use crate::core::engine_error::{EngineError, Result};
use crate::core::notebook;
use crate::core::path_utils;
use crate::core::project::Project;
use crate::core::reconciler::StatusReconciler;
use crate::core::translation_progress::{
    BatchTranslationReport, CANCELLED_REASON, TranslationOutcome, TranslationProgress,
    TranslationResult,
};
use crate::core::translator::{self, FallbackTranslator, TranslatorOperations};
use crate::core::vcs::VcsError;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub type ProgressSender = UnboundedSender<TranslationProgress>;

pub struct TranslationOrchestrator {
    reconciler: Arc<StatusReconciler>,
    translator: Arc<dyn TranslatorOperations>,
    fallback: Option<FallbackTranslator>,
    global_prompt: Option<String>,
}

impl TranslationOrchestrator {
    pub fn new(reconciler: Arc<StatusReconciler>, translator: Arc<dyn TranslatorOperations>) -> Self {
        TranslationOrchestrator {
            reconciler,
            translator,
            fallback: None,
            global_prompt: None,
        }
    }

    pub fn with_global_prompt(mut self, prompt: Option<String>) -> Self {
        self.global_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_fallback(mut self, fallback: Option<FallbackTranslator>) -> Self {
        self.fallback = fallback;
        self
    }

    /*
     * Reads the upstream content, translates it, writes the local file, then records
     * `{translated, upstream hash}` and persists it at once. Every step failure is a hard
     * error for this path.
     */
    pub async fn translate_file(
        &self,
        project: &Project,
        path: &str,
        upstream_branch: &str,
        working_branch: &str,
    ) -> Result<TranslationOutcome> {
        let path = project_path(path)?;
        let reference = project.upstream_ref(upstream_branch);
        let upstream = self.reconciler.upstream();

        let source_bytes = upstream
            .read_at(project, &reference, &path)
            .await
            .map_err(|e| match e {
                VcsError::NotFound { .. } => EngineError::UpstreamContentMissing {
                    path: path.clone(),
                    reference: reference.clone(),
                },
                other => EngineError::Vcs(other),
            })?;
        let source = String::from_utf8(source_bytes)
            .map_err(|_| EngineError::NotUtf8 { path: path.clone() })?;

        let prompt = project
            .custom_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(self.global_prompt.as_deref());

        let (translated, used_fallback) =
            match translate_content(self.translator.as_ref(), &path, &source, prompt).await {
                Ok(text) => (text, false),
                Err(e) => match &self.fallback {
                    Some(fallback) => {
                        log::warn!(
                            "TranslationOrchestrator: Backend failed for '{path}' ({e}). Using fallback translation."
                        );
                        (translate_content(fallback, &path, &source, prompt).await?, true)
                    }
                    None => return Err(e.into()),
                },
            };

        self.reconciler
            .probe()
            .write_local(project, &path, translated.as_bytes())
            .await?;

        let hash = upstream
            .file_hash(project, &path, &reference)
            .await
            .ok_or_else(|| EngineError::UpstreamHashMissing {
                path: path.clone(),
                reference: reference.clone(),
            })?;

        self.reconciler
            .record_translation(project, working_branch, &path, hash.clone())?;
        log::info!("TranslationOrchestrator: Translated '{path}' against {hash}.");

        Ok(TranslationOutcome {
            path,
            last_hash: hash,
            used_fallback,
        })
    }

    /*
     * Translates `paths` with `concurrency` workers. Duplicates collapse into one entry and
     * the report holds exactly one result per unique path. Paths outside the project are
     * kept as given and fail individually. Once `cancel` fires, workers
     * stop claiming; in-flight files finish and unclaimed ones are reported as cancelled.
     */
    #[allow(clippy::too_many_arguments)]
    pub async fn translate_batch(
        self: &Arc<Self>,
        project: &Project,
        paths: &[String],
        upstream_branch: &str,
        working_branch: &str,
        concurrency: usize,
        progress: Option<ProgressSender>,
        cancel: CancellationToken,
    ) -> BatchTranslationReport {
        let mut seen = HashSet::new();
        let queue: Arc<Vec<String>> = Arc::new(
            paths
                .iter()
                .map(|path| path_utils::to_project_relative(path).unwrap_or_else(|| path.clone()))
                .filter(|path| seen.insert(path.clone()))
                .collect(),
        );
        let total = queue.len();
        if total == 0 {
            return BatchTranslationReport::new();
        }
        let workers = concurrency.clamp(1, total);
        log::info!("TranslationOrchestrator: Translating {total} file(s) with {workers} worker(s).");

        let next_index = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut join_set = JoinSet::new();

        for worker_id in 0..workers {
            let orchestrator = Arc::clone(self);
            let project = project.clone();
            let upstream_branch = upstream_branch.to_string();
            let working_branch = working_branch.to_string();
            let queue = Arc::clone(&queue);
            let next_index = Arc::clone(&next_index);
            let completed = Arc::clone(&completed);
            let progress = progress.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let mut results = Vec::new();
                while !cancel.is_cancelled() {
                    let index = next_index.fetch_add(1, Ordering::SeqCst);
                    let Some(path) = queue.get(index) else {
                        break;
                    };
                    let result = match orchestrator
                        .translate_file(&project, path, &upstream_branch, &working_branch)
                        .await
                    {
                        Ok(outcome) => TranslationResult::Success(outcome),
                        Err(e) => {
                            log::warn!("TranslationOrchestrator: Worker {worker_id} failed on '{path}': {e}");
                            TranslationResult::failure(e.to_string())
                        }
                    };
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(sender) = &progress {
                        // A dropped receiver only means nobody is watching.
                        let _ = sender.send(TranslationProgress {
                            path: path.clone(),
                            result: result.clone(),
                            completed: done,
                            total,
                        });
                    }
                    results.push((path.clone(), result));
                }
                results
            });
        }

        let mut report = BatchTranslationReport::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(results) => report.extend(results),
                Err(e) => log::error!("TranslationOrchestrator: Worker task failed: {e}"),
            }
        }

        for path in queue.iter() {
            report.entry(path.clone()).or_insert_with(|| {
                if cancel.is_cancelled() {
                    TranslationResult::failure(CANCELLED_REASON)
                } else {
                    TranslationResult::failure("worker terminated before finishing")
                }
            });
        }
        let succeeded = report.values().filter(|r| r.is_success()).count();
        log::info!("TranslationOrchestrator: Batch done, {succeeded}/{total} succeeded.");
        report
    }
}

fn project_path(path: &str) -> Result<String> {
    path_utils::to_project_relative(path).ok_or_else(|| EngineError::InvalidPath(path.to_string()))
}

async fn translate_content(
    translator: &dyn TranslatorOperations,
    path: &str,
    source: &str,
    prompt: Option<&str>,
) -> translator::Result<String> {
    if notebook::is_notebook(path) {
        notebook::translate_notebook(translator, source, prompt).await
    } else {
        translator.translate(source, prompt).await
    }
}
