use crate::core::{
    AppSettings, ConfigError, ConfigManagerOperations, EngineError, FallbackTranslator,
    GitWorkflow, LlmSettings, LlmTranslator, Project, ProgressSender, StatusReconciler,
    TranslateError, TranslationOrchestrator, TranslationProgress, TranslatorOperations,
    path_utils,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

pub(crate) const APP_NAME: &str = "Transync";
pub(crate) const MASKED_API_KEY: &str = "********";
const DEFAULT_HISTORY_LIMIT: usize = 20;
const PROGRESS_EVENT_NAME: &str = "translationProgress";

/*
 * One request line from the client. `id` is echoed back unchanged so the client can match
 * responses, which may arrive out of order because requests run concurrently.
 */
#[derive(Debug, Clone, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub id: Value,
    #[serde(flatten)]
    pub request: AppRequest,
}

/// Every command names its project optionally; None selects the active project.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum AppRequest {
    GetFileTree {
        project: Option<String>,
    },
    GetFileStatus {
        project: Option<String>,
        path: String,
    },
    SyncFileStatuses {
        project: Option<String>,
    },
    LastUpstreamCommit {
        project: Option<String>,
        path: String,
    },
    TranslateFile {
        project: Option<String>,
        path: String,
    },
    TranslateFiles {
        project: Option<String>,
        paths: Vec<String>,
        concurrency: Option<usize>,
    },
    CancelTranslation,
    ListBranches {
        project: Option<String>,
    },
    FetchUpstream {
        project: Option<String>,
    },
    CheckoutBranch {
        project: Option<String>,
        branch: String,
    },
    StageFile {
        project: Option<String>,
        path: String,
    },
    StageAll {
        project: Option<String>,
    },
    UnstageFile {
        project: Option<String>,
        path: String,
    },
    Commit {
        project: Option<String>,
        message: String,
    },
    Push {
        project: Option<String>,
    },
    History {
        project: Option<String>,
        limit: Option<usize>,
        path: Option<String>,
    },
    RemoteUrl {
        project: Option<String>,
        remote: Option<String>,
    },
    ClearCache {
        project: Option<String>,
        #[serde(default, rename = "allBranches")]
        all_branches: bool,
    },
    GetSettings,
    SaveSettings {
        settings: AppSettings,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    fn success(id: Value, data: Value) -> Self {
        ResponseEnvelope {
            id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(id: Value, error: impl ToString) -> Self {
        ResponseEnvelope {
            id,
            ok: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Unsolicited line written while a batch runs.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub event: &'static str,
    #[serde(flatten)]
    pub progress: TranslationProgress,
}

impl From<TranslationProgress> for ProgressEvent {
    fn from(progress: TranslationProgress) -> Self {
        ProgressEvent {
            event: PROGRESS_EVENT_NAME,
            progress,
        }
    }
}

#[derive(Debug)]
pub enum HandlerError {
    InvalidRequest(serde_json::Error),
    NoActiveProject,
    BatchInProgress,
    Engine(EngineError),
    Config(ConfigError),
    Translate(TranslateError),
    Serialize(serde_json::Error),
}

impl From<EngineError> for HandlerError {
    fn from(err: EngineError) -> Self {
        HandlerError::Engine(err)
    }
}

impl From<ConfigError> for HandlerError {
    fn from(err: ConfigError) -> Self {
        HandlerError::Config(err)
    }
}

impl From<TranslateError> for HandlerError {
    fn from(err: TranslateError) -> Self {
        HandlerError::Translate(err)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::InvalidRequest(e) => write!(f, "Invalid request: {e}"),
            HandlerError::NoActiveProject => write!(f, "No project selected and no active project"),
            HandlerError::BatchInProgress => write!(f, "A batch translation is already running"),
            HandlerError::Engine(e) => write!(f, "{e}"),
            HandlerError::Config(e) => write!(f, "{e}"),
            HandlerError::Translate(e) => write!(f, "{e}"),
            HandlerError::Serialize(e) => write!(f, "Could not encode response: {e}"),
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HandlerError::InvalidRequest(e) | HandlerError::Serialize(e) => Some(e),
            HandlerError::Engine(e) => Some(e),
            HandlerError::Config(e) => Some(e),
            HandlerError::Translate(e) => Some(e),
            HandlerError::NoActiveProject | HandlerError::BatchInProgress => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;

/// Builds the primary translator from the LLM section of the settings.
pub type TranslatorFactory = Box<
    dyn Fn(&LlmSettings) -> std::result::Result<Arc<dyn TranslatorOperations>, TranslateError>
        + Send
        + Sync,
>;

pub fn llm_translator_factory() -> TranslatorFactory {
    Box::new(|llm: &LlmSettings| {
        let translator: Arc<dyn TranslatorOperations> =
            Arc::new(LlmTranslator::from_settings(llm)?);
        Ok(translator)
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(HandlerError::Serialize)
}

/*
 * Dispatches client requests to the engine. It owns the current settings, the reconciler
 * shared by every component, the git workflow and a translation orchestrator that is
 * rebuilt whenever the settings are saved. Settings and the orchestrator sit behind std
 * mutexes whose guards are only held long enough to clone out a snapshot, never across an
 * await point.
 */
pub struct AppHandler {
    app_name: String,
    reconciler: Arc<StatusReconciler>,
    workflow: GitWorkflow,
    config_manager: Arc<dyn ConfigManagerOperations>,
    translator_factory: TranslatorFactory,
    settings: Mutex<AppSettings>,
    orchestrator: Mutex<Arc<TranslationOrchestrator>>,
    active_batch: Mutex<Option<CancellationToken>>,
    progress: Option<ProgressSender>,
}

impl AppHandler {
    pub fn new(
        app_name: &str,
        settings: AppSettings,
        reconciler: Arc<StatusReconciler>,
        workflow: GitWorkflow,
        config_manager: Arc<dyn ConfigManagerOperations>,
        translator_factory: TranslatorFactory,
        progress: Option<ProgressSender>,
    ) -> Result<Self> {
        let orchestrator =
            Self::build_orchestrator(&reconciler, &translator_factory, &settings)?;
        log::debug!(
            "AppHandler: Created with {} project(s), active {:?}.",
            settings.projects.len(),
            settings.active_project
        );
        Ok(AppHandler {
            app_name: app_name.to_string(),
            reconciler,
            workflow,
            config_manager,
            translator_factory,
            settings: Mutex::new(settings),
            orchestrator: Mutex::new(Arc::new(orchestrator)),
            active_batch: Mutex::new(None),
            progress,
        })
    }

    fn build_orchestrator(
        reconciler: &Arc<StatusReconciler>,
        factory: &TranslatorFactory,
        settings: &AppSettings,
    ) -> std::result::Result<TranslationOrchestrator, TranslateError> {
        let translator = factory(&settings.llm)?;
        let fallback = settings
            .llm
            .fallback_on_error
            .then(|| FallbackTranslator::with_glossary(settings.llm.fallback_glossary.clone()));
        Ok(TranslationOrchestrator::new(Arc::clone(reconciler), translator)
            .with_global_prompt(settings.global_prompt.clone())
            .with_fallback(fallback))
    }

    fn settings_snapshot(&self) -> AppSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_orchestrator(&self) -> Arc<TranslationOrchestrator> {
        self.orchestrator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn resolve_project(&self, name: Option<&str>) -> Result<Project> {
        let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        match settings.project(name) {
            Some(project) => Ok(project.clone()),
            None => match name.or(settings.active_project.as_deref()) {
                Some(wanted) => Err(EngineError::UnknownProject(wanted.to_string()).into()),
                None => Err(HandlerError::NoActiveProject),
            },
        }
    }

    /// Parses one request line and always produces a response, even for malformed input.
    pub async fn handle_line(&self, line: &str) -> ResponseEnvelope {
        let envelope: RequestEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                let id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|raw| raw.get("id").cloned())
                    .unwrap_or(Value::Null);
                log::warn!("AppHandler: Rejected request line: {e}");
                return ResponseEnvelope::failure(id, HandlerError::InvalidRequest(e));
            }
        };
        match self.handle(envelope.request).await {
            Ok(data) => ResponseEnvelope::success(envelope.id, data),
            Err(e) => {
                log::warn!("AppHandler: Request {} failed: {e}", envelope.id);
                ResponseEnvelope::failure(envelope.id, e)
            }
        }
    }

    pub async fn handle(&self, request: AppRequest) -> Result<Value> {
        match request {
            AppRequest::GetFileTree { project } => {
                let project = self.resolve_project(project.as_deref())?;
                let tree = self
                    .reconciler
                    .get_file_tree(&project, &project.upstream_branch, &project.working_branch)
                    .await;
                to_json(&tree)
            }
            AppRequest::GetFileStatus { project, path } => {
                let project = self.resolve_project(project.as_deref())?;
                let path = project_path(&path)?;
                let status = self
                    .reconciler
                    .get_status(
                        &project,
                        &path,
                        &project.upstream_branch,
                        &project.working_branch,
                    )
                    .await;
                to_json(&status)
            }
            AppRequest::SyncFileStatuses { project } => {
                let project = self.resolve_project(project.as_deref())?;
                let tree = self
                    .reconciler
                    .sync_file_statuses(&project, &project.upstream_branch, &project.working_branch)
                    .await;
                to_json(&tree)
            }
            AppRequest::LastUpstreamCommit { project, path } => {
                let project = self.resolve_project(project.as_deref())?;
                let path = project_path(&path)?;
                let reference = project.upstream_ref(&project.upstream_branch);
                let commit = self
                    .reconciler
                    .upstream()
                    .last_commit(&project, &path, &reference)
                    .await;
                to_json(&commit)
            }
            AppRequest::TranslateFile { project, path } => {
                let project = self.resolve_project(project.as_deref())?;
                let outcome = self
                    .current_orchestrator()
                    .translate_file(
                        &project,
                        &path,
                        &project.upstream_branch,
                        &project.working_branch,
                    )
                    .await?;
                to_json(&outcome)
            }
            AppRequest::TranslateFiles {
                project,
                paths,
                concurrency,
            } => {
                let project = self.resolve_project(project.as_deref())?;
                self.translate_files(&project, &paths, concurrency).await
            }
            AppRequest::CancelTranslation => {
                let token = self
                    .active_batch
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let cancelled = match token {
                    Some(token) => {
                        log::info!("AppHandler: Cancelling the running batch.");
                        token.cancel();
                        true
                    }
                    None => false,
                };
                Ok(serde_json::json!({ "cancelled": cancelled }))
            }
            AppRequest::ListBranches { project } => {
                let project = self.resolve_project(project.as_deref())?;
                to_json(&self.workflow.list_branches(&project).await?)
            }
            AppRequest::FetchUpstream { project } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.fetch_upstream(&project).await?;
                Ok(Value::Null)
            }
            AppRequest::CheckoutBranch { project, branch } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.checkout(&project, &branch).await?;
                self.remember_working_branch(&project.name, branch.trim())?;
                Ok(Value::Null)
            }
            AppRequest::StageFile { project, path } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.stage(&project, &path).await?;
                Ok(Value::Null)
            }
            AppRequest::StageAll { project } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.stage_all(&project).await?;
                Ok(Value::Null)
            }
            AppRequest::UnstageFile { project, path } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.unstage(&project, &path).await?;
                Ok(Value::Null)
            }
            AppRequest::Commit { project, message } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.commit(&project, &message).await?;
                Ok(Value::Null)
            }
            AppRequest::Push { project } => {
                let project = self.resolve_project(project.as_deref())?;
                self.workflow.push(&project).await?;
                Ok(Value::Null)
            }
            AppRequest::History {
                project,
                limit,
                path,
            } => {
                let project = self.resolve_project(project.as_deref())?;
                let commits = self
                    .workflow
                    .history(
                        &project,
                        limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
                        path.as_deref(),
                    )
                    .await?;
                to_json(&commits)
            }
            AppRequest::RemoteUrl { project, remote } => {
                let project = self.resolve_project(project.as_deref())?;
                let remote = remote.unwrap_or_else(|| project.push_remote.clone());
                to_json(&self.workflow.remote_url(&project, &remote).await?)
            }
            AppRequest::ClearCache {
                project,
                all_branches,
            } => {
                let project = self.resolve_project(project.as_deref())?;
                if all_branches {
                    self.reconciler.clear_project_cache(&project.root);
                } else {
                    self.reconciler.clear_branch_cache(
                        &project.root,
                        &project.working_branch,
                        &project.upstream_branch,
                    );
                }
                Ok(Value::Null)
            }
            AppRequest::GetSettings => {
                let mut settings = self.settings_snapshot();
                if !settings.llm.api_key.is_empty() {
                    settings.llm.api_key = MASKED_API_KEY.to_string();
                }
                to_json(&settings)
            }
            AppRequest::SaveSettings { settings } => {
                self.save_settings(settings)?;
                Ok(Value::Null)
            }
        }
    }

    /*
     * Runs a batch with at most one batch active per handler, so `cancelTranslation` has an
     * unambiguous target. Progress is forwarded to the handler's sender, if any.
     */
    async fn translate_files(
        &self,
        project: &Project,
        paths: &[String],
        concurrency: Option<usize>,
    ) -> Result<Value> {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active_batch.lock().unwrap_or_else(PoisonError::into_inner);
            if active.is_some() {
                return Err(HandlerError::BatchInProgress);
            }
            *active = Some(cancel.clone());
        }
        let concurrency = concurrency.unwrap_or_else(|| self.settings_snapshot().llm.concurrency);
        let report = self
            .current_orchestrator()
            .translate_batch(
                project,
                paths,
                &project.upstream_branch,
                &project.working_branch,
                concurrency,
                self.progress.clone(),
                cancel,
            )
            .await;
        *self.active_batch.lock().unwrap_or_else(PoisonError::into_inner) = None;
        to_json(&report)
    }

    fn remember_working_branch(&self, project_name: &str, branch: &str) -> Result<()> {
        let updated = {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            match settings.project_mut(project_name) {
                Some(project) if project.working_branch != branch => {
                    project.working_branch = branch.to_string();
                    Some(settings.clone())
                }
                _ => None,
            }
        };
        if let Some(settings) = updated {
            self.config_manager.save_settings(&self.app_name, &settings)?;
        }
        Ok(())
    }

    /*
     * Persists new settings and rebuilds the orchestrator from them. A masked API key keeps
     * the stored one. Nothing is replaced unless the new translator builds and the file is
     * written.
     */
    fn save_settings(&self, mut settings: AppSettings) -> Result<()> {
        if settings.llm.api_key == MASKED_API_KEY {
            settings.llm.api_key = self.settings_snapshot().llm.api_key;
        }
        settings.apply_environment();
        let orchestrator =
            Self::build_orchestrator(&self.reconciler, &self.translator_factory, &settings)?;
        self.config_manager.save_settings(&self.app_name, &settings)?;
        log::info!(
            "AppHandler: Saved settings with {} project(s).",
            settings.projects.len()
        );
        let previous = std::mem::replace(
            &mut *self.settings.lock().unwrap_or_else(PoisonError::into_inner),
            settings.clone(),
        );
        *self.orchestrator.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(orchestrator);
        self.drop_stale_project_caches(&previous, &settings);
        Ok(())
    }

    /* A project that was removed, or whose root, upstream or watch dirs changed, has its
     * cached snapshots, statuses and rules dropped. */
    fn drop_stale_project_caches(&self, previous: &AppSettings, current: &AppSettings) {
        for old in &previous.projects {
            let unchanged = current.projects.iter().any(|new| {
                new.name == old.name
                    && new.root == old.root
                    && new.upstream_remote == old.upstream_remote
                    && new.upstream_branch == old.upstream_branch
                    && new.watch_filters() == old.watch_filters()
            });
            if !unchanged {
                log::debug!("AppHandler: Project '{}' changed, clearing its caches.", old.name);
                self.reconciler.clear_project_cache(&old.root);
            }
        }
    }
}

fn project_path(path: &str) -> Result<String> {
    path_utils::to_project_relative(path)
        .ok_or_else(|| EngineError::InvalidPath(path.to_string()).into())
}
