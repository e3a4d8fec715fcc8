/*
 * Manages application-wide settings: the list of configured projects, the active project,
 * the global translation prompt, the LLM backend parameters and the git command timeout.
 * Settings are persisted as pretty JSON (`settings.json`) in the per-user local
 * configuration directory resolved through `path_utils`.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) so the request handler can
 * be tested against an in-memory implementation. `CoreConfigManager` handles the file
 * system; its directory can be overridden for tests.
 */
use crate::core::path_utils;
use crate::core::project::Project;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

const SETTINGS_FILENAME: &str = "settings.json";
pub const API_KEY_ENV_VAR: &str = "TRANSYNC_API_KEY";

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Serde(serde_json::Error),
    NoConfigDirectory,
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serde(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::Serde(e) => write!(f, "Configuration format error: {e}"),
            ConfigError::NoConfigDirectory => {
                write!(f, "Could not determine the configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Serde(e) => Some(e),
            ConfigError::NoConfigDirectory => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub concurrency: usize,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub fallback_on_error: bool,
    /// Term substitutions applied by the offline fallback translator.
    pub fallback_glossary: BTreeMap<String, String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        LlmSettings {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            concurrency: 3,
            temperature: 0.3,
            request_timeout_secs: 120,
            fallback_on_error: false,
            fallback_glossary: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub projects: Vec<Project>,
    pub active_project: Option<String>,
    pub global_prompt: Option<String>,
    pub llm: LlmSettings,
    pub git_command_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            projects: Vec::new(),
            active_project: None,
            global_prompt: None,
            llm: LlmSettings::default(),
            git_command_timeout_secs: 60,
        }
    }
}

impl AppSettings {
    /// Looks a project up by name, or the active project when `name` is None.
    pub fn project(&self, name: Option<&str>) -> Option<&Project> {
        let wanted = name.or(self.active_project.as_deref())?;
        self.projects.iter().find(|project| project.name == wanted)
    }

    pub fn project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|project| project.name == name)
    }

    /// Fills an empty API key from the environment.
    pub fn apply_environment(&mut self) {
        if self.llm.api_key.trim().is_empty()
            && let Ok(key) = std::env::var(API_KEY_ENV_VAR)
            && !key.trim().is_empty()
        {
            log::debug!("AppSettings: Using API key from {API_KEY_ENV_VAR}.");
            self.llm.api_key = key.trim().to_string();
        }
    }
}

pub trait ConfigManagerOperations: Send + Sync {
    fn load_settings(&self, app_name: &str) -> Result<AppSettings>;
    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()>;
}

pub struct CoreConfigManager {
    config_dir_override: Option<PathBuf>,
}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {
            config_dir_override: None,
        }
    }

    #[cfg(test)]
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        CoreConfigManager {
            config_dir_override: Some(config_dir),
        }
    }

    fn config_dir(&self, app_name: &str) -> Result<PathBuf> {
        match &self.config_dir_override {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(dir.clone())
            }
            None => path_utils::get_base_app_config_local_dir(app_name)
                .ok_or(ConfigError::NoConfigDirectory),
        }
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManagerOperations for CoreConfigManager {
    /*
     * Loads the settings file. A missing file yields the defaults; a malformed one is an
     * error so the user's settings are never silently replaced.
     */
    fn load_settings(&self, app_name: &str) -> Result<AppSettings> {
        let file_path = self.config_dir(app_name)?.join(SETTINGS_FILENAME);
        if !file_path.exists() {
            log::debug!("CoreConfigManager: {file_path:?} does not exist. Using defaults.");
            return Ok(AppSettings::default());
        }
        let file = File::open(&file_path)?;
        let settings: AppSettings = serde_json::from_reader(BufReader::new(file))?;
        log::debug!(
            "CoreConfigManager: Loaded settings with {} project(s) from {file_path:?}.",
            settings.projects.len()
        );
        Ok(settings)
    }

    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()> {
        let file_path = self.config_dir(app_name)?.join(SETTINGS_FILENAME);
        let file = File::create(&file_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, settings)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        log::debug!("CoreConfigManager: Saved settings to {file_path:?}.");
        Ok(())
    }
}
