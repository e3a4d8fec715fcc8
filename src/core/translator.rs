use crate::core::config::LlmSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/*
 * Translation backends. The engine sees a black-box `translate(text, prompt) -> text`
 * behind `TranslatorOperations`. `LlmTranslator` talks to any OpenAI-compatible
 * chat-completions endpoint; `FallbackTranslator` is a deterministic, offline stand-in
 * whose output is clearly marked for review.
 *
 * No retries happen here.
 */

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional technical translator. \
Translate the user's Markdown document into Simplified Chinese. Preserve Markdown structure, \
code blocks, inline code, links, HTML tags and front matter keys exactly. \
Reply with the translated document only.";

pub const FALLBACK_MARKER: &str =
    "<!-- transync: machine fallback, translation service unavailable; review required -->";

#[derive(Debug)]
pub enum TranslateError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    EmptyResponse,
    NotConfigured(String),
    Format(String),
}

impl From<reqwest::Error> for TranslateError {
    fn from(err: reqwest::Error) -> Self {
        TranslateError::Http(err)
    }
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::Http(e) => write!(f, "Translation request failed: {e}"),
            TranslateError::Api { status, body } => {
                write!(f, "Translation service returned {status}: {body}")
            }
            TranslateError::EmptyResponse => {
                write!(f, "Translation service returned no translation")
            }
            TranslateError::NotConfigured(what) => {
                write!(f, "Translation service is not configured: {what}")
            }
            TranslateError::Format(detail) => write!(f, "Unsupported document: {detail}"),
        }
    }
}

impl std::error::Error for TranslateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TranslateError::Http(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;

#[async_trait]
pub trait TranslatorOperations: Send + Sync {
    /// `prompt` replaces the backend's default system prompt when given.
    async fn translate(&self, text: &str, prompt: Option<&str>) -> Result<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

pub struct LlmTranslator {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl LlmTranslator {
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()?;
        Ok(LlmTranslator {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl TranslatorOperations for LlmTranslator {
    async fn translate(&self, text: &str, prompt: Option<&str>) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        if self.api_key.trim().is_empty() {
            return Err(TranslateError::NotConfigured("API key is empty".to_string()));
        }

        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
        };

        log::debug!(
            "LlmTranslator: Requesting translation of {} bytes from {}",
            text.len(),
            self.endpoint()
        );
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(TranslateError::EmptyResponse)
    }
}

/*
 * Deterministic offline translator. Output is the fixed marker line followed by the source
 * text with glossary terms substituted (longest terms first, so overlapping entries are
 * stable).
 */
#[derive(Debug, Clone, Default)]
pub struct FallbackTranslator {
    glossary: BTreeMap<String, String>,
}

impl FallbackTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_glossary(glossary: BTreeMap<String, String>) -> Self {
        FallbackTranslator { glossary }
    }

    pub fn substitute(&self, text: &str) -> String {
        let mut terms: Vec<(&String, &String)> = self.glossary.iter().collect();
        terms.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
        terms
            .into_iter()
            .filter(|(from, _)| !from.is_empty())
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }
}

#[cfg(test)]
pub fn is_fallback_output(text: &str) -> bool {
    text.lines().next() == Some(FALLBACK_MARKER)
}

#[async_trait]
impl TranslatorOperations for FallbackTranslator {
    async fn translate(&self, text: &str, _prompt: Option<&str>) -> Result<String> {
        Ok(format!("{FALLBACK_MARKER}\n{}", self.substitute(text)))
    }
}
