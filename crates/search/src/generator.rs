//! Text generator capability and the chat-completions client behind it.

use async_trait::async_trait;
use policyforge_harness::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generator returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator returned an empty response")]
    EmptyResponse,
}

/// Sampling options for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    pub model: String,
    pub temperature: Option<f32>,
}

impl SamplingConfig {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature: Some(temperature),
        }
    }

    /// Temperature actually sent; reasoning models run at their fixed default.
    pub fn effective_temperature(&self) -> Option<f32> {
        if is_o_series(&self.model) {
            None
        } else {
            self.temperature
        }
    }
}

pub fn is_o_series(model: &str) -> bool {
    model.to_ascii_lowercase().starts_with('o')
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, sampling: &SamplingConfig)
        -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Azure OpenAI deployment; the model name selects the deployment.
    Azure {
        endpoint: String,
        api_version: String,
    },
    /// Any endpoint speaking the OpenAI chat-completions protocol.
    OpenAiCompatible { url: String },
}

impl Backend {
    pub fn request_url(&self, model: &str) -> String {
        match self {
            Backend::Azure {
                endpoint,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                model,
                api_version
            ),
            Backend::OpenAiCompatible { url } => url.clone(),
        }
    }
}

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    backend: Backend,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(backend: Backend, api_key: String) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::InvalidSetting {
                name: "http client".into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            backend,
            api_key,
        })
    }

    /// Configure from the process environment.
    ///
    /// `AZURE_OPENAI_ENDPOINT` + `AZURE_OPENAI_API_KEY` (and optionally
    /// `AZURE_OPENAI_API_VERSION`) select Azure. Otherwise
    /// `POLICYFORGE_LLM_ENDPOINT` + `POLICYFORGE_LLM_API_KEY` select a
    /// bearer-authenticated OpenAI-compatible endpoint.
    pub fn from_env() -> Result<Self, ConfigError> {
        let (backend, api_key) = backend_from_lookup(|key| std::env::var(key).ok())?;
        Self::new(backend, api_key)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

pub fn backend_from_lookup<F>(lookup: F) -> Result<(Backend, String), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let missing = |variable: &str| ConfigError::MissingCredentials {
        variable: variable.to_string(),
    };

    if let Some(endpoint) = present("AZURE_OPENAI_ENDPOINT") {
        let api_key = present("AZURE_OPENAI_API_KEY").ok_or_else(|| missing("AZURE_OPENAI_API_KEY"))?;
        let api_version = present("AZURE_OPENAI_API_VERSION")
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());
        return Ok((
            Backend::Azure {
                endpoint,
                api_version,
            },
            api_key,
        ));
    }

    if let Some(url) = present("POLICYFORGE_LLM_ENDPOINT") {
        let api_key =
            present("POLICYFORGE_LLM_API_KEY").ok_or_else(|| missing("POLICYFORGE_LLM_API_KEY"))?;
        return Ok((Backend::OpenAiCompatible { url }, api_key));
    }

    Err(missing("AZURE_OPENAI_ENDPOINT"))
}

fn request_body<'a>(prompt: &'a str, sampling: &'a SamplingConfig) -> ChatRequest<'a> {
    ChatRequest {
        model: &sampling.model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        temperature: sampling.effective_temperature(),
    }
}

fn response_text(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl Generator for ChatCompletionsClient {
    fn name(&self) -> &str {
        match self.backend {
            Backend::Azure { .. } => "azure-openai",
            Backend::OpenAiCompatible { .. } => "openai-compatible",
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<String, GenerationError> {
        let url = self.backend.request_url(&sampling.model);
        let request = self.http.post(&url).json(&request_body(prompt, sampling));
        let request = match self.backend {
            Backend::Azure { .. } => request.header("api-key", &self.api_key),
            Backend::OpenAiCompatible { .. } => request.bearer_auth(&self.api_key),
        };

        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        debug!(
            model = %sampling.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generator responded"
        );
        response_text(parsed)
    }
}
