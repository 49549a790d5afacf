//! Refinement backends: one chunk in, one corrected chunk out.
//!
//! [`ChatCompletionsBackend`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint and authenticates with the caller's
//! credential on every request. [`ProviderBackend`] delegates to an
//! `edgequake_llm` provider that already holds its own key, which suits the
//! CLI where the operator configures the provider through the environment.
//!
//! Neither backend retries. A failed call is mapped onto
//! [`ExternalServiceKind`] and returned so the caller can decide whether to
//! re-trigger the request.

use crate::config::RefineConfig;
use crate::error::{ExternalServiceKind, OcrError};
use crate::refine::Credential;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sends one chunk to an external model and returns its corrected text.
#[async_trait]
pub trait RefineBackend: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &str;

    /// Refine `chunk` under `system_prompt`.
    ///
    /// The returned text replaces the chunk verbatim apart from surrounding
    /// whitespace and outer code fences, which the orchestrator normalises.
    async fn refine_chunk(
        &self,
        system_prompt: &str,
        chunk: &str,
        credential: &Credential,
    ) -> Result<String, OcrError>;
}

// ── OpenAI-compatible HTTP backend ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatRequestMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct ChatRequestMessage<'a> {
    role: &'static str,
    content: &'a str,
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
    content: Option<String>,
}

/// Direct HTTP client for `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl ChatCompletionsBackend {
    pub fn new(config: &RefineConfig) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| OcrError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RefineBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        "chat-completions"
    }

    async fn refine_chunk(
        &self,
        system_prompt: &str,
        chunk: &str,
        credential: &Credential,
    ) -> Result<String, OcrError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatRequestMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatRequestMessage {
                    role: "user",
                    content: chunk,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status.as_u16(), retry_after_secs, &body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| OcrError::ExternalService {
            kind: ExternalServiceKind::MalformedResponse,
            message: format!("Failed to parse response: {}", e),
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OcrError::ExternalService {
                kind: ExternalServiceKind::MalformedResponse,
                message: "Response contained no completion".into(),
            })?;

        debug!("{}: {} chars in → {} chars out", self.name(), chunk.len(), content.len());
        Ok(content)
    }
}

fn map_transport_error(e: reqwest::Error) -> OcrError {
    let kind = if e.is_timeout() {
        ExternalServiceKind::Timeout
    } else if e.is_decode() {
        ExternalServiceKind::MalformedResponse
    } else {
        ExternalServiceKind::Network
    };
    OcrError::ExternalService {
        kind,
        message: e.to_string(),
    }
}

fn map_status(status: u16, retry_after_secs: Option<u64>, body: &str) -> OcrError {
    let kind = match status {
        401 | 403 => ExternalServiceKind::Authentication,
        429 => ExternalServiceKind::RateLimited { retry_after_secs },
        _ => ExternalServiceKind::Api { status },
    };
    let snippet: String = body.chars().take(200).collect();
    OcrError::ExternalService {
        kind,
        message: format!("HTTP {}: {}", status, snippet.trim()),
    }
}

// ── edgequake-llm provider backend ───────────────────────────────────────

/// Refinement through an `edgequake_llm` provider.
///
/// The provider authenticates with its own configured key. The caller's
/// credential is still shape-checked by the orchestrator but is not
/// forwarded.
#[derive(Clone)]
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &RefineConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Resolve a provider from the environment.
    ///
    /// Resolution order:
    /// 1. `provider_name` argument with `config.model`
    /// 2. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
    /// 3. OpenAI when `OPENAI_API_KEY` is set
    /// 4. `ProviderFactory::from_env` auto-detection
    pub fn from_env(provider_name: Option<&str>, config: &RefineConfig) -> Result<Self, OcrError> {
        let provider = resolve_provider(provider_name, &config.model)?;
        Ok(Self::new(provider, config))
    }
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RefineBackend for ProviderBackend {
    fn name(&self) -> &str {
        "edgequake-llm"
    }

    async fn refine_chunk(
        &self,
        system_prompt: &str,
        chunk: &str,
        _credential: &Credential,
    ) -> Result<String, OcrError> {
        let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(chunk)];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "{}: {} prompt tokens, {} completion tokens",
            self.name(),
            response.prompt_tokens,
            response.completion_tokens
        );
        Ok(response.content)
    }
}

fn resolve_provider(
    provider_name: Option<&str>,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, OcrError> {
    if let Some(name) = provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _) = ProviderFactory::from_env().map_err(|e| OcrError::InvalidConfig(
        format!("No LLM provider auto-detected: {}", e),
    ))?;
    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, OcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        OcrError::InvalidConfig(format!("Provider '{}' not configured: {}", provider_name, e))
    })
}

/// Providers report failures as text; recover the category from it.
fn classify_provider_error(message: &str) -> OcrError {
    let lower = message.to_ascii_lowercase();
    let kind = if lower.contains("429") || lower.contains("rate limit") {
        ExternalServiceKind::RateLimited {
            retry_after_secs: None,
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("api key")
    {
        ExternalServiceKind::Authentication
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ExternalServiceKind::Timeout
    } else {
        ExternalServiceKind::Network
    };
    OcrError::ExternalService {
        kind,
        message: message.to_string(),
    }
}
