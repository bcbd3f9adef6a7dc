//! HTTP provider — OpenAI-compatible chat-completions client.
//!
//! Default concrete [`LlmClient`] for deployments that point the pipeline
//! at a local or hosted inference endpoint. The adapter owns the deadline;
//! this client just performs the request and maps transport failures to
//! `Unavailable`.

use crate::llm::adapter::{LlmClient, LlmFailure, PromptSpec, RawCompletion};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Endpoint settings for an OpenAI-compatible provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpEndpoint {
    /// Base URL including the API prefix, e.g. `http://localhost:8080/v1`.
    pub url: String,
    /// Model name sent in the request body.
    pub model: String,
    /// Bearer token; local endpoints typically ignore it.
    pub api_key: Option<String>,
}

impl HttpEndpoint {
    /// Read endpoint settings from the environment. Returns `None` when no
    /// URL is configured, which leaves the pipeline in STRICT mode.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("PIPELINE_LLM_URL").ok()?;
        let model =
            std::env::var("PIPELINE_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let api_key = std::env::var("PIPELINE_LLM_API_KEY").ok();
        Some(Self {
            url,
            model,
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

/// Reqwest-backed [`LlmClient`] for OpenAI-compatible endpoints.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: HttpEndpoint,
}

impl HttpLlmClient {
    /// Build a client for the given endpoint.
    pub fn new(endpoint: HttpEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client for LLM endpoint")?;
        Ok(Self { client, endpoint })
    }

    /// Check whether the endpoint is reachable (GET /models).
    pub async fn check_endpoint(&self) -> bool {
        let models_url = format!("{}/models", self.endpoint.url);
        match self
            .client
            .get(&models_url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &PromptSpec) -> Result<RawCompletion, LlmFailure> {
        let body = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.content.clone(),
                },
            ],
            max_tokens: prompt.max_tokens,
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.endpoint.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| LlmFailure::Unavailable {
            message: format!("request to {url} failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmFailure::Unavailable {
                message: format!("{url} returned {status}"),
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| LlmFailure::MalformedResponse {
                    message: format!("completion response did not parse: {e}"),
                })?;

        let content = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmFailure::MalformedResponse {
                message: "completion had no choices".to_string(),
            })?;

        // Some local servers omit usage; estimate so budget accounting
        // still moves.
        let tokens_in = if parsed.usage.prompt_tokens > 0 {
            parsed.usage.prompt_tokens
        } else {
            ((prompt.system.len() + prompt.content.len()) / 4) as u32
        };
        let tokens_out = if parsed.usage.completion_tokens > 0 {
            parsed.usage.completion_tokens
        } else {
            (content.len() / 4) as u32
        };

        Ok(RawCompletion {
            body: content,
            tokens_in,
            tokens_out,
        })
    }
}
