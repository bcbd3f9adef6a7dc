//! LLM Adapter — typed calls to a provider behind a capability trait.
//!
//! The adapter enforces the timeout itself: once `timeout_ms` elapses the
//! call is failed and the in-flight future is dropped, so a late result is
//! discarded rather than left dangling. Schema validation happens here too;
//! a response that does not parse into the expected verdict shape is a
//! `MalformedResponse`, never silently coerced.
//!
//! Retry policy: at most one retry per pass, and only for
//! `Timeout`/`Unavailable` — retrying a bad schema wastes budget for no
//! benefit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A provider-agnostic prompt for one escalation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSpec {
    /// What this pass is for (e.g. "classify", "refine"). Recorded in
    /// traces, and sent as part of the system prompt.
    pub purpose: String,
    /// System instruction, including the candidate labels and the required
    /// JSON verdict shape. Domain prompt text is configuration the caller
    /// supplies; the default just requests the verdict schema.
    pub system: String,
    /// The document under classification.
    pub content: String,
    /// Completion-token limit for the provider.
    pub max_tokens: u32,
}

impl PromptSpec {
    /// Standard classification prompt over a set of candidate labels.
    pub fn classify(content: &str, labels: &[String], max_tokens: u32) -> Self {
        Self {
            purpose: "classify".to_string(),
            system: format!(
                "Classify the document into exactly one of these labels: [{}]. \
                 Respond with JSON only: {{\"label\": <string>, \"confidence\": <0..1>, \
                 \"reasoning\": <string>}}",
                labels.join(", ")
            ),
            content: content.to_string(),
            max_tokens,
        }
    }

    /// Second-pass refinement prompt, anchored on an earlier verdict.
    pub fn refine(content: &str, prior_label: &str, prior_reasoning: &str, max_tokens: u32) -> Self {
        Self {
            purpose: "refine".to_string(),
            system: format!(
                "A first pass labeled this document '{prior_label}' \
                 (reasoning: {prior_reasoning}). Re-examine and refine the verdict. \
                 Respond with JSON only: {{\"label\": <string>, \"confidence\": <0..1>, \
                 \"reasoning\": <string>}}"
            ),
            content: content.to_string(),
            max_tokens,
        }
    }

    /// Rough token estimate for budget reservation (prompt chars / 4 plus
    /// the completion limit).
    pub fn estimated_tokens(&self) -> u32 {
        ((self.system.len() + self.content.len()) / 4) as u32 + self.max_tokens
    }
}

/// Raw provider output before schema validation.
#[derive(Debug, Clone)]
pub struct RawCompletion {
    /// Completion text, expected to be a JSON verdict.
    pub body: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Typed failure from an LLM pass. All variants are absorbed by the
/// orchestrator into a fallback result; none reach the caller as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LlmFailure {
    /// The call did not complete within its deadline.
    #[error("LLM call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// The provider could not be reached or refused the request.
    #[error("LLM provider unavailable: {message}")]
    Unavailable { message: String },
    /// The response did not validate against the verdict schema.
    #[error("malformed LLM response: {message}")]
    MalformedResponse { message: String },
}

impl LlmFailure {
    /// Whether a single retry is permitted for this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MalformedResponse { .. })
    }
}

/// Validated result of one LLM pass. Consumed once by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPassResult {
    pub label: String,
    /// Clamped to [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub latency_ms: u64,
}

/// Capability interface an external provider supplies. The pipeline is
/// agnostic to the concrete provider behind it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &PromptSpec) -> Result<RawCompletion, LlmFailure>;
}

/// The verdict shape every provider response must satisfy.
#[derive(Debug, Deserialize)]
struct WireVerdict {
    label: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Timeout- and retry-enforcing wrapper around an [`LlmClient`].
#[derive(Clone)]
pub struct LlmAdapter {
    client: Arc<dyn LlmClient>,
    retry_per_pass: u32,
}

impl LlmAdapter {
    pub fn new(client: Arc<dyn LlmClient>, retry_per_pass: u32) -> Self {
        Self {
            client,
            retry_per_pass,
        }
    }

    /// Run one pass against the provider with a hard deadline covering the
    /// whole pass, retry included.
    ///
    /// `timeout_ms` bounds the pass end to end: the remaining window is
    /// split evenly across the attempts still permitted, so a first
    /// attempt that times out leaves room for its retry and the pass never
    /// consumes more than `timeout_ms` of wall time. A retry that finds
    /// the window already spent fails fast without calling the provider.
    /// On `Timeout`/`Unavailable` a single retry is attempted (if
    /// configured); `MalformedResponse` fails the pass immediately.
    pub async fn call(
        &self,
        prompt: &PromptSpec,
        timeout_ms: u64,
    ) -> Result<LlmPassResult, LlmFailure> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = self.attempt(prompt, deadline, attempt, started).await;
            match outcome {
                Ok(result) => {
                    debug!(
                        purpose = %prompt.purpose,
                        label = %result.label,
                        confidence = result.confidence,
                        latency_ms = result.latency_ms,
                        attempt,
                        "LLM pass succeeded"
                    );
                    return Ok(result);
                }
                Err(failure) if failure.is_retryable() && attempt <= self.retry_per_pass => {
                    warn!(
                        purpose = %prompt.purpose,
                        error = %failure,
                        attempt,
                        "LLM attempt failed, retrying once"
                    );
                }
                Err(failure) => {
                    warn!(
                        purpose = %prompt.purpose,
                        error = %failure,
                        attempt,
                        "LLM pass failed"
                    );
                    return Err(failure);
                }
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &PromptSpec,
        deadline: tokio::time::Instant,
        attempt: u32,
        started: Instant,
    ) -> Result<LlmPassResult, LlmFailure> {
        let remaining = deadline.duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(LlmFailure::Timeout { timeout_ms: 0 });
        }
        // Split what is left of the pass window across this attempt and
        // any retries still permitted.
        let attempts_left = (self.retry_per_pass + 1).saturating_sub(attempt - 1).max(1);
        let slice = remaining / attempts_left;
        // The in-flight future is dropped on timeout; a result arriving
        // after the deadline is discarded, not consumed.
        let raw = match tokio::time::timeout(slice, self.client.complete(prompt)).await {
            Err(_elapsed) => {
                return Err(LlmFailure::Timeout {
                    timeout_ms: slice.as_millis() as u64,
                })
            }
            Ok(Err(failure)) => return Err(failure),
            Ok(Ok(raw)) => raw,
        };
        validate(raw, started.elapsed().as_millis() as u64)
    }
}

/// Validate a raw completion against the verdict schema.
fn validate(raw: RawCompletion, latency_ms: u64) -> Result<LlmPassResult, LlmFailure> {
    let verdict: WireVerdict =
        serde_json::from_str(raw.body.trim()).map_err(|e| LlmFailure::MalformedResponse {
            message: format!("verdict did not parse: {e}"),
        })?;
    if verdict.label.trim().is_empty() {
        return Err(LlmFailure::MalformedResponse {
            message: "verdict label is empty".to_string(),
        });
    }
    if !verdict.confidence.is_finite() {
        return Err(LlmFailure::MalformedResponse {
            message: format!("verdict confidence is not finite: {}", verdict.confidence),
        });
    }
    Ok(LlmPassResult {
        label: verdict.label,
        confidence: verdict.confidence.clamp(0.0, 1.0),
        reasoning: verdict.reasoning,
        tokens_in: raw.tokens_in,
        tokens_out: raw.tokens_out,
        latency_ms,
    })
}
