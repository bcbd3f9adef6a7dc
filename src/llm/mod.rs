//! LLM boundary — provider-agnostic typed calls with self-enforced timeouts.

pub mod adapter;
pub mod http;

pub use adapter::{LlmAdapter, LlmClient, LlmFailure, LlmPassResult, PromptSpec, RawCompletion};
pub use http::{HttpEndpoint, HttpLlmClient};
