//! Classification request — the immutable per-call input.

use crate::config::ConfigOverrides;
use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// How urgently the caller wants a result.
///
/// `Interim` requests a best-effort fast path but still honors the same
/// confidence gate and budgets as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Interim,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Interim => write!(f, "interim"),
        }
    }
}

/// One classification request. Created per call, immutable, owned by the
/// caller for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRequest {
    /// The unstructured text to classify. Never empty.
    pub content: String,
    /// Requested urgency.
    pub urgency: Urgency,
    /// Per-request configuration overrides.
    #[serde(default)]
    pub overrides: ConfigOverrides,
}

impl ClassificationRequest {
    /// Create a request, rejecting empty or whitespace-only content up
    /// front so no pass ever runs on invalid input.
    pub fn new(content: impl Into<String>) -> PipelineResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "content must not be empty or whitespace-only".to_string(),
            ));
        }
        Ok(Self {
            content,
            urgency: Urgency::Normal,
            overrides: ConfigOverrides::default(),
        })
    }

    /// Set the urgency.
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    /// Attach per-request config overrides.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}
