//! Pipeline outcome — terminal artifact plus the append-only pass audit trail.

use crate::budget::{Budget, DenyReason};
use crate::llm::adapter::LlmFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which path produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    RuleBased,
    LlmPass1,
    LlmPass2,
    Fallback,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleBased => write!(f, "rule_based"),
            Self::LlmPass1 => write!(f, "llm_pass1"),
            Self::LlmPass2 => write!(f, "llm_pass2"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// How one pass ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PassOutcome {
    /// The pass produced a result.
    Completed { label: String, confidence: f64 },
    /// The pass ran but failed (LLM passes only).
    Failed { failure: LlmFailure },
    /// Budget denied the pass before it ran.
    Denied { reason: DenyReason },
}

/// Audit entry for one attempted pass. Created at pass start, sealed at
/// pass end, never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRecord {
    /// 1-indexed position in the pass sequence.
    pub pass_id: u32,
    /// Which method this pass used.
    pub method: Method,
    /// How the pass ended.
    pub outcome: PassOutcome,
    /// Wall-clock duration of the pass.
    pub duration_ms: u64,
    /// Whether budget allowed the pass to run.
    pub budget_allowed: bool,
    /// When the record was sealed.
    pub recorded_at: DateTime<Utc>,
}

impl PassRecord {
    /// Seal a record for a pass that ran to some end.
    pub fn sealed(pass_id: u32, method: Method, outcome: PassOutcome, duration_ms: u64) -> Self {
        let budget_allowed = !matches!(outcome, PassOutcome::Denied { .. });
        Self {
            pass_id,
            method,
            outcome,
            duration_ms,
            budget_allowed,
            recorded_at: Utc::now(),
        }
    }
}

/// Terminal artifact of one pipeline run. Never mutated after assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Unique id for this run.
    pub request_id: Uuid,
    pub final_label: String,
    /// Always in [0, 1].
    pub final_confidence: f64,
    /// Matches the last pass record that produced `final_label`.
    pub method: Method,
    pub reasoning: String,
    /// Every pass attempted, in order.
    pub passes: Vec<PassRecord>,
    /// Budget state at assembly time.
    pub budget_snapshot: Budget,
    /// Prompt tokens consumed across all LLM passes.
    pub tokens_in: u32,
    /// Completion tokens consumed across all LLM passes.
    pub tokens_out: u32,
}

impl PipelineOutcome {
    /// One-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "request={} method={} label={} confidence={:.2} passes={} tokens={}/{}",
            self.request_id,
            self.method,
            self.final_label,
            self.final_confidence,
            self.passes.len(),
            self.tokens_in,
            self.tokens_out,
        )
    }

    /// Number of LLM passes that actually ran (denied passes excluded).
    pub fn llm_passes_attempted(&self) -> usize {
        self.passes
            .iter()
            .filter(|p| {
                matches!(p.method, Method::LlmPass1 | Method::LlmPass2) && p.budget_allowed
            })
            .count()
    }
}
