//! Fallback Resolver — the terminal, network-free safety net.
//!
//! Converts any escalation failure, denial, or disabled escalation into a
//! degraded result derived from the last successful pass. Infallible and
//! pure: it never calls the network and never raises.

use crate::outcome::Method;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The currently-accepted result while the pipeline is in flight: the rule
/// result at first, replaced by each successful LLM pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Which pass produced this candidate.
    pub method: Method,
}

impl Candidate {
    pub fn new(label: String, confidence: f64, reasoning: String, method: Method) -> Self {
        Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            method,
        }
    }
}

/// The Fallback Resolver.
pub struct FallbackResolver;

impl FallbackResolver {
    /// Carry the last good candidate forward as the final result, tagged
    /// `method = fallback` with the degradation noted in reasoning.
    /// Confidence is left unchanged from the earlier step.
    pub fn resolve(last_good: &Candidate, note: &str) -> Candidate {
        warn!(
            label = %last_good.label,
            from_method = %last_good.method,
            note,
            "Escalation unavailable, degrading to last good result"
        );
        Candidate {
            label: last_good.label.clone(),
            confidence: last_good.confidence,
            reasoning: format!("{}; degraded: {}", last_good.reasoning, note),
            method: Method::Fallback,
        }
    }
}
