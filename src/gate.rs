//! Confidence Gate — decides whether a pass result warrants LLM escalation.
//!
//! The gate is stateless and deterministic given its inputs: no hidden
//! memoization across calls. It fires either on low confidence or on a
//! structural trigger (feature count, complexity score). Whether budget
//! actually *allows* the escalation is the tracker's call, not the gate's.

use serde::{Deserialize, Serialize};

/// Thresholds for the structural escalation triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Escalate when the document declares more features than this.
    pub feature_count_threshold: u32,
    /// Escalate when the complexity score exceeds this.
    pub complexity_threshold: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            feature_count_threshold: 7,
            complexity_threshold: 50,
        }
    }
}

/// Structural signals extracted from the request content during the rule
/// pass. These persist across passes: a trigger that fired on pass 1 still
/// holds on pass 2.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TriggerSignals {
    /// Number of feature/list items declared in the document.
    pub feature_count: u32,
    /// Heuristic complexity score derived from document size and structure.
    pub complexity_score: u32,
}

/// Why the gate requested escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// Result confidence below the configured threshold.
    LowConfidence { confidence: f64, threshold: f64 },
    /// Feature count exceeded the structural threshold.
    FeatureCount { count: u32, threshold: u32 },
    /// Complexity score exceeded the structural threshold.
    ComplexityScore { score: u32, threshold: u32 },
}

impl std::fmt::Display for EscalationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowConfidence {
                confidence,
                threshold,
            } => write!(f, "confidence {confidence:.2} below threshold {threshold:.2}"),
            Self::FeatureCount { count, threshold } => {
                write!(f, "{count} features (> {threshold})")
            }
            Self::ComplexityScore { score, threshold } => {
                write!(f, "complexity {score} (> {threshold})")
            }
        }
    }
}

/// The Confidence Gate.
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    threshold: f64,
    trigger: TriggerConfig,
}

impl ConfidenceGate {
    /// Create a gate with the given confidence threshold and structural
    /// trigger config.
    pub fn new(threshold: f64, trigger: TriggerConfig) -> Self {
        Self { threshold, trigger }
    }

    /// Decide whether to escalate, returning the trigger that fired.
    ///
    /// Confidence is clamped on read — upstream values are never trusted to
    /// be in range. Low confidence is checked first, then the structural
    /// triggers in declaration order.
    pub fn escalation_trigger(
        &self,
        confidence: f64,
        signals: &TriggerSignals,
    ) -> Option<EscalationTrigger> {
        let confidence = confidence.clamp(0.0, 1.0);

        if confidence < self.threshold {
            return Some(EscalationTrigger::LowConfidence {
                confidence,
                threshold: self.threshold,
            });
        }
        if signals.feature_count > self.trigger.feature_count_threshold {
            return Some(EscalationTrigger::FeatureCount {
                count: signals.feature_count,
                threshold: self.trigger.feature_count_threshold,
            });
        }
        if signals.complexity_score > self.trigger.complexity_threshold {
            return Some(EscalationTrigger::ComplexityScore {
                score: signals.complexity_score,
                threshold: self.trigger.complexity_threshold,
            });
        }
        None
    }

    /// Convenience boolean form of [`Self::escalation_trigger`].
    pub fn should_escalate(&self, confidence: f64, signals: &TriggerSignals) -> bool {
        self.escalation_trigger(confidence, signals).is_some()
    }
}
