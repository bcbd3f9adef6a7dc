//! Rule Engine — deterministic first pass over the request content.
//!
//! Pure function over its compiled table: same content and table always
//! produce the same result. Scores are the sum of matched rule weights per
//! category; the winning score saturates to a confidence in [0, 1] via
//! `score / (score + 1)`.

use crate::error::{PipelineError, PipelineResult};
use crate::gate::TriggerSignals;
use crate::rules::table::{compile_table, CompiledCategory, RuleTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Label produced when no rule in any category matches.
pub const UNCLASSIFIED: &str = "unclassified";

/// Provenance for one matched rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleMatch {
    pub pattern: String,
    pub weight: f64,
    pub reason: String,
}

/// Result of the rule pass. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    /// Winning category label, or [`UNCLASSIFIED`] when nothing matched.
    pub label: String,
    /// Saturated confidence in [0, 1].
    pub confidence: f64,
    /// Matched rules of the winning category, in declaration order.
    pub matched_rules: Vec<RuleMatch>,
    /// Structural signals extracted from the content for the gate.
    pub signals: TriggerSignals,
}

impl RuleResult {
    /// One-line reasoning string for the response envelope.
    pub fn reasoning(&self) -> String {
        if self.matched_rules.is_empty() {
            return "no rule matched".to_string();
        }
        let reasons: Vec<&str> = self
            .matched_rules
            .iter()
            .map(|m| m.reason.as_str())
            .collect();
        format!("matched: {}", reasons.join("; "))
    }
}

/// The Rule Engine. Holds an immutable compiled table; side-effect free.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    categories: Vec<CompiledCategory>,
}

impl RuleEngine {
    /// Build an engine from a rule table. Compilation and validation happen
    /// here, once — a malformed table never reaches `evaluate`.
    pub fn new(table: RuleTable) -> PipelineResult<Self> {
        Ok(Self {
            categories: compile_table(&table)?,
        })
    }

    /// Category labels in declaration order — the candidate set offered to
    /// escalation prompts.
    pub fn labels(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.label.clone()).collect()
    }

    /// Evaluate the content against the table.
    ///
    /// Empty or whitespace-only content is invalid input. Ties between
    /// categories break toward the first declared.
    pub fn evaluate(&self, content: &str) -> PipelineResult<RuleResult> {
        if content.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "content must not be empty or whitespace-only".to_string(),
            ));
        }

        let mut best: Option<(usize, f64)> = None;
        let mut all_matches: Vec<Vec<RuleMatch>> = Vec::with_capacity(self.categories.len());

        for (idx, category) in self.categories.iter().enumerate() {
            let mut score = 0.0;
            let mut matches = Vec::new();
            for rule in &category.rules {
                if rule.regex.is_match(content) {
                    score += rule.weight;
                    matches.push(RuleMatch {
                        pattern: rule.pattern.clone(),
                        weight: rule.weight,
                        reason: rule.reason.clone(),
                    });
                }
            }
            all_matches.push(matches);
            // Strictly-greater keeps the first declared category on ties.
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        let signals = extract_signals(content);

        let result = match best {
            Some((idx, score)) => {
                let confidence = (score / (score + 1.0)).clamp(0.0, 1.0);
                RuleResult {
                    label: self.categories[idx].label.clone(),
                    confidence,
                    matched_rules: std::mem::take(&mut all_matches[idx]),
                    signals,
                }
            }
            None => RuleResult {
                label: UNCLASSIFIED.to_string(),
                confidence: 0.0,
                matched_rules: Vec::new(),
                signals,
            },
        };

        debug!(
            label = %result.label,
            confidence = result.confidence,
            matches = result.matched_rules.len(),
            features = signals.feature_count,
            complexity = signals.complexity_score,
            "Rule pass evaluated"
        );
        Ok(result)
    }
}

/// Extract structural trigger signals from the content.
///
/// Feature count is the number of list-item lines (bulleted or numbered);
/// complexity is a word-count heuristic weighted by feature density.
fn extract_signals(content: &str) -> TriggerSignals {
    let feature_count = content
        .lines()
        .filter(|line| feature_line_regex().is_match(line))
        .count() as u32;
    let word_count = content.split_whitespace().count() as u32;
    TriggerSignals {
        feature_count,
        complexity_score: word_count / 25 + feature_count * 2,
    }
}

/// Matches bulleted (`-`, `*`, `+`) and numbered (`1.`, `2)`) list lines.
fn feature_line_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^\s*(?:[-*+]\s+|\d+[.)]\s+)").expect("static pattern"))
}
