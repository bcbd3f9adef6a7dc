//! Rule tables — ordered (pattern, weight, reason) triples per label.
//!
//! Declaration order matters twice: categories listed first win score ties,
//! and matched rules are reported in table order. A malformed table
//! (invalid regex, or the same pattern declared twice with conflicting
//! weights) is a configuration error raised at load time, never per call.

use crate::error::{PipelineError, PipelineResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One scoring rule: if `pattern` matches the content, `weight` is added to
/// the owning category's score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Regex pattern, matched case-insensitively against the content.
    pub pattern: String,
    /// Score contribution when the pattern matches.
    pub weight: f64,
    /// Human-readable reason recorded in the result provenance.
    pub reason: String,
}

impl Rule {
    pub fn new(pattern: &str, weight: f64, reason: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            weight,
            reason: reason.to_string(),
        }
    }
}

/// An ordered group of rules voting for one label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCategory {
    /// The label this category produces when it wins.
    pub label: String,
    /// Rules in declaration order.
    pub rules: Vec<Rule>,
}

/// Immutable rule table consumed by the rule engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleTable {
    /// Categories in declaration order. Ties break toward the first listed.
    pub categories: Vec<RuleCategory>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a category with its rules. Declaration order is significant.
    pub fn with_category(mut self, label: &str, rules: Vec<Rule>) -> Self {
        self.categories.push(RuleCategory {
            label: label.to_string(),
            rules,
        });
        self
    }

    /// Validate the table: every pattern must compile, and a pattern
    /// declared more than once must carry the same weight everywhere.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut seen: HashMap<&str, f64> = HashMap::new();
        for category in &self.categories {
            if category.label.trim().is_empty() {
                return Err(PipelineError::Configuration(
                    "rule category label must not be empty".to_string(),
                ));
            }
            for rule in &category.rules {
                compile_pattern(&rule.pattern)?;
                match seen.get(rule.pattern.as_str()) {
                    Some(weight) if (weight - rule.weight).abs() > f64::EPSILON => {
                        return Err(PipelineError::Configuration(format!(
                            "pattern '{}' declared with conflicting weights {} and {}",
                            rule.pattern, weight, rule.weight
                        )));
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(&rule.pattern, rule.weight);
                    }
                }
            }
        }
        Ok(())
    }

    /// Total number of rules across all categories.
    pub fn rule_count(&self) -> usize {
        self.categories.iter().map(|c| c.rules.len()).sum()
    }
}

/// A rule with its pattern compiled, ready for matching.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub regex: Regex,
    pub pattern: String,
    pub weight: f64,
    pub reason: String,
}

/// A category with all rules compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledCategory {
    pub label: String,
    pub rules: Vec<CompiledRule>,
}

/// Compile a validated table. Called once at engine construction.
pub(crate) fn compile_table(table: &RuleTable) -> PipelineResult<Vec<CompiledCategory>> {
    table.validate()?;
    table
        .categories
        .iter()
        .map(|category| {
            let rules = category
                .rules
                .iter()
                .map(|rule| {
                    Ok(CompiledRule {
                        regex: compile_pattern(&rule.pattern)?,
                        pattern: rule.pattern.clone(),
                        weight: rule.weight,
                        reason: rule.reason.clone(),
                    })
                })
                .collect::<PipelineResult<Vec<_>>>()?;
            Ok(CompiledCategory {
                label: category.label.clone(),
                rules,
            })
        })
        .collect()
}

fn compile_pattern(pattern: &str) -> PipelineResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            PipelineError::Configuration(format!("invalid rule pattern '{pattern}': {e}"))
        })
}
