//! Pipeline configuration — thresholds, budgets, and STRICT-mode switch.
//!
//! All values live here rather than as code literals so they are testable
//! and overridable without code changes. Deployment-level overrides come
//! from environment variables; request-level overrides come through
//! [`ConfigOverrides`] on the request itself.

use crate::error::{PipelineError, PipelineResult};
use crate::gate::TriggerConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Escalate when result confidence falls below this (0.0–1.0).
    pub confidence_threshold: f64,
    /// Hard cap on LLM passes per request (the state machine never allows
    /// more than 2 regardless).
    pub max_llm_passes: u32,
    /// Total token ceiling per request (prompt + completion, all passes).
    pub token_budget: u32,
    /// Total wall-clock ceiling per request in milliseconds.
    pub time_budget_ms: u64,
    /// Total monetary ceiling per request in USD.
    pub cost_budget_usd: f64,
    /// Flat price used for cost accounting (USD per 1000 tokens).
    pub usd_per_1k_tokens: f64,
    /// Whether LLM escalation is permitted at all. `false` is STRICT mode:
    /// every result is rule-based or fallback-from-rules.
    pub llm_enabled: bool,
    /// Retries permitted inside a single LLM pass (timeout/unavailable only).
    pub retry_per_pass: u32,
    /// Completion-token limit passed to the provider per call.
    pub max_output_tokens: u32,
    /// Structural escalation triggers.
    pub trigger: TriggerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            max_llm_passes: 2,
            token_budget: 2000,
            time_budget_ms: 10_000,
            cost_budget_usd: 0.50,
            usd_per_1k_tokens: 0.002,
            llm_enabled: false,
            retry_per_pass: 1,
            max_output_tokens: 512,
            trigger: TriggerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            confidence_threshold: env_parse(
                "PIPELINE_CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            ),
            max_llm_passes: env_parse("PIPELINE_MAX_LLM_PASSES", defaults.max_llm_passes),
            token_budget: env_parse("PIPELINE_TOKEN_BUDGET", defaults.token_budget),
            time_budget_ms: env_parse("PIPELINE_TIME_BUDGET_MS", defaults.time_budget_ms),
            cost_budget_usd: env_parse("PIPELINE_COST_BUDGET_USD", defaults.cost_budget_usd),
            usd_per_1k_tokens: env_parse("PIPELINE_USD_PER_1K_TOKENS", defaults.usd_per_1k_tokens),
            llm_enabled: env_parse("PIPELINE_LLM_ENABLED", defaults.llm_enabled),
            retry_per_pass: env_parse("PIPELINE_RETRY_PER_PASS", defaults.retry_per_pass),
            max_output_tokens: env_parse("PIPELINE_MAX_OUTPUT_TOKENS", defaults.max_output_tokens),
            trigger: defaults.trigger,
        }
    }

    /// Validate threshold and budget settings.
    ///
    /// Misconfiguration is fatal at startup, never per request.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::Configuration(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_llm_passes > 2 {
            return Err(PipelineError::Configuration(format!(
                "max_llm_passes is capped at 2, got {}",
                self.max_llm_passes
            )));
        }
        if self.time_budget_ms == 0 {
            return Err(PipelineError::Configuration(
                "time_budget_ms must be greater than 0".to_string(),
            ));
        }
        if self.cost_budget_usd < 0.0 || self.usd_per_1k_tokens < 0.0 {
            return Err(PipelineError::Configuration(
                "cost settings must be non-negative".to_string(),
            ));
        }
        if self.retry_per_pass > 1 {
            return Err(PipelineError::Configuration(format!(
                "retry_per_pass is capped at 1, got {}",
                self.retry_per_pass
            )));
        }
        Ok(())
    }

    /// Apply per-request overrides, producing the effective config for one
    /// request. The result is re-validated so a bad override surfaces as a
    /// configuration error before any pass runs.
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> PipelineResult<Self> {
        let mut effective = self.clone();
        if let Some(v) = overrides.confidence_threshold {
            effective.confidence_threshold = v;
        }
        if let Some(v) = overrides.max_llm_passes {
            effective.max_llm_passes = v;
        }
        if let Some(v) = overrides.token_budget {
            effective.token_budget = v;
        }
        if let Some(v) = overrides.time_budget_ms {
            effective.time_budget_ms = v;
        }
        if let Some(v) = overrides.cost_budget_usd {
            effective.cost_budget_usd = v;
        }
        if let Some(v) = overrides.llm_enabled {
            effective.llm_enabled = v;
        }
        effective.validate()?;
        Ok(effective)
    }
}

/// Per-request configuration overrides. Anything left `None` inherits the
/// pipeline-level value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub confidence_threshold: Option<f64>,
    pub max_llm_passes: Option<u32>,
    pub token_budget: Option<u32>,
    pub time_budget_ms: Option<u64>,
    pub cost_budget_usd: Option<f64>,
    pub llm_enabled: Option<bool>,
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
