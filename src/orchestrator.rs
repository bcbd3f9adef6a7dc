//! Pass Orchestrator — the confidence-gated, budget-bounded state machine.
//!
//! ```text
//! INIT → RULE_PASS → {DONE | ESCALATE_1} → {DONE | ESCALATE_2} → {DONE | FALLBACK} → TERMINAL
//! ```
//!
//! Policy encoded here, uniformly for every consumer: at most two LLM
//! passes, each gated on confidence or a structural trigger, each reserved
//! against the budget first, and every failure path degrades to the last
//! good result instead of surfacing an error. Passes run strictly in
//! sequence; pass 2 never starts before pass 1 is fully resolved.

use crate::budget::{BudgetDecision, BudgetTracker};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::fallback::{Candidate, FallbackResolver};
use crate::gate::ConfidenceGate;
use crate::llm::adapter::{LlmAdapter, LlmClient, PromptSpec};
use crate::outcome::{Method, PassOutcome, PassRecord, PipelineOutcome};
use crate::request::ClassificationRequest;
use crate::rules::{RuleEngine, RuleTable};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Nominal wall-clock estimate for one LLM call, used for time-budget
/// reservation. The actual deadline is whatever remains of the budget.
const LLM_CALL_ESTIMATE_MS: u64 = 500;

/// The Pass Orchestrator. One instance serves many requests; all mutable
/// per-request state (budget, pass records) is created fresh inside
/// [`Self::run`] and owned exclusively by that call.
pub struct PassOrchestrator {
    config: PipelineConfig,
    engine: RuleEngine,
    adapter: Option<LlmAdapter>,
    labels: Vec<String>,
}

impl PassOrchestrator {
    /// Build an orchestrator from config, a rule table, and an optional
    /// LLM provider.
    ///
    /// Fails at construction (not per request) on an invalid config, a
    /// malformed rule table, or LLM escalation enabled without a provider.
    pub fn new(
        config: PipelineConfig,
        table: RuleTable,
        client: Option<Arc<dyn LlmClient>>,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let engine = RuleEngine::new(table)?;
        let labels = engine.labels();
        let adapter = match client {
            Some(client) => Some(LlmAdapter::new(client, config.retry_per_pass)),
            None if config.llm_enabled => {
                return Err(PipelineError::Configuration(
                    "llm_enabled is set but no LLM provider was supplied".to_string(),
                ));
            }
            None => None,
        };
        Ok(Self {
            config,
            engine,
            adapter,
            labels,
        })
    }

    /// Run the full pipeline for one request.
    ///
    /// Only invalid input (and a bad per-request override) surface as
    /// errors; every LLM-side failure is absorbed into a degraded
    /// `method = fallback` outcome.
    pub async fn run(&self, request: &ClassificationRequest) -> PipelineResult<PipelineOutcome> {
        let config = self.config.with_overrides(&request.overrides)?;
        let gate = ConfidenceGate::new(config.confidence_threshold, config.trigger.clone());
        let mut tracker = BudgetTracker::new(&config);
        let mut passes: Vec<PassRecord> = Vec::new();
        let mut tokens_in: u32 = 0;
        let mut tokens_out: u32 = 0;

        // INIT → RULE_PASS: always runs, and invalid input stops here.
        let rule_started = Instant::now();
        let rule = self.engine.evaluate(&request.content)?;
        let rule_duration_ms = rule_started.elapsed().as_millis() as u64;
        let signals = rule.signals;
        passes.push(PassRecord::sealed(
            1,
            Method::RuleBased,
            PassOutcome::Completed {
                label: rule.label.clone(),
                confidence: rule.confidence,
            },
            rule_duration_ms,
        ));
        let mut candidate = Candidate::new(
            rule.label.clone(),
            rule.confidence,
            rule.reasoning(),
            Method::RuleBased,
        );
        debug!(
            urgency = %request.urgency,
            label = %candidate.label,
            confidence = candidate.confidence,
            "Rule pass complete"
        );

        // ESCALATE_1 / ESCALATE_2, hard-capped at two LLM passes.
        for pass_index in 0..config.max_llm_passes {
            let Some(trigger) = gate.escalation_trigger(candidate.confidence, &signals) else {
                // Gate satisfied → DONE.
                break;
            };

            // STRICT mode: escalation wanted but disabled → FALLBACK.
            if !config.llm_enabled {
                candidate = FallbackResolver::resolve(
                    &candidate,
                    &format!("escalation disabled (STRICT mode); wanted: {trigger}"),
                );
                break;
            }
            let Some(adapter) = self.adapter.as_ref() else {
                candidate =
                    FallbackResolver::resolve(&candidate, "no LLM provider configured");
                break;
            };

            let method = if pass_index == 0 {
                Method::LlmPass1
            } else {
                Method::LlmPass2
            };
            let prompt = match method {
                Method::LlmPass2 => PromptSpec::refine(
                    &request.content,
                    &candidate.label,
                    &candidate.reasoning,
                    config.max_output_tokens,
                ),
                _ => PromptSpec::classify(
                    &request.content,
                    &self.labels,
                    config.max_output_tokens,
                ),
            };
            let pass_id = passes.len() as u32 + 1;

            // Budget gate for this pass.
            if let BudgetDecision::Deny(reason) =
                tracker.reserve(prompt.estimated_tokens(), LLM_CALL_ESTIMATE_MS)
            {
                passes.push(PassRecord::sealed(
                    pass_id,
                    method,
                    PassOutcome::Denied {
                        reason: reason.clone(),
                    },
                    0,
                ));
                if candidate.method == Method::RuleBased {
                    // RULE_PASS → FALLBACK: escalation warranted but never ran.
                    candidate = FallbackResolver::resolve(&candidate, &reason.to_string());
                } else {
                    // ESCALATE_1 → DONE: keep the accepted pass-1 result.
                    debug!(reason = %reason, "Second pass denied, keeping pass-1 result");
                }
                break;
            }

            tracker.record_pass();
            info!(
                pass = %method,
                trigger = %trigger,
                timeout_ms = tracker.remaining_ms(),
                "Escalating to LLM"
            );

            let pass_started = Instant::now();
            match adapter.call(&prompt, tracker.remaining_ms()).await {
                Ok(result) => {
                    let duration_ms = pass_started.elapsed().as_millis() as u64;
                    let pass_tokens = result.tokens_in + result.tokens_out;
                    let cost =
                        pass_tokens as f64 / 1000.0 * config.usd_per_1k_tokens;
                    tracker.commit(pass_tokens, duration_ms, cost);
                    tokens_in += result.tokens_in;
                    tokens_out += result.tokens_out;
                    passes.push(PassRecord::sealed(
                        pass_id,
                        method,
                        PassOutcome::Completed {
                            label: result.label.clone(),
                            confidence: result.confidence,
                        },
                        duration_ms,
                    ));
                    candidate =
                        Candidate::new(result.label, result.confidence, result.reasoning, method);
                }
                Err(failure) => {
                    // ESCALATE_N → FALLBACK (after the pass's one permitted retry).
                    let duration_ms = pass_started.elapsed().as_millis() as u64;
                    tracker.commit(0, duration_ms, 0.0);
                    passes.push(PassRecord::sealed(
                        pass_id,
                        method,
                        PassOutcome::Failed {
                            failure: failure.clone(),
                        },
                        duration_ms,
                    ));
                    candidate = FallbackResolver::resolve(&candidate, &failure.to_string());
                    break;
                }
            }
        }

        let outcome = PipelineOutcome {
            request_id: Uuid::new_v4(),
            final_label: candidate.label,
            final_confidence: candidate.confidence.clamp(0.0, 1.0),
            method: candidate.method,
            reasoning: candidate.reasoning,
            passes,
            budget_snapshot: tracker.snapshot(),
            tokens_in,
            tokens_out,
        };
        info!("{}", outcome.summary());
        Ok(outcome)
    }
}
