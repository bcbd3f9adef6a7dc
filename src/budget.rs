//! Budget Tracker — per-request ceilings on tokens, time, cost, and passes.
//!
//! A denial is not an error: it is a normal control-flow signal that routes
//! the orchestrator to fallback. Budgets live exactly as long as one
//! request and are never shared or pooled across requests.

use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Budget snapshot. All `*_used` fields are monotonically non-decreasing
/// within one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub tokens_used: u32,
    pub tokens_max: u32,
    pub elapsed_ms: u64,
    pub timeout_ms: u64,
    pub cost_usd: f64,
    pub cost_max_usd: f64,
    /// LLM passes attempted so far.
    pub retries_used: u32,
    /// Hard cap on LLM passes per request.
    pub retries_max: u32,
}

/// Why a reservation was denied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    TokensExhausted { needed: u32, remaining: u32 },
    TimeExhausted { needed_ms: u64, remaining_ms: u64 },
    CostExhausted { spent_usd: f64, max_usd: f64 },
    PassesExhausted { used: u32, max: u32 },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokensExhausted { needed, remaining } => {
                write!(f, "token budget exhausted ({needed} needed, {remaining} remaining)")
            }
            Self::TimeExhausted {
                needed_ms,
                remaining_ms,
            } => write!(
                f,
                "time budget exhausted ({needed_ms}ms needed, {remaining_ms}ms remaining)"
            ),
            Self::CostExhausted { spent_usd, max_usd } => {
                write!(f, "cost budget exhausted (${spent_usd:.4} of ${max_usd:.4})")
            }
            Self::PassesExhausted { used, max } => {
                write!(f, "LLM pass budget exhausted ({used} of {max})")
            }
        }
    }
}

/// Outcome of a reservation check.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetDecision {
    Allow,
    Deny(DenyReason),
}

impl BudgetDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Tracks consumption against ceilings for a single request.
///
/// Owned exclusively by the orchestrator for the lifetime of one request;
/// a fresh tracker is created per request, so no state ever crosses
/// request boundaries.
#[derive(Debug)]
pub struct BudgetTracker {
    budget: Budget,
    started: Instant,
    usd_per_1k_tokens: f64,
}

impl BudgetTracker {
    /// Create a fresh tracker from the effective config. The wall clock
    /// starts now.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            budget: Budget {
                tokens_used: 0,
                tokens_max: config.token_budget,
                elapsed_ms: 0,
                timeout_ms: config.time_budget_ms,
                cost_usd: 0.0,
                cost_max_usd: config.cost_budget_usd,
                retries_used: 0,
                retries_max: config.max_llm_passes,
            },
            started: Instant::now(),
            usd_per_1k_tokens: config.usd_per_1k_tokens,
        }
    }

    /// Check whether an LLM pass with the given estimates fits within every
    /// remaining ceiling. Does not consume anything.
    pub fn reserve(&self, estimated_tokens: u32, estimated_ms: u64) -> BudgetDecision {
        let b = &self.budget;

        if b.retries_used >= b.retries_max {
            return BudgetDecision::Deny(DenyReason::PassesExhausted {
                used: b.retries_used,
                max: b.retries_max,
            });
        }

        let tokens_remaining = b.tokens_max.saturating_sub(b.tokens_used);
        if estimated_tokens > tokens_remaining {
            return BudgetDecision::Deny(DenyReason::TokensExhausted {
                needed: estimated_tokens,
                remaining: tokens_remaining,
            });
        }

        let elapsed_ms = self.elapsed_ms();
        let time_remaining = b.timeout_ms.saturating_sub(elapsed_ms);
        if estimated_ms > time_remaining {
            return BudgetDecision::Deny(DenyReason::TimeExhausted {
                needed_ms: estimated_ms,
                remaining_ms: time_remaining,
            });
        }

        // Project the pass's cost the same way tokens and time are
        // projected, so one pass cannot push spend past the ceiling.
        let estimated_cost = estimated_tokens as f64 / 1000.0 * self.usd_per_1k_tokens;
        if b.cost_usd >= b.cost_max_usd || b.cost_usd + estimated_cost > b.cost_max_usd {
            return BudgetDecision::Deny(DenyReason::CostExhausted {
                spent_usd: b.cost_usd,
                max_usd: b.cost_max_usd,
            });
        }

        BudgetDecision::Allow
    }

    /// Record one LLM pass attempt against the pass cap.
    pub fn record_pass(&mut self) {
        self.budget.retries_used += 1;
    }

    /// Commit actual consumption after a pass completes (or fails partway —
    /// spent tokens and time count either way).
    pub fn commit(&mut self, actual_tokens: u32, actual_ms: u64, actual_cost: f64) {
        self.budget.tokens_used = self.budget.tokens_used.saturating_add(actual_tokens);
        self.budget.elapsed_ms = self.budget.elapsed_ms.max(self.elapsed_ms()).max(actual_ms);
        self.budget.cost_usd += actual_cost.max(0.0);
    }

    /// Milliseconds remaining before the wall-clock ceiling. Used as the
    /// per-call timeout for LLM passes.
    pub fn remaining_ms(&self) -> u64 {
        self.budget.timeout_ms.saturating_sub(self.elapsed_ms())
    }

    /// A point-in-time snapshot with `elapsed_ms` refreshed.
    pub fn snapshot(&self) -> Budget {
        let mut snapshot = self.budget.clone();
        snapshot.elapsed_ms = snapshot.elapsed_ms.max(self.elapsed_ms());
        snapshot
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
