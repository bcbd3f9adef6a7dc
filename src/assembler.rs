//! Output Assembler — merges the final result and provenance into the
//! response envelope. Pure formatting, no business logic.

use crate::outcome::{Method, PassRecord, PipelineOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token and dollar cost of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd: f64,
}

/// The envelope consumed by the CLI/output layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: Uuid,
    pub method: Method,
    pub final_label: String,
    pub final_confidence: f64,
    pub reasoning: String,
    pub passes: Vec<PassRecord>,
    pub cost: CostSummary,
    pub elapsed_ms: u64,
}

/// The Output Assembler.
pub struct OutputAssembler;

impl OutputAssembler {
    /// Assemble the response envelope from a sealed outcome.
    pub fn assemble(outcome: &PipelineOutcome) -> ResponseEnvelope {
        ResponseEnvelope {
            request_id: outcome.request_id,
            method: outcome.method,
            final_label: outcome.final_label.clone(),
            final_confidence: outcome.final_confidence,
            reasoning: outcome.reasoning.clone(),
            passes: outcome.passes.clone(),
            cost: CostSummary {
                tokens_in: outcome.tokens_in,
                tokens_out: outcome.tokens_out,
                usd: outcome.budget_snapshot.cost_usd,
            },
            elapsed_ms: outcome.budget_snapshot.elapsed_ms,
        }
    }
}
