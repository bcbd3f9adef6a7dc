//! Confidence-gated, budget-bounded enrichment pipeline.
//!
//! Turns unstructured text into a structured verdict: a deterministic
//! rule-based pass first, then up to two LLM passes — only when confidence
//! is low or a structural trigger fires, only when budget allows — and a
//! network-free fallback to the last good result on any failure.
//!
//! # Control flow
//!
//! ```text
//! input → RuleEngine → ConfidenceGate ──no──→ OutputAssembler
//!                           │yes
//!                    BudgetTracker.reserve ──deny──→ FallbackResolver
//!                           │allow
//!                       LLMAdapter ──fail──→ FallbackResolver
//!                           │ok
//!                    ConfidenceGate (pass 2, same rules) → OutputAssembler
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use enrichment_pipeline::{
//!     ClassificationRequest, OutputAssembler, PassOrchestrator, PipelineConfig, Rule, RuleTable,
//! };
//!
//! let table = RuleTable::new()
//!     .with_category("how_to", vec![Rule::new(r"how to", 6.0, "instructional phrasing")]);
//! let orchestrator = PassOrchestrator::new(PipelineConfig::from_env(), table, None)?;
//!
//! let request = ClassificationRequest::new("How to configure a firewall: step 1 ...")?;
//! let outcome = orchestrator.run(&request).await?;
//! let envelope = OutputAssembler::assemble(&outcome);
//! ```
//!
//! Budgets and pass records are created fresh inside each `run` call and
//! never shared across requests; there is no process-wide mutable state.

pub mod assembler;
pub mod budget;
pub mod config;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod llm;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod rules;

// Re-export the pipeline surface.
pub use assembler::{CostSummary, OutputAssembler, ResponseEnvelope};
pub use budget::{Budget, BudgetDecision, BudgetTracker, DenyReason};
pub use config::{ConfigOverrides, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use fallback::{Candidate, FallbackResolver};
pub use gate::{ConfidenceGate, EscalationTrigger, TriggerConfig, TriggerSignals};
pub use llm::{
    HttpEndpoint, HttpLlmClient, LlmAdapter, LlmClient, LlmFailure, LlmPassResult, PromptSpec,
};
pub use orchestrator::PassOrchestrator;
pub use outcome::{Method, PassOutcome, PassRecord, PipelineOutcome};
pub use request::{ClassificationRequest, Urgency};
pub use rules::{Rule, RuleCategory, RuleEngine, RuleResult, RuleTable};
