//! Integration tests for the full enrichment pipeline.
//!
//! Drives the orchestrator end to end with a scripted LLM provider,
//! validating the rule → gate → budget → escalate → fallback flow and the
//! audit trail it leaves behind.

use async_trait::async_trait;
use enrichment_pipeline::llm::adapter::{LlmClient, LlmFailure, PromptSpec, RawCompletion};
use enrichment_pipeline::{
    ClassificationRequest, Method, OutputAssembler, PassOrchestrator, PipelineConfig, Rule,
    RuleTable,
};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
});

/// One scripted provider behavior, consumed per call.
enum Step {
    /// Return a well-formed verdict.
    Verdict {
        label: &'static str,
        confidence: f64,
        tokens_in: u32,
        tokens_out: u32,
    },
    /// Fail with provider-unavailable.
    Unavailable,
    /// Return a body that fails verdict schema validation.
    Malformed,
    /// Never respond (forces the adapter's deadline to fire).
    Hang,
}

/// Scripted [`LlmClient`] that replays steps in order and counts calls.
struct ScriptedLlm {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
}

impl ScriptedLlm {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _prompt: &PromptSpec) -> Result<RawCompletion, LlmFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Verdict {
                label,
                confidence,
                tokens_in,
                tokens_out,
            }) => Ok(RawCompletion {
                body: format!(
                    "{{\"label\": \"{label}\", \"confidence\": {confidence}, \
                     \"reasoning\": \"scripted verdict\"}}"
                ),
                tokens_in,
                tokens_out,
            }),
            Some(Step::Unavailable) => Err(LlmFailure::Unavailable {
                message: "connection refused".to_string(),
            }),
            Some(Step::Malformed) => Ok(RawCompletion {
                body: "certainly! here is your classification".to_string(),
                tokens_in: 50,
                tokens_out: 10,
            }),
            Some(Step::Hang) | None => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(LlmFailure::Unavailable {
                    message: "woke after abandonment".to_string(),
                })
            }
        }
    }
}

/// Table where "how to ... step N" scores 0.9 and "alpha" alone scores 0.5.
fn table() -> RuleTable {
    RuleTable::new()
        .with_category(
            "how_to",
            vec![
                Rule::new(r"how to", 6.0, "instructional phrasing"),
                Rule::new(r"step \d+", 3.0, "numbered steps"),
            ],
        )
        .with_category("prd", vec![Rule::new(r"alpha", 1.0, "product vocabulary")])
}

fn llm_config() -> PipelineConfig {
    PipelineConfig {
        llm_enabled: true,
        ..Default::default()
    }
}

fn request(content: &str) -> ClassificationRequest {
    Lazy::force(&TRACING);
    ClassificationRequest::new(content).unwrap()
}

/// Twenty-feature PRD body with weak rule signal ("alpha").
fn big_prd() -> String {
    let mut content = String::from("Product requirements for project alpha\n");
    for i in 1..=20 {
        content.push_str(&format!("- feature {i}: does thing {i}\n"));
    }
    content
}

// ── Rule-based terminal path ───────────────────────────────────────────────

#[tokio::test]
async fn test_confident_rule_result_never_calls_llm() {
    let client = ScriptedLlm::new(vec![Step::Verdict {
        label: "how_to",
        confidence: 0.99,
        tokens_in: 100,
        tokens_out: 20,
    }]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator
        .run(&request("How to configure a firewall: step 1, open the console"))
        .await
        .unwrap();

    assert_eq!(outcome.method, Method::RuleBased);
    assert_eq!(outcome.final_label, "how_to");
    assert!((outcome.final_confidence - 0.9).abs() < 1e-9);
    assert_eq!(client.call_count(), 0, "no LLM call may occur");
    assert_eq!(outcome.budget_snapshot.tokens_used, 0);
}

#[tokio::test]
async fn test_repeated_runs_are_deterministic() {
    let orchestrator = PassOrchestrator::new(PipelineConfig::default(), table(), None).unwrap();
    let req = request("how to do a thing, step 1 then step 2");

    let first = orchestrator.run(&req).await.unwrap();
    let second = orchestrator.run(&req).await.unwrap();
    assert_eq!(first.final_label, second.final_label);
    assert_eq!(first.final_confidence, second.final_confidence);
    assert_eq!(first.method, second.method);
}

// ── STRICT mode ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_strict_mode_never_attempts_llm() {
    // Default config: llm_enabled = false.
    let orchestrator = PassOrchestrator::new(PipelineConfig::default(), table(), None).unwrap();

    let confident = orchestrator
        .run(&request("how to do it: step 1"))
        .await
        .unwrap();
    assert_eq!(confident.method, Method::RuleBased);

    let weak = orchestrator.run(&request("alpha only")).await.unwrap();
    assert_eq!(weak.method, Method::Fallback);
    assert_eq!(weak.final_label, "prd", "fallback keeps the rule label");
    assert_eq!(weak.llm_passes_attempted(), 0);
    assert!(weak.reasoning.contains("STRICT mode"));
}

// ── Escalation paths ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_low_confidence_escalates_and_accepts_pass1() {
    let client = ScriptedLlm::new(vec![Step::Verdict {
        label: "prd",
        confidence: 0.88,
        tokens_in: 400,
        tokens_out: 60,
    }]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    // "alpha" alone scores 1.0 → confidence 0.5 < 0.7.
    let outcome = orchestrator
        .run(&request("notes about alpha release"))
        .await
        .unwrap();

    assert_eq!(outcome.method, Method::LlmPass1);
    assert_eq!(outcome.final_label, "prd");
    assert_eq!(outcome.final_confidence, 0.88);
    assert_eq!(client.call_count(), 1);
    assert_eq!(outcome.passes.len(), 2);
    assert_eq!(outcome.tokens_in, 400);
    assert_eq!(outcome.budget_snapshot.tokens_used, 460);
    assert!(outcome.budget_snapshot.cost_usd > 0.0);
}

#[tokio::test]
async fn test_still_low_confidence_runs_second_pass_then_stops() {
    let client = ScriptedLlm::new(vec![
        Step::Verdict {
            label: "prd",
            confidence: 0.55,
            tokens_in: 300,
            tokens_out: 40,
        },
        Step::Verdict {
            label: "prd",
            confidence: 0.60, // still below threshold — but the cap is 2
            tokens_in: 300,
            tokens_out: 40,
        },
    ]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator.run(&request("alpha notes")).await.unwrap();

    assert_eq!(outcome.method, Method::LlmPass2);
    assert_eq!(client.call_count(), 2, "hard cap of 2 LLM passes");
    assert_eq!(outcome.llm_passes_attempted(), 2);
    assert_eq!(outcome.budget_snapshot.retries_used, 2);
}

#[tokio::test]
async fn test_feature_trigger_forces_second_pass_despite_confidence() {
    // Pass 1 comes back fully confident, but the 20-feature structural
    // trigger still fires for pass 2 (scope reduction axis).
    let client = ScriptedLlm::new(vec![
        Step::Verdict {
            label: "prd",
            confidence: 0.95,
            tokens_in: 300,
            tokens_out: 40,
        },
        Step::Verdict {
            label: "prd",
            confidence: 0.97,
            tokens_in: 300,
            tokens_out: 40,
        },
    ]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator.run(&request(&big_prd())).await.unwrap();

    assert_eq!(client.call_count(), 2);
    assert_eq!(outcome.method, Method::LlmPass2);
    assert_eq!(outcome.final_confidence, 0.97);
}

// ── Failure and fallback paths ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeout_then_retry_timeout_falls_back_to_rules() {
    let client = ScriptedLlm::new(vec![Step::Hang, Step::Hang]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator
        .run(&request("mixed signals about alpha"))
        .await
        .unwrap();

    assert_eq!(
        client.call_count(),
        2,
        "exactly one retry after the first timeout"
    );
    assert_eq!(outcome.method, Method::Fallback);
    assert_eq!(outcome.final_label, "prd");
    assert_eq!(outcome.final_confidence, 0.5, "confidence unchanged");
    assert!(outcome.reasoning.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_retry_stays_within_time_budget() {
    // A hung first attempt must not hand its retry a fresh full window:
    // the whole pass, retry included, stays under time_budget_ms.
    let client = ScriptedLlm::new(vec![Step::Hang, Step::Hang]);
    let config = PipelineConfig {
        time_budget_ms: 1000,
        ..llm_config()
    };
    let orchestrator = PassOrchestrator::new(config, table(), Some(client.clone())).unwrap();
    let started = tokio::time::Instant::now();

    let outcome = orchestrator
        .run(&request("mixed signals about alpha"))
        .await
        .unwrap();

    assert_eq!(outcome.method, Method::Fallback);
    assert_eq!(client.call_count(), 2);
    let elapsed = started.elapsed();
    assert!(
        elapsed <= std::time::Duration::from_millis(1001),
        "request consumed {elapsed:?} against a 1000ms time budget"
    );
}

#[tokio::test]
async fn test_unavailable_then_success_on_retry() {
    let client = ScriptedLlm::new(vec![
        Step::Unavailable,
        Step::Verdict {
            label: "prd",
            confidence: 0.9,
            tokens_in: 200,
            tokens_out: 30,
        },
    ]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator.run(&request("alpha draft")).await.unwrap();

    assert_eq!(client.call_count(), 2);
    assert_eq!(outcome.method, Method::LlmPass1);
    assert_eq!(outcome.final_label, "prd");
}

#[tokio::test]
async fn test_malformed_response_fails_pass_without_retry() {
    let client = ScriptedLlm::new(vec![
        Step::Malformed,
        Step::Verdict {
            label: "prd",
            confidence: 0.9,
            tokens_in: 200,
            tokens_out: 30,
        },
    ]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator.run(&request("alpha sketch")).await.unwrap();

    assert_eq!(client.call_count(), 1, "bad schema must not be retried");
    assert_eq!(outcome.method, Method::Fallback);
    assert_eq!(outcome.final_label, "prd");
    assert_eq!(outcome.final_confidence, 0.5);
}

#[tokio::test]
async fn test_zero_token_budget_immediate_fallback() {
    let client = ScriptedLlm::new(vec![]);
    let config = PipelineConfig {
        token_budget: 0,
        ..llm_config()
    };
    let orchestrator = PassOrchestrator::new(config, table(), Some(client.clone())).unwrap();

    let outcome = orchestrator.run(&request("alpha thoughts")).await.unwrap();

    assert_eq!(client.call_count(), 0);
    assert_eq!(outcome.method, Method::Fallback);
    assert_eq!(outcome.final_label, "prd", "label never null");
    assert_eq!(outcome.budget_snapshot.tokens_used, 0);
    assert_eq!(outcome.llm_passes_attempted(), 0);
    // The denied pass is still in the audit trail.
    assert!(outcome.passes.iter().any(|p| !p.budget_allowed));
}

#[tokio::test]
async fn test_pass2_budget_denial_keeps_pass1_result() {
    // Pass 1 succeeds but eats nearly the whole token budget; the gate
    // still wants a second pass, which budget denies — that is DONE with
    // the pass-1 verdict, not a fallback.
    let client = ScriptedLlm::new(vec![Step::Verdict {
        label: "prd",
        confidence: 0.55,
        tokens_in: 1800,
        tokens_out: 100,
    }]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client.clone())).unwrap();

    let outcome = orchestrator.run(&request("alpha outline")).await.unwrap();

    assert_eq!(client.call_count(), 1);
    assert_eq!(outcome.method, Method::LlmPass1);
    assert_eq!(outcome.final_label, "prd");
    assert_eq!(outcome.final_confidence, 0.55);
    assert_eq!(outcome.passes.len(), 3);
    assert!(!outcome.passes[2].budget_allowed);
}

// ── Invariants and envelope ────────────────────────────────────────────────

#[tokio::test]
async fn test_confidence_always_in_unit_interval() {
    // Provider returns an out-of-range confidence; the pipeline clamps.
    let client = ScriptedLlm::new(vec![Step::Verdict {
        label: "prd",
        confidence: 3.5,
        tokens_in: 100,
        tokens_out: 10,
    }]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client)).unwrap();

    let outcome = orchestrator.run(&request("alpha fragment")).await.unwrap();
    assert!((0.0..=1.0).contains(&outcome.final_confidence));
    assert_eq!(outcome.final_confidence, 1.0);
}

#[tokio::test]
async fn test_pass_records_are_ordered_and_sealed() {
    let client = ScriptedLlm::new(vec![
        Step::Verdict {
            label: "prd",
            confidence: 0.55,
            tokens_in: 300,
            tokens_out: 40,
        },
        Step::Verdict {
            label: "prd",
            confidence: 0.92,
            tokens_in: 300,
            tokens_out: 40,
        },
    ]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client)).unwrap();

    let outcome = orchestrator.run(&request("alpha material")).await.unwrap();

    let ids: Vec<u32> = outcome.passes.iter().map(|p| p.pass_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(outcome.passes[0].method, Method::RuleBased);
    assert_eq!(outcome.passes[1].method, Method::LlmPass1);
    assert_eq!(outcome.passes[2].method, Method::LlmPass2);
}

#[tokio::test]
async fn test_envelope_carries_cost_and_provenance() {
    let client = ScriptedLlm::new(vec![Step::Verdict {
        label: "prd",
        confidence: 0.9,
        tokens_in: 500,
        tokens_out: 80,
    }]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client)).unwrap();

    let outcome = orchestrator.run(&request("alpha summary")).await.unwrap();
    let envelope = OutputAssembler::assemble(&outcome);

    assert_eq!(envelope.method, Method::LlmPass1);
    assert_eq!(envelope.cost.tokens_in, 500);
    assert_eq!(envelope.cost.tokens_out, 80);
    assert!(envelope.cost.usd > 0.0);
    assert_eq!(envelope.passes.len(), 2);

    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["method"], "llm_pass1");
    assert_eq!(json["cost"]["tokens_in"], 500);
}

#[tokio::test]
async fn test_fresh_budget_per_request() {
    // Two sequential requests through one orchestrator: the second starts
    // with a clean budget regardless of what the first consumed.
    let client = ScriptedLlm::new(vec![
        Step::Verdict {
            label: "prd",
            confidence: 0.9,
            tokens_in: 1900,
            tokens_out: 90,
        },
        Step::Verdict {
            label: "prd",
            confidence: 0.9,
            tokens_in: 100,
            tokens_out: 10,
        },
    ]);
    let orchestrator = PassOrchestrator::new(llm_config(), table(), Some(client)).unwrap();

    let first = orchestrator.run(&request("alpha one")).await.unwrap();
    assert_eq!(first.budget_snapshot.tokens_used, 1990);

    let second = orchestrator.run(&request("alpha two")).await.unwrap();
    assert_eq!(second.budget_snapshot.tokens_used, 110);
    assert_eq!(second.method, Method::LlmPass1);
}
