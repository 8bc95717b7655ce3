//! End-to-end tests for the build pipeline
//!
//! Every collaborator is a deterministic stub with call counters, so these
//! tests pin down the control-flow contract: how many times the gate runs,
//! which mutations land between attempts, and what the terminal outcomes
//! carry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use foundry_core::collaborators::{
    AgentProbe, ArtifactEmitter, ArtifactRecord, ConfigBuilder, IntentExtractor, ModelAdvisor,
    QuestionGenerator, ResponseScorer, ScoredAnswer,
};
use foundry_core::config::{
    AgentConfiguration, Complexity, ConfigMetadata, ModelParams, StructuredIntent,
};
use foundry_core::error::{FoundryError, Stage, ValidationError};
use foundry_core::orchestrator::{Orchestrator, Outcome};
use foundry_core::quality::{ProbeQuestion, Verdict};
use foundry_core::retry::MutationStrategy;
use foundry_core::Result;

/// Per-attempt quality shape the scripted scorer produces
#[derive(Clone, Copy)]
enum AttemptShape {
    /// Every probe wrong with weak scores: rejected on both clauses
    AllWrong,
    /// 3/5 correct, mean score 0.72: accepted (variance 0.24)
    Frontier,
}

struct Script {
    shapes: Vec<AttemptShape>,
    // generator call count doubles as the current attempt index
    generations: AtomicUsize,
}

impl Script {
    fn new(shapes: Vec<AttemptShape>) -> Arc<Self> {
        Arc::new(Self {
            shapes,
            generations: AtomicUsize::new(0),
        })
    }

    fn current_shape(&self) -> AttemptShape {
        let attempt = self.generations.load(Ordering::SeqCst).saturating_sub(1);
        self.shapes
            .get(attempt)
            .copied()
            .unwrap_or(AttemptShape::AllWrong)
    }
}

struct StubExtractor {
    calls: AtomicUsize,
    fail: bool,
}

impl StubExtractor {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }
}

#[async_trait]
impl IntentExtractor for StubExtractor {
    async fn extract(&self, _instruction: &str) -> Result<StructuredIntent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FoundryError::upstream(
                Stage::IntentExtraction,
                "unparseable model output",
            ));
        }
        Ok(StructuredIntent {
            role: "data_analyst".to_string(),
            capabilities: vec!["csv_processing".to_string(), "statistics".to_string()],
            constraints: vec!["must_use_python".to_string()],
            success_criteria: "Accurate statistical summaries".to_string(),
            complexity: Complexity::Medium,
            tokens_used: 150,
        })
    }
}

struct StubBuilder {
    calls: AtomicUsize,
}

impl StubBuilder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ConfigBuilder for StubBuilder {
    async fn build(&self, intent: &StructuredIntent) -> Result<AgentConfiguration> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut metadata = ConfigMetadata::default();
        metadata.record_stage("intent-extraction");
        metadata.record_stage("config-assembly");
        metadata.add_usage(intent.tokens_used, 0.0);
        Ok(AgentConfiguration {
            agent_id: Uuid::new_v4(),
            role: intent.role.clone(),
            capabilities: intent.capabilities.clone(),
            constraints: intent.constraints.clone(),
            instruction_template: format!("You are a {}.", intent.role),
            model: None,
            success_criteria: intent.success_criteria.clone(),
            metadata,
        })
    }
}

struct StubAdvisor {
    calls: AtomicUsize,
}

impl StubAdvisor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelAdvisor for StubAdvisor {
    async fn recommend(&self, _config: &AgentConfiguration) -> Result<ModelParams> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelParams {
            model_name: "gemini-2.0-flash".to_string(),
            context_window: 32_768,
            temperature: 0.4,
            estimated_cost_per_1k: 0.0002,
            reasoning: "medium complexity, cost-sensitive".to_string(),
        })
    }
}

struct ScriptedGenerator {
    script: Arc<Script>,
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(&self, _config: &AgentConfiguration) -> Result<Vec<ProbeQuestion>> {
        self.script.generations.fetch_add(1, Ordering::SeqCst);
        Ok([0.3, 0.35, 0.55, 0.7, 0.85]
            .iter()
            .enumerate()
            .map(|(i, &d)| ProbeQuestion {
                prompt: format!("probe {}", i + 1),
                difficulty: d,
                expected_answer: "reference".to_string(),
                tests_capability: None,
            })
            .collect())
    }
}

struct StubProbe;

#[async_trait]
impl AgentProbe for StubProbe {
    async fn answer(
        &self,
        _config: &AgentConfiguration,
        question: &ProbeQuestion,
    ) -> Result<String> {
        Ok(format!("answer to {}", question.prompt))
    }
}

struct ScriptedScorer {
    script: Arc<Script>,
}

#[async_trait]
impl ResponseScorer for ScriptedScorer {
    async fn score(&self, question: &ProbeQuestion, _answer: &str) -> Result<ScoredAnswer> {
        match self.script.current_shape() {
            AttemptShape::AllWrong => Ok(ScoredAnswer {
                correct: false,
                score: 0.2,
            }),
            AttemptShape::Frontier => Ok(ScoredAnswer {
                correct: question.difficulty <= 0.6,
                score: 0.72,
            }),
        }
    }
}

struct CountingEmitter {
    calls: AtomicUsize,
}

impl CountingEmitter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ArtifactEmitter for CountingEmitter {
    async fn emit(
        &self,
        config: &AgentConfiguration,
        _verdict: &Verdict,
    ) -> Result<ArtifactRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ArtifactRecord {
            location: format!("agents/{}/{}.json", config.role, config.agent_id).into(),
            registration_id: Uuid::new_v4(),
            content_hash: "stub".to_string(),
            registered_at: chrono::Utc::now(),
        })
    }
}

struct Rig {
    extractor: Arc<StubExtractor>,
    builder: Arc<StubBuilder>,
    advisor: Arc<StubAdvisor>,
    script: Arc<Script>,
    emitter: Arc<CountingEmitter>,
    orchestrator: Orchestrator,
}

fn rig(shapes: Vec<AttemptShape>) -> Rig {
    rig_with_extractor(StubExtractor::ok(), shapes)
}

fn rig_with_extractor(extractor: Arc<StubExtractor>, shapes: Vec<AttemptShape>) -> Rig {
    let builder = StubBuilder::new();
    let advisor = StubAdvisor::new();
    let script = Script::new(shapes);
    let emitter = CountingEmitter::new();

    let orchestrator = Orchestrator::new(
        extractor.clone(),
        builder.clone(),
        advisor.clone(),
        Arc::new(ScriptedGenerator {
            script: script.clone(),
        }),
        Arc::new(StubProbe),
        Arc::new(ScriptedScorer {
            script: script.clone(),
        }),
        emitter.clone(),
    );

    Rig {
        extractor,
        builder,
        advisor,
        script,
        emitter,
        orchestrator,
    }
}

const INSTRUCTION: &str = "Create a data analyst agent that can process CSV files";

#[tokio::test]
async fn first_attempt_acceptance() {
    let rig = rig(vec![AttemptShape::Frontier]);

    let outcome = rig.orchestrator.build(INSTRUCTION).await.unwrap();

    match outcome {
        Outcome::Accepted {
            verdict, attempts, ..
        } => {
            assert_eq!(attempts.len(), 1);
            assert_eq!(attempts[0].mutation, None);
            assert_eq!(verdict.pass_rate, 0.6);
            assert!((verdict.average_score - 0.72).abs() < 1e-12);
            assert!((verdict.variance - 0.24).abs() < 1e-12);
        }
        other => panic!("expected acceptance, got {other:?}"),
    }

    assert_eq!(rig.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.builder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.advisor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.script.generations.load(Ordering::SeqCst), 1);
    assert_eq!(rig.emitter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn report_surface_carries_the_quality_figures() {
    let rig = rig(vec![AttemptShape::Frontier]);

    let outcome = rig.orchestrator.build(INSTRUCTION).await.unwrap();
    let report = outcome.report();

    assert!(report.success);
    assert_eq!(report.role.as_deref(), Some("data_analyst"));
    assert_eq!(report.attempts, 1);
    assert_eq!(report.variance, Some(0.24));
    assert!(report.artifact_location.is_some());
    assert!(report.registration_id.is_some());
}

#[tokio::test]
async fn acceptance_on_second_attempt_applies_instruction_refinement() {
    let rig = rig(vec![AttemptShape::AllWrong, AttemptShape::Frontier]);

    let outcome = rig.orchestrator.build(INSTRUCTION).await.unwrap();

    match outcome {
        Outcome::Accepted { attempts, .. } => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(
                attempts[0].mutation,
                Some(MutationStrategy::RefineInstructions)
            );
            assert_eq!(attempts[1].mutation, None);

            // first mutation rewrites the template and nothing else
            assert_ne!(
                attempts[0].configuration.instruction_template,
                attempts[1].configuration.instruction_template
            );
            assert_eq!(
                attempts[0].configuration.capabilities,
                attempts[1].configuration.capabilities
            );
            assert_eq!(
                attempts[0].configuration.constraints,
                attempts[1].configuration.constraints
            );
            assert_eq!(
                attempts[0].configuration.agent_id,
                attempts[1].configuration.agent_id
            );
        }
        other => panic!("expected acceptance, got {other:?}"),
    }

    assert_eq!(rig.script.generations.load(Ordering::SeqCst), 2);
    assert_eq!(rig.emitter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhaustion_escalates_with_three_records() {
    let rig = rig(vec![
        AttemptShape::AllWrong,
        AttemptShape::AllWrong,
        AttemptShape::AllWrong,
    ]);

    let outcome = rig.orchestrator.build(INSTRUCTION).await.unwrap();

    match outcome {
        Outcome::Escalated {
            attempts,
            rationale,
        } => {
            assert_eq!(attempts.len(), 3);
            assert_eq!(
                attempts[0].mutation,
                Some(MutationStrategy::RefineInstructions)
            );
            assert_eq!(
                attempts[1].mutation,
                Some(MutationStrategy::ReviseCapabilities)
            );
            assert_eq!(attempts[2].mutation, None);

            // the second mutation widened the capability set
            assert!(attempts[2]
                .configuration
                .capabilities
                .contains(&"adaptive_reasoning".to_string()));

            assert!(rationale.contains("rejected 3 attempt(s)"));
            assert!(rationale.contains("Advisory"));
        }
        other => panic!("expected escalation, got {other:?}"),
    }

    // exactly 3 gate invocations, one emitter call never happened
    assert_eq!(rig.script.generations.load(Ordering::SeqCst), 3);
    assert_eq!(rig.emitter.calls.load(Ordering::SeqCst), 0);

    // upstream stages ran once each regardless of the retries
    assert_eq!(rig.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.advisor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn short_and_long_instructions_are_rejected_without_any_calls() {
    for bad in ["123456789".to_string(), "x".repeat(5001)] {
        let rig = rig(vec![AttemptShape::Frontier]);
        let outcome = rig.orchestrator.build(&bad).await.unwrap();

        match outcome {
            Outcome::Rejected { error } => match bad.len() {
                9 => assert!(matches!(error, ValidationError::InstructionTooShort { .. })),
                _ => assert!(matches!(error, ValidationError::InstructionTooLong { .. })),
            },
            other => panic!("expected rejection, got {other:?}"),
        }

        assert_eq!(rig.extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.builder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.advisor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rig.script.generations.load(Ordering::SeqCst), 0);
        assert_eq!(rig.emitter.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn boundary_lengths_proceed_past_validation() {
    for good in ["1234567890".to_string(), "x".repeat(5000)] {
        let rig = rig(vec![AttemptShape::Frontier]);
        let outcome = rig.orchestrator.build(&good).await.unwrap();
        assert!(matches!(outcome, Outcome::Accepted { .. }));
        assert_eq!(rig.extractor.calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn upstream_extraction_failure_is_fatal_and_attributed() {
    let rig = rig_with_extractor(StubExtractor::failing(), vec![AttemptShape::Frontier]);

    let err = rig.orchestrator.build(INSTRUCTION).await.unwrap_err();

    match err {
        FoundryError::Upstream { stage, .. } => assert_eq!(stage, Stage::IntentExtraction),
        other => panic!("expected upstream failure, got {other:?}"),
    }

    // nothing downstream ran, and no quality budget was spent
    assert_eq!(rig.builder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(rig.script.generations.load(Ordering::SeqCst), 0);
    assert_eq!(rig.emitter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pre_cancelled_build_makes_no_calls() {
    let rig = rig(vec![AttemptShape::Frontier]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = rig
        .orchestrator
        .build_with_cancel(INSTRUCTION, cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FoundryError::Cancelled));
    assert_eq!(rig.extractor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(rig.emitter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provenance_trail_records_each_quality_attempt() {
    let rig = rig(vec![
        AttemptShape::AllWrong,
        AttemptShape::AllWrong,
        AttemptShape::AllWrong,
    ]);

    let outcome = rig.orchestrator.build(INSTRUCTION).await.unwrap();

    let Outcome::Escalated { attempts, .. } = outcome else {
        panic!("expected escalation");
    };

    let stages = &attempts[2].configuration.metadata.stages;
    for expected in [
        "intent-extraction",
        "config-assembly",
        "model-selection",
        "qa-attempt-1",
        "qa-attempt-2",
        "qa-attempt-3",
    ] {
        assert_eq!(
            stages.iter().filter(|s| s.as_str() == expected).count(),
            1,
            "stage {expected} should appear exactly once in {stages:?}"
        );
    }
}
