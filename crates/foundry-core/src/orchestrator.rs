//! Build orchestration - from raw instruction to accepted agent or escalation
//!
//! The orchestrator drives the pipeline: intent extraction, configuration
//! assembly and model selection run exactly once each, then the quality
//! gate and retry planner loop for at most three attempts. Acceptance hands
//! off to the artifact emitter; exhaustion returns a structured escalation
//! carrying the full attempt history so a human can take over. The loop is
//! an explicit four-state machine with a bounded counter; there is no
//! hidden recursion and no unbounded iteration.
//!
//! Negative outcomes are data, not exceptions: validation rejections and
//! escalations come back inside [`Outcome`]. The error channel is reserved
//! for upstream collaborator failures and cancellation.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborators::{
    AgentProbe, ArtifactEmitter, ArtifactRecord, ConfigBuilder, IntentExtractor, ModelAdvisor,
    QuestionGenerator, ResponseScorer,
};
use crate::config::AgentConfiguration;
use crate::error::{FoundryError, Result, Stage, ValidationError};
use crate::quality::{QualityGate, Verdict};
use crate::retry::{MutationStrategy, RetryPlanner};

/// Maximum quality attempts per build
pub const MAX_QA_ATTEMPTS: u32 = 3;

/// Minimum instruction length in characters (after trimming)
pub const MIN_INSTRUCTION_CHARS: usize = 10;

/// Maximum instruction length in characters
pub const MAX_INSTRUCTION_CHARS: usize = 5000;

/// One entry of the audit trail: the configuration snapshot used for an
/// attempt, its verdict, and the mutation applied before the next attempt
/// (absent on the final one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt index
    pub attempt: u32,

    /// Configuration the quality gate evaluated
    pub configuration: AgentConfiguration,

    /// The gate's judgment for this attempt
    pub verdict: Verdict,

    /// Strategy applied before the next attempt, if there was one
    pub mutation: Option<MutationStrategy>,
}

/// Terminal result of one build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Outcome {
    /// The agent passed the quality gate and was persisted
    Accepted {
        configuration: AgentConfiguration,
        verdict: Verdict,
        artifact: ArtifactRecord,
        attempts: Vec<AttemptRecord>,
    },

    /// Every attempt was rejected; a human has to review
    Escalated {
        attempts: Vec<AttemptRecord>,
        rationale: String,
    },

    /// The instruction failed pre-flight validation; nothing was called
    Rejected { error: ValidationError },
}

/// Flat, serializable summary of a build for callers and the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub success: bool,
    pub agent_id: Option<Uuid>,
    pub role: Option<String>,
    pub capabilities: Vec<String>,
    pub artifact_location: Option<PathBuf>,
    pub registration_id: Option<Uuid>,
    pub attempts: u32,
    pub average_score: Option<f64>,
    pub variance: Option<f64>,
    pub rationale: String,
}

impl Outcome {
    /// Flatten the outcome into the observable report surface
    pub fn report(&self) -> BuildReport {
        match self {
            Outcome::Accepted {
                configuration,
                verdict,
                artifact,
                attempts,
            } => BuildReport {
                success: true,
                agent_id: Some(configuration.agent_id),
                role: Some(configuration.role.clone()),
                capabilities: configuration.capabilities.clone(),
                artifact_location: Some(artifact.location.clone()),
                registration_id: Some(artifact.registration_id),
                attempts: attempts.len() as u32,
                average_score: Some(verdict.average_score),
                variance: Some(verdict.variance),
                rationale: verdict.rationale.clone(),
            },
            Outcome::Escalated { attempts, rationale } => {
                let last = attempts.last();
                BuildReport {
                    success: false,
                    agent_id: last.map(|r| r.configuration.agent_id),
                    role: last.map(|r| r.configuration.role.clone()),
                    capabilities: last
                        .map(|r| r.configuration.capabilities.clone())
                        .unwrap_or_default(),
                    artifact_location: None,
                    registration_id: None,
                    attempts: attempts.len() as u32,
                    average_score: last.map(|r| r.verdict.average_score),
                    variance: last.map(|r| r.verdict.variance),
                    rationale: rationale.clone(),
                }
            }
            Outcome::Rejected { error } => BuildReport {
                success: false,
                agent_id: None,
                role: None,
                capabilities: Vec::new(),
                artifact_location: None,
                registration_id: None,
                attempts: 0,
                average_score: None,
                variance: None,
                rationale: error.to_string(),
            },
        }
    }
}

/// Retry-loop states
enum LoopState {
    /// Evaluate the current configuration
    AwaitQa,
    /// A rejection with attempts left: mutate and go again
    Mutate(Verdict),
    /// Terminal: emit the artifact
    Accepted(Verdict),
    /// Terminal: hand off to human review
    Escalated,
}

/// Drives one agent build from instruction to terminal outcome.
///
/// The orchestrator owns the single configuration value and its mutation
/// lineage; collaborators only ever see immutable borrows.
pub struct Orchestrator {
    intent_extractor: Arc<dyn IntentExtractor>,
    config_builder: Arc<dyn ConfigBuilder>,
    model_advisor: Arc<dyn ModelAdvisor>,
    quality_gate: QualityGate,
    retry_planner: RetryPlanner,
    artifact_emitter: Arc<dyn ArtifactEmitter>,
    max_attempts: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intent_extractor: Arc<dyn IntentExtractor>,
        config_builder: Arc<dyn ConfigBuilder>,
        model_advisor: Arc<dyn ModelAdvisor>,
        question_generator: Arc<dyn QuestionGenerator>,
        agent_probe: Arc<dyn AgentProbe>,
        response_scorer: Arc<dyn ResponseScorer>,
        artifact_emitter: Arc<dyn ArtifactEmitter>,
    ) -> Self {
        Self {
            intent_extractor,
            config_builder,
            model_advisor,
            quality_gate: QualityGate::new(question_generator, agent_probe, response_scorer),
            retry_planner: RetryPlanner,
            artifact_emitter,
            max_attempts: MAX_QA_ATTEMPTS,
        }
    }

    /// Override the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Build an agent from a natural-language instruction
    pub async fn build(&self, instruction: &str) -> Result<Outcome> {
        self.build_with_cancel(instruction, CancellationToken::new())
            .await
    }

    /// Build with an external cancellation signal, checked between stages
    /// and between probe calls
    pub async fn build_with_cancel(
        &self,
        instruction: &str,
        cancel: CancellationToken,
    ) -> Result<Outcome> {
        // Fail fast: no collaborator is invoked for an invalid instruction.
        if let Err(error) = validate_instruction(instruction) {
            tracing::warn!(%error, "instruction rejected before any stage ran");
            return Ok(Outcome::Rejected { error });
        }

        tracing::info!(chars = instruction.chars().count(), "build started");

        self.ensure_live(&cancel)?;
        let intent = self
            .intent_extractor
            .extract(instruction)
            .await
            .map_err(|e| e.at_stage(Stage::IntentExtraction))?;
        tracing::info!(role = %intent.role, complexity = ?intent.complexity, "intent extracted");

        self.ensure_live(&cancel)?;
        let mut config = self
            .config_builder
            .build(&intent)
            .await
            .map_err(|e| e.at_stage(Stage::ConfigAssembly))?;

        self.ensure_live(&cancel)?;
        let params = self
            .model_advisor
            .recommend(&config)
            .await
            .map_err(|e| e.at_stage(Stage::ModelSelection))?;
        tracing::info!(model = %params.model_name, "model selected");
        config.model = Some(params);
        config.metadata.record_stage("model-selection");

        self.run_quality_loop(config, &cancel).await
    }

    /// The bounded retry loop: at most `max_attempts` gate evaluations,
    /// one mutation between consecutive attempts, full history on exit.
    async fn run_quality_loop(
        &self,
        initial: AgentConfiguration,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut current = initial;
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut attempt: u32 = 1;
        let mut state = LoopState::AwaitQa;

        loop {
            state = match state {
                LoopState::AwaitQa => {
                    self.ensure_live(cancel)?;
                    current
                        .metadata
                        .record_stage(format!("qa-attempt-{attempt}"));
                    let verdict = self.quality_gate.evaluate(&current, cancel).await?;

                    if verdict.accepted {
                        LoopState::Accepted(verdict)
                    } else if attempt < self.max_attempts {
                        LoopState::Mutate(verdict)
                    } else {
                        attempts.push(AttemptRecord {
                            attempt,
                            configuration: current.clone(),
                            verdict,
                            mutation: None,
                        });
                        LoopState::Escalated
                    }
                }

                LoopState::Mutate(verdict) => {
                    let (next, strategy) = self.retry_planner.adjust(&current, attempt, &verdict);
                    attempts.push(AttemptRecord {
                        attempt,
                        configuration: current,
                        verdict,
                        mutation: Some(strategy),
                    });
                    current = next;
                    attempt += 1;
                    LoopState::AwaitQa
                }

                LoopState::Accepted(verdict) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        configuration: current.clone(),
                        verdict: verdict.clone(),
                        mutation: None,
                    });

                    self.ensure_live(cancel)?;
                    let artifact = self
                        .artifact_emitter
                        .emit(&current, &verdict)
                        .await
                        .map_err(|e| e.at_stage(Stage::ArtifactEmission))?;

                    tracing::info!(
                        agent_id = %current.agent_id,
                        location = %artifact.location.display(),
                        attempts = attempts.len(),
                        "build accepted"
                    );

                    return Ok(Outcome::Accepted {
                        configuration: current,
                        verdict,
                        artifact,
                        attempts,
                    });
                }

                LoopState::Escalated => {
                    let rationale = escalation_rationale(&attempts);
                    tracing::warn!(attempts = attempts.len(), %rationale, "build escalated");
                    return Ok(Outcome::Escalated { attempts, rationale });
                }
            };
        }
    }

    fn ensure_live(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(FoundryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Pre-flight instruction checks. Runs before any collaborator call.
pub fn validate_instruction(instruction: &str) -> std::result::Result<(), ValidationError> {
    if instruction.trim().is_empty() {
        return Err(ValidationError::EmptyInstruction);
    }
    let trimmed_len = instruction.trim().chars().count();
    if trimmed_len < MIN_INSTRUCTION_CHARS {
        return Err(ValidationError::InstructionTooShort {
            length: trimmed_len,
            minimum: MIN_INSTRUCTION_CHARS,
        });
    }
    let len = instruction.chars().count();
    if len > MAX_INSTRUCTION_CHARS {
        return Err(ValidationError::InstructionTooLong {
            length: len,
            maximum: MAX_INSTRUCTION_CHARS,
        });
    }
    Ok(())
}

/// Summarize an exhausted build for the human reviewer. The advisory at the
/// end is text only; it is never applied to the configuration.
fn escalation_rationale(attempts: &[AttemptRecord]) -> String {
    let advisory = match attempts.last() {
        Some(last) if last.verdict.pass_rate >= 1.0 => {
            "the probe set never challenged the agent; consider increasing task \
             complexity or probe difficulty before rebuilding"
        }
        _ => {
            "consider simplifying the request or providing more specific \
             instructions before rebuilding"
        }
    };

    match attempts.last() {
        Some(last) => format!(
            "quality gate rejected {} attempt(s); last failure: {}. Advisory: {advisory}",
            attempts.len(),
            last.verdict.rationale
        ),
        None => format!("quality gate produced no attempts. Advisory: {advisory}"),
    }
}
