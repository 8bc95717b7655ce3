//! The quality gate - generate probes, collect answers, compute the verdict
//!
//! One gate evaluation is one quality attempt: it owns its questions and
//! results for the duration of that attempt and retains nothing afterwards.
//! Question generation is the only step with an internal retry: a malformed
//! set is regenerated up to a small fixed bound before the whole attempt
//! fails upstream. Probe answering and scoring run concurrently per
//! question; there is no cross-question state.

use std::sync::Arc;

use futures::future;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{AgentProbe, QuestionGenerator, ResponseScorer};
use crate::config::AgentConfiguration;
use crate::error::{FoundryError, Result, Stage};
use crate::quality::{DifficultyBand, ProbeQuestion, ProbeResult, Verdict, PROBE_COUNT};

/// Additional generation calls allowed after the first malformed set
const GENERATION_RETRIES: u32 = 2;

/// Evaluates a candidate configuration and produces a verdict
pub struct QualityGate {
    generator: Arc<dyn QuestionGenerator>,
    probe: Arc<dyn AgentProbe>,
    scorer: Arc<dyn ResponseScorer>,
    generation_retries: u32,
}

impl QualityGate {
    pub fn new(
        generator: Arc<dyn QuestionGenerator>,
        probe: Arc<dyn AgentProbe>,
        scorer: Arc<dyn ResponseScorer>,
    ) -> Self {
        Self {
            generator,
            probe,
            scorer,
            generation_retries: GENERATION_RETRIES,
        }
    }

    /// Override the generation retry bound
    pub fn with_generation_retries(mut self, retries: u32) -> Self {
        self.generation_retries = retries;
        self
    }

    /// Run one quality attempt against the configuration
    pub async fn evaluate(
        &self,
        config: &AgentConfiguration,
        cancel: &CancellationToken,
    ) -> Result<Verdict> {
        let questions = self.generate_questions(config, cancel).await?;

        let probes = questions.iter().map(|question| async {
            if cancel.is_cancelled() {
                return Err(FoundryError::Cancelled);
            }
            let answer = self
                .probe
                .answer(config, question)
                .await
                .map_err(|e| e.at_stage(Stage::AgentProbe))?;
            let scored = self
                .scorer
                .score(question, &answer)
                .await
                .map_err(|e| e.at_stage(Stage::ResponseScoring))?;
            Ok(ProbeResult::new(question, answer, scored.correct, scored.score))
        });

        let results = future::try_join_all(probes).await?;
        let verdict = Verdict::from_results(results);

        tracing::info!(
            agent_id = %config.agent_id,
            accepted = verdict.accepted,
            average_score = verdict.average_score,
            variance = verdict.variance,
            "quality attempt evaluated"
        );

        Ok(verdict)
    }

    /// Obtain a valid probe set, regenerating on malformed output
    async fn generate_questions(
        &self,
        config: &AgentConfiguration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProbeQuestion>> {
        let mut last_issue = String::new();

        for call in 1..=(1 + self.generation_retries) {
            if cancel.is_cancelled() {
                return Err(FoundryError::Cancelled);
            }

            match self.generator.generate(config).await {
                Ok(questions) => match validate_question_set(&questions) {
                    Ok(()) => return Ok(questions),
                    Err(issue) => {
                        tracing::warn!(call, %issue, "malformed probe set, regenerating");
                        last_issue = issue;
                    }
                },
                Err(FoundryError::Cancelled) => return Err(FoundryError::Cancelled),
                Err(e) => {
                    tracing::warn!(call, error = %e, "question generation failed, retrying");
                    last_issue = e.to_string();
                }
            }
        }

        Err(FoundryError::upstream(
            Stage::QuestionGeneration,
            format!(
                "no valid probe set after {} generation calls: {last_issue}",
                1 + self.generation_retries
            ),
        ))
    }
}

/// Check that a generated set has exactly the expected shape:
/// the fixed probe count, sane fields, and all three difficulty bands.
pub fn validate_question_set(questions: &[ProbeQuestion]) -> std::result::Result<(), String> {
    if questions.len() != PROBE_COUNT {
        return Err(format!(
            "expected {PROBE_COUNT} questions, got {}",
            questions.len()
        ));
    }

    let mut bands = Vec::with_capacity(questions.len());
    for (i, q) in questions.iter().enumerate() {
        if q.prompt.trim().is_empty() {
            return Err(format!("question {} has an empty prompt", i + 1));
        }
        if q.expected_answer.trim().is_empty() {
            return Err(format!("question {} has no expected answer", i + 1));
        }
        if !q.difficulty.is_finite() || !(0.0..=1.0).contains(&q.difficulty) {
            return Err(format!(
                "question {} difficulty {} outside [0, 1]",
                i + 1,
                q.difficulty
            ));
        }
        match DifficultyBand::classify(q.difficulty) {
            Some(band) => bands.push(band),
            None => {
                return Err(format!(
                    "question {} difficulty {} falls outside every band",
                    i + 1,
                    q.difficulty
                ))
            }
        }
    }

    for band in [
        DifficultyBand::Easy,
        DifficultyBand::Medium,
        DifficultyBand::Hard,
    ] {
        if !bands.contains(&band) {
            return Err(format!("probe set is missing a {band:?} question"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ScoredAnswer;
    use crate::config::ConfigMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn sample_config() -> AgentConfiguration {
        AgentConfiguration {
            agent_id: Uuid::new_v4(),
            role: "researcher".to_string(),
            capabilities: vec!["analysis".to_string()],
            constraints: vec![],
            instruction_template: "You are a researcher.".to_string(),
            model: None,
            success_criteria: "Grounded answers".to_string(),
            metadata: ConfigMetadata::default(),
        }
    }

    fn valid_set() -> Vec<ProbeQuestion> {
        [0.3, 0.35, 0.55, 0.7, 0.85]
            .iter()
            .enumerate()
            .map(|(i, &d)| ProbeQuestion {
                prompt: format!("question {}", i + 1),
                difficulty: d,
                expected_answer: "reference".to_string(),
                tests_capability: None,
            })
            .collect()
    }

    struct FlakyGenerator {
        calls: AtomicUsize,
        bad_calls: usize,
    }

    #[async_trait]
    impl QuestionGenerator for FlakyGenerator {
        async fn generate(&self, _config: &AgentConfiguration) -> crate::Result<Vec<ProbeQuestion>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.bad_calls {
                // short set, should be rejected by validation
                Ok(valid_set().into_iter().take(3).collect())
            } else {
                Ok(valid_set())
            }
        }
    }

    struct EchoProbe;

    #[async_trait]
    impl AgentProbe for EchoProbe {
        async fn answer(
            &self,
            _config: &AgentConfiguration,
            question: &ProbeQuestion,
        ) -> crate::Result<String> {
            Ok(format!("answer to {}", question.prompt))
        }
    }

    struct ThresholdScorer;

    #[async_trait]
    impl ResponseScorer for ThresholdScorer {
        async fn score(
            &self,
            question: &ProbeQuestion,
            _answer: &str,
        ) -> crate::Result<ScoredAnswer> {
            // passes everything at or below medium difficulty: 3/5 correct
            Ok(ScoredAnswer {
                correct: question.difficulty <= 0.6,
                score: 1.0 - question.difficulty / 2.0,
            })
        }
    }

    #[tokio::test]
    async fn evaluate_aggregates_five_probes() {
        let gate = QualityGate::new(
            Arc::new(FlakyGenerator {
                calls: AtomicUsize::new(0),
                bad_calls: 0,
            }),
            Arc::new(EchoProbe),
            Arc::new(ThresholdScorer),
        );

        let verdict = gate
            .evaluate(&sample_config(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(verdict.results.len(), PROBE_COUNT);
        assert_eq!(verdict.pass_rate, 0.6);
        assert!((verdict.variance - 0.24).abs() < 1e-12);
        assert!(verdict.accepted);
    }

    #[tokio::test]
    async fn malformed_sets_are_regenerated() {
        let generator = Arc::new(FlakyGenerator {
            calls: AtomicUsize::new(0),
            bad_calls: 2,
        });
        let gate = QualityGate::new(generator.clone(), Arc::new(EchoProbe), Arc::new(ThresholdScorer));

        let verdict = gate
            .evaluate(&sample_config(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(verdict.results.len(), PROBE_COUNT);
    }

    #[tokio::test]
    async fn exhausted_generation_fails_upstream() {
        let gate = QualityGate::new(
            Arc::new(FlakyGenerator {
                calls: AtomicUsize::new(0),
                bad_calls: usize::MAX,
            }),
            Arc::new(EchoProbe),
            Arc::new(ThresholdScorer),
        );

        let err = gate
            .evaluate(&sample_config(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            FoundryError::Upstream { stage, .. } => {
                assert_eq!(stage, Stage::QuestionGeneration)
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_generation() {
        let gate = QualityGate::new(
            Arc::new(FlakyGenerator {
                calls: AtomicUsize::new(0),
                bad_calls: 0,
            }),
            Arc::new(EchoProbe),
            Arc::new(ThresholdScorer),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gate.evaluate(&sample_config(), &cancel).await.unwrap_err();
        assert!(matches!(err, FoundryError::Cancelled));
    }

    #[test]
    fn validation_rejects_wrong_count() {
        let mut six = valid_set();
        six.push(ProbeQuestion {
            prompt: "extra".to_string(),
            difficulty: 0.5,
            expected_answer: "reference".to_string(),
            tests_capability: None,
        });
        assert!(validate_question_set(&six).is_err());
        assert!(validate_question_set(&valid_set()[..4]).is_err());
    }

    #[test]
    fn validation_requires_all_bands() {
        let mut set = valid_set();
        // collapse the hard questions into the medium band
        set[3].difficulty = 0.55;
        set[4].difficulty = 0.55;
        let err = validate_question_set(&set).unwrap_err();
        assert!(err.contains("Hard"));
    }

    #[test]
    fn validation_rejects_out_of_band_difficulty() {
        let mut set = valid_set();
        set[0].difficulty = 0.45; // gap between easy and medium
        assert!(validate_question_set(&set).is_err());
        set[0].difficulty = 1.3;
        let err = validate_question_set(&set).unwrap_err();
        assert!(err.contains("outside [0, 1]"));
    }
}
