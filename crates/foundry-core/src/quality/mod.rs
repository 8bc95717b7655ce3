//! Quality gating - probe questions, per-answer results and the verdict
//!
//! A candidate agent is challenged with a small fixed set of generated
//! questions spanning three difficulty bands. The verdict combines two
//! signals: the mean continuous score (competence) and the Bernoulli
//! variance of the pass/fail indicator (difficulty calibration). An agent
//! that trivially passes or trivially fails every probe is never accepted;
//! the probe set is supposed to sit at the capability frontier, where the
//! agent succeeds roughly half the time.

pub mod gate;

use serde::{Deserialize, Serialize};

pub use gate::QualityGate;

/// Number of probe questions per attempt
pub const PROBE_COUNT: usize = 5;

/// Minimum mean score for acceptance
pub const MIN_AVERAGE_SCORE: f64 = 0.6;

/// Accepted range for the pass/fail Bernoulli variance
pub const VARIANCE_RANGE: (f64, f64) = (0.15, 0.35);

/// Bernoulli variance of a pass rate: p(1-p), maximized at p = 0.5
pub fn bernoulli_variance(pass_rate: f64) -> f64 {
    pass_rate * (1.0 - pass_rate)
}

/// Difficulty bands a generated question set must span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    /// [0.2, 0.4)
    Easy,
    /// [0.5, 0.6]
    Medium,
    /// (0.6, 0.9]
    Hard,
}

impl DifficultyBand {
    /// Classify a difficulty scalar. Values outside every band return None.
    pub fn classify(difficulty: f64) -> Option<Self> {
        if (0.2..0.4).contains(&difficulty) {
            Some(Self::Easy)
        } else if (0.5..=0.6).contains(&difficulty) {
            Some(Self::Medium)
        } else if difficulty > 0.6 && difficulty <= 0.9 {
            Some(Self::Hard)
        } else {
            None
        }
    }
}

/// One generated probe question. Immutable once generated for an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeQuestion {
    /// The question text put to the agent
    pub prompt: String,

    /// Declared difficulty in [0, 1]
    pub difficulty: f64,

    /// Reference answer or key criteria used for scoring
    pub expected_answer: String,

    /// Which capability this question targets, when the generator says so
    #[serde(default)]
    pub tests_capability: Option<String>,
}

/// Outcome of one probe: the question, the agent's answer, and its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The question that was asked
    pub prompt: String,

    /// The agent's produced answer
    pub answer: String,

    /// Whether the answer was judged acceptable
    pub correct: bool,

    /// Continuous quality score, clamped to [0, 1]
    pub score: f64,

    /// Difficulty the question was generated at
    pub difficulty: f64,
}

impl ProbeResult {
    /// Build a result from a question, an answer and the scorer's judgment
    pub fn new(question: &ProbeQuestion, answer: String, correct: bool, score: f64) -> Self {
        Self {
            prompt: question.prompt.clone(),
            answer,
            correct,
            score: score.clamp(0.0, 1.0),
            difficulty: question.difficulty,
        }
    }
}

/// Which acceptance clause a rejected verdict failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    /// Mean score below the competence threshold
    CompetenceGap,
    /// Variance outside the calibration window
    MiscalibratedDifficulty,
    /// Both clauses failed
    Both,
}

/// Pass/fail judgment and supporting statistics for one quality attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Mean of the continuous per-probe scores
    pub average_score: f64,

    /// Fraction of probes judged correct
    pub pass_rate: f64,

    /// Bernoulli variance of the pass/fail indicator: p(1-p)
    pub variance: f64,

    /// Whether the agent is accepted
    pub accepted: bool,

    /// Human-readable explanation of the judgment
    pub rationale: String,

    /// Per-probe results, retained for the audit trail
    pub results: Vec<ProbeResult>,
}

impl Verdict {
    /// Aggregate probe results into a verdict.
    ///
    /// Acceptance requires both clauses: mean score at or above the
    /// competence threshold AND variance inside the calibration window.
    pub fn from_results(results: Vec<ProbeResult>) -> Self {
        if results.is_empty() {
            return Self {
                average_score: 0.0,
                pass_rate: 0.0,
                variance: 0.0,
                accepted: false,
                rationale: "no probe results were collected".to_string(),
                results,
            };
        }

        let count = results.len() as f64;
        let pass_rate = results.iter().filter(|r| r.correct).count() as f64 / count;
        let variance = bernoulli_variance(pass_rate);
        let average_score = results.iter().map(|r| r.score).sum::<f64>() / count;
        let accepted = average_score >= MIN_AVERAGE_SCORE
            && variance >= VARIANCE_RANGE.0
            && variance <= VARIANCE_RANGE.1;
        let rationale = Self::compose_rationale(accepted, average_score, pass_rate, variance);

        Self {
            average_score,
            pass_rate,
            variance,
            accepted,
            rationale,
            results,
        }
    }

    fn compose_rationale(accepted: bool, average: f64, pass_rate: f64, variance: f64) -> String {
        if accepted {
            return format!(
                "agent passed all quality checks (avg={average:.2}, variance={variance:.3})"
            );
        }

        let competence_gap = average < MIN_AVERAGE_SCORE;
        let miscalibrated = variance < VARIANCE_RANGE.0 || variance > VARIANCE_RANGE.1;

        let mut parts = Vec::new();
        if competence_gap {
            parts.push(format!(
                "agent scored below the competence threshold (avg={average:.2} < {MIN_AVERAGE_SCORE})"
            ));
        }
        if miscalibrated {
            if variance == 0.0 {
                let shape = if pass_rate >= 1.0 {
                    "every probe passed"
                } else {
                    "every probe failed"
                };
                parts.push(format!(
                    "probe set is not at the capability frontier ({shape}, variance=0.000, expected ~0.25)"
                ));
            } else if variance < VARIANCE_RANGE.0 {
                parts.push(format!(
                    "probe difficulty is miscalibrated (variance={variance:.3} below {:.2})",
                    VARIANCE_RANGE.0
                ));
            } else {
                parts.push(format!(
                    "probe performance is too inconsistent (variance={variance:.3} above {:.2})",
                    VARIANCE_RANGE.1
                ));
            }
        }
        parts.join("; ")
    }

    /// Which clause failed, None for accepted verdicts
    pub fn failure_class(&self) -> Option<FailureClass> {
        if self.accepted {
            return None;
        }
        let competence_gap = self.average_score < MIN_AVERAGE_SCORE;
        let miscalibrated =
            self.variance < VARIANCE_RANGE.0 || self.variance > VARIANCE_RANGE.1;
        match (competence_gap, miscalibrated) {
            (true, true) => Some(FailureClass::Both),
            (true, false) => Some(FailureClass::CompetenceGap),
            _ => Some(FailureClass::MiscalibratedDifficulty),
        }
    }

    /// Actionable feedback derived from the per-probe failure pattern
    pub fn feedback(&self) -> String {
        let failed: Vec<&ProbeResult> = self.results.iter().filter(|r| !r.correct).collect();

        if failed.is_empty() {
            if self.pass_rate >= 1.0 {
                return "all probes answered correctly; the probe set may be too easy, \
                        consider increasing difficulty"
                    .to_string();
            }
            return "performance is at the target difficulty level".to_string();
        }

        let failed_easy = failed.iter().filter(|r| r.difficulty < 0.5).count();
        let failed_hard = failed.iter().filter(|r| r.difficulty >= 0.7).count();

        let mut parts = Vec::new();
        if failed_easy > 0 {
            parts.push(format!(
                "failed {failed_easy} easy probe(s): fundamental gaps detected"
            ));
        }
        if failed_hard > 0 {
            parts.push(format!(
                "failed {failed_hard} hard probe(s): expected near the capability frontier"
            ));
        }
        for r in failed.iter().take(3) {
            parts.push(format!(
                "missed: '{}' (difficulty {:.1})",
                r.prompt, r.difficulty
            ));
        }
        parts.join("\n")
    }
}
