//! Retry planning - deterministic configuration mutation between attempts
//!
//! The planner is stateless: given the configuration that just failed, the
//! 1-based index of the failed attempt and its verdict, it returns a new
//! configuration value and the strategy it applied. It never mutates its
//! input. The loop it serves is bounded by attempt count, not convergence,
//! so an empty delta is tolerated: when no material change can be made the
//! configuration comes back unchanged and the next attempt proceeds anyway.

use serde::{Deserialize, Serialize};

use crate::config::AgentConfiguration;
use crate::quality::{FailureClass, Verdict};

/// Capability added when wrong answers point at a competence gap
const ADAPTIVE_CAPABILITY: &str = "adaptive_reasoning";

/// Constraint added when low-variance failures point at overreach
const ACCURACY_CONSTRAINT: &str = "prioritize_accuracy_over_speed";

/// Mutation applied to a configuration before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationStrategy {
    /// First failure: rewrite the instruction template, leave the sets alone
    RefineInstructions,
    /// Second failure: revise the capability and constraint sets
    ReviseCapabilities,
}

/// Stateless planner: a pure function of (configuration, attempt, verdict)
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPlanner;

impl RetryPlanner {
    /// Produce the configuration for the next attempt.
    ///
    /// Deterministic: the same inputs always yield the same output.
    pub fn adjust(
        &self,
        config: &AgentConfiguration,
        attempt: u32,
        verdict: &Verdict,
    ) -> (AgentConfiguration, MutationStrategy) {
        let strategy = if attempt <= 1 {
            MutationStrategy::RefineInstructions
        } else {
            MutationStrategy::ReviseCapabilities
        };

        let adjusted = match strategy {
            MutationStrategy::RefineInstructions => self.refine_instructions(config, verdict),
            MutationStrategy::ReviseCapabilities => self.revise_sets(config, verdict),
        };

        tracing::info!(
            agent_id = %config.agent_id,
            attempt,
            strategy = ?strategy,
            "retry mutation planned"
        );

        (adjusted, strategy)
    }

    /// Append guidance to the instruction template targeting the failure
    /// class; capability and constraint sets are left untouched.
    fn refine_instructions(
        &self,
        config: &AgentConfiguration,
        verdict: &Verdict,
    ) -> AgentConfiguration {
        let mut adjusted = config.clone();

        let guidance = match verdict.failure_class() {
            Some(FailureClass::CompetenceGap) | Some(FailureClass::Both) => {
                "\n\nFocus on demonstrating a strong grasp of fundamental concepts. \
                 Ensure accuracy on basic operations before tackling complex problems."
                    .to_string()
            }
            Some(FailureClass::MiscalibratedDifficulty) if verdict.pass_rate >= 1.0 => {
                "\n\nPay special attention to edge cases and complex scenarios. \
                 Provide detailed reasoning for challenging questions."
                    .to_string()
            }
            _ => {
                format!(
                    "\n\nYour core expertise areas are: {}. \
                     Demonstrate deep knowledge in these specific areas.",
                    adjusted.capabilities.join(", ")
                )
            }
        };

        adjusted.instruction_template.push_str(&guidance);
        adjusted.metadata.record_stage("retry:refine-instructions");
        adjusted
    }

    /// Revise the capability and constraint sets: widen capabilities when
    /// answers were wrong, tighten constraints when failures looked
    /// overconfident. The template gets one matching sentence.
    fn revise_sets(&self, config: &AgentConfiguration, verdict: &Verdict) -> AgentConfiguration {
        let mut adjusted = config.clone();

        let competence_gap = matches!(
            verdict.failure_class(),
            Some(FailureClass::CompetenceGap) | Some(FailureClass::Both)
        );

        let changed = if competence_gap {
            if adjusted.add_capability(ADAPTIVE_CAPABILITY) {
                adjusted.instruction_template.push_str(
                    "\n\nYou are able to learn from feedback and adjust your approach between answers.",
                );
                true
            } else {
                false
            }
        } else if adjusted.add_constraint(ACCURACY_CONSTRAINT) {
            adjusted
                .instruction_template
                .push_str("\n\nPrioritize accuracy and thoroughness over speed in your responses.");
            true
        } else {
            false
        };

        if changed {
            adjusted.metadata.record_stage("retry:revise-capabilities");
        } else {
            tracing::warn!(
                agent_id = %config.agent_id,
                "no material revision available, proceeding with unchanged configuration"
            );
        }

        adjusted
    }
}
