//! Agent configuration - the record threaded through the build pipeline
//!
//! A configuration is an immutable value: pipeline stages replace it with a
//! new copy rather than sharing a mutable instance. The identifier is the one
//! field assigned at construction and never changed afterwards; everything
//! else may be rewritten between quality attempts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured intent extracted from the natural-language instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredIntent {
    /// Primary role of the requested agent, e.g. "data_analyst"
    pub role: String,

    /// Specific skills the agent must have
    pub capabilities: Vec<String>,

    /// Limitations or requirements, e.g. "must_use_python"
    #[serde(default)]
    pub constraints: Vec<String>,

    /// What it means for the agent to succeed
    pub success_criteria: String,

    /// Estimated task complexity
    #[serde(default)]
    pub complexity: Complexity,

    /// Tokens spent extracting this intent
    #[serde(default)]
    pub tokens_used: u64,
}

/// Task complexity estimate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// Execution-model parameters recommended by the model advisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Model identifier, e.g. "gemini-2.0-flash"
    pub model_name: String,

    /// Context window in tokens, always positive
    pub context_window: u32,

    /// Sampling temperature in [0, 1]
    pub temperature: f64,

    /// Estimated cost per 1k tokens in USD
    pub estimated_cost_per_1k: f64,

    /// The advisor's stated reason for this choice
    #[serde(default)]
    pub reasoning: String,
}

/// Accumulating metadata bag: token/cost counters and stage provenance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Total tokens consumed building this agent
    pub tokens_used: u64,

    /// Total estimated cost in USD
    pub cost_usd: f64,

    /// Ordered trail of pipeline stages that touched the configuration
    pub stages: Vec<String>,
}

impl ConfigMetadata {
    /// Append a stage name to the provenance trail
    pub fn record_stage(&mut self, stage: impl Into<String>) {
        self.stages.push(stage.into());
    }

    /// Accumulate token and cost counters
    pub fn add_usage(&mut self, tokens: u64, cost_usd: f64) {
        self.tokens_used += tokens;
        self.cost_usd += cost_usd;
    }
}

/// Configuration of the agent under construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    /// Opaque unique identifier, assigned once at construction
    pub agent_id: Uuid,

    /// Role classification
    pub role: String,

    /// Ordered capability labels
    pub capabilities: Vec<String>,

    /// Constraint labels
    pub constraints: Vec<String>,

    /// Free-text instruction template driving the agent's behavior
    pub instruction_template: String,

    /// Selected model parameters, populated by the model advisor
    pub model: Option<ModelParams>,

    /// Success-criteria text carried over from the intent
    pub success_criteria: String,

    /// Accumulating counters and provenance
    pub metadata: ConfigMetadata,
}

impl AgentConfiguration {
    /// Add a capability label if it is not already present.
    /// Returns true when the set actually changed.
    pub fn add_capability(&mut self, capability: impl Into<String>) -> bool {
        let capability = capability.into();
        if self.capabilities.contains(&capability) {
            return false;
        }
        self.capabilities.push(capability);
        true
    }

    /// Add a constraint label if it is not already present.
    /// Returns true when the set actually changed.
    pub fn add_constraint(&mut self, constraint: impl Into<String>) -> bool {
        let constraint = constraint.into();
        if self.constraints.contains(&constraint) {
            return false;
        }
        self.constraints.push(constraint);
        true
    }
}
