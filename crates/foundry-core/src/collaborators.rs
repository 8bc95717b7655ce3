//! Collaborator seams for the build pipeline
//!
//! Every external service the pipeline consumes sits behind one of these
//! traits so that production implementations (LLM-backed, filesystem-backed)
//! and deterministic test doubles are interchangeable. The core never talks
//! to a provider directly.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AgentConfiguration, ModelParams, StructuredIntent};
use crate::error::Result;
use crate::quality::{ProbeQuestion, Verdict};

/// Correctness flag and continuous score for one probe answer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    /// Whether the answer is acceptable
    pub correct: bool,

    /// Quality score in [0, 1]
    pub score: f64,
}

/// Registration record for an emitted agent artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Where the artifact was written
    pub location: PathBuf,

    /// Registration identifier, distinct from the agent identifier
    pub registration_id: Uuid,

    /// Content hash of the persisted manifest
    pub content_hash: String,

    /// When the artifact was registered
    pub registered_at: DateTime<Utc>,
}

/// Turns a natural-language instruction into a structured intent record
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn extract(&self, instruction: &str) -> Result<StructuredIntent>;
}

/// Builds the initial agent configuration from a structured intent
#[async_trait]
pub trait ConfigBuilder: Send + Sync {
    async fn build(&self, intent: &StructuredIntent) -> Result<AgentConfiguration>;
}

/// Recommends execution-model parameters for a configuration
#[async_trait]
pub trait ModelAdvisor: Send + Sync {
    async fn recommend(&self, config: &AgentConfiguration) -> Result<ModelParams>;
}

/// Generates the probe questions used to challenge a candidate agent
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, config: &AgentConfiguration) -> Result<Vec<ProbeQuestion>>;
}

/// The agent under test: answers one probe question at a time
#[async_trait]
pub trait AgentProbe: Send + Sync {
    async fn answer(&self, config: &AgentConfiguration, question: &ProbeQuestion) -> Result<String>;
}

/// Scores an answer against the question's expected-answer reference
#[async_trait]
pub trait ResponseScorer: Send + Sync {
    async fn score(&self, question: &ProbeQuestion, answer: &str) -> Result<ScoredAnswer>;
}

/// Persists the accepted configuration as an executable agent artifact.
/// Invoked exactly once per build, only after acceptance.
#[async_trait]
pub trait ArtifactEmitter: Send + Sync {
    async fn emit(&self, config: &AgentConfiguration, verdict: &Verdict) -> Result<ArtifactRecord>;
}
