//! Foundry LLM - production collaborators for the build pipeline
//!
//! This crate supplies the concrete implementations behind
//! `foundry-core`'s collaborator traits: a provider-agnostic JSON-mode
//! client (Google Gemini and OpenAI-compatible endpoints), the intent
//! extractor, the deterministic configuration builder, the model advisor,
//! the probe-question generator, the agent probe and response scorer, and
//! a filesystem artifact emitter.
//!
//! Each collaborator validates its model's reply into typed values at the
//! boundary and retries malformed replies on a small local budget; those
//! retries never consume the orchestrator's quality attempts.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod advisor;
pub mod builder;
pub mod challenger;
pub mod client;
pub mod emitter;
pub mod examiner;
pub mod extractor;

use std::path::PathBuf;
use std::sync::Arc;

use foundry_core::orchestrator::Orchestrator;

pub use advisor::LlmModelAdvisor;
pub use builder::TemplateConfigBuilder;
pub use challenger::LlmQuestionGenerator;
pub use client::{
    client_from_env, extract_json, GeminiClient, JsonReply, JsonRequest, LlmClient,
    OpenAiCompatClient, ProviderConfig,
};
pub use emitter::{AgentManifest, FsArtifactEmitter, QualitySummary};
pub use examiner::{LlmAgentProbe, LlmResponseScorer};
pub use extractor::LlmIntentExtractor;

/// Wire a full orchestrator from the environment: one shared client for
/// every model-facing collaborator, artifacts under `artifact_root`.
pub fn orchestrator_from_env(artifact_root: PathBuf) -> anyhow::Result<Orchestrator> {
    let client = client_from_env()?;
    Ok(orchestrator_with_client(client, artifact_root))
}

/// Wire a full orchestrator around an explicit client
pub fn orchestrator_with_client(
    client: Arc<dyn LlmClient>,
    artifact_root: PathBuf,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(LlmIntentExtractor::new(client.clone())),
        Arc::new(TemplateConfigBuilder::new()),
        Arc::new(LlmModelAdvisor::new(client.clone())),
        Arc::new(LlmQuestionGenerator::new(client.clone())),
        Arc::new(LlmAgentProbe::new(client.clone())),
        Arc::new(LlmResponseScorer::new(client)),
        Arc::new(FsArtifactEmitter::new(artifact_root)),
    )
}
