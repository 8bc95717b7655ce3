//! Foundry Core - The control engine for LLM-built software agents
//!
//! Foundry turns a natural-language request into a validated, deployable
//! agent by chaining LLM-driven transformation stages under one
//! orchestration controller. This crate is that controller: the stage
//! sequencing, the probabilistic quality gate, and the bounded
//! retry-escalation state machine. Everything that actually talks to a
//! model or a filesystem lives behind the collaborator traits in
//! [`collaborators`] and is provided by other crates (or by test doubles).
//!
//! # Architecture
//!
//! 1. **Configuration** (`config`): the immutable value threaded through the
//!    pipeline, replaced - never shared-mutated - at each transition
//! 2. **Collaborators** (`collaborators`): async trait seams for every
//!    external service the pipeline consumes
//! 3. **Quality gate** (`quality`): probe generation, concurrent
//!    answer/score collection, Bernoulli-variance acceptance rule
//! 4. **Retry planner** (`retry`): deterministic configuration mutation
//!    between attempts
//! 5. **Orchestrator** (`orchestrator`): the four-state bounded loop that
//!    terminates in acceptance, escalation or rejection
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use foundry_core::orchestrator::{Orchestrator, Outcome};
//! # async fn demo(
//! #     extractor: Arc<dyn foundry_core::collaborators::IntentExtractor>,
//! #     builder: Arc<dyn foundry_core::collaborators::ConfigBuilder>,
//! #     advisor: Arc<dyn foundry_core::collaborators::ModelAdvisor>,
//! #     generator: Arc<dyn foundry_core::collaborators::QuestionGenerator>,
//! #     probe: Arc<dyn foundry_core::collaborators::AgentProbe>,
//! #     scorer: Arc<dyn foundry_core::collaborators::ResponseScorer>,
//! #     emitter: Arc<dyn foundry_core::collaborators::ArtifactEmitter>,
//! # ) -> foundry_core::Result<()> {
//! let orchestrator =
//!     Orchestrator::new(extractor, builder, advisor, generator, probe, scorer, emitter);
//!
//! match orchestrator.build("Create a data analyst agent for CSV files").await? {
//!     Outcome::Accepted { artifact, .. } => println!("agent at {:?}", artifact.location),
//!     Outcome::Escalated { rationale, .. } => println!("needs review: {rationale}"),
//!     Outcome::Rejected { error } => println!("bad instruction: {error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Design Principles
//!
//! 1. **Negative outcomes are data**: rejection and escalation are returned
//!    values callers pattern-match on; only upstream failures and
//!    cancellation use the error channel
//! 2. **Bounded everything**: three quality attempts, a fixed probe count,
//!    a fixed generation-retry budget - termination never depends on
//!    convergence
//! 3. **One writer**: the orchestrator owns the configuration; the gate
//!    only reads it; the planner returns a fresh value
//! 4. **Deterministic where possible**: the planner is a pure function so
//!    the audit trail can be replayed

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod quality;
pub mod retry;

pub use collaborators::{ArtifactRecord, ScoredAnswer};
pub use config::{AgentConfiguration, Complexity, ConfigMetadata, ModelParams, StructuredIntent};
pub use error::{FoundryError, Result, Stage, ValidationError};
pub use orchestrator::{AttemptRecord, BuildReport, Orchestrator, Outcome};
pub use quality::{ProbeQuestion, ProbeResult, QualityGate, Verdict};
pub use retry::{MutationStrategy, RetryPlanner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
