//! Error types for Foundry Core
//!
//! This module defines all error types used throughout the build pipeline.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Foundry operations
pub type Result<T> = std::result::Result<T, FoundryError>;

/// Main error type for Foundry operations
#[derive(Error, Debug)]
pub enum FoundryError {
    /// Instruction failed the pre-flight checks; no collaborator was called
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A collaborator returned malformed or absent output after its own bounded retry
    #[error("upstream failure in {stage}: {message}")]
    Upstream {
        /// The pipeline stage that produced the failure
        stage: Stage,
        /// Human-readable description of what went wrong
        message: String,
    },

    /// The build was cancelled between stages
    #[error("build cancelled")]
    Cancelled,

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by instruction validation, before any stage runs
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("instruction cannot be empty")]
    EmptyInstruction,

    #[error("instruction too short ({length} chars, minimum {minimum})")]
    InstructionTooShort { length: usize, minimum: usize },

    #[error("instruction too long ({length} chars, maximum {maximum})")]
    InstructionTooLong { length: usize, maximum: usize },
}

/// Pipeline stages, used to attribute upstream failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    IntentExtraction,
    ConfigAssembly,
    ModelSelection,
    QuestionGeneration,
    AgentProbe,
    ResponseScoring,
    ArtifactEmission,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::IntentExtraction => "intent-extraction",
            Stage::ConfigAssembly => "config-assembly",
            Stage::ModelSelection => "model-selection",
            Stage::QuestionGeneration => "question-generation",
            Stage::AgentProbe => "agent-probe",
            Stage::ResponseScoring => "response-scoring",
            Stage::ArtifactEmission => "artifact-emission",
        };
        f.write_str(name)
    }
}

impl FoundryError {
    /// Build an upstream failure attributed to a stage
    pub fn upstream(stage: Stage, message: impl Into<String>) -> Self {
        Self::Upstream {
            stage,
            message: message.into(),
        }
    }

    /// Attribute this error to a stage. Upstream failures and cancellations
    /// already carry their provenance and pass through unchanged.
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::Upstream { .. } | Self::Cancelled => self,
            other => Self::Upstream {
                stage,
                message: other.to_string(),
            },
        }
    }

    /// True when the error is fatal for the current build
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
