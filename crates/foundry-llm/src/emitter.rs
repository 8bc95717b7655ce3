//! Artifact emission - persist an accepted agent as a manifest on disk
//!
//! One manifest per accepted build, keyed by role and agent identifier:
//! `<root>/<role>/<agent_id>.json`. A path can only ever belong to one
//! identifier; if a file at the target path carries a different identifier
//! the emitter refuses to touch it. Re-emitting the same identifier is
//! idempotent and simply refreshes the registration.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use foundry_core::collaborators::{ArtifactEmitter, ArtifactRecord};
use foundry_core::config::{AgentConfiguration, ModelParams};
use foundry_core::error::Stage;
use foundry_core::quality::Verdict;
use foundry_core::{FoundryError, Result};

/// Persisted agent manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManifest {
    pub schema_version: String,
    pub agent_id: Uuid,
    pub role: String,
    pub capabilities: Vec<String>,
    pub constraints: Vec<String>,
    pub instruction_template: String,
    pub model: Option<ModelParams>,
    pub success_criteria: String,
    pub quality: QualitySummary,
    pub registration_id: Uuid,
    pub registered_at: DateTime<Utc>,
    /// blake3 hash of the accepted configuration
    pub content_hash: String,
}

/// The accepting verdict's headline figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySummary {
    pub average_score: f64,
    pub pass_rate: f64,
    pub variance: f64,
    pub rationale: String,
}

/// Filesystem-backed [`ArtifactEmitter`]
pub struct FsArtifactEmitter {
    root: PathBuf,
}

impl FsArtifactEmitter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn manifest_path(&self, config: &AgentConfiguration) -> PathBuf {
        self.root
            .join(role_slug(&config.role))
            .join(format!("{}.json", config.agent_id))
    }

    async fn check_no_foreign_occupant(
        &self,
        path: &Path,
        agent_id: Uuid,
    ) -> Result<()> {
        match tokio::fs::read_to_string(path).await {
            Ok(existing) => {
                let manifest: AgentManifest =
                    serde_json::from_str(&existing).map_err(|e| {
                        FoundryError::upstream(
                            Stage::ArtifactEmission,
                            format!(
                                "existing artifact at {} is unreadable: {e}",
                                path.display()
                            ),
                        )
                    })?;
                if manifest.agent_id != agent_id {
                    return Err(FoundryError::upstream(
                        Stage::ArtifactEmission,
                        format!(
                            "refusing to overwrite {}: it belongs to agent {}",
                            path.display(),
                            manifest.agent_id
                        ),
                    ));
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ArtifactEmitter for FsArtifactEmitter {
    async fn emit(
        &self,
        config: &AgentConfiguration,
        verdict: &Verdict,
    ) -> Result<ArtifactRecord> {
        let path = self.manifest_path(config);
        self.check_no_foreign_occupant(&path, config.agent_id).await?;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let config_json = serde_json::to_string(config)?;
        let content_hash = blake3::hash(config_json.as_bytes()).to_hex().to_string();
        let registration_id = Uuid::new_v4();
        let registered_at = Utc::now();

        let manifest = AgentManifest {
            schema_version: "1.0".to_string(),
            agent_id: config.agent_id,
            role: config.role.clone(),
            capabilities: config.capabilities.clone(),
            constraints: config.constraints.clone(),
            instruction_template: config.instruction_template.clone(),
            model: config.model.clone(),
            success_criteria: config.success_criteria.clone(),
            quality: QualitySummary {
                average_score: verdict.average_score,
                pass_rate: verdict.pass_rate,
                variance: verdict.variance,
                rationale: verdict.rationale.clone(),
            },
            registration_id,
            registered_at,
            content_hash: content_hash.clone(),
        };

        tokio::fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;

        tracing::info!(
            agent_id = %config.agent_id,
            location = %path.display(),
            %registration_id,
            "artifact registered"
        );

        Ok(ArtifactRecord {
            location: path,
            registration_id,
            content_hash,
            registered_at,
        })
    }
}

/// Filesystem-safe slug for a role name
fn role_slug(role: &str) -> String {
    let slug: String = role
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "agent".to_string()
    } else {
        slug
    }
}
