//! Configuration assembly - structured intent to initial configuration
//!
//! Purely deterministic: assigns the identity, composes the first
//! instruction template from the intent, and seeds the provenance trail.
//! No model call happens at this stage.

use async_trait::async_trait;
use uuid::Uuid;

use foundry_core::collaborators::ConfigBuilder;
use foundry_core::config::{AgentConfiguration, ConfigMetadata, StructuredIntent};
use foundry_core::Result;

/// Deterministic [`ConfigBuilder`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateConfigBuilder;

impl TemplateConfigBuilder {
    pub fn new() -> Self {
        Self
    }

    fn compose_template(intent: &StructuredIntent) -> String {
        let mut template = format!(
            "You are a {}. Your capabilities include: {}.",
            intent.role,
            intent.capabilities.join(", ")
        );
        if !intent.constraints.is_empty() {
            template.push_str(&format!(" Constraints: {}.", intent.constraints.join(", ")));
        }
        template.push_str(&format!(" Success means: {}.", intent.success_criteria));
        template
    }
}

#[async_trait]
impl ConfigBuilder for TemplateConfigBuilder {
    async fn build(&self, intent: &StructuredIntent) -> Result<AgentConfiguration> {
        let agent_id = Uuid::new_v4();

        let mut metadata = ConfigMetadata::default();
        metadata.record_stage("intent-extraction");
        metadata.record_stage("config-assembly");
        metadata.add_usage(intent.tokens_used, 0.0);

        tracing::info!(%agent_id, role = %intent.role, "configuration assembled");

        Ok(AgentConfiguration {
            agent_id,
            role: intent.role.clone(),
            capabilities: intent.capabilities.clone(),
            constraints: intent.constraints.clone(),
            instruction_template: Self::compose_template(intent),
            model: None,
            success_criteria: intent.success_criteria.clone(),
            metadata,
        })
    }
}
