//! Intent extraction - natural language to structured intent
//!
//! Treats the instruction as the current state and the structured
//! configuration as the action to take; the model fills a fixed field set
//! which is validated here before anything typed leaves the boundary.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use foundry_core::collaborators::IntentExtractor;
use foundry_core::config::{Complexity, StructuredIntent};
use foundry_core::error::Stage;
use foundry_core::Result;

use crate::client::{generate_validated, JsonRequest, LlmClient};

/// Extra model calls allowed when a reply fails validation
const PARSE_RETRIES: u32 = 2;

const SYSTEM: &str = "You are an agent-configuration analyst. Treat the user's \
instruction as the current state and the structured configuration you emit as \
the action that satisfies it.";

/// LLM-backed [`IntentExtractor`]
pub struct LlmIntentExtractor {
    client: Arc<dyn LlmClient>,
    retries: u32,
}

impl LlmIntentExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            retries: PARSE_RETRIES,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntentPayload {
    role: String,
    capabilities: Vec<String>,
    #[serde(default)]
    constraints: Vec<String>,
    success_criteria: String,
    #[serde(default)]
    complexity: Complexity,
}

fn parse_intent(value: &serde_json::Value) -> std::result::Result<IntentPayload, String> {
    let payload: IntentPayload =
        serde_json::from_value(value.clone()).map_err(|e| format!("schema mismatch: {e}"))?;
    if payload.role.trim().is_empty() {
        return Err("role is empty".to_string());
    }
    if payload.capabilities.is_empty() {
        return Err("no capabilities were extracted".to_string());
    }
    if payload.success_criteria.trim().is_empty() {
        return Err("success criteria are empty".to_string());
    }
    Ok(payload)
}

#[async_trait]
impl IntentExtractor for LlmIntentExtractor {
    async fn extract(&self, instruction: &str) -> Result<StructuredIntent> {
        let prompt = format!(
            r#"Analyze this instruction and extract a structured agent configuration:

Instruction: {instruction}

Extract the following in JSON:
1. role: primary role, snake_case (e.g. "data_analyst", "code_generator", "researcher")
2. capabilities: list of specific, actionable skills required
3. constraints: limitations or requirements (e.g. "must_use_python", "realtime_processing")
4. success_criteria: one clear success metric
5. complexity: "low", "medium" or "high"

Return ONLY a valid JSON object with exactly those fields."#
        );

        let (payload, tokens) = generate_validated(
            self.client.as_ref(),
            JsonRequest::new(SYSTEM, &prompt),
            self.retries,
            Stage::IntentExtraction,
            parse_intent,
        )
        .await?;

        tracing::info!(role = %payload.role, tokens, "intent extracted");

        Ok(StructuredIntent {
            role: payload.role,
            capabilities: payload.capabilities,
            constraints: payload.constraints,
            success_criteria: payload.success_criteria,
            complexity: payload.complexity,
            tokens_used: tokens,
        })
    }
}
