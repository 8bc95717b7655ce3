//! Model advice - pick execution-model parameters for a configuration
//!
//! A model-of-models step: one LLM recommends which model the generated
//! agent should run on, balancing task complexity against cost. The reply
//! is range-checked before it reaches the configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use foundry_core::collaborators::ModelAdvisor;
use foundry_core::config::{AgentConfiguration, ModelParams};
use foundry_core::error::Stage;
use foundry_core::Result;

use crate::client::{generate_validated, JsonRequest, LlmClient};

const PARSE_RETRIES: u32 = 2;

const SYSTEM: &str = "You are an expert AI architect selecting execution models.";

/// LLM-backed [`ModelAdvisor`]
pub struct LlmModelAdvisor {
    client: Arc<dyn LlmClient>,
    retries: u32,
}

impl LlmModelAdvisor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            retries: PARSE_RETRIES,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdvicePayload {
    model_name: String,
    context_window: i64,
    temperature: f64,
    estimated_cost_per_1k_tokens: f64,
    #[serde(default)]
    reasoning: String,
}

fn parse_advice(value: &serde_json::Value) -> std::result::Result<ModelParams, String> {
    let payload: AdvicePayload =
        serde_json::from_value(value.clone()).map_err(|e| format!("schema mismatch: {e}"))?;
    if payload.model_name.trim().is_empty() {
        return Err("model_name is empty".to_string());
    }
    if payload.context_window <= 0 {
        return Err(format!(
            "context_window must be positive, got {}",
            payload.context_window
        ));
    }
    if !(0.0..=1.0).contains(&payload.temperature) {
        return Err(format!(
            "temperature {} outside [0, 1]",
            payload.temperature
        ));
    }
    if payload.estimated_cost_per_1k_tokens < 0.0 {
        return Err(format!(
            "negative cost estimate: {}",
            payload.estimated_cost_per_1k_tokens
        ));
    }
    Ok(ModelParams {
        model_name: payload.model_name,
        context_window: payload.context_window as u32,
        temperature: payload.temperature,
        estimated_cost_per_1k: payload.estimated_cost_per_1k_tokens,
        reasoning: payload.reasoning,
    })
}

#[async_trait]
impl ModelAdvisor for LlmModelAdvisor {
    async fn recommend(&self, config: &AgentConfiguration) -> Result<ModelParams> {
        let prompt = format!(
            r#"Recommend the optimal LLM for this agent configuration.

Agent role: {}
Capabilities: {}
Constraints: {}
Success criteria: {}

Consider task complexity vs cost, context window requirements, and specific
capability needs (coding, reasoning, analysis).

Recommend ONE model as a JSON object:
{{
    "model_name": "chosen model",
    "context_window": positive integer,
    "temperature": 0.0-1.0,
    "estimated_cost_per_1k_tokens": number,
    "reasoning": "why this model"
}}"#,
            config.role,
            config.capabilities.join(", "),
            config.constraints.join(", "),
            config.success_criteria,
        );

        let (params, _tokens) = generate_validated(
            self.client.as_ref(),
            JsonRequest::new(SYSTEM, &prompt),
            self.retries,
            Stage::ModelSelection,
            parse_advice,
        )
        .await?;

        tracing::info!(model = %params.model_name, reason = %params.reasoning, "model recommended");
        Ok(params)
    }
}
