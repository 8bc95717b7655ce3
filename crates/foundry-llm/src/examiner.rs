//! Probe answering and scoring - the agent under test and its judge
//!
//! [`LlmAgentProbe`] runs the candidate: the configuration's instruction
//! template is the system prompt and the selected model parameters are
//! applied per call, so each answer exercises exactly the agent that would
//! be deployed. [`LlmResponseScorer`] judges an answer against the
//! question's reference with a separate evaluator call.

use std::sync::Arc;

use async_trait::async_trait;

use foundry_core::collaborators::{AgentProbe, ResponseScorer, ScoredAnswer};
use foundry_core::config::AgentConfiguration;
use foundry_core::error::Stage;
use foundry_core::quality::ProbeQuestion;
use foundry_core::Result;

use crate::client::{generate_validated, JsonRequest, LlmClient};

const PARSE_RETRIES: u32 = 1;

const SCORER_SYSTEM: &str = "You are a strict but fair evaluator.";

/// Runs the candidate agent against one probe question at a time
pub struct LlmAgentProbe {
    client: Arc<dyn LlmClient>,
    retries: u32,
}

impl LlmAgentProbe {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            retries: PARSE_RETRIES,
        }
    }
}

fn parse_answer_text(value: &serde_json::Value) -> std::result::Result<String, String> {
    if let Some(text) = value["text"].as_str() {
        return Ok(text.trim().to_string());
    }
    // some models return the bare string despite the JSON instruction
    if let Some(text) = value.as_str() {
        return Ok(text.trim().to_string());
    }
    Err("reply has no \"text\" field".to_string())
}

#[async_trait]
impl AgentProbe for LlmAgentProbe {
    async fn answer(
        &self,
        config: &AgentConfiguration,
        question: &ProbeQuestion,
    ) -> Result<String> {
        let prompt = format!(
            r#"Answer this test question that evaluates your capabilities:

Question: {}

Provide a clear, concise answer. If you are unsure, explain your reasoning.

Return your answer in JSON format: {{"text": "your answer"}}"#,
            question.prompt
        );

        let request = JsonRequest {
            system: &config.instruction_template,
            prompt: &prompt,
            model_override: config.model.as_ref().map(|m| m.model_name.as_str()),
            temperature: config.model.as_ref().map(|m| m.temperature),
        };

        let (answer, _tokens) = generate_validated(
            self.client.as_ref(),
            request,
            self.retries,
            Stage::AgentProbe,
            parse_answer_text,
        )
        .await?;

        tracing::debug!(agent_id = %config.agent_id, chars = answer.len(), "probe answered");
        Ok(answer)
    }
}

/// Scores one answer against the question's expected-answer reference
pub struct LlmResponseScorer {
    client: Arc<dyn LlmClient>,
    retries: u32,
}

impl LlmResponseScorer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            retries: PARSE_RETRIES,
        }
    }
}

fn parse_score(value: &serde_json::Value) -> std::result::Result<ScoredAnswer, String> {
    let correct = value["correct"]
        .as_bool()
        .ok_or_else(|| "reply has no boolean \"correct\" field".to_string())?;
    let score = value["score"]
        .as_f64()
        .ok_or_else(|| "reply has no numeric \"score\" field".to_string())?;
    Ok(ScoredAnswer {
        correct,
        score: score.clamp(0.0, 1.0),
    })
}

#[async_trait]
impl ResponseScorer for LlmResponseScorer {
    async fn score(&self, question: &ProbeQuestion, answer: &str) -> Result<ScoredAnswer> {
        let prompt = format!(
            r#"Compare the agent's response to the expected answer.

Question: {}
Expected answer: {}
Agent's response: {}

Evaluate the response on correctness, semantic similarity to the expected
answer, and completeness of the key points.

Return JSON:
{{
    "correct": true or false,
    "score": 0.0-1.0,
    "reasoning": "brief explanation"
}}"#,
            question.prompt, question.expected_answer, answer
        );

        let (scored, _tokens) = generate_validated(
            self.client.as_ref(),
            JsonRequest::new(SCORER_SYSTEM, &prompt),
            self.retries,
            Stage::ResponseScoring,
            parse_score,
        )
        .await?;

        Ok(scored)
    }
}
