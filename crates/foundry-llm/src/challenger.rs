//! Probe-question generation - challenge the candidate at its frontier
//!
//! The generator asks for a small set of questions whose difficulties span
//! three bands, targeting roughly a 50% pass rate. The reply shape is
//! validated here; band coverage and count are enforced again by the
//! quality gate, which regenerates malformed sets on its own budget.

use std::sync::Arc;

use async_trait::async_trait;

use foundry_core::collaborators::QuestionGenerator;
use foundry_core::config::AgentConfiguration;
use foundry_core::error::Stage;
use foundry_core::quality::{ProbeQuestion, PROBE_COUNT};
use foundry_core::Result;

use crate::client::{generate_validated, JsonRequest, LlmClient};

const PARSE_RETRIES: u32 = 1;

const SYSTEM: &str = "You are a demanding examiner generating probe questions \
at the frontier of an agent's capability.";

/// LLM-backed [`QuestionGenerator`]
pub struct LlmQuestionGenerator {
    client: Arc<dyn LlmClient>,
    retries: u32,
}

impl LlmQuestionGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            retries: PARSE_RETRIES,
        }
    }
}

fn parse_questions(value: &serde_json::Value) -> std::result::Result<Vec<ProbeQuestion>, String> {
    let entries = value
        .as_array()
        .ok_or_else(|| "expected a JSON array of questions".to_string())?;

    let mut questions = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        // tolerate the short field spellings some models prefer
        let prompt = entry["question"]
            .as_str()
            .or_else(|| entry["q"].as_str())
            .ok_or_else(|| format!("entry {} has no question text", i + 1))?;
        let expected = entry["expected_answer"]
            .as_str()
            .or_else(|| entry["answer"].as_str())
            .ok_or_else(|| format!("entry {} has no expected answer", i + 1))?;
        let difficulty = entry["difficulty"]
            .as_f64()
            .ok_or_else(|| format!("entry {} has no difficulty", i + 1))?;

        questions.push(ProbeQuestion {
            prompt: prompt.trim().to_string(),
            difficulty: difficulty.clamp(0.0, 1.0),
            expected_answer: expected.trim().to_string(),
            tests_capability: entry["tests_capability"]
                .as_str()
                .map(|s| s.trim().to_string()),
        });
    }
    Ok(questions)
}

#[async_trait]
impl QuestionGenerator for LlmQuestionGenerator {
    async fn generate(&self, config: &AgentConfiguration) -> Result<Vec<ProbeQuestion>> {
        let prompt = format!(
            r#"Generate {PROBE_COUNT} test questions for this agent:

Agent role: {}
Capabilities: {}

Requirements:
1. Span three difficulty bands: easy (0.2-0.4), medium (0.5-0.6), hard (0.6-0.9)
2. Target a 50% overall pass rate: questions at the frontier of capability,
   not trivial and not impossible
3. Base questions on realistic professional tasks for the role
4. Provide a concise expected answer (1-2 sentences) for each
5. Rate difficulty from 0.0 (trivial) to 1.0 (impossible)

Return ONLY a JSON array, no markdown:
[
  {{
    "question": "text",
    "expected_answer": "correct answer or key criteria",
    "difficulty": 0.3,
    "tests_capability": "which capability this tests"
  }}
]"#,
            config.role,
            config.capabilities.join(", "),
        );

        let (questions, tokens) = generate_validated(
            self.client.as_ref(),
            JsonRequest::new(SYSTEM, &prompt),
            self.retries,
            Stage::QuestionGeneration,
            parse_questions,
        )
        .await?;

        tracing::debug!(
            count = questions.len(),
            tokens,
            "probe questions generated"
        );
        Ok(questions)
    }
}
