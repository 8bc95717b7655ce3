//! Provider-agnostic JSON-mode LLM client
//!
//! Every collaborator in this crate speaks to a model through [`LlmClient`]:
//! one call in, one validated JSON value out. Providers share a common HTTP
//! backend with a concurrency cap and bounded retry with exponential backoff
//! on rate limits and timeouts. Model output is fenced-markdown tolerant:
//! we strip code fences before parsing and fall back to the outermost
//! JSON object/array when a model wraps its payload in prose.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::Semaphore;

use foundry_core::error::Stage;
use foundry_core::FoundryError;

/// Output token ceiling for every call
const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Default sampling temperature when the caller does not override it
const DEFAULT_TEMPERATURE: f64 = 0.2;

/// One JSON-mode request
#[derive(Debug, Clone, Copy)]
pub struct JsonRequest<'a> {
    /// System instruction framing the call
    pub system: &'a str,

    /// The user prompt
    pub prompt: &'a str,

    /// Model to use instead of the provider default
    pub model_override: Option<&'a str>,

    /// Temperature to use instead of the provider default
    pub temperature: Option<f64>,
}

impl<'a> JsonRequest<'a> {
    pub fn new(system: &'a str, prompt: &'a str) -> Self {
        Self {
            system,
            prompt,
            model_override: None,
            temperature: None,
        }
    }
}

/// Parsed model reply plus usage accounting
#[derive(Debug, Clone)]
pub struct JsonReply {
    pub value: serde_json::Value,
    pub total_tokens: u64,
}

/// A JSON-producing model endpoint
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name, used in logs and failure attribution
    fn name(&self) -> &str;

    /// Run one request and return the parsed JSON payload
    async fn generate_json(&self, request: JsonRequest<'_>) -> Result<JsonReply>;
}

/// Provider configuration, usually read from the environment
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_concurrent_requests: usize,
}

impl ProviderConfig {
    /// Read a provider's configuration from the environment.
    /// Known providers: "google", "openai".
    pub fn from_env(provider: &str) -> Result<Self> {
        match provider {
            "google" => Ok(Self {
                name: "google".to_string(),
                api_key: std::env::var("GOOGLE_API_KEY")
                    .context("GOOGLE_API_KEY is not set")?,
                base_url: std::env::var("GOOGLE_BASE_URL").ok(),
                default_model: std::env::var("GOOGLE_MODEL")
                    .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
                timeout_secs: 60,
                max_retries: 3,
                max_concurrent_requests: 8,
            }),
            "openai" => Ok(Self {
                name: "openai".to_string(),
                api_key: std::env::var("OPENAI_API_KEY")
                    .context("OPENAI_API_KEY is not set")?,
                base_url: std::env::var("OPENAI_BASE_URL").ok(),
                default_model: std::env::var("OPENAI_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                timeout_secs: 60,
                max_retries: 3,
                max_concurrent_requests: 8,
            }),
            other => Err(anyhow!("unknown LLM provider: {other}")),
        }
    }
}

/// Shared HTTP plumbing: client, concurrency cap, retry with backoff
struct HttpBackend {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    config: ProviderConfig,
}

impl HttpBackend {
    fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create HTTP client")?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests));

        Ok(Self {
            client,
            permits,
            config,
        })
    }

    async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| anyhow!("request limiter closed: {e}"))?;

        let mut retries = 0;
        loop {
            let response = self
                .client
                .post(url)
                .headers(headers.clone())
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json().await.context("failed to parse JSON response");
                    }
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        && retries < self.config.max_retries
                    {
                        let backoff = Duration::from_millis(500 * (retries + 1) as u64);
                        tracing::warn!(
                            provider = %self.config.name,
                            ?backoff,
                            "rate limited, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        retries += 1;
                        continue;
                    }
                    let error_text = resp.text().await.unwrap_or_default();
                    return Err(anyhow!("HTTP {status}: {error_text}"));
                }
                Err(e) if e.is_timeout() && retries < self.config.max_retries => {
                    let backoff = Duration::from_millis(500 * (retries + 1) as u64);
                    tracing::warn!(provider = %self.config.name, ?backoff, "timeout, retrying");
                    tokio::time::sleep(backoff).await;
                    retries += 1;
                }
                Err(e) => return Err(anyhow!("request failed: {e}")),
            }
        }
    }
}

/// Google Gemini JSON-mode client
pub struct GeminiClient {
    backend: HttpBackend,
}

impl GeminiClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            backend: HttpBackend::new(config)?,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn name(&self) -> &str {
        &self.backend.config.name
    }

    async fn generate_json(&self, request: JsonRequest<'_>) -> Result<JsonReply> {
        let base_url = self
            .backend
            .config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let model = request
            .model_override
            .unwrap_or(&self.backend.config.default_model);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            base_url, model, self.backend.config.api_key
        );

        let body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            }
        });

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let json_response = self.backend.post_json(&url, headers, body).await?;

        let content = json_response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow!("response has no text candidate"))?;
        let total_tokens = json_response["usageMetadata"]["totalTokenCount"]
            .as_u64()
            .unwrap_or(0);

        Ok(JsonReply {
            value: extract_json(content)?,
            total_tokens,
        })
    }
}

/// Client for OpenAI and OpenAI-compatible chat endpoints
pub struct OpenAiCompatClient {
    backend: HttpBackend,
}

impl OpenAiCompatClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            backend: HttpBackend::new(config)?,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.backend.config.name
    }

    async fn generate_json(&self, request: JsonRequest<'_>) -> Result<JsonReply> {
        let url = self
            .backend
            .config
            .base_url
            .as_ref()
            .map(|u| format!("{u}/chat/completions"))
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        let model = request
            .model_override
            .unwrap_or(&self.backend.config.default_model);

        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "max_tokens": MAX_OUTPUT_TOKENS,
            "response_format": { "type": "json_object" },
        });

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.backend.config.api_key))
                .context("API key is not a valid header value")?,
        );

        let json_response = self.backend.post_json(&url, headers, body).await?;

        let content = json_response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("response has no message content"))?;
        let total_tokens = json_response["usage"]["total_tokens"].as_u64().unwrap_or(0);

        Ok(JsonReply {
            value: extract_json(content)?,
            total_tokens,
        })
    }
}

/// Build the client named by `FOUNDRY_PROVIDER` (default "google")
pub fn client_from_env() -> Result<Arc<dyn LlmClient>> {
    let provider =
        std::env::var("FOUNDRY_PROVIDER").unwrap_or_else(|_| "google".to_string());
    let config = ProviderConfig::from_env(&provider)?;
    match provider.as_str() {
        "google" => Ok(Arc::new(GeminiClient::new(config)?)),
        _ => Ok(Arc::new(OpenAiCompatClient::new(config)?)),
    }
}

/// Pull a JSON value out of model text: strip markdown fences, then parse,
/// then fall back to the outermost object or array.
pub fn extract_json(raw: &str) -> Result<serde_json::Value> {
    let stripped = if let Some(fenced) = raw.split("```json").nth(1) {
        fenced.split("```").next().unwrap_or(fenced)
    } else if let Some(fenced) = raw.split("```").nth(1) {
        fenced
    } else {
        raw
    };
    let stripped = stripped.trim();

    if let Ok(value) = serde_json::from_str(stripped) {
        return Ok(value);
    }

    // last resort: the outermost {...} or [...] window
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (stripped.find(open), stripped.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&stripped[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(anyhow!("model output is not valid JSON: {stripped:.120}"))
}

/// Call the model up to `1 + retries` times, parsing and validating each
/// reply with `parse`. A transient transport error or a reply that fails
/// validation consumes one try; exhaustion becomes an upstream failure
/// attributed to `stage`. These bounded local retries never touch the
/// outer quality-attempt budget.
pub async fn generate_validated<T, F>(
    client: &dyn LlmClient,
    request: JsonRequest<'_>,
    retries: u32,
    stage: Stage,
    parse: F,
) -> foundry_core::Result<(T, u64)>
where
    T: Send,
    F: Fn(&serde_json::Value) -> std::result::Result<T, String> + Send + Sync,
{
    let mut last_issue = String::new();

    for call in 1..=(1 + retries) {
        match client.generate_json(request).await {
            Ok(reply) => match parse(&reply.value) {
                Ok(parsed) => return Ok((parsed, reply.total_tokens)),
                Err(issue) => {
                    tracing::warn!(provider = client.name(), %stage, call, %issue, "reply failed validation");
                    last_issue = issue;
                }
            },
            Err(e) => {
                tracing::warn!(provider = client.name(), %stage, call, error = %e, "model call failed");
                last_issue = e.to_string();
            }
        }
    }

    Err(FoundryError::upstream(
        stage,
        format!("no valid reply after {} calls: {last_issue}", 1 + retries),
    ))
}
