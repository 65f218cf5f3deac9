use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use relato_common::LlmError;
use tracing::{debug, warn};

use crate::schema::StructuredOutput;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

const RETRY_BASE: Duration = Duration::from_millis(500);

/// The §4.3 capability: `Complete(system, user, responseSchema) -> T | Error`.
/// Not a `dyn Trait` — `complete`'s generic parameter would make the trait
/// object-unsafe, so callers hold a concrete `LlmClient` value instead.
#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    http: reqwest::Client,
    max_retries: u32,
    calls: std::sync::Arc<AtomicU64>,
    retries: std::sync::Arc<AtomicU64>,
}

#[derive(Clone)]
enum Provider {
    Claude { api_key: String, model: String },
    OpenAi { api_key: String, model: String },
}

impl LlmClient {
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self::new(
            Provider::Claude {
                api_key: api_key.into(),
                model: model.into(),
            },
            max_retries,
        )
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self::new(
            Provider::OpenAi {
                api_key: api_key.into(),
                model: model.into(),
            },
            max_retries,
        )
    }

    fn new(provider: Provider, max_retries: u32) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
            max_retries,
            calls: std::sync::Arc::new(AtomicU64::new(0)),
            retries: std::sync::Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn retry_count(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Issue a schema-constrained completion. Retries transport errors and
    /// schema-violations up to `max_retries` with exponential backoff and
    /// jitter; never panics or raises, always resolves to `Ok`/`Err`.
    pub async fn complete<T: StructuredOutput>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, LlmError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let schema = T::json_schema_strict();
        let mut last_err = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                self.retries.fetch_add(1, Ordering::Relaxed);
                let backoff = RETRY_BASE * 2u32.pow(attempt - 1);
                let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                tokio::time::sleep(backoff + jitter).await;
            }

            let raw = match self.raw_complete(system, user, &schema, T::type_name()).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(attempt, error = %e, "llm: transport error");
                    last_err = e;
                    continue;
                }
            };

            match serde_json::from_str::<T>(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt, error = %e, "llm: schema violation");
                    last_err = format!("{e}: {raw}");
                }
            }
        }

        Err(LlmError::SchemaViolation(last_err, self.max_retries + 1))
    }

    async fn raw_complete(
        &self,
        system: &str,
        user: &str,
        schema: &serde_json::Value,
        type_name: String,
    ) -> Result<String, String> {
        match &self.provider {
            Provider::Claude { api_key, model } => {
                self.claude_complete(api_key, model, system, user, schema)
                    .await
            }
            Provider::OpenAi { api_key, model } => {
                self.openai_complete(api_key, model, system, user, schema, type_name)
                    .await
            }
        }
    }

    async fn claude_complete(
        &self,
        api_key: &str,
        model: &str,
        system: &str,
        user: &str,
        schema: &serde_json::Value,
    ) -> Result<String, String> {
        let url = format!("{ANTHROPIC_API_URL}/messages");
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).map_err(|e| e.to_string())?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let tool_name = "emit_result";
        let body = serde_json::json!({
            "model": model,
            "max_tokens": 4096,
            "system": system,
            "messages": [{"role": "user", "content": user}],
            "tools": [{
                "name": tool_name,
                "description": "Emit the structured result.",
                "input_schema": schema,
            }],
            "tool_choice": {"type": "tool", "name": tool_name},
        });

        debug!(model, "claude: structured completion request");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("claude error ({status}): {text}"));
        }

        let parsed: ClaudeResponse = response.json().await.map_err(|e| e.to_string())?;
        let tool_use = parsed
            .content
            .into_iter()
            .find(|c| c.kind == "tool_use")
            .ok_or_else(|| "no tool_use block in claude response".to_string())?;

        serde_json::to_string(&tool_use.input.unwrap_or_default()).map_err(|e| e.to_string())
    }

    async fn openai_complete(
        &self,
        api_key: &str,
        model: &str,
        system: &str,
        user: &str,
        schema: &serde_json::Value,
        type_name: String,
    ) -> Result<String, String> {
        let url = format!("{OPENAI_API_URL}/chat/completions");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| e.to_string())?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": type_name,
                    "schema": schema,
                    "strict": true,
                }
            },
        });

        debug!(model, "openai: structured completion request");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("openai error ({status}): {text}"));
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|e| e.to_string())?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "no content in openai response".to_string())
    }
}

#[derive(serde::Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContentBlock>,
}

#[derive(serde::Deserialize)]
struct ClaudeContentBlock {
    #[serde(rename = "type")]
    kind: String,
    input: Option<serde_json::Value>,
}

#[derive(serde::Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(serde::Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(serde::Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_per_attempt() {
        let attempt1 = RETRY_BASE * 2u32.pow(0);
        let attempt2 = RETRY_BASE * 2u32.pow(1);
        let attempt3 = RETRY_BASE * 2u32.pow(2);
        assert_eq!(attempt1, Duration::from_millis(500));
        assert_eq!(attempt2, Duration::from_millis(1000));
        assert_eq!(attempt3, Duration::from_millis(2000));
    }

    #[test]
    fn call_and_retry_counters_start_at_zero() {
        let client = LlmClient::claude("key", "model", 3);
        assert_eq!(client.call_count(), 0);
        assert_eq!(client.retry_count(), 0);
    }
}
