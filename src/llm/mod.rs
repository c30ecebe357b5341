//! LLM Gateway (spec §4.3): chat-completion and embedding calls, abstracted
//! behind a trait so the orchestrator never talks to a provider directly.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Selects model tier and `max_tokens` for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Low-latency tier: intent classification, simple extraction.
    Fast,
    /// Higher-quality tier: query planning, category deepening.
    Powerful,
    /// Embedding generation.
    Embedding,
}

impl Task {
    fn max_tokens(self) -> u32 {
        match self {
            Task::Fast => 256,
            Task::Powerful => 1024,
            Task::Embedding => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub json_mode: bool,
    pub temperature: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(String),
    #[error("llm authentication error: {0}")]
    Authentication(String),
    #[error("llm rate limited")]
    RateLimited,
    #[error("llm returned non-JSON content in JSON mode: {0}")]
    InvalidJson(String),
}

/// Cumulative token usage, updated atomically — safe to read from any task
/// without locking (spec §5 shared-resources guarantee).
#[derive(Debug, Default)]
pub struct UsageCounters {
    pub prompt_tokens: AtomicU64,
    pub completion_tokens: AtomicU64,
}

impl UsageCounters {
    fn record(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn chat(
        &self,
        task: Task,
        system: &str,
        user: &str,
        opts: ChatOptions,
    ) -> Result<String, LlmError>;

    async fn chat_json(
        &self,
        task: Task,
        system: &str,
        user: &str,
    ) -> Result<Value, LlmError> {
        let opts = ChatOptions {
            json_mode: true,
            temperature: 0.2,
        };
        let raw = self.chat(task, system, user, opts).await?;
        let parsed: Value =
            serde_json::from_str(&raw).map_err(|_| LlmError::InvalidJson(raw.clone()))?;
        if !parsed.is_object() {
            return Err(LlmError::InvalidJson(raw));
        }
        Ok(parsed)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    fn usage(&self) -> (u64, u64);
}

/// `reqwest`-based implementation targeting an OpenAI-compatible
/// chat-completions + embeddings API.
pub struct HttpLlmGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    fast_model: String,
    powerful_model: String,
    embedding_model: String,
    embedding_dimension: usize,
    usage: UsageCounters,
}

impl HttpLlmGateway {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        fast_model: String,
        powerful_model: String,
        embedding_model: String,
        embedding_dimension: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
            fast_model,
            powerful_model,
            embedding_model,
            embedding_dimension,
            usage: UsageCounters::default(),
        }
    }

    fn model_for(&self, task: Task) -> &str {
        match task {
            Task::Fast => &self.fast_model,
            Task::Powerful => &self.powerful_model,
            Task::Embedding => &self.embedding_model,
        }
    }

    async fn post_with_retries(&self, path: &str, body: Value) -> Result<Value, LlmError> {
        const MAX_RETRIES: u32 = 2;
        let mut attempt = 0;

        loop {
            let response = self
                .client
                .post(format!("{}{}", self.base_url, path))
                .bearer_auth(&self.api_key)
                .json(&body)
                .timeout(Duration::from_secs(30))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                    return Err(LlmError::Authentication(
                        "invalid or expired LLM API key".to_string(),
                    ));
                }
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    return Err(LlmError::RateLimited);
                }
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<Value>()
                        .await
                        .map_err(|e| LlmError::Transport(e.to_string()));
                }
                Ok(resp) => {
                    let status = resp.status();
                    if attempt >= MAX_RETRIES {
                        return Err(LlmError::Transport(format!("http status {status}")));
                    }
                }
                Err(err) => {
                    if attempt >= MAX_RETRIES {
                        return Err(LlmError::Transport(err.to_string()));
                    }
                }
            }

            let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn chat(
        &self,
        task: Task,
        system: &str,
        user: &str,
        opts: ChatOptions,
    ) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model_for(task),
            "temperature": opts.temperature,
            "max_tokens": task.max_tokens(),
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        if opts.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

        let response = self.post_with_retries("/chat/completions", body).await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let prompt_tokens = response["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let completion_tokens = response["usage"]["completion_tokens"].as_u64().unwrap_or(0);
        self.usage.record(prompt_tokens, completion_tokens);

        Ok(content)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
        });
        let response = self.post_with_retries("/embeddings", body).await?;

        let data = response["data"].as_array().cloned().unwrap_or_default();
        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let vector: Vec<f32> = item["embedding"]
                .as_array()
                .map(|arr| arr.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
                .unwrap_or_default();
            if vector.len() != self.embedding_dimension {
                tracing::warn!(
                    expected = self.embedding_dimension,
                    got = vector.len(),
                    "embedding dimension mismatch"
                );
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }

    fn usage(&self) -> (u64, u64) {
        self.usage.totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_max_tokens_scale_with_tier() {
        assert!(Task::Powerful.max_tokens() > Task::Fast.max_tokens());
    }

    #[test]
    fn usage_counters_accumulate_atomically() {
        let counters = UsageCounters::default();
        counters.record(10, 5);
        counters.record(3, 2);
        assert_eq!(counters.totals(), (13, 7));
    }
}
