//! Chat-completion client and the cached completion path.
//!
//! [`OpenAiClient`] calls `POST {base_url}/chat/completions`. Failures are
//! classified as:
//!
//! - HTTP 429 or 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network error → retry
//!
//! [`CachedCompleter`] puts the [`ResponseCache`] in front of the client:
//! a hit never reaches the network, a miss is retried, parsed, and only
//! then cached. A cached response that no longer parses is fatal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::config::LlmConfig;
use crate::error::{CacheError, CompletionError, FetchError, StageError};
use crate::models::ArticleDoc;
use crate::retry::{retry, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A single chat completion call, returning the assistant's text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, FetchError>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiClient {
    /// Build a client from config. The API key is read from the
    /// environment variable named by `llm.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("{} environment variable not set", config.api_key_env),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, FetchError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, "chat completion"))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("LLM API error {}: {}", status, body_text);
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                FetchError::Transient(message)
            } else {
                FetchError::Permanent(message)
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::Permanent(format!("invalid LLM response body: {}", e)))?;
        parse_completion_response(&json)
    }
}

/// Extract `choices[0].message.content` from a completion response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String, FetchError> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            FetchError::Permanent("Invalid LLM response: missing choices[0].message.content".into())
        })?;

    if content.trim().is_empty() {
        return Err(FetchError::Permanent("LLM returned an empty completion".into()));
    }
    Ok(content.to_string())
}

/// Decode a model's JSON answer. Tries the raw text first, then the body of
/// a single fenced code block (```` ```json ... ``` ````).
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let strict_err = match serde_json::from_str::<T>(text.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match unfence(text) {
        Some(inner) => serde_json::from_str::<T>(inner).map_err(|e| e.to_string()),
        None => Err(strict_err.to_string()),
    }
}

fn unfence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Model calls behind the response cache.
pub struct CachedCompleter {
    cache: Arc<dyn ResponseCache>,
    client: Arc<dyn CompletionClient>,
    policy: RetryPolicy,
}

impl CachedCompleter {
    pub fn new(
        cache: Arc<dyn ResponseCache>,
        client: Arc<dyn CompletionClient>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            client,
            policy,
        }
    }

    /// Complete `messages` with `model` and decode the answer as `T`.
    ///
    /// Cache hit: decoded without a network call; a decode failure is
    /// [`CacheError::Corrupt`]. Cache miss: the call is retried per policy,
    /// decoded, and only a decodable response is cached.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        model: &str,
    ) -> Result<T, CompletionError> {
        let key = CacheKey::new(messages, model);

        if let Some(cached) = self.cache.get(&key).await? {
            debug!(fingerprint = %key.fingerprint, model, "cache hit");
            return parse_model_json::<T>(&cached).map_err(|reason| {
                CacheError::Corrupt {
                    fingerprint: key.fingerprint.clone(),
                    model: model.to_string(),
                    reason,
                }
                .into()
            });
        }

        debug!(fingerprint = %key.fingerprint, model, "cache miss");
        let response = retry(&self.policy, "chat completion", |_| {
            self.client.complete(messages, model)
        })
        .await
        .map_err(StageError::from)?;

        let value = parse_model_json::<T>(&response).map_err(StageError::Parse)?;
        self.cache.put(&key, &response).await?;
        Ok(value)
    }
}

/// Per-document results of one model-backed stage, sorted by document key.
#[derive(Debug)]
pub struct ModelBatch<'a, T> {
    pub labeled: Vec<(&'a ArticleDoc, T)>,
    pub failed: usize,
}

/// Run `call` for every document with at most `parallelism` calls in
/// flight. Per-document [`StageError`]s drop that document and are
/// counted; the first [`CacheError`] aborts the batch, cancelling the
/// calls still in flight.
pub async fn run_model_batch<'a, T, F, Fut>(
    stage: &str,
    docs: Vec<&'a ArticleDoc>,
    parallelism: usize,
    call: F,
) -> Result<ModelBatch<'a, T>, CacheError>
where
    F: Fn(&'a ArticleDoc) -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
{
    let mut results = stream::iter(docs)
        .map(|doc| {
            let fut = call(doc);
            async move { (doc, fut.await) }
        })
        .buffer_unordered(parallelism.max(1));

    let mut batch = ModelBatch {
        labeled: Vec::new(),
        failed: 0,
    };
    while let Some((doc, result)) = results.next().await {
        match result {
            Ok(value) => batch.labeled.push((doc, value)),
            Err(CompletionError::Stage(err)) => {
                warn!(stage, item_id = doc.key.0, error = %err, "dropping document");
                batch.failed += 1;
            }
            Err(CompletionError::Cache(err)) => return Err(err),
        }
    }

    batch.labeled.sort_by_key(|(doc, _)| doc.key);
    Ok(batch)
}
