//! Summaries for highly relevant documents.
//!
//! The summarizer is conditioned on the highly-relevant tier's reasoning,
//! which stands in for the search description in the user prompt. Length
//! is asked for in the prompt and not enforced here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::error::{CacheError, CompletionError, Stage};
use crate::llm::{run_model_batch, CachedCompleter, ModelBatch};
use crate::models::{ArticleDoc, RunKey, Summary};
use crate::prompts;

/// Attribute label for a topic's summaries.
pub fn summary_label(topic: &str) -> String {
    format!("summary_{}", topic)
}

pub struct Summarizer {
    completer: Arc<CachedCompleter>,
    model: String,
    parallelism: usize,
}

impl Summarizer {
    pub fn new(completer: Arc<CachedCompleter>, model: impl Into<String>, parallelism: usize) -> Self {
        Self {
            completer,
            model: model.into(),
            parallelism,
        }
    }

    pub async fn summarize(&self, content: &str, reasoning: &str) -> Result<Summary, CompletionError> {
        let messages = prompts::messages(prompts::SUMMARY_SYSTEM, reasoning, content);
        self.completer
            .complete_json::<Summary>(&messages, &self.model)
            .await
    }

    /// Summarize each document using its classifier reasoning.
    pub async fn summarize_batch<'a>(
        &self,
        topic: &str,
        docs: Vec<(&'a ArticleDoc, String)>,
    ) -> Result<ModelBatch<'a, Summary>, CacheError> {
        let total = docs.len();
        let reasoning: HashMap<RunKey, String> =
            docs.iter().map(|(d, r)| (d.key, r.clone())).collect();
        let docs: Vec<&'a ArticleDoc> = docs.into_iter().map(|(d, _)| d).collect();
        let reasoning = &reasoning;

        let batch = run_model_batch(Stage::Summarize.as_str(), docs, self.parallelism, |doc| async move {
            let why = reasoning.get(&doc.key).map(String::as_str).unwrap_or_default();
            self.summarize(&doc.content, why).await
        })
        .await?;

        info!(topic, total, summarized = batch.labeled.len(), failed = batch.failed, "summarized");
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_format() {
        assert_eq!(summary_label("iac"), "summary_iac");
    }
}
