//! Two-tier relevance classification.
//!
//! Every keyword candidate for a topic goes through the maybe-relevant
//! tier (loose prompt, small model, short content limit). Only documents
//! labeled relevant there reach the highly-relevant tier (strict prompt,
//! large model, long content limit). A `relevant: false` at either tier
//! ends the document's path for that topic.
//!
//! Documents longer than a tier's limit are not sent to the model. They
//! are labeled relevant with [`OVERSIZED_REASONING`] so a person reviews
//! them instead of the pipeline dropping them silently.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{LlmConfig, Topic};
use crate::error::{CacheError, CompletionError, Stage};
use crate::llm::{run_model_batch, CachedCompleter, ModelBatch};
use crate::models::{ArticleDoc, Relevance};
use crate::prompts;

pub const OVERSIZED_REASONING: &str =
    "The document is too long to process, but it might be relevant to you. Please review it yourself.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    MaybeRelevant,
    HighlyRelevant,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::MaybeRelevant => "maybe_relevant",
            Tier::HighlyRelevant => "highly_relevant",
        }
    }

    /// Attribute label, e.g. `filter_spec_iac_maybe_relevant`.
    pub fn label(&self, topic: &str) -> String {
        format!("filter_spec_{}_{}", topic, self.as_str())
    }

    pub fn stage(&self) -> Stage {
        match self {
            Tier::MaybeRelevant => Stage::ClassifyMaybe,
            Tier::HighlyRelevant => Stage::ClassifyHighly,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Tier::MaybeRelevant => prompts::MAYBE_RELEVANT_SYSTEM,
            Tier::HighlyRelevant => prompts::HIGHLY_RELEVANT_SYSTEM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierSettings {
    pub model: String,
    /// Maximum content length in characters.
    pub content_limit: usize,
}

pub struct RelevanceClassifier {
    completer: Arc<CachedCompleter>,
    maybe: TierSettings,
    highly: TierSettings,
    parallelism: usize,
}

impl RelevanceClassifier {
    pub fn new(
        completer: Arc<CachedCompleter>,
        maybe: TierSettings,
        highly: TierSettings,
        parallelism: usize,
    ) -> Self {
        Self {
            completer,
            maybe,
            highly,
            parallelism,
        }
    }

    pub fn from_config(completer: Arc<CachedCompleter>, config: &LlmConfig) -> Self {
        Self::new(
            completer,
            TierSettings {
                model: config.maybe_relevant_model.clone(),
                content_limit: config.maybe_relevant_limit,
            },
            TierSettings {
                model: config.highly_relevant_model.clone(),
                content_limit: config.highly_relevant_limit,
            },
            config.parallelism,
        )
    }

    pub fn settings(&self, tier: Tier) -> &TierSettings {
        match tier {
            Tier::MaybeRelevant => &self.maybe,
            Tier::HighlyRelevant => &self.highly,
        }
    }

    /// Classify one document for `topic` at `tier`.
    pub async fn classify(
        &self,
        doc: &ArticleDoc,
        topic: &Topic,
        tier: Tier,
    ) -> Result<Relevance, CompletionError> {
        let settings = self.settings(tier);

        if doc.content.chars().count() > settings.content_limit {
            debug!(
                item_id = doc.key.0,
                topic = %topic.name,
                tier = tier.as_str(),
                "content over limit, flagging for review"
            );
            return Ok(Relevance {
                relevant: true,
                reasoning: OVERSIZED_REASONING.to_string(),
            });
        }

        let messages = prompts::messages(tier.system_prompt(), &topic.description, &doc.content);
        self.completer
            .complete_json::<Relevance>(&messages, &settings.model)
            .await
    }

    /// Classify a batch. Documents whose call fails are dropped and counted.
    pub async fn classify_batch<'a>(
        &self,
        docs: Vec<&'a ArticleDoc>,
        topic: &Topic,
        tier: Tier,
    ) -> Result<ModelBatch<'a, Relevance>, CacheError> {
        let total = docs.len();
        let batch = run_model_batch(tier.stage().as_str(), docs, self.parallelism, |doc| {
            self.classify(doc, topic, tier)
        })
        .await?;

        info!(
            topic = %topic.name,
            tier = tier.as_str(),
            total,
            relevant = batch.labeled.iter().filter(|(_, r)| r.relevant).count(),
            failed = batch.failed,
            "classified"
        );
        Ok(batch)
    }
}
