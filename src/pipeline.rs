//! One partition run, end to end.
//!
//! ```text
//! collect ─▶ fetch ─▶ per topic: keyword filter ─▶ maybe_relevant
//!                                  ─▶ highly_relevant ─▶ summarize
//!                     ─▶ merge attributes ─▶ replace partition
//! ```
//!
//! Per-document failures shrink the working set and show up in the
//! [`RunReport`] counts. Failures that make the partition's output
//! untrustworthy (id range lookup, cache corruption, the final write)
//! abort the run with a [`PartitionError`] naming the stage; nothing is
//! persisted in that case.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::article::{ArticleSource, WebArticleClient};
use crate::cache::ResponseCache;
use crate::classify::{RelevanceClassifier, Tier};
use crate::collect::ItemCollector;
use crate::config::{Config, Topic};
use crate::error::{PartitionError, Stage};
use crate::fetcher::RetryingFetcher;
use crate::keywords::KeywordRouter;
use crate::llm::{CachedCompleter, CompletionClient, OpenAiClient};
use crate::models::{ArticleDoc, Item, NewAttribute, Partition};
use crate::sources::{HackerNewsClient, ItemSource};
use crate::store::SqliteStore;
use crate::summarize::{summary_label, Summarizer};
use crate::writer::{PartitionWriter, WriteSummary};

/// External collaborators of a run.
pub struct Collaborators {
    pub items: Arc<dyn ItemSource>,
    pub articles: Arc<dyn ArticleSource>,
    pub completion: Arc<dyn CompletionClient>,
    pub cache: Arc<dyn ResponseCache>,
    pub store: SqliteStore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub input: usize,
    pub relevant: usize,
    pub not_relevant: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicReport {
    pub topic: String,
    /// Documents passing the keyword filter.
    pub filtered: usize,
    pub maybe_relevant: TierCounts,
    pub highly_relevant: TierCounts,
    pub summarized: usize,
    pub summary_failed: usize,
}

/// Counts at every stage boundary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub partition_start: i64,
    pub partition_end: i64,
    /// Ids looked up in the item source.
    pub scanned: usize,
    pub item_failures: usize,
    /// Stories with a link inside the partition.
    pub collected: usize,
    /// Stories whose article text was fetched.
    pub fetched: usize,
    /// Stories whose article fetch failed.
    pub failed: usize,
    pub topics: Vec<TopicReport>,
    pub written: WriteSummary,
}

pub struct PipelineDriver {
    collector: ItemCollector,
    articles: Arc<dyn ArticleSource>,
    article_fetcher: RetryingFetcher,
    classifier: RelevanceClassifier,
    summarizer: Summarizer,
    writer: PartitionWriter,
}

impl PipelineDriver {
    pub fn new(config: &Config, parts: Collaborators) -> Self {
        let policy = config.retry.policy();
        let completer = Arc::new(CachedCompleter::new(
            parts.cache,
            parts.completion,
            policy.clone(),
        ));

        Self {
            collector: ItemCollector::new(
                parts.items,
                RetryingFetcher::new(policy.clone(), config.source.parallelism),
                config.source.probe_window,
            ),
            articles: parts.articles,
            article_fetcher: RetryingFetcher::new(policy, config.articles.parallelism),
            classifier: RelevanceClassifier::from_config(completer.clone(), &config.llm),
            summarizer: Summarizer::new(
                completer,
                config.llm.summary_model.clone(),
                config.llm.parallelism,
            ),
            writer: PartitionWriter::new(parts.store),
        }
    }

    /// Wire the HTTP clients from config. The store doubles as the
    /// response cache.
    pub fn from_config(config: &Config, store: SqliteStore) -> Result<Self> {
        let parts = Collaborators {
            items: Arc::new(HackerNewsClient::new(&config.source)?),
            articles: Arc::new(WebArticleClient::new(&config.articles)?),
            completion: Arc::new(OpenAiClient::new(&config.llm)?),
            cache: Arc::new(store.clone()),
            store,
        };
        Ok(Self::new(config, parts))
    }

    /// Run one partition for `topics`.
    pub async fn run(&self, partition: &Partition, topics: &[Topic]) -> Result<RunReport, PartitionError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("partition_run", %run_id, partition = %partition);
        self.run_inner(run_id, partition, topics).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        partition: &Partition,
        topics: &[Topic],
    ) -> Result<RunReport, PartitionError> {
        let routers = topics
            .iter()
            .map(|t| KeywordRouter::new(&t.keywords))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| PartitionError::new(Stage::Filter, e))?;

        // Collect
        let range = self
            .collector
            .id_range_for_time(partition)
            .await
            .map_err(|e| PartitionError::new(Stage::Collect, e))?;
        let collected = self.collector.collect(range, partition).await;

        // Fetch
        let (docs, fetch_failed) = self.fetch_articles(collected.items.clone()).await;
        info!(
            collected = collected.items.len(),
            fetched = docs.len(),
            failed = fetch_failed,
            "fetched articles"
        );

        let mut attrs = Vec::new();
        let mut topic_reports = Vec::with_capacity(topics.len());
        for (topic, router) in topics.iter().zip(&routers) {
            let report = self.run_topic(topic, router, &docs, &mut attrs).await?;
            topic_reports.push(report);
        }

        // Write
        let written = self
            .writer
            .replace(partition, &docs, &attrs)
            .await
            .map_err(|e| PartitionError::new(Stage::Write, e))?;

        Ok(RunReport {
            run_id: run_id.to_string(),
            partition_start: partition.start,
            partition_end: partition.end,
            scanned: collected.scanned,
            item_failures: collected.failed,
            collected: collected.items.len(),
            fetched: docs.len(),
            failed: fetch_failed,
            topics: topic_reports,
            written,
        })
    }

    async fn fetch_articles(&self, items: Vec<Item>) -> (Vec<ArticleDoc>, usize) {
        let articles = &self.articles;
        let outcome = self
            .article_fetcher
            .fetch_all("article", items, |item: Item| async move {
                articles.fetch_article(&item.url).await
            })
            .await;

        let failed = outcome.failed_count();
        let mut docs: Vec<ArticleDoc> = outcome
            .ok
            .iter()
            .map(|(item, content)| ArticleDoc::from_item(item, content.clone()))
            .collect();
        docs.sort_by_key(|d| d.key);
        (docs, failed)
    }

    async fn run_topic(
        &self,
        topic: &Topic,
        router: &KeywordRouter,
        docs: &[ArticleDoc],
        attrs: &mut Vec<NewAttribute>,
    ) -> Result<TopicReport, PartitionError> {
        let span = info_span!("topic", topic = %topic.name);
        async {
            let mut report = TopicReport {
                topic: topic.name.clone(),
                ..Default::default()
            };

            let candidates = router.filter(docs);
            report.filtered = candidates.len();
            info!(candidates = candidates.len(), "keyword filter");

            let (counts, maybe) = self
                .classify_tier(candidates, topic, Tier::MaybeRelevant, attrs)
                .await?;
            report.maybe_relevant = counts;

            let maybe = maybe.into_iter().map(|(doc, _)| doc).collect();
            let (counts, survivors) = self
                .classify_tier(maybe, topic, Tier::HighlyRelevant, attrs)
                .await?;
            report.highly_relevant = counts;

            let summaries = self
                .summarizer
                .summarize_batch(&topic.name, survivors)
                .await
                .map_err(|e| PartitionError::new(Stage::Summarize, e))?;

            let label = summary_label(&topic.name);
            for (doc, summary) in &summaries.labeled {
                attrs.push(NewAttribute {
                    document: doc.key,
                    label: label.clone(),
                    value: json!({"summary": summary.summary, "reasoning": summary.reasoning}),
                    created_at: doc.created_at,
                });
            }
            report.summarized = summaries.labeled.len();
            report.summary_failed = summaries.failed;

            Ok::<TopicReport, PartitionError>(report)
        }
        .instrument(span)
        .await
    }

    /// Classify at one tier. Relevant documents get an attribute and are
    /// returned with their reasoning; the rest only show up in the counts.
    async fn classify_tier<'a>(
        &self,
        docs: Vec<&'a ArticleDoc>,
        topic: &Topic,
        tier: Tier,
        attrs: &mut Vec<NewAttribute>,
    ) -> Result<(TierCounts, Vec<(&'a ArticleDoc, String)>), PartitionError> {
        let input = docs.len();
        let batch = self
            .classifier
            .classify_batch(docs, topic, tier)
            .await
            .map_err(|e| PartitionError::new(tier.stage(), e))?;

        let label = tier.label(&topic.name);
        let mut relevant = Vec::new();
        for (doc, outcome) in batch.labeled {
            if !outcome.relevant {
                continue;
            }
            attrs.push(NewAttribute {
                document: doc.key,
                label: label.clone(),
                value: json!({"relevant": true, "reasoning": outcome.reasoning}),
                created_at: doc.created_at,
            });
            relevant.push((doc, outcome.reasoning));
        }

        let counts = TierCounts {
            input,
            relevant: relevant.len(),
            not_relevant: input - relevant.len() - batch.failed,
            failed: batch.failed,
        };
        Ok((counts, relevant))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let partition = Partition {
            start: self.partition_start,
            end: self.partition_end,
        };
        writeln!(f, "Partition {}  (run {})", partition, self.run_id)?;
        writeln!(f)?;
        writeln!(f, "  scanned:     {}", self.scanned)?;
        writeln!(f, "  item errors: {}", self.item_failures)?;
        writeln!(f, "  collected:   {}", self.collected)?;
        writeln!(f, "  fetched:     {}", self.fetched)?;
        writeln!(f, "  failed:      {}", self.failed)?;

        if !self.topics.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "  {:<20} {:>8} {:>10} {:>10} {:>10}",
                "TOPIC", "FILTERED", "MAYBE", "HIGHLY", "SUMMARIZED"
            )?;
            writeln!(f, "  {}", "-".repeat(62))?;
            for t in &self.topics {
                writeln!(
                    f,
                    "  {:<20} {:>8} {:>10} {:>10} {:>10}",
                    t.topic,
                    t.filtered,
                    format!("{}/{}", t.maybe_relevant.relevant, t.maybe_relevant.input),
                    format!("{}/{}", t.highly_relevant.relevant, t.highly_relevant.input),
                    t.summarized
                )?;
            }
        }

        writeln!(f)?;
        writeln!(
            f,
            "  written:     {} documents, {} attributes (replaced {} / {})",
            self.written.documents_written,
            self.written.attributes_written,
            self.written.documents_deleted,
            self.written.attributes_deleted
        )
    }
}
