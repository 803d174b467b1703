//! Core records that flow through a partition run.
//!
//! `Item` → `ArticleDoc` (run-local, keyed by [`RunKey`]) → `NewAttribute`
//! → persisted [`Document`] / [`Attribute`] rows with store-assigned ids.

use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Kind of source item. Anything the pipeline does not care about maps to
/// `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Story,
    Comment,
    #[serde(other)]
    Other,
}

impl Default for ItemType {
    fn default() -> Self {
        ItemType::Other
    }
}

/// A record from the item source. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub by: String,
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub descendants: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub dead: bool,
}

impl Item {
    /// Only live stories with a link proceed past collection.
    pub fn is_collectable(&self) -> bool {
        self.item_type == ItemType::Story
            && !self.deleted
            && !self.dead
            && !self.url.trim().is_empty()
    }
}

/// Identity of a document within one run. Stable only inside that run;
/// attributes are joined to documents by this key, never by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RunKey(pub i64);

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item:{}", self.0)
    }
}

/// An item with its fetched article text, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDoc {
    pub key: RunKey,
    pub title: String,
    pub content: String,
    pub source_url: String,
    /// Unix seconds, inherited from the item.
    pub created_at: i64,
}

impl ArticleDoc {
    pub fn from_item(item: &Item, content: String) -> Self {
        Self {
            key: RunKey(item.id),
            title: item.title.clone(),
            content,
            source_url: item.url.clone(),
            created_at: item.time,
        }
    }
}

/// A classification or summary outcome waiting for its document's id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttribute {
    pub document: RunKey,
    pub label: String,
    pub value: serde_json::Value,
    pub created_at: i64,
}

/// Persisted document row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub item_id: i64,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub created_at: i64,
}

/// Persisted attribute row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub id: i64,
    pub document_id: i64,
    pub value: serde_json::Value,
    pub label: String,
    pub created_at: i64,
}

/// Cached model response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub model: String,
    pub response: String,
    pub created_at: i64,
}

/// Half-open time window `[start, end)` in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub start: i64,
    pub end: i64,
}

impl Partition {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if end <= start {
            bail!("partition end ({}) must be after start ({})", end, start);
        }
        Ok(Self { start, end })
    }

    pub fn from_datetimes(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Self::new(start.timestamp(), end.timestamp())
    }

    /// The hour starting at `start`.
    pub fn hourly(start: DateTime<Utc>) -> Result<Self> {
        Self::new(start.timestamp(), start.timestamp() + 3600)
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_ts = |ts: i64| {
            Utc.timestamp_opt(ts, 0)
                .single()
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                .unwrap_or_else(|| ts.to_string())
        };
        write!(f, "[{}, {})", fmt_ts(self.start), fmt_ts(self.end))
    }
}

/// Output shape of both classifier tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relevance {
    pub relevant: bool,
    pub reasoning: String,
}

/// Output shape of the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Summary {
    pub summary: String,
    pub reasoning: String,
}
