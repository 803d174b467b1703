//! Item collection for a partition.
//!
//! The item API is addressed by id, not by time, so the partition is first
//! mapped to a half-open id range. Ids are assigned in time order, which
//! makes a binary search on item `time` over `[1, max_id]` sufficient.
//! Some ids have no item (deleted, never published); the search probes up
//! to `probe_window` consecutive ids past such holes.
//!
//! Every id in the range is then fetched through the [`RetryingFetcher`].
//! Lookups that fail are counted and dropped; ids that resolve to a story
//! with a link and a timestamp inside the partition are kept.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::fetcher::RetryingFetcher;
use crate::models::{Item, Partition};
use crate::sources::ItemSource;

/// Half-open id range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub fn len(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct Collected {
    /// Collectable items, ordered by id.
    pub items: Vec<Item>,
    /// Ids looked up.
    pub scanned: usize,
    /// Ids whose lookup failed after retries.
    pub failed: usize,
}

pub struct ItemCollector {
    source: Arc<dyn ItemSource>,
    fetcher: RetryingFetcher,
    probe_window: u64,
}

impl ItemCollector {
    pub fn new(source: Arc<dyn ItemSource>, fetcher: RetryingFetcher, probe_window: u64) -> Self {
        Self {
            source,
            fetcher,
            probe_window: probe_window.max(1),
        }
    }

    /// Locate the ids whose items fall inside `partition`.
    pub async fn id_range_for_time(&self, partition: &Partition) -> Result<IdRange> {
        let source = &self.source;
        let max_id = self
            .fetcher
            .fetch_one("max item id", &(), |_| source.fetch_max_id())
            .await
            .context("Failed to fetch max item id")?;

        let upper = max_id + 1;
        let start = self.first_id_at_or_after(partition.start, 1, upper).await?;
        let end = self.first_id_at_or_after(partition.end, start, upper).await?;

        let range = IdRange { start, end };
        info!(partition = %partition, max_id, start, end, "resolved id range");
        Ok(range)
    }

    /// Smallest id in `[lo, hi)` whose item time is at or after `ts`, or
    /// `hi` if there is none. Ids without an item count as belonging to
    /// the next resolvable id.
    async fn first_id_at_or_after(&self, ts: i64, lo: i64, hi: i64) -> Result<i64> {
        let (mut lo, mut hi) = (lo, hi);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.probe(mid, hi).await? {
                Some((found, time)) if time < ts => lo = found + 1,
                _ => hi = mid,
            }
        }
        Ok(lo)
    }

    /// First id in `[id, min(id + probe_window, limit))` that resolves to
    /// an item with a timestamp.
    async fn probe(&self, id: i64, limit: i64) -> Result<Option<(i64, i64)>> {
        let source = &self.source;
        let stop = (id + self.probe_window as i64).min(limit);
        for candidate in id..stop {
            let item = self
                .fetcher
                .fetch_one("item", &candidate, |id| source.fetch_item(id))
                .await
                .with_context(|| format!("Failed to look up item {} during id search", candidate))?;
            match item {
                Some(item) if item.time > 0 => return Ok(Some((candidate, item.time))),
                _ => debug!(id = candidate, "no timestamped item, probing next id"),
            }
        }
        Ok(None)
    }

    /// Fetch every id in `range` and keep the collectable items inside
    /// `partition`.
    pub async fn collect(&self, range: IdRange, partition: &Partition) -> Collected {
        let source = &self.source;
        let ids: Vec<i64> = (range.start..range.end).collect();
        let scanned = ids.len();

        let outcome = self
            .fetcher
            .fetch_all("item", ids, |id| source.fetch_item(id))
            .await;

        let mut items: Vec<Item> = outcome
            .ok
            .into_iter()
            .filter_map(|(_, item)| item)
            .filter(|item| item.is_collectable() && partition.contains(item.time))
            .collect();
        items.sort_by_key(|item| item.id);

        info!(
            scanned,
            failed = outcome.failed.len(),
            collected = items.len(),
            "collected items"
        );
        Collected {
            items,
            scanned,
            failed: outcome.failed.len(),
        }
    }
}
