//! Item source: the public Hacker News item API.
//!
//! The [`ItemSource`] trait is the seam the pipeline depends on; tests
//! substitute an in-memory source. [`HackerNewsClient`] speaks the
//! Firebase REST endpoints:
//!
//! - `GET {base}/maxitem.json` returns the newest id as a bare integer
//! - `GET {base}/item/{id}.json` returns the item, or `null` when absent

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::models::Item;

#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Fetch one item. `Ok(None)` means the id has no item.
    async fn fetch_item(&self, id: i64) -> Result<Option<Item>, FetchError>;

    /// Newest id the source has assigned.
    async fn fetch_max_id(&self) -> Result<i64, FetchError>;
}

pub struct HackerNewsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HackerNewsClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build item source HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status, url));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Permanent(format!("{}: invalid JSON: {}", url, e)))
    }
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn fetch_item(&self, id: i64) -> Result<Option<Item>, FetchError> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        self.get_json::<Option<Item>>(&url).await
    }

    async fn fetch_max_id(&self) -> Result<i64, FetchError> {
        let url = format!("{}/maxitem.json", self.base_url);
        self.get_json::<i64>(&url).await
    }
}
