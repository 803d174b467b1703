//! Bounded parallel fetching with per-item retry.
//!
//! [`RetryingFetcher`] wraps any async fetch function with the configured
//! [`RetryPolicy`] and runs up to `parallelism` fetches at once. A batch
//! never fails as a whole: items that exhaust their retries or fail
//! permanently are reported in [`BatchOutcome::failed`] and excluded from
//! [`BatchOutcome::ok`].

use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::retry::{retry, RetryPolicy};

/// Result of a batch fetch. Order is completion order, not input order.
#[derive(Debug)]
pub struct BatchOutcome<I, T> {
    pub ok: Vec<(I, T)>,
    pub failed: Vec<(I, FetchError)>,
}

impl<I, T> BatchOutcome<I, T> {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Drive `work` over `inputs` with at most `parallelism` futures in flight.
pub async fn run_bounded<I, O, F, Fut>(inputs: Vec<I>, parallelism: usize, work: F) -> Vec<O>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = O>,
{
    stream::iter(inputs)
        .map(work)
        .buffer_unordered(parallelism.max(1))
        .collect()
        .await
}

#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    policy: RetryPolicy,
    parallelism: usize,
}

impl RetryingFetcher {
    pub fn new(policy: RetryPolicy, parallelism: usize) -> Self {
        Self {
            policy,
            parallelism: parallelism.max(1),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one input, retrying transient failures.
    pub async fn fetch_one<I, T, F, Fut>(&self, what: &str, input: &I, fetch: F) -> Result<T, FetchError>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        retry(&self.policy, what, |_| fetch(input.clone())).await
    }

    /// Fetch every input. Partial failure is normal; see [`BatchOutcome`].
    pub async fn fetch_all<I, T, F, Fut>(&self, what: &str, inputs: Vec<I>, fetch: F) -> BatchOutcome<I, T>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let total = inputs.len();
        let fetch = &fetch;
        let results = run_bounded(inputs, self.parallelism, |input| async move {
            let result = self.fetch_one(what, &input, fetch).await;
            (input, result)
        })
        .await;

        let mut outcome = BatchOutcome {
            ok: Vec::with_capacity(total),
            failed: Vec::new(),
        };
        for (input, result) in results {
            match result {
                Ok(value) => outcome.ok.push((input, value)),
                Err(err) => {
                    warn!(what, error = %err, "fetch failed, dropping item");
                    outcome.failed.push((input, err));
                }
            }
        }

        debug!(
            what,
            total,
            ok = outcome.ok.len(),
            failed = outcome.failed.len(),
            "batch complete"
        );
        outcome
    }
}
