//! Error taxonomy for a partition run.
//!
//! | Kind | Type | Effect |
//! |------|------|--------|
//! | Transient | [`FetchError::Transient`] | retried with backoff |
//! | Permanent per item | [`FetchError::Permanent`], [`StageError`] | item dropped, counted |
//! | Fatal per partition | [`PartitionError`] | run aborted, nothing persisted |

use std::fmt;

use thiserror::Error;

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Rate limiting, service unavailable, or a dropped connection.
    #[error("transient: {0}")]
    Transient(String),

    /// Not found, malformed content, or any other non-retryable failure.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Classify an HTTP status. Only 429 and 503 are worth another attempt.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        let message = format!("{}: HTTP {}", context, status);
        match status.as_u16() {
            429 | 503 => FetchError::Transient(message),
            _ => FetchError::Permanent(message),
        }
    }

    /// Classify a transport error. Timeouts and connection failures are
    /// transient; body decoding and builder errors are not.
    pub fn from_reqwest(err: reqwest::Error, context: &str) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status, context);
        }
        let message = format!("{}: {}", context, err);
        if err.is_timeout() || err.is_connect() || err.is_request() {
            FetchError::Transient(message)
        } else {
            FetchError::Permanent(message)
        }
    }
}

/// Per-document failure inside a model-backed stage. Never escapes the
/// stage: the document is dropped from later stages and counted.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("unparseable model response: {0}")]
    Parse(String),
}

/// Response cache failures. Both variants are fatal for the partition.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cached response for {fingerprint} ({model}) does not decode: {reason}")]
    Corrupt {
        fingerprint: String,
        model: String,
        reason: String,
    },

    #[error("conflicting response already cached for {fingerprint} ({model})")]
    Integrity { fingerprint: String, model: String },

    #[error("cache store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Failure of one model call, as seen by the classifier and summarizer.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Drop the document, keep the batch going.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Abort the partition.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Pipeline stage names, used in reports and in [`PartitionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Collect,
    Filter,
    ClassifyMaybe,
    ClassifyHighly,
    Summarize,
    Write,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Collect => "collect",
            Stage::Filter => "filter",
            Stage::ClassifyMaybe => "classify_maybe_relevant",
            Stage::ClassifyHighly => "classify_highly_relevant",
            Stage::Summarize => "summarize",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partition run that must be reported upward as failed.
#[derive(Debug, Error)]
#[error("partition failed at stage {stage}: {source:#}")]
pub struct PartitionError {
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

impl PartitionError {
    pub fn new(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}
