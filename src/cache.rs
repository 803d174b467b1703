//! Response cache for model calls.
//!
//! Entries are keyed by `(fingerprint, model)`, where the fingerprint is
//! the SHA-256 of the serialized request messages. The full request text
//! is stored next to the response so a fingerprint collision between two
//! different requests is detected instead of served.
//!
//! Write semantics:
//!
//! - new key: insert
//! - same key, same request: the later write owns the row (two workers
//!   racing on one cache miss both call the model; either answer is valid)
//! - same key, different request: [`CacheError::Integrity`]
//!
//! The SQLite implementation lives on [`SqliteStore`](crate::store::SqliteStore).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::llm::ChatMessage;

/// Identity of one model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub fingerprint: String,
    pub model: String,
    /// Serialized messages the fingerprint was computed from.
    pub request: String,
}

impl CacheKey {
    pub fn new(messages: &[ChatMessage], model: &str) -> Self {
        // Serializing a Vec of plain string structs cannot fail.
        let request = serde_json::to_string(messages).unwrap_or_default();
        Self {
            fingerprint: fingerprint(&request, model),
            model: model.to_string(),
            request,
        }
    }
}

/// Hex SHA-256 over the serialized request and the model name.
pub fn fingerprint(request: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.as_bytes());
    hasher.update(b"\n");
    hasher.update(model.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Cached raw response for `key`, if any.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &CacheKey, response: &str) -> Result<(), CacheError>;
}

/// Process-local cache, used in tests and dry runs.
#[derive(Default)]
pub struct MemoryResponseCache {
    entries: Mutex<HashMap<(String, String), (String, String)>>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a raw entry without any checks.
    pub fn insert_raw(&self, key: &CacheKey, response: &str) {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).insert(
            (key.fingerprint.clone(), key.model.clone()),
            (key.request.clone(), response.to_string()),
        );
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(&(key.fingerprint.clone(), key.model.clone())) {
            None => Ok(None),
            Some((request, _)) if *request != key.request => Err(CacheError::Integrity {
                fingerprint: key.fingerprint.clone(),
                model: key.model.clone(),
            }),
            Some((_, response)) => Ok(Some(response.clone())),
        }
    }

    async fn put(&self, key: &CacheKey, response: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let slot = (key.fingerprint.clone(), key.model.clone());
        if let Some((request, _)) = entries.get(&slot) {
            if *request != key.request {
                return Err(CacheError::Integrity {
                    fingerprint: key.fingerprint.clone(),
                    model: key.model.clone(),
                });
            }
        }
        entries.insert(slot, (key.request.clone(), response.to_string()));
        Ok(())
    }
}
