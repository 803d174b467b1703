//! SQLite persistence for documents, attributes, and the response cache.
//!
//! Range deletes and inserts take a caller-supplied connection so the
//! [`PartitionWriter`](crate::writer::PartitionWriter) can run them inside
//! one transaction. Lookups go through the pool.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;

use crate::cache::{CacheKey, ResponseCache};
use crate::error::CacheError;
use crate::models::{ArticleDoc, Attribute, CacheEntry, Document, Partition, RunKey};

/// An attribute whose run key has been resolved to a store document id.
#[derive(Debug, Clone, Copy)]
pub struct AttributeRow<'a> {
    pub document_id: i64,
    pub label: &'a str,
    pub value: &'a serde_json::Value,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert documents, returning the store id assigned to each run key.
    pub async fn insert_documents(
        conn: &mut SqliteConnection,
        docs: &[&ArticleDoc],
    ) -> Result<HashMap<RunKey, i64>> {
        let mut ids = HashMap::with_capacity(docs.len());
        for doc in docs {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO document (item_id, title, content, source_url, created_at) \
                 VALUES (?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(doc.key.0)
            .bind(&doc.title)
            .bind(&doc.content)
            .bind(&doc.source_url)
            .bind(doc.created_at)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert document {}", doc.key))?;
            ids.insert(doc.key, id);
        }
        Ok(ids)
    }

    /// Insert attributes already resolved to store document ids.
    pub async fn insert_attributes(
        conn: &mut SqliteConnection,
        attrs: &[AttributeRow<'_>],
    ) -> Result<usize> {
        for attr in attrs {
            sqlx::query(
                "INSERT INTO document_attribute (document_id, value, label, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(attr.document_id)
            .bind(attr.value.to_string())
            .bind(attr.label)
            .bind(attr.created_at)
            .execute(&mut *conn)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert attribute {} for document {}",
                    attr.label, attr.document_id
                )
            })?;
        }
        Ok(attrs.len())
    }

    pub async fn delete_documents_in_range(
        conn: &mut SqliteConnection,
        partition: &Partition,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document WHERE created_at >= ? AND created_at < ?")
            .bind(partition.start)
            .bind(partition.end)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_attributes_in_range(
        conn: &mut SqliteConnection,
        partition: &Partition,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM document_attribute WHERE created_at >= ? AND created_at < ?",
        )
        .bind(partition.start)
        .bind(partition.end)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, item_id, title, content, source_url, created_at FROM document WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    pub async fn attributes_for_document(&self, document_id: i64) -> Result<Vec<Attribute>> {
        let rows = sqlx::query(
            "SELECT id, document_id, value, label, created_at FROM document_attribute \
             WHERE document_id = ? ORDER BY label ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(attribute_from_row).collect()
    }

    pub async fn documents_in_range(&self, partition: &Partition) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, item_id, title, content, source_url, created_at FROM document \
             WHERE created_at >= ? AND created_at < ? ORDER BY item_id ASC",
        )
        .bind(partition.start)
        .bind(partition.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn attributes_in_range(&self, partition: &Partition) -> Result<Vec<Attribute>> {
        let rows = sqlx::query(
            "SELECT id, document_id, value, label, created_at FROM document_attribute \
             WHERE created_at >= ? AND created_at < ? ORDER BY document_id ASC, label ASC",
        )
        .bind(partition.start)
        .bind(partition.end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(attribute_from_row).collect()
    }

    pub async fn get_cached_response(
        &self,
        fingerprint: &str,
        model: &str,
    ) -> Result<Option<(String, CacheEntry)>, CacheError> {
        let row = sqlx::query(
            "SELECT fingerprint, model, request, response, created_at FROM llm_response_cache \
             WHERE fingerprint = ? AND model = ?",
        )
        .bind(fingerprint)
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            (
                row.get("request"),
                CacheEntry {
                    fingerprint: row.get("fingerprint"),
                    model: row.get("model"),
                    response: row.get("response"),
                    created_at: row.get("created_at"),
                },
            )
        }))
    }

    /// Insert or overwrite an entry. Returns false when the key is held by
    /// a different request, leaving that row untouched.
    pub async fn put_cached_response(&self, key: &CacheKey, response: &str) -> Result<bool, CacheError> {
        let result = sqlx::query(
            r#"
            INSERT INTO llm_response_cache (fingerprint, model, request, response, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(fingerprint, model) DO UPDATE SET
                response = excluded.response,
                created_at = excluded.created_at
            WHERE llm_response_cache.request = excluded.request
            "#,
        )
        .bind(&key.fingerprint)
        .bind(&key.model)
        .bind(&key.request)
        .bind(response)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Row counts per attribute label.
    pub async fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT label, COUNT(*) AS n FROM document_attribute GROUP BY label ORDER BY label ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| (r.get("label"), r.get("n"))).collect())
    }
}

fn document_from_row(row: &SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        item_id: row.get("item_id"),
        title: row.get("title"),
        content: row.get("content"),
        source_url: row.get("source_url"),
        created_at: row.get("created_at"),
    }
}

fn attribute_from_row(row: &SqliteRow) -> Result<Attribute> {
    let id: i64 = row.get("id");
    let raw: String = row.get("value");
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("attribute {} holds invalid JSON", id))?;
    Ok(Attribute {
        id,
        document_id: row.get("document_id"),
        value,
        label: row.get("label"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ResponseCache for SqliteStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        match self.get_cached_response(&key.fingerprint, &key.model).await? {
            None => Ok(None),
            Some((request, _)) if request != key.request => Err(CacheError::Integrity {
                fingerprint: key.fingerprint.clone(),
                model: key.model.clone(),
            }),
            Some((_, entry)) => Ok(Some(entry.response)),
        }
    }

    async fn put(&self, key: &CacheKey, response: &str) -> Result<(), CacheError> {
        if self.put_cached_response(key, response).await? {
            Ok(())
        } else {
            Err(CacheError::Integrity {
                fingerprint: key.fingerprint.clone(),
                model: key.model.clone(),
            })
        }
    }
}
