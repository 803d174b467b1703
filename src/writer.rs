//! Partition replacement.
//!
//! A partition write deletes every document and attribute whose
//! `created_at` falls in `[start, end)` and inserts the run's output, all
//! in one transaction. Attributes arrive keyed by [`RunKey`]; they are
//! remapped to the ids the store assigns to the freshly inserted
//! documents. Either the whole partition is replaced or nothing changes.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::models::{ArticleDoc, NewAttribute, Partition, RunKey};
use crate::store::{AttributeRow, SqliteStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WriteSummary {
    pub documents_deleted: u64,
    pub attributes_deleted: u64,
    pub documents_written: usize,
    pub attributes_written: usize,
}

pub struct PartitionWriter {
    store: SqliteStore,
}

impl PartitionWriter {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    pub async fn replace(
        &self,
        partition: &Partition,
        docs: &[ArticleDoc],
        attrs: &[NewAttribute],
    ) -> Result<WriteSummary> {
        check_partition(partition, docs, attrs)?;

        let mut docs: Vec<&ArticleDoc> = docs.iter().collect();
        docs.sort_by_key(|d| d.key);

        let mut attrs: Vec<&NewAttribute> = attrs.iter().collect();
        attrs.sort_by(|a, b| (a.document, &a.label).cmp(&(b.document, &b.label)));

        let mut tx = self
            .store
            .pool()
            .begin()
            .await
            .context("Failed to start partition transaction")?;

        let documents_deleted = SqliteStore::delete_documents_in_range(&mut *tx, partition).await?;
        let attributes_deleted = SqliteStore::delete_attributes_in_range(&mut *tx, partition).await?;

        let ids = SqliteStore::insert_documents(&mut *tx, &docs).await?;
        let rows = remap_attributes(&attrs, &ids)?;
        let attributes_written = SqliteStore::insert_attributes(&mut *tx, &rows).await?;

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit partition {}", partition))?;

        let summary = WriteSummary {
            documents_deleted,
            attributes_deleted,
            documents_written: ids.len(),
            attributes_written,
        };
        info!(
            partition = %partition,
            documents_deleted,
            attributes_deleted,
            documents_written = summary.documents_written,
            attributes_written,
            "partition replaced"
        );
        Ok(summary)
    }
}

/// Every row must fall inside the partition, and every document key must
/// be unique, or the replace would leak into a neighbour.
fn check_partition(partition: &Partition, docs: &[ArticleDoc], attrs: &[NewAttribute]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(docs.len());
    for doc in docs {
        if !partition.contains(doc.created_at) {
            bail!(
                "document {} created_at {} is outside partition {}",
                doc.key,
                doc.created_at,
                partition
            );
        }
        if !seen.insert(doc.key) {
            bail!("duplicate document {} in partition write", doc.key);
        }
    }
    for attr in attrs {
        if !partition.contains(attr.created_at) {
            bail!(
                "attribute {} for {} created_at {} is outside partition {}",
                attr.label,
                attr.document,
                attr.created_at,
                partition
            );
        }
    }
    Ok(())
}

/// Resolve each attribute's run key to the store id of its document.
fn remap_attributes<'a>(
    attrs: &[&'a NewAttribute],
    ids: &HashMap<RunKey, i64>,
) -> Result<Vec<AttributeRow<'a>>> {
    attrs
        .iter()
        .map(|&attr| -> Result<AttributeRow<'a>> {
            let document_id = ids.get(&attr.document).copied().with_context(|| {
                format!(
                    "attribute {} references {} which is not part of this write",
                    attr.label, attr.document
                )
            })?;
            Ok(AttributeRow {
                document_id,
                label: &attr.label,
                value: &attr.value,
                created_at: attr.created_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: i64, created_at: i64) -> ArticleDoc {
        ArticleDoc {
            key: RunKey(id),
            title: format!("t{}", id),
            content: "c".to_string(),
            source_url: "https://example.com".to_string(),
            created_at,
        }
    }

    fn attr(id: i64, label: &str, created_at: i64) -> NewAttribute {
        NewAttribute {
            document: RunKey(id),
            label: label.to_string(),
            value: json!({"relevant": true, "reasoning": "x"}),
            created_at,
        }
    }

    #[test]
    fn remap_joins_by_key_not_position() {
        let a = attr(7, "summary_iac", 0);
        let b = attr(3, "summary_iac", 0);
        let ids = HashMap::from([(RunKey(3), 100), (RunKey(7), 200)]);

        let rows = remap_attributes(&[&a, &b], &ids).unwrap();
        assert_eq!(rows[0].document_id, 200);
        assert_eq!(rows[1].document_id, 100);
    }

    #[test]
    fn remap_rejects_unknown_document() {
        let a = attr(9, "summary_iac", 0);
        let ids = HashMap::from([(RunKey(3), 100)]);
        assert!(remap_attributes(&[&a], &ids).is_err());
    }

    #[test]
    fn rows_outside_partition_are_rejected() {
        let p = Partition::new(100, 200).unwrap();
        assert!(check_partition(&p, &[doc(1, 150)], &[attr(1, "l", 150)]).is_ok());
        assert!(check_partition(&p, &[doc(1, 200)], &[]).is_err());
        assert!(check_partition(&p, &[doc(1, 150)], &[attr(1, "l", 99)]).is_err());
        assert!(check_partition(&p, &[doc(1, 150), doc(1, 160)], &[]).is_err());
    }
}
