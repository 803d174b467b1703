//! Document retrieval by id, with every attribute attached to it.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::models::{Attribute, Document};
use crate::stats::format_ts_iso;
use crate::store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub attributes: Vec<Attribute>,
}

pub async fn get_document(config: &Config, id: i64) -> Result<DocumentResponse> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let document = match store.get_document(id).await? {
        Some(doc) => doc,
        None => {
            pool.close().await;
            bail!("document not found: {}", id);
        }
    };
    let attributes = store.attributes_for_document(id).await?;

    pool.close().await;
    Ok(DocumentResponse {
        document,
        attributes,
    })
}

/// CLI entry point: print a document and its attributes to stdout.
pub async fn run_get(config: &Config, id: i64, json: bool) -> Result<()> {
    let resp = get_document(config, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    let doc = &resp.document;
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("item_id:      {}", doc.item_id);
    println!("title:        {}", doc.title);
    println!("source_url:   {}", doc.source_url);
    println!("created_at:   {}", format_ts_iso(doc.created_at));
    println!();

    println!("--- Attributes ({}) ---", resp.attributes.len());
    for attr in &resp.attributes {
        println!("[{}]", attr.label);
        println!("{}", serde_json::to_string_pretty(&attr.value)?);
        println!();
    }

    println!("--- Content ---");
    println!("{}", doc.content);

    Ok(())
}
