//! Database overview for `curate stats`.
//!
//! Document and attribute totals, the covered time span, cache size, and
//! attribute counts per label.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::SqliteStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document")
        .fetch_one(&pool)
        .await?;

    let total_attrs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_attribute")
        .fetch_one(&pool)
        .await?;

    let cached: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM llm_response_cache")
        .fetch_one(&pool)
        .await?;

    let (oldest, newest): (Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT MIN(created_at), MAX(created_at) FROM document")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Curate Database Stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Attributes:  {}", total_attrs);
    println!("  Cached LLM responses: {}", cached);
    if let (Some(oldest), Some(newest)) = (oldest, newest) {
        println!(
            "  Span:        {} .. {}",
            format_ts_iso(oldest),
            format_ts_iso(newest)
        );
    }

    let labels = store.label_counts().await?;
    if !labels.is_empty() {
        println!();
        println!("  By label:");
        println!("  {:<48} {:>8}", "LABEL", "COUNT");
        println!("  {}", "-".repeat(58));
        for (label, count) in &labels {
            println!("  {:<48} {:>8}", label, count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
