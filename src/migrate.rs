use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Create the schema. With `recreate`, existing tables (and their rows,
/// including the response cache) are dropped first.
pub async fn run_migrations(config: &Config, recreate: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool, recreate).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool, recreate: bool) -> Result<()> {
    if recreate {
        info!("dropping existing tables");
        for table in ["document_attribute", "document", "llm_response_cache"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(pool)
                .await?;
        }
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document (
            id INTEGER PRIMARY KEY,
            item_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            source_url TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Deferred so a partition replace can delete documents before their
    // attributes inside one transaction.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_attribute (
            id INTEGER PRIMARY KEY,
            document_id INTEGER NOT NULL,
            value TEXT NOT NULL,
            label TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (document_id) REFERENCES document(id) DEFERRABLE INITIALLY DEFERRED
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS llm_response_cache (
            id INTEGER PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            model TEXT NOT NULL,
            request TEXT NOT NULL,
            response TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(fingerprint, model)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_created_at ON document(created_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_attribute_created_at ON document_attribute(created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_attribute_document_id ON document_attribute(document_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_attribute_label ON document_attribute(label)")
        .execute(pool)
        .await?;

    Ok(())
}
