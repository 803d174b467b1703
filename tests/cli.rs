use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use curate::config::load_config;
use curate::models::{ArticleDoc, NewAttribute, Partition, RunKey};
use curate::store::SqliteStore;
use curate::writer::PartitionWriter;
use curate::{db, migrate};
use serde_json::json;
use tempfile::TempDir;

fn curate_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("curate");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    fs::create_dir_all(root.join("config/topics")).unwrap();
    fs::write(
        root.join("config/topics/iac.txt"),
        "News about infrastructure as code tooling.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/curate.sqlite"

[[topics]]
name = "iac"
description_path = "topics/iac.txt"
keywords = ["terraform", "pulumi"]
"#,
        root.display()
    );
    let config_path = root.join("config/curate.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_curate(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = curate_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run curate binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_curate(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/curate.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_curate(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_curate(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
    let (_, _, recreate) = run_curate(&config_path, &["init", "--recreate"]);
    assert!(recreate, "init --recreate failed");
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_curate(&config_path, &["init"]);

    let (stdout, stderr, success) = run_curate(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Curate Database Stats"));
    assert!(stdout.contains("Documents:   0"));
    assert!(!stdout.contains("By label"));
}

#[test]
fn test_get_missing_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_curate(&config_path, &["init"]);

    let (_, stderr, success) = run_curate(&config_path, &["get", "42"]);
    assert!(!success);
    assert!(stderr.contains("document not found: 42"));
}

#[test]
fn test_bad_arguments_are_rejected_before_any_work() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_curate(&config_path, &["hourly", "--hour", "2024-06-01"]);
    assert!(!success);
    assert!(stderr.contains("expected YYYY-MM-DDTHH"));

    let (_, stderr, success) =
        run_curate(&config_path, &["hourly", "--hour", "2024-06-01T13", "--topic", "gardening"]);
    assert!(!success);
    assert!(stderr.contains("unknown topic"));

    let (_, _, success) = run_curate(
        &config_path,
        &["run", "--start", "2024-06-01T14:00:00Z", "--end", "2024-06-01T13:00:00Z"],
    );
    assert!(!success);
}

#[tokio::test]
async fn test_get_and_stats_show_written_partition() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool, false).await.unwrap();

    let partition = Partition::new(1_699_999_200, 1_700_002_800).unwrap();
    let doc = ArticleDoc {
        key: RunKey(38_000_001),
        title: "Terraform 2.0 released".to_string(),
        content: "Terraform 2.0 ships with encrypted state.".to_string(),
        source_url: "https://news.example/tf2".to_string(),
        created_at: 1_699_999_260,
    };
    let attr = NewAttribute {
        document: doc.key,
        label: "summary_iac".to_string(),
        value: json!({"summary": "Encrypted state by default.", "reasoning": "Terraform release"}),
        created_at: doc.created_at,
    };
    PartitionWriter::new(SqliteStore::new(pool.clone()))
        .replace(&partition, &[doc], &[attr])
        .await
        .unwrap();
    pool.close().await;

    let (stdout, stderr, success) = run_curate(&config_path, &["get", "1", "--json"]);
    assert!(success, "get failed: {}", stderr);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["item_id"], 38_000_001);
    assert_eq!(body["attributes"][0]["label"], "summary_iac");
    assert_eq!(body["attributes"][0]["value"]["summary"], "Encrypted state by default.");

    let (stdout, _, success) = run_curate(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   1"));
    assert!(stdout.contains("summary_iac"));
}
