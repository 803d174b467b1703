//! In-memory collaborators and a temp-dir harness shared by the
//! integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use curate::article::ArticleSource;
use curate::cache::ResponseCache;
use curate::config::{self, Config, Topic};
use curate::error::FetchError;
use curate::llm::{ChatMessage, CompletionClient};
use curate::models::{Item, ItemType, Partition};
use curate::pipeline::{Collaborators, PipelineDriver};
use curate::sources::ItemSource;
use curate::store::SqliteStore;
use curate::{db, migrate};
use tempfile::TempDir;

/// Start of the hour under test: 2023-11-14T22:00:00Z.
pub const HOUR: i64 = 1_699_999_200;

// ─── Item source ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeItems {
    pub items: HashMap<i64, Item>,
    pub max_id: i64,
    /// Ids that fail with a transient error on every attempt.
    pub flaky: HashSet<i64>,
    pub max_id_down: bool,
    pub lookups: AtomicUsize,
}

impl FakeItems {
    pub fn new(items: Vec<Item>) -> Self {
        let max_id = items.iter().map(|i| i.id).max().unwrap_or(0);
        Self {
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            max_id,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ItemSource for FakeItems {
    async fn fetch_item(&self, id: i64) -> Result<Option<Item>, FetchError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.flaky.contains(&id) {
            return Err(FetchError::Transient(format!("item {}: HTTP 503", id)));
        }
        Ok(self.items.get(&id).cloned())
    }

    async fn fetch_max_id(&self) -> Result<i64, FetchError> {
        if self.max_id_down {
            return Err(FetchError::Transient("maxitem: HTTP 503".into()));
        }
        Ok(self.max_id)
    }
}

pub fn story(id: i64, time: i64, title: &str, url: &str) -> Item {
    Item {
        id,
        item_type: ItemType::Story,
        title: title.to_string(),
        url: url.to_string(),
        text: String::new(),
        by: "pg".to_string(),
        time,
        score: 10,
        descendants: 0,
        deleted: false,
        dead: false,
    }
}

// ─── Article source ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeArticles {
    pub pages: HashMap<String, Result<String, FetchError>>,
    pub fetched: Mutex<Vec<String>>,
}

impl FakeArticles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), Ok(text.to_string()));
        self
    }

    pub fn failing(mut self, url: &str, err: FetchError) -> Self {
        self.pages.insert(url.to_string(), Err(err));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl ArticleSource for FakeArticles {
    async fn fetch_article(&self, url: &str) -> Result<String, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Permanent(format!("{}: HTTP 404", url))))
    }
}

// ─── Model ──────────────────────────────────────────────────────────

type Responder = dyn Fn(&str, &str) -> Result<String, FetchError> + Send + Sync;

/// Answers by model name and the document part of the user message.
pub struct FakeLlm {
    responder: Box<Responder>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeLlm {
    pub fn new(
        responder: impl Fn(&str, &str) -> Result<String, FetchError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls made with `model`.
    pub fn calls_for(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == model)
            .count()
    }

    /// Whether any call to `model` carried a document containing `needle`.
    pub fn saw(&self, model: &str, needle: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|(m, doc)| m == model && doc.contains(needle))
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for FakeLlm {
    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, FetchError> {
        let user = messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let document = user
            .split("DOCUMENT CONTENT:")
            .nth(1)
            .unwrap_or_default()
            .to_string();

        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), document.clone()));
        (self.responder)(model, &document)
    }
}

pub fn relevance(relevant: bool, reasoning: &str) -> String {
    serde_json::json!({"relevant": relevant, "reasoning": reasoning}).to_string()
}

/// Tier 1 accepts Terraform and Pulumi stories, tier 2 only Terraform.
pub fn iac_responder(model: &str, document: &str) -> Result<String, FetchError> {
    let terraform = document.contains("Terraform");
    let pulumi = document.contains("Pulumi");
    Ok(match model {
        "maybe-model" => relevance(terraform || pulumi, "mentions IaC tooling"),
        "highly-model" => relevance(terraform, "a Terraform release"),
        "summary-model" => serde_json::json!({
            "summary": "Terraform 2.0 encrypts state by default.",
            "reasoning": "The reader follows Terraform releases."
        })
        .to_string(),
        other => return Err(FetchError::Permanent(format!("unknown model {}", other))),
    })
}

// ─── Scenario ───────────────────────────────────────────────────────

pub fn url(id: i64) -> String {
    format!("https://news.example/{}", id)
}

/// Ids 1..=20. Ids 10..=14 are posted inside [`HOUR`]; 11 and 13 have no
/// link. Ids 1..=9 precede the hour and 15..=20 fill the next one.
pub fn hour_items() -> Vec<Item> {
    let mut items = Vec::new();
    for id in 1..=9 {
        items.push(story(id, HOUR - 3600 + id * 100, &format!("Old story {}", id), &url(id)));
    }
    items.push(story(10, HOUR + 60, "Terraform 2.0 released", &url(10)));
    items.push(story(11, HOUR + 600, "Ask HN: favourite editor?", ""));
    items.push(story(12, HOUR + 1200, "Pulumi adds Go generics", &url(12)));
    items.push(story(13, HOUR + 1800, "Tell HN: I quit", ""));
    items.push(story(14, HOUR + 2400, "A better sourdough", &url(14)));
    for id in 15..=20 {
        items.push(story(id, HOUR + 3600 + (id - 15) * 100, &format!("Next story {}", id), &url(id)));
    }
    items
}

pub fn hour_articles() -> FakeArticles {
    let mut articles = FakeArticles::new()
        .page(&url(10), "Terraform 2.0 ships with encrypted state.")
        .page(&url(12), "Pulumi programs can now use Go generics.")
        .page(&url(14), "Flour, water, salt, and patience.");
    for id in (1..=9).chain(15..=20) {
        articles = articles.page(&url(id), &format!("Unrelated story body {}.", id));
    }
    articles
}

// ─── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub tmp: TempDir,
    pub config: Config,
    pub topics: Vec<Topic>,
    pub store: SqliteStore,
    pub items: Arc<FakeItems>,
    pub articles: Arc<FakeArticles>,
    pub llm: Arc<FakeLlm>,
}

impl Harness {
    pub async fn new(items: FakeItems, articles: FakeArticles, llm: FakeLlm) -> Self {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("curate.toml");
        fs::write(
            &config_path,
            format!(
                r#"[db]
path = "{}/data/curate.sqlite"

[retry]
initial_delay_ms = 1
max_delay_ms = 5

[llm]
maybe_relevant_model = "maybe-model"
highly_relevant_model = "highly-model"
summary_model = "summary-model"

[[topics]]
name = "iac"
description = "News about infrastructure as code tooling."
keywords = ["terraform", "pulumi"]
"#,
                tmp.path().display()
            ),
        )
        .unwrap();

        let config = config::load_config(&config_path).unwrap();
        let topics = config.resolve_topics(tmp.path()).unwrap();

        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool, false).await.unwrap();

        Self {
            tmp,
            config,
            topics,
            store: SqliteStore::new(pool),
            items: Arc::new(items),
            articles: Arc::new(articles),
            llm: Arc::new(llm),
        }
    }

    /// The standard hour scenario.
    pub async fn hour_scenario() -> Self {
        Self::new(
            FakeItems::new(hour_items()),
            hour_articles(),
            FakeLlm::new(iac_responder),
        )
        .await
    }

    /// A driver that caches model responses in the harness database.
    pub fn driver(&self) -> PipelineDriver {
        self.driver_with_cache(Arc::new(self.store.clone()))
    }

    pub fn driver_with_cache(&self, cache: Arc<dyn ResponseCache>) -> PipelineDriver {
        PipelineDriver::new(
            &self.config,
            Collaborators {
                items: self.items.clone(),
                articles: self.articles.clone(),
                completion: self.llm.clone(),
                cache,
                store: self.store.clone(),
            },
        )
    }

    /// The `n`th hour after [`HOUR`].
    pub fn hour(&self, n: i64) -> Partition {
        Partition::new(HOUR + n * 3600, HOUR + (n + 1) * 3600).unwrap()
    }

    /// Stored rows for `partition` as `(item_id, label, value)`, which
    /// are stable across runs while row ids are not.
    pub async fn snapshot(&self, partition: &Partition) -> (Vec<i64>, Vec<(i64, String, String)>) {
        let docs = self.store.documents_in_range(partition).await.unwrap();
        let item_of: HashMap<i64, i64> = docs.iter().map(|d| (d.id, d.item_id)).collect();

        let mut attrs: Vec<(i64, String, String)> = self
            .store
            .attributes_in_range(partition)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (item_of[&a.document_id], a.label, a.value.to_string()))
            .collect();
        attrs.sort();

        (docs.iter().map(|d| d.item_id).collect(), attrs)
    }
}
