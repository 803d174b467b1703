//! TOML configuration.
//!
//! One file describes the database, the item source, the article fetcher,
//! the model endpoint, the retry policy, and the topics to classify. The
//! parsed [`Config`] is passed explicitly into every component; nothing
//! reads process-wide state after [`load_config`] returns.
//!
//! ```toml
//! [db]
//! path = "./data/curate.sqlite"
//!
//! [llm]
//! maybe_relevant_model = "gpt-3.5-turbo"
//! highly_relevant_model = "gpt-4o"
//!
//! [[topics]]
//! name = "iac"
//! description_path = "specs/iac.txt"
//! keywords = ["terraform", "pulumi", "infrastructure as code"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub articles: ArticleConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_parallelism")]
    pub parallelism: usize,
    /// Consecutive ids probed past a missing item during the time search.
    #[serde(default = "default_probe_window")]
    pub probe_window: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            timeout_secs: default_timeout_secs(),
            parallelism: default_fetch_parallelism(),
            probe_window: default_probe_window(),
        }
    }
}

fn default_source_url() -> String {
    "https://hacker-news.firebaseio.com/v0".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_fetch_parallelism() -> usize {
    10
}
fn default_probe_window() -> u64 {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArticleConfig {
    #[serde(default = "default_fetch_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ArticleConfig {
    fn default() -> Self {
        Self {
            parallelism: default_fetch_parallelism(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("curate/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub base_url: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_maybe_model")]
    pub maybe_relevant_model: String,
    #[serde(default = "default_maybe_limit")]
    pub maybe_relevant_limit: usize,
    #[serde(default = "default_highly_model")]
    pub highly_relevant_model: String,
    #[serde(default = "default_highly_limit")]
    pub highly_relevant_limit: usize,
    #[serde(default = "default_highly_model")]
    pub summary_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout_secs(),
            parallelism: default_llm_parallelism(),
            maybe_relevant_model: default_maybe_model(),
            maybe_relevant_limit: default_maybe_limit(),
            highly_relevant_model: default_highly_model(),
            highly_relevant_limit: default_highly_limit(),
            summary_model: default_highly_model(),
        }
    }
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_llm_parallelism() -> usize {
    4
}
fn default_maybe_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_maybe_limit() -> usize {
    10_000
}
fn default_highly_model() -> String {
    "gpt-4o".to_string()
}
fn default_highly_limit() -> usize {
    116_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_delay_ms() -> u64 {
    60_000
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicConfig {
    pub name: String,
    /// Inline search description.
    #[serde(default)]
    pub description: Option<String>,
    /// File holding the search description, relative to the config file.
    #[serde(default)]
    pub description_path: Option<PathBuf>,
    pub keywords: Vec<String>,
}

/// A topic with its search description resolved to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl Config {
    /// Resolve every configured topic, reading description files relative
    /// to `base_dir`.
    pub fn resolve_topics(&self, base_dir: &Path) -> Result<Vec<Topic>> {
        self.topics
            .iter()
            .map(|t| {
                let description = match (&t.description, &t.description_path) {
                    (Some(text), None) => text.clone(),
                    (None, Some(path)) => {
                        let full = base_dir.join(path);
                        std::fs::read_to_string(&full).with_context(|| {
                            format!(
                                "Failed to read description for topic '{}': {}",
                                t.name,
                                full.display()
                            )
                        })?
                    }
                    (Some(_), Some(_)) => bail!(
                        "topic '{}': set either description or description_path, not both",
                        t.name
                    ),
                    (None, None) => bail!(
                        "topic '{}': description or description_path is required",
                        t.name
                    ),
                };
                Ok(Topic {
                    name: t.name.clone(),
                    description: description.trim().to_string(),
                    keywords: t.keywords.clone(),
                })
            })
            .collect()
    }
}

/// Load, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.parallelism == 0
        || config.articles.parallelism == 0
        || config.llm.parallelism == 0
    {
        bail!("parallelism must be >= 1");
    }
    if config.source.probe_window == 0 {
        bail!("source.probe_window must be >= 1");
    }

    if config.retry.max_attempts == 0 {
        bail!("retry.max_attempts must be >= 1");
    }
    if config.retry.multiplier < 2.0 {
        bail!("retry.multiplier must be >= 2.0");
    }

    if config.llm.maybe_relevant_limit == 0 || config.llm.highly_relevant_limit == 0 {
        bail!("llm content limits must be > 0");
    }

    if config.topics.is_empty() {
        bail!("at least one [[topics]] entry is required");
    }
    let mut seen = HashSet::new();
    for topic in &config.topics {
        if topic.name.is_empty()
            || !topic
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            bail!(
                "topic name '{}' must be non-empty and contain only [a-z0-9_]",
                topic.name
            );
        }
        if !seen.insert(topic.name.as_str()) {
            bail!("duplicate topic name: '{}'", topic.name);
        }
        if topic.keywords.iter().all(|k| k.trim().is_empty()) {
            bail!("topic '{}' needs at least one keyword", topic.name);
        }
    }

    Ok(())
}
