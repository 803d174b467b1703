//! Article content fetching.
//!
//! [`WebArticleClient`] downloads a story's linked page and reduces it to
//! readable text with [`html_to_text`]. A page that yields no text is a
//! permanent failure, the same as a 404: the story has nothing to
//! classify.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use crate::config::ArticleConfig;
use crate::error::FetchError;

#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Fetch the readable text behind `url`. Never returns an empty string.
    async fn fetch_article(&self, url: &str) -> Result<String, FetchError>;
}

pub struct WebArticleClient {
    client: reqwest::Client,
}

impl WebArticleClient {
    pub fn new(config: &ArticleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build article HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArticleSource for WebArticleClient {
    async fn fetch_article(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status, url));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;

        let text = if content_type.contains("html") {
            html_to_text(&body)
        } else if content_type.starts_with("text/") {
            normalize_lines(&body)
        } else {
            return Err(FetchError::Permanent(format!(
                "{}: unsupported content type {}",
                url, content_type
            )));
        };

        if text.is_empty() {
            return Err(FetchError::Permanent(format!("{}: no readable text", url)));
        }
        Ok(text)
    }
}

struct HtmlPatterns {
    hidden: Vec<Regex>,
    comment: Regex,
    block: Regex,
    tag: Regex,
    numeric_entity: Regex,
}

fn patterns() -> &'static HtmlPatterns {
    static PATTERNS: OnceLock<HtmlPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let hidden = [
            "head", "script", "style", "noscript", "nav", "footer", "svg", "template", "form",
        ]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b.*?</{tag}\s*>")).expect("static pattern")
        })
        .collect();

        HtmlPatterns {
            hidden,
            comment: Regex::new(r"(?s)<!--.*?-->").expect("static pattern"),
            block: Regex::new(
                r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|table|section|article|blockquote|pre|header|main)\b[^>]*>",
            )
            .expect("static pattern"),
            tag: Regex::new(r"(?s)<[^>]*>").expect("static pattern"),
            numeric_entity: Regex::new(r"&#([xX][0-9a-fA-F]+|[0-9]+);").expect("static pattern"),
        }
    })
}

/// Reduce an HTML page to its visible text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let p = patterns();

    let mut text = p.comment.replace_all(html, " ").into_owned();
    for hidden in &p.hidden {
        text = hidden.replace_all(&text, " ").into_owned();
    }
    let text = p.block.replace_all(&text, "\n");
    let text = p.tag.replace_all(&text, " ");
    let text = decode_entities(&text);

    normalize_lines(&text)
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&mdash;", "-")
        .replace("&ndash;", "-")
        .replace("&hellip;", "...");

    let numeric = patterns()
        .numeric_entity
        .replace_all(&named, |caps: &regex::Captures| {
            let code = &caps[1];
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse::<u32>().ok(),
            };
            value
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        });

    // Last, so "&amp;lt;" stays "&lt;".
    numeric.replace("&amp;", "&")
}

/// Collapse runs of whitespace inside each line and drop blank lines.
fn normalize_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
