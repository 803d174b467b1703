//! Keyword pre-filter in front of the classifiers.
//!
//! A document is a candidate for a topic when its title or content
//! contains any of the topic's keywords as a whole word, ignoring case.
//! Multi-word keywords match as a phrase. Word boundaries are "not a
//! letter, digit, or underscore", so keywords like `c++` or `.net` match
//! too.

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::models::ArticleDoc;

pub struct KeywordRouter {
    pattern: Regex,
}

impl KeywordRouter {
    pub fn new(keywords: &[String]) -> Result<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                k.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect();

        if alternatives.is_empty() {
            bail!("keyword router needs at least one non-empty keyword");
        }

        let pattern = format!(
            r"(?i)(?:^|[^\p{{L}}\p{{N}}_])(?:{})(?:$|[^\p{{L}}\p{{N}}_])",
            alternatives.join("|")
        );
        let pattern = Regex::new(&pattern).context("Failed to compile keyword pattern")?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, doc: &ArticleDoc) -> bool {
        self.pattern.is_match(&doc.title) || self.pattern.is_match(&doc.content)
    }

    /// Candidates for this router's topic, in input order.
    pub fn filter<'a>(&self, docs: &'a [ArticleDoc]) -> Vec<&'a ArticleDoc> {
        docs.iter().filter(|d| self.matches(d)).collect()
    }
}
