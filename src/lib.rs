//! # Curate
//!
//! A partitioned enrichment pipeline for link aggregator stories.
//!
//! For one time window (a partition), curate collects the stories posted
//! in it, fetches their linked articles, and asks an LLM which of them
//! match each configured topic: a cheap keyword filter first, then a
//! loose "maybe relevant" pass, then a strict "highly relevant" pass, then
//! a short summary. Results are stored in SQLite, replacing whatever the
//! partition held before, so a window can be re-run at any time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ Item source│──▶│  Article  │──▶│  Keyword +   │──▶│  SQLite   │
//! │  (HN API)  │   │   fetch   │   │ LLM stages   │   │ partition │
//! └────────────┘   └───────────┘   └──────┬───────┘   └──────────┘
//!                                         │
//!                                  ┌──────▼───────┐
//!                                  │ response     │
//!                                  │ cache        │
//!                                  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! curate init                                   # create database
//! curate hourly --hour 2024-06-01T13            # one hourly partition
//! curate run --start 2024-06-01T00:00:00Z --end 2024-06-02T00:00:00Z
//! curate stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Items, documents, attributes, partitions |
//! | [`error`] | Transient / per-item / fatal error taxonomy |
//! | [`retry`] | Exponential backoff for transient failures |
//! | [`fetcher`] | Bounded parallel fetch with retry |
//! | [`sources`] | Item source trait and Hacker News client |
//! | [`article`] | Article download and HTML-to-text |
//! | [`collect`] | Time to id range search, item collection |
//! | [`keywords`] | Keyword pre-filter |
//! | [`cache`] | LLM response cache |
//! | [`llm`] | Chat completion client, cached JSON completions |
//! | [`prompts`] | Prompt text |
//! | [`classify`] | Two-tier relevance classification |
//! | [`summarize`] | Summaries for highly relevant documents |
//! | [`store`] | SQLite reads and writes |
//! | [`writer`] | Transactional partition replacement |
//! | [`pipeline`] | One partition run, end to end |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`stats`] | `curate stats` overview |
//! | [`get`] | `curate get` document lookup |

pub mod article;
pub mod cache;
pub mod classify;
pub mod collect;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod get;
pub mod keywords;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod sources;
pub mod stats;
pub mod store;
pub mod summarize;
pub mod writer;
