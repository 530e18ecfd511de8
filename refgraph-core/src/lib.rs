//! refgraph core - reference parsing and crawling for GitHub issue graphs
//!
//! This crate extracts typed cross-references ("fixes #12", "part of
//! owner/repo#34", full URLs) from issue text and crawls the graph they
//! form, emitting node, error and edge events for a renderer to consume.
//! Fetching is delegated to a [`NodeFetcher`].

pub mod config;
pub mod crawler;
pub mod error;
pub mod event;
pub mod identity;
pub mod node;
pub mod parser;
pub mod secrets;
pub mod taxonomy;

pub use config::{Config, CrawlConfig, GitHubConfig};
pub use crawler::{CrawlRun, CrawlStats, Crawler, NodeFetcher, WorkItem};
pub use error::{Error, Result};
pub use event::CrawlEvent;
pub use identity::Identity;
pub use node::{Author, Comment, NodeData, NodeKind, NodeState};
pub use parser::{parse_github_url, Reference, ReferenceParser};
pub use secrets::Secrets;
pub use taxonomy::{Alias, ReferenceType, ReferenceTypeConfig, Taxonomy, TaxonomyConfig};
