//! refgraph GitHub - fetches issues and pull requests for the crawler
//!
//! Implements [`refgraph_core::NodeFetcher`] on top of the GitHub GraphQL
//! API, with octocrab for the REST calls.

mod client;
mod error;
mod graphql;

pub use client::GitHubClient;
pub use error::{Error, Result};
