//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub REST API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Transport-level failure talking to the GraphQL endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Repository, issue or pull request not found
    #[error("{0} not found")]
    NotFound(String),

    /// Rate limit exceeded
    #[error("GitHub rate limit exceeded, resets at {0}")]
    RateLimited(String),

    /// Errors reported in a GraphQL response body
    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<Error> for refgraph_core::Error {
    fn from(err: Error) -> Self {
        refgraph_core::Error::Fetch(err.to_string())
    }
}
