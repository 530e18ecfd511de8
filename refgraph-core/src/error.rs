//! Error types for refgraph

use thiserror::Error;

/// Result type alias for refgraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for refgraph operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A seed URL that is not a GitHub issue or pull request URL
    #[error("Malformed GitHub issue or pull request URL: {0}")]
    MalformedUrl(String),

    /// Owner, repo or number outside the accepted token grammar
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// Reference taxonomy that cannot be compiled
    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    /// Failure reported by the node fetcher
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
