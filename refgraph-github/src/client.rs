//! GitHub API client using octocrab and the GraphQL endpoint

use async_trait::async_trait;
use octocrab::Octocrab;
use refgraph_core::{Author, GitHubConfig, Identity, NodeData, NodeFetcher, Secrets};
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result};

/// GitHub API client used as the crawler's node fetcher
pub struct GitHubClient {
    client: Octocrab,
    http: reqwest::Client,
    graphql_url: Url,
    token: Option<String>,
    page_size: u8,
}

impl GitHubClient {
    /// Create a client for the configured API root
    ///
    /// Without a token only the REST API can be used anonymously; GraphQL
    /// fetches fail with an authentication error.
    pub fn new(config: &GitHubConfig, token: Option<String>) -> Result<Self> {
        let graphql_url = graphql_url(&config.api_url)?;

        let mut builder = Octocrab::builder()
            .base_uri(config.api_url.as_str())
            .map_err(|e| Error::Other(format!("Invalid API URL {}: {}", config.api_url, e)))?;
        if let Some(token) = &token {
            builder = builder.personal_token(token.clone());
        }
        let client = builder
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("refgraph/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(
            api_url = %config.api_url,
            authenticated = token.is_some(),
            "Created GitHub client"
        );

        Ok(Self {
            client,
            http,
            graphql_url,
            token,
            page_size: config.page_size.clamp(1, 100),
        })
    }

    /// Create a client with the token from `GITHUB_TOKEN` or the secrets file
    pub fn from_secrets(config: &GitHubConfig) -> Result<Self> {
        let secrets = Secrets::load().map_err(|e| Error::Auth(e.to_string()))?;
        Self::new(config, secrets.github_token())
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }

    /// Whether requests carry a token
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// The authenticated user
    pub async fn viewer(&self) -> Result<Author> {
        debug!("Fetching authenticated user");

        let user = self.client.current().user().await.map_err(|e| match e {
            octocrab::Error::GitHub { source, .. }
                if source.message.contains("Requires authentication")
                    || source.message.contains("Bad credentials") =>
            {
                Error::Auth(source.message)
            }
            other => Error::Api(other),
        })?;

        Ok(Author {
            login: user.login,
            avatar_url: Some(user.avatar_url.to_string()),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn graphql_endpoint(&self) -> &Url {
        &self.graphql_url
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn page_size(&self) -> u8 {
        self.page_size
    }
}

#[async_trait]
impl NodeFetcher for GitHubClient {
    async fn fetch_node(&self, identity: &Identity) -> refgraph_core::Result<NodeData> {
        Ok(self.get_issue_or_pull_request(identity).await?)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("graphql_url", &self.graphql_url.as_str())
            .field("authenticated", &self.token.is_some())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// GraphQL endpoint for an API root
///
/// `https://api.github.com` maps to `https://api.github.com/graphql`;
/// GitHub Enterprise's `https://host/api/v3` maps to `https://host/api/graphql`.
fn graphql_url(api_url: &Url) -> Result<Url> {
    api_url
        .join("graphql")
        .map_err(|e| Error::Parse(format!("Invalid API URL {}: {}", api_url, e)))
}
