//! Configuration management for refgraph
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (REFGRAPH_*)
//! 3. Config file (~/.config/refgraph/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::taxonomy::{Taxonomy, TaxonomyConfig};
use crate::{Error, Result};

const DEFAULT_API_URL: &str = "https://api.github.com";

/// Crawl settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Number of concurrent workers
    pub concurrency: usize,

    /// Do not queue anything further than this many hops from the seed
    pub max_depth: Option<u32>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_depth: None,
        }
    }
}

/// GitHub API settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// REST/GraphQL API root
    pub api_url: Url,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Comments and timeline items requested per node (max 100)
    pub page_size: u8,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        let api_url = match Url::parse(DEFAULT_API_URL) {
            Ok(url) => url,
            Err(_) => unreachable!("static API URL"),
        };

        Self {
            api_url,
            timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Crawl configuration
    pub crawl: CrawlConfig,

    /// GitHub configuration
    pub github: GitHubConfig,

    /// Taxonomy file; the built-in taxonomy is used when unset
    pub taxonomy: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/refgraph/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("refgraph").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - REFGRAPH_CONCURRENCY: Number of crawl workers
    /// - REFGRAPH_MAX_DEPTH: Maximum crawl depth
    /// - REFGRAPH_API_URL: GitHub API root
    /// - REFGRAPH_TAXONOMY: Path to a taxonomy file
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(concurrency) = env_parse("REFGRAPH_CONCURRENCY") {
            self.crawl.concurrency = concurrency;
        }

        if let Some(max_depth) = env_parse("REFGRAPH_MAX_DEPTH") {
            self.crawl.max_depth = Some(max_depth);
        }

        if let Some(api_url) = env_parse("REFGRAPH_API_URL") {
            self.github.api_url = api_url;
        }

        if let Ok(taxonomy) = std::env::var("REFGRAPH_TAXONOMY") {
            self.taxonomy = Some(PathBuf::from(taxonomy));
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        concurrency: Option<usize>,
        max_depth: Option<u32>,
        taxonomy: Option<PathBuf>,
    ) -> Self {
        if let Some(n) = concurrency {
            self.crawl.concurrency = n;
        }

        if let Some(depth) = max_depth {
            self.crawl.max_depth = Some(depth);
        }

        if let Some(path) = taxonomy {
            self.taxonomy = Some(path);
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        concurrency: Option<usize>,
        max_depth: Option<u32>,
        taxonomy: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self::load()?
            .with_env_overrides()
            .with_cli_overrides(concurrency, max_depth, taxonomy))
    }

    /// Compile the configured taxonomy
    pub fn load_taxonomy(&self) -> Result<Taxonomy> {
        let config = match &self.taxonomy {
            Some(path) => TaxonomyConfig::load_from_file(path)?,
            None => TaxonomyConfig::builtin(),
        };
        Taxonomy::new(config)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(variable = name, value = %value, "Ignoring unparseable environment override");
            None
        }
    }
}
