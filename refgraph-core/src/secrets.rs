//! GitHub token storage
//!
//! The token lives outside the config file so configs can be shared.
//! `~/.config/refgraph/secrets.toml` must be readable by its owner only
//! (0600 on Unix). `GITHUB_TOKEN` takes precedence over the file.
//!
//! A missing token is not an error here; commands that call the API
//! report it when they need one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

const TOKEN_ENV: &str = "GITHUB_TOKEN";

const TEMPLATE: &str = r#"# refgraph secrets
# Keep this file private (chmod 600) and out of version control.

[github]
# Personal access token, https://github.com/settings/tokens
# Read access to issues and pull requests is enough.
token = ""
"#;

/// Secrets file contents
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitHub credentials
    pub github: GitHubSecrets,
}

/// GitHub credentials
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// Personal access token
    pub token: Option<String>,
}

impl Secrets {
    /// Load secrets from the default location, or empty secrets if absent
    pub fn load() -> Result<Self> {
        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load secrets from a file, refusing group/world-readable files
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(path).map_err(Error::Io)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        secrets.github.token = secrets
            .github
            .token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());

        debug!(
            path = %path.display(),
            has_token = secrets.github.token.is_some(),
            "Loaded secrets"
        );
        Ok(secrets)
    }

    /// `~/.config/refgraph/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("refgraph").join("secrets.toml"))
    }

    /// GitHub token, preferring the environment over the file
    pub fn github_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim();
            if !token.is_empty() {
                debug!("Using GitHub token from {}", TOKEN_ENV);
                return Some(token.to_string());
            }
        }

        self.github.token.clone()
    }

    /// Write an empty secrets template with owner-only permissions
    pub fn create_template(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(Error::Config(format!(
                "Secrets file already exists at {}",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        std::fs::write(path, TEMPLATE).map_err(Error::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms).map_err(Error::Io)?;
        }

        warn!(path = %path.display(), "Created secrets template - add your token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_parse_secrets() {
        let toml = r#"
[github]
token = "ghp_xxxxxxxxxxxx"
"#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.github.token, Some("ghp_xxxxxxxxxxxx".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_insecure_permissions_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[github]\ntoken = \"test\"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = Secrets::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_trimmed_and_blank_dropped() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[github]\ntoken = \"  ghp_test  \"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(file.path()).unwrap();
        assert_eq!(secrets.github.token, Some("ghp_test".to_string()));

        let mut blank = NamedTempFile::new().unwrap();
        writeln!(blank, "[github]\ntoken = \"   \"").unwrap();
        std::fs::set_permissions(blank.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        assert!(Secrets::load_from_file(blank.path()).unwrap().github.token.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_template_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("secrets.toml");

        Secrets::create_template(&path).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert!(secrets.github.token.is_none());

        assert!(Secrets::create_template(&path).is_err());
    }
}
