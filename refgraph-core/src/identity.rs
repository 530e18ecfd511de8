//! Issue and pull request identities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::NodeKind;
use crate::{Error, Result};

/// Address of one issue or pull request on GitHub
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// Repository owner (user or organization login)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Issue or pull request number
    pub number: u64,
}

impl Identity {
    /// Create a validated identity
    ///
    /// Owner and repo must be non-empty `[-A-Za-z0-9_]+` tokens and the
    /// number must be positive.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Result<Self> {
        let identity = Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        };

        if !identity.is_valid() {
            return Err(Error::InvalidIdentity(format!(
                "{}/{}#{}",
                identity.owner, identity.repo, identity.number
            )));
        }

        Ok(identity)
    }

    /// Check the token grammar and number range
    pub fn is_valid(&self) -> bool {
        is_token(&self.owner) && is_token(&self.repo) && self.number > 0
    }

    /// Stable dedup key, `owner/repo#number` with owner and repo lowercased
    ///
    /// GitHub resolves owner and repo names case-insensitively.
    pub fn key(&self) -> String {
        format!(
            "{}/{}#{}",
            self.owner.to_lowercase(),
            self.repo.to_lowercase(),
            self.number
        )
    }

    /// Browser URL for this identity
    pub fn html_url(&self, kind: NodeKind) -> String {
        let segment = match kind {
            NodeKind::Issue => "issues",
            NodeKind::PullRequest => "pull",
        };
        format!(
            "https://github.com/{}/{}/{}/{}",
            self.owner, self.repo, segment, self.number
        )
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

impl FromStr for Identity {
    type Err = Error;

    /// Parse the short form `owner/repo#number`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidIdentity(format!("{}. Expected owner/repo#number", s));

        let (path, number) = s.trim().split_once('#').ok_or_else(invalid)?;
        let (owner, repo) = path.split_once('/').ok_or_else(invalid)?;
        let number = number.parse::<u64>().map_err(|_| invalid())?;

        Self::new(owner, repo, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let id = Identity::new("octo", "hello-world", 42).unwrap();
        assert_eq!(id.key(), "octo/hello-world#42");
    }

    #[test]
    fn test_key_ignores_case() {
        let upper = Identity::new("Octo", "Hello-World", 42).unwrap();
        assert_eq!(upper.key(), "octo/hello-world#42");
        assert_eq!(upper.to_string(), "Octo/Hello-World#42");
    }

    #[test]
    fn test_rejects_zero_number() {
        assert!(Identity::new("a", "b", 0).is_err());
    }

    #[test]
    fn test_rejects_bad_tokens() {
        assert!(Identity::new("", "b", 1).is_err());
        assert!(Identity::new("a", "b c", 1).is_err());
        assert!(Identity::new("a/x", "b", 1).is_err());
    }

    #[test]
    fn test_from_str() {
        let id: Identity = "foo/bar_baz#7".parse().unwrap();
        assert_eq!(id.owner, "foo");
        assert_eq!(id.repo, "bar_baz");
        assert_eq!(id.number, 7);
    }

    #[test]
    fn test_from_str_invalid() {
        assert!("foo#7".parse::<Identity>().is_err());
        assert!("foo/bar".parse::<Identity>().is_err());
        assert!("foo/bar#x".parse::<Identity>().is_err());
    }

    #[test]
    fn test_html_url() {
        let id = Identity::new("o", "r", 3).unwrap();
        assert_eq!(id.html_url(NodeKind::Issue), "https://github.com/o/r/issues/3");
        assert_eq!(id.html_url(NodeKind::PullRequest), "https://github.com/o/r/pull/3");
    }
}
