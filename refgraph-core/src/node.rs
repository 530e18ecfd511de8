//! Fetched issue and pull request data

use serde::{Deserialize, Serialize};

use crate::Identity;

/// Whether a node is an issue or a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Issue,
    PullRequest,
}

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Open,
    Closed,
    /// Only reachable for pull requests
    Merged,
}

/// Author of an issue, pull request or comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// GitHub login
    pub login: String,
    /// Avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A comment on an issue or pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment author (None for deleted accounts)
    pub author: Option<Author>,
    /// Markdown body
    pub body: String,
}

impl Comment {
    /// Comment with no known author
    pub fn anonymous(body: impl Into<String>) -> Self {
        Self {
            author: None,
            body: body.into(),
        }
    }
}

/// Snapshot of one issue or pull request, as returned by a fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    /// Issue or pull request
    pub kind: NodeKind,
    /// Title
    pub title: String,
    /// Markdown body
    pub body: String,
    /// Author (None for deleted accounts)
    pub author: Option<Author>,
    /// Open/closed/merged
    pub state: NodeState,
    /// Draft flag (pull requests only)
    #[serde(default)]
    pub is_draft: bool,
    /// Browser URL, when the fetcher reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Comments in timeline order
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Sources of platform-detected cross-reference events
    #[serde(default)]
    pub timeline_sources: Vec<Identity>,
}

impl NodeData {
    /// Minimal open issue with the given title and body
    pub fn issue(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Issue,
            title: title.into(),
            body: body.into(),
            author: None,
            state: NodeState::Open,
            is_draft: false,
            url: None,
            comments: Vec::new(),
            timeline_sources: Vec::new(),
        }
    }

    /// Add a comment
    pub fn with_comment(mut self, comment: Comment) -> Self {
        self.comments.push(comment);
        self
    }

    /// Add a cross-reference timeline source
    pub fn with_timeline_source(mut self, source: Identity) -> Self {
        self.timeline_sources.push(source);
        self
    }

    /// Whether this node is a pull request
    pub fn is_pull_request(&self) -> bool {
        self.kind == NodeKind::PullRequest
    }
}
