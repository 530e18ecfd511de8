//! GitHub GraphQL queries for issue and pull request nodes

use refgraph_core::{Author, Comment, Identity, NodeData, NodeKind, NodeState};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::{Error, GitHubClient, Result};

const NODE_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $pageSize: Int!) {
    repository(owner: $owner, name: $repo) {
        issueOrPullRequest(number: $number) {
            __typename
            ... on Issue {
                url
                title
                body
                issueState: state
                author { login avatarUrl }
                timelineItems(first: $pageSize, itemTypes: [CROSS_REFERENCED_EVENT]) {
                    nodes { ...CrossReference }
                }
                comments(first: $pageSize) {
                    nodes { body author { login avatarUrl } }
                }
            }
            ... on PullRequest {
                url
                title
                body
                pullRequestState: state
                isDraft
                author { login avatarUrl }
                timelineItems(first: $pageSize, itemTypes: [CROSS_REFERENCED_EVENT]) {
                    nodes { ...CrossReference }
                }
                comments(first: $pageSize) {
                    nodes { body author { login avatarUrl } }
                }
            }
        }
    }
}

fragment CrossReference on CrossReferencedEvent {
    source {
        ... on Issue { number repository { name owner { login } } }
        ... on PullRequest { number repository { name owner { login } } }
    }
}
"#;

/// GraphQL query response wrapper
#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

/// GraphQL error
#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeQuery {
    repository: Option<RepositoryData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryData {
    issue_or_pull_request: Option<IssueOrPullRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueOrPullRequest {
    #[serde(rename = "__typename")]
    typename: String,
    url: Option<String>,
    title: String,
    #[serde(default)]
    body: String,
    issue_state: Option<String>,
    pull_request_state: Option<String>,
    #[serde(default)]
    is_draft: bool,
    author: Option<AuthorData>,
    timeline_items: Connection<TimelineItem>,
    comments: Connection<CommentData>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    nodes: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
struct TimelineItem {
    source: Option<ReferenceSource>,
}

/// Cross-reference source; empty for sources that are neither issues nor PRs
#[derive(Debug, Deserialize)]
struct ReferenceSource {
    number: Option<u64>,
    repository: Option<RepositoryRef>,
}

#[derive(Debug, Deserialize)]
struct RepositoryRef {
    name: String,
    owner: Login,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorData {
    login: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    #[serde(default)]
    body: String,
    author: Option<AuthorData>,
}

impl From<AuthorData> for Author {
    fn from(data: AuthorData) -> Self {
        Author {
            login: data.login,
            avatar_url: data.avatar_url,
        }
    }
}

impl ReferenceSource {
    fn into_identity(self) -> Option<Identity> {
        let repository = self.repository?;
        Identity::new(repository.owner.login, repository.name, self.number?).ok()
    }
}

impl IssueOrPullRequest {
    fn into_node(self) -> Result<NodeData> {
        let (kind, state) = match self.typename.as_str() {
            "Issue" => (NodeKind::Issue, self.issue_state.as_deref()),
            "PullRequest" => (NodeKind::PullRequest, self.pull_request_state.as_deref()),
            other => return Err(Error::Parse(format!("Unexpected node type {}", other))),
        };

        let state = match state {
            Some("OPEN") => NodeState::Open,
            Some("CLOSED") => NodeState::Closed,
            Some("MERGED") if kind == NodeKind::PullRequest => NodeState::Merged,
            other => return Err(Error::Parse(format!("Unexpected state {:?}", other))),
        };

        let timeline_sources = self
            .timeline_items
            .nodes
            .into_iter()
            .flatten()
            .filter_map(|item| item.source)
            .filter_map(ReferenceSource::into_identity)
            .collect();

        let comments = self
            .comments
            .nodes
            .into_iter()
            .flatten()
            .map(|c| Comment {
                author: c.author.map(Author::from),
                body: c.body,
            })
            .collect();

        Ok(NodeData {
            kind,
            title: self.title,
            body: self.body,
            author: self.author.map(Author::from),
            state,
            is_draft: self.is_draft,
            url: self.url,
            comments,
            timeline_sources,
        })
    }
}

impl GitHubClient {
    /// Fetch an issue or pull request with its comments and cross-references
    pub async fn get_issue_or_pull_request(&self, identity: &Identity) -> Result<NodeData> {
        debug!(identity = %identity, "Fetching node via GraphQL");

        let variables = json!({
            "owner": identity.owner,
            "repo": identity.repo,
            "number": identity.number,
            "pageSize": self.page_size(),
        });

        let response = self
            .graphql_query::<NodeQuery>(NODE_QUERY, &variables)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(identity.to_string()),
                other => other,
            })?;

        response
            .repository
            .and_then(|r| r.issue_or_pull_request)
            .ok_or_else(|| Error::NotFound(identity.to_string()))?
            .into_node()
    }

    /// Execute a GraphQL query
    async fn graphql_query<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: &serde_json::Value,
    ) -> Result<T> {
        let token = self.token().ok_or_else(|| {
            Error::Auth(
                "GitHub's GraphQL API requires a token. Set GITHUB_TOKEN \
                 or add token to ~/.config/refgraph/secrets.toml"
                    .to_string(),
            )
        })?;

        let request_body = json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .http()
            .post(self.graphql_endpoint().clone())
            .bearer_auth(token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reset = response
                .headers()
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .is_some_and(|v| v.as_bytes() == b"0");
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response".to_string());

            return Err(match status.as_u16() {
                401 => Error::Auth(format!("Invalid GitHub token: {}", text)),
                403 | 429 if exhausted => {
                    Error::RateLimited(reset.unwrap_or_else(|| "unknown".to_string()))
                }
                404 => Error::NotFound("GraphQL endpoint".to_string()),
                _ => Error::Other(format!(
                    "GraphQL request failed with status {}: {}",
                    status, text
                )),
            });
        }

        let graphql_response: GraphQLResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("Failed to parse GraphQL response: {}", e)))?;

        if let Some(errors) = graphql_response.errors.filter(|errors| !errors.is_empty()) {
            return Err(classify_errors(errors));
        }

        graphql_response
            .data
            .ok_or_else(|| Error::Other("GraphQL response missing data".to_string()))
    }
}

fn classify_errors(errors: Vec<GraphQLError>) -> Error {
    let kind_of = |kind: &str| errors.iter().any(|e| e.kind.as_deref() == Some(kind));

    if kind_of("RATE_LIMITED") {
        return Error::RateLimited("unknown".to_string());
    }

    let messages: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
    if kind_of("NOT_FOUND") {
        return Error::NotFound(messages.join(", "));
    }

    warn!(errors = ?messages, "GraphQL query failed");
    Error::GraphQl(messages.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> NodeData {
        let query: NodeQuery = serde_json::from_value(value).unwrap();
        query
            .repository
            .unwrap()
            .issue_or_pull_request
            .unwrap()
            .into_node()
            .unwrap()
    }

    #[test]
    fn test_issue_conversion() {
        let node = parse(json!({
            "repository": {
                "issueOrPullRequest": {
                    "__typename": "Issue",
                    "url": "https://github.com/o/r/issues/1",
                    "title": "Crash on start",
                    "body": "fixes #2",
                    "issueState": "CLOSED",
                    "author": { "login": "octocat", "avatarUrl": "https://avatars/1" },
                    "timelineItems": { "nodes": [
                        { "source": {
                            "number": 9,
                            "repository": { "name": "y", "owner": { "login": "x" } }
                        } },
                        { "source": {} },
                        null
                    ] },
                    "comments": { "nodes": [
                        { "body": "part of o/r#3", "author": null }
                    ] }
                }
            }
        }));

        assert_eq!(node.kind, NodeKind::Issue);
        assert_eq!(node.state, NodeState::Closed);
        assert_eq!(node.title, "Crash on start");
        assert_eq!(node.author.unwrap().login, "octocat");
        assert_eq!(node.timeline_sources, vec![Identity::new("x", "y", 9).unwrap()]);
        assert_eq!(node.comments.len(), 1);
        assert!(node.comments[0].author.is_none());
        assert_eq!(node.comments[0].body, "part of o/r#3");
    }

    #[test]
    fn test_draft_pull_request_conversion() {
        let node = parse(json!({
            "repository": {
                "issueOrPullRequest": {
                    "__typename": "PullRequest",
                    "title": "Add feature",
                    "body": "",
                    "pullRequestState": "MERGED",
                    "isDraft": true,
                    "author": null,
                    "timelineItems": { "nodes": [] },
                    "comments": { "nodes": [] }
                }
            }
        }));

        assert!(node.is_pull_request());
        assert_eq!(node.state, NodeState::Merged);
        assert!(node.is_draft);
        assert!(node.author.is_none());
    }

    #[test]
    fn test_merged_issue_rejected() {
        let query: NodeQuery = serde_json::from_value(json!({
            "repository": {
                "issueOrPullRequest": {
                    "__typename": "Issue",
                    "title": "t",
                    "issueState": "MERGED",
                    "timelineItems": { "nodes": [] },
                    "comments": { "nodes": [] }
                }
            }
        }))
        .unwrap();
        let result = query.repository.unwrap().issue_or_pull_request.unwrap().into_node();
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_classify_errors() {
        let not_found = classify_errors(vec![GraphQLError {
            message: "Could not resolve to a Repository".to_string(),
            kind: Some("NOT_FOUND".to_string()),
        }]);
        assert!(matches!(not_found, Error::NotFound(_)));

        let limited = classify_errors(vec![GraphQLError {
            message: "API rate limit exceeded".to_string(),
            kind: Some("RATE_LIMITED".to_string()),
        }]);
        assert!(matches!(limited, Error::RateLimited(_)));

        let other = classify_errors(vec![GraphQLError {
            message: "Something odd".to_string(),
            kind: None,
        }]);
        assert_eq!(other.to_string(), "GraphQL errors: Something odd");
    }

    #[test]
    fn test_fetch_error_maps_into_core() {
        let err: refgraph_core::Error = Error::NotFound("o/r#1".to_string()).into();
        assert!(matches!(err, refgraph_core::Error::Fetch(ref msg) if msg == "o/r#1 not found"));
    }
}
