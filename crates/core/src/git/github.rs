//! GitHub GraphQL API client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::remote_url::derive_graphql_url;
use crate::errors::GitHubError;
use crate::identity::service::{
    CommitAuthorHistory, HistoryEntry, IdentityCandidate, IdentityService,
};

const SEARCH_USER_QUERY: &str = r#"
query searchUserInfo($queryStr: String!) {
  search(query: $queryStr, type: USER, first: 1) {
    nodes {
      ... on User {
        login
      }
    }
  }
}"#;

const COMMIT_AUTHOR_QUERY: &str = r#"
query getUserInfoFromCommit($repo: String!, $owner: String!, $commit: GitObjectID!) {
  repository(name: $repo, owner: $owner) {
    object(oid: $commit) {
      ... on Commit {
        history(first: 1) {
          nodes {
            author {
              name
            }
          }
        }
      }
    }
  }
}"#;

// -- Wire types ---------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a, V: Serialize> {
    query: &'a str,
    variables: V,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: SearchConnection,
}

#[derive(Debug, Deserialize)]
struct SearchConnection {
    #[serde(default)]
    nodes: Vec<SearchNode>,
}

/// Non-user results come back as empty objects.
#[derive(Debug, Deserialize)]
struct SearchNode {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    object: Option<CommitNode>,
}

#[derive(Debug, Deserialize)]
struct CommitNode {
    history: Option<HistoryConnection>,
}

#[derive(Debug, Deserialize)]
struct HistoryConnection {
    #[serde(default)]
    nodes: Vec<HistoryNode>,
}

#[derive(Debug, Deserialize)]
struct HistoryNode {
    author: Option<AuthorNode>,
}

#[derive(Debug, Deserialize)]
struct AuthorNode {
    name: Option<String>,
}

// -- Client -------------------------------------------------------------------

/// Asynchronous GitHub GraphQL client authenticated with a bearer token.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    graphql_url: String,
    token: String,
}

impl GitHubClient {
    /// Build a client for the GraphQL endpoint belonging to `api_url`.
    pub fn new(api_url: impl AsRef<str>, token: impl Into<String>) -> Result<Self, GitHubError> {
        Self::with_graphql_url(derive_graphql_url(api_url.as_ref()), token)
    }

    /// Build a client that posts to `graphql_url` verbatim.
    pub fn with_graphql_url(
        graphql_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, GitHubError> {
        let graphql_url = graphql_url.into();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("gitauthors/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder().default_headers(headers).build()?;
        info!(graphql_url = %graphql_url, "created GitHubClient");
        Ok(Self {
            http,
            graphql_url,
            token: token.into(),
        })
    }

    async fn query<V, T>(&self, query: &str, variables: V) -> Result<T, GitHubError>
    where
        V: Serialize + Send,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(&self.token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;
        check_response(&resp)?;
        let body: GraphQlResponse<T> = resp
            .json()
            .await
            .map_err(|e| GitHubError::ParseError(e.to_string()))?;

        if !body.errors.is_empty() {
            let messages: Vec<_> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(GitHubError::GraphQl(messages.join("; ")));
        }
        body.data
            .ok_or_else(|| GitHubError::ParseError("response has no data".into()))
    }
}

#[async_trait]
impl IdentityService for GitHubClient {
    #[instrument(skip(self))]
    async fn search_identity(&self, query: &str) -> Result<Vec<IdentityCandidate>, GitHubError> {
        let data: SearchData = self
            .query(SEARCH_USER_QUERY, serde_json::json!({ "queryStr": query }))
            .await?;
        let candidates: Vec<IdentityCandidate> = data
            .search
            .nodes
            .into_iter()
            .filter_map(|node| node.login)
            .map(|handle| IdentityCandidate { handle })
            .collect();
        debug!(count = candidates.len(), "searched users");
        Ok(candidates)
    }

    #[instrument(skip(self))]
    async fn lookup_commit_author(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<CommitAuthorHistory, GitHubError> {
        let data: CommitData = self
            .query(
                COMMIT_AUTHOR_QUERY,
                serde_json::json!({ "owner": owner, "repo": repo, "commit": commit }),
            )
            .await?;
        let history: Vec<HistoryEntry> = data
            .repository
            .and_then(|r| r.object)
            .and_then(|o| o.history)
            .map(|h| h.nodes)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|node| node.author.and_then(|a| a.name))
            .map(|author_name| HistoryEntry { author_name })
            .collect();
        debug!(entries = history.len(), "fetched commit author");
        Ok(CommitAuthorHistory { history })
    }
}

fn check_response(resp: &reqwest::Response) -> Result<(), GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(GitHubError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    if status.as_u16() == 429 {
        let reset = resp
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(GitHubError::RateLimited { reset_at: reset });
    }
    Err(GitHubError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}
