//! Query client boundary and the GitHub GraphQL implementation.
//!
//! A [`QueryClient`] turns an optional credential into an authenticated
//! [`QueryHandle`]. Handles own whatever secret they were built with; callers
//! only ever see `query`. Retries, rate limiting and caching belong here, not
//! in the engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::credential::Credential;

/// Errors raised by a query handle.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        QueryError::Transport(err.to_string())
    }
}

/// A GraphQL request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub variables: serde_json::Value,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = variables;
        self
    }
}

/// An authenticated query capability.
#[async_trait]
pub trait QueryHandle: Send + Sync {
    /// Run a request, returning its `data` payload.
    async fn query(&self, request: QueryRequest) -> Result<serde_json::Value, QueryError>;
}

/// Produces query handles bound to a credential.
pub trait QueryClient: Send + Sync {
    fn authenticate(&self, credential: Option<&Credential>) -> Arc<dyn QueryHandle>;
}

// ---------------------------------------------------------------------------
// GitHub GraphQL over reqwest
// ---------------------------------------------------------------------------

/// Client for the GitHub GraphQL API v4.
#[derive(Debug, Clone)]
pub struct GithubGraphqlClient {
    endpoint: String,
    http: reqwest::Client,
}

impl GithubGraphqlClient {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.github.com/graphql";

    pub fn new(endpoint: impl Into<String>) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ghgraph/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }

    /// Endpoint from `GHGRAPH_GRAPHQL_ENDPOINT`, else the public API.
    pub fn from_env() -> Result<Self, QueryError> {
        let endpoint = std::env::var("GHGRAPH_GRAPHQL_ENDPOINT")
            .unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        Self::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl QueryClient for GithubGraphqlClient {
    fn authenticate(&self, credential: Option<&Credential>) -> Arc<dyn QueryHandle> {
        Arc::new(GithubGraphqlHandle {
            endpoint: self.endpoint.clone(),
            http: self.http.clone(),
            authorization: credential.map(|c| format!("token {}", c.expose_secret())),
        })
    }
}

struct GithubGraphqlHandle {
    endpoint: String,
    http: reqwest::Client,
    authorization: Option<String>,
}

impl std::fmt::Debug for GithubGraphqlHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubGraphqlHandle")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.authorization.is_some())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

/// Split a GraphQL response body into its `data` payload or its errors.
pub fn parse_graphql_response(body: &str) -> Result<serde_json::Value, QueryError> {
    let response: GraphQlResponse = serde_json::from_str(body)
        .map_err(|e| QueryError::MalformedResponse(e.to_string()))?;
    if !response.errors.is_empty() {
        return Err(QueryError::GraphQl {
            messages: response.errors.into_iter().map(|e| e.message).collect(),
        });
    }
    response
        .data
        .ok_or_else(|| QueryError::MalformedResponse("response has no data".to_string()))
}

#[async_trait]
impl QueryHandle for GithubGraphqlHandle {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn query(&self, request: QueryRequest) -> Result<serde_json::Value, QueryError> {
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(authorization) = &self.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "graphql response");

        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_graphql_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_data_payload() {
        let data = parse_graphql_response(r#"{"data":{"viewer":{"login":"octocat"}}}"#).unwrap();
        assert_eq!(data, json!({ "viewer": { "login": "octocat" } }));
    }

    #[test]
    fn test_parse_errors_take_precedence() {
        let err = parse_graphql_response(
            r#"{"data":null,"errors":[{"message":"Bad credentials"},{"message":"again"}]}"#,
        )
        .unwrap_err();
        match err {
            QueryError::GraphQl { messages } => assert_eq!(messages, vec!["Bad credentials", "again"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_graphql_response("<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse(_)));
    }

    #[test]
    fn test_request_serializes_query_and_variables() {
        let request = QueryRequest::new("query { viewer { login } }")
            .with_variables(json!({ "first": 10 }));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["variables"]["first"], 10);
        assert!(value["query"].as_str().unwrap().contains("viewer"));
    }

    #[test]
    fn test_handle_debug_hides_authorization() {
        let client = GithubGraphqlClient::new("http://localhost:1/graphql").unwrap();
        let handle = GithubGraphqlHandle {
            endpoint: client.endpoint().to_string(),
            http: client.http.clone(),
            authorization: Some("token ghp_secret".to_string()),
        };
        let printed = format!("{handle:?}");
        assert!(!printed.contains("ghp_secret"));
        assert!(printed.contains("authenticated: true"));
    }
}
