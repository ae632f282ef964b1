//! Credential scoping.
//!
//! Each provider gets a [`ScopedQuery`] authenticated with its own credential,
//! or the run default when it has none. The secret lives inside the query
//! handle; the options forwarded to providers have no credential field at all.

use std::sync::Arc;

use serde::Deserialize;

use crate::query::{QueryClient, QueryError, QueryHandle, QueryRequest};

/// An API secret. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for [`QueryClient`] implementations only.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// A query capability bound to one provider's effective credential.
#[derive(Clone)]
pub struct ScopedQuery {
    handle: Arc<dyn QueryHandle>,
    authenticated: bool,
}

impl ScopedQuery {
    pub fn new(handle: Arc<dyn QueryHandle>, authenticated: bool) -> Self {
        Self {
            handle,
            authenticated,
        }
    }

    pub async fn query(&self, request: QueryRequest) -> Result<serde_json::Value, QueryError> {
        self.handle.query(request).await
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

impl std::fmt::Debug for ScopedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedQuery")
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

/// Builds per-provider query capabilities.
pub struct CredentialScoper {
    client: Arc<dyn QueryClient>,
    default_credential: Option<Credential>,
}

impl CredentialScoper {
    pub fn new(client: Arc<dyn QueryClient>, default_credential: Option<Credential>) -> Self {
        Self {
            client,
            default_credential,
        }
    }

    /// Provider credential, else the run default, else none.
    pub fn effective<'a>(&'a self, provider: Option<&'a Credential>) -> Option<&'a Credential> {
        provider.or(self.default_credential.as_ref())
    }

    pub fn scope(&self, provider: Option<&Credential>) -> ScopedQuery {
        let credential = self.effective(provider);
        ScopedQuery::new(self.client.authenticate(credential), credential.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Echoes back which secret the handle was built with.
    struct EchoClient;

    struct EchoHandle(Option<String>);

    #[async_trait]
    impl QueryHandle for EchoHandle {
        async fn query(&self, _request: QueryRequest) -> Result<serde_json::Value, QueryError> {
            Ok(json!({ "secret": self.0 }))
        }
    }

    impl QueryClient for EchoClient {
        fn authenticate(&self, credential: Option<&Credential>) -> Arc<dyn QueryHandle> {
            Arc::new(EchoHandle(credential.map(|c| c.expose_secret().to_string())))
        }
    }

    async fn secret_seen(scoper: &CredentialScoper, provider: Option<&Credential>) -> serde_json::Value {
        scoper
            .scope(provider)
            .query(QueryRequest::new("{ viewer { login } }"))
            .await
            .unwrap()["secret"]
            .clone()
    }

    #[tokio::test]
    async fn test_provider_credential_wins() {
        let scoper = CredentialScoper::new(Arc::new(EchoClient), Some(Credential::new("run")));
        let own = Credential::new("own");
        assert_eq!(secret_seen(&scoper, Some(&own)).await, json!("own"));
    }

    #[tokio::test]
    async fn test_falls_back_to_run_default() {
        let scoper = CredentialScoper::new(Arc::new(EchoClient), Some(Credential::new("run")));
        assert_eq!(secret_seen(&scoper, None).await, json!("run"));
        assert!(scoper.scope(None).is_authenticated());
    }

    #[tokio::test]
    async fn test_no_credential_at_all() {
        let scoper = CredentialScoper::new(Arc::new(EchoClient), None);
        assert_eq!(secret_seen(&scoper, None).await, serde_json::Value::Null);
        assert!(!scoper.scope(None).is_authenticated());
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let credential = Credential::new("ghp_topsecret");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        let scoper = CredentialScoper::new(Arc::new(EchoClient), Some(credential));
        assert!(!format!("{:?}", scoper.scope(None)).contains("ghp_topsecret"));
    }
}
