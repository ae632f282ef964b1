//! Error taxonomy for a sourcing run.
//!
//! Every variant except `Configuration` is raised while a run is in progress
//! and aborts the remainder of it. Unrecognised record types are not errors:
//! the materializer drops them and reports them in its summary.

use graph_store::StoreError;

use crate::query::QueryError;

/// Sourcing errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Malformed options, detected before the run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    /// A provider's fetch step failed. Providers after it were not invoked.
    #[error("fetch failed for provider '{provider}': {source}")]
    UpstreamFetch {
        provider: String,
        #[source]
        source: Box<SourceError>,
    },

    /// A caller-supplied mapping function failed.
    #[error("mapping failed for type {type_name}: {detail}")]
    Mapping { type_name: String, detail: String },

    /// A provider or end-user hook failed.
    #[error("hook '{hook}' failed: {source}")]
    Hook {
        hook: String,
        #[source]
        source: Box<SourceError>,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn configuration(detail: impl Into<String>) -> Self {
        SourceError::Configuration(detail.into())
    }

    /// Wrap an error raised inside a provider's fetch step.
    pub fn upstream(provider: &str, source: SourceError) -> Self {
        SourceError::UpstreamFetch {
            provider: provider.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap an error raised inside an enrichment or schema hook.
    pub fn hook(hook: &str, source: SourceError) -> Self {
        SourceError::Hook {
            hook: hook.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result type for sourcing operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;
