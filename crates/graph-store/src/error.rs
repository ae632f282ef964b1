//! Error types for graph-store

use thiserror::Error;

/// Errors that can occur in the collaborator layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Entity id not present in the store
    #[error("entity not found: {id}")]
    NotFound { id: String },

    /// Content digest string is not 64 lowercase hex characters
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// Value could not be canonicalised for hashing
    #[error("cannot canonicalise value: {0}")]
    Canonicalization(String),

    /// A type declaration was rejected
    #[error("invalid type declaration: {0}")]
    InvalidDeclaration(String),

    /// Remote file could not be derived
    #[error("failed to derive file from {url}: {detail}")]
    Derive { url: String, detail: String },

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
