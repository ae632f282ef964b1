//! Collaborator trait definitions for ghgraph
//!
//! These traits define the interfaces the sourcing engine consumes:
//! - `EntityStore`: id allocation, hashing, persistence, creation events
//! - `SchemaDeclarator`: additive type declarations
//! - `RemoteFileDeriver`: remote URL to file entity
//!
//! All traits are backend-agnostic. In-memory implementations are provided
//! in the `memory` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::digest::ContentDigest;
use crate::error::StoreError;

/// Result type for collaborator operations
pub type StorageResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Canonical entity identifier allocated by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which configured provider produced a record.
///
/// Kept beside the entity's fields; never part of its identity or digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Configured provider name
    pub provider_name: String,
    /// Optional per-invocation key, distinguishing two configurations of the
    /// same provider
    pub provider_key: Option<String>,
}

/// An entity ready to be submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub id: NodeId,
    pub type_name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub content_digest: ContentDigest,
    /// Raw content for downstream transformers (e.g. markdown bodies)
    pub content: Option<String>,
    pub media_type: Option<String>,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub provenance: Option<Provenance>,
}

/// A stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: NodeId,
    pub type_name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub content_digest: ContentDigest,
    pub content: Option<String>,
    pub media_type: Option<String>,
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// Fields attached after creation by enrichment
    pub derived_fields: BTreeMap<String, serde_json::Value>,
    pub provenance: Option<Provenance>,
    pub created_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn from_new(entity: NewEntity) -> Self {
        Self {
            id: entity.id,
            type_name: entity.type_name,
            parent: entity.parent,
            children: entity.children,
            content_digest: entity.content_digest,
            content: entity.content,
            media_type: entity.media_type,
            fields: entity.fields,
            derived_fields: BTreeMap::new(),
            provenance: entity.provenance,
            created_at: Utc::now(),
        }
    }

    /// Look up a field on the entity.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Notification published for every entity submitted to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCreated {
    pub id: NodeId,
    pub type_name: String,
}

/// Receiving side of a store's creation notifications.
pub type EntityEvents = mpsc::UnboundedReceiver<EntityCreated>;

/// Entity persistence.
///
/// Guarantees:
/// - `allocate_id(key)` is deterministic: the same key always yields the same
///   id, distinct keys yield distinct ids.
/// - `hash_content(value)` is independent of object key order.
/// - Every successful `submit` publishes exactly one `EntityCreated` to each
///   subscriber, in submission order. Re-submitting an id replaces the entity.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Allocate the canonical id for a composite key.
    fn allocate_id(&self, key: &str) -> NodeId;

    /// Digest the given value.
    fn hash_content(&self, value: &serde_json::Value) -> StorageResult<ContentDigest>;

    /// Persist an entity and notify subscribers.
    async fn submit(&self, entity: NewEntity) -> StorageResult<NodeId>;

    /// Fetch an entity by id.
    async fn get(&self, id: &NodeId) -> StorageResult<Option<EntityRecord>>;

    /// All entities of a type, in submission order.
    async fn list_by_type(&self, type_name: &str) -> StorageResult<Vec<EntityRecord>>;

    /// Attach a named derived field to an existing entity.
    async fn attach_field(
        &self,
        id: &NodeId,
        name: &str,
        value: serde_json::Value,
    ) -> StorageResult<()>;

    /// Subscribe to creation notifications from this point on.
    fn subscribe(&self) -> EntityEvents;
}

// ---------------------------------------------------------------------------
// Schema declarations
// ---------------------------------------------------------------------------

/// Accepts additive type-extension statements.
///
/// Merging repeated declarations for one type is the implementation's policy.
#[async_trait]
pub trait SchemaDeclarator: Send + Sync {
    async fn declare(&self, type_defs: &str) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// Remote files
// ---------------------------------------------------------------------------

/// Derives a file entity from a remote URL.
///
/// Returns `Ok(None)` when the deriver declines the URL.
#[async_trait]
pub trait RemoteFileDeriver: Send + Sync {
    async fn derive(&self, url: &str, parent: &NodeId) -> StorageResult<Option<NodeId>>;
}
