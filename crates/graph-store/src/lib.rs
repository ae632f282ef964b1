//! Graph-Store: collaborator layer for ghgraph
//!
//! This crate defines the boundary between the sourcing engine and the
//! systems that actually persist entities, accept type declarations and
//! download remote files.
//!
//! ## Key Components
//!
//! - `EntityStore`: id allocation, content hashing, entity persistence and
//!   creation notifications
//! - `SchemaDeclarator`: additive type-definition statements
//! - `RemoteFileDeriver`: turns a remote URL into a file entity
//! - `memory`: in-memory implementations used by the CLI and by tests

pub mod digest;
mod error;
pub mod memory;
pub mod storage_traits;

pub use digest::{canonical_json, ContentDigest};
pub use error::StoreError;
pub use memory::{MemoryEntityStore, MemorySchemaDeclarator, StoreFileDeriver, FILE_TYPE};
pub use storage_traits::{
    EntityCreated, EntityEvents, EntityRecord, EntityStore, NewEntity, NodeId, Provenance,
    RemoteFileDeriver, SchemaDeclarator, StorageResult,
};
