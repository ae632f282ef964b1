//! ghgraph-discussions: repository discussions as graph entities
//!
//! A [`ghgraph_core::Provider`] that pages through a repository's
//! discussions, optionally once per category, and emits discussions, labels,
//! authors and categories as linked record groups.

pub mod options;
pub mod provider;
pub mod queries;

pub use options::DiscussionsOptions;
pub use provider::{DiscussionsProvider, PROVIDER_NAME};
