//! ghgraph-core: the aggregation engine
//!
//! Pulls record collections from pluggable providers, merges them by type and
//! turns them into identity-stable entities in an [`graph_store::EntityStore`],
//! then runs enrichment and schema extension over the result.
//!
//! ## Key Components
//!
//! - `registry`: role → type name resolution with caller overrides
//! - `credential` / `query`: per-provider authenticated query handles
//! - `provider`: the capability model and the provider catalog
//! - `invoker`, `aggregator`, `mapping`, `materializer`: the sourcing pipeline
//! - `enrichment`, `schema`: post-creation hooks and type declarations
//! - `multi_filter`: concurrent fetch-and-merge over exclusive filters
//! - `engine`: [`SourceEngine`], which runs all of the above

pub mod aggregator;
pub mod config;
pub mod credential;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod fragments;
pub mod invoker;
pub mod mapping;
pub mod materializer;
pub mod metrics;
pub mod multi_filter;
pub mod obs;
pub mod provider;
pub mod query;
pub mod records;
pub mod registry;
pub mod schema;
pub mod telemetry;

pub use config::{ProviderConfig, SourceConfig};
pub use credential::{Credential, CredentialScoper, ScopedQuery};
pub use engine::{Collaborators, RunHooks, RunReport, SourceEngine};
pub use enrichment::{EnrichmentContext, EnrichmentOptions, FileHelper};
pub use error::{SourceError, SourceResult};
pub use fragments::FieldFragments;
pub use mapping::{MapFn, MappingFactory, MappingTable};
pub use multi_filter::{
    CategoryFilter, FetchOrder, FilterSet, FilteredFetch, MultiFilterFetcher, OrderDirection,
    OrderField,
};
pub use provider::{
    ConfiguredProvider, EntityCreatedHook, FetchCapability, FetchContext, Provider,
    ProviderCatalog, ProviderOptions, SchemaExtension,
};
pub use query::{GithubGraphqlClient, QueryClient, QueryError, QueryHandle, QueryRequest};
pub use records::{AggregatedRecords, RawRecord, TaggedRecord, TypedRecordSet};
pub use registry::{ApiTypes, Role, TypeEntry, TypeRegistry, TypeTable};
pub use schema::SchemaContext;
