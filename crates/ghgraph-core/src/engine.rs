//! The sourcing engine.
//!
//! [`SourceEngine`] owns everything a run shares read-only: the resolved
//! registries, the field fragments, the configured providers and the
//! credential scoper. A run extends the schema, then sources:
//!
//! 1. subscribe to the store's creation events
//! 2. invoke providers in configuration order
//! 3. aggregate their records by type
//! 4. apply the run's mappings
//! 5. materialize registered types
//! 6. drain enrichment until no creation events remain
//!
//! The first error ends the run; nothing is rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use graph_store::{EntityStore, RemoteFileDeriver, SchemaDeclarator};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::config::SourceConfig;
use crate::credential::CredentialScoper;
use crate::enrichment::{EnrichmentDispatcher, EnrichmentOptions, FileHelper};
use crate::error::SourceResult;
use crate::fragments::FieldFragments;
use crate::invoker::ProviderInvoker;
use crate::mapping::{apply_mappings, MappingFactory};
use crate::materializer::NodeMaterializer;
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};
use crate::provider::{ConfiguredProvider, EntityCreatedHook, ProviderCatalog, ProviderOptions, SchemaExtension};
use crate::query::QueryClient;
use crate::registry::{ApiTypes, TypeRegistry};
use crate::schema::SchemaExtensionMerger;

/// Hooks supplied by whoever runs the engine.
#[derive(Clone, Default)]
pub struct RunHooks {
    /// Builds the run's mapping table from the resolved registry
    pub mappings: Option<MappingFactory>,
    pub on_entity_created: Option<Arc<dyn EntityCreatedHook>>,
    pub extend_schema: Option<Arc<dyn SchemaExtension>>,
}

/// External systems the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn EntityStore>,
    pub declarator: Arc<dyn SchemaDeclarator>,
    pub files: Arc<dyn RemoteFileDeriver>,
    pub query_client: Arc<dyn QueryClient>,
}

/// Summary of one sourcing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub providers_invoked: usize,
    /// Providers without a fetch capability
    pub providers_skipped: usize,
    pub providers_persisted_directly: usize,
    pub records_aggregated: usize,
    pub records_mapped: usize,
    pub entities_created: usize,
    /// Records dropped for lacking a usable id
    pub records_skipped: usize,
    /// Unregistered type name → records dropped
    pub discarded_types: BTreeMap<String, usize>,
    /// Creation events processed by enrichment
    pub entities_enriched: usize,
    pub derived_files: usize,
    pub duration_ms: u64,
}

pub struct SourceEngine {
    registry: TypeRegistry,
    api_types: ApiTypes,
    fragments: FieldFragments,
    providers: Vec<ConfiguredProvider>,
    scoper: CredentialScoper,
    enrichment: EnrichmentOptions,
    hook_options: ProviderOptions,
    hooks: RunHooks,
    collaborators: Collaborators,
}

impl SourceEngine {
    /// Validate the configuration, bind providers and resolve the registries.
    pub fn new(
        config: &SourceConfig,
        catalog: &ProviderCatalog,
        hooks: RunHooks,
        collaborators: Collaborators,
    ) -> SourceResult<Self> {
        config.validate()?;
        let providers = catalog.resolve(&config.providers)?;
        let scoper = CredentialScoper::new(
            Arc::clone(&collaborators.query_client),
            config.credential.clone(),
        );

        Ok(Self {
            registry: TypeRegistry::resolve(config.type_registry_override.as_ref()),
            api_types: ApiTypes::resolve(config.api_types_override.as_ref()),
            fragments: FieldFragments::standard(),
            providers,
            scoper,
            enrichment: config.enrichment_options(),
            hook_options: config.hook_options(),
            hooks,
            collaborators,
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn api_types(&self) -> &ApiTypes {
        &self.api_types
    }

    pub fn providers(&self) -> &[ConfiguredProvider] {
        &self.providers
    }

    /// Schema extension followed by sourcing, under one run id.
    pub async fn run(&self) -> SourceResult<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::new(&run_id);
        let started = Instant::now();
        obs::emit_run_started(&run_id, self.providers.len());

        let result = span
            .instrument(async {
                self.extend_schema().await?;
                self.source_phases().await
            })
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        METRICS.flush();
        match result {
            Ok(mut report) => {
                report.run_id = run_id.clone();
                report.duration_ms = duration_ms;
                obs::emit_run_finished(&run_id, duration_ms, report.entities_created, true);
                Ok(report)
            }
            Err(e) => {
                obs::emit_run_failed(&run_id, &e);
                obs::emit_run_finished(&run_id, duration_ms, 0, false);
                Err(e)
            }
        }
    }

    /// Submit every schema declaration for this run.
    pub async fn extend_schema(&self) -> SourceResult<()> {
        SchemaExtensionMerger {
            declarator: self.collaborators.declarator.as_ref(),
            registry: &self.registry,
            providers: &self.providers,
            user_hook: self.hooks.extend_schema.as_deref(),
            user_options: &self.hook_options,
            options: self.enrichment,
        }
        .extend()
        .await
    }

    /// Fetch, merge, materialize and enrich, without touching the schema.
    pub async fn source(&self) -> SourceResult<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut report = RunSpan::new(&run_id)
            .instrument(self.source_phases())
            .await?;
        report.run_id = run_id;
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    async fn source_phases(&self) -> SourceResult<RunReport> {
        let store = self.collaborators.store.as_ref();
        let mut events = store.subscribe();

        let outcome = ProviderInvoker::new(
            &self.scoper,
            &self.registry,
            &self.api_types,
            &self.fragments,
            store,
        )
        .invoke(&self.providers)
        .await?;

        let mut report = RunReport {
            providers_invoked: outcome.invoked,
            providers_skipped: outcome.skipped,
            providers_persisted_directly: outcome.persisted_directly,
            ..RunReport::default()
        };

        let mut aggregated = aggregate(outcome.outputs);
        report.records_aggregated = aggregated.total();

        if let Some(factory) = &self.hooks.mappings {
            let table = factory(&self.registry);
            report.records_mapped = apply_mappings(&mut aggregated, &table)?;
        }

        let materialized = NodeMaterializer::new(store, &self.registry)
            .materialize(aggregated)
            .await?;
        report.entities_created = materialized.created.len();
        report.records_skipped = materialized.skipped_records;
        report.discarded_types = materialized.discarded_types;

        let files = FileHelper::new(
            Arc::clone(&self.collaborators.files),
            Arc::clone(&self.collaborators.store),
        );
        let dispatcher = EnrichmentDispatcher {
            registry: &self.registry,
            files: &files,
            store,
            providers: &self.providers,
            user_hook: self.hooks.on_entity_created.as_deref(),
            user_options: &self.hook_options,
            options: self.enrichment,
        };
        report.entities_enriched = dispatcher.drain(&mut events).await?;
        report.derived_files = files.derived_count();

        info!(
            entities = report.entities_created,
            enriched = report.entities_enriched,
            derived_files = report.derived_files,
            "sourcing complete"
        );
        Ok(report)
    }
}
