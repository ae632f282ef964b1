//! Provider invocation.
//!
//! Providers are fetched strictly one after another in configuration order.
//! The first failure ends the chain; nothing after it runs.

use graph_store::{EntityStore, Provenance};
use tracing::{debug, instrument};

use crate::credential::CredentialScoper;
use crate::error::{SourceError, SourceResult};
use crate::fragments::FieldFragments;
use crate::metrics::METRICS;
use crate::obs;
use crate::provider::{ConfiguredProvider, FetchContext};
use crate::records::TypedRecordSet;
use crate::registry::{ApiTypes, TypeRegistry};

/// Records returned by one provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput {
    pub provenance: Provenance,
    pub records: TypedRecordSet,
}

/// Result of running every configured fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationOutcome {
    /// Outputs to aggregate, in configuration order
    pub outputs: Vec<ProviderOutput>,
    /// Providers whose fetch ran
    pub invoked: usize,
    /// Providers with no fetch capability
    pub skipped: usize,
    /// Providers that persisted their own results and returned nothing
    pub persisted_directly: usize,
}

/// Runs provider fetch steps against shared, read-only run state.
pub struct ProviderInvoker<'a> {
    scoper: &'a CredentialScoper,
    registry: &'a TypeRegistry,
    api_types: &'a ApiTypes,
    fragments: &'a FieldFragments,
    store: &'a dyn EntityStore,
}

impl<'a> ProviderInvoker<'a> {
    pub fn new(
        scoper: &'a CredentialScoper,
        registry: &'a TypeRegistry,
        api_types: &'a ApiTypes,
        fragments: &'a FieldFragments,
        store: &'a dyn EntityStore,
    ) -> Self {
        Self {
            scoper,
            registry,
            api_types,
            fragments,
            store,
        }
    }

    #[instrument(skip_all, fields(providers = providers.len()))]
    pub async fn invoke(&self, providers: &[ConfiguredProvider]) -> SourceResult<InvocationOutcome> {
        let mut outcome = InvocationOutcome::default();

        for configured in providers {
            let Some(fetcher) = configured.provider().fetcher() else {
                debug!(provider = %configured.name(), "no fetch capability");
                outcome.skipped += 1;
                continue;
            };

            let query = self.scoper.scope(configured.credential());
            let ctx = FetchContext {
                query: &query,
                registry: self.registry,
                api_types: self.api_types,
                fragments: self.fragments,
                options: configured.options(),
                store: self.store,
            };

            outcome.invoked += 1;
            METRICS.inc_providers_invoked();

            let fetched = match fetcher.fetch(ctx).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    obs::emit_provider_failed(configured.name(), &e);
                    return Err(SourceError::upstream(configured.name(), e));
                }
            };

            match fetched {
                Some(records) => {
                    let count = records.values().map(Vec::len).sum::<usize>();
                    obs::emit_provider_fetched(configured.name(), configured.key(), count);
                    outcome.outputs.push(ProviderOutput {
                        provenance: configured.provenance(),
                        records,
                    });
                }
                None => {
                    debug!(provider = %configured.name(), "provider persisted its own results");
                    outcome.persisted_directly += 1;
                }
            }
        }

        Ok(outcome)
    }
}
