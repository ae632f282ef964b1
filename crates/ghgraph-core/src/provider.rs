//! Provider model.
//!
//! A provider is a named unit exposing any subset of three capabilities:
//! fetching records, reacting to entity creation, and extending the schema.
//! The engine checks for each capability explicitly through the accessor
//! methods on [`Provider`]; an absent capability is simply skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use graph_store::{EntityStore, Provenance};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::ProviderConfig;
use crate::credential::{Credential, ScopedQuery};
use crate::enrichment::EnrichmentContext;
use crate::error::{SourceError, SourceResult};
use crate::fragments::FieldFragments;
use crate::records::TypedRecordSet;
use crate::registry::{ApiTypes, TypeRegistry};
use crate::schema::SchemaContext;

/// Options forwarded to a provider. Credentials are never part of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProviderOptions(Map<String, Value>);

impl ProviderOptions {
    pub fn new(options: Map<String, Value>) -> Self {
        Self(options)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize the options into a provider's own typed options.
    pub fn parse<T: DeserializeOwned>(&self) -> SourceResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| SourceError::configuration(format!("invalid provider options: {e}")))
    }
}

/// Everything a provider's fetch step may use.
pub struct FetchContext<'a> {
    /// Query capability bound to this provider's effective credential
    pub query: &'a ScopedQuery,
    pub registry: &'a TypeRegistry,
    pub api_types: &'a ApiTypes,
    pub fragments: &'a FieldFragments,
    pub options: &'a ProviderOptions,
    /// For providers that persist entities themselves and return `None`
    pub store: &'a dyn EntityStore,
}

/// Fetch records from upstream.
#[async_trait]
pub trait FetchCapability: Send + Sync {
    /// `Ok(None)` means the provider persisted its results itself.
    async fn fetch(&self, ctx: FetchContext<'_>) -> SourceResult<Option<TypedRecordSet>>;
}

/// React to a newly created entity.
#[async_trait]
pub trait EntityCreatedHook: Send + Sync {
    async fn on_entity_created(&self, ctx: &EnrichmentContext<'_>) -> SourceResult<()>;
}

/// Declare additional types or fields.
#[async_trait]
pub trait SchemaExtension: Send + Sync {
    async fn extend_schema(&self, ctx: &SchemaContext<'_>) -> SourceResult<()>;
}

/// A pluggable data provider.
pub trait Provider: Send + Sync {
    /// Name used to select this provider in configuration.
    fn name(&self) -> &str;

    fn fetcher(&self) -> Option<&dyn FetchCapability> {
        None
    }

    fn entity_hook(&self) -> Option<&dyn EntityCreatedHook> {
        None
    }

    fn schema_extension(&self) -> Option<&dyn SchemaExtension> {
        None
    }
}

/// One configured invocation of a provider.
#[derive(Clone)]
pub struct ConfiguredProvider {
    provider: Arc<dyn Provider>,
    key: Option<String>,
    options: ProviderOptions,
    credential: Option<Credential>,
}

impl ConfiguredProvider {
    pub fn new(
        provider: Arc<dyn Provider>,
        key: Option<String>,
        options: ProviderOptions,
        credential: Option<Credential>,
    ) -> Self {
        Self {
            provider,
            key,
            options,
            credential,
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub(crate) fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn provenance(&self) -> Provenance {
        Provenance {
            provider_name: self.name().to_string(),
            provider_key: self.key.clone(),
        }
    }
}

impl std::fmt::Debug for ConfiguredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredProvider")
            .field("name", &self.name())
            .field("key", &self.key)
            .field("options", &self.options)
            .field("has_credential", &self.credential.is_some())
            .finish()
    }
}

/// Registry of available provider implementations, by name.
#[derive(Default, Clone)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation. A later registration under the same name
    /// replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Bind each configuration entry to its implementation, in order.
    pub fn resolve(&self, configs: &[ProviderConfig]) -> SourceResult<Vec<ConfiguredProvider>> {
        configs
            .iter()
            .map(|config| {
                let provider = self.get(&config.name).ok_or_else(|| {
                    SourceError::configuration(format!("unknown provider '{}'", config.name))
                })?;
                Ok(ConfiguredProvider::new(
                    provider,
                    config.key.clone(),
                    ProviderOptions::new(config.options.clone()),
                    config.credential.clone(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Named(&'static str);

    impl Provider for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn config(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            key: None,
            credential: None,
            options: Map::new(),
        }
    }

    #[test]
    fn test_capabilities_default_to_absent() {
        let p = Named("bare");
        assert!(p.fetcher().is_none());
        assert!(p.entity_hook().is_none());
        assert!(p.schema_extension().is_none());
    }

    #[test]
    fn test_resolve_keeps_configuration_order() {
        let catalog = ProviderCatalog::new()
            .with(Arc::new(Named("b")))
            .with(Arc::new(Named("a")));
        let resolved = catalog
            .resolve(&[config("b"), config("a"), config("b")])
            .unwrap();
        let names: Vec<_> = resolved.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_resolve_unknown_provider_is_configuration_error() {
        let catalog = ProviderCatalog::new().with(Arc::new(Named("a")));
        let err = catalog.resolve(&[config("missing")]).unwrap_err();
        assert!(matches!(err, SourceError::Configuration(msg) if msg.contains("missing")));
    }

    #[test]
    fn test_parse_typed_options() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Opts {
            owner: String,
            max_count: Option<u32>,
        }
        let options = ProviderOptions::new(
            json!({ "owner": "octo", "maxCount": 5 }).as_object().unwrap().clone(),
        );
        let parsed: Opts = options.parse().unwrap();
        assert_eq!(parsed.owner, "octo");
        assert_eq!(parsed.max_count, Some(5));

        let bad = ProviderOptions::new(json!({ "maxCount": 5 }).as_object().unwrap().clone());
        assert!(matches!(bad.parse::<Opts>(), Err(SourceError::Configuration(_))));
    }

    #[test]
    fn test_debug_hides_credential() {
        let configured = ConfiguredProvider::new(
            Arc::new(Named("a")),
            Some("k".to_string()),
            ProviderOptions::default(),
            Some(Credential::new("ghp_hidden")),
        );
        let printed = format!("{configured:?}");
        assert!(!printed.contains("ghp_hidden"));
        assert!(printed.contains("has_credential: true"));
        assert_eq!(
            configured.provenance(),
            Provenance {
                provider_name: "a".to_string(),
                provider_key: Some("k".to_string()),
            }
        );
    }
}
