//! Post-creation enrichment.
//!
//! Every entity the store reports as created is handed, one at a time, to the
//! provider hooks in configuration order and then to the run's own hook.
//! Entities of registered types then get the built-in derived image fields.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use graph_store::{EntityEvents, EntityRecord, EntityStore, NodeId, RemoteFileDeriver};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{SourceError, SourceResult};
use crate::metrics::METRICS;
use crate::provider::{ConfiguredProvider, EntityCreatedHook, ProviderOptions};
use crate::registry::{Role, TypeRegistry};

/// Suffix appended to a source field to name its derived file field.
pub const OPTIMIZED_FIELD_SUFFIX: &str = "Optimized";

/// Hook name used in errors raised by the run's own hook.
pub const USER_HOOK_NAME: &str = "user";

pub fn optimized_field_name(source_field: &str) -> String {
    format!("{source_field}{OPTIMIZED_FIELD_SUFFIX}")
}

/// Switches for the built-in derived image fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentOptions {
    pub generate_optimized_avatar: bool,
    pub generate_optimized_og_image: bool,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            generate_optimized_avatar: true,
            generate_optimized_og_image: true,
        }
    }
}

/// A built-in derivation: for entities of `role`, derive a file from
/// `source_field` when `enabled` says so.
#[derive(Clone, Copy)]
pub struct BuiltInRule {
    pub role: Role,
    pub source_field: &'static str,
    pub enabled: fn(&EnrichmentOptions) -> bool,
}

fn avatar_enabled(options: &EnrichmentOptions) -> bool {
    options.generate_optimized_avatar
}

fn og_image_enabled(options: &EnrichmentOptions) -> bool {
    options.generate_optimized_og_image
}

pub const BUILT_IN_RULES: [BuiltInRule; 2] = [
    BuiltInRule {
        role: Role::User,
        source_field: "avatarUrl",
        enabled: avatar_enabled,
    },
    BuiltInRule {
        role: Role::Repository,
        source_field: "openGraphImageUrl",
        enabled: og_image_enabled,
    },
];

/// Whether `value` names a remote resource the deriver may fetch.
pub fn is_remote_url(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Derives file entities from URL-valued fields and links them back.
pub struct FileHelper {
    deriver: Arc<dyn RemoteFileDeriver>,
    store: Arc<dyn EntityStore>,
    derived: Mutex<HashSet<NodeId>>,
}

impl FileHelper {
    pub fn new(deriver: Arc<dyn RemoteFileDeriver>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            deriver,
            store,
            derived: Mutex::new(HashSet::new()),
        }
    }

    /// Derive a file from `entity.<source_field>` and attach its id under
    /// `field_name`, or under `source_field` itself when none is given.
    ///
    /// Fields that are missing, not strings, or not http(s) URLs derive
    /// nothing and return `Ok(None)`.
    pub async fn derive_from(
        &self,
        entity: &EntityRecord,
        source_field: &str,
        field_name: Option<&str>,
    ) -> SourceResult<Option<NodeId>> {
        let Some(url) = entity.field(source_field).and_then(Value::as_str) else {
            return Ok(None);
        };
        if !is_remote_url(url) {
            debug!(entity = %entity.id, field = source_field, "not a remote url, nothing derived");
            return Ok(None);
        }

        let Some(file_id) = self.deriver.derive(url, &entity.id).await? else {
            return Ok(None);
        };

        let name = field_name.unwrap_or(source_field);
        self.store
            .attach_field(&entity.id, name, Value::String(file_id.to_string()))
            .await?;

        if self.lock_derived().insert(file_id.clone()) {
            METRICS.inc_files_derived();
        }
        Ok(Some(file_id))
    }

    /// Distinct file entities derived so far.
    pub fn derived_count(&self) -> usize {
        self.lock_derived().len()
    }

    fn lock_derived(&self) -> MutexGuard<'_, HashSet<NodeId>> {
        self.derived.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a creation hook sees.
pub struct EnrichmentContext<'a> {
    /// Snapshot of the entity as it was when dispatch began
    pub entity: &'a EntityRecord,
    pub registry: &'a TypeRegistry,
    /// Whether the entity's type is one of the registry's resolved names
    pub is_internal_type: bool,
    pub files: &'a FileHelper,
    pub store: &'a dyn EntityStore,
    /// The hook owner's options
    pub options: &'a ProviderOptions,
}

impl EnrichmentContext<'_> {
    pub fn is_internal(&self, type_name: &str) -> bool {
        self.registry.is_internal_type(type_name)
    }
}

/// Dispatches creation events to hooks and built-in rules.
pub struct EnrichmentDispatcher<'a> {
    pub registry: &'a TypeRegistry,
    pub files: &'a FileHelper,
    pub store: &'a dyn EntityStore,
    pub providers: &'a [ConfiguredProvider],
    pub user_hook: Option<&'a dyn EntityCreatedHook>,
    pub user_options: &'a ProviderOptions,
    pub options: EnrichmentOptions,
}

impl EnrichmentDispatcher<'_> {
    /// Enrich one entity.
    pub async fn on_entity_created(&self, id: &NodeId) -> SourceResult<()> {
        let Some(entity) = self.store.get(id).await? else {
            warn!(entity = %id, "created entity not found in store");
            return Ok(());
        };
        let is_internal_type = self.registry.is_internal_type(&entity.type_name);

        for configured in self.providers {
            let Some(hook) = configured.provider().entity_hook() else {
                continue;
            };
            let ctx = self.context(&entity, is_internal_type, configured.options());
            hook.on_entity_created(&ctx)
                .await
                .map_err(|e| SourceError::hook(configured.name(), e))?;
        }

        if let Some(hook) = self.user_hook {
            let ctx = self.context(&entity, is_internal_type, self.user_options);
            hook.on_entity_created(&ctx)
                .await
                .map_err(|e| SourceError::hook(USER_HOOK_NAME, e))?;
        }

        if !is_internal_type {
            return Ok(());
        }

        for rule in BUILT_IN_RULES {
            if entity.type_name == self.registry.name(rule.role) && (rule.enabled)(&self.options) {
                let field = optimized_field_name(rule.source_field);
                self.files
                    .derive_from(&entity, rule.source_field, Some(&field))
                    .await?;
            }
        }
        Ok(())
    }

    /// Process creation events until none are pending, including events for
    /// entities created while enriching earlier ones. Each entity is enriched
    /// once, however many times it was submitted.
    #[instrument(skip_all)]
    pub async fn drain(&self, events: &mut EntityEvents) -> SourceResult<usize> {
        let mut enriched = HashSet::new();
        while let Ok(event) = events.try_recv() {
            if !enriched.insert(event.id.clone()) {
                debug!(entity = %event.id, "resubmitted entity already enriched");
                continue;
            }
            self.on_entity_created(&event.id).await?;
        }
        debug!(processed = enriched.len(), "enrichment drained");
        Ok(enriched.len())
    }

    fn context<'c>(
        &'c self,
        entity: &'c EntityRecord,
        is_internal_type: bool,
        options: &'c ProviderOptions,
    ) -> EnrichmentContext<'c> {
        EnrichmentContext {
            entity,
            registry: self.registry,
            is_internal_type,
            files: self.files,
            store: self.store,
            options,
        }
    }
}
