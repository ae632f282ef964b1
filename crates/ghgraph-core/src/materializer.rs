//! Turns aggregated records into canonical entities.
//!
//! Only groups whose type name is one of the registry's resolved names are
//! materialized. Each record becomes one entity whose id is allocated by the
//! store from `"<type> >>> <external id>"`, so the same record always lands on
//! the same entity.

use std::collections::{BTreeMap, HashSet};

use graph_store::{EntityStore, NewEntity, NodeId};
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::error::SourceResult;
use crate::metrics::METRICS;
use crate::obs;
use crate::records::{AggregatedRecords, TaggedRecord};
use crate::registry::{Role, TypeRegistry};

/// Field holding the upstream id on every entity; used to link entities.
pub const LINK_FIELD: &str = "githubId";

/// Media type given to entities with markdown content.
pub const MARKDOWN_MEDIA_TYPE: &str = "text/markdown";

/// Field whose value becomes an entity's raw content.
pub const CONTENT_FIELD: &str = "body";

/// Composite identity key for a record.
pub fn composite_key(type_name: &str, external_id: &str) -> String {
    format!("{type_name} >>> {external_id}")
}

/// What one materialization pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    /// Distinct entities written, in first-submission order
    pub created: Vec<NodeId>,
    /// Unregistered type name → number of records dropped
    pub discarded_types: BTreeMap<String, usize>,
    /// Records without a usable id
    pub skipped_records: usize,
}

pub struct NodeMaterializer<'a> {
    store: &'a dyn EntityStore,
    registry: &'a TypeRegistry,
}

impl<'a> NodeMaterializer<'a> {
    pub fn new(store: &'a dyn EntityStore, registry: &'a TypeRegistry) -> Self {
        Self { store, registry }
    }

    #[instrument(skip_all, fields(records = aggregated.total()))]
    pub async fn materialize(&self, aggregated: AggregatedRecords) -> SourceResult<MaterializeReport> {
        let mut report = MaterializeReport::default();
        let mut seen = HashSet::new();

        for (type_name, group) in aggregated.groups {
            let Some(role) = self.registry.role_of(&type_name) else {
                obs::emit_type_discarded(&type_name, group.len());
                METRICS.inc_types_discarded();
                report.discarded_types.insert(type_name, group.len());
                continue;
            };

            for tagged in group {
                match self.build(role, &type_name, tagged)? {
                    Some(entity) => {
                        let id = self.store.submit(entity).await?;
                        // a later record with the same identity replaces the earlier one
                        if seen.insert(id.clone()) {
                            METRICS.inc_entities_created();
                            report.created.push(id);
                        }
                    }
                    None => report.skipped_records += 1,
                }
            }
        }

        Ok(report)
    }

    fn build(&self, role: Role, type_name: &str, tagged: TaggedRecord) -> SourceResult<Option<NewEntity>> {
        let TaggedRecord { record, provenance } = tagged;
        let Some(external_id) = record.external_id() else {
            warn!(
                type_name = %type_name,
                provider = %provenance.provider_name,
                "record has no usable id, skipped"
            );
            return Ok(None);
        };

        let mut fields = record.into_map();
        fields.insert(LINK_FIELD.to_string(), Value::String(external_id.clone()));

        let id = self.store.allocate_id(&composite_key(type_name, &external_id));
        let content_digest = self.store.hash_content(&Value::Object(fields.clone()))?;

        let (media_type, content) = if matches!(role, Role::Discussion | Role::Issue) {
            let body = fields
                .get(CONTENT_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string);
            (Some(MARKDOWN_MEDIA_TYPE.to_string()), body)
        } else {
            (None, None)
        };

        Ok(Some(NewEntity {
            id,
            type_name: type_name.to_string(),
            parent: None,
            children: Vec::new(),
            content_digest,
            content,
            media_type,
            fields,
            provenance: Some(provenance),
        }))
    }
}
