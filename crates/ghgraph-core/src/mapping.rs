//! Per-type record mapping.
//!
//! A [`MappingTable`] holds at most one transformation per type name. The
//! dispatcher replaces every record of a mapped type exactly once, in place;
//! group sizes and order never change.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::records::{AggregatedRecords, RawRecord};
use crate::registry::TypeRegistry;

/// A record transformation.
pub type MapFn = Arc<dyn Fn(RawRecord) -> SourceResult<RawRecord> + Send + Sync>;

/// Builds a run's mapping table from its resolved registry.
pub type MappingFactory = Arc<dyn Fn(&TypeRegistry) -> MappingTable + Send + Sync>;

/// Type name → transformation.
#[derive(Clone, Default)]
pub struct MappingTable {
    mappers: BTreeMap<String, MapFn>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the transformation for `type_name`.
    pub fn with<F>(mut self, type_name: impl Into<String>, map: F) -> Self
    where
        F: Fn(RawRecord) -> SourceResult<RawRecord> + Send + Sync + 'static,
    {
        self.mappers.insert(type_name.into(), Arc::new(map));
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&MapFn> {
        self.mappers.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.mappers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl std::fmt::Debug for MappingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}

/// Apply `table` to every mapped group of `aggregated`.
///
/// Returns the number of records transformed. The first failing
/// transformation aborts with a `Mapping` error naming the type.
pub fn apply_mappings(aggregated: &mut AggregatedRecords, table: &MappingTable) -> SourceResult<usize> {
    let mut mapped = 0;
    for (type_name, group) in aggregated.groups.iter_mut() {
        let Some(map) = table.get(type_name) else {
            continue;
        };
        for tagged in group.iter_mut() {
            let record = std::mem::take(&mut tagged.record);
            tagged.record = map(record).map_err(|e| SourceError::Mapping {
                type_name: type_name.clone(),
                detail: e.to_string(),
            })?;
            mapped += 1;
        }
        debug!(type_name = %type_name, count = group.len(), "mapped");
    }
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TaggedRecord;
    use graph_store::Provenance;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn aggregated(type_name: &str, ids: &[&str]) -> AggregatedRecords {
        let provenance = Provenance {
            provider_name: "p".to_string(),
            provider_key: None,
        };
        let mut aggregated = AggregatedRecords::default();
        aggregated.groups.insert(
            type_name.to_string(),
            ids.iter()
                .map(|id| TaggedRecord {
                    record: RawRecord::from_value(json!({ "id": id, "n": 1 })).unwrap(),
                    provenance: provenance.clone(),
                })
                .collect(),
        );
        aggregated
    }

    #[test]
    fn test_mapping_applies_exactly_once_preserving_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let table = MappingTable::new().with("GitHubUser", move |mut r: RawRecord| {
            counter.fetch_add(1, Ordering::SeqCst);
            let n = r.get("n").and_then(Value::as_i64).unwrap_or_default();
            r.insert("n", json!(n + 1));
            Ok(r)
        });

        let mut records = aggregated("GitHubUser", &["a", "b", "c"]);
        let mapped = apply_mappings(&mut records, &table).unwrap();

        assert_eq!(mapped, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let group = records.records("GitHubUser");
        let ids: Vec<_> = group.iter().filter_map(|r| r.external_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(group.iter().all(|r| r.get("n") == Some(&json!(2))));
    }

    #[test]
    fn test_unmapped_types_untouched() {
        let table = MappingTable::new().with("Other", |_| Ok(RawRecord::new()));
        let mut records = aggregated("GitHubUser", &["a"]);
        let before = records.clone();
        assert_eq!(apply_mappings(&mut records, &table).unwrap(), 0);
        assert_eq!(records, before);
    }

    #[test]
    fn test_mapping_error_names_type() {
        let table = MappingTable::new().with("GitHubUser", |_| {
            Err(SourceError::configuration("no login"))
        });
        let mut records = aggregated("GitHubUser", &["a"]);
        let err = apply_mappings(&mut records, &table).unwrap_err();
        match err {
            SourceError::Mapping { type_name, detail } => {
                assert_eq!(type_name, "GitHubUser");
                assert!(detail.contains("no login"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
