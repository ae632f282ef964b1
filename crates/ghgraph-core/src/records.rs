//! Record shapes that flow between providers and the materializer.

use std::collections::BTreeMap;

use graph_store::Provenance;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying a record's upstream identifier.
pub const ID_FIELD: &str = "id";

/// One record as returned by a provider: an open field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// String view of a field.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// The upstream identifier, accepted as a non-empty string or a number.
    pub fn external_id(&self) -> Option<String> {
        match self.get(ID_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A provider's fetch result: type name → records in provider order.
pub type TypedRecordSet = BTreeMap<String, Vec<RawRecord>>;

/// A record together with the provider invocation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecord {
    pub record: RawRecord,
    pub provenance: Provenance,
}

/// Fan-in result: type name → tagged records, provider order then record order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedRecords {
    pub groups: BTreeMap<String, Vec<TaggedRecord>>,
}

impl AggregatedRecords {
    pub fn get(&self, type_name: &str) -> Option<&[TaggedRecord]> {
        self.groups.get(type_name).map(Vec::as_slice)
    }

    /// Records of one type, without provenance.
    pub fn records(&self, type_name: &str) -> Vec<&RawRecord> {
        self.get(type_name)
            .map(|group| group.iter().map(|t| &t.record).collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
