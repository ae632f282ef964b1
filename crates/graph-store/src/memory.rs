//! In-memory collaborators
//!
//! Provides `MemoryEntityStore`, `MemorySchemaDeclarator` and
//! `StoreFileDeriver` that satisfy the trait contracts without any external
//! service. The CLI runs against these and snapshots the result.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use graphql_parser::schema::{
    parse_schema, Definition, Directive, Field, InputValue, Type, TypeDefinition, TypeExtension,
    Value,
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::digest::ContentDigest;
use crate::error::StoreError;
use crate::storage_traits::*;

/// Type name of entities produced by [`StoreFileDeriver`].
pub const FILE_TYPE: &str = "File";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryEntityStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    entities: Vec<EntityRecord>,
    index: HashMap<NodeId, usize>,
    subscribers: Vec<mpsc::UnboundedSender<EntityCreated>>,
}

/// In-memory entity store.
///
/// Ids are UUIDv5 over a fixed namespace, so the same composite key maps to
/// the same id across processes and runs.
#[derive(Debug)]
pub struct MemoryEntityStore {
    namespace: Uuid,
    state: Mutex<StoreState>,
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::with_namespace(Uuid::new_v5(&Uuid::NAMESPACE_URL, b"https://ghgraph.dev/nodes"))
    }

    /// Use a caller-chosen id namespace (e.g. one per site).
    pub fn with_namespace(namespace: Uuid) -> Self {
        Self {
            namespace,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// All entities in submission order.
    pub fn snapshot(&self) -> Vec<EntityRecord> {
        lock(&self.state).entities.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    fn allocate_id(&self, key: &str) -> NodeId {
        NodeId(Uuid::new_v5(&self.namespace, key.as_bytes()).to_string())
    }

    fn hash_content(&self, value: &serde_json::Value) -> StorageResult<ContentDigest> {
        ContentDigest::of_json(value)
    }

    async fn submit(&self, entity: NewEntity) -> StorageResult<NodeId> {
        let record = EntityRecord::from_new(entity);
        let event = EntityCreated {
            id: record.id.clone(),
            type_name: record.type_name.clone(),
        };

        let mut state = lock(&self.state);
        let existing = state.index.get(&record.id).copied();
        match existing {
            Some(pos) => {
                debug!(id = %record.id, type_name = %record.type_name, "replacing entity");
                state.entities[pos] = record;
            }
            None => {
                let pos = state.entities.len();
                state.index.insert(record.id.clone(), pos);
                state.entities.push(record);
            }
        }
        // Dropped receivers are pruned on the next send.
        state
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        Ok(event.id)
    }

    async fn get(&self, id: &NodeId) -> StorageResult<Option<EntityRecord>> {
        let state = lock(&self.state);
        Ok(state.index.get(id).map(|&pos| state.entities[pos].clone()))
    }

    async fn list_by_type(&self, type_name: &str) -> StorageResult<Vec<EntityRecord>> {
        let state = lock(&self.state);
        Ok(state
            .entities
            .iter()
            .filter(|e| e.type_name == type_name)
            .cloned()
            .collect())
    }

    async fn attach_field(
        &self,
        id: &NodeId,
        name: &str,
        value: serde_json::Value,
    ) -> StorageResult<()> {
        let mut state = lock(&self.state);
        let pos = *state
            .index
            .get(id)
            .ok_or_else(|| StoreError::NotFound { id: id.0.clone() })?;
        state.entities[pos]
            .derived_fields
            .insert(name.to_string(), value);
        Ok(())
    }

    fn subscribe(&self) -> EntityEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).subscribers.push(tx);
        rx
    }
}

// ---------------------------------------------------------------------------
// MemorySchemaDeclarator
// ---------------------------------------------------------------------------

/// The fields one declaration contributes to a named type.
///
/// Object, interface and input object definitions and their extensions yield
/// a block. Other definitions (enums, unions, scalars, directives) are kept
/// only as raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBlock {
    pub type_name: String,
    /// `(field name, normalized field line)` in declaration order
    pub fields: Vec<(String, String)>,
}

/// In-memory schema declarator.
///
/// Policy: declarations are kept in submission order. [`merged_fields`]
/// folds them into one field table per type where a later declaration of the
/// same field replaces the earlier one and distinct fields are unioned.
///
/// [`merged_fields`]: MemorySchemaDeclarator::merged_fields
#[derive(Debug, Default)]
pub struct MemorySchemaDeclarator {
    declarations: Mutex<Vec<(String, Vec<TypeBlock>)>>,
}

impl MemorySchemaDeclarator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw declarations in submission order.
    pub fn declarations(&self) -> Vec<String> {
        lock(&self.declarations)
            .iter()
            .map(|(raw, _)| raw.clone())
            .collect()
    }

    /// Type name → field name → field line, later declarations winning.
    pub fn merged_fields(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut merged: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (_, blocks) in lock(&self.declarations).iter() {
            for block in blocks {
                let fields = merged.entry(block.type_name.clone()).or_default();
                for (name, line) in &block.fields {
                    fields.insert(name.clone(), line.clone());
                }
            }
        }
        merged
    }
}

#[async_trait]
impl SchemaDeclarator for MemorySchemaDeclarator {
    async fn declare(&self, type_defs: &str) -> StorageResult<()> {
        let blocks = parse_type_blocks(type_defs)?;
        debug!(types = blocks.len(), "type declarations accepted");
        lock(&self.declarations).push((type_defs.to_string(), blocks));
        Ok(())
    }
}

/// Parse a schema document into the field blocks it declares.
///
/// Fails on SDL syntax errors and on documents with no definitions.
pub fn parse_type_blocks(defs: &str) -> StorageResult<Vec<TypeBlock>> {
    let document = parse_schema::<String>(defs)
        .map_err(|e| StoreError::InvalidDeclaration(e.to_string()))?;
    if document.definitions.is_empty() {
        return Err(StoreError::InvalidDeclaration(
            "no definitions found".to_string(),
        ));
    }

    let blocks = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::TypeDefinition(TypeDefinition::Object(o)) => {
                Some(object_block(&o.name, &o.fields))
            }
            Definition::TypeDefinition(TypeDefinition::Interface(i)) => {
                Some(object_block(&i.name, &i.fields))
            }
            Definition::TypeDefinition(TypeDefinition::InputObject(i)) => {
                Some(input_block(&i.name, &i.fields))
            }
            Definition::TypeExtension(TypeExtension::Object(o)) => {
                Some(object_block(&o.name, &o.fields))
            }
            Definition::TypeExtension(TypeExtension::Interface(i)) => {
                Some(object_block(&i.name, &i.fields))
            }
            Definition::TypeExtension(TypeExtension::InputObject(i)) => {
                Some(input_block(&i.name, &i.fields))
            }
            _ => None,
        })
        .collect();
    Ok(blocks)
}

fn object_block(type_name: &str, fields: &[Field<'_, String>]) -> TypeBlock {
    TypeBlock {
        type_name: type_name.to_string(),
        fields: fields
            .iter()
            .map(|field| (field.name.clone(), field_line(field)))
            .collect(),
    }
}

fn input_block(type_name: &str, fields: &[InputValue<'_, String>]) -> TypeBlock {
    TypeBlock {
        type_name: type_name.to_string(),
        fields: fields
            .iter()
            .map(|field| (field.name.clone(), input_line(field)))
            .collect(),
    }
}

/// `name(arg: Type = default): Type @directive(arg: value)`
fn field_line(field: &Field<'_, String>) -> String {
    let mut line = field.name.clone();
    if !field.arguments.is_empty() {
        let args: Vec<_> = field.arguments.iter().map(input_line).collect();
        line.push_str(&format!("({})", args.join(", ")));
    }
    line.push_str(": ");
    line.push_str(&type_ref(&field.field_type));
    push_directives(&mut line, &field.directives);
    line
}

fn input_line(input: &InputValue<'_, String>) -> String {
    let mut line = format!("{}: {}", input.name, type_ref(&input.value_type));
    if let Some(default) = &input.default_value {
        line.push_str(" = ");
        line.push_str(&value_text(default));
    }
    push_directives(&mut line, &input.directives);
    line
}

fn push_directives(line: &mut String, directives: &[Directive<'_, String>]) {
    for directive in directives {
        line.push_str(" @");
        line.push_str(&directive.name);
        if !directive.arguments.is_empty() {
            let args: Vec<_> = directive
                .arguments
                .iter()
                .map(|(name, value)| format!("{name}: {}", value_text(value)))
                .collect();
            line.push_str(&format!("({})", args.join(", ")));
        }
    }
}

fn type_ref(ty: &Type<'_, String>) -> String {
    match ty {
        Type::NamedType(name) => name.clone(),
        Type::ListType(inner) => format!("[{}]", type_ref(inner)),
        Type::NonNullType(inner) => format!("{}!", type_ref(inner)),
    }
}

fn value_text(value: &Value<'_, String>) -> String {
    match value {
        Value::Variable(name) => format!("${name}"),
        Value::Int(n) => n.as_i64().map_or_else(|| "0".to_string(), |n| n.to_string()),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Boolean(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Enum(name) => name.clone(),
        Value::List(items) => {
            let items: Vec<_> = items.iter().map(value_text).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(entries) => {
            let entries: Vec<_> = entries
                .iter()
                .map(|(key, value)| format!("{key}: {}", value_text(value)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

// ---------------------------------------------------------------------------
// StoreFileDeriver
// ---------------------------------------------------------------------------

/// Records remote files as `File` entities in an entity store.
///
/// Downloading and transforming the asset is left to whatever consumes the
/// store; the derived entity carries the `url` and the parent id.
pub struct StoreFileDeriver {
    store: Arc<dyn EntityStore>,
}

impl StoreFileDeriver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RemoteFileDeriver for StoreFileDeriver {
    async fn derive(&self, url: &str, parent: &NodeId) -> StorageResult<Option<NodeId>> {
        let id = self
            .store
            .allocate_id(&format!("{FILE_TYPE} >>> {parent} >>> {url}"));

        let mut fields = serde_json::Map::new();
        fields.insert("url".to_string(), serde_json::Value::from(url));
        fields.insert("parentId".to_string(), serde_json::Value::from(parent.as_str()));
        let content_digest = self
            .store
            .hash_content(&serde_json::Value::Object(fields.clone()))?;

        let id = self
            .store
            .submit(NewEntity {
                id,
                type_name: FILE_TYPE.to_string(),
                parent: Some(parent.clone()),
                children: Vec::new(),
                content_digest,
                content: None,
                media_type: None,
                fields,
                provenance: None,
            })
            .await?;
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_line_block() {
        let blocks = parse_type_blocks("type GitHubUser implements Node { githubId: String! }")
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].type_name, "GitHubUser");
        assert_eq!(blocks[0].fields[0].0, "githubId");
    }

    #[test]
    fn test_parse_multiple_multiline_blocks() {
        let defs = r#"
            type GitHubDiscussion implements Node {
              author: GitHubUser @link(from: "author.id", by: "githubId")
              labels: [GitHubLabel] @link(from: "labels.id", by: "githubId")
            }
            type GitHubLabel implements Node {
              color: String
            }
        "#;
        let blocks = parse_type_blocks(defs).unwrap();
        assert_eq!(blocks.len(), 2);
        let names: Vec<_> = blocks[0].fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["author", "labels"]);
        assert_eq!(blocks[1].type_name, "GitHubLabel");
    }

    #[test]
    fn test_parse_rejects_unclosed_block() {
        let err = parse_type_blocks("type GitHubUser implements Node { githubId: String!").unwrap_err();
        assert!(matches!(err, StoreError::InvalidDeclaration(_)));
    }

    #[test]
    fn test_field_lines_are_normalized() {
        let defs = r#"
            type GitHubUser implements Node {
              repos(first: Int = 10,   after: String):   [GitHubRepository!]!
              avatar: File @link(from: "fields.avatar")
            }
        "#;
        let blocks = parse_type_blocks(defs).unwrap();
        assert_eq!(
            blocks[0].fields,
            vec![
                (
                    "repos".to_string(),
                    "repos(first: Int = 10, after: String): [GitHubRepository!]!".to_string()
                ),
                (
                    "avatar".to_string(),
                    "avatar: File @link(from: \"fields.avatar\")".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_identifiers_containing_type_are_not_keywords() {
        let blocks = parse_type_blocks("type Typed { typename: String type: String }").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].type_name, "Typed");
        let names: Vec<_> = blocks[0].fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["typename", "type"]);
    }

    #[test]
    fn test_extensions_and_interfaces_yield_blocks() {
        let defs = "interface Node { id: ID! }\nextend type GitHubUser { bio: String }\nunion Actor = GitHubUser";
        let blocks = parse_type_blocks(defs).unwrap();
        let names: Vec<_> = blocks.iter().map(|b| b.type_name.as_str()).collect();
        assert_eq!(names, vec!["Node", "GitHubUser"]);
    }
}
