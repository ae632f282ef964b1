//! Type registries.
//!
//! [`TypeRegistry`] maps every [`Role`] to the type name entities of that role
//! are stored under. [`ApiTypes`] holds the upstream enumeration names
//! providers put into queries. Both are built once per run by deep-merging a
//! built-in default table with an optional caller override, then shared
//! read-only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Canonical, provider-agnostic entity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Discussion,
    Repository,
    RepositoryTopic,
    Language,
    RepositoryOwner,
    Topic,
    Label,
    DiscussionCategory,
    User,
    Bot,
    EnterpriseUserAccount,
    Mannequin,
    Organization,
    Issue,
}

impl Role {
    pub const ALL: [Role; 14] = [
        Role::Discussion,
        Role::Repository,
        Role::RepositoryTopic,
        Role::Language,
        Role::RepositoryOwner,
        Role::Topic,
        Role::Label,
        Role::DiscussionCategory,
        Role::User,
        Role::Bot,
        Role::EnterpriseUserAccount,
        Role::Mannequin,
        Role::Organization,
        Role::Issue,
    ];

    /// Key used for this role in registry tables and config files.
    pub fn key(self) -> &'static str {
        match self {
            Role::Discussion => "DISCUSSION",
            Role::Repository => "REPOSITORY",
            Role::RepositoryTopic => "REPOSITORY_TOPIC",
            Role::Language => "LANGUAGE",
            Role::RepositoryOwner => "REPOSITORY_OWNER",
            Role::Topic => "TOPIC",
            Role::Label => "LABEL",
            Role::DiscussionCategory => "DISCUSSION_CATEGORY",
            Role::User => "USER",
            Role::Bot => "BOT",
            Role::EnterpriseUserAccount => "ENTERPRISE_USER_ACCOUNT",
            Role::Mannequin => "MANNEQUIN",
            Role::Organization => "ORGANIZATION",
            Role::Issue => "ISSUE",
        }
    }

    pub fn from_key(key: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|r| r.key() == key)
    }

    /// Built-in type name, mirrored from the GitHub GraphQL API.
    pub fn default_type_name(self) -> &'static str {
        match self {
            Role::Discussion => "GitHubDiscussion",
            Role::Repository => "GitHubRepository",
            Role::RepositoryTopic => "GitHubRepositoryTopic",
            Role::Language => "GitHubLanguage",
            Role::RepositoryOwner => "GitHubRepositoryOwner",
            Role::Topic => "GitHubTopic",
            Role::Label => "GitHubLabel",
            Role::DiscussionCategory => "GitHubDiscussionCategory",
            Role::User => "GitHubUser",
            Role::Bot => "GitHubBot",
            Role::EnterpriseUserAccount => "GitHubEnterpriseUserAccount",
            Role::Mannequin => "GitHubMannequin",
            Role::Organization => "GitHubOrganization",
            Role::Issue => "GitHubIssue",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// Table merge
// ---------------------------------------------------------------------------

/// A registry table entry: a type name, or a nested group of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeEntry {
    Name(String),
    Group(TypeTable),
}

/// Nested key → entry table, as written in config files.
pub type TypeTable = BTreeMap<String, TypeEntry>;

fn name(value: &str) -> TypeEntry {
    TypeEntry::Name(value.to_string())
}

/// Deep-merge `overrides` into `defaults`.
///
/// - leaf in both: the override wins unless it is blank
/// - group in both: merged recursively
/// - shape mismatch: the default is kept
/// - key only in the override: adopted
pub fn merge_tables(defaults: &TypeTable, overrides: &TypeTable) -> TypeTable {
    let mut merged = defaults.clone();
    for (key, over) in overrides {
        let entry = match (defaults.get(key), over) {
            (_, TypeEntry::Name(n)) if n.trim().is_empty() => {
                debug!(key = %key, "blank override ignored");
                continue;
            }
            (None, over) => over.clone(),
            (Some(TypeEntry::Name(_)), TypeEntry::Name(n)) => TypeEntry::Name(n.clone()),
            (Some(TypeEntry::Group(d)), TypeEntry::Group(o)) => {
                TypeEntry::Group(merge_tables(d, o))
            }
            (Some(_), _) => {
                debug!(key = %key, "override shape does not match default, ignored");
                continue;
            }
        };
        merged.insert(key.clone(), entry);
    }
    merged
}

fn leaf<'a>(table: &'a TypeTable, path: &[&str]) -> Option<&'a str> {
    let (last, groups) = path.split_last()?;
    let mut current = table;
    for key in groups {
        match current.get(*key)? {
            TypeEntry::Group(inner) => current = inner,
            TypeEntry::Name(_) => return None,
        }
    }
    match current.get(*last)? {
        TypeEntry::Name(n) => Some(n.as_str()),
        TypeEntry::Group(_) => None,
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Immutable role → type name mapping for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeRegistry {
    names: BTreeMap<Role, String>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::resolve(None)
    }
}

impl TypeRegistry {
    /// Built-in role → type name table.
    pub fn default_table() -> TypeTable {
        Role::ALL
            .into_iter()
            .map(|r| (r.key().to_string(), name(r.default_type_name())))
            .collect()
    }

    /// Merge the defaults with `overrides` and read back every role.
    ///
    /// Keys that are not roles are carried through the merge but never
    /// surface as roles.
    pub fn resolve(overrides: Option<&TypeTable>) -> Self {
        let defaults = Self::default_table();
        let merged = match overrides {
            Some(o) => merge_tables(&defaults, o),
            None => defaults,
        };
        let names = Role::ALL
            .into_iter()
            .map(|role| {
                let type_name = leaf(&merged, &[role.key()]).unwrap_or(role.default_type_name());
                (role, type_name.to_string())
            })
            .collect();
        Self { names }
    }

    pub fn name(&self, role: Role) -> &str {
        self.names
            .get(&role)
            .map(String::as_str)
            .unwrap_or(role.default_type_name())
    }

    /// Every resolved type name, in role order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }

    /// The first role resolved to `type_name`.
    pub fn role_of(&self, type_name: &str) -> Option<Role> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == type_name)
            .map(|(r, _)| *r)
    }

    /// Whether `type_name` is one of this registry's resolved names.
    pub fn is_internal_type(&self, type_name: &str) -> bool {
        self.role_of(type_name).is_some()
    }

    pub fn as_table(&self) -> TypeTable {
        self.names
            .iter()
            .map(|(r, n)| (r.key().to_string(), name(n)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// ApiTypes
// ---------------------------------------------------------------------------

/// Upstream enumeration names used when building queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiTypes {
    pub user: String,
    pub issue: String,
    pub order_field_created_at: String,
    pub order_field_updated_at: String,
    pub order_direction_asc: String,
    pub order_direction_desc: String,
}

impl Default for ApiTypes {
    fn default() -> Self {
        Self::resolve(None)
    }
}

impl ApiTypes {
    pub fn default_table() -> TypeTable {
        let group = |entries: &[(&str, &str)]| {
            TypeEntry::Group(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), name(v)))
                    .collect(),
            )
        };
        TypeTable::from([
            ("USER".to_string(), name("User")),
            ("ISSUE".to_string(), name("Issue")),
            (
                "DISCUSSION_ORDER_FIELD".to_string(),
                group(&[("CREATED_AT", "CREATED_AT"), ("UPDATED_AT", "UPDATED_AT")]),
            ),
            (
                "ORDER_DIRECTION".to_string(),
                group(&[("ASC", "ASC"), ("DESC", "DESC")]),
            ),
        ])
    }

    pub fn resolve(overrides: Option<&TypeTable>) -> Self {
        let defaults = Self::default_table();
        let merged = match overrides {
            Some(o) => merge_tables(&defaults, o),
            None => defaults.clone(),
        };
        // The merge keeps the default shape, so every path resolves; the
        // fallback only guards hand-built tables.
        let get = |path: &[&str]| {
            leaf(&merged, path)
                .or_else(|| leaf(&defaults, path))
                .unwrap_or_default()
                .to_string()
        };
        Self {
            user: get(&["USER"]),
            issue: get(&["ISSUE"]),
            order_field_created_at: get(&["DISCUSSION_ORDER_FIELD", "CREATED_AT"]),
            order_field_updated_at: get(&["DISCUSSION_ORDER_FIELD", "UPDATED_AT"]),
            order_direction_asc: get(&["ORDER_DIRECTION", "ASC"]),
            order_direction_desc: get(&["ORDER_DIRECTION", "DESC"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> TypeTable {
        entries.iter().map(|(k, v)| (k.to_string(), name(v))).collect()
    }

    #[test]
    fn test_empty_override_yields_defaults() {
        let resolved = TypeRegistry::resolve(Some(&TypeTable::new()));
        assert_eq!(resolved, TypeRegistry::default());
        for role in Role::ALL {
            assert_eq!(resolved.name(role), role.default_type_name());
        }
    }

    #[test]
    fn test_override_changes_only_named_role() {
        let overrides = table(&[("USER", "X")]);
        let resolved = TypeRegistry::resolve(Some(&overrides));
        assert_eq!(resolved.name(Role::User), "X");
        for role in Role::ALL.into_iter().filter(|r| *r != Role::User) {
            assert_eq!(resolved.name(role), role.default_type_name());
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let overrides = table(&[("DISCUSSION", "Post"), ("LABEL", "Tag")]);
        let a = TypeRegistry::resolve(Some(&overrides));
        let b = TypeRegistry::resolve(Some(&overrides));
        assert_eq!(a, b);
        let again = TypeRegistry::resolve(Some(&a.as_table()));
        assert_eq!(again, a);
    }

    #[test]
    fn test_unknown_and_blank_keys_are_ignored() {
        let overrides = table(&[("NOT_A_ROLE", "Whatever"), ("USER", "  ")]);
        let resolved = TypeRegistry::resolve(Some(&overrides));
        assert_eq!(resolved, TypeRegistry::default());
        assert!(!resolved.is_internal_type("Whatever"));
    }

    #[test]
    fn test_merge_adopts_override_only_keys() {
        let merged = merge_tables(&table(&[("A", "1")]), &table(&[("B", "2")]));
        assert_eq!(merged.get("A"), Some(&name("1")));
        assert_eq!(merged.get("B"), Some(&name("2")));
    }

    #[test]
    fn test_merge_recurses_into_groups_and_keeps_shape() {
        let defaults = ApiTypes::default_table();
        let overrides = TypeTable::from([
            (
                "ORDER_DIRECTION".to_string(),
                TypeEntry::Group(table(&[("DESC", "DESCENDING")])),
            ),
            // leaf where the default is a group: ignored
            ("DISCUSSION_ORDER_FIELD".to_string(), name("flat")),
        ]);
        let merged = merge_tables(&defaults, &overrides);
        assert_eq!(leaf(&merged, &["ORDER_DIRECTION", "DESC"]), Some("DESCENDING"));
        assert_eq!(leaf(&merged, &["ORDER_DIRECTION", "ASC"]), Some("ASC"));
        assert_eq!(
            leaf(&merged, &["DISCUSSION_ORDER_FIELD", "CREATED_AT"]),
            Some("CREATED_AT")
        );
    }

    #[test]
    fn test_api_types_resolve_nested_override() {
        let overrides = TypeTable::from([(
            "DISCUSSION_ORDER_FIELD".to_string(),
            TypeEntry::Group(table(&[("UPDATED_AT", "LAST_UPDATED")])),
        )]);
        let api = ApiTypes::resolve(Some(&overrides));
        assert_eq!(api.order_field_updated_at, "LAST_UPDATED");
        assert_eq!(api.order_field_created_at, "CREATED_AT");
        assert_eq!(api.user, "User");
    }

    #[test]
    fn test_role_lookup() {
        let registry = TypeRegistry::default();
        assert_eq!(registry.role_of("GitHubIssue"), Some(Role::Issue));
        assert!(registry.is_internal_type("GitHubUser"));
        assert!(!registry.is_internal_type("Foo"));
        assert_eq!(Role::from_key("DISCUSSION_CATEGORY"), Some(Role::DiscussionCategory));
        assert_eq!(registry.type_names().count(), Role::ALL.len());
    }

    #[test]
    fn test_type_table_deserializes_nested_json() {
        let parsed: TypeTable = serde_json::from_str(
            r#"{ "USER": "Person", "ORDER_DIRECTION": { "ASC": "UP" } }"#,
        )
        .unwrap();
        assert_eq!(parsed.get("USER"), Some(&name("Person")));
        assert!(matches!(parsed.get("ORDER_DIRECTION"), Some(TypeEntry::Group(_))));
    }
}
