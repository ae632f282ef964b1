//! Run configuration.
//!
//! A [`SourceConfig`] is read from JSON or TOML with camelCase keys. Parsing
//! lifts any `token` or `credential` entry out of a provider's options into
//! its credential, then validates the result; every problem found here is a
//! `Configuration` error raised before the run starts.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::credential::Credential;
use crate::enrichment::EnrichmentOptions;
use crate::error::{SourceError, SourceResult};
use crate::multi_filter::FilterSet;
use crate::provider::ProviderOptions;
use crate::registry::{Role, TypeEntry, TypeTable};

/// Option keys treated as credentials wherever they appear.
const CREDENTIAL_KEYS: [&str; 2] = ["token", "credential"];

fn default_true() -> bool {
    true
}

/// Configuration of one sourcing run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceConfig {
    /// Default credential for providers that carry none
    #[serde(default, alias = "token")]
    pub credential: Option<Credential>,
    #[serde(default = "default_true")]
    pub generate_optimized_avatar: bool,
    #[serde(default = "default_true")]
    pub generate_optimized_og_image: bool,
    #[serde(default)]
    pub type_registry_override: Option<TypeTable>,
    /// Overrides for the upstream enumeration names
    #[serde(default)]
    pub api_types_override: Option<TypeTable>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            credential: None,
            generate_optimized_avatar: true,
            generate_optimized_og_image: true,
            type_registry_override: None,
            api_types_override: None,
            providers: Vec::new(),
        }
    }
}

/// One configured provider invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,
    /// Distinguishes two invocations of the same provider
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, alias = "token")]
    pub credential: Option<Credential>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: None,
            credential: None,
            options: Map::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Move credential-like option entries into `credential`.
    ///
    /// An explicit `credential` takes precedence; the option entries are
    /// removed either way.
    fn lift_credentials(&mut self) -> SourceResult<()> {
        for key in CREDENTIAL_KEYS {
            let Some(value) = self.options.remove(key) else {
                continue;
            };
            let secret = match value {
                Value::String(s) => s,
                Value::Null => continue,
                _ => {
                    return Err(SourceError::configuration(format!(
                        "provider '{}': option '{key}' must be a string",
                        self.name
                    )))
                }
            };
            if self.credential.is_none() && !secret.is_empty() {
                self.credential = Some(Credential::new(secret));
            }
        }
        Ok(())
    }
}

impl SourceConfig {
    pub fn from_json_str(raw: &str) -> SourceResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| SourceError::configuration(format!("invalid JSON config: {e}")))?;
        config.finish()
    }

    pub fn from_toml_str(raw: &str) -> SourceResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| SourceError::configuration(format!("invalid TOML config: {e}")))?;
        config.finish()
    }

    /// Load from a `.toml` file, or JSON for any other extension.
    pub fn from_path(path: &Path) -> SourceResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml_str(&raw),
            _ => Self::from_json_str(&raw),
        }
    }

    fn finish(mut self) -> SourceResult<Self> {
        for provider in &mut self.providers {
            provider.lift_credentials()?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check everything that can be checked before a run.
    pub fn validate(&self) -> SourceResult<()> {
        for (index, provider) in self.providers.iter().enumerate() {
            if provider.name.trim().is_empty() {
                return Err(SourceError::configuration(format!(
                    "provider #{index} has an empty name"
                )));
            }
            let ids = string_list(&provider.options, "categoryIds")?;
            let slugs = string_list(&provider.options, "categorySlugs")?;
            if let Err(SourceError::Configuration(detail)) = FilterSet::from_lists(ids, slugs) {
                return Err(SourceError::configuration(format!(
                    "provider '{}': {detail}",
                    provider.name
                )));
            }
        }

        if let Some(overrides) = &self.type_registry_override {
            for (key, entry) in overrides {
                if Role::from_key(key).is_none() {
                    continue;
                }
                if let TypeEntry::Group(_) = entry {
                    return Err(SourceError::configuration(format!(
                        "typeRegistryOverride.{key} must be a type name"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn enrichment_options(&self) -> EnrichmentOptions {
        EnrichmentOptions {
            generate_optimized_avatar: self.generate_optimized_avatar,
            generate_optimized_og_image: self.generate_optimized_og_image,
        }
    }

    /// Options handed to the run's own hooks: the run flags and the
    /// registry override, never the credential.
    pub fn hook_options(&self) -> ProviderOptions {
        let mut options = Map::new();
        options.insert(
            "generateOptimizedAvatar".to_string(),
            Value::Bool(self.generate_optimized_avatar),
        );
        options.insert(
            "generateOptimizedOgImage".to_string(),
            Value::Bool(self.generate_optimized_og_image),
        );
        if let Some(overrides) = &self.type_registry_override {
            if let Ok(value) = serde_json::to_value(overrides) {
                options.insert("typeRegistryOverride".to_string(), value);
            }
        }
        ProviderOptions::new(options)
    }
}

fn string_list(options: &Map<String, Value>, key: &str) -> SourceResult<Option<Vec<String>>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|_| SourceError::configuration(format!("'{key}' must be a list of strings"))),
    }
}
