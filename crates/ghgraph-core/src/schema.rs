//! Schema extension.
//!
//! Declarations are submitted in a fixed order: the baseline node types, the
//! optimized image links enabled by the run flags, every provider's extension
//! in configuration order, then the run's own hook. All of it is additive;
//! how repeated declarations of one type combine is the declarator's policy.

use graph_store::SchemaDeclarator;
use tracing::{debug, instrument};

use crate::enrichment::{optimized_field_name, EnrichmentOptions, USER_HOOK_NAME};
use crate::error::{SourceError, SourceResult};
use crate::materializer::LINK_FIELD;
use crate::provider::{ConfiguredProvider, ProviderOptions, SchemaExtension};
use crate::registry::{Role, TypeRegistry};

/// What a schema extension sees.
pub struct SchemaContext<'a> {
    pub declarator: &'a dyn SchemaDeclarator,
    pub registry: &'a TypeRegistry,
    /// The extension owner's options
    pub options: &'a ProviderOptions,
}

impl SchemaContext<'_> {
    pub async fn declare(&self, type_defs: &str) -> SourceResult<()> {
        self.declarator.declare(type_defs).await?;
        Ok(())
    }
}

/// `type <T> implements Node { githubId: String! }` for every registered type.
pub fn baseline_declarations(registry: &TypeRegistry) -> String {
    let mut seen = Vec::new();
    for name in registry.type_names() {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen.into_iter()
        .map(|name| format!("type {name} implements Node {{\n  {LINK_FIELD}: String!\n}}\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// File links for the derived image fields, or `None` when both are disabled.
pub fn optimized_image_declarations(registry: &TypeRegistry, options: &EnrichmentOptions) -> Option<String> {
    let mut blocks = Vec::new();
    if options.generate_optimized_avatar {
        blocks.push(file_link(registry.name(Role::User), "avatarUrl"));
    }
    if options.generate_optimized_og_image {
        blocks.push(file_link(registry.name(Role::Repository), "openGraphImageUrl"));
    }
    (!blocks.is_empty()).then(|| blocks.join("\n"))
}

fn file_link(type_name: &str, source_field: &str) -> String {
    let field = optimized_field_name(source_field);
    format!("type {type_name} implements Node {{\n  {field}: File @link(from: \"fields.{field}\")\n}}\n")
}

/// Runs the schema-extension phase.
pub struct SchemaExtensionMerger<'a> {
    pub declarator: &'a dyn SchemaDeclarator,
    pub registry: &'a TypeRegistry,
    pub providers: &'a [ConfiguredProvider],
    pub user_hook: Option<&'a dyn SchemaExtension>,
    pub user_options: &'a ProviderOptions,
    pub options: EnrichmentOptions,
}

impl SchemaExtensionMerger<'_> {
    #[instrument(skip_all)]
    pub async fn extend(&self) -> SourceResult<()> {
        self.declarator
            .declare(&baseline_declarations(self.registry))
            .await?;

        if let Some(defs) = optimized_image_declarations(self.registry, &self.options) {
            self.declarator.declare(&defs).await?;
        }

        for configured in self.providers {
            let Some(extension) = configured.provider().schema_extension() else {
                continue;
            };
            debug!(provider = %configured.name(), "extending schema");
            let ctx = SchemaContext {
                declarator: self.declarator,
                registry: self.registry,
                options: configured.options(),
            };
            extension
                .extend_schema(&ctx)
                .await
                .map_err(|e| SourceError::hook(configured.name(), e))?;
        }

        if let Some(extension) = self.user_hook {
            let ctx = SchemaContext {
                declarator: self.declarator,
                registry: self.registry,
                options: self.user_options,
            };
            extension
                .extend_schema(&ctx)
                .await
                .map_err(|e| SourceError::hook(USER_HOOK_NAME, e))?;
        }
        Ok(())
    }
}
