//! The discussions provider.
//!
//! Fetches a repository's discussions once per category filter, merges them
//! in the configured order, and splits them into four record groups:
//! discussions, their labels, their authors and their categories. Nested
//! label connections are flattened to plain lists on the discussion.

use std::collections::HashSet;

use async_trait::async_trait;
use ghgraph_core::{
    ApiTypes, CategoryFilter, FetchCapability, FetchContext, FilteredFetch,
    MultiFilterFetcher, Provider, QueryRequest, RawRecord, Role, SchemaContext, SchemaExtension,
    ScopedQuery, SourceError, SourceResult, TypedRecordSet,
};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::options::DiscussionsOptions;
use crate::queries::{discussions_page, CATEGORY_BY_SLUG, PAGE_SIZE};

/// Name this provider is configured under.
pub const PROVIDER_NAME: &str = "discussions";

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscussionsProvider;

impl DiscussionsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for DiscussionsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn fetcher(&self) -> Option<&dyn FetchCapability> {
        Some(self)
    }

    fn schema_extension(&self) -> Option<&dyn SchemaExtension> {
        Some(self)
    }
}

#[async_trait]
impl FetchCapability for DiscussionsProvider {
    #[instrument(skip_all, fields(provider = PROVIDER_NAME))]
    async fn fetch(&self, ctx: FetchContext<'_>) -> SourceResult<Option<TypedRecordSet>> {
        let options: DiscussionsOptions = ctx.options.parse()?;
        options.validate()?;
        let filters = options.filter_set()?;

        let fetch = DiscussionFetch {
            query: ctx.query,
            document: discussions_page(ctx.fragments),
            options: &options,
            api_types: ctx.api_types,
        };
        let discussions = MultiFilterFetcher::fetch_all(&fetch, &filters, options.order()).await?;
        info!(
            owner = %options.owner,
            repo = %options.repo,
            discussions = discussions.len(),
            "discussions fetched"
        );

        Ok(Some(split_discussions(discussions, ctx)))
    }
}

#[async_trait]
impl SchemaExtension for DiscussionsProvider {
    async fn extend_schema(&self, ctx: &SchemaContext<'_>) -> SourceResult<()> {
        ctx.declare(&link_declarations(ctx)).await
    }
}

fn link_declarations(ctx: &SchemaContext<'_>) -> String {
    let user = ctx.registry.name(Role::User);
    let discussion = ctx.registry.name(Role::Discussion);
    let label = ctx.registry.name(Role::Label);
    let category = ctx.registry.name(Role::DiscussionCategory);
    format!(
        "type {user} implements Node {{
  discussions: [{discussion}] @link(by: \"author.id\", from: \"githubId\")
}}
type {discussion} implements Node {{
  author: {user} @link(from: \"author.id\", by: \"githubId\")
  labels: [{label}] @link(from: \"labels.id\", by: \"githubId\")
  category: {category} @link(from: \"category.id\", by: \"githubId\")
}}
type {category} implements Node {{
  discussions: [{discussion}] @link(by: \"category.id\", from: \"githubId\")
}}
"
    )
}

/// Paginated discussion fetch for one filter.
struct DiscussionFetch<'a> {
    query: &'a ScopedQuery,
    document: String,
    options: &'a DiscussionsOptions,
    api_types: &'a ApiTypes,
}

impl DiscussionFetch<'_> {
    async fn resolve_slug(&self, slug: &str) -> SourceResult<String> {
        let request = QueryRequest::new(CATEGORY_BY_SLUG).with_variables(json!({
            "owner": self.options.owner,
            "repo": self.options.repo,
            "slug": slug,
        }));
        let data = self.query.query(request).await?;
        data.pointer("/repository/discussionCategory/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SourceError::configuration(format!(
                    "discussion category '{slug}' not found in {}/{}",
                    self.options.owner, self.options.repo
                ))
            })
    }

    fn order_by(&self) -> Value {
        let order = self.options.order();
        json!({
            "field": order.field.api_name(self.api_types),
            "direction": order.direction.api_name(self.api_types),
        })
    }
}

#[async_trait]
impl FilteredFetch for DiscussionFetch<'_> {
    async fn fetch_filtered(&self, filter: Option<&CategoryFilter>) -> SourceResult<Vec<RawRecord>> {
        let category_id = match filter {
            None => None,
            Some(CategoryFilter::Id(id)) => Some(id.clone()),
            Some(CategoryFilter::Slug(slug)) => Some(self.resolve_slug(slug).await?),
        };

        let limit = self.options.max_discussions_count.unwrap_or(usize::MAX);
        let mut discussions = Vec::new();
        let mut after: Option<String> = None;

        while discussions.len() < limit {
            let first = PAGE_SIZE.min(limit - discussions.len());
            let request = QueryRequest::new(self.document.clone()).with_variables(json!({
                "owner": self.options.owner,
                "repo": self.options.repo,
                "first": first,
                "after": after,
                "categoryId": category_id,
                "orderBy": self.order_by(),
            }));
            let data = self.query.query(request).await?;
            let page = data
                .pointer("/repository/discussions")
                .ok_or_else(|| {
                    SourceError::configuration(format!(
                        "repository {}/{} not found or has discussions disabled",
                        self.options.owner, self.options.repo
                    ))
                })?;

            let nodes = page
                .get("nodes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let fetched = nodes.len();
            discussions.extend(nodes.into_iter().filter_map(RawRecord::from_value));

            let has_next = page
                .pointer("/pageInfo/hasNextPage")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            after = page
                .pointer("/pageInfo/endCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            debug!(category = ?category_id, fetched, total = discussions.len(), "discussion page");

            if !has_next || after.is_none() || fetched == 0 {
                break;
            }
        }

        discussions.truncate(limit);
        Ok(discussions)
    }
}

/// Keeps the first record seen for each id.
struct Group {
    seen: HashSet<String>,
    records: Vec<RawRecord>,
}

impl Group {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    fn push(&mut self, value: &Value) {
        let Some(record) = RawRecord::from_value(value.clone()) else {
            return;
        };
        let Some(id) = record.external_id() else {
            return;
        };
        if self.seen.insert(id) {
            self.records.push(record);
        }
    }
}

/// Split merged discussions into the four record groups.
pub fn split_discussions(discussions: Vec<RawRecord>, ctx: FetchContext<'_>) -> TypedRecordSet {
    split_with(discussions, ctx.registry.name(Role::Discussion), |role| {
        ctx.registry.name(role).to_string()
    })
}

fn split_with(
    discussions: Vec<RawRecord>,
    discussion_type: &str,
    type_name: impl Fn(Role) -> String,
) -> TypedRecordSet {
    let mut labels = Group::new();
    let mut users = Group::new();
    let mut categories = Group::new();
    let mut normalized = Vec::with_capacity(discussions.len());

    for mut discussion in discussions {
        let flat: Vec<Value> = discussion
            .get("labels")
            .and_then(|l| l.get("nodes").or(Some(l)))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for label in &flat {
            labels.push(label);
        }
        discussion.insert("labels", Value::Array(flat));

        if let Some(author) = discussion.get("author") {
            users.push(author);
        }
        if let Some(category) = discussion.get("category") {
            categories.push(category);
        }
        normalized.push(discussion);
    }

    TypedRecordSet::from([
        (discussion_type.to_string(), normalized),
        (type_name(Role::Label), labels.records),
        (type_name(Role::User), users.records),
        (type_name(Role::DiscussionCategory), categories.records),
    ])
}
