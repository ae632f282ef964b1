//! Fetch-and-merge over mutually exclusive filters.
//!
//! [`MultiFilterFetcher`] runs one fetch per filter concurrently, concatenates
//! the results in filter order and stable-sorts them by a timestamp field.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{SourceError, SourceResult};
use crate::records::RawRecord;
use crate::registry::ApiTypes;

/// Timestamp a merged result is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl OrderField {
    /// Record field holding the timestamp.
    pub fn field_name(self) -> &'static str {
        match self {
            OrderField::CreatedAt => "createdAt",
            OrderField::UpdatedAt => "updatedAt",
        }
    }

    /// Upstream enumeration value.
    pub fn api_name(self, api: &ApiTypes) -> &str {
        match self {
            OrderField::CreatedAt => &api.order_field_created_at,
            OrderField::UpdatedAt => &api.order_field_updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn api_name(self, api: &ApiTypes) -> &str {
        match self {
            OrderDirection::Asc => &api.order_direction_asc,
            OrderDirection::Desc => &api.order_direction_desc,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOrder {
    pub field: OrderField,
    pub direction: OrderDirection,
}

/// One category filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    Id(String),
    Slug(String),
}

/// The filters of one fetch. Ids and slugs never mix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterSet {
    #[default]
    Unfiltered,
    CategoryIds(Vec<String>),
    CategorySlugs(Vec<String>),
}

impl FilterSet {
    /// Build from optional id and slug lists. Empty lists count as absent;
    /// non-empty lists of both kinds are a configuration error.
    pub fn from_lists(ids: Option<Vec<String>>, slugs: Option<Vec<String>>) -> SourceResult<Self> {
        let ids = ids.filter(|v| !v.is_empty());
        let slugs = slugs.filter(|v| !v.is_empty());
        match (ids, slugs) {
            (Some(_), Some(_)) => Err(SourceError::configuration(
                "categoryIds and categorySlugs are mutually exclusive",
            )),
            (Some(ids), None) => Ok(FilterSet::CategoryIds(ids)),
            (None, Some(slugs)) => Ok(FilterSet::CategorySlugs(slugs)),
            (None, None) => Ok(FilterSet::Unfiltered),
        }
    }

    pub fn filters(&self) -> Vec<CategoryFilter> {
        match self {
            FilterSet::Unfiltered => Vec::new(),
            FilterSet::CategoryIds(ids) => ids.iter().cloned().map(CategoryFilter::Id).collect(),
            FilterSet::CategorySlugs(slugs) => {
                slugs.iter().cloned().map(CategoryFilter::Slug).collect()
            }
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        matches!(self, FilterSet::Unfiltered)
    }
}

/// One filtered fetch of the underlying paginated resource.
#[async_trait]
pub trait FilteredFetch: Send + Sync {
    /// Fetch every record matching `filter`, or every record when `None`.
    async fn fetch_filtered(&self, filter: Option<&CategoryFilter>) -> SourceResult<Vec<RawRecord>>;
}

fn timestamp(record: &RawRecord, field: OrderField) -> Option<DateTime<FixedOffset>> {
    record
        .str_field(field.field_name())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Stable sort by full timestamp. Records without a parseable timestamp go
/// after all dated records, keeping their relative order.
pub fn sort_by_timestamp(records: &mut [RawRecord], order: FetchOrder) {
    records.sort_by(|a, b| {
        match (timestamp(a, order.field), timestamp(b, order.field)) {
            (Some(x), Some(y)) => match order.direction {
                OrderDirection::Asc => x.cmp(&y),
                OrderDirection::Desc => y.cmp(&x),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

pub struct MultiFilterFetcher;

impl MultiFilterFetcher {
    /// Run the fetch once per filter and merge.
    ///
    /// With no filters the fetch runs once, unfiltered, and its upstream
    /// order is kept. Any failing fetch fails the whole call.
    #[instrument(skip_all, fields(filters = tracing::field::Empty))]
    pub async fn fetch_all(
        fetch: &dyn FilteredFetch,
        filters: &FilterSet,
        order: FetchOrder,
    ) -> SourceResult<Vec<RawRecord>> {
        let filters = filters.filters();
        tracing::Span::current().record("filters", filters.len());

        if filters.is_empty() {
            return fetch.fetch_filtered(None).await;
        }

        let batches = try_join_all(filters.iter().map(|f| fetch.fetch_filtered(Some(f)))).await?;
        let mut merged: Vec<RawRecord> = batches.into_iter().flatten().collect();
        sort_by_timestamp(&mut merged, order);
        debug!(records = merged.len(), "filtered fetches merged");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(id: &str, created: &str) -> RawRecord {
        RawRecord::from_value(json!({ "id": id, "createdAt": created })).unwrap()
    }

    fn ids(records: &[RawRecord]) -> Vec<String> {
        records.iter().filter_map(RawRecord::external_id).collect()
    }

    #[test]
    fn test_filter_set_from_lists() {
        assert_eq!(FilterSet::from_lists(None, None).unwrap(), FilterSet::Unfiltered);
        assert_eq!(
            FilterSet::from_lists(Some(vec![]), Some(vec![])).unwrap(),
            FilterSet::Unfiltered
        );
        assert_eq!(
            FilterSet::from_lists(None, Some(vec!["ideas".into()])).unwrap(),
            FilterSet::CategorySlugs(vec!["ideas".into()])
        );
        assert!(matches!(
            FilterSet::from_lists(Some(vec!["DIC_1".into()]), Some(vec!["ideas".into()])),
            Err(SourceError::Configuration(_))
        ));
    }

    #[test]
    fn test_sort_uses_full_instant_not_subsecond_component() {
        // Same millisecond-of-second, a day apart.
        let mut records = vec![
            rec("old", "2024-01-01T10:00:00.500Z"),
            rec("new", "2024-01-02T10:00:00.500Z"),
            rec("mid", "2024-01-01T12:00:00.100Z"),
        ];
        sort_by_timestamp(&mut records, FetchOrder::default());
        assert_eq!(ids(&records), vec!["new", "mid", "old"]);

        sort_by_timestamp(
            &mut records,
            FetchOrder {
                field: OrderField::CreatedAt,
                direction: OrderDirection::Asc,
            },
        );
        assert_eq!(ids(&records), vec!["old", "mid", "new"]);
    }

    #[test]
    fn test_sort_compares_across_offsets() {
        let mut records = vec![
            rec("utc", "2024-03-01T10:00:00Z"),
            rec("plus2", "2024-03-01T11:30:00+02:00"),
        ];
        sort_by_timestamp(
            &mut records,
            FetchOrder {
                field: OrderField::CreatedAt,
                direction: OrderDirection::Asc,
            },
        );
        assert_eq!(ids(&records), vec!["plus2", "utc"]);
    }

    #[test]
    fn test_undated_records_sort_last_in_both_directions() {
        for direction in [OrderDirection::Asc, OrderDirection::Desc] {
            let mut records = vec![
                rec("bad", "yesterday"),
                rec("a", "2024-01-01T00:00:00Z"),
                RawRecord::from_value(json!({ "id": "none" })).unwrap(),
                rec("b", "2024-02-01T00:00:00Z"),
            ];
            sort_by_timestamp(
                &mut records,
                FetchOrder {
                    field: OrderField::CreatedAt,
                    direction,
                },
            );
            assert_eq!(&ids(&records)[2..], &["bad".to_string(), "none".to_string()]);
        }
    }

    #[test]
    fn test_api_names_follow_resolved_types() {
        let api = ApiTypes::default();
        assert_eq!(OrderField::UpdatedAt.api_name(&api), "UPDATED_AT");
        assert_eq!(OrderDirection::default().api_name(&api), "DESC");
        assert_eq!(OrderField::UpdatedAt.field_name(), "updatedAt");
    }
}
