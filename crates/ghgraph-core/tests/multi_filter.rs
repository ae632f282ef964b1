use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use ghgraph_core::{
    CategoryFilter, FetchOrder, FilterSet, FilteredFetch, MultiFilterFetcher, OrderDirection,
    OrderField, QueryError, RawRecord, SourceError, SourceResult,
};
use serde_json::json;
use tokio::time::sleep;

fn rec(id: &str, created_at: &str) -> RawRecord {
    RawRecord::from_value(json!({ "id": id, "createdAt": created_at })).unwrap()
}

fn slugs(names: &[&str]) -> FilterSet {
    FilterSet::CategorySlugs(names.iter().map(|s| s.to_string()).collect())
}

/// Serves fixed batches per slug and records every call.
#[derive(Default)]
struct FixedFetch {
    by_slug: HashMap<String, Vec<RawRecord>>,
    unfiltered: Vec<RawRecord>,
    calls: Mutex<Vec<Option<CategoryFilter>>>,
}

#[async_trait]
impl FilteredFetch for FixedFetch {
    async fn fetch_filtered(&self, filter: Option<&CategoryFilter>) -> SourceResult<Vec<RawRecord>> {
        self.calls.lock().unwrap().push(filter.cloned());
        match filter {
            None => Ok(self.unfiltered.clone()),
            Some(CategoryFilter::Slug(slug)) => Ok(self.by_slug.get(slug).cloned().unwrap_or_default()),
            Some(CategoryFilter::Id(id)) => Err(SourceError::configuration(format!("unexpected id {id}"))),
        }
    }
}

fn published_and_draft() -> FixedFetch {
    let mut by_slug = HashMap::new();
    by_slug.insert(
        "published".to_string(),
        vec![
            rec("p1", "2024-05-01T09:00:00Z"),
            rec("p2", "2024-03-15T12:30:00.250Z"),
            rec("p3", "2023-12-31T23:59:59Z"),
        ],
    );
    by_slug.insert(
        "draft".to_string(),
        vec![
            rec("d1", "2024-06-01T00:00:00Z"),
            rec("d2", "2024-04-01T08:00:00.250Z"),
            rec("d3", "2024-01-10T10:10:10Z"),
        ],
    );
    FixedFetch {
        by_slug,
        ..FixedFetch::default()
    }
}

#[tokio::test]
async fn test_two_filters_merge_in_strict_descending_order() {
    let fetch = published_and_draft();
    let merged = MultiFilterFetcher::fetch_all(&fetch, &slugs(&["published", "draft"]), FetchOrder::default())
        .await
        .unwrap();

    assert_eq!(merged.len(), 6);
    let instants: Vec<_> = merged
        .iter()
        .map(|r| DateTime::parse_from_rfc3339(r.str_field("createdAt").unwrap()).unwrap())
        .collect();
    assert!(instants.windows(2).all(|w| w[0] > w[1]), "not strictly descending: {instants:?}");

    let ids: Vec<_> = merged.iter().filter_map(RawRecord::external_id).collect();
    assert_eq!(ids, vec!["d1", "p1", "d2", "p2", "d3", "p3"]);
}

#[tokio::test]
async fn test_ascending_order_by_updated_at() {
    let mut by_slug = HashMap::new();
    by_slug.insert(
        "a".to_string(),
        vec![RawRecord::from_value(json!({ "id": "x", "updatedAt": "2024-02-01T00:00:00Z" })).unwrap()],
    );
    by_slug.insert(
        "b".to_string(),
        vec![RawRecord::from_value(json!({ "id": "y", "updatedAt": "2024-01-01T00:00:00Z" })).unwrap()],
    );
    let fetch = FixedFetch {
        by_slug,
        ..FixedFetch::default()
    };
    let order = FetchOrder {
        field: OrderField::UpdatedAt,
        direction: OrderDirection::Asc,
    };

    let merged = MultiFilterFetcher::fetch_all(&fetch, &slugs(&["a", "b"]), order)
        .await
        .unwrap();
    let ids: Vec<_> = merged.iter().filter_map(RawRecord::external_id).collect();
    assert_eq!(ids, vec!["y", "x"]);
}

#[tokio::test]
async fn test_no_filters_fetches_once_unfiltered() {
    let fetch = FixedFetch {
        unfiltered: vec![rec("a", "2020-01-01T00:00:00Z"), rec("b", "2021-01-01T00:00:00Z")],
        ..FixedFetch::default()
    };

    let merged = MultiFilterFetcher::fetch_all(&fetch, &FilterSet::Unfiltered, FetchOrder::default())
        .await
        .unwrap();

    assert_eq!(merged.len(), 2);
    assert_eq!(*fetch.calls.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn test_one_fetch_per_filter() {
    let fetch = published_and_draft();
    MultiFilterFetcher::fetch_all(&fetch, &slugs(&["published", "draft", "missing"]), FetchOrder::default())
        .await
        .unwrap();
    assert_eq!(fetch.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_any_failure_fails_the_whole_fetch() {
    struct OneBad;

    #[async_trait]
    impl FilteredFetch for OneBad {
        async fn fetch_filtered(&self, filter: Option<&CategoryFilter>) -> SourceResult<Vec<RawRecord>> {
            match filter {
                Some(CategoryFilter::Id(id)) if id == "bad" => Err(SourceError::Query(QueryError::GraphQl {
                    messages: vec!["Could not resolve to a node".to_string()],
                })),
                _ => Ok(vec![rec("ok", "2024-01-01T00:00:00Z")]),
            }
        }
    }

    let filters = FilterSet::CategoryIds(vec!["good".to_string(), "bad".to_string()]);
    let err = MultiFilterFetcher::fetch_all(&OneBad, &filters, FetchOrder::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Query(QueryError::GraphQl { .. })));
}

/// Holds each fetch open briefly and tracks how many overlap.
struct SlowFetch {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl FilteredFetch for SlowFetch {
    async fn fetch_filtered(&self, filter: Option<&CategoryFilter>) -> SourceResult<Vec<RawRecord>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let id = match filter {
            Some(CategoryFilter::Id(id)) => id.clone(),
            _ => "none".to_string(),
        };
        Ok(vec![rec(&id, "2024-01-01T00:00:00Z")])
    }
}

#[tokio::test]
async fn test_filtered_fetches_run_concurrently() {
    let fetch = Arc::new(SlowFetch {
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let filters = FilterSet::CategoryIds((0..4).map(|i| format!("DIC_{i}")).collect());

    let merged = MultiFilterFetcher::fetch_all(fetch.as_ref(), &filters, FetchOrder::default())
        .await
        .unwrap();

    assert_eq!(merged.len(), 4);
    // equal timestamps: stable sort keeps filter order
    let ids: Vec<_> = merged.iter().filter_map(RawRecord::external_id).collect();
    assert_eq!(ids, vec!["DIC_0", "DIC_1", "DIC_2", "DIC_3"]);
    assert!(
        fetch.max_in_flight.load(Ordering::SeqCst) > 1,
        "expected concurrent fetches, max_in_flight={}",
        fetch.max_in_flight.load(Ordering::SeqCst)
    );
}
