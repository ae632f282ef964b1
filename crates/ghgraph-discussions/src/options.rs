//! Options accepted by the discussions provider.

use ghgraph_core::{FetchOrder, FilterSet, OrderDirection, OrderField, SourceError, SourceResult};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiscussionsOptions {
    /// Repository owner login
    pub owner: String,
    /// Repository name
    pub repo: String,
    #[serde(default)]
    pub category_ids: Option<Vec<String>>,
    #[serde(default)]
    pub category_slugs: Option<Vec<String>>,
    /// Upper bound on discussions fetched per filter
    #[serde(default)]
    pub max_discussions_count: Option<usize>,
    #[serde(default)]
    pub order_by_field: OrderField,
    #[serde(default)]
    pub order_by_direction: OrderDirection,
}

impl DiscussionsOptions {
    pub fn validate(&self) -> SourceResult<()> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            return Err(SourceError::configuration(
                "discussions: owner and repo are required",
            ));
        }
        Ok(())
    }

    pub fn filter_set(&self) -> SourceResult<FilterSet> {
        FilterSet::from_lists(self.category_ids.clone(), self.category_slugs.clone())
    }

    pub fn order(&self) -> FetchOrder {
        FetchOrder {
            field: self.order_by_field,
            direction: self.order_by_direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<DiscussionsOptions, serde_json::Error> {
        serde_json::from_value(value)
    }

    #[test]
    fn test_defaults_order_by_creation_descending() {
        let options = parse(json!({ "owner": "octo", "repo": "blog" })).unwrap();
        assert_eq!(options.order(), FetchOrder::default());
        assert_eq!(options.order().field, OrderField::CreatedAt);
        assert_eq!(options.order().direction, OrderDirection::Desc);
        assert_eq!(options.filter_set().unwrap(), FilterSet::Unfiltered);
    }

    #[test]
    fn test_explicit_order_and_slugs() {
        let options = parse(json!({
            "owner": "octo",
            "repo": "blog",
            "categorySlugs": ["published"],
            "maxDiscussionsCount": 10,
            "orderByField": "UPDATED_AT",
            "orderByDirection": "ASC"
        }))
        .unwrap();
        assert_eq!(options.max_discussions_count, Some(10));
        assert_eq!(options.order().field, OrderField::UpdatedAt);
        assert_eq!(options.order().direction, OrderDirection::Asc);
        assert_eq!(
            options.filter_set().unwrap(),
            FilterSet::CategorySlugs(vec!["published".to_string()])
        );
    }

    #[test]
    fn test_rejects_unknown_options_and_blank_repo() {
        assert!(parse(json!({ "owner": "o", "repo": "r", "mapDiscussions": true })).is_err());
        let blank = parse(json!({ "owner": "o", "repo": " " })).unwrap();
        assert!(matches!(blank.validate(), Err(SourceError::Configuration(_))));
    }
}
