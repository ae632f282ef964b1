//! GraphQL documents for repository discussions.

use ghgraph_core::{FieldFragments, Role};

/// Largest page the API serves.
pub const PAGE_SIZE: usize = 100;

/// Labels fetched per discussion.
pub const LABELS_PER_DISCUSSION: usize = 100;

pub const CATEGORY_BY_SLUG: &str = "query ($owner: String!, $repo: String!, $slug: String!) {
  repository(owner: $owner, name: $repo) {
    discussionCategory(slug: $slug) {
      id
    }
  }
}";

fn indent(fields: &str, depth: usize) -> String {
    let pad = " ".repeat(depth * 2);
    fields
        .lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One page of discussions with author, category and labels inlined.
pub fn discussions_page(fragments: &FieldFragments) -> String {
    let field = |role: Role, depth: usize| indent(fragments.get(role).unwrap_or("id"), depth);
    format!(
        "query ($owner: String!, $repo: String!, $first: Int!, $after: String, $categoryId: ID, $orderBy: DiscussionOrder) {{
  repository(owner: $owner, name: $repo) {{
    discussions(first: $first, after: $after, categoryId: $categoryId, orderBy: $orderBy) {{
      pageInfo {{
        hasNextPage
        endCursor
      }}
      nodes {{
{discussion}
        author {{
          ... on User {{
{user}
          }}
        }}
        category {{
{category}
        }}
        labels(first: {LABELS_PER_DISCUSSION}) {{
          nodes {{
{label}
          }}
        }}
      }}
    }}
  }}
}}",
        discussion = field(Role::Discussion, 4),
        user = field(Role::User, 6),
        category = field(Role::DiscussionCategory, 5),
        label = field(Role::Label, 6),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_splices_every_fragment() {
        let fragments = FieldFragments::standard();
        let query = discussions_page(&fragments);
        assert!(query.contains("            isGitHubStar"));
        assert!(query.contains("          emojiHTML"));
        assert!(query.contains("            isDefault"));
        assert!(query.contains("        locked"));
        assert!(query.contains("labels(first: 100)"));
        assert_eq!(query.matches('{').count(), query.matches('}').count());
    }
}
