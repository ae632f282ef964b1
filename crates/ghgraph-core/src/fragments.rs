//! Shared GraphQL field selections, keyed by role.
//!
//! Providers splice these into their queries so that records of the same role
//! carry the same fields regardless of which provider fetched them.

use std::collections::BTreeMap;

use crate::registry::Role;

const ABSTRACT_ACTOR_FIELDS: &[&str] = &[
    "avatarUrl",
    "login",
    "resourcePath",
    "url",
    "typename: __typename",
];

const USER_FIELDS: &[&str] = &[
    "anyPinnableRepositories: anyPinnableItems(type: REPOSITORY)",
    "anyPinnableGists: anyPinnableItems(type: GIST)",
    "anyPinnableIssues: anyPinnableItems(type: ISSUE)",
    "anyPinnableProjects: anyPinnableItems(type: PROJECT)",
    "anyPinnablePullRequests: anyPinnableItems(type: PULL_REQUEST)",
    "anyPinnableUsers: anyPinnableItems(type: USER)",
    "anyPinnableOrganizations: anyPinnableItems(type: ORGANIZATION)",
    "anyPinnableTeams: anyPinnableItems(type: TEAM)",
    "bio",
    "bioHTML",
    "company",
    "companyHTML",
    "name",
    "createdAt",
    "updatedAt",
    "id",
    "databaseId",
    "email",
    "hasSponsorsListing",
    "isBountyHunter",
    "isCampusExpert",
    "isDeveloperProgramMember",
    "isEmployee",
    "isGitHubStar",
    "isHireable",
    "isSiteAdmin",
    "isViewer",
    "isSponsoringViewer",
    "websiteUrl",
    "twitterUsername",
    "viewerIsSponsoring",
];

const DISCUSSION_FIELDS: &[&str] = &[
    "body",
    "createdAt",
    "updatedAt",
    "url",
    "id",
    "number",
    "title",
    "locked",
    "lastEditedAt",
];

const DISCUSSION_CATEGORY_FIELDS: &[&str] = &[
    "name",
    "id",
    "createdAt",
    "description",
    "emoji",
    "emojiHTML",
    "isAnswerable",
    "slug",
    "updatedAt",
];

const LABEL_FIELDS: &[&str] = &[
    "color",
    "createdAt",
    "description",
    "id",
    "isDefault",
    "name",
    "resourcePath",
    "updatedAt",
    "url",
];

/// Read-only role → field selection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFragments {
    by_role: BTreeMap<Role, String>,
}

impl Default for FieldFragments {
    fn default() -> Self {
        Self::standard()
    }
}

impl FieldFragments {
    pub fn standard() -> Self {
        let user: Vec<&str> = ABSTRACT_ACTOR_FIELDS
            .iter()
            .chain(USER_FIELDS)
            .copied()
            .collect();

        let by_role = [
            (Role::User, user.as_slice()),
            (Role::Discussion, DISCUSSION_FIELDS),
            (Role::DiscussionCategory, DISCUSSION_CATEGORY_FIELDS),
            (Role::Label, LABEL_FIELDS),
        ]
        .into_iter()
        .map(|(role, fields)| (role, fields.join("\n")))
        .collect();

        Self { by_role }
    }

    /// Field selection for `role`, one field per line.
    pub fn get(&self, role: Role) -> Option<&str> {
        self.by_role.get(&role).map(String::as_str)
    }

    /// Roles that have a fragment.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.by_role.keys().copied()
    }
}
