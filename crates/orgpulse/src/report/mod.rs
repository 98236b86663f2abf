//! Builds the three report datasets from portal metadata.
//!
//! Every portal read in here degrades instead of failing: a group whose
//! members or content cannot be fetched still produces a row with empty
//! metrics and a warning in the log. Only the initial directory and group
//! listing are fatal, since nothing can be reported without them.

mod content;
mod members;
mod snapshot;

pub use content::build_content;
pub use members::build_members;
pub use snapshot::build_snapshot;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;

use orgpulse_core::{PortalError, SessionContext};

use crate::config::Config;
use crate::portal::{GroupRecord, MetadataSource, UserRecord};

/// How many content items to fetch per group. Only the first
/// `scan_limit` of these feed the view/recency metrics.
pub(crate) const CONTENT_FETCH_LIMIT: usize = 1000;

/// Curated system accounts whose content is excluded from view averaging.
/// Exact names only; a user who merely has "esri" in their email does not
/// qualify.
const CURATED_ACCOUNTS: &[&str] = &[
    "esri",
    "esri_livingatlas",
    "esri_demographics",
    "esri_boundaries",
    "esri_basemaps",
    "esri_landscape",
    "esri_imagery",
    "esri_elevation",
    "esri_vector",
    "esri_cartography",
    "esri_hydro",
    "esri_apps",
    "esri_media",
    "esri_3d",
    "esri_livefeeds",
    "esri_analytics",
];

/// Whether `owner` is a curated system account.
///
/// `esri_…`-prefixed names count unless they contain `@`, which marks a
/// regular user account carrying an email-derived username.
pub(crate) fn is_curated_account(owner: &str) -> bool {
    let owner = owner.to_lowercase();
    CURATED_ACCOUNTS.contains(&owner.as_str())
        || (owner.starts_with("esri_") && !owner.contains('@'))
}

/// Combined group classification from capabilities and type keywords.
pub(crate) fn group_type(group: &GroupRecord) -> String {
    let cap_str = group.capabilities.join(",").to_lowercase();
    let shared_update = cap_str.contains("updateitemcontrol")
        || cap_str.contains("shared update")
        || group.type_keywords.iter().any(|k| k == "Shared Update");
    let partnered = group
        .type_keywords
        .iter()
        .any(|k| k == "Partner Collaboration" || k == "Partnered Collaboration");
    let distributed = group
        .type_keywords
        .iter()
        .any(|k| k == "Distributed Collaboration");

    let mut types = Vec::new();
    if partnered {
        types.push("Partnered Collaboration");
    }
    if distributed {
        types.push("Distributed Collaboration");
    }
    if shared_update {
        types.push("Shared Update");
    }
    if types.is_empty() {
        "Standard".to_string()
    } else {
        types.join(", ")
    }
}

/// Sharing level as the reports display it.
pub(crate) fn sharing_level(group: &GroupRecord) -> &'static str {
    match group.access.as_str() {
        "public" => "Public",
        "org" => "Organization",
        _ => "Private",
    }
}

fn has_any_tag(group: &GroupRecord, indicators: &[&str]) -> bool {
    group
        .tags
        .iter()
        .any(|tag| indicators.contains(&tag.to_lowercase().as_str()))
}

/// Hub designation, identified by well-known tags.
pub(crate) fn is_hub_group(group: &GroupRecord) -> bool {
    has_any_tag(
        group,
        &["hub group", "hub content group", "hub site group", "hub initiative group"],
    )
}

/// Sites designation, identified by well-known tags.
pub(crate) fn is_site_group(group: &GroupRecord) -> bool {
    has_any_tag(
        group,
        &["sites", "sites group", "sites content group", "sites core team group"],
    )
}

/// The organization's user directory, indexed by username.
pub struct UserDirectory {
    users: HashMap<String, UserRecord>,
}

impl UserDirectory {
    pub fn new(users: Vec<UserRecord>) -> Self {
        UserDirectory {
            users: users
                .into_iter()
                .map(|user| (user.username.clone(), user))
                .collect(),
        }
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Display name for a username: the directory full name when present
    /// and distinct, otherwise the username itself.
    pub fn full_name(&self, username: &str) -> String {
        match self.users.get(username).and_then(|u| u.full_name.as_deref()) {
            Some(name) if !name.is_empty() && name != username => name.to_string(),
            _ => username.to_string(),
        }
    }
}

/// Inputs shared by the three dataset builders.
pub struct ReportContext {
    pub session: SessionContext,
    pub directory: UserDirectory,
    pub groups: Vec<GroupRecord>,
    pub recent_days_threshold: i64,
    pub scan_limit: usize,
    pub now: DateTime<Utc>,
}

impl ReportContext {
    /// Fetch the user directory and group listing.
    ///
    /// These two reads are the only fatal ones in the report stage.
    pub async fn gather(
        source: &dyn MetadataSource,
        config: &Config,
    ) -> Result<Self, PortalError> {
        let session = source.session();
        let users = source.list_users().await?;
        info!(users = users.len(), "loaded user directory");
        let groups = source.list_groups(config.group_limit).await?;
        info!(groups = groups.len(), limit = ?config.group_limit, "loaded groups");
        Ok(ReportContext {
            session,
            directory: UserDirectory::new(users),
            groups,
            recent_days_threshold: config.recent_days_threshold,
            scan_limit: config.content_scan_limit,
            now: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with(tags: &[&str], keywords: &[&str], capabilities: &[&str]) -> GroupRecord {
        GroupRecord {
            id: "g1".to_string(),
            title: "Test".to_string(),
            snippet: None,
            description: None,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            owner: "owner".to_string(),
            created: None,
            access: "private".to_string(),
            type_keywords: keywords.iter().map(|s| s.to_string()).collect(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn standard_group_without_special_markers() {
        let group = group_with(&[], &[], &[]);
        assert_eq!(group_type(&group), "Standard");
    }

    #[test]
    fn combined_group_type_ordering() {
        let group = group_with(
            &[],
            &["Partner Collaboration", "Distributed Collaboration"],
            &["updateitemcontrol"],
        );
        assert_eq!(
            group_type(&group),
            "Partnered Collaboration, Distributed Collaboration, Shared Update"
        );
    }

    #[test]
    fn curated_accounts_matched_exactly_or_by_prefix() {
        assert!(is_curated_account("esri"));
        assert!(is_curated_account("Esri_LivingAtlas"));
        assert!(is_curated_account("esri_newdept"));
        assert!(!is_curated_account("esri_user@esri.com_org1"));
        assert!(!is_curated_account("jane.esri"));
    }

    #[test]
    fn hub_and_site_tags_case_insensitive() {
        assert!(is_hub_group(&group_with(&["Hub Group"], &[], &[])));
        assert!(is_site_group(&group_with(&["Sites Core Team Group"], &[], &[])));
        assert!(!is_hub_group(&group_with(&["hubcap"], &[], &[])));
    }

    #[test]
    fn full_name_falls_back_to_username() {
        let directory = UserDirectory::new(vec![UserRecord {
            username: "jdoe".to_string(),
            full_name: Some("Jane Doe".to_string()),
            email: None,
            last_login: None,
            created: None,
            org_id: None,
            categories: vec![],
        }]);
        assert_eq!(directory.full_name("jdoe"), "Jane Doe");
        assert_eq!(directory.full_name("ghost"), "ghost");
    }
}
