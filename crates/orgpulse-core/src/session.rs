//! Session context for a portal connection.
//!
//! Everything the report builders and the publish engine need to know about
//! the connected organization travels through this struct explicitly; there
//! is no module-level connection state.

use serde::{Deserialize, Serialize};

/// Identity and addressing facts for the connected portal session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    /// Base URL of the portal (e.g. `https://myorg.maps.arcgis.com`).
    pub portal_url: String,
    /// Identifier of the connected organization.
    pub org_id: String,
    /// Username the job runs as; published items are owned by this user.
    pub username: String,
}

impl SessionContext {
    /// Base URL for group landing pages.
    ///
    /// Hosted (`arcgis.com`) organizations share one public URL; on-premises
    /// portals serve group pages under their own host.
    pub fn group_link_base(&self) -> String {
        if self.portal_url.to_lowercase().contains("arcgis.com") {
            "https://www.arcgis.com/home/group.html?id=".to_string()
        } else {
            format!("{}/home/group.html?id=", self.portal_url)
        }
    }

    /// Direct URL for a group.
    pub fn group_url(&self, group_id: &str) -> String {
        format!("{}{group_id}", self.group_link_base())
    }

    /// Short item-page URL. Always the portal page form; service URLs can
    /// exceed field length limits.
    pub fn item_url(&self, item_id: &str) -> String {
        format!("{}/home/item.html?id={item_id}", self.portal_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(url: &str) -> SessionContext {
        SessionContext {
            portal_url: url.to_string(),
            org_id: "org1".to_string(),
            username: "reporter".to_string(),
        }
    }

    #[test]
    fn hosted_orgs_use_the_public_group_url() {
        let s = session("https://myorg.maps.arcgis.com");
        assert_eq!(
            s.group_url("g1"),
            "https://www.arcgis.com/home/group.html?id=g1"
        );
    }

    #[test]
    fn on_prem_portals_use_their_own_host() {
        let s = session("https://gis.example.com/portal");
        assert_eq!(
            s.group_url("g1"),
            "https://gis.example.com/portal/home/group.html?id=g1"
        );
    }

    #[test]
    fn item_urls_are_the_short_page_form() {
        let s = session("https://gis.example.com/portal");
        assert_eq!(
            s.item_url("abc"),
            "https://gis.example.com/portal/home/item.html?id=abc"
        );
    }
}
