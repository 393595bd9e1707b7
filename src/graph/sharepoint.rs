//! SharePoint site listing via Microsoft Graph

use crate::error::Result;
use crate::graph::GraphClient;
use serde::{Deserialize, Serialize};

const SITE_SELECT: &str = "id,displayName,name,webUrl,description,createdDateTime,isPersonalSite";

/// SharePoint site information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<String>,
    #[serde(default)]
    pub is_personal_site: Option<bool>,
}

impl Site {
    pub fn title(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }

    /// OneDrive sites live under `-my.sharepoint.com` and are flagged personal
    pub fn is_personal(&self) -> bool {
        self.is_personal_site.unwrap_or(false)
            || self
                .web_url
                .as_deref()
                .is_some_and(|u| u.contains("-my.sharepoint.com"))
    }
}

/// SharePoint operations
pub struct SharePointClient<'a> {
    client: &'a GraphClient,
}

impl<'a> SharePointClient<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        Self { client }
    }

    /// List all sites in the tenant
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let endpoint = format!("sites/getAllSites?$select={}&$top=200", SITE_SELECT);
        self.client.get_all_pages(&endpoint).await
    }

    /// Search for sites by keyword
    pub async fn search_sites(&self, query: &str) -> Result<Vec<Site>> {
        let endpoint = format!(
            "sites?search={}&$select={}",
            urlencoding::encode(query),
            SITE_SELECT
        );
        self.client.get_all_pages(&endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(url: &str, personal: Option<bool>) -> Site {
        Site {
            id: "contoso.sharepoint.com,1,2".into(),
            display_name: None,
            name: Some("Finance".into()),
            web_url: Some(url.into()),
            description: None,
            created_date_time: None,
            is_personal_site: personal,
        }
    }

    #[test]
    fn test_personal_site_detection() {
        assert!(site("https://contoso-my.sharepoint.com/personal/alice", None).is_personal());
        assert!(site("https://contoso.sharepoint.com/sites/x", Some(true)).is_personal());
        assert!(!site("https://contoso.sharepoint.com/sites/finance", Some(false)).is_personal());
    }

    #[test]
    fn test_title_falls_back_to_name() {
        assert_eq!(site("https://x", None).title(), "Finance");
    }
}
