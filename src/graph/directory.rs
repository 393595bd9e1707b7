//! Entra ID as a [`DirectoryProvider`]
//!
//! Graph does not expose Active Directory group scope, so groups read here
//! carry no scope and scope changes are rejected. Membership queries return
//! devices, service principals and contacts too; only users and groups are
//! kept.

use super::GraphClient;
use crate::directory::{DirectoryNode, DirectoryProvider, GroupEntry, GroupScope, UserEntry};
use crate::error::{DirctlError, Result};
use serde::Deserialize;

const USER_TYPE: &str = "#microsoft.graph.user";
const GROUP_TYPE: &str = "#microsoft.graph.group";
const GROUP_SELECT: &str = "id,displayName,mail";
const MEMBER_SELECT: &str = "id,displayName,userPrincipalName,mail";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphObject {
    #[serde(rename = "@odata.type", default)]
    odata_type: Option<String>,
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
}

impl GraphObject {
    fn display_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.user_principal_name.clone())
            .unwrap_or_else(|| self.id.clone())
    }

    fn into_group(self) -> GroupEntry {
        GroupEntry {
            display_name: self.display_name(),
            id: self.id,
            mail: self.mail,
            scope: None,
        }
    }

    fn into_node(self) -> Option<DirectoryNode> {
        let odata_type = self.odata_type.clone();
        match odata_type.as_deref() {
            Some(USER_TYPE) => Some(DirectoryNode::User(UserEntry {
                display_name: self.display_name(),
                id: self.id,
                user_principal_name: self.user_principal_name,
                mail: self.mail,
            })),
            Some(GROUP_TYPE) => Some(DirectoryNode::Group(self.into_group())),
            other => {
                tracing::debug!(
                    "Ignoring directory object {} of type {}",
                    self.id,
                    other.unwrap_or("unknown")
                );
                None
            }
        }
    }
}

/// Object ids in Entra ID are GUIDs
fn is_object_id(identity: &str) -> bool {
    let parts: Vec<&str> = identity.split('-').collect();
    let expected = [8, 4, 4, 4, 12];
    parts.len() == expected.len()
        && parts
            .iter()
            .zip(expected)
            .all(|(p, len)| p.len() == len && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Quote a value for an OData `$filter` and URL-encode it
fn odata_literal(value: &str) -> String {
    let quoted = format!("'{}'", value.replace('\'', "''"));
    urlencoding::encode(&quoted).into_owned()
}

pub struct GraphDirectory {
    client: GraphClient,
    tenant: String,
}

impl GraphDirectory {
    pub fn new(client: GraphClient, tenant: String) -> Self {
        Self { client, tenant }
    }

    async fn find_group_by_name(&self, identity: &str) -> Result<Option<GroupEntry>> {
        let literal = odata_literal(identity);
        let endpoint = format!(
            "groups?$filter=displayName%20eq%20{lit}%20or%20mail%20eq%20{lit}&$select={select}",
            lit = literal,
            select = GROUP_SELECT
        );
        let mut matches: Vec<GraphObject> = self.client.get_all_pages(&endpoint).await?;

        if matches.len() > 1 {
            tracing::warn!(
                "{} groups match '{}'; using the first ({})",
                matches.len(),
                identity,
                matches[0].id
            );
        }

        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0).into_group())
        })
    }

    async fn find_user_by_name(&self, identity: &str) -> Result<Option<UserEntry>> {
        let literal = odata_literal(identity);
        let endpoint = format!(
            "users?$filter=displayName%20eq%20{lit}%20or%20mail%20eq%20{lit}&$select={select}",
            lit = literal,
            select = MEMBER_SELECT
        );
        let matches: Vec<GraphObject> = self.client.get_all_pages(&endpoint).await?;

        Ok(matches.into_iter().next().map(|u| UserEntry {
            display_name: u.display_name(),
            id: u.id,
            user_principal_name: u.user_principal_name,
            mail: u.mail,
        }))
    }
}

impl DirectoryProvider for GraphDirectory {
    fn label(&self) -> String {
        format!("Entra ID ({})", self.tenant)
    }

    async fn get_group(&self, identity: &str) -> Result<Option<GroupEntry>> {
        if is_object_id(identity) {
            let endpoint = format!("groups/{}?$select={}", identity, GROUP_SELECT);
            let group: Option<GraphObject> = self.client.get_optional(&endpoint).await?;
            return Ok(group.map(GraphObject::into_group));
        }

        self.find_group_by_name(identity).await
    }

    async fn find_object(&self, identity: &str) -> Result<Option<DirectoryNode>> {
        if is_object_id(identity) {
            let endpoint = format!("directoryObjects/{}", identity);
            let object: Option<GraphObject> = self.client.get_optional(&endpoint).await?;
            return Ok(object.and_then(GraphObject::into_node));
        }

        // users/{upn} resolves UPNs directly; mail is caught by the filters below
        if identity.contains('@') {
            let endpoint = format!(
                "users/{}?$select={}",
                urlencoding::encode(identity),
                MEMBER_SELECT
            );
            let user: Option<GraphObject> = self.client.get_optional(&endpoint).await?;
            if let Some(user) = user {
                return Ok(Some(DirectoryNode::User(UserEntry {
                    display_name: user.display_name(),
                    id: user.id,
                    user_principal_name: user.user_principal_name,
                    mail: user.mail,
                })));
            }
        }

        if let Some(group) = self.find_group_by_name(identity).await? {
            return Ok(Some(DirectoryNode::Group(group)));
        }

        Ok(self
            .find_user_by_name(identity)
            .await?
            .map(DirectoryNode::User))
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<DirectoryNode>> {
        let endpoint = format!("groups/{}/members?$select={}", group_id, MEMBER_SELECT);
        let objects: Vec<GraphObject> = self.client.get_all_pages(&endpoint).await?;
        Ok(objects.into_iter().filter_map(GraphObject::into_node).collect())
    }

    async fn parent_groups(&self, node_id: &str) -> Result<Vec<GroupEntry>> {
        let endpoint = format!(
            "directoryObjects/{}/memberOf?$select={}",
            node_id, GROUP_SELECT
        );
        let objects: Vec<GraphObject> = self.client.get_all_pages(&endpoint).await?;
        Ok(objects
            .into_iter()
            .filter(|o| o.odata_type.as_deref() == Some(GROUP_TYPE))
            .map(GraphObject::into_group)
            .collect())
    }

    async fn set_group_scope(&mut self, group_id: &str, target: GroupScope) -> Result<()> {
        Err(DirctlError::Unsupported(format!(
            "Entra ID has no group scope; convert {} to {} in on-premises Active Directory",
            group_id, target
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_object_id() {
        assert!(is_object_id("0f8fad5b-d9cb-469f-a165-70867728950e"));
        assert!(!is_object_id("GG-Finance"));
        assert!(!is_object_id("0f8fad5b-d9cb-469f-a165-70867728950"));
        assert!(!is_object_id("zf8fad5b-d9cb-469f-a165-70867728950e"));
    }

    #[test]
    fn test_odata_literal_escapes_quotes() {
        assert_eq!(odata_literal("O'Brien"), "%27O%27%27Brien%27");
        assert_eq!(odata_literal("GG Finance"), "%27GG%20Finance%27");
    }

    #[test]
    fn test_into_node_filters_other_object_types() {
        let device: GraphObject = serde_json::from_value(serde_json::json!({
            "@odata.type": "#microsoft.graph.device",
            "id": "d1",
            "displayName": "LAPTOP-01"
        }))
        .unwrap();
        assert!(device.into_node().is_none());

        let user: GraphObject = serde_json::from_value(serde_json::json!({
            "@odata.type": "#microsoft.graph.user",
            "id": "u1",
            "userPrincipalName": "alice@contoso.com"
        }))
        .unwrap();
        let node = user.into_node().unwrap();
        assert_eq!(node.display_name(), "alice@contoso.com");
    }
}
