//! Directory model and provider abstraction
//!
//! Everything that reads or mutates a directory goes through
//! [`DirectoryProvider`]. Two backends exist:
//! - [`GraphDirectory`](crate::graph::directory::GraphDirectory) for Entra ID via Microsoft Graph
//! - [`SnapshotDirectory`] for JSON exports of on-premises Active Directory
//!
//! [`Directory`] picks one at runtime from a [`SourceSpec`].

pub mod snapshot;

pub use snapshot::SnapshotDirectory;

use crate::config::ConfigManager;
use crate::error::{DirctlError, Result};
use crate::graph::GraphClient;
use crate::graph::directory::GraphDirectory;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Active Directory group scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum GroupScope {
    Global,
    Universal,
    #[value(name = "domain-local", alias = "domainlocal")]
    DomainLocal,
}

impl GroupScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupScope::Global => "Global",
            GroupScope::Universal => "Universal",
            GroupScope::DomainLocal => "DomainLocal",
        }
    }
}

impl fmt::Display for GroupScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupScope {
    type Err = DirctlError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "global" => Ok(GroupScope::Global),
            "universal" => Ok(GroupScope::Universal),
            "domainlocal" => Ok(GroupScope::DomainLocal),
            _ => Err(DirctlError::Provider(format!("Unknown group scope '{}'", s))),
        }
    }
}

// AD exports spell scopes several ways ("DomainLocal", "domain_local"), so
// deserialization goes through FromStr rather than a fixed rename.
impl<'de> Deserialize<'de> for GroupScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for GroupScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A user account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub id: String,
    pub display_name: String,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
}

/// A group; `scope` is only known for groups mastered in Active Directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub id: String,
    pub display_name: String,
    pub mail: Option<String>,
    pub scope: Option<GroupScope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    User,
    Group,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::User => "User",
            NodeKind::Group => "Group",
        }
    }
}

/// A directory object as seen by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryNode {
    User(UserEntry),
    Group(GroupEntry),
}

impl DirectoryNode {
    pub fn id(&self) -> &str {
        match self {
            DirectoryNode::User(u) => &u.id,
            DirectoryNode::Group(g) => &g.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            DirectoryNode::User(u) => &u.display_name,
            DirectoryNode::Group(g) => &g.display_name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            DirectoryNode::User(_) => NodeKind::User,
            DirectoryNode::Group(_) => NodeKind::Group,
        }
    }

    /// UPN for users, mail for groups
    pub fn principal_name(&self) -> Option<&str> {
        match self {
            DirectoryNode::User(u) => u.user_principal_name.as_deref().or(u.mail.as_deref()),
            DirectoryNode::Group(g) => g.mail.as_deref(),
        }
    }

    pub fn as_group(&self) -> Option<&GroupEntry> {
        match self {
            DirectoryNode::Group(g) => Some(g),
            DirectoryNode::User(_) => None,
        }
    }
}

/// Read and write access to a directory.
///
/// Calls are awaited one at a time; implementations need not be `Sync`.
#[allow(async_fn_in_trait)]
pub trait DirectoryProvider {
    /// Short label used in logs and reports
    fn label(&self) -> String;

    /// Resolve a group by id, display name, mail or account name
    async fn get_group(&self, identity: &str) -> Result<Option<GroupEntry>>;

    /// Resolve any user or group by identity
    async fn find_object(&self, identity: &str) -> Result<Option<DirectoryNode>>;

    /// Direct members of a group, in directory order
    async fn group_members(&self, group_id: &str) -> Result<Vec<DirectoryNode>>;

    /// Groups that directly contain `node_id`
    async fn parent_groups(&self, node_id: &str) -> Result<Vec<GroupEntry>>;

    async fn set_group_scope(&mut self, group_id: &str, target: GroupScope) -> Result<()>;
}

/// Where directory data comes from, as given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Microsoft Graph, optionally for a tenant other than the active one
    Graph { tenant: Option<String> },
    /// JSON snapshot file
    Snapshot(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = DirctlError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DirctlError::Setup("Empty directory source".into()));
        }

        if s.eq_ignore_ascii_case("graph") {
            return Ok(SourceSpec::Graph { tenant: None });
        }

        if let Some(tenant) = s.strip_prefix("graph:") {
            if tenant.is_empty() {
                return Err(DirctlError::Setup(
                    "Expected a tenant name after 'graph:'".into(),
                ));
            }
            return Ok(SourceSpec::Graph {
                tenant: Some(tenant.to_string()),
            });
        }

        Ok(SourceSpec::Snapshot(PathBuf::from(s)))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Graph { tenant: None } => f.write_str("graph"),
            SourceSpec::Graph {
                tenant: Some(tenant),
            } => write!(f, "graph:{}", tenant),
            SourceSpec::Snapshot(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Runtime-selected directory backend
pub enum Directory {
    Graph(GraphDirectory),
    Snapshot(SnapshotDirectory),
}

impl Directory {
    /// Connect to the directory named by `spec`. Failures here are setup
    /// errors: nothing has been read or written yet.
    pub async fn open(spec: &SourceSpec, config: &ConfigManager) -> Result<Self> {
        match spec {
            SourceSpec::Graph { tenant } => {
                let tenant_name = config.resolve_tenant(tenant.as_deref())?.name;
                let client = GraphClient::from_config(config, &tenant_name).await?;
                Ok(Directory::Graph(GraphDirectory::new(client, tenant_name)))
            }
            SourceSpec::Snapshot(path) => Ok(Directory::Snapshot(SnapshotDirectory::load(path)?)),
        }
    }

    /// Write pending changes back to their store. Graph changes are applied
    /// immediately, so only snapshots have anything to flush.
    pub fn persist(&mut self) -> Result<bool> {
        match self {
            Directory::Graph(_) => Ok(false),
            Directory::Snapshot(snapshot) => snapshot.save_if_dirty(),
        }
    }
}

impl DirectoryProvider for Directory {
    fn label(&self) -> String {
        match self {
            Directory::Graph(d) => d.label(),
            Directory::Snapshot(d) => d.label(),
        }
    }

    async fn get_group(&self, identity: &str) -> Result<Option<GroupEntry>> {
        match self {
            Directory::Graph(d) => d.get_group(identity).await,
            Directory::Snapshot(d) => d.get_group(identity).await,
        }
    }

    async fn find_object(&self, identity: &str) -> Result<Option<DirectoryNode>> {
        match self {
            Directory::Graph(d) => d.find_object(identity).await,
            Directory::Snapshot(d) => d.find_object(identity).await,
        }
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<DirectoryNode>> {
        match self {
            Directory::Graph(d) => d.group_members(group_id).await,
            Directory::Snapshot(d) => d.group_members(group_id).await,
        }
    }

    async fn parent_groups(&self, node_id: &str) -> Result<Vec<GroupEntry>> {
        match self {
            Directory::Graph(d) => d.parent_groups(node_id).await,
            Directory::Snapshot(d) => d.parent_groups(node_id).await,
        }
    }

    async fn set_group_scope(&mut self, group_id: &str, target: GroupScope) -> Result<()> {
        match self {
            Directory::Graph(d) => d.set_group_scope(group_id, target).await,
            Directory::Snapshot(d) => d.set_group_scope(group_id, target).await,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_scope_parses_ad_spellings() {
        assert_eq!("Global".parse::<GroupScope>().unwrap(), GroupScope::Global);
        assert_eq!("universal".parse::<GroupScope>().unwrap(), GroupScope::Universal);
        assert_eq!(
            "DomainLocal".parse::<GroupScope>().unwrap(),
            GroupScope::DomainLocal
        );
        assert_eq!(
            "domain-local".parse::<GroupScope>().unwrap(),
            GroupScope::DomainLocal
        );
        assert!("builtin".parse::<GroupScope>().is_err());
    }

    #[test]
    fn test_group_scope_serde_uses_ad_names() {
        let json = serde_json::to_string(&GroupScope::DomainLocal).unwrap();
        assert_eq!(json, "\"DomainLocal\"");
        let back: GroupScope = serde_json::from_str("\"domain_local\"").unwrap();
        assert_eq!(back, GroupScope::DomainLocal);
    }

    #[test]
    fn test_source_spec_parsing() {
        assert_eq!(
            "graph".parse::<SourceSpec>().unwrap(),
            SourceSpec::Graph { tenant: None }
        );
        assert_eq!(
            "graph:CONTOSO".parse::<SourceSpec>().unwrap(),
            SourceSpec::Graph {
                tenant: Some("CONTOSO".into())
            }
        );
        assert_eq!(
            "exports/onprem.json".parse::<SourceSpec>().unwrap(),
            SourceSpec::Snapshot(PathBuf::from("exports/onprem.json"))
        );
        assert!("graph:".parse::<SourceSpec>().is_err());
        assert!("  ".parse::<SourceSpec>().is_err());
    }

    #[test]
    fn test_node_accessors() {
        let node = DirectoryNode::User(UserEntry {
            id: "u1".into(),
            display_name: "Alice".into(),
            user_principal_name: None,
            mail: Some("alice@contoso.com".into()),
        });
        assert_eq!(node.kind(), NodeKind::User);
        assert_eq!(node.principal_name(), Some("alice@contoso.com"));
        assert!(node.as_group().is_none());
    }
}
