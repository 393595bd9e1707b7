//! JSON directory snapshots
//!
//! A snapshot is a point-in-time export of a directory, typically produced
//! from on-premises Active Directory:
//!
//! ```json
//! {
//!   "name": "contoso.local",
//!   "users": [
//!     { "id": "S-1-5-21-...-1104", "displayName": "Alice Jones",
//!       "userPrincipalName": "alice@contoso.com", "samAccountName": "ajones" }
//!   ],
//!   "groups": [
//!     { "id": "S-1-5-21-...-2201", "displayName": "GG-Finance", "scope": "Global",
//!       "members": ["S-1-5-21-...-1104"] }
//!   ]
//! }
//! ```
//!
//! Scope changes are applied in memory and written back with
//! [`SnapshotDirectory::save_if_dirty`].

use super::{DirectoryNode, DirectoryProvider, GroupEntry, GroupScope, UserEntry};
use crate::error::{DirctlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub users: Vec<SnapshotUser>,
    #[serde(default)]
    pub groups: Vec<SnapshotGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotUser {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sam_account_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotGroup {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<GroupScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sam_account_name: Option<String>,
    /// Member object ids, users or groups
    #[serde(default)]
    pub members: Vec<String>,
}

impl SnapshotUser {
    fn to_entry(&self) -> UserEntry {
        UserEntry {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            user_principal_name: self.user_principal_name.clone(),
            mail: self.mail.clone(),
        }
    }

    fn matches(&self, identity: &str) -> bool {
        self.id.eq_ignore_ascii_case(identity)
            || self.display_name.eq_ignore_ascii_case(identity)
            || eq_opt(&self.user_principal_name, identity)
            || eq_opt(&self.mail, identity)
            || eq_opt(&self.sam_account_name, identity)
    }
}

impl SnapshotGroup {
    fn to_entry(&self) -> GroupEntry {
        GroupEntry {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            mail: self.mail.clone(),
            scope: self.scope,
        }
    }

    fn matches(&self, identity: &str) -> bool {
        self.id.eq_ignore_ascii_case(identity)
            || self.display_name.eq_ignore_ascii_case(identity)
            || eq_opt(&self.mail, identity)
            || eq_opt(&self.sam_account_name, identity)
    }
}

fn eq_opt(value: &Option<String>, identity: &str) -> bool {
    value
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case(identity))
}

/// In-memory directory backed by a [`Snapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotDirectory {
    path: Option<PathBuf>,
    snapshot: Snapshot,
    users_by_id: HashMap<String, usize>,
    groups_by_id: HashMap<String, usize>,
    dirty: bool,
}

impl SnapshotDirectory {
    pub fn new(snapshot: Snapshot) -> Self {
        let users_by_id = snapshot
            .users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.id.clone(), i))
            .collect();
        let groups_by_id = snapshot
            .groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.clone(), i))
            .collect();

        Self {
            path: None,
            snapshot,
            users_by_id,
            groups_by_id,
            dirty: false,
        }
    }

    /// Load a snapshot file. A missing or malformed file is a setup error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DirctlError::Setup(format!(
                "Snapshot file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents).map_err(|e| {
            DirctlError::Setup(format!("Invalid snapshot {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            "Loaded snapshot {} ({} users, {} groups)",
            path.display(),
            snapshot.users.len(),
            snapshot.groups.len()
        );

        let mut directory = Self::new(snapshot);
        directory.path = Some(path.to_path_buf());
        Ok(directory)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the snapshot back to the file it was loaded from.
    /// Returns whether anything was written.
    pub fn save_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let Some(path) = &self.path else {
            return Ok(false);
        };

        // Write-then-rename so an interrupted save never truncates the export
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&self.snapshot)?;
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;

        tracing::info!("Saved snapshot changes to {}", path.display());
        self.dirty = false;
        Ok(true)
    }

    fn group(&self, id: &str) -> Option<&SnapshotGroup> {
        self.groups_by_id.get(id).map(|&i| &self.snapshot.groups[i])
    }

    fn node(&self, id: &str) -> Option<DirectoryNode> {
        if let Some(&i) = self.users_by_id.get(id) {
            return Some(DirectoryNode::User(self.snapshot.users[i].to_entry()));
        }
        self.group(id).map(|g| DirectoryNode::Group(g.to_entry()))
    }
}

impl DirectoryProvider for SnapshotDirectory {
    fn label(&self) -> String {
        match (&self.snapshot.name, &self.path) {
            (Some(name), _) => name.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => "snapshot".to_string(),
        }
    }

    async fn get_group(&self, identity: &str) -> Result<Option<GroupEntry>> {
        if let Some(group) = self.group(identity) {
            return Ok(Some(group.to_entry()));
        }
        Ok(self
            .snapshot
            .groups
            .iter()
            .find(|g| g.matches(identity))
            .map(SnapshotGroup::to_entry))
    }

    async fn find_object(&self, identity: &str) -> Result<Option<DirectoryNode>> {
        if let Some(node) = self.node(identity) {
            return Ok(Some(node));
        }
        if let Some(user) = self.snapshot.users.iter().find(|u| u.matches(identity)) {
            return Ok(Some(DirectoryNode::User(user.to_entry())));
        }
        Ok(self
            .snapshot
            .groups
            .iter()
            .find(|g| g.matches(identity))
            .map(|g| DirectoryNode::Group(g.to_entry())))
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<DirectoryNode>> {
        let group = self
            .group(group_id)
            .ok_or_else(|| DirctlError::GroupNotFound(group_id.to_string()))?;

        let mut members = Vec::with_capacity(group.members.len());
        for member_id in &group.members {
            match self.node(member_id) {
                Some(node) => members.push(node),
                None => tracing::warn!(
                    "Group '{}' references unknown member {}; ignoring",
                    group.display_name,
                    member_id
                ),
            }
        }
        Ok(members)
    }

    async fn parent_groups(&self, node_id: &str) -> Result<Vec<GroupEntry>> {
        Ok(self
            .snapshot
            .groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m == node_id))
            .map(SnapshotGroup::to_entry)
            .collect())
    }

    async fn set_group_scope(&mut self, group_id: &str, target: GroupScope) -> Result<()> {
        let index = *self
            .groups_by_id
            .get(group_id)
            .ok_or_else(|| DirctlError::GroupNotFound(group_id.to_string()))?;

        let group = &mut self.snapshot.groups[index];
        if group.scope != Some(target) {
            group.scope = Some(target);
            self.dirty = true;
        }
        Ok(())
    }
}
