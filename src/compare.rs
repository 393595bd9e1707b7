//! Existence comparison between two directories

use crate::directory::{DirectoryNode, DirectoryProvider};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Both,
    SourceOnly,
    TargetOnly,
    Neither,
    /// At least one lookup failed
    Error,
}

impl Presence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Presence::Both => "Both",
            Presence::SourceOnly => "SourceOnly",
            Presence::TargetOnly => "TargetOnly",
            Presence::Neither => "Neither",
            Presence::Error => "Error",
        }
    }

    pub fn from_lookups(in_source: bool, in_target: bool) -> Self {
        match (in_source, in_target) {
            (true, true) => Presence::Both,
            (true, false) => Presence::SourceOnly,
            (false, true) => Presence::TargetOnly,
            (false, false) => Presence::Neither,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub identity: String,
    pub status: Presence,
    pub source: Option<DirectoryNode>,
    pub target: Option<DirectoryNode>,
    pub detail: String,
}

/// Look every identity up in both directories, one call at a time
pub async fn compare<S, T>(source: &S, target: &T, identities: &[String]) -> Vec<Comparison>
where
    S: DirectoryProvider,
    T: DirectoryProvider,
{
    let mut rows = Vec::with_capacity(identities.len());

    for identity in identities {
        let in_source = source.find_object(identity).await;
        let in_target = target.find_object(identity).await;

        let row = match (in_source, in_target) {
            (Ok(s), Ok(t)) => Comparison {
                identity: identity.clone(),
                status: Presence::from_lookups(s.is_some(), t.is_some()),
                source: s,
                target: t,
                detail: String::new(),
            },
            (s, t) => {
                let mut errors = Vec::new();
                if let Err(e) = &s {
                    errors.push(format!("{}: {}", source.label(), e));
                }
                if let Err(e) = &t {
                    errors.push(format!("{}: {}", target.label(), e));
                }
                tracing::warn!("Comparison of '{}' failed: {}", identity, errors.join("; "));
                Comparison {
                    identity: identity.clone(),
                    status: Presence::Error,
                    source: s.ok().flatten(),
                    target: t.ok().flatten(),
                    detail: errors.join("; "),
                }
            }
        };
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::GroupScope;
    use crate::directory::testing::{FlakyDirectory, directory, group, user};

    #[tokio::test]
    async fn test_presence_classification() {
        let onprem = directory(
            vec![user("u1", "Alice")],
            vec![
                group("g1", "GG-Finance", Some(GroupScope::Global), &[]),
                group("g2", "GG-Legacy", Some(GroupScope::Global), &[]),
            ],
        );
        let cloud = directory(
            vec![user("c1", "Alice")],
            vec![
                group("c2", "GG-Finance", None, &[]),
                group("c3", "Teams-Only", None, &[]),
            ],
        );

        let identities: Vec<String> = ["GG-Finance", "GG-Legacy", "Teams-Only", "nobody", "alice"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = compare(&onprem, &cloud, &identities).await;

        let statuses: Vec<Presence> = rows.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                Presence::Both,
                Presence::SourceOnly,
                Presence::TargetOnly,
                Presence::Neither,
                Presence::Both
            ]
        );
        assert_eq!(rows[0].target.as_ref().map(|n| n.id()), Some("c2"));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_error_row() {
        struct Broken;
        impl DirectoryProvider for Broken {
            fn label(&self) -> String {
                "broken".into()
            }
            async fn get_group(&self, _: &str) -> crate::error::Result<Option<crate::directory::GroupEntry>> {
                Ok(None)
            }
            async fn find_object(&self, _: &str) -> crate::error::Result<Option<DirectoryNode>> {
                Err(crate::error::DirctlError::Provider("timeout".into()))
            }
            async fn group_members(&self, _: &str) -> crate::error::Result<Vec<DirectoryNode>> {
                Ok(Vec::new())
            }
            async fn parent_groups(&self, _: &str) -> crate::error::Result<Vec<crate::directory::GroupEntry>> {
                Ok(Vec::new())
            }
            async fn set_group_scope(&mut self, _: &str, _: GroupScope) -> crate::error::Result<()> {
                Ok(())
            }
        }

        let source = FlakyDirectory::new(directory(vec![user("u1", "Alice")], vec![]));
        let rows = compare(&source, &Broken, &["Alice".to_string()]).await;
        assert_eq!(rows[0].status, Presence::Error);
        assert!(rows[0].detail.contains("broken: "));
        assert!(rows[0].source.is_some());
    }
}
