//! Recursive group membership resolution
//!
//! Flattens a group hierarchy into one row per reachable member, tolerating
//! membership cycles. Two independent sets drive the walk:
//! - `visited_groups`: a group is expanded at most once, which bounds the walk
//!   by the number of groups in the directory even when nesting is cyclic
//! - `seen_member_ids`: with de-duplication on, a member reached again through
//!   another nested group is not reported twice (its group is still entered)
//!
//! The walk is depth-first and pre-order, so results appear in the same order
//! a recursive expansion would produce them. An explicit frame stack stands in
//! for recursion; every directory call is awaited before the next is issued.

use crate::directory::{DirectoryNode, DirectoryProvider, GroupEntry};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Report each member only once, keeping the first path it was found on
    pub deduplicate: bool,
    /// Also report nested groups themselves, not just the users below them
    pub include_groups: bool,
}

/// One reachable member and how it was reached
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalResult {
    pub node: DirectoryNode,
    pub direct_parent: GroupEntry,
    /// Group display names from the root down to `direct_parent`
    pub hierarchy_path: Vec<String>,
}

impl TraversalResult {
    pub fn path_string(&self) -> String {
        self.hierarchy_path.join(" > ")
    }

    /// 1 for direct members of the root
    pub fn depth(&self) -> usize {
        self.hierarchy_path.len()
    }
}

/// A group that was reached again after it had already been expanded
#[derive(Debug, Clone)]
pub struct Revisit {
    pub group: GroupEntry,
    pub via: Vec<String>,
    /// The group is an ancestor on the current path, i.e. nesting loops back
    pub cyclic: bool,
}

/// A group whose members could not be read; its subtree is missing
#[derive(Debug, Clone)]
pub struct BranchFailure {
    pub group: GroupEntry,
    pub via: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct WalkReport {
    pub root: GroupEntry,
    pub results: Vec<TraversalResult>,
    pub revisits: Vec<Revisit>,
    pub failures: Vec<BranchFailure>,
    pub groups_expanded: usize,
}

impl WalkReport {
    pub fn user_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.node, DirectoryNode::User(_)))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Frame {
    group: GroupEntry,
    path: Vec<String>,
    members: std::vec::IntoIter<DirectoryNode>,
}

/// Traversal state for a single walk. Dropped when the walk finishes.
struct Walk<'a, P> {
    provider: &'a P,
    options: WalkOptions,
    visited_groups: HashSet<String>,
    seen_member_ids: HashSet<String>,
    stack: Vec<Frame>,
    report: WalkReport,
}

/// Resolve every member reachable from `root`.
///
/// Never fails as a whole: unreadable groups are recorded in
/// [`WalkReport::failures`] and the rest of the hierarchy is still walked.
pub async fn walk<P: DirectoryProvider>(
    provider: &P,
    root: &GroupEntry,
    options: WalkOptions,
) -> WalkReport {
    let mut walk = Walk {
        provider,
        options,
        visited_groups: HashSet::new(),
        seen_member_ids: HashSet::new(),
        stack: Vec::new(),
        report: WalkReport {
            root: root.clone(),
            results: Vec::new(),
            revisits: Vec::new(),
            failures: Vec::new(),
            groups_expanded: 0,
        },
    };

    walk.run().await;
    walk.report
}

/// Outcome of resolving one root identity and walking it
#[derive(Debug, Clone)]
pub enum RootWalk {
    Walked(WalkReport),
    NotFound(String),
    LookupFailed { identity: String, error: String },
}

/// Resolve `identity` to a group and walk it. A root that cannot be resolved
/// is reported, not returned as an error, so batches can carry on.
pub async fn walk_root<P: DirectoryProvider>(
    provider: &P,
    identity: &str,
    options: WalkOptions,
) -> RootWalk {
    match provider.get_group(identity).await {
        Ok(Some(root)) => RootWalk::Walked(walk(provider, &root, options).await),
        Ok(None) => {
            tracing::warn!("Group '{}' not found", identity);
            RootWalk::NotFound(identity.to_string())
        }
        Err(e) => {
            tracing::error!("Lookup of '{}' failed: {}", identity, e);
            RootWalk::LookupFailed {
                identity: identity.to_string(),
                error: e.to_string(),
            }
        }
    }
}

impl<P: DirectoryProvider> Walk<'_, P> {
    async fn run(&mut self) {
        let root = self.report.root.clone();
        self.enter(root, Vec::new()).await;

        while let Some(frame) = self.stack.last_mut() {
            let Some(member) = frame.members.next() else {
                self.stack.pop();
                continue;
            };
            let parent = frame.group.clone();
            let path = frame.path.clone();

            match member {
                DirectoryNode::User(_) => self.record(member, parent, path),
                DirectoryNode::Group(ref group) => {
                    let group = group.clone();
                    if self.options.include_groups {
                        self.record(member, parent, path.clone());
                    }
                    self.enter(group, path).await;
                }
            }
        }

        tracing::debug!(
            "Walked '{}': {} results, {} groups expanded, {} revisits, {} failures",
            self.report.root.display_name,
            self.report.results.len(),
            self.report.groups_expanded,
            self.report.revisits.len(),
            self.report.failures.len()
        );
    }

    /// Expand `group` unless it has been expanded before
    async fn enter(&mut self, group: GroupEntry, parent_path: Vec<String>) {
        if self.visited_groups.contains(&group.id) {
            let cyclic = self.stack.iter().any(|f| f.group.id == group.id);
            if cyclic {
                tracing::warn!(
                    "Membership cycle: '{}' is nested inside itself via {}; not expanding again",
                    group.display_name,
                    parent_path.join(" > ")
                );
            } else {
                tracing::warn!(
                    "Group '{}' reached again via {}; already expanded",
                    group.display_name,
                    parent_path.join(" > ")
                );
            }
            self.report.revisits.push(Revisit {
                group,
                via: parent_path,
                cyclic,
            });
            return;
        }

        self.visited_groups.insert(group.id.clone());

        let mut path = parent_path;
        path.push(group.display_name.clone());

        match self.provider.group_members(&group.id).await {
            Ok(members) => {
                tracing::debug!("{}: {} direct members", path.join(" > "), members.len());
                self.report.groups_expanded += 1;
                self.stack.push(Frame {
                    group,
                    path,
                    members: members.into_iter(),
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read members of '{}': {}; skipping this branch",
                    group.display_name,
                    e
                );
                path.pop();
                self.report.failures.push(BranchFailure {
                    group,
                    via: path,
                    error: e.to_string(),
                });
            }
        }
    }

    fn record(&mut self, node: DirectoryNode, direct_parent: GroupEntry, hierarchy_path: Vec<String>) {
        if self.options.deduplicate && !self.seen_member_ids.insert(node.id().to_string()) {
            return;
        }

        self.report.results.push(TraversalResult {
            node,
            direct_parent,
            hierarchy_path,
        });
    }
}
