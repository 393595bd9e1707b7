//! Conflict detection and resolution planning for scope conversion
//!
//! Nothing in this module mutates the directory. [`analyze`] reads the
//! current state of every candidate and its relatives; [`plan`] turns that
//! analysis plus a [`Resolution`] into a [`ResolutionPlan`].

use crate::directory::{DirectoryProvider, GroupEntry, GroupScope};
use crate::error::Result;
use std::collections::HashSet;
use std::fmt;

/// How a conflicting group relates to the group being converted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The conflicting group contains the subject
    ParentOf,
    /// The conflicting group is nested in the subject
    MemberOf,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::ParentOf => f.write_str("parent of"),
            Relation::MemberOf => f.write_str("member of"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeConflict {
    pub subject: GroupEntry,
    pub conflicting: GroupEntry,
    pub relation: Relation,
    pub reason: String,
}

/// Whether a relative with `related_scope` blocks converting to `target`
pub fn conflict_reason(
    target: GroupScope,
    relation: Relation,
    related_scope: GroupScope,
) -> Option<&'static str> {
    match (target, relation, related_scope) {
        (GroupScope::Global, Relation::MemberOf, GroupScope::Universal) => {
            Some("a Global group cannot contain a Universal group")
        }
        (GroupScope::Universal, Relation::ParentOf, GroupScope::Global) => {
            Some("a Universal group cannot be nested in a Global group")
        }
        (GroupScope::Universal, Relation::ParentOf, GroupScope::DomainLocal) => {
            Some("a Universal group cannot be nested in a DomainLocal group")
        }
        _ => None,
    }
}

/// Check one subject against its parents and member groups.
/// Relatives whose scope is unknown never conflict.
pub fn detect_conflicts(
    subject: &GroupEntry,
    target: GroupScope,
    parents: &[GroupEntry],
    member_groups: &[GroupEntry],
) -> Vec<ScopeConflict> {
    let related = parents
        .iter()
        .map(|g| (g, Relation::ParentOf))
        .chain(member_groups.iter().map(|g| (g, Relation::MemberOf)));

    related
        .filter_map(|(group, relation)| {
            let scope = group.scope?;
            conflict_reason(target, relation, scope).map(|reason| ScopeConflict {
                subject: subject.clone(),
                conflicting: group.clone(),
                relation,
                reason: format!(
                    "'{}' ({}) is {} '{}': {}",
                    group.display_name, scope, relation, subject.display_name, reason
                ),
            })
        })
        .collect()
}

/// One requested conversion, as read from input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRequest {
    pub identity: String,
    pub target: GroupScope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateCheck {
    /// Can be converted as-is
    Convertible,
    /// Blocked by one or more relatives
    Conflicting(Vec<ScopeConflict>),
    AlreadyAtTarget,
    /// Same group listed earlier in the batch
    Duplicate,
    NotFound,
    /// The directory does not report a scope for this group
    UnknownScope,
    /// Group or relationships could not be read
    LookupFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identity: String,
    pub target: GroupScope,
    pub group: Option<GroupEntry>,
    pub check: CandidateCheck,
}

impl Candidate {
    pub fn current_scope(&self) -> Option<GroupScope> {
        self.group.as_ref().and_then(|g| g.scope)
    }

    pub fn needs_conversion(&self) -> bool {
        matches!(
            self.check,
            CandidateCheck::Convertible | CandidateCheck::Conflicting(_)
        )
    }
}

/// Result of gathering state for a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateAnalysis {
    pub candidates: Vec<Candidate>,
}

impl GateAnalysis {
    pub fn conflicts(&self) -> impl Iterator<Item = &ScopeConflict> {
        self.candidates.iter().flat_map(|c| match &c.check {
            CandidateCheck::Conflicting(conflicts) => conflicts.as_slice(),
            _ => &[],
        })
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicts().next().is_some()
    }

    /// Groups blocking the batch, each listed once, paired with the scope
    /// they would need. The first candidate a group blocks decides its target.
    pub fn blocking_groups(&self) -> Vec<(GroupEntry, GroupScope)> {
        let mut seen = HashSet::new();
        let mut blocking = Vec::new();

        for candidate in &self.candidates {
            if let CandidateCheck::Conflicting(conflicts) = &candidate.check {
                for conflict in conflicts {
                    if seen.insert(conflict.conflicting.id.clone()) {
                        blocking.push((conflict.conflicting.clone(), candidate.target));
                    }
                }
            }
        }

        blocking
    }

    /// Candidates that would be mutated if nothing stood in the way
    pub fn pending(&self) -> usize {
        self.candidates.iter().filter(|c| c.needs_conversion()).count()
    }
}

/// Read every candidate and the relatives its target scope cares about.
///
/// Per-candidate read failures are recorded on the candidate; they do not
/// stop the analysis.
pub async fn analyze<P: DirectoryProvider>(provider: &P, requests: &[ScopeRequest]) -> GateAnalysis {
    let mut seen_ids = HashSet::new();
    let mut candidates = Vec::with_capacity(requests.len());

    for request in requests {
        let (group, check) = match provider.get_group(&request.identity).await {
            Err(e) => {
                tracing::warn!("Lookup of '{}' failed: {}", request.identity, e);
                (None, CandidateCheck::LookupFailed(e.to_string()))
            }
            Ok(None) => (None, CandidateCheck::NotFound),
            Ok(Some(group)) => {
                let check = if !seen_ids.insert(group.id.clone()) {
                    CandidateCheck::Duplicate
                } else {
                    check_group(provider, &group, request.target).await
                };
                (Some(group), check)
            }
        };

        candidates.push(Candidate {
            identity: request.identity.clone(),
            target: request.target,
            group,
            check,
        });
    }

    GateAnalysis { candidates }
}

async fn check_group<P: DirectoryProvider>(
    provider: &P,
    group: &GroupEntry,
    target: GroupScope,
) -> CandidateCheck {
    let Some(current) = group.scope else {
        return CandidateCheck::UnknownScope;
    };

    if current == target {
        return CandidateCheck::AlreadyAtTarget;
    }

    match relation_conflicts(provider, group, target).await {
        Ok(conflicts) if conflicts.is_empty() => CandidateCheck::Convertible,
        Ok(conflicts) => CandidateCheck::Conflicting(conflicts),
        Err(e) => {
            tracing::warn!("Could not read relatives of '{}': {}", group.display_name, e);
            CandidateCheck::LookupFailed(e.to_string())
        }
    }
}

/// Conflicts `group` would have at `target`, read from live provider state.
/// Does not look at the group's current scope.
pub async fn relation_conflicts<P: DirectoryProvider>(
    provider: &P,
    group: &GroupEntry,
    target: GroupScope,
) -> Result<Vec<ScopeConflict>> {
    let (parents, member_groups) = match target {
        GroupScope::DomainLocal => return Ok(Vec::new()),
        GroupScope::Universal => (provider.parent_groups(&group.id).await?, Vec::new()),
        GroupScope::Global => {
            let groups = provider
                .group_members(&group.id)
                .await?
                .iter()
                .filter_map(|m| m.as_group().cloned())
                .collect();
            (Vec::new(), groups)
        }
    };

    Ok(detect_conflicts(group, target, &parents, &member_groups))
}

/// What to do when a batch has conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Resolution {
    /// Change nothing
    Abort,
    /// Leave conflicting groups out of the batch
    #[value(name = "skip")]
    SkipConflicting,
    /// Convert the blocking groups first, then the whole batch
    #[value(name = "resolve")]
    ResolveDependenciesFirst,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Abort => "Abort",
            Resolution::SkipConflicting => "Skip conflicting groups",
            Resolution::ResolveDependenciesFirst => "Resolve dependencies first",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blocking group to convert before the batch
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyChange {
    pub group: GroupEntry,
    pub target: GroupScope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionPlan {
    /// Perform no mutation
    Abort { conflicts: Vec<ScopeConflict> },
    Proceed {
        /// Converted first, all-or-nothing
        dependencies: Vec<DependencyChange>,
        /// Candidate indices to convert
        convert: Vec<usize>,
        /// Candidate indices left out because of conflicts
        skip: Vec<usize>,
    },
}

impl ResolutionPlan {
    pub fn is_abort(&self) -> bool {
        matches!(self, ResolutionPlan::Abort { .. })
    }
}

/// Decide what to mutate. Without conflicts the resolution is irrelevant and
/// every convertible candidate proceeds.
pub fn plan(analysis: &GateAnalysis, resolution: Resolution) -> ResolutionPlan {
    let indices = |pred: fn(&CandidateCheck) -> bool| -> Vec<usize> {
        analysis
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| pred(&c.check))
            .map(|(i, _)| i)
            .collect()
    };
    let convertible = indices(|c| matches!(c, CandidateCheck::Convertible));
    let conflicting = indices(|c| matches!(c, CandidateCheck::Conflicting(_)));

    if conflicting.is_empty() {
        return ResolutionPlan::Proceed {
            dependencies: Vec::new(),
            convert: convertible,
            skip: Vec::new(),
        };
    }

    match resolution {
        Resolution::Abort => ResolutionPlan::Abort {
            conflicts: analysis.conflicts().cloned().collect(),
        },
        Resolution::SkipConflicting => ResolutionPlan::Proceed {
            dependencies: Vec::new(),
            convert: convertible,
            skip: conflicting,
        },
        Resolution::ResolveDependenciesFirst => {
            let dependencies = analysis
                .blocking_groups()
                .into_iter()
                .map(|(group, target)| DependencyChange { group, target })
                .collect();
            let mut convert: Vec<usize> = convertible.into_iter().chain(conflicting).collect();
            convert.sort_unstable();
            ResolutionPlan::Proceed {
                dependencies,
                convert,
                skip: Vec::new(),
            }
        }
    }
}
