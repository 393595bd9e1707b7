//! Running a scope conversion batch through the gate
//!
//! [`ConflictGate`] drives a batch through gather, decision and commit,
//! writing an action log entry for every step. Mutations only happen in
//! [`ConflictGate::execute`], and only for what the [`ResolutionPlan`] names.

use super::gate::{
    CandidateCheck, DependencyChange, GateAnalysis, Resolution, ResolutionPlan, ScopeRequest,
    analyze, relation_conflicts,
};
use crate::audit::{ActionEntry, ActionKind, ActionLog, GateStage};
use crate::directory::{DirectoryProvider, GroupEntry, GroupScope};
use crate::error::Result;
use std::collections::HashSet;
use std::fmt;

/// Final state of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Converted,
    Skipped,
    Failed,
    NotApplicable,
    NotFound,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Converted => "Converted",
            Outcome::Skipped => "Skipped",
            Outcome::Failed => "Failed",
            Outcome::NotApplicable => "NotApplicable",
            Outcome::NotFound => "NotFound",
        }
    }

    fn action(&self) -> ActionKind {
        match self {
            Outcome::Converted => ActionKind::Converted,
            Outcome::Skipped => ActionKind::Skipped,
            Outcome::Failed => ActionKind::Failed,
            Outcome::NotApplicable => ActionKind::NotApplicable,
            Outcome::NotFound => ActionKind::NotFound,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOutcome {
    pub identity: String,
    pub group: Option<GroupEntry>,
    pub before: Option<GroupScope>,
    pub target: GroupScope,
    pub outcome: Outcome,
    pub detail: String,
}

/// A blocking group converted (or not) ahead of the batch
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyOutcome {
    pub group: GroupEntry,
    pub target: GroupScope,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The operator picked Abort
    UserChoice,
    /// A blocking group could not be converted
    DependencyFailed(String),
    /// Converting the blocking groups would itself break nesting rules
    DependencyConflicts(usize),
    /// Conflicts were still present after converting blocking groups
    ConflictsRemain(usize),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::UserChoice => f.write_str("aborted by user"),
            AbortReason::DependencyFailed(e) => write!(f, "dependency conversion failed: {}", e),
            AbortReason::DependencyConflicts(n) => {
                write!(f, "{} conflict(s) block the dependency conversions", n)
            }
            AbortReason::ConflictsRemain(n) => {
                write!(f, "{} conflict(s) remain after resolving dependencies", n)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GateRun {
    /// One per candidate, in input order
    pub outcomes: Vec<CandidateOutcome>,
    pub dependencies: Vec<DependencyOutcome>,
    pub aborted: Option<AbortReason>,
}

impl GateRun {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }
}

struct Revalidation {
    remaining: usize,
    /// Candidate indices now at their target scope
    at_target: Vec<usize>,
}

pub struct ConflictGate<'a, P: DirectoryProvider> {
    provider: &'a mut P,
    log: &'a mut ActionLog,
    dry_run: bool,
}

impl<'a, P: DirectoryProvider> ConflictGate<'a, P> {
    pub fn new(provider: &'a mut P, log: &'a mut ActionLog) -> Self {
        Self {
            provider,
            log,
            dry_run: false,
        }
    }

    /// Plan and report without calling `set_group_scope`
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read every candidate and record what was found
    pub async fn gather(&mut self, requests: &[ScopeRequest]) -> Result<GateAnalysis> {
        let analysis = analyze(&*self.provider, requests).await;

        for candidate in &analysis.candidates {
            let mut entry = ActionEntry::new(GateStage::Gathered, ActionKind::Analyzed)
                .with_scopes(candidate.current_scope(), Some(candidate.target))
                .with_details(format!("{}: {}", candidate.identity, describe(&candidate.check)));
            if let Some(group) = &candidate.group {
                entry = entry.with_group(group);
            }
            self.log.record(entry)?;
        }

        for conflict in analysis.conflicts() {
            self.log.record(
                ActionEntry::new(GateStage::ConflictsDetected, ActionKind::ConflictFound)
                    .with_group(&conflict.subject)
                    .with_details(conflict.reason.clone()),
            )?;
        }

        Ok(analysis)
    }

    /// Turn a resolution into a plan and record the decision
    pub fn decide(
        &mut self,
        analysis: &GateAnalysis,
        resolution: Resolution,
    ) -> Result<ResolutionPlan> {
        let plan = super::gate::plan(analysis, resolution);
        let details = if analysis.has_conflicts() {
            resolution.to_string()
        } else {
            "No conflicts".to_string()
        };
        self.log
            .record(ActionEntry::new(GateStage::Decision, ActionKind::Decided).with_details(details))?;
        Ok(plan)
    }

    /// The operator declined at the final confirmation
    pub fn cancel(&mut self) -> Result<ResolutionPlan> {
        self.log.record(
            ActionEntry::new(GateStage::Decision, ActionKind::Decided)
                .with_details("Declined at confirmation"),
        )?;
        Ok(ResolutionPlan::Abort {
            conflicts: Vec::new(),
        })
    }

    /// Apply `plan`. Per-candidate failures become `Failed` outcomes; only
    /// action log write errors are returned as `Err`.
    pub async fn execute(
        &mut self,
        analysis: &GateAnalysis,
        plan: &ResolutionPlan,
    ) -> Result<GateRun> {
        let mut run = GateRun::default();

        let (dependencies, convert, skip) = match plan {
            ResolutionPlan::Abort { .. } => {
                run.aborted = Some(AbortReason::UserChoice);
                return self.finish(analysis, &[], &[], &[], run).await;
            }
            ResolutionPlan::Proceed {
                dependencies,
                convert,
                skip,
            } => (dependencies, convert.as_slice(), skip.as_slice()),
        };

        if let Some(reason) = self.check_dependencies(dependencies).await? {
            run.aborted = Some(reason);
            return self.finish(analysis, &[], &[], skip, run).await;
        }

        for dependency in dependencies {
            if self.dry_run {
                self.log.record(
                    ActionEntry::new(GateStage::Resolved, ActionKind::Skipped)
                        .with_group(&dependency.group)
                        .with_scopes(dependency.group.scope, Some(dependency.target))
                        .with_details("Dry run: dependency would be converted"),
                )?;
                run.dependencies.push(DependencyOutcome {
                    group: dependency.group.clone(),
                    target: dependency.target,
                    error: None,
                });
                continue;
            }

            let result = self
                .provider
                .set_group_scope(&dependency.group.id, dependency.target)
                .await;
            let entry = ActionEntry::new(GateStage::Resolved, ActionKind::DependencyConverted)
                .with_group(&dependency.group)
                .with_scopes(dependency.group.scope, Some(dependency.target));

            match result {
                Ok(()) => {
                    self.log.record(entry)?;
                    run.dependencies.push(DependencyOutcome {
                        group: dependency.group.clone(),
                        target: dependency.target,
                        error: None,
                    });
                }
                Err(e) => {
                    let message = format!("{}: {}", dependency.group.display_name, e);
                    self.log.record(entry.with_error(e.to_string()))?;
                    run.dependencies.push(DependencyOutcome {
                        group: dependency.group.clone(),
                        target: dependency.target,
                        error: Some(e.to_string()),
                    });
                    run.aborted = Some(AbortReason::DependencyFailed(message));
                    return self.finish(analysis, &[], &[], skip, run).await;
                }
            }
        }

        if dependencies.is_empty() || self.dry_run {
            return self.finish(analysis, convert, &[], skip, run).await;
        }

        let revalidation = self.revalidate(analysis, convert, dependencies).await?;
        if revalidation.remaining > 0 {
            run.aborted = Some(AbortReason::ConflictsRemain(revalidation.remaining));
            return self.finish(analysis, &[], &[], skip, run).await;
        }

        let convert: Vec<usize> = convert
            .iter()
            .copied()
            .filter(|i| !revalidation.at_target.contains(i))
            .collect();
        self.finish(analysis, &convert, &revalidation.at_target, skip, run)
            .await
    }

    /// Check every blocking group against its own relatives before any of
    /// them is touched. Returns the abort reason if one of them conflicts.
    async fn check_dependencies(
        &mut self,
        dependencies: &[DependencyChange],
    ) -> Result<Option<AbortReason>> {
        let mut blocked = 0;

        for dependency in dependencies {
            let entry = ActionEntry::new(GateStage::Resolved, ActionKind::ConflictFound)
                .with_group(&dependency.group)
                .with_scopes(dependency.group.scope, Some(dependency.target));

            match relation_conflicts(&*self.provider, &dependency.group, dependency.target).await {
                Ok(conflicts) => {
                    for conflict in &conflicts {
                        tracing::warn!("Dependency conflict: {}", conflict.reason);
                        self.log.record(entry.clone().with_error(conflict.reason.clone()))?;
                    }
                    blocked += conflicts.len();
                }
                Err(e) => {
                    let message = format!("{}: {}", dependency.group.display_name, e);
                    self.log.record(entry.with_error(e.to_string()))?;
                    return Ok(Some(AbortReason::DependencyFailed(message)));
                }
            }
        }

        Ok((blocked > 0).then_some(AbortReason::DependencyConflicts(blocked)))
    }

    /// Re-check the candidates about to be converted, and the blocking
    /// groups just converted, against live state
    async fn revalidate(
        &mut self,
        analysis: &GateAnalysis,
        convert: &[usize],
        dependencies: &[DependencyChange],
    ) -> Result<Revalidation> {
        let (indices, requests): (Vec<usize>, Vec<ScopeRequest>) = convert
            .iter()
            .filter_map(|&i| {
                let candidate = analysis.candidates.get(i)?;
                let group = candidate.group.as_ref()?;
                Some((
                    i,
                    ScopeRequest {
                        identity: group.id.clone(),
                        target: candidate.target,
                    },
                ))
            })
            .unzip();

        let fresh = analyze(&*self.provider, &requests).await;
        let mut reasons: Vec<String> = fresh.conflicts().map(|c| c.reason.clone()).collect();

        for dependency in dependencies {
            match relation_conflicts(&*self.provider, &dependency.group, dependency.target).await {
                Ok(conflicts) => reasons.extend(conflicts.into_iter().map(|c| c.reason)),
                Err(e) => reasons.push(format!(
                    "could not re-read '{}': {}",
                    dependency.group.display_name, e
                )),
            }
        }

        // Candidates that were also blocking groups are already converted
        let at_target: Vec<usize> = indices
            .iter()
            .zip(&fresh.candidates)
            .filter(|(_, c)| c.check == CandidateCheck::AlreadyAtTarget)
            .map(|(&i, _)| i)
            .collect();

        let entry = ActionEntry::new(GateStage::Resolved, ActionKind::Revalidated);
        if reasons.is_empty() {
            self.log.record(entry.with_details(format!(
                "{} candidate(s) and {} dependency(ies) clear",
                requests.len(),
                dependencies.len()
            )))?;
        } else {
            for reason in &reasons {
                tracing::warn!("Conflict remains: {}", reason);
            }
            self.log.record(
                entry.with_error(format!("{} conflict(s) remain after resolution", reasons.len())),
            )?;
        }

        Ok(Revalidation {
            remaining: reasons.len(),
            at_target,
        })
    }

    /// Commit `convert` and settle every other candidate. When the run is
    /// aborted `convert` is empty and planned conversions end up `Skipped`.
    async fn finish(
        &mut self,
        analysis: &GateAnalysis,
        convert: &[usize],
        at_target: &[usize],
        skip: &[usize],
        mut run: GateRun,
    ) -> Result<GateRun> {
        let convert: HashSet<usize> = convert.iter().copied().collect();
        let at_target: HashSet<usize> = at_target.iter().copied().collect();
        let skip: HashSet<usize> = skip.iter().copied().collect();

        for (index, candidate) in analysis.candidates.iter().enumerate() {
            let before = candidate.current_scope();

            let (outcome, detail) = if convert.contains(&index) {
                match &candidate.group {
                    Some(_) if self.dry_run => (
                        Outcome::Skipped,
                        format!("Dry run: would convert to {}", candidate.target),
                    ),
                    Some(group) => match self.provider.set_group_scope(&group.id, candidate.target).await {
                        Ok(()) => (
                            Outcome::Converted,
                            format!(
                                "{} -> {}",
                                before.map(|s| s.as_str()).unwrap_or("?"),
                                candidate.target
                            ),
                        ),
                        Err(e) => (Outcome::Failed, e.to_string()),
                    },
                    None => (Outcome::NotFound, "Group not found".to_string()),
                }
            } else if at_target.contains(&index) {
                (
                    Outcome::NotApplicable,
                    format!("Already {} after dependency conversion", candidate.target),
                )
            } else if skip.contains(&index) {
                let reasons: Vec<&str> = match &candidate.check {
                    CandidateCheck::Conflicting(conflicts) => {
                        conflicts.iter().map(|c| c.reason.as_str()).collect()
                    }
                    _ => Vec::new(),
                };
                (
                    Outcome::Skipped,
                    format!("Conflicting: {}", reasons.join("; ")),
                )
            } else {
                settle(&candidate.check, run.aborted.as_ref())
            };

            let mut entry = ActionEntry::new(GateStage::Committed, outcome.action())
                .with_scopes(before, Some(candidate.target));
            if let Some(group) = &candidate.group {
                entry = entry.with_group(group);
            }
            let entry = if outcome == Outcome::Failed {
                entry.with_error(detail.clone())
            } else {
                entry.with_details(detail.clone())
            };
            self.log.record(entry)?;

            run.outcomes.push(CandidateOutcome {
                identity: candidate.identity.clone(),
                group: candidate.group.clone(),
                before,
                target: candidate.target,
                outcome,
                detail,
            });
        }

        if let Some(reason) = &run.aborted {
            self.log.record(
                ActionEntry::new(GateStage::Committed, ActionKind::Aborted)
                    .with_details(reason.to_string()),
            )?;
        }

        Ok(run)
    }
}

/// Outcome for a candidate that is neither converted nor skipped for conflicts
fn settle(check: &CandidateCheck, aborted: Option<&AbortReason>) -> (Outcome, String) {
    match check {
        CandidateCheck::AlreadyAtTarget => {
            (Outcome::NotApplicable, "Already at target scope".to_string())
        }
        CandidateCheck::Duplicate => (
            Outcome::NotApplicable,
            "Listed earlier in this batch".to_string(),
        ),
        CandidateCheck::NotFound => (Outcome::NotFound, "Group not found".to_string()),
        CandidateCheck::UnknownScope => (
            Outcome::Failed,
            "Directory does not report a scope for this group".to_string(),
        ),
        CandidateCheck::LookupFailed(e) => (Outcome::Failed, e.clone()),
        CandidateCheck::Convertible | CandidateCheck::Conflicting(_) => {
            let reason = aborted.map(|r| r.to_string()).unwrap_or_default();
            (Outcome::Skipped, format!("Not converted: {}", reason))
        }
    }
}

fn describe(check: &CandidateCheck) -> String {
    match check {
        CandidateCheck::Convertible => "convertible".to_string(),
        CandidateCheck::Conflicting(c) => format!("{} conflict(s)", c.len()),
        CandidateCheck::AlreadyAtTarget => "already at target".to_string(),
        CandidateCheck::Duplicate => "duplicate".to_string(),
        CandidateCheck::NotFound => "not found".to_string(),
        CandidateCheck::UnknownScope => "scope unknown".to_string(),
        CandidateCheck::LookupFailed(e) => format!("lookup failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::{FlakyDirectory, directory, group, user};
    use GroupScope::{DomainLocal, Global, Universal};

    fn request(identity: &str, target: GroupScope) -> ScopeRequest {
        ScopeRequest {
            identity: identity.into(),
            target,
        }
    }

    async fn run(
        dir: &mut FlakyDirectory,
        requests: &[ScopeRequest],
        resolution: Resolution,
    ) -> (GateRun, ActionLog) {
        let mut log = ActionLog::in_memory();
        let mut gate = ConflictGate::new(dir, &mut log);
        let analysis = gate.gather(requests).await.unwrap();
        let plan = gate.decide(&analysis, resolution).unwrap();
        let run = gate.execute(&analysis, &plan).await.unwrap();
        (run, log)
    }

    async fn scope_of(dir: &FlakyDirectory, id: &str) -> Option<GroupScope> {
        dir.inner.get_group(id).await.unwrap().and_then(|g| g.scope)
    }

    /// A(Global) nested in P(Global); B(Universal) contains P
    fn tangled() -> FlakyDirectory {
        FlakyDirectory::new(directory(
            vec![user("u1", "Alice")],
            vec![
                group("a", "A", Some(Global), &["u1"]),
                group("p", "P", Some(Global), &["a"]),
                group("b", "B", Some(Universal), &["p"]),
            ],
        ))
    }

    #[tokio::test]
    async fn test_already_at_target_is_never_mutated() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("g1", "G1", Some(Global), &[]),
                group("g2", "G2", Some(Universal), &[]),
            ],
        ));

        let (run, log) = run(
            &mut dir,
            &[request("G1", Universal), request("G2", Universal)],
            Resolution::Abort,
        )
        .await;

        assert!(run.aborted.is_none());
        assert_eq!(run.outcomes[0].outcome, Outcome::Converted);
        assert_eq!(run.outcomes[1].outcome, Outcome::NotApplicable);
        assert_eq!(dir.scope_calls, vec![("g1".to_string(), Universal)]);
        assert_eq!(scope_of(&dir, "g1").await, Some(Universal));
        assert_eq!(log.count(ActionKind::Converted), 1);
        assert_eq!(log.count(ActionKind::NotApplicable), 1);
    }

    #[tokio::test]
    async fn test_abort_changes_nothing() {
        let mut dir = tangled();
        let (run, log) = run(&mut dir, &[request("A", Universal)], Resolution::Abort).await;

        assert_eq!(run.aborted, Some(AbortReason::UserChoice));
        assert!(dir.scope_calls.is_empty());
        assert_eq!(run.outcomes[0].outcome, Outcome::Skipped);
        assert_eq!(log.count(ActionKind::ConflictFound), 1);
        assert_eq!(log.count(ActionKind::Aborted), 1);
    }

    #[tokio::test]
    async fn test_skip_conflicting_converts_the_rest() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("c", "C", Some(Global), &[]),
                group("p", "P", Some(DomainLocal), &["a"]),
            ],
        ));

        let (run, _) = run(
            &mut dir,
            &[request("A", Universal), request("C", Universal)],
            Resolution::SkipConflicting,
        )
        .await;

        assert!(run.aborted.is_none());
        assert_eq!(run.outcomes[0].outcome, Outcome::Skipped);
        assert!(run.outcomes[0].detail.contains("DomainLocal"));
        assert_eq!(run.outcomes[1].outcome, Outcome::Converted);
        assert_eq!(dir.scope_calls, vec![("c".to_string(), Universal)]);
    }

    #[tokio::test]
    async fn test_resolve_dependencies_first_converts_blockers_then_batch() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("p", "P", Some(Global), &["a"]),
            ],
        ));

        let (run, log) = run(
            &mut dir,
            &[request("A", Universal)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        assert!(run.aborted.is_none());
        assert_eq!(
            dir.scope_calls,
            vec![("p".to_string(), Universal), ("a".to_string(), Universal)]
        );
        assert_eq!(run.dependencies.len(), 1);
        assert_eq!(run.outcomes[0].outcome, Outcome::Converted);
        assert_eq!(log.count(ActionKind::DependencyConverted), 1);
        assert_eq!(log.count(ActionKind::Revalidated), 1);
    }

    #[tokio::test]
    async fn test_failed_dependency_commits_no_candidates() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("c", "C", Some(Global), &[]),
                group("p", "P", Some(Global), &["a"]),
            ],
        ))
        .fail_scope_change_of("p");

        let (run, log) = run(
            &mut dir,
            &[request("A", Universal), request("C", Universal)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        assert!(matches!(run.aborted, Some(AbortReason::DependencyFailed(_))));
        assert_eq!(dir.scope_calls, vec![("p".to_string(), Universal)]);
        assert_eq!(run.count(Outcome::Converted), 0);
        assert_eq!(scope_of(&dir, "a").await, Some(Global));
        assert_eq!(scope_of(&dir, "c").await, Some(Global));
        assert_eq!(log.count(ActionKind::Aborted), 1);
    }

    #[tokio::test]
    async fn test_conflicting_dependency_aborts_before_any_change() {
        // Converting P for A's sake would nest a Universal P inside Global Q
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("p", "P", Some(Global), &["a"]),
                group("q", "Q", Some(Global), &["p"]),
            ],
        ));

        let (run, log) = run(
            &mut dir,
            &[request("A", Universal)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        assert_eq!(run.aborted, Some(AbortReason::DependencyConflicts(1)));
        assert!(dir.scope_calls.is_empty());
        assert_eq!(scope_of(&dir, "p").await, Some(Global));
        assert_eq!(run.outcomes[0].outcome, Outcome::Skipped);
        assert!(run.dependencies.is_empty());
        let blocked = log
            .entries()
            .iter()
            .find(|e| e.stage == GateStage::Resolved && e.action == ActionKind::ConflictFound)
            .unwrap();
        assert_eq!(blocked.group_id.as_deref(), Some("p"));
        assert!(!blocked.success);
    }

    #[tokio::test]
    async fn test_candidate_converted_as_dependency_is_not_applicable() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("p", "P", Some(Global), &["a"]),
            ],
        ));

        let (run, _) = run(
            &mut dir,
            &[request("A", Universal), request("P", Universal)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        assert!(run.aborted.is_none());
        assert_eq!(
            dir.scope_calls,
            vec![("p".to_string(), Universal), ("a".to_string(), Universal)]
        );
        assert_eq!(run.outcomes[0].outcome, Outcome::Converted);
        assert_eq!(run.outcomes[1].outcome, Outcome::NotApplicable);
        assert!(run.outcomes[1].detail.contains("dependency"));
    }

    #[tokio::test]
    async fn test_revalidation_checks_converted_dependencies() {
        // P must become Universal for A, M must become Global for B, and M contains P
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("p", "P", Some(Global), &["a"]),
                group("m", "M", Some(Universal), &["p"]),
                group("b", "B", Some(DomainLocal), &["m"]),
            ],
        ));

        let (run, _) = run(
            &mut dir,
            &[request("A", Universal), request("B", Global)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        assert_eq!(
            dir.scope_calls,
            vec![("p".to_string(), Universal), ("m".to_string(), Global)]
        );
        assert_eq!(run.aborted, Some(AbortReason::ConflictsRemain(2)));
        assert_eq!(run.count(Outcome::Converted), 0);
    }

    #[tokio::test]
    async fn test_revalidation_catches_conflicts_created_by_resolution() {
        let mut dir = tangled();

        // Converting P for A's sake makes P a Universal member of B
        let (run, _) = run(
            &mut dir,
            &[request("A", Universal), request("B", Global)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        assert_eq!(run.aborted, Some(AbortReason::ConflictsRemain(1)));
        assert_eq!(dir.scope_calls, vec![("p".to_string(), Universal)]);
        assert_eq!(run.count(Outcome::Converted), 0);
    }

    #[tokio::test]
    async fn test_candidate_failure_does_not_stop_batch() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("g1", "G1", Some(Global), &[]),
                group("g2", "G2", Some(Global), &[]),
            ],
        ))
        .fail_scope_change_of("g1");

        let (run, log) = run(
            &mut dir,
            &[request("G1", Universal), request("G2", Universal)],
            Resolution::Abort,
        )
        .await;

        assert_eq!(run.outcomes[0].outcome, Outcome::Failed);
        assert_eq!(run.outcomes[1].outcome, Outcome::Converted);
        let failed = log
            .entries()
            .iter()
            .find(|e| e.action == ActionKind::Failed)
            .unwrap();
        assert!(!failed.success);
    }

    #[tokio::test]
    async fn test_dry_run_never_mutates() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![
                group("a", "A", Some(Global), &[]),
                group("p", "P", Some(Global), &["a"]),
            ],
        ));

        let mut log = ActionLog::in_memory();
        let mut gate = ConflictGate::new(&mut dir, &mut log).dry_run(true);
        let analysis = gate.gather(&[request("A", Universal)]).await.unwrap();
        let plan = gate
            .decide(&analysis, Resolution::ResolveDependenciesFirst)
            .unwrap();
        let run = gate.execute(&analysis, &plan).await.unwrap();

        assert!(dir.scope_calls.is_empty());
        assert_eq!(run.outcomes[0].outcome, Outcome::Skipped);
        assert!(run.outcomes[0].detail.starts_with("Dry run"));
    }

    #[tokio::test]
    async fn test_not_found_and_unknown_scope_outcomes() {
        let mut dir = FlakyDirectory::new(directory(
            vec![],
            vec![group("cloud", "Cloud", None, &[])],
        ));

        let (run, _) = run(
            &mut dir,
            &[request("missing", Global), request("Cloud", Global)],
            Resolution::Abort,
        )
        .await;

        assert_eq!(run.outcomes[0].outcome, Outcome::NotFound);
        assert_eq!(run.outcomes[1].outcome, Outcome::Failed);
        assert!(dir.scope_calls.is_empty());
    }

    #[tokio::test]
    async fn test_log_stages_follow_workflow_order() {
        let mut dir = tangled();
        let (_, log) = run(
            &mut dir,
            &[request("A", Universal)],
            Resolution::ResolveDependenciesFirst,
        )
        .await;

        let stages: Vec<GateStage> = log.entries().iter().map(|e| e.stage).collect();
        let mut sorted = stages.clone();
        sorted.sort_by_key(|s| *s as u8);
        assert_eq!(stages, sorted);
        assert_eq!(stages.first(), Some(&GateStage::Gathered));
        assert_eq!(stages.last(), Some(&GateStage::Committed));
    }
}
