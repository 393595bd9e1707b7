//! End-to-end scope conversion against snapshot files on disk
//!
//! Runs the conflict gate over a `SnapshotDirectory` loaded from a temp
//! file and checks the written-back snapshot, the action log and the
//! member report.

use dirctl::audit::{self, ActionKind, ActionLog, GateStage};
use dirctl::directory::snapshot::Snapshot;
use dirctl::directory::{GroupScope, SnapshotDirectory};
use dirctl::report;
use dirctl::scope::{AbortReason, ConflictGate, Outcome, Resolution, ScopeRequest};
use dirctl::walker::{self, WalkOptions};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_snapshot(dir: &TempDir) -> PathBuf {
    let snapshot = json!({
        "name": "contoso.local",
        "users": [
            { "id": "u1", "displayName": "Alice Jones", "userPrincipalName": "alice@contoso.com" },
            { "id": "u2", "displayName": "Bob Smith", "samAccountName": "bsmith" }
        ],
        "groups": [
            { "id": "g-all", "displayName": "GG-AllStaff", "scope": "Global", "members": ["g-fin"] },
            { "id": "g-fin", "displayName": "GG-Finance", "scope": "Global", "members": ["u1"] },
            { "id": "g-sales", "displayName": "GG-Sales", "scope": "Global", "members": ["u2"] }
        ]
    });

    let path = dir.path().join("contoso.json");
    std::fs::write(&path, serde_json::to_string_pretty(&snapshot).unwrap()).unwrap();
    path
}

fn reload(path: &Path) -> Snapshot {
    let contents = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&contents).unwrap()
}

fn scope_of(snapshot: &Snapshot, id: &str) -> Option<GroupScope> {
    snapshot.groups.iter().find(|g| g.id == id).and_then(|g| g.scope)
}

fn requests(identities: &[&str]) -> Vec<ScopeRequest> {
    identities
        .iter()
        .map(|identity| ScopeRequest {
            identity: identity.to_string(),
            target: GroupScope::Universal,
        })
        .collect()
}

#[tokio::test]
async fn test_resolve_dependencies_first_writes_snapshot_and_log() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(&temp);
    let log_path = temp.path().join("logs").join("scope-actions.jsonl");

    let mut directory = SnapshotDirectory::load(&snapshot_path).unwrap();
    let mut log = ActionLog::create(&log_path).unwrap();
    let run_id = log.run_id().to_string();

    let mut gate = ConflictGate::new(&mut directory, &mut log);
    let analysis = gate
        .gather(&requests(&["GG-Finance", "gg-sales"]))
        .await
        .unwrap();
    assert!(analysis.has_conflicts());

    let plan = gate
        .decide(&analysis, Resolution::ResolveDependenciesFirst)
        .unwrap();
    let run = gate.execute(&analysis, &plan).await.unwrap();
    drop(gate);

    assert!(run.aborted.is_none());
    assert_eq!(run.count(Outcome::Converted), 2);
    assert_eq!(run.dependencies.len(), 1);
    assert_eq!(run.dependencies[0].group.display_name, "GG-AllStaff");

    assert!(directory.save_if_dirty().unwrap());
    let saved = reload(&snapshot_path);
    assert_eq!(saved.name.as_deref(), Some("contoso.local"));
    assert_eq!(scope_of(&saved, "g-all"), Some(GroupScope::Universal));
    assert_eq!(scope_of(&saved, "g-fin"), Some(GroupScope::Universal));
    assert_eq!(scope_of(&saved, "g-sales"), Some(GroupScope::Universal));

    let entries = audit::read_entries(&log_path).unwrap();
    assert!(entries.iter().all(|e| e.run_id == run_id));

    let first_resolved = entries
        .iter()
        .position(|e| e.stage == GateStage::Resolved)
        .unwrap();
    let first_committed = entries
        .iter()
        .position(|e| e.stage == GateStage::Committed)
        .unwrap();
    assert!(first_resolved < first_committed);
    assert_eq!(entries[first_resolved].action, ActionKind::DependencyConverted);
    assert_eq!(entries[first_resolved].group_id.as_deref(), Some("g-all"));
    assert!(
        entries
            .iter()
            .any(|e| e.action == ActionKind::Revalidated && e.success)
    );
}

#[tokio::test]
async fn test_skip_conflicting_leaves_blocked_group_untouched() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(&temp);

    let mut directory = SnapshotDirectory::load(&snapshot_path).unwrap();
    let mut log = ActionLog::in_memory();

    let mut gate = ConflictGate::new(&mut directory, &mut log);
    let analysis = gate
        .gather(&requests(&["g-fin", "g-sales", "GG-Missing"]))
        .await
        .unwrap();
    let plan = gate
        .decide(&analysis, Resolution::SkipConflicting)
        .unwrap();
    let run = gate.execute(&analysis, &plan).await.unwrap();
    drop(gate);

    let outcomes: Vec<Outcome> = run.outcomes.iter().map(|o| o.outcome).collect();
    assert_eq!(
        outcomes,
        vec![Outcome::Skipped, Outcome::Converted, Outcome::NotFound]
    );
    assert!(run.outcomes[0].detail.contains("GG-AllStaff"));

    assert!(directory.save_if_dirty().unwrap());
    let saved = reload(&snapshot_path);
    assert_eq!(scope_of(&saved, "g-fin"), Some(GroupScope::Global));
    assert_eq!(scope_of(&saved, "g-all"), Some(GroupScope::Global));
    assert_eq!(scope_of(&saved, "g-sales"), Some(GroupScope::Universal));
    assert_eq!(log.count(ActionKind::Converted), 1);
}

#[tokio::test]
async fn test_dry_run_does_not_touch_snapshot() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(&temp);
    let before = std::fs::read_to_string(&snapshot_path).unwrap();

    let mut directory = SnapshotDirectory::load(&snapshot_path).unwrap();
    let mut log = ActionLog::in_memory();

    let mut gate = ConflictGate::new(&mut directory, &mut log).dry_run(true);
    let analysis = gate.gather(&requests(&["GG-Finance"])).await.unwrap();
    let plan = gate
        .decide(&analysis, Resolution::ResolveDependenciesFirst)
        .unwrap();
    let run = gate.execute(&analysis, &plan).await.unwrap();
    drop(gate);

    assert_eq!(run.count(Outcome::Converted), 0);
    assert!(run.outcomes[0].detail.starts_with("Dry run"));
    assert!(!directory.is_dirty());
    assert!(!directory.save_if_dirty().unwrap());
    assert_eq!(std::fs::read_to_string(&snapshot_path).unwrap(), before);
}

#[tokio::test]
async fn test_abort_records_and_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(&temp);
    let log_path = temp.path().join("actions.jsonl");

    let mut directory = SnapshotDirectory::load(&snapshot_path).unwrap();
    let mut log = ActionLog::create(&log_path).unwrap();

    let mut gate = ConflictGate::new(&mut directory, &mut log);
    let analysis = gate
        .gather(&requests(&["GG-Finance", "GG-Sales"]))
        .await
        .unwrap();
    let plan = gate.decide(&analysis, Resolution::Abort).unwrap();
    assert!(plan.is_abort());
    let run = gate.execute(&analysis, &plan).await.unwrap();
    drop(gate);

    assert!(run.aborted.is_some());
    assert_eq!(run.count(Outcome::Converted), 0);
    assert!(!directory.is_dirty());

    let entries = audit::read_entries(&log_path).unwrap();
    assert_eq!(
        entries.last().map(|e| e.action),
        Some(ActionKind::Aborted)
    );
}

#[tokio::test]
async fn test_member_report_from_snapshot_file() {
    let temp = TempDir::new().unwrap();
    let snapshot_path = write_snapshot(&temp);
    let directory = SnapshotDirectory::load(&snapshot_path).unwrap();

    let mut rows = Vec::new();
    for identity in ["GG-AllStaff", "GG-Retired"] {
        let outcome = walker::walk_root(&directory, identity, WalkOptions::default()).await;
        rows.extend(report::member_rows(&outcome));
    }
    let report_path = temp.path().join("reports").join("members.csv");
    report::write_rows(&report_path, &rows).unwrap();

    let csv = std::fs::read_to_string(&report_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[1],
        "GG-AllStaff,Member,Alice Jones,User,alice@contoso.com,u1,GG-Finance,GG-AllStaff > GG-Finance,2,"
    );
    assert_eq!(lines[2], "GG-Retired,NotFound,,,,,,,0,Group not found");
}

#[tokio::test]
async fn test_blocking_group_that_would_conflict_leaves_snapshot_unchanged() {
    let temp = TempDir::new().unwrap();
    let snapshot = json!({
        "groups": [
            { "id": "a", "displayName": "A", "scope": "Global" },
            { "id": "p", "displayName": "P", "scope": "Global", "members": ["a"] },
            { "id": "q", "displayName": "Q", "scope": "Global", "members": ["p"] }
        ]
    });
    let snapshot_path = temp.path().join("nested.json");
    std::fs::write(&snapshot_path, snapshot.to_string()).unwrap();

    let mut directory = SnapshotDirectory::load(&snapshot_path).unwrap();
    let mut log = ActionLog::in_memory();

    let mut gate = ConflictGate::new(&mut directory, &mut log);
    let analysis = gate.gather(&requests(&["A"])).await.unwrap();
    let plan = gate
        .decide(&analysis, Resolution::ResolveDependenciesFirst)
        .unwrap();
    let run = gate.execute(&analysis, &plan).await.unwrap();
    drop(gate);

    assert_eq!(run.aborted, Some(AbortReason::DependencyConflicts(1)));
    assert!(!directory.is_dirty());
    assert!(!directory.save_if_dirty().unwrap());
    let saved = reload(&snapshot_path);
    assert_eq!(scope_of(&saved, "p"), Some(GroupScope::Global));
    assert_eq!(scope_of(&saved, "a"), Some(GroupScope::Global));
}
