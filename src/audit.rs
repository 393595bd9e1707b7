//! Append-only action log for directory mutations
//!
//! Every decision and mutation made while converting group scopes is written
//! as one JSON object per line and flushed immediately, so an interrupted run
//! leaves a readable record of exactly what was changed. Entries from one
//! invocation share a `run_id`.

use crate::directory::{GroupEntry, GroupScope};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where in the conversion workflow an entry was written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GateStage {
    Gathered,
    ConflictsDetected,
    Decision,
    Resolved,
    Committed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Candidate looked up and classified
    Analyzed,
    /// A related group blocks a candidate
    ConflictFound,
    /// Resolution chosen
    Decided,
    /// Blocking group converted ahead of the batch
    DependencyConverted,
    /// Conflicts re-checked after dependency conversion
    Revalidated,
    Converted,
    Skipped,
    NotApplicable,
    NotFound,
    Failed,
    Aborted,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Analyzed => "Analyzed",
            ActionKind::ConflictFound => "Conflict Found",
            ActionKind::Decided => "Decided",
            ActionKind::DependencyConverted => "Dependency Converted",
            ActionKind::Revalidated => "Revalidated",
            ActionKind::Converted => "Converted",
            ActionKind::Skipped => "Skipped",
            ActionKind::NotApplicable => "Not Applicable",
            ActionKind::NotFound => "Not Found",
            ActionKind::Failed => "Failed",
            ActionKind::Aborted => "Aborted",
        }
    }
}

/// A single action log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub id: String,
    pub run_id: String,
    /// RFC 3339, local time
    pub timestamp: String,
    pub stage: GateStage,
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<GroupScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<GroupScope>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ActionEntry {
    pub fn new(stage: GateStage, action: ActionKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: String::new(),
            timestamp: chrono::Local::now().to_rfc3339(),
            stage,
            action,
            group_id: None,
            group_name: None,
            before: None,
            after: None,
            success: true,
            details: None,
        }
    }

    pub fn with_group(mut self, group: &GroupEntry) -> Self {
        self.group_id = Some(group.id.clone());
        self.group_name = Some(group.display_name.clone());
        self
    }

    pub fn with_scopes(mut self, before: Option<GroupScope>, after: Option<GroupScope>) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.details = Some(error.into());
        self
    }
}

/// Action log for one run. Without a file it only keeps entries in memory.
pub struct ActionLog {
    run_id: String,
    path: Option<PathBuf>,
    file: Option<File>,
    entries: Vec<ActionEntry>,
}

impl ActionLog {
    /// Open `path` for appending, creating it and its directory if needed
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            run_id: generate_run_id(),
            path: Some(path.to_path_buf()),
            file: Some(file),
            entries: Vec::new(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            run_id: generate_run_id(),
            path: None,
            file: None,
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    /// Append an entry. The line is on disk before this returns.
    pub fn record(&mut self, mut entry: ActionEntry) -> Result<()> {
        entry.run_id = self.run_id.clone();

        if let Some(file) = self.file.as_mut() {
            let line = serde_json::to_string(&entry)?;
            writeln!(file, "{}", line)?;
            file.flush()?;
        }

        if entry.success {
            tracing::info!(
                "[{}] {} {}",
                entry.action.as_str(),
                entry.group_name.as_deref().unwrap_or("-"),
                entry.details.as_deref().unwrap_or("")
            );
        } else {
            tracing::warn!(
                "[{}] {} {}",
                entry.action.as_str(),
                entry.group_name.as_deref().unwrap_or("-"),
                entry.details.as_deref().unwrap_or("")
            );
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn count(&self, action: ActionKind) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}

fn generate_run_id() -> String {
    format!("run-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"))
}

/// Read back an action log, skipping lines that are not valid entries
/// (e.g. a line cut short by a crash)
pub fn read_entries(path: &Path) -> Result<Vec<ActionEntry>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finance() -> GroupEntry {
        GroupEntry {
            id: "g1".into(),
            display_name: "GG-Finance".into(),
            mail: None,
            scope: Some(GroupScope::Global),
        }
    }

    #[test]
    fn test_entry_builder() {
        let entry = ActionEntry::new(GateStage::Committed, ActionKind::Converted)
            .with_group(&finance())
            .with_scopes(Some(GroupScope::Global), Some(GroupScope::Universal));

        assert_eq!(entry.group_name.as_deref(), Some("GG-Finance"));
        assert_eq!(entry.after, Some(GroupScope::Universal));
        assert!(entry.success);

        let failed = entry.with_error("access denied");
        assert!(!failed.success);
        assert_eq!(failed.details.as_deref(), Some("access denied"));
    }

    #[test]
    fn test_in_memory_log_stamps_run_id() {
        let mut log = ActionLog::in_memory();
        log.record(ActionEntry::new(GateStage::Decision, ActionKind::Decided))
            .unwrap();
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].run_id, log.run_id());
        assert_eq!(log.count(ActionKind::Decided), 1);
        assert!(log.path().is_none());
    }

    #[test]
    fn test_entry_serializes_without_empty_fields() {
        let entry = ActionEntry::new(GateStage::Gathered, ActionKind::Analyzed);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["stage"], "gathered");
        assert_eq!(json["action"], "analyzed");
        assert!(json.get("group_id").is_none());
        assert!(json.get("before").is_none());
    }
}
