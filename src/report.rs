//! CSV report rows and writers
//!
//! Every report has a fixed header line, written even when there are no rows
//! so that downstream tooling can rely on the columns.

use crate::compare::Comparison;
use crate::directory::{DirectoryNode, NodeKind};
use crate::error::Result;
use crate::graph::applications::CertificateExpiry;
use crate::graph::sharepoint::Site;
use crate::scope::CandidateOutcome;
use crate::walker::{BranchFailure, RootWalk, TraversalResult};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub trait ReportRow: Serialize {
    const HEADERS: &'static [&'static str];
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MemberRow {
    pub root_group: String,
    /// `Member`, or `NotFound`/`Error` for roots and branches that could not be read
    pub status: &'static str,
    pub member_name: String,
    pub member_type: &'static str,
    pub principal_name: String,
    pub member_id: String,
    pub direct_parent: String,
    pub hierarchy_path: String,
    pub depth: usize,
    pub detail: String,
}

impl ReportRow for MemberRow {
    const HEADERS: &'static [&'static str] = &[
        "RootGroup",
        "Status",
        "MemberName",
        "MemberType",
        "PrincipalName",
        "MemberId",
        "DirectParent",
        "HierarchyPath",
        "Depth",
        "Detail",
    ];
}

impl MemberRow {
    pub fn new(root_group: &str, result: &TraversalResult) -> Self {
        Self {
            root_group: root_group.to_string(),
            status: "Member",
            member_name: result.node.display_name().to_string(),
            member_type: result.node.kind().as_str(),
            principal_name: result.node.principal_name().unwrap_or_default().to_string(),
            member_id: result.node.id().to_string(),
            direct_parent: result.direct_parent.display_name.clone(),
            hierarchy_path: result.path_string(),
            depth: result.depth(),
            detail: String::new(),
        }
    }

    /// A nested group whose members could not be read
    pub fn failed_branch(root_group: &str, failure: &BranchFailure) -> Self {
        Self {
            root_group: root_group.to_string(),
            status: "Error",
            member_name: failure.group.display_name.clone(),
            member_type: NodeKind::Group.as_str(),
            principal_name: String::new(),
            member_id: failure.group.id.clone(),
            direct_parent: failure.via.last().cloned().unwrap_or_default(),
            hierarchy_path: failure.via.join(" > "),
            depth: failure.via.len(),
            detail: failure.error.clone(),
        }
    }

    /// A root identity that never resolved to a group
    pub fn unresolved(identity: &str, status: &'static str, detail: &str) -> Self {
        Self {
            root_group: identity.to_string(),
            status,
            member_name: String::new(),
            member_type: "",
            principal_name: String::new(),
            member_id: String::new(),
            direct_parent: String::new(),
            hierarchy_path: String::new(),
            depth: 0,
            detail: detail.to_string(),
        }
    }
}

/// Every report row for one root: its members, then any unreadable
/// branches. Unresolved roots get a single row.
pub fn member_rows(root: &RootWalk) -> Vec<MemberRow> {
    match root {
        RootWalk::Walked(walk) => {
            let name = &walk.root.display_name;
            walk.results
                .iter()
                .map(|r| MemberRow::new(name, r))
                .chain(walk.failures.iter().map(|f| MemberRow::failed_branch(name, f)))
                .collect()
        }
        RootWalk::NotFound(identity) => {
            vec![MemberRow::unresolved(identity, "NotFound", "Group not found")]
        }
        RootWalk::LookupFailed { identity, error } => {
            vec![MemberRow::unresolved(identity, "Error", error)]
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ScopeRow {
    pub identity: String,
    pub group_name: String,
    pub group_id: String,
    pub previous_scope: String,
    pub target_scope: String,
    pub outcome: &'static str,
    pub detail: String,
}

impl ReportRow for ScopeRow {
    const HEADERS: &'static [&'static str] = &[
        "Identity",
        "GroupName",
        "GroupId",
        "PreviousScope",
        "TargetScope",
        "Outcome",
        "Detail",
    ];
}

impl From<&CandidateOutcome> for ScopeRow {
    fn from(outcome: &CandidateOutcome) -> Self {
        Self {
            identity: outcome.identity.clone(),
            group_name: outcome
                .group
                .as_ref()
                .map(|g| g.display_name.clone())
                .unwrap_or_default(),
            group_id: outcome.group.as_ref().map(|g| g.id.clone()).unwrap_or_default(),
            previous_scope: outcome
                .before
                .map(|s| s.to_string())
                .unwrap_or_default(),
            target_scope: outcome.target.to_string(),
            outcome: outcome.outcome.as_str(),
            detail: outcome.detail.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CompareRow {
    pub identity: String,
    pub status: &'static str,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub detail: String,
}

impl ReportRow for CompareRow {
    const HEADERS: &'static [&'static str] = &[
        "Identity",
        "Status",
        "SourceType",
        "SourceId",
        "TargetType",
        "TargetId",
        "Detail",
    ];
}

fn node_columns(node: Option<&DirectoryNode>) -> (String, String) {
    node.map(|n| (n.kind().as_str().to_string(), n.id().to_string()))
        .unwrap_or_default()
}

impl From<&Comparison> for CompareRow {
    fn from(c: &Comparison) -> Self {
        let (source_type, source_id) = node_columns(c.source.as_ref());
        let (target_type, target_id) = node_columns(c.target.as_ref());
        Self {
            identity: c.identity.clone(),
            status: c.status.as_str(),
            source_type,
            source_id,
            target_type,
            target_id,
            detail: c.detail.clone(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SiteRow {
    pub name: String,
    pub url: String,
    pub created: String,
    pub personal: bool,
}

impl ReportRow for SiteRow {
    const HEADERS: &'static [&'static str] = &["Name", "Url", "Created", "Personal"];
}

impl From<&Site> for SiteRow {
    fn from(site: &Site) -> Self {
        Self {
            name: site.title().to_string(),
            url: site.web_url.clone().unwrap_or_default(),
            created: site.created_date_time.clone().unwrap_or_default(),
            personal: site.is_personal(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CertRow {
    pub application: String,
    pub app_id: String,
    pub certificate: String,
    pub usage: String,
    pub end_date: String,
    pub days_remaining: Option<i64>,
    pub status: &'static str,
}

impl ReportRow for CertRow {
    const HEADERS: &'static [&'static str] = &[
        "Application",
        "AppId",
        "Certificate",
        "Usage",
        "EndDate",
        "DaysRemaining",
        "Status",
    ];
}

impl From<&CertificateExpiry> for CertRow {
    fn from(c: &CertificateExpiry) -> Self {
        Self {
            application: c.application.clone(),
            app_id: c.app_id.clone(),
            certificate: c.certificate.clone(),
            usage: c.usage.clone(),
            end_date: c
                .end_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            days_remaining: c.days_remaining,
            status: c.status.as_str(),
        }
    }
}

/// Write a header line and `rows` to `writer`
pub fn write_rows_to<W: Write, R: ReportRow>(writer: W, rows: &[R]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(R::HEADERS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a report file, creating its directory
pub fn write_rows<R: ReportRow>(path: &Path, rows: &[R]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    write_rows_to(file, rows)?;
    tracing::info!("Wrote {} row(s) to {}", rows.len(), path.display());
    Ok(())
}

/// `<prefix>-<timestamp>.csv`, used when no `--output` is given
pub fn default_file_name(prefix: &str) -> String {
    format!("{}-{}.csv", prefix, chrono::Local::now().format("%Y%m%d-%H%M%S"))
}
