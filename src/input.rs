//! Identity lists read from CSV

use crate::error::{DirctlError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Headers accepted as the identity column, in priority order
pub const DEFAULT_IDENTITY_COLUMNS: &[&str] = &[
    "Identity",
    "GroupName",
    "Group",
    "Name",
    "DisplayName",
    "SamAccountName",
    "Mail",
    "UserPrincipalName",
    "ObjectId",
    "Id",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityList {
    /// Header the identities were read from, as spelled in the file
    pub column: String,
    pub identities: Vec<String>,
}

fn clean_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

/// Index of the identity column. An explicit `column` must exist; otherwise
/// the first of `accepted` present in the headers wins. Matching ignores case.
pub fn detect_column(
    headers: &csv::StringRecord,
    column: Option<&str>,
    accepted: &[String],
) -> Option<usize> {
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| clean_header(h).eq_ignore_ascii_case(name.trim()))
    };

    match column {
        Some(name) => find(name),
        None => accepted.iter().find_map(|name| find(name)),
    }
}

/// Accepted headers from config, or the built-in list when none are set
pub fn accepted_columns(configured: &[String]) -> Vec<String> {
    if configured.is_empty() {
        DEFAULT_IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        configured.to_vec()
    }
}

/// Read identities from CSV data. Blank values are skipped; order and
/// duplicates are kept.
pub fn read_identities<R: Read>(
    reader: R,
    source: &str,
    column: Option<&str>,
    accepted: &[String],
) -> Result<IdentityList> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let index = detect_column(&headers, column, accepted).ok_or_else(|| {
        DirctlError::ColumnNotFound {
            file: source.to_string(),
            expected: match column {
                Some(name) => name.to_string(),
                None => accepted.join(", "),
            },
            found: headers.iter().map(clean_header).collect::<Vec<_>>().join(", "),
        }
    })?;

    let mut identities = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(value) = record.get(index).filter(|v| !v.is_empty()) {
            identities.push(value.to_string());
        }
    }

    let column = clean_header(&headers[index]).to_string();
    tracing::debug!(
        "Read {} identities from column '{}' of {}",
        identities.len(),
        column,
        source
    );

    Ok(IdentityList { column, identities })
}

/// Read identities from a CSV file. A missing or unreadable file is a
/// setup error.
pub fn read_identities_file(
    path: &Path,
    column: Option<&str>,
    accepted: &[String],
) -> Result<IdentityList> {
    let file = File::open(path).map_err(|e| {
        DirctlError::Setup(format!("Cannot open input file {}: {}", path.display(), e))
    })?;
    read_identities(file, &path.display().to_string(), column, accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        accepted_columns(&[])
    }

    #[test]
    fn test_auto_detects_column_case_insensitively() {
        let data = "\u{feff}Owner,groupname\nbob,GG-Finance\nbob,  GG-Sales \n";
        let list = read_identities(data.as_bytes(), "groups.csv", None, &defaults()).unwrap();
        assert_eq!(list.column, "groupname");
        assert_eq!(list.identities, vec!["GG-Finance", "GG-Sales"]);
    }

    #[test]
    fn test_priority_order_decides_between_candidates() {
        let data = "Name,Identity\nFinance,S-1-5-21-1\n";
        let list = read_identities(data.as_bytes(), "x.csv", None, &defaults()).unwrap();
        assert_eq!(list.column, "Identity");
        assert_eq!(list.identities, vec!["S-1-5-21-1"]);
    }

    #[test]
    fn test_explicit_column() {
        let data = "Group,Target\nA,B\n";
        let list = read_identities(data.as_bytes(), "x.csv", Some("target"), &defaults()).unwrap();
        assert_eq!(list.identities, vec!["B"]);
    }

    #[test]
    fn test_missing_column_lists_what_was_found() {
        let data = "Owner,Notes\nbob,x\n";
        let err = read_identities(data.as_bytes(), "x.csv", None, &defaults()).unwrap_err();
        match err {
            DirctlError::ColumnNotFound { file, found, .. } => {
                assert_eq!(file, "x.csv");
                assert_eq!(found, "Owner, Notes");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = read_identities("Group\nA\n".as_bytes(), "x.csv", Some("Nope"), &defaults())
            .unwrap_err();
        assert!(matches!(err, DirctlError::ColumnNotFound { expected, .. } if expected == "Nope"));
    }

    #[test]
    fn test_blank_and_short_rows_are_skipped() {
        let data = "Other,Group\nx,A\ny,\nz\nw,A\n";
        let list = read_identities(data.as_bytes(), "x.csv", None, &defaults()).unwrap();
        assert_eq!(list.identities, vec!["A", "A"]);
    }

    #[test]
    fn test_configured_columns_replace_defaults() {
        let accepted = accepted_columns(&["Team".to_string()]);
        let data = "Group,Team\nA,B\n";
        let list = read_identities(data.as_bytes(), "x.csv", None, &accepted).unwrap();
        assert_eq!(list.identities, vec!["B"]);
    }

    #[test]
    fn test_missing_file_is_setup_error() {
        let err = read_identities_file(Path::new("/nonexistent/in.csv"), None, &defaults())
            .unwrap_err();
        assert!(matches!(err, DirctlError::Setup(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
