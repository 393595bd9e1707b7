//! SAML signing certificates on enterprise applications

use crate::error::Result;
use crate::graph::GraphClient;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

pub const DEFAULT_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub id: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub key_credentials: Vec<KeyCredential>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCredential {
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Expired,
    Expiring,
    Valid,
}

impl CertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertStatus::Expired => "Expired",
            CertStatus::Expiring => "Expiring",
            CertStatus::Valid => "Valid",
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One certificate on one application
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateExpiry {
    pub application: String,
    pub app_id: String,
    pub certificate: String,
    pub usage: String,
    pub end_date: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub status: CertStatus,
}

/// Whole days until `end`, negative once past. A certificate ending later
/// today has 0 days left and counts as expiring, not expired.
pub fn classify(end: DateTime<Utc>, now: DateTime<Utc>, threshold_days: i64) -> (i64, CertStatus) {
    let days = (end - now).num_days();
    let status = if end <= now {
        CertStatus::Expired
    } else if days <= threshold_days {
        CertStatus::Expiring
    } else {
        CertStatus::Valid
    };
    (days, status)
}

/// Flatten service principals into one row per key credential.
/// Credentials without an end date are reported as Valid.
pub fn expiry_rows(
    principals: &[ServicePrincipal],
    now: DateTime<Utc>,
    threshold_days: i64,
) -> Vec<CertificateExpiry> {
    let mut rows: Vec<CertificateExpiry> = principals
        .iter()
        .flat_map(|sp| {
            let application = sp.display_name.clone().unwrap_or_else(|| sp.id.clone());
            let app_id = sp.app_id.clone().unwrap_or_default();
            sp.key_credentials.iter().map(move |key| {
                let (days_remaining, status) = match key.end_date_time {
                    Some(end) => {
                        let (days, status) = classify(end, now, threshold_days);
                        (Some(days), status)
                    }
                    None => (None, CertStatus::Valid),
                };
                CertificateExpiry {
                    application: application.clone(),
                    app_id: app_id.clone(),
                    certificate: key
                        .display_name
                        .clone()
                        .or_else(|| key.key_id.clone())
                        .unwrap_or_default(),
                    usage: key.usage.clone().unwrap_or_default(),
                    end_date: key.end_date_time,
                    days_remaining,
                    status,
                }
            })
        })
        .collect();

    rows.sort_by_key(|r| r.days_remaining.unwrap_or(i64::MAX));
    rows
}

pub struct ApplicationsClient<'a> {
    client: &'a GraphClient,
}

impl<'a> ApplicationsClient<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        Self { client }
    }

    /// Enterprise applications configured for SAML single sign-on
    pub async fn list_saml_service_principals(&self) -> Result<Vec<ServicePrincipal>> {
        let endpoint = format!(
            "servicePrincipals?$filter={}&$select=id,appId,displayName,keyCredentials",
            urlencoding::encode("preferredSingleSignOnMode eq 'saml'")
        );
        self.client.get_all_pages(&endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_classify_thresholds() {
        let now = now();
        assert_eq!(classify(now - Duration::days(3), now, 30), (-3, CertStatus::Expired));
        assert_eq!(classify(now, now, 30).1, CertStatus::Expired);
        assert_eq!(classify(now + Duration::hours(5), now, 30), (0, CertStatus::Expiring));
        assert_eq!(classify(now + Duration::days(30), now, 30), (30, CertStatus::Expiring));
        assert_eq!(classify(now + Duration::days(31), now, 30), (31, CertStatus::Valid));
        assert_eq!(classify(now + Duration::days(10), now, 0).1, CertStatus::Valid);
    }

    #[test]
    fn test_expiry_rows_one_per_credential_soonest_first() {
        let principals: Vec<ServicePrincipal> = serde_json::from_value(serde_json::json!([
            {
                "id": "sp1",
                "appId": "app-1",
                "displayName": "Salesforce",
                "keyCredentials": [
                    { "keyId": "k1", "usage": "Verify", "endDateTime": "2027-01-01T00:00:00Z" },
                    { "keyId": "k2", "displayName": "CN=Salesforce", "usage": "Sign",
                      "endDateTime": "2026-03-10T00:00:00Z" }
                ]
            },
            { "id": "sp2", "displayName": "No certs" }
        ]))
        .unwrap();

        let rows = expiry_rows(&principals, now(), DEFAULT_EXPIRY_DAYS);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].certificate, "CN=Salesforce");
        assert_eq!(rows[0].status, CertStatus::Expiring);
        assert_eq!(rows[1].certificate, "k1");
        assert_eq!(rows[1].status, CertStatus::Valid);
        assert_eq!(rows[1].app_id, "app-1");
    }
}
