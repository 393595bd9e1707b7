use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirctlError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph API error: {0}")]
    GraphApiError(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("No identity column found in {file}. Expected one of [{expected}], found [{found}]")]
    ColumnNotFound {
        file: String,
        expected: String,
        found: String,
    },

    #[error("Group '{0}' not found")]
    GroupNotFound(String),

    #[error("Directory provider error: {0}")]
    Provider(String),

    #[error("Operation not supported by this directory: {0}")]
    Unsupported(String),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Interactive prompt error: {0}")]
    DialoguerError(#[from] dialoguer::Error),

    #[error("Token not found. Please run 'dirctl login' first")]
    TokenNotFound,

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),
}

pub type Result<T> = std::result::Result<T, DirctlError>;

impl DirctlError {
    /// Process exit code for a fatal error. A user abort is distinguishable
    /// from a setup failure so wrapper scripts can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            DirctlError::Aborted(_) => 2,
            _ => 1,
        }
    }
}

/// Parse Graph API error response and provide helpful context
pub fn enhance_graph_error(error_response: &str) -> String {
    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_response) {
        if let Some(error_obj) = error_json.get("error") {
            let code = error_obj
                .get("code")
                .and_then(|c| c.as_str())
                .unwrap_or("Unknown");
            let message = error_obj
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("No message");

            let hint = match code {
                "Unauthorized" | "InvalidAuthenticationToken" => {
                    "\nHint: Your access token may have expired. Run 'dirctl login' again."
                }
                "Forbidden" | "Authorization_RequestDenied" | "InsufficientPrivileges" => {
                    "\nHint: The app registration needs GroupMember.Read.All / Directory.Read.All (and Application.Read.All for certificate reports) with admin consent."
                }
                "Request_ResourceNotFound" | "NotFound" => {
                    "\nHint: The object does not exist in this tenant. Check the id or name."
                }
                "TooManyRequests" => "\nHint: Graph throttled the request. Wait a moment and retry.",
                _ => "",
            };

            return format!("{}: {}{}", code, message, hint);
        }
    }

    error_response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_graph_error_extracts_code_and_message() {
        let body = r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'x' does not exist"}}"#;
        let enhanced = enhance_graph_error(body);
        assert!(enhanced.starts_with("Request_ResourceNotFound: Resource 'x' does not exist"));
        assert!(enhanced.contains("Hint"));
    }

    #[test]
    fn test_enhance_graph_error_passes_through_plain_text() {
        assert_eq!(enhance_graph_error("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DirctlError::Aborted("user".into()).exit_code(), 2);
        assert_eq!(DirctlError::Setup("missing".into()).exit_code(), 1);
        assert_eq!(DirctlError::TokenNotFound.exit_code(), 1);
    }
}
