use crate::config::{AuthType, ConfigManager, TenantConfig, TokenCache};
use crate::error::{DirctlError, Result};
use colored::Colorize;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, DeviceAuthorizationUrl, EmptyExtraDeviceAuthorizationFields,
    Scope, TokenResponse, TokenUrl, basic::BasicClient, reqwest::async_http_client,
};
use std::time::Duration;

const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Application permissions the app registration needs, shown by `tenant add`
pub const REQUIRED_SCOPES: &[&str] = &[
    "GroupMember.Read.All",
    "Directory.Read.All",
    "Sites.Read.All",
    "Application.Read.All",
];

/// Token lifetime assumed when the server omits `expires_in`
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

fn authority_url(tenant_id: &str, path: &str) -> String {
    format!("{}/{}/oauth2/v2.0/{}", MICROSOFT_AUTHORITY, tenant_id, path)
}

fn endpoints(tenant_id: &str) -> Result<(AuthUrl, TokenUrl)> {
    let auth_url = AuthUrl::new(authority_url(tenant_id, "authorize"))
        .map_err(|e| DirctlError::AuthError(format!("Invalid auth URL: {}", e)))?;
    let token_url = TokenUrl::new(authority_url(tenant_id, "token"))
        .map_err(|e| DirctlError::AuthError(format!("Invalid token URL: {}", e)))?;
    Ok((auth_url, token_url))
}

fn expires_at(expires_in: Option<Duration>) -> chrono::DateTime<chrono::Utc> {
    let lifetime = chrono::Duration::from_std(expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME))
        .unwrap_or_else(|_| chrono::Duration::hours(1));
    chrono::Utc::now() + lifetime
}

pub struct GraphAuth {
    config_manager: ConfigManager,
}

impl GraphAuth {
    pub fn new(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Log in with whichever flow the tenant is registered for
    pub async fn login(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        match tenant_config.auth_type {
            AuthType::DeviceCode => self.login_device_code(tenant_config).await,
            AuthType::ClientCredentials => self.login_client_credentials(tenant_config).await,
        }
    }

    /// Authenticate using device code flow (interactive)
    pub async fn login_device_code(&self, tenant_config: &TenantConfig) -> Result<TokenCache> {
        println!(
            "{} device code authentication for tenant '{}'...",
            "→ Starting".cyan(),
            tenant_config.name
        );

        let tenant_id = &tenant_config.tenant_id;
        let client_id = ClientId::new(tenant_config.client_id.clone());
        let (auth_url, token_url) = endpoints(tenant_id)?;

        let device_auth_url = DeviceAuthorizationUrl::new(authority_url(tenant_id, "devicecode"))
            .map_err(|e| DirctlError::AuthError(format!("Invalid device auth URL: {}", e)))?;

        let client = BasicClient::new(client_id, None, auth_url, Some(token_url))
            .set_device_authorization_url(device_auth_url);

        let details: oauth2::DeviceAuthorizationResponse<EmptyExtraDeviceAuthorizationFields> =
            client
                .exchange_device_code()
                .map_err(|e| DirctlError::AuthError(format!("Device code exchange failed: {}", e)))?
                .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
                .request_async(async_http_client)
                .await
                .map_err(|e| {
                    DirctlError::AuthError(format!("Device authorization request failed: {}", e))
                })?;

        println!(
            "\nPlease visit: {}",
            details.verification_uri().as_str().bold()
        );
        println!("Enter code:   {}\n", details.user_code().secret().bold());

        let token = client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| DirctlError::AuthError(format!("Token exchange failed: {}", e)))?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expires_at: expires_at(token.expires_in()),
            tenant_id: tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        tracing::info!(
            "Token for '{}' saved to {}",
            tenant_config.name,
            self.config_manager
                .token_cache_file(&tenant_config.name)
                .display()
        );

        Ok(token_cache)
    }

    /// Authenticate using client credentials flow (non-interactive)
    pub async fn login_client_credentials(
        &self,
        tenant_config: &TenantConfig,
    ) -> Result<TokenCache> {
        let client_secret = tenant_config.client_secret.as_ref().ok_or_else(|| {
            DirctlError::AuthError("Client secret required for client credentials flow".into())
        })?;

        println!(
            "{} with client credentials for tenant '{}'...",
            "→ Authenticating".cyan(),
            tenant_config.name
        );

        let tenant_id = &tenant_config.tenant_id;
        let client_id = ClientId::new(tenant_config.client_id.clone());
        let client_secret = ClientSecret::new(client_secret.clone());
        let (auth_url, token_url) = endpoints(tenant_id)?;

        let client = BasicClient::new(client_id, Some(client_secret), auth_url, Some(token_url));

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                DirctlError::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let token_cache = TokenCache {
            access_token: token.access_token().secret().clone(),
            refresh_token: None,
            expires_at: expires_at(token.expires_in()),
            tenant_id: tenant_id.clone(),
        };

        self.config_manager
            .save_token(&tenant_config.name, &token_cache)?;
        tracing::info!("Token for '{}' saved", tenant_config.name);

        Ok(token_cache)
    }

    /// Cached access token for `tenant_name`.
    ///
    /// Client-credential tenants log in again silently when the cache is
    /// missing or expired; device-code tenants need `dirctl login`.
    pub async fn get_access_token(&self, tenant_name: &str) -> Result<String> {
        match self.config_manager.load_token(tenant_name) {
            Ok(token) => Ok(token.access_token),
            Err(DirctlError::AuthError(_)) | Err(DirctlError::TokenNotFound) => {
                let tenant = self.config_manager.get_tenant(tenant_name)?;
                if tenant.auth_type == AuthType::ClientCredentials && tenant.client_secret.is_some()
                {
                    tracing::info!("Refreshing client credentials token for '{}'", tenant_name);
                    Ok(self.login_client_credentials(&tenant).await?.access_token)
                } else {
                    Err(DirctlError::TokenNotFound)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Logout (delete token cache)
    pub fn logout(&self, tenant_name: &str) -> Result<()> {
        self.config_manager.delete_token(tenant_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_urls() {
        assert_eq!(
            authority_url("contoso.onmicrosoft.com", "token"),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
        assert!(endpoints("contoso.onmicrosoft.com").is_ok());
    }

    #[test]
    fn test_expiry_defaults_to_one_hour() {
        let at = expires_at(None);
        let remaining = at - chrono::Utc::now();
        assert!(remaining > chrono::Duration::minutes(59));
        assert!(remaining <= chrono::Duration::minutes(60));
    }
}
