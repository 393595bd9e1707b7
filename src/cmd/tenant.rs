use super::{Context, prompts};
use clap::Args;
use colored::Colorize;
use dirctl::config::{AuthType, TenantConfig};
use dirctl::error::Result;
use dirctl::graph::auth::REQUIRED_SCOPES;

#[derive(Args, Debug)]
pub struct TenantAddArgs {
    /// Tenant name
    name: String,

    /// Tenant ID (Entra ID tenant ID or primary domain)
    #[arg(long)]
    tenant_id: String,

    /// Client ID (Application ID)
    #[arg(long)]
    client_id: String,

    /// Client secret (for client credentials flow)
    #[arg(long)]
    client_secret: Option<String>,

    /// Authentication flow; client-credentials when a secret is given
    #[arg(long, value_enum)]
    auth: Option<AuthType>,

    /// Tenant description
    #[arg(long)]
    description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TenantListArgs {
    /// Show ids, auth type and token status
    #[arg(short, long)]
    details: bool,
}

#[derive(Args, Debug)]
pub struct TenantNameArgs {
    /// Tenant name
    name: String,
}

pub async fn add(ctx: &Context, args: TenantAddArgs) -> Result<()> {
    let auth_type = args.auth.unwrap_or(if args.client_secret.is_some() {
        AuthType::ClientCredentials
    } else {
        AuthType::DeviceCode
    });

    let tenant = TenantConfig {
        name: args.name.clone(),
        tenant_id: args.tenant_id,
        client_id: args.client_id,
        client_secret: args.client_secret,
        auth_type,
        description: args.description,
    };

    ctx.config.add_tenant(tenant)?;
    if ctx.settings.current_tenant.is_none() {
        ctx.config.set_active_tenant(&args.name)?;
    }

    prompts::success(&format!("Tenant '{}' added", args.name));
    println!(
        "\n{} The app registration needs: {}",
        "→".cyan(),
        REQUIRED_SCOPES.join(", ")
    );
    println!(
        "{} Run {} to authenticate",
        "→".cyan(),
        format!("dirctl login {}", args.name).bold()
    );

    Ok(())
}

pub async fn list(ctx: &Context, args: TenantListArgs) -> Result<()> {
    let tenants = ctx.config.load_tenants()?;

    if tenants.is_empty() {
        prompts::warning("No tenants configured");
        println!(
            "\n{} Run {} to add a tenant",
            "→".cyan(),
            "dirctl tenant add".bold()
        );
        return Ok(());
    }

    println!("\n{}", "Configured Tenants:".bold());
    println!("{}", "─".repeat(60));

    for tenant in &tenants {
        let is_current = ctx.settings.current_tenant.as_ref() == Some(&tenant.name);
        let marker = if is_current {
            "●".green()
        } else {
            "○".dimmed()
        };

        println!("\n{} {}", marker, tenant.name.bold());

        if args.details {
            println!("  Tenant ID:    {}", tenant.tenant_id);
            println!("  Client ID:    {}", tenant.client_id);
            println!("  Auth Type:    {:?}", tenant.auth_type);

            if let Some(desc) = &tenant.description {
                println!("  Description:  {}", desc);
            }

            match ctx.config.load_token(&tenant.name) {
                Ok(token) => {
                    println!(
                        "  Status:       {} (expires: {})",
                        "Authenticated".green(),
                        token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                Err(_) => {
                    println!("  Status:       {}", "Not authenticated".yellow());
                }
            }
        }
    }

    println!("\n{}", "─".repeat(60));
    println!("{} {} tenant(s) total", "→".cyan(), tenants.len());

    Ok(())
}

pub async fn switch(ctx: &Context, args: TenantNameArgs) -> Result<()> {
    ctx.config.set_active_tenant(&args.name)?;
    prompts::success(&format!("Switched to tenant '{}'", args.name));
    Ok(())
}

pub async fn remove(ctx: &Context, args: TenantNameArgs) -> Result<()> {
    ctx.config.remove_tenant(&args.name)?;
    prompts::success(&format!("Tenant '{}' removed", args.name));
    Ok(())
}
