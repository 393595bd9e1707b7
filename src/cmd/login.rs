use super::{Context, prompts};
use clap::Args;
use colored::Colorize;
use dirctl::error::Result;
use dirctl::graph::auth::GraphAuth;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant name (defaults to the active tenant)
    #[arg(index = 1)]
    name: Option<String>,

    /// Tenant name - alias for positional
    #[arg(short, long, conflicts_with = "name")]
    tenant: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name
    #[arg(short, long)]
    tenant: Option<String>,

    /// Logout from all tenants
    #[arg(long, conflicts_with = "tenant")]
    all: bool,
}

pub async fn login(ctx: &Context, args: LoginArgs) -> Result<()> {
    let name = args.name.as_deref().or(args.tenant.as_deref());
    let tenant = ctx.config.resolve_tenant(name)?;
    let auth = GraphAuth::new(ctx.config.clone());

    match auth.login(&tenant).await {
        Ok(token) => {
            tracing::info!("Authenticated to tenant '{}'", tenant.name);
            ctx.config.set_active_tenant(&tenant.name)?;
            prompts::success("Authentication successful");
            println!(
                "{} Active tenant: {} (token valid until {})",
                "→".cyan(),
                tenant.name.bold(),
                token.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Authentication to tenant '{}' failed: {}", tenant.name, e);
            Err(e)
        }
    }
}

pub async fn logout(ctx: &Context, args: LogoutArgs) -> Result<()> {
    let auth = GraphAuth::new(ctx.config.clone());

    if args.all {
        for tenant in ctx.config.load_tenants()? {
            auth.logout(&tenant.name)?;
        }
        prompts::success("Logged out from all tenants");
        return Ok(());
    }

    let name = match args.tenant.or_else(|| ctx.settings.current_tenant.clone()) {
        Some(name) => name,
        None => {
            prompts::warning("No active tenant");
            return Ok(());
        }
    };

    auth.logout(&name)?;
    prompts::success(&format!("Logged out from tenant '{}'", name));
    Ok(())
}
