mod cmd;

use clap::{Parser, Subcommand};
use colored::Colorize;
use dirctl::logging;

#[derive(Parser, Debug)]
#[command(
    name = "dirctl",
    about = "Group membership, scope conversion and directory reports for Microsoft 365 and Active Directory",
    version,
    long_about = "Directory group tooling for Entra ID and on-premises Active Directory\n\n\
                  Flatten nested group membership, convert security group scope with\n\
                  conflict checks, compare directories and report on SharePoint sites\n\
                  and SAML certificates."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// List every member of a group, following nested groups
    Members(cmd::members::MembersArgs),

    /// Security group scope operations
    #[command(subcommand)]
    Scope(ScopeCommands),

    /// Check which identities exist in two directories
    Compare(cmd::compare::CompareArgs),

    /// Tenant reports
    #[command(subcommand)]
    Report(ReportCommands),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Make a tenant the active one
    #[command(alias = "switch")]
    Use(cmd::tenant::TenantNameArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantNameArgs),
}

#[derive(Subcommand, Debug)]
enum ScopeCommands {
    /// Convert groups to another scope
    Convert(cmd::scope::ConvertArgs),
}

#[derive(Subcommand, Debug)]
enum ReportCommands {
    /// SharePoint sites
    Sites(cmd::report::SitesArgs),

    /// SAML signing certificate expiry
    Certs(cmd::report::CertsArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let ctx = cmd::Context::load();

    let log_dir = ctx.as_ref().ok().map(|c| c.log_dir());
    let run_log = match logging::init(cli.verbose, log_dir.as_deref()) {
        Ok(run_log) => Some(run_log),
        Err(e) => {
            eprintln!("{} {}", "Warning:".yellow().bold(), e);
            logging::init(cli.verbose, None).ok()
        }
    };
    if let Some(path) = run_log.as_ref().and_then(|l| l.path()) {
        tracing::info!("Run log: {}", path.display());
    }

    let result = match ctx {
        Ok(ctx) => run(&ctx, cli.command).await,
        Err(e) => Err(e),
    };

    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{} {}", "Error:".red().bold(), e);
            e.exit_code()
        }
    };

    // Flush the run log before exiting
    drop(run_log);
    std::process::exit(code);
}

async fn run(ctx: &cmd::Context, command: Commands) -> dirctl::Result<()> {
    match command {
        Commands::Login(args) => cmd::login::login(ctx, args).await,
        Commands::Logout(args) => cmd::login::logout(ctx, args).await,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(ctx, args).await,
            TenantCommands::List(args) => cmd::tenant::list(ctx, args).await,
            TenantCommands::Use(args) => cmd::tenant::switch(ctx, args).await,
            TenantCommands::Remove(args) => cmd::tenant::remove(ctx, args).await,
        },
        Commands::Members(args) => cmd::members::run(ctx, args).await,
        Commands::Scope(scope_cmd) => match scope_cmd {
            ScopeCommands::Convert(args) => cmd::scope::convert(ctx, args).await,
        },
        Commands::Compare(args) => cmd::compare::run(ctx, args).await,
        Commands::Report(report_cmd) => match report_cmd {
            ReportCommands::Sites(args) => cmd::report::sites(ctx, args).await,
            ReportCommands::Certs(args) => cmd::report::certs(ctx, args).await,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scope_convert_parses() {
        let cli = Cli::try_parse_from([
            "dirctl",
            "scope",
            "convert",
            "--target",
            "universal",
            "--on-conflict",
            "resolve",
            "--source",
            "onprem.json",
            "GG-Finance",
            "GG-Sales",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Scope(ScopeCommands::Convert(_))
        ));
    }

    #[test]
    fn test_members_requires_group_or_input() {
        assert!(Cli::try_parse_from(["dirctl", "members"]).is_err());
        assert!(Cli::try_parse_from(["dirctl", "members", "GG-Finance", "--dedupe"]).is_ok());
        assert!(Cli::try_parse_from(["dirctl", "members", "--input", "groups.csv"]).is_ok());
        assert!(
            Cli::try_parse_from(["dirctl", "members", "G", "--input", "groups.csv"]).is_err()
        );
    }

    #[tokio::test]
    async fn test_unopenable_source_leaves_no_action_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = cmd::Context {
            config: dirctl::config::ConfigManager::at(dir.path().join("config")).unwrap(),
            settings: dirctl::config::Config::default(),
        };
        let log_path = dir.path().join("actions.jsonl");
        let missing = dir.path().join("missing.json");

        let cli = Cli::try_parse_from([
            "dirctl",
            "scope",
            "convert",
            "--target",
            "universal",
            "--yes",
            "--source",
            missing.to_str().unwrap(),
            "--action-log",
            log_path.to_str().unwrap(),
            "GG-Finance",
        ])
        .unwrap();

        assert!(run(&ctx, cli.command).await.is_err());
        assert!(!log_path.exists());
    }

    #[test]
    fn test_domain_local_target_spelling() {
        assert!(
            Cli::try_parse_from(["dirctl", "scope", "convert", "--target", "domain-local", "G"])
                .is_ok()
        );
    }
}
