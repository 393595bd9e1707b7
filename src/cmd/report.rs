use super::{Context, progress, prompts};
use clap::Args;
use colored::Colorize;
use dirctl::error::Result;
use dirctl::graph::GraphClient;
use dirctl::graph::applications::{self, ApplicationsClient, CertStatus};
use dirctl::graph::sharepoint::SharePointClient;
use dirctl::report::{self, CertRow, SiteRow};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SitesArgs {
    /// Only sites matching this keyword
    #[arg(long)]
    search: Option<String>,

    /// Tenant to report on (defaults to the active tenant)
    #[arg(long)]
    tenant: Option<String>,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CertsArgs {
    /// Certificates ending within this many days are reported as Expiring
    #[arg(long, default_value_t = applications::DEFAULT_EXPIRY_DAYS)]
    days: i64,

    /// Tenant to report on (defaults to the active tenant)
    #[arg(long)]
    tenant: Option<String>,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

async fn graph_client(ctx: &Context, tenant: Option<&str>) -> Result<GraphClient> {
    let tenant = ctx.config.resolve_tenant(tenant)?;
    prompts::info(&format!("Tenant: {}", tenant.name.cyan().bold()));
    GraphClient::from_config(&ctx.config, &tenant.name).await
}

pub async fn sites(ctx: &Context, args: SitesArgs) -> Result<()> {
    let client = graph_client(ctx, args.tenant.as_deref()).await?;
    let sharepoint = SharePointClient::new(&client);

    let spinner = progress::create_spinner("Listing SharePoint sites...");
    let result = match &args.search {
        Some(query) => sharepoint.search_sites(query).await,
        None => sharepoint.list_sites().await,
    };
    let sites = match result {
        Ok(sites) => {
            progress::finish_spinner_success(&spinner, &format!("Found {} site(s)", sites.len()));
            sites
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Site listing failed");
            return Err(e);
        }
    };

    let rows: Vec<SiteRow> = sites.iter().map(SiteRow::from).collect();
    let personal = rows.iter().filter(|r| r.personal).count();

    let path = ctx.report_path(args.output.as_deref(), "sites");
    report::write_rows(&path, &rows)?;

    prompts::section_header("Summary");
    println!("  Sites:          {}", rows.len());
    println!("  Personal sites: {}", personal);
    prompts::success(&format!("Report written to {}", path.display()));

    Ok(())
}

pub async fn certs(ctx: &Context, args: CertsArgs) -> Result<()> {
    let client = graph_client(ctx, args.tenant.as_deref()).await?;

    let spinner = progress::create_spinner("Reading SAML applications...");
    let principals = match ApplicationsClient::new(&client)
        .list_saml_service_principals()
        .await
    {
        Ok(principals) => {
            progress::finish_spinner_success(
                &spinner,
                &format!("Found {} SAML application(s)", principals.len()),
            );
            principals
        }
        Err(e) => {
            progress::finish_spinner_error(&spinner, "Application listing failed");
            return Err(e);
        }
    };

    let expiries = applications::expiry_rows(&principals, chrono::Utc::now(), args.days);
    let count = |status: CertStatus| expiries.iter().filter(|e| e.status == status).count();

    for expiry in expiries.iter().filter(|e| e.status != CertStatus::Valid) {
        let status = match expiry.status {
            CertStatus::Expired => expiry.status.as_str().red().bold(),
            _ => expiry.status.as_str().yellow(),
        };
        println!(
            "  {:<10} {} ({}, {} day(s))",
            status,
            expiry.application,
            expiry.certificate,
            expiry.days_remaining.unwrap_or_default()
        );
    }

    let rows: Vec<CertRow> = expiries.iter().map(CertRow::from).collect();
    let path = ctx.report_path(args.output.as_deref(), "certs");
    report::write_rows(&path, &rows)?;

    prompts::section_header("Summary");
    println!("  Expired:  {}", count(CertStatus::Expired).to_string().red());
    println!(
        "  Expiring: {} (within {} days)",
        count(CertStatus::Expiring).to_string().yellow(),
        args.days
    );
    println!("  Valid:    {}", count(CertStatus::Valid).to_string().green());
    prompts::success(&format!("Report written to {}", path.display()));

    Ok(())
}
