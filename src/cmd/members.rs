use super::{Context, progress, prompts};
use clap::Args;
use colored::Colorize;
use dirctl::directory::SourceSpec;
use dirctl::error::{DirctlError, Result};
use dirctl::report;
use dirctl::walker::{self, RootWalk, WalkOptions, WalkReport};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct MembersArgs {
    /// Root group (object id, display name or mail)
    #[arg(required_unless_present = "input")]
    group: Option<String>,

    /// CSV file listing root groups
    #[arg(short, long, conflicts_with = "group")]
    input: Option<PathBuf>,

    /// Identity column in the input file (auto-detected by default)
    #[arg(long, requires = "input")]
    column: Option<String>,

    /// Report each member once, on the first path it was found
    #[arg(long)]
    dedupe: bool,

    /// Also report nested groups as rows
    #[arg(long)]
    include_groups: bool,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory to read: graph, graph:<tenant> or a snapshot file
    #[arg(long, default_value = "graph")]
    source: SourceSpec,
}

pub async fn run(ctx: &Context, args: MembersArgs) -> Result<()> {
    let roots = match (&args.group, &args.input) {
        (Some(group), _) => vec![group.clone()],
        (None, Some(path)) => ctx.read_identities(path, args.column.as_deref())?.identities,
        (None, None) => {
            return Err(DirctlError::Setup(
                "Specify a GROUP or --input FILE".into(),
            ));
        }
    };
    let single = args.group.is_some();

    let directory = ctx.open(&args.source).await?;
    let options = WalkOptions {
        deduplicate: args.dedupe,
        include_groups: args.include_groups,
    };

    let mut rows = Vec::new();
    let mut walked = 0;
    let mut missing = 0;
    let mut failed = 0;

    for identity in &roots {
        let spinner = progress::create_spinner(&format!("Walking {}...", identity));
        let outcome = walker::walk_root(&directory, identity, options).await;

        match &outcome {
            RootWalk::Walked(walk) => {
                let summary = format!(
                    "{}: {} member(s), {} user(s), {} group(s) expanded",
                    walk.root.display_name,
                    walk.results.len(),
                    walk.user_count(),
                    walk.groups_expanded
                );
                if walk.is_complete() {
                    progress::finish_spinner_success(&spinner, &summary);
                } else {
                    progress::finish_spinner_error(&spinner, &summary);
                    failed += 1;
                }
                print_diagnostics(walk);
                walked += 1;
            }
            RootWalk::NotFound(_) if single => {
                progress::finish_spinner_error(&spinner, &format!("Group '{}' not found", identity));
                return Err(DirctlError::GroupNotFound(identity.clone()));
            }
            RootWalk::NotFound(_) => {
                progress::finish_spinner_error(&spinner, &format!("Group '{}' not found", identity));
                missing += 1;
            }
            RootWalk::LookupFailed { error, .. } => {
                progress::finish_spinner_error(
                    &spinner,
                    &format!("Lookup of '{}' failed: {}", identity, error),
                );
                failed += 1;
            }
        }

        rows.extend(report::member_rows(&outcome));
    }

    let path = ctx.report_path(args.output.as_deref(), "members");
    report::write_rows(&path, &rows)?;

    prompts::section_header("Summary");
    println!("  Root groups:  {}", walked);
    if missing > 0 {
        println!("  Not found:    {}", missing.to_string().yellow());
    }
    if failed > 0 {
        println!("  Incomplete:   {}", failed.to_string().red());
    }
    println!("  Rows:         {}", rows.len());
    prompts::success(&format!("Report written to {}", path.display()));

    Ok(())
}

fn print_diagnostics(walk: &WalkReport) {
    for revisit in &walk.revisits {
        let kind = if revisit.cyclic {
            "Cycle".red().bold()
        } else {
            "Revisit".yellow()
        };
        println!(
            "    {} {} reached again via {}",
            kind,
            revisit.group.display_name,
            revisit.via.join(" > ")
        );
    }
    for failure in &walk.failures {
        println!(
            "    {} {} (via {}): {}",
            "✗".red(),
            failure.group.display_name,
            failure.via.join(" > "),
            failure.error
        );
    }
}
