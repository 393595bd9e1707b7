use super::{Context, prompts};
use clap::Args;
use colored::Colorize;
use dirctl::audit::ActionLog;
use dirctl::directory::{GroupScope, SourceSpec};
use dirctl::error::{DirctlError, Result};
use dirctl::report::{self, ScopeRow};
use dirctl::scope::gate::CandidateCheck;
use dirctl::scope::{
    AbortReason, ConflictGate, GateAnalysis, Outcome, Resolution, ResolutionPlan, ScopeRequest,
};
use std::path::{Path, PathBuf};

const ACTION_LOG_FILE: &str = "scope-actions.jsonl";

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Scope to convert the groups to
    #[arg(long, value_enum)]
    target: GroupScope,

    /// Groups to convert
    #[arg(required_unless_present = "input")]
    groups: Vec<String>,

    /// CSV file listing the groups to convert
    #[arg(short, long, conflicts_with = "groups")]
    input: Option<PathBuf>,

    /// Identity column in the input file (auto-detected by default)
    #[arg(long, requires = "input")]
    column: Option<String>,

    /// What to do about conflicts; prompts when omitted
    #[arg(long, value_enum)]
    on_conflict: Option<Resolution>,

    /// Show what would change without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Do not ask for confirmation; conflicts abort unless --on-conflict is set
    #[arg(short, long)]
    yes: bool,

    /// Directory to modify: graph, graph:<tenant> or a snapshot file
    #[arg(long, default_value = "graph")]
    source: SourceSpec,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON Lines action log, appended to
    #[arg(long)]
    action_log: Option<PathBuf>,
}

pub async fn convert(ctx: &Context, args: ConvertArgs) -> Result<()> {
    let identities = match &args.input {
        Some(path) => ctx.read_identities(path, args.column.as_deref())?.identities,
        None => args.groups.clone(),
    };
    if identities.is_empty() {
        prompts::warning("No groups to convert");
        return Ok(());
    }

    let requests: Vec<ScopeRequest> = identities
        .into_iter()
        .map(|identity| ScopeRequest {
            identity,
            target: args.target,
        })
        .collect();

    // A source that cannot be opened must not leave an action log behind
    let mut directory = ctx.open(&args.source).await?;
    let log_path = action_log_path(ctx, args.action_log.as_deref());
    let mut log = ActionLog::create(&log_path)?;

    if args.dry_run {
        println!("\n{}", "DRY RUN - No changes will be made".yellow().bold());
    }

    let mut gate = ConflictGate::new(&mut directory, &mut log).dry_run(args.dry_run);
    let analysis = gate.gather(&requests).await?;
    print_analysis(&analysis, args.target);

    let resolution = if !analysis.has_conflicts() {
        Resolution::Abort
    } else if let Some(choice) = args.on_conflict {
        choice
    } else if args.yes {
        prompts::warning("Conflicts found and --on-conflict not given; aborting");
        Resolution::Abort
    } else {
        choose_resolution()?
    };

    let mut plan = gate.decide(&analysis, resolution)?;
    let declined = match &plan {
        ResolutionPlan::Proceed {
            dependencies,
            convert,
            ..
        } if !convert.is_empty() || !dependencies.is_empty() => {
            if args.dry_run || args.yes {
                false
            } else {
                let question = if dependencies.is_empty() {
                    format!("Convert {} group(s) to {}?", convert.len(), args.target)
                } else {
                    format!(
                        "Convert {} blocking group(s) and then {} group(s) to {}?",
                        dependencies.len(),
                        convert.len(),
                        args.target
                    )
                };
                !prompts::confirm(&question, false)?
            }
        }
        ResolutionPlan::Proceed { .. } => {
            prompts::info("Nothing to convert");
            false
        }
        ResolutionPlan::Abort { .. } => false,
    };
    if declined {
        plan = gate.cancel()?;
    }

    let run = gate.execute(&analysis, &plan).await?;
    drop(gate);

    if !args.dry_run && directory.persist()? {
        prompts::success("Snapshot updated");
    }

    let rows: Vec<ScopeRow> = run.outcomes.iter().map(ScopeRow::from).collect();
    let path = ctx.report_path(args.output.as_deref(), "scope");
    report::write_rows(&path, &rows)?;

    prompts::section_header("Summary");
    for dependency in &run.dependencies {
        match &dependency.error {
            None => println!(
                "  {} dependency {} -> {}",
                "✓".green(),
                dependency.group.display_name,
                dependency.target
            ),
            Some(e) => println!(
                "  {} dependency {}: {}",
                "✗".red(),
                dependency.group.display_name,
                e
            ),
        }
    }
    println!("  Converted:      {}", run.count(Outcome::Converted).to_string().green());
    println!("  Skipped:        {}", run.count(Outcome::Skipped));
    println!("  Not applicable: {}", run.count(Outcome::NotApplicable));
    println!("  Not found:      {}", run.count(Outcome::NotFound));
    println!("  Failed:         {}", run.count(Outcome::Failed).to_string().red());
    prompts::info(&format!("Action log: {}", log_path.display()));
    prompts::success(&format!("Report written to {}", path.display()));

    match run.aborted {
        None => Ok(()),
        Some(AbortReason::UserChoice) => Err(DirctlError::Aborted(
            "no groups were converted".into(),
        )),
        Some(reason) => Err(DirctlError::Provider(reason.to_string())),
    }
}

fn action_log_path(ctx: &Context, configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.log_dir().join(ACTION_LOG_FILE))
}

fn choose_resolution() -> Result<Resolution> {
    let options = [
        Resolution::SkipConflicting,
        Resolution::ResolveDependenciesFirst,
        Resolution::Abort,
    ];
    let index = prompts::select("How should conflicts be handled?", &options, 2)?;
    Ok(options.get(index).copied().unwrap_or(Resolution::Abort))
}

fn print_analysis(analysis: &GateAnalysis, target: GroupScope) {
    prompts::section_header(&format!("Conversion to {}", target));

    for candidate in &analysis.candidates {
        let name = candidate
            .group
            .as_ref()
            .map(|g| g.display_name.as_str())
            .unwrap_or(candidate.identity.as_str());
        let current = candidate
            .current_scope()
            .map(|s| s.as_str())
            .unwrap_or("?");

        let status = match &candidate.check {
            CandidateCheck::Convertible => "ready".green(),
            CandidateCheck::Conflicting(c) => format!("{} conflict(s)", c.len()).red(),
            CandidateCheck::AlreadyAtTarget => "already at target".dimmed(),
            CandidateCheck::Duplicate => "duplicate".dimmed(),
            CandidateCheck::NotFound => "not found".yellow(),
            CandidateCheck::UnknownScope => "scope unknown".yellow(),
            CandidateCheck::LookupFailed(e) => format!("lookup failed: {}", e).red(),
        };
        println!("  {:<40} {:<12} {}", name, current, status);
    }

    println!(
        "\n  {} of {} group(s) need conversion",
        analysis.pending(),
        analysis.candidates.len()
    );

    let blocking = analysis.blocking_groups();
    if !blocking.is_empty() {
        println!("\n{}", "Conflicts:".red().bold());
        for conflict in analysis.conflicts() {
            println!("  {} {}", "✗".red(), conflict.reason);
        }
        println!("\n{}", "Blocking groups:".bold());
        for (group, needed) in &blocking {
            println!(
                "  • {} ({} -> {})",
                group.display_name,
                group.scope.map(|s| s.as_str()).unwrap_or("?"),
                needed
            );
        }
    }
}
