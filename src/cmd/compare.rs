use super::{Context, prompts};
use clap::Args;
use colored::Colorize;
use dirctl::compare::{self, Presence};
use dirctl::directory::{DirectoryProvider, SourceSpec};
use dirctl::error::Result;
use dirctl::report::{self, CompareRow};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// CSV file listing the identities to look up
    #[arg(short, long)]
    input: PathBuf,

    /// Identity column in the input file (auto-detected by default)
    #[arg(long)]
    column: Option<String>,

    /// First directory: graph, graph:<tenant> or a snapshot file
    #[arg(long)]
    source: SourceSpec,

    /// Second directory, same forms as --source
    #[arg(long)]
    against: SourceSpec,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only report identities that are not present in both
    #[arg(long)]
    diff_only: bool,
}

pub async fn run(ctx: &Context, args: CompareArgs) -> Result<()> {
    let identities = ctx
        .read_identities(&args.input, args.column.as_deref())?
        .identities;

    let source = ctx.open(&args.source).await?;
    let target = ctx.open(&args.against).await?;

    prompts::info(&format!(
        "Comparing {} against {}",
        source.label().bold(),
        target.label().bold()
    ));
    let results = compare::compare(&source, &target, &identities).await;

    let count = |status: Presence| results.iter().filter(|r| r.status == status).count();
    let rows: Vec<CompareRow> = results
        .iter()
        .filter(|r| !(args.diff_only && r.status == Presence::Both))
        .map(CompareRow::from)
        .collect();

    let path = ctx.report_path(args.output.as_deref(), "compare");
    report::write_rows(&path, &rows)?;

    prompts::section_header("Summary");
    println!("  Both:          {}", count(Presence::Both).to_string().green());
    println!("  Source only:   {}", count(Presence::SourceOnly).to_string().yellow());
    println!("  Target only:   {}", count(Presence::TargetOnly).to_string().yellow());
    println!("  Neither:       {}", count(Presence::Neither));
    println!("  Errors:        {}", count(Presence::Error).to_string().red());
    prompts::success(&format!(
        "Report with {} row(s) written to {}",
        rows.len(),
        path.display()
    ));

    Ok(())
}
