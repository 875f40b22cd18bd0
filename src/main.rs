use anyhow::{Context, Result};
use clap::Parser;
use rendermedic::backup::BackupManager;
use rendermedic::cache::WorkDir;
use rendermedic::config::Config;
use rendermedic::engine::{RepairReport, RepairSession};
use rendermedic::fix::Verification;
use rendermedic::util::truncate;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rendermedic",
    about = "Find and safely repair the defects that leave a front-end app rendering nothing",
    version
)]
struct Args {
    /// Path to the project (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Scan and report, never modify files
    #[arg(long)]
    scan_only: bool,

    /// Attempts of the full strategy chain before the nuclear fallback
    #[arg(long, value_name = "N")]
    max_retries: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Restore the snapshot taken by an earlier session and exit
    #[arg(long, value_name = "BACKUP_ID", conflicts_with = "scan_only")]
    rollback: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("Cannot open project at {}", args.path.display()))?;

    let mut config = Config::load(&root);
    if let Some(n) = args.max_retries {
        config.max_retries = n.max(1);
    }

    if let Some(backup_id) = &args.rollback {
        return rollback(&root, &config, backup_id, args.json);
    }

    let report = RepairSession::new(config)
        .scan_only(args.scan_only)
        .run(&root)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(if report.needs_attention() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn rollback(root: &Path, config: &Config, backup_id: &str, json: bool) -> Result<ExitCode> {
    let backups = BackupManager::new(WorkDir::new(root, &config.work_dir));
    let manifest = backups.load_manifest(backup_id)?;
    let restored = backups.restore_snapshot(&manifest)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "backupId": manifest.id,
                "restored": restored,
            }))?
        );
    } else {
        println!("Restored {} file(s) from backup {}", restored.len(), manifest.id);
        for file in &restored {
            println!("  {}", file.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RepairReport) {
    println!();
    println!("rendermedic · {}", report.project.display());
    println!("  mode       {}", report.mode.as_str());
    println!("  attempts   {}", report.attempts.len());

    if let Some(scan) = &report.scan {
        println!(
            "  strategy   {} ({} files examined, {} failed)",
            scan.strategy_name, scan.files_examined, scan.files_failed
        );

        println!();
        if scan.findings.is_empty() {
            println!("No findings.");
        } else {
            println!("Findings:");
            for finding in &scan.findings {
                println!(
                    "  [{}] {} {} - {}",
                    finding.severity(),
                    finding.location(),
                    finding.kind(),
                    truncate(finding.message(), 70)
                );
            }
        }
    }

    if !report.fixes.is_empty() {
        println!();
        println!("Fixes:");
        for record in &report.fixes {
            let marker = if record.applied { "+" } else { "·" };
            let detail = match &record.verification {
                Verification::Verified => record
                    .backup_path
                    .as_ref()
                    .map(|b| format!("backup {}", b.display()))
                    .unwrap_or_default(),
                Verification::Rejected(reason) => reason.clone(),
            };
            println!("  {} {} - {}", marker, record.finding.location(), detail);
        }
    }

    println!();
    println!("Recovery plan: {}", report.plan.status.as_str());
    if report.plan.rollback.possible {
        println!("  rollback: {}", report.plan.rollback.command);
    }

    if !report.instructions.is_empty() {
        println!();
        for line in &report.instructions {
            println!("  {}", line);
        }
    }
    println!();
}
