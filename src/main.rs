//! Thin CLI front end over the `syncnorris` library (SPEC_FULL.md A1/A6):
//! parses arguments, merges them over a loaded [`Config`], wires up
//! logging/output, drives one sync, and maps the finished [`Report`] to a
//! process exit code.

use clap::Parser;
use std::sync::Arc;
use syncnorris::cancel::CancellationToken;
use syncnorris::cli::{Cli, Command, ConfigAction, SyncArgs};
use syncnorris::config::Config;
use syncnorris::logger::{FileLogger, Logger, LogFormat, NullLogger};
use syncnorris::model::{ComparisonMethod, ConflictResolution, SyncMode, SyncOperation};
use syncnorris::output::{HumanFormatter, JsonFormatter, OutputFormatter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("syncnorris: {e:#}");
            2
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing(level: tracing::Level) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let verbose = cli.verbose > 0;
    match cli.command {
        Command::Version { short } => {
            if short {
                println!(env!("CARGO_PKG_VERSION"));
            } else {
                println!("syncnorris {}", env!("CARGO_PKG_VERSION"));
            }
            Ok(0)
        }
        Command::Config { action } => run_config(action),
        Command::Sync(args) => run_sync(args, false, verbose).await,
        Command::Compare(args) => run_sync(args, true, verbose).await,
    }
}

fn run_config(action: ConfigAction) -> anyhow::Result<i32> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(0)
        }
        ConfigAction::Init => {
            let path = Config::config_path()?;
            Config::write_default(&path)?;
            println!("wrote default configuration to {}", path.display());
            Ok(0)
        }
    }
}

/// Merges `args` over a loaded [`Config`] (CLI flags win whenever the flag
/// was not left at its clap default) and builds a validated
/// [`SyncOperation`].
fn build_operation(args: &SyncArgs, compare_mode: bool) -> anyhow::Result<SyncOperation> {
    args.validate()?;
    let config = Config::load()?;

    let comparison_method: ComparisonMethod = config
        .sync
        .comparison
        .unwrap_or_else(|| args.comparison.into());
    let conflict_resolution: ConflictResolution = config
        .sync
        .conflict_resolution
        .unwrap_or_else(|| args.conflict.into());
    let mode: SyncMode = config.sync.mode.unwrap_or_else(|| args.mode.into());

    let max_workers = syncnorris::resolve_max_workers(
        config.performance.max_workers.unwrap_or(args.parallel),
    );
    let buffer_size = config.performance.buffer_size.unwrap_or(args.buffer_size);
    let bandwidth_limit = match config.performance.bandwidth_limit {
        Some(limit) => limit,
        None => args.bandwidth_bytes_per_sec()?,
    };

    let mut exclude_patterns = config.exclude.clone();
    exclude_patterns.extend(args.exclude.iter().cloned());

    let dry_run = args.dry_run || compare_mode;

    Ok(SyncOperation::new(
        args.source.clone(),
        args.dest.clone(),
        mode,
        comparison_method,
        conflict_resolution,
        dry_run,
        args.delete,
        args.stateful,
        max_workers,
        bandwidth_limit,
        buffer_size,
        exclude_patterns,
    )?)
}

fn build_logger(args: &SyncArgs) -> anyhow::Result<Arc<dyn Logger>> {
    match &args.log_file {
        Some(path) => {
            let format: LogFormat = args.log_format.into();
            let level = args.log_level.into();
            let logger = FileLogger::new(path, level, format, 10 * 1024 * 1024, 5)?;
            Ok(Arc::new(logger))
        }
        None => Ok(Arc::new(NullLogger)),
    }
}

fn build_formatter(args: &SyncArgs, verbose: bool) -> Box<dyn OutputFormatter> {
    use syncnorris::cli::CliOutputFormat;
    match args.output {
        CliOutputFormat::Human => Box::new(HumanFormatter::new(verbose)),
        CliOutputFormat::Json => Box::new(JsonFormatter),
    }
}

async fn run_sync(args: SyncArgs, compare_mode: bool, verbose: bool) -> anyhow::Result<i32> {
    let operation = build_operation(&args, compare_mode)?;
    let logger = build_logger(&args)?;
    let formatter = build_formatter(&args, verbose);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let source_display = args.source.display().to_string();
    let dest_display = args.dest.display().to_string();
    logger.info("sync started", &[("source", source_display.as_str()), ("dest", dest_display.as_str())]);

    let report = syncnorris::run_local_sync(&operation, cancel).await?;

    formatter.on_scan_complete(report.snapshot().scanned);
    for difference in report.differences() {
        formatter.on_event(&syncnorris::output::ReportEvent {
            relative_path: &difference.relative_path,
            action: action_for(difference.reason),
            reason: Some(difference.details.as_str()),
        });
    }
    formatter.on_finish(&report);

    if let Some(diff_report_path) = &args.diff_report {
        write_diff_report(diff_report_path, &report, operation.dry_run, args.diff_format)?;
    }

    let status_display = format!("{:?}", report.status());
    logger.info("sync finished", &[("status", status_display.as_str())]);
    logger.close();

    Ok(syncnorris::exit_code(&report, compare_mode))
}

fn action_for(reason: syncnorris::model::DifferenceReason) -> syncnorris::model::Action {
    use syncnorris::model::{Action, DifferenceReason};
    match reason {
        DifferenceReason::OnlyInSource => Action::Copy,
        DifferenceReason::HashDifferent | DifferenceReason::ContentDifferent | DifferenceReason::SizeDifferent => {
            Action::Update
        }
        DifferenceReason::Deleted => Action::Delete,
        DifferenceReason::Skipped => Action::Skip,
        DifferenceReason::CopyError | DifferenceReason::UpdateError | DifferenceReason::OnlyInDest => Action::Conflict,
    }
}

fn write_diff_report(
    path: &std::path::Path,
    report: &syncnorris::report::Report,
    dry_run: bool,
    format: syncnorris::cli::CliOutputFormat,
) -> anyhow::Result<()> {
    use syncnorris::cli::CliOutputFormat;
    use syncnorris::output::{render_diff_report, DiffReportFormat};
    let format = match format {
        CliOutputFormat::Json => DiffReportFormat::Json,
        CliOutputFormat::Human => DiffReportFormat::Human,
    };
    std::fs::write(path, render_diff_report(report, dry_run, format))?;
    Ok(())
}
