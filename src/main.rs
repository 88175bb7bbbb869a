//! Gerry-Harvest main entry point
//!
//! This is the command-line interface for the Gerry-Harvest change crawler.

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use gerry_harvest::config::{load_config, validate, Config, ResumeMode};
use gerry_harvest::crawler::{run_harvest, Coordinator};
use gerry_harvest::output::{load_statistics, print_statistics};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Gerry-Harvest: a resumable Gerrit change crawler
///
/// Harvests every closed change of a review server, one JSON file per
/// change, grouped in one directory per day. Re-running the same command
/// resumes an interrupted crawl.
#[derive(Parser, Debug)]
#[command(name = "gerry-harvest")]
#[command(version)]
#[command(about = "A resumable Gerrit change crawler", long_about = None)]
struct Cli {
    /// Name of the review server to crawl
    #[arg(value_name = "TARGET", required_unless_present = "list_targets")]
    target: Option<String>,

    /// Root directory for harvested data
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Exclusive end of the crawl (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    end_date: Option<NaiveDate>,

    /// Give up after this many passes over pending days
    #[arg(long, value_name = "N")]
    max_passes: Option<u32>,

    /// Resume granularity: day or change
    #[arg(long, value_name = "MODE")]
    resume: Option<ResumeMode>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// List the known review servers and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    list_targets: bool,

    /// Show what would be crawled without contacting the server
    #[arg(long, conflicts_with_all = ["stats", "list_targets"])]
    dry_run: bool,

    /// Show statistics of already harvested data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "list_targets"])]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = build_config(&cli)?;

    if cli.list_targets {
        handle_list_targets(&config);
        return Ok(());
    }

    let target_name = cli
        .target
        .as_deref()
        .context("a target name is required")?;

    if cli.dry_run {
        setup_logging(cli.verbose, cli.quiet, None)?;
        return handle_dry_run(&config, target_name);
    }

    if cli.stats {
        setup_logging(cli.verbose, cli.quiet, None)?;
        return handle_stats(&config, target_name);
    }

    std::fs::create_dir_all(&config.crawl.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.crawl.output_dir.display()
        )
    })?;
    let log_path = config
        .crawl
        .output_dir
        .join(format!("crawl-{target_name}.log"));
    setup_logging(cli.verbose, cli.quiet, Some(&log_path))?;

    handle_crawl(&config, target_name).await
}

/// Loads the configuration and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::builtin(),
    };

    if let Some(dir) = &cli.output_dir {
        config.crawl.output_dir = dir.clone();
    }
    if let Some(end_date) = cli.end_date {
        config.crawl.end_date = end_date;
    }
    if let Some(max_passes) = cli.max_passes {
        config.crawl.max_passes = Some(max_passes);
    }
    if let Some(resume) = cli.resume {
        config.crawl.resume = resume;
    }

    validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Events go to stderr and, during a crawl, are appended to the crawl's log
/// file as well.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("gerry_harvest=info,warn"),
            1 => EnvFilter::new("gerry_harvest=debug,info"),
            2 => EnvFilter::new("gerry_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Handles --list-targets: prints the known review servers
fn handle_list_targets(config: &Config) {
    println!("Known targets:");
    for target in &config.targets {
        println!(
            "  {:<12} {:<45} since {}{}",
            target.name,
            target.url,
            target.start_date,
            if target.reviewer_updates {
                ""
            } else {
                " (no reviewer updates)"
            }
        );
    }
}

/// Handles --dry-run: shows what a crawl would do
fn handle_dry_run(config: &Config, target_name: &str) -> anyhow::Result<()> {
    let target = config.target(target_name)?;
    let coordinator = Coordinator::new(config, target)?;
    let frames = coordinator.frames();

    println!("=== Gerry-Harvest Dry Run ===\n");
    println!("Target: {}", coordinator.target().name);
    println!("  URL: {}", coordinator.target().base_url);
    println!(
        "  Reviewer updates: {}",
        coordinator.target().capabilities.reviewer_updates
    );
    println!(
        "  Range: {} .. {} (exclusive)",
        coordinator.target().start_date,
        config.crawl.end_date
    );
    println!("  Days in range: {}", frames.len());
    println!(
        "  Output: {}",
        coordinator.store().changes_dir().display()
    );
    println!("  Resume mode: {}", config.crawl.resume.as_str());

    let pending = coordinator.store().pending_units(config.crawl.resume)?;
    let existing = coordinator.store().units()?.len();
    println!("\nExisting day directories: {}", existing);
    println!("Pending among them: {}", pending.len());

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles --stats: summarizes already harvested data
fn handle_stats(config: &Config, target_name: &str) -> anyhow::Result<()> {
    let target = config.target(target_name)?;
    let coordinator = Coordinator::new(config, target)?;

    println!("Data: {}\n", coordinator.store().changes_dir().display());
    let stats = load_statistics(coordinator.store(), config.crawl.resume)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, target_name: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Starting crawl of {} up to {} (will resume existing progress)",
        target_name,
        config.crawl.end_date
    );

    match run_harvest(config, target_name).await {
        Ok(report) => {
            tracing::info!(
                "Crawl completed: {} changes written in {} passes",
                report.changes_written,
                report.passes
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
