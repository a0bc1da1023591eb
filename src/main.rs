//! Site-Harvest main entry point
//!
//! This is the command-line interface for the Site-Harvest single-site crawler.

use anyhow::Context;
use clap::Parser;
use site_harvest::config::{load_config_with_hash, validate, Config};
use site_harvest::crawler::{run_crawl, CancelFlag};
use site_harvest::output::print_statistics;
use site_harvest::NormalizedUrl;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Site-Harvest: a single-site content harvester
///
/// Site-Harvest crawls one website breadth-first from a seed URL, staying on
/// the seed's host. It saves each page's text, metadata and images, plus the
/// site hierarchy and per-type page listings. Progress is checkpointed, so an
/// interrupted crawl leaves usable output and can be resumed.
#[derive(Parser, Debug)]
#[command(name = "site-harvest")]
#[command(version)]
#[command(about = "A polite single-site content harvester", long_about = None)]
struct Cli {
    /// Website URL to start from (http:// or https://)
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for all output (default: website_content)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Stop after recording this many pages
    #[arg(long, value_name = "N")]
    max_pages: Option<u64>,

    /// Do not follow links from pages at this depth
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Minimum delay between page fetches in milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Treat URLs that differ by query string as different pages
    #[arg(long)]
    keep_query: bool,

    /// List images without downloading them
    #[arg(long)]
    no_images: bool,

    /// Log file path (default: <output-dir>/crawl.log)
    #[arg(long, value_name = "FILE", conflicts_with = "no_log_file")]
    log_file: Option<PathBuf>,

    /// Only log to the console
    #[arg(long)]
    no_log_file: bool,

    /// Continue from the checkpoint in the output directory
    #[arg(long)]
    resume: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };
    apply_overrides(&mut config, &cli);
    validate(&config).context("Invalid configuration")?;

    // Nothing touches the filesystem until the seed is known to be usable
    NormalizedUrl::parse(&cli.url).with_context(|| format!("Invalid seed URL '{}'", cli.url))?;

    let output_dir = config.output.output_dir.clone();
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory {}", output_dir.display())
    })?;

    let log_path = (!cli.no_log_file).then(|| config.output.log_path());
    setup_logging(cli.verbose, cli.quiet, log_path.as_deref())?;

    if let Some(hash) = &config_hash {
        tracing::info!("Configuration loaded (hash: {})", hash);
    }
    tracing::info!(
        "Output directory: {}, delay: {}ms, max pages: {}",
        output_dir.display(),
        config.crawler.delay_ms,
        config
            .crawler
            .max_pages
            .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
    );

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    let outcome = run_crawl(config, &cli.url, config_hash, cli.resume, cancel)
        .await
        .context("Crawl failed")?;

    print_statistics(
        &outcome.stats,
        &outcome.listings,
        outcome.state,
        outcome.reason,
        &output_dir,
    );

    Ok(())
}

/// Applies command-line flags on top of the file configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(dir) = &cli.output_dir {
        config.output.output_dir = dir.clone();
    }
    if let Some(path) = &cli.log_file {
        config.output.log_file = Some(path.clone());
    }
    if let Some(max) = cli.max_pages {
        config.crawler.max_pages = Some(max);
    }
    if let Some(depth) = cli.max_depth {
        config.crawler.max_depth = Some(depth);
    }
    if let Some(delay) = cli.delay_ms {
        config.crawler.delay_ms = delay;
    }
    if cli.keep_query {
        config.crawler.keep_query = true;
    }
    if cli.no_images {
        config.crawler.download_images = false;
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Console output always; with `log_file`, the same events are appended to
/// that file without colours.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_harvest=info,warn"),
            1 => EnvFilter::new("site_harvest=debug,info"),
            2 => EnvFilter::new("site_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
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
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Sets the cancel flag on Ctrl-C; a second Ctrl-C exits immediately
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("Could not install Ctrl-C handler");
            return;
        }
        tracing::warn!("Interrupt received, finishing the current page and saving progress");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Second interrupt received, exiting without saving");
            std::process::exit(130);
        }
    });
}
