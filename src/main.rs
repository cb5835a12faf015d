// Copyright 2026 Pagewatch Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pagewatch::config::{WatchConfig, WatchMode};
use pagewatch::notify::{ConsoleNotifier, Notifier};
use pagewatch::notify::webhook::WebhookNotifier;
use pagewatch::reconcile::Reconciler;
use pagewatch::source::browser::ChromiumSource;
use pagewatch::source::page::{PageShape, PageTextSource};
use pagewatch::source::ObservationSource;
use pagewatch::store::file::FileStore;
use pagewatch::store::BaselineStore;

#[derive(Parser)]
#[command(
    name = "pagewatch",
    about = "Pagewatch — observe a page, diff against a stored baseline, notify on change",
    version,
    after_help = "Run 'pagewatch <command> --help' for details on each command.\n\
                  Scheduling is external: run 'pagewatch check' from cron or a systemd timer."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one observe/compare/notify cycle
    Check {
        /// Path to the watch config file
        #[arg(long, short)]
        config: PathBuf,
        /// Print the outcome as JSON (machine-readable)
        #[arg(long)]
        json: bool,
    },
    /// Show the stored baseline for the configured target
    Show {
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Delete the stored baseline (administrative reset)
    Reset {
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Check { config, json } => check(&config, json).await,
        Commands::Show { config } => show(&config).await,
        Commands::Reset { config } => reset(&config).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn build_source(config: &WatchConfig) -> Box<dyn ObservationSource> {
    match config.mode {
        WatchMode::Render => Box::new(ChromiumSource::new(
            &config.url,
            config.viewport_width,
            config.viewport_height,
            config.timeout_ms,
        )),
        WatchMode::Text => Box::new(PageTextSource::new(
            &config.url,
            &config.selector,
            PageShape::Lines,
            config.timeout_ms,
        )),
        WatchMode::Labels => Box::new(PageTextSource::new(
            &config.url,
            &config.selector,
            PageShape::Labels,
            config.timeout_ms,
        )),
    }
}

fn build_notifier(config: &WatchConfig) -> Box<dyn Notifier> {
    match &config.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url, config.timeout_ms)),
        None => Box::new(ConsoleNotifier),
    }
}

async fn check(config_path: &PathBuf, json: bool) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let reconciler = Reconciler::new(
        build_source(&config),
        Box::new(FileStore::new(config.resolved_state_dir())),
        build_notifier(&config),
        config.cycle_settings()?,
    );

    let outcome = reconciler.run_cycle().await?;

    if json {
        let summary = outcome.change().map(|c| c.summary());
        println!(
            "{}",
            serde_json::json!({
                "outcome": outcome.label(),
                "target": config.url,
                "change": summary,
            })
        );
    } else {
        match outcome.change() {
            Some(change) => println!("{}: {}", outcome.label(), change.summary()),
            None => println!("{}", outcome.label()),
        }
    }
    Ok(())
}

async fn show(config_path: &PathBuf) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let store = FileStore::new(config.resolved_state_dir());
    let key = config.baseline_key()?;

    match store.load(&key).await? {
        Some(baseline) => {
            println!("key:         {key}");
            println!("kind:        {}", baseline.observation.kind());
            println!("sequence:    {}", baseline.sequence);
            println!("captured at: {}", baseline.captured_at.to_rfc3339());
            println!("payload:     {}", baseline.observation.summary());
        }
        None => println!("no baseline stored for {key}"),
    }
    Ok(())
}

async fn reset(config_path: &PathBuf) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    let store = FileStore::new(config.resolved_state_dir());
    let key = config.baseline_key()?;

    store.clear(&key).await?;
    println!("baseline cleared for {key}");
    Ok(())
}
