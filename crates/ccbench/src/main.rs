//! ccbench
//!
//! - `run` (default): prompts for link parameters, runs the benchmark grid,
//!   renders charts and serves the results viewer
//! - `report`: re-renders charts and tables from existing datasets
//! - `serve`: serves the results viewer only

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ccbench::config::BenchConfig;
use ccbench::runner::Runner;
use ccbench::web::ViewerDirs;
use ccbench::{charts, dataset, params, web};

/// TCP congestion-control benchmark driver.
#[derive(Parser, Debug)]
#[command(name = "ccbench", about = "TCP congestion-control benchmark over an emulated network")]
struct Cli {
    /// Optional TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Prompt for parameters, run every test, chart and serve the results.
    Run,
    /// Render charts and tables from the existing datasets.
    Report,
    /// Serve the results viewer.
    Serve,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BenchConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            run(&config)?;
            report(&config)?;
            serve(&config)
        }
        Command::Report => report(&config),
        Command::Serve => serve(&config),
    }
}

fn run(config: &BenchConfig) -> anyhow::Result<()> {
    let params = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut out = io::stdout();
        params::prompt_params(&mut input, &mut out)?
    };
    tracing::info!(
        bandwidth_gbps = params.bandwidth_gbps,
        loss_percent = params.loss_percent,
        delay_ms = params.delay_ms,
        repetitions = params.repetitions,
        variants = %config.variants.join(","),
        "benchmark campaign starting"
    );

    let mut runner = Runner::new(config, params)?;
    let summary = runner.run_grid()?;
    println!(
        "All tests finished ({} recorded, {} dropped).\nResults at http://{}",
        summary.recorded, summary.dropped, config.listen_addr
    );
    Ok(())
}

fn report(config: &BenchConfig) -> anyhow::Result<()> {
    let records = dataset::load_all(&config.paths.dataset_dir)?;
    charts::render_all(&records, &config.paths.charts_dir, &config.paths.tables_dir)?;
    Ok(())
}

fn serve(config: &BenchConfig) -> anyhow::Result<()> {
    let dirs = ViewerDirs {
        charts: config.paths.charts_dir.clone(),
        tables: config.paths.tables_dir.clone(),
    };
    let handle = web::spawn(config.listen_addr, dirs).context("starting results viewer")?;
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("results viewer thread panicked"))?
}
