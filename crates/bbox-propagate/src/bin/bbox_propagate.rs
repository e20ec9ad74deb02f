//! bbox-propagate CLI: replay recorded matches and propagate labels across a group.

use bbox_propagate::{
    PrecomputedMatches, PrecomputedProvider, PropagateConfig, PropagationReport, Propagator,
    Strategy,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[cfg(not(feature = "tracing"))]
use bbox_propagate::core::LogSpec;
#[cfg(not(feature = "tracing"))]
use log::{info, warn, LevelFilter};

#[cfg(feature = "tracing")]
use tracing::info;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Parser)]
#[command(name = "bbox-propagate")]
#[command(about = "Propagate rectangle labels from a reference image to the rest of its group")]
#[command(version)]
struct Cli {
    /// JSON job file (reference, peers, rectangles, params).
    #[arg(long)]
    config: PathBuf,

    /// Recorded matcher output; overrides `matches_path` from the config.
    #[arg(long)]
    matches: Option<PathBuf>,

    /// Report destination; overrides `output_path` from the config.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Projection strategy (global | local); overrides the config.
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Log level, optionally per target (`info,bbox_propagate_core=debug`);
    /// defaults to $BBOX_PROPAGATE_LOG, then `info`. Ignored with the `tracing` feature.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines (only with the `tracing` feature).
    #[arg(long)]
    json_logs: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli) {
        eprintln!("bbox-propagate: cannot install logger: {err}");
    }
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bbox-propagate: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    match cli.log_level.as_deref() {
        Some(spec) => {
            let spec = spec.parse::<LogSpec>()?;
            bbox_propagate::core::init_with_spec(spec)?;
        }
        None => bbox_propagate::core::init_from_env(LevelFilter::Info)?,
    }
    if cli.json_logs {
        warn!("--json-logs needs the `tracing` feature, logging as plain text");
    }
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    bbox_propagate::core::init_tracing(cli.json_logs);
    Ok(())
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip(cli), fields(config = %cli.config.display())))]
fn run(cli: &Cli) -> CliResult<()> {
    let mut cfg = PropagateConfig::load_json(&cli.config)?;
    if let Some(strategy) = cli.strategy {
        cfg.params.strategy = strategy;
    }
    cfg.validate()?;

    let matches_path = cli
        .matches
        .clone()
        .or_else(|| cfg.matches_path())
        .ok_or("no matches file: pass --matches or set matches_path in the config")?;
    let output_path = cli.output.clone().unwrap_or_else(|| cfg.output_path());

    let record = PrecomputedMatches::load_json(resolve(&cli.config, &matches_path))?;
    info!(
        "{} peers, {} rectangles, strategy {}",
        cfg.peers.len(),
        cfg.rectangles.len(),
        cfg.params.strategy
    );

    let propagator = Propagator::from_config(&cfg)?;
    let mut provider = PrecomputedProvider::new(record);
    let mut report = PropagationReport::new(&cfg, &cli.config);

    let started = Instant::now();
    let result = propagator.run(
        &mut provider,
        &cfg.reference,
        &cfg.peers,
        &cfg.reference_rectangles(),
    );
    match result {
        Ok(batch) => {
            report.set_batch(&batch, &cfg.rectangles, started.elapsed());
            report.write_json(&output_path)?;
            println!(
                "{} of {} peers projected, {} skipped; report written to {}",
                batch.len() - batch.skipped_count(),
                cfg.peers.len(),
                batch.skipped_count(),
                output_path.display()
            );
            Ok(())
        }
        Err(err) => {
            report.set_error(&err);
            report.write_json(&output_path)?;
            Err(err.into())
        }
    }
}

/// Relative paths in a config are taken relative to the config file.
fn resolve(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    config_path
        .parent()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}
