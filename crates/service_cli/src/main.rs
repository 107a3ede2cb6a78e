//! Gravity CLI - Command Line Operations for Trip Distribution
//!
//! This is the operational entry point for the gravity model workspace.
//!
//! # Commands
//!
//! - `gravity calibrate --input <bundle.json>` - Calibrate every area and write results
//! - `gravity check [--input <bundle.json>]` - Validate configuration and inputs
//!
//! # Architecture
//!
//! As the **S**ervice layer, this crate wires configuration, input loading,
//! and the multi-area orchestrator together behind a command-line interface.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use gravity_core::config::DistributionConfig;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod input;
mod output;

pub use error::{CliError, Result};

use commands::calibrate::CalibrateOptions;

/// Configuration file used when `--config` is not given.
const DEFAULT_CONFIG: &str = "gravity.toml";

/// Gravity model trip distribution CLI
#[derive(Parser)]
#[command(name = "gravity")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (defaults to gravity.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate every area in an input bundle
    Calibrate {
        /// Path to the JSON area bundle
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker count override (0 = all CPUs, negative = all CPUs minus n)
        #[arg(short, long, allow_negative_numbers = true)]
        workers: Option<i64>,

        /// Include balanced matrices in the output
        #[arg(long)]
        matrices: bool,

        /// Include all areas merged into one zone system
        #[arg(long)]
        merge: bool,
    },

    /// Check configuration and, optionally, an input bundle
    Check {
        /// Path to a JSON area bundle to validate
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let explicit = cli.config.is_some();
    let config_path = cli.config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = load_config(&config_path, explicit);

    // Initialise tracing; RUST_LOG wins over the configured level
    let level = if cli.verbose {
        "debug"
    } else {
        config.as_ref().map_or("info", |c| c.log_level.as_str())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = config.with_context(|| format!("loading configuration from {}", config_path.display()))?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Calibrate {
            input,
            output,
            workers,
            matrices,
            merge,
        } => commands::calibrate::run(
            &config,
            &input,
            output.as_deref(),
            CalibrateOptions {
                workers,
                include_matrices: matrices,
                merge,
            },
        )?,
        Commands::Check { input } => commands::check::run(&config, input.as_deref())?,
    }
    Ok(())
}

/// Loads and validates the configuration, applying `GRAVITY_*` overrides.
///
/// A missing default file falls back to built-in defaults; a missing
/// explicit file is an error.
fn load_config(path: &Path, explicit: bool) -> Result<DistributionConfig> {
    if path.exists() {
        return Ok(DistributionConfig::load_with_env_and_validate(path)?);
    }
    if explicit {
        return Err(CliError::FileNotFound(path.display().to_string()));
    }
    let config = DistributionConfig::default().with_env_override();
    config.validate()?;
    Ok(config)
}
