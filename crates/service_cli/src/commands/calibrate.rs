//! Calibrate command implementation
//!
//! Loads an area bundle, calibrates every area on the worker pool, and
//! writes the JSON report.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use gravity_core::config::DistributionConfig;
use gravity_parallel::{GravityModelOrchestrator, OrchestratorConfig};
use tracing::{info, warn};

use crate::input::AreaBundle;
use crate::output::{union_zones, MergedOutput, RunOutput};
use crate::Result;

/// Options for the calibrate command.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrateOptions {
    /// Overrides the configured worker count.
    pub workers: Option<i64>,
    /// Include each area's balanced matrix.
    pub include_matrices: bool,
    /// Include the merged matrix over all zones.
    pub merge: bool,
}

/// Run the calibrate command
pub fn run(config: &DistributionConfig, input: &Path, output: Option<&Path>, options: CalibrateOptions) -> Result<()> {
    info!("Starting calibration...");
    info!("  Input bundle: {}", input.display());

    let areas = AreaBundle::load(input)?.into_areas(config)?;
    info!("  Areas: {}", areas.len());

    let mut orchestrator_config = OrchestratorConfig::from(config);
    if let Some(workers) = options.workers {
        orchestrator_config.worker_count = workers;
    }
    let orchestrator = GravityModelOrchestrator::new(orchestrator_config)?;
    info!("  Workers: {}", orchestrator.workers());

    let report = orchestrator.run(&areas)?;
    for area in report.areas() {
        match area.outcome() {
            Ok(result) => info!(
                area = %area.area(),
                segment = %area.segment(),
                status = %result.status(),
                r_squared = result.r_squared(),
                parameters = %result.parameters(),
                "area calibrated"
            ),
            Err(e) => warn!(area = %area.area(), error = %e, "area produced no result"),
        }
    }

    let merged = if options.merge {
        let zones = union_zones(&report);
        let matrix = report.merge(&zones)?.to_rows();
        Some(MergedOutput { zones, matrix })
    } else {
        None
    };
    let run_output = RunOutput::from_report(&report, options.include_matrices, merged);

    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &run_output)?;
            writer.flush()?;
            info!("Results written to: {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &run_output)?;
            writeln!(stdout)?;
        }
    }

    let stats = report.stats();
    if report.all_converged() {
        info!("Calibration complete: all {} areas converged", stats.areas);
    } else {
        warn!(
            "Calibration complete: {} converged, {} failed, {} errored",
            stats.converged, stats.failed, stats.errored
        );
    }
    Ok(())
}
