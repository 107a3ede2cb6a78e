//! Check command implementation
//!
//! Validates the configuration and, optionally, an input bundle without
//! running any calibration.

use std::path::Path;

use gravity_core::config::DistributionConfig;
use gravity_parallel::workers::resolve_worker_count;
use tracing::info;

use crate::input::AreaBundle;
use crate::Result;

/// Run the check command
pub fn run(config: &DistributionConfig, input: Option<&Path>) -> Result<()> {
    info!("Checking configuration...");
    info!("  Deterrence function: {}", config.deterrence_function);
    info!(
        "  Furness: {} iterations, tolerance {:e}",
        config.max_furness_iterations, config.furness_tolerance
    );
    info!(
        "  Calibration: {} iterations, tolerance {:e}",
        config.max_calibration_iterations, config.calibration_tolerance
    );
    info!(
        "  Workers: {} (resolved from {})",
        resolve_worker_count(config.worker_count),
        config.worker_count
    );

    if let Some(path) = input {
        info!("Checking input bundle: {}", path.display());
        let areas = AreaBundle::load(path)?.into_areas(config)?;
        for area in &areas {
            info!(
                "  Area {} ({}): {} zones, {} bands, {}",
                area.id(),
                area.segment(),
                area.n_zones(),
                area.target().len(),
                area.initial_parameters()
            );
        }
        info!("  {} areas OK", areas.len());
    }

    info!("Configuration OK");
    Ok(())
}
