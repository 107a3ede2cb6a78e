//! JSON run report.

use gravity_core::math::DeterrenceParameters;
use gravity_core::types::ZoneId;
use gravity_parallel::{AreaReport, OrchestratorReport};
use serde::Serialize;

/// Whole output file.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    /// Run counters.
    pub summary: Summary,
    /// One entry per input area, in input order.
    pub areas: Vec<AreaOutput>,
    /// All areas placed in the union zone system, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<MergedOutput>,
}

/// Run counters.
#[derive(Debug, Serialize)]
pub struct Summary {
    /// Areas submitted.
    pub areas: usize,
    /// Areas that converged.
    pub converged: usize,
    /// Areas that ran without converging.
    pub failed: usize,
    /// Areas that produced no result.
    pub errored: usize,
    /// Worker threads.
    pub workers: usize,
    /// Wall-clock milliseconds.
    pub elapsed_ms: u64,
}

/// One area's outcome.
#[derive(Debug, Serialize)]
pub struct AreaOutput {
    /// Area name.
    pub area: String,
    /// Segment name.
    pub segment: String,
    /// `converged`, `failed`, or `error`.
    pub status: String,
    /// Error message when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Calibration details when the area ran.
    #[serde(flatten)]
    pub calibration: Option<CalibrationOutput>,
}

/// Calibration details of one area.
#[derive(Debug, Serialize)]
pub struct CalibrationOutput {
    /// Calibrated or best-found parameters.
    pub parameters: DeterrenceParameters,
    /// Parameter updates across both attempts.
    pub iterations: usize,
    /// Seed-balance-evaluate runs.
    pub evaluations: usize,
    /// Sum of squared share differences.
    pub residual_error: f64,
    /// R² of achieved against target shares.
    pub r_squared: f64,
    /// Whether the fallback attempt ran.
    pub used_fallback: bool,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Whether the final balance converged.
    pub furness_converged: bool,
    /// Cells clipped at the overflow ceiling.
    pub overflow_clips: usize,
    /// Achieved band shares.
    pub achieved_shares: Vec<f64>,
    /// Target band shares.
    pub target_shares: Vec<f64>,
    /// Achieved mean trip cost.
    pub achieved_mean_cost: f64,
    /// Target mean trip cost.
    pub target_mean_cost: f64,
    /// Area zones, in matrix order.
    pub zones: Vec<ZoneId>,
    /// Balanced matrix rows, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<Vec<f64>>>,
}

/// Areas merged into one zone system.
#[derive(Debug, Serialize)]
pub struct MergedOutput {
    /// Zones of the merged matrix.
    pub zones: Vec<ZoneId>,
    /// Merged matrix rows.
    pub matrix: Vec<Vec<f64>>,
}

impl AreaOutput {
    fn from_report(report: &AreaReport, include_matrix: bool) -> Self {
        let (status, error, calibration) = match report.outcome() {
            Ok(result) => (
                result.status().to_string(),
                None,
                Some(CalibrationOutput {
                    parameters: result.parameters().clone(),
                    iterations: result.iterations(),
                    evaluations: result.evaluations(),
                    residual_error: result.residual_error(),
                    r_squared: result.r_squared(),
                    used_fallback: result.used_fallback(),
                    cancelled: result.cancelled(),
                    furness_converged: result.furness_converged(),
                    overflow_clips: result.overflow_clips(),
                    achieved_shares: result.achieved().shares.clone(),
                    target_shares: result.target_shares().to_vec(),
                    achieved_mean_cost: result.achieved().mean_cost,
                    target_mean_cost: result.target_mean_cost(),
                    zones: report.zones().to_vec(),
                    matrix: include_matrix.then(|| result.matrix().to_rows()),
                }),
            ),
            Err(e) => ("error".to_string(), Some(e.to_string()), None),
        };
        Self {
            area: report.area().to_string(),
            segment: report.segment().to_string(),
            status,
            error,
            calibration,
        }
    }
}

impl RunOutput {
    /// Builds the output from a finished run.
    pub fn from_report(report: &OrchestratorReport, include_matrices: bool, merged: Option<MergedOutput>) -> Self {
        let stats = report.stats();
        Self {
            summary: Summary {
                areas: stats.areas,
                converged: stats.converged,
                failed: stats.failed,
                errored: stats.errored,
                workers: stats.workers,
                elapsed_ms: stats.elapsed.as_millis() as u64,
            },
            areas: report
                .areas()
                .iter()
                .map(|r| AreaOutput::from_report(r, include_matrices))
                .collect(),
            merged,
        }
    }
}

/// Sorted union of every area's zones.
pub fn union_zones(report: &OrchestratorReport) -> Vec<ZoneId> {
    let mut zones: Vec<ZoneId> = report.areas().iter().flat_map(|r| r.zones().iter().copied()).collect();
    zones.sort_unstable();
    zones.dedup();
    zones
}
