//! Multi-area gravity model orchestration.
//!
//! [`GravityModelOrchestrator`] calibrates every area of a model on a bounded
//! rayon pool, one task per area. Inputs are published once into
//! [`SharedArrayPool`]s owned by the run; workers attach read-only views.
//! Results are collected in completion order and handed back in input
//! order. A failing area, including one whose worker panics, is recorded in
//! its own [`AreaReport`] and never touches its siblings.

use crate::error::{AreaError, OrchestratorError};
use crate::transport::{ArrayHandle, SharedArrayPool, TransportStats};
use crate::workers::resolve_worker_count;
use gravity_calibration::{CalibrationInputs, CalibrationResult, CalibratorConfig, CancellationToken, GravityCalibrator};
use gravity_core::config::DistributionConfig;
use gravity_core::types::{AreaId, AreaPartition, CostMatrix, OdMatrix, SegmentId, ValidationError, ZoneId};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one area.
pub type AreaOutcome = Result<CalibrationResult, AreaError>;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Settings shared by every area's calibrator.
    pub calibrator: CalibratorConfig,
    /// Requested pool size; see [`resolve_worker_count`].
    pub worker_count: i64,
    /// Replace zero intrazonal costs before publishing.
    pub intrazonal_cost_infill: Option<f64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&DistributionConfig::default())
    }
}

impl From<&DistributionConfig> for OrchestratorConfig {
    fn from(config: &DistributionConfig) -> Self {
        Self {
            calibrator: CalibratorConfig::from(config),
            worker_count: config.worker_count,
            intrazonal_cost_infill: config.intrazonal_cost_infill,
        }
    }
}

/// Hooks into an orchestrator run.
///
/// Called from worker threads. A panic in `area_started` is isolated to that
/// area like any other worker panic.
pub trait RunObserver: Send + Sync {
    /// A worker picked up `area`.
    fn area_started(&self, _area: &AreaId) {}

    /// `area` finished, successfully or not.
    fn area_finished(&self, _area: &AreaId, _outcome: &AreaOutcome) {}
}

/// Report for one area.
#[derive(Debug, Clone)]
pub struct AreaReport {
    area: AreaId,
    segment: SegmentId,
    zones: Vec<ZoneId>,
    outcome: AreaOutcome,
}

impl AreaReport {
    /// Area identifier.
    pub fn area(&self) -> &AreaId {
        &self.area
    }

    /// Segment the area was calibrated for.
    pub fn segment(&self) -> &SegmentId {
        &self.segment
    }

    /// Zones, in matrix order.
    pub fn zones(&self) -> &[ZoneId] {
        &self.zones
    }

    /// Calibration result or the area's error.
    pub fn outcome(&self) -> &AreaOutcome {
        &self.outcome
    }

    /// The calibration result, if the area ran to a terminal state.
    pub fn result(&self) -> Option<&CalibrationResult> {
        self.outcome.as_ref().ok()
    }

    /// The area's error, if it never produced a result.
    pub fn error(&self) -> Option<&AreaError> {
        self.outcome.as_ref().err()
    }

    /// Returns `true` if the area calibrated and converged.
    pub fn is_converged(&self) -> bool {
        self.result().is_some_and(CalibrationResult::is_converged)
    }
}

/// Run-level counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    /// Areas submitted.
    pub areas: usize,
    /// Areas that converged.
    pub converged: usize,
    /// Areas that ran but did not converge.
    pub failed: usize,
    /// Areas that produced no result.
    pub errored: usize,
    /// Worker threads used.
    pub workers: usize,
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// Shared-array traffic, after release.
    pub transport: TransportStats,
}

/// Results of a run, in input order.
#[derive(Debug, Clone)]
pub struct OrchestratorReport {
    reports: Vec<AreaReport>,
    completion_order: Vec<AreaId>,
    stats: RunStats,
}

impl OrchestratorReport {
    /// Per-area reports, in the order the areas were given.
    pub fn areas(&self) -> &[AreaReport] {
        &self.reports
    }

    /// Report for `area` (first segment if the ID repeats across segments).
    pub fn get(&self, area: &AreaId) -> Option<&AreaReport> {
        self.reports.iter().find(|r| &r.area == area)
    }

    /// Successful results keyed by area, in input order.
    pub fn results(&self) -> impl Iterator<Item = (&AreaId, &CalibrationResult)> {
        self.reports.iter().filter_map(|r| r.result().map(|res| (&r.area, res)))
    }

    /// Area IDs in the order their workers finished.
    pub fn completion_order(&self) -> &[AreaId] {
        &self.completion_order
    }

    /// Run counters.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Returns `true` if every area converged.
    pub fn all_converged(&self) -> bool {
        self.reports.iter().all(AreaReport::is_converged)
    }

    /// Places every area's matrix into the global zone system.
    ///
    /// Cells are summed where areas or segments overlap. Areas without a
    /// result contribute nothing.
    ///
    /// # Errors
    ///
    /// Fails if `zones` repeats a zone or an area uses a zone it lacks.
    pub fn merge(&self, zones: &[ZoneId]) -> Result<OdMatrix, ValidationError> {
        let mut index = HashMap::with_capacity(zones.len());
        for (i, zone) in zones.iter().enumerate() {
            if index.insert(*zone, i).is_some() {
                return Err(ValidationError::DuplicateZone(zone.to_string()));
            }
        }

        let n = zones.len();
        let mut merged = OdMatrix::zeros(n, n);
        for report in &self.reports {
            let Some(result) = report.result() else { continue };
            let mut global = Vec::with_capacity(report.zones.len());
            for zone in &report.zones {
                match index.get(zone) {
                    Some(&g) => global.push(g),
                    None => {
                        return Err(ValidationError::inconsistent(
                            "zone system",
                            format!("zone {} present in global zones", zone),
                            format!("zone {} only in area {}", zone, report.area),
                        ))
                    }
                }
            }
            let matrix = result.matrix();
            for (i, &gi) in global.iter().enumerate() {
                for (j, &gj) in global.iter().enumerate() {
                    let v = merged.get(gi, gj) + matrix.get(i, j);
                    merged.set(gi, gj, v);
                }
            }
        }
        Ok(merged)
    }
}

/// Published inputs of one area.
struct AreaTask<'a> {
    index: usize,
    area: &'a AreaPartition,
    productions: ArrayHandle,
    attractions: ArrayHandle,
    cost: Result<ArrayHandle, ValidationError>,
}

/// Calibrates many areas concurrently.
///
/// # Examples
///
/// ```rust
/// use gravity_parallel::{GravityModelOrchestrator, OrchestratorConfig};
/// use gravity_core::types::{AreaPartition, CostMatrix, TargetDistribution, TripEndVector};
///
/// let area = |id: &str| {
///     AreaPartition::builder(id)
///         .productions(TripEndVector::productions(id, vec![40.0, 60.0]).unwrap())
///         .attractions(TripEndVector::attractions(id, vec![50.0, 50.0]).unwrap())
///         .cost(CostMatrix::from_rows(&[vec![1.0, 6.0], vec![6.0, 1.0]]).unwrap())
///         .target(TargetDistribution::from_triples(&[(0.0, 3.0, 0.7), (3.0, 9.0, 0.3)]).unwrap())
///         .build()
///         .unwrap()
/// };
///
/// let orchestrator = GravityModelOrchestrator::new(OrchestratorConfig {
///     worker_count: 2,
///     ..Default::default()
/// })
/// .unwrap();
/// let report = orchestrator.run(&[area("north"), area("south")]).unwrap();
///
/// assert_eq!(report.areas()[0].area().as_str(), "north");
/// assert_eq!(report.areas()[1].area().as_str(), "south");
/// ```
pub struct GravityModelOrchestrator {
    config: OrchestratorConfig,
    calibrator: GravityCalibrator,
    pool: rayon::ThreadPool,
    workers: usize,
    observer: Option<Arc<dyn RunObserver>>,
}

impl GravityModelOrchestrator {
    /// Builds the worker pool.
    pub fn new(config: OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let workers = resolve_worker_count(config.worker_count);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("gravity-worker-{}", i))
            .build()?;
        debug!(workers, requested = config.worker_count, "worker pool ready");
        Ok(Self {
            calibrator: GravityCalibrator::new(config.calibrator.clone()),
            config,
            pool,
            workers,
            observer: None,
        })
    }

    /// Attaches run hooks.
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get the orchestrator configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Calibrates every area.
    pub fn run(&self, areas: &[AreaPartition]) -> Result<OrchestratorReport, OrchestratorError> {
        self.run_with_cancel(areas, &CancellationToken::new())
    }

    /// Calibrates every area, honouring `cancel`.
    ///
    /// Areas not yet started when `cancel` is set report
    /// [`AreaError::Cancelled`]; in-flight areas finish their current
    /// iteration and report a FAILED result.
    ///
    /// # Errors
    ///
    /// Only for run-level problems (duplicate areas). Per-area failures are
    /// in the report.
    pub fn run_with_cancel(
        &self,
        areas: &[AreaPartition],
        cancel: &CancellationToken,
    ) -> Result<OrchestratorReport, OrchestratorError> {
        let started = Instant::now();
        check_unique(areas)?;

        let arrays: SharedArrayPool<[f64]> = SharedArrayPool::new();
        let costs: SharedArrayPool<CostMatrix> = SharedArrayPool::new();
        let tasks = self.publish(areas, &arrays, &costs);
        info!(
            areas = areas.len(),
            workers = self.workers,
            cost_views = costs.stats().published,
            "starting gravity model run"
        );

        let completed = Mutex::new(Vec::with_capacity(tasks.len()));
        self.pool.scope(|scope| {
            for task in &tasks {
                let (arrays, costs, completed) = (&arrays, &costs, &completed);
                scope.spawn(move |_| {
                    let id = task.area.id();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        if let Some(observer) = &self.observer {
                            observer.area_started(id);
                        }
                        self.calibrate_area(task, arrays, costs, cancel)
                    }))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(area = %id, message = %message, "worker panicked; area isolated");
                        Err(AreaError::worker_panic(id.as_str(), message))
                    });
                    if let Some(observer) = &self.observer {
                        let notified = panic::catch_unwind(AssertUnwindSafe(|| observer.area_finished(id, &outcome)));
                        if let Err(payload) = notified {
                            let message = panic_message(payload.as_ref());
                            warn!(area = %id, message = %message, "observer panicked after area finished");
                        }
                    }
                    completed
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((task.index, outcome));
                });
            }
        });

        // Workers have quiesced; nothing can attach any more.
        arrays.release_all();
        costs.release_all();
        let transport = arrays.stats() + costs.stats();

        let completed = completed.into_inner().unwrap_or_else(PoisonError::into_inner);
        let completion_order = completed.iter().map(|(i, _)| areas[*i].id().clone()).collect();
        let mut outcomes: Vec<Option<AreaOutcome>> = (0..areas.len()).map(|_| None).collect();
        for (index, outcome) in completed {
            outcomes[index] = Some(outcome);
        }

        let reports: Vec<AreaReport> = areas
            .iter()
            .zip(outcomes)
            .map(|(area, outcome)| AreaReport {
                area: area.id().clone(),
                segment: area.segment().clone(),
                zones: area.zones().to_vec(),
                outcome: outcome
                    .unwrap_or_else(|| Err(AreaError::worker_panic(area.id().as_str(), "worker produced no result"))),
            })
            .collect();

        let converged = reports.iter().filter(|r| r.is_converged()).count();
        let errored = reports.iter().filter(|r| r.error().is_some()).count();
        let stats = RunStats {
            areas: reports.len(),
            converged,
            failed: reports.len() - converged - errored,
            errored,
            workers: self.workers,
            elapsed: started.elapsed(),
            transport,
        };
        info!(
            areas = stats.areas,
            converged = stats.converged,
            failed = stats.failed,
            errored = stats.errored,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "gravity model run complete"
        );

        Ok(OrchestratorReport {
            reports,
            completion_order,
            stats,
        })
    }

    /// Publishes every area's inputs once. Identical cost views are shared.
    fn publish<'a>(
        &self,
        areas: &'a [AreaPartition],
        arrays: &SharedArrayPool<[f64]>,
        costs: &SharedArrayPool<CostMatrix>,
    ) -> Vec<AreaTask<'a>> {
        let mut published: Vec<(&'a CostMatrix, Result<ArrayHandle, ValidationError>)> = Vec::new();
        areas
            .iter()
            .enumerate()
            .map(|(index, area)| {
                let cost = match published.iter().find(|(view, _)| view.same_view(area.cost())) {
                    Some((_, handle)) => handle.clone(),
                    None => {
                        let handle = self.prepare_cost(area.cost()).map(|cost| costs.publish(cost));
                        published.push((area.cost(), handle.clone()));
                        handle
                    }
                };
                AreaTask {
                    index,
                    area,
                    productions: arrays.publish(area.productions().values().to_vec()),
                    attractions: arrays.publish(area.attractions().values().to_vec()),
                    cost,
                }
            })
            .collect()
    }

    fn prepare_cost(&self, cost: &CostMatrix) -> Result<CostMatrix, ValidationError> {
        match self.config.intrazonal_cost_infill {
            Some(factor) => cost.with_intrazonal_infill(factor),
            None => Ok(cost.clone()),
        }
    }

    fn calibrate_area(
        &self,
        task: &AreaTask<'_>,
        arrays: &SharedArrayPool<[f64]>,
        costs: &SharedArrayPool<CostMatrix>,
        cancel: &CancellationToken,
    ) -> AreaOutcome {
        let area = task.area;
        if cancel.is_cancelled() {
            debug!(area = %area.id(), "skipping area after cancellation");
            return Err(AreaError::Cancelled(area.id().to_string()));
        }
        debug!(area = %area.id(), zones = area.n_zones(), "calibrating area");

        let productions = arrays.attach(task.productions)?;
        let attractions = arrays.attach(task.attractions)?;
        let cost = costs.attach(task.cost.clone()?)?;
        let inputs = CalibrationInputs {
            label: area.id().as_str(),
            productions: &productions,
            attractions: &attractions,
            cost: &cost,
            target: area.target(),
            initial: area.initial_parameters(),
            band_index: None,
        };
        let result = self.calibrator.calibrate_with_cancel(&inputs, cancel)?;
        debug!(area = %area.id(), status = %result.status(), "area complete");
        Ok(result)
    }
}

fn check_unique(areas: &[AreaPartition]) -> Result<(), OrchestratorError> {
    let mut seen = HashSet::with_capacity(areas.len());
    for area in areas {
        if !seen.insert((area.id(), area.segment())) {
            return Err(OrchestratorError::DuplicateArea {
                area: area.id().to_string(),
                segment: area.segment().to_string(),
            });
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
