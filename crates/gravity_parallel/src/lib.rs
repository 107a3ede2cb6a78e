//! # gravity_parallel (L3: Orchestration)
//!
//! Runs the single-area calibrator over every area of a model on a bounded
//! worker pool.
//!
//! This crate provides:
//! - `transport`: Publish/attach/release pool of immutable shared arrays
//! - `orchestrator`: The multi-area run, per-area isolation, and result merging
//! - `workers`: Worker-count resolution against the CPU count
//! - `error`: Transport, per-area, and run-level errors
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          gravity_parallel (L3)          │
//! │  publish → dispatch → collect → release │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │        gravity_calibration (L2)         │
//! └─────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod error;
pub mod orchestrator;
pub mod transport;
pub mod workers;

pub use error::{AreaError, OrchestratorError, TransportError};
pub use orchestrator::{
    AreaOutcome, AreaReport, GravityModelOrchestrator, OrchestratorConfig, OrchestratorReport, RunObserver, RunStats,
};
pub use transport::{ArrayHandle, ArrayView, SharedArrayPool, TransportStats};
