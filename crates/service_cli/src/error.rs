//! CLI error types.

use gravity_core::config::ConfigError;
use gravity_core::types::ValidationError;
use gravity_parallel::OrchestratorError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// A named file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The run configuration failed to load or validate.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An area in the input bundle is malformed.
    #[error("Area {area}: {source}")]
    Area {
        /// Offending area
        area: String,
        /// What was wrong with it
        #[source]
        source: ValidationError,
    },

    /// Input outside any area is malformed.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// The run could not start.
    #[error("Run failed: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// Reading or writing a file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON could not be parsed or written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Attach an area name to a validation error.
    pub fn area(area: impl Into<String>, source: ValidationError) -> Self {
        Self::Area {
            area: area.into(),
            source,
        }
    }
}

/// Result alias for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;
