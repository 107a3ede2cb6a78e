//! Calibrator states.

use std::fmt;

/// State of a single-area calibration.
///
/// ```text
/// INITIALIZED -> SEEDING -> BALANCING -> EVALUATING -> CONVERGED
///                   ^                        |
///                   +------ ITERATING <------+
///                   +---- FALLBACK_RETRY <---+ (budget exhausted, once)
///                                            +-> FAILED (exhausted again)
/// ```
///
/// `Converged` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalibrationState {
    /// Inputs are being validated.
    Initialized,
    /// Building the deterrence-weighted seed.
    Seeding,
    /// Furness balancing the seed.
    Balancing,
    /// Comparing achieved and target band shares.
    Evaluating,
    /// Error within tolerance.
    Converged,
    /// Proposing a damped Gauss-Newton update.
    Iterating,
    /// Restarting once from the fallback parameters.
    FallbackRetry,
    /// Budget exhausted twice, or cancelled.
    Failed,
}

impl CalibrationState {
    /// Returns `true` for `Converged` and `Failed`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, CalibrationState::Converged | CalibrationState::Failed)
    }
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CalibrationState::Initialized => "INITIALIZED",
            CalibrationState::Seeding => "SEEDING",
            CalibrationState::Balancing => "BALANCING",
            CalibrationState::Evaluating => "EVALUATING",
            CalibrationState::Converged => "CONVERGED",
            CalibrationState::Iterating => "ITERATING",
            CalibrationState::FallbackRetry => "FALLBACK_RETRY",
            CalibrationState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(CalibrationState::Converged.is_terminal());
        assert!(CalibrationState::Failed.is_terminal());
        assert!(!CalibrationState::FallbackRetry.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(CalibrationState::FallbackRetry.to_string(), "FALLBACK_RETRY");
    }
}
