use thiserror::Error;

/// Enum of the reasons a resonator cannot be characterized.
///
/// Every variant is local to one resonator: the caller disables that resonator and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FittingError {
    /// The sweep has no dip that passes the Q and depth cuts
    #[error("Found no peaks")]
    NoPeakFound,

    /// The solver could not produce a result, for any reason
    #[error("{0}")]
    FitException(String),

    /// The solver finished but the parameters are not physical
    #[error("Got invalid fit parameter(s): {0}")]
    InvalidParameter(String),

    /// The fit range cannot leave enough degrees of freedom
    #[error("Fit range guess error: {points} points over [{begin}, {end}) leave fewer than {required} degrees of freedom")]
    WindowTooSmall {
        begin: usize,
        end: usize,
        points: usize,
        required: usize,
    },

    /// The sweep itself is unusable (mismatched or too short arrays)
    #[error("{0}")]
    InvalidSweep(String),
}
