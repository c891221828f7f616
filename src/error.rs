use crate::calibration::CalibrationError;
use crate::fitting::common::error::FittingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KidfitError {
    /// Represents a resonator that could not be fitted
    #[error("{0}")]
    Fitting(#[from] FittingError),

    /// Represents a timestream that could not be calibrated
    #[error("{0}")]
    Calibration(#[from] CalibrationError),

    /// Input arrays that cannot describe a sweep or readout
    #[error("{0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_component_errors() {
        let fitting: KidfitError = FittingError::NoPeakFound.into();
        assert!(matches!(fitting, KidfitError::Fitting(FittingError::NoPeakFound)));
        assert_eq!(fitting.to_string(), "Found no peaks");

        let calibration: KidfitError = CalibrationError::ZeroMean(1.5).into();
        assert!(matches!(calibration, KidfitError::Calibration(_)));
        assert_eq!(calibration.to_string(), "Blind tone at 1.5 GHz has zero mean");
    }
}
