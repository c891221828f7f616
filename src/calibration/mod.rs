use thiserror::Error;

pub mod blind_tone;
pub mod rewind;
pub mod timestream;
pub mod tones;

/// Enum of the reasons a readout cannot be calibrated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// The reference tones do not bracket the signal tone in frequency
    #[error("Blind tones at {left} and {right} GHz do not bracket the signal at {signal} GHz")]
    Unbracketed { left: f64, right: f64, signal: f64 },

    /// A reference tone averages to zero and cannot normalize anything
    #[error("Blind tone at {0} GHz has zero mean")]
    ZeroMean(f64),

    #[error("Stream lengths differ: {0}")]
    LengthMismatch(String),

    /// Raw readout arrays that cannot be turned into a stream
    #[error("{0}")]
    InvalidReadout(String),
}
