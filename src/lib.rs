//! Characterization of kinetic inductance detector resonators: locating and fitting resonance
//! dips in frequency sweeps, and calibrating, deglitching and analysing tone timestreams.
pub mod calibration;
pub mod config;
pub mod deglitch;
pub mod diagnostics;
pub mod error;
pub mod fitting;
pub mod pipeline;
pub mod spectral;
pub mod utils;

#[cfg(feature = "python")]
mod python;
