use crate::fitting::common::error::FittingError;
use crate::fitting::resonance::model::ModelParams;
use crate::utils::constants::HZ_TO_GHZ;
use num_complex::Complex64;
use serde::Serialize;
use std::ops::Range;

/// One frequency sweep of a resonator. Frequencies are in GHz and strictly ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    freq: Vec<f64>,
    i: Vec<f64>,
    q: Vec<f64>,
}

impl SweepRecord {
    pub fn new(freq: Vec<f64>, i: Vec<f64>, q: Vec<f64>) -> Result<SweepRecord, FittingError> {
        if freq.len() != i.len() || freq.len() != q.len() {
            Err(FittingError::InvalidSweep(format!(
                "Sweep arrays differ in length: freq {}, I {}, Q {}",
                freq.len(),
                i.len(),
                q.len()
            )))?
        }
        if freq.len() < 2 {
            Err(FittingError::InvalidSweep(
                "Sweep needs at least two points".to_string(),
            ))?
        }
        if freq.windows(2).any(|w| w[1] <= w[0]) {
            Err(FittingError::InvalidSweep(
                "Sweep frequencies are not strictly ascending".to_string(),
            ))?
        }
        Ok(SweepRecord { freq, i, q })
    }

    /// Builds a sweep from frequencies in Hz
    pub fn from_hz(freq_hz: &[f64], i: Vec<f64>, q: Vec<f64>) -> Result<SweepRecord, FittingError> {
        SweepRecord::new(freq_hz.iter().map(|f| f * HZ_TO_GHZ).collect(), i, q)
    }

    pub fn from_iq(freq: Vec<f64>, iq: &[Complex64]) -> Result<SweepRecord, FittingError> {
        let i = iq.iter().map(|z| z.re).collect();
        let q = iq.iter().map(|z| z.im).collect();
        SweepRecord::new(freq, i, q)
    }

    pub fn len(&self) -> usize {
        self.freq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }

    /// Frequencies in GHz
    pub fn frequency(&self) -> &[f64] {
        &self.freq
    }

    pub fn i(&self) -> &[f64] {
        &self.i
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    /// Spacing of the first two frequencies
    pub fn spacing(&self) -> f64 {
        self.freq[1] - self.freq[0]
    }

    pub fn amplitude(&self) -> Vec<f64> {
        self.i
            .iter()
            .zip(self.q.iter())
            .map(|(i, q)| (i * i + q * q).sqrt())
            .collect()
    }

    pub fn iq(&self) -> Vec<Complex64> {
        self.i
            .iter()
            .zip(self.q.iter())
            .map(|(&i, &q)| Complex64::new(i, q))
            .collect()
    }

    /// Phase of each sample in degrees
    pub fn phase_deg(&self) -> Vec<f64> {
        self.i
            .iter()
            .zip(self.q.iter())
            .map(|(i, q)| q.atan2(*i).to_degrees())
            .collect()
    }
}

/// A resonance dip found in a sweep, with its Lorentzian pre-fit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakCandidate {
    /// Sweep index closest to `center_freq`
    pub center_index: usize,
    pub center_freq: f64,
    pub q_estimate: f64,
    pub depth: f64,

    /// Constant level of the Lorentzian fit
    pub background: f64,

    /// Index counts from the center to the left/right half maximum
    pub half_width_left: usize,
    pub half_width_right: usize,

    /// Smoothed amplitude three half-widths below the center
    pub off_resonance: f64,

    /// Smoothed amplitude at the center
    pub on_resonance: f64,
}

/// Index range `[begin, end)` of the sweep used by a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FitWindow {
    pub begin: usize,
    pub end: usize,
}

impl FitWindow {
    pub fn new(begin: usize, end: usize, len: usize) -> Result<FitWindow, FittingError> {
        if begin >= end || end > len {
            Err(FittingError::FitException(format!(
                "Invalid fit window [{begin}, {end}) for {len} points"
            )))?
        }
        Ok(FitWindow { begin, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }

    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }
}

/// A fitted value and its standard error, if one could be estimated
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitValue {
    pub value: f64,
    pub stderr: Option<f64>,
}

impl FitValue {
    pub fn new(value: f64, stderr: Option<f64>) -> FitValue {
        FitValue { value, stderr }
    }
}

/// Result of a resonance fit: the eight model parameters and the derived internal Q
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResonanceParameters {
    pub arga: FitValue,
    pub absa: FitValue,
    pub tau: FitValue,
    pub fr: FitValue,
    pub qr: FitValue,
    pub qc: FitValue,
    pub phi0: FitValue,
    pub c: FitValue,
    pub qi: FitValue,
    pub chi_squared: f64,
    pub reduced_chi_squared: f64,
    pub iterations: usize,
}

impl ResonanceParameters {
    /// The fitted values as model parameters
    pub fn model(&self) -> ModelParams {
        ModelParams {
            arga: self.arga.value,
            absa: self.absa.value,
            tau: self.tau.value,
            fr: self.fr.value,
            qr: self.qr.value,
            qc: self.qc.value,
            phi0: self.phi0.value,
            c: self.c.value,
        }
    }

    /// The nine values under their conventional names
    pub fn named(&self) -> [(&'static str, FitValue); 9] {
        [
            ("arga", self.arga),
            ("absa", self.absa),
            ("tau", self.tau),
            ("fr", self.fr),
            ("Qr", self.qr),
            ("Qc", self.qc),
            ("phi0", self.phi0),
            ("c", self.c),
            ("Qi", self.qi),
        ]
    }
}

/// Usability of one resonator after characterization
#[derive(Debug, Clone, PartialEq)]
pub enum ResonatorState {
    Enabled {
        params: ResonanceParameters,
        window: FitWindow,
    },
    Disabled(FittingError),
}

impl ResonatorState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ResonatorState::Enabled { .. })
    }

    pub fn params(&self) -> Option<&ResonanceParameters> {
        match self {
            ResonatorState::Enabled { params, .. } => Some(params),
            ResonatorState::Disabled(_) => None,
        }
    }

    pub fn window(&self) -> Option<FitWindow> {
        match self {
            ResonatorState::Enabled { window, .. } => Some(*window),
            ResonatorState::Disabled(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&FittingError> {
        match self {
            ResonatorState::Enabled { .. } => None,
            ResonatorState::Disabled(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_rejects_bad_arrays() {
        assert!(SweepRecord::new(vec![1.0, 2.0], vec![0.0], vec![0.0, 0.0]).is_err());
        assert!(SweepRecord::new(vec![1.0], vec![0.0], vec![0.0]).is_err());
        assert!(SweepRecord::new(vec![2.0, 1.0], vec![0.0; 2], vec![0.0; 2]).is_err());
        let sweep = SweepRecord::from_hz(&[1e9, 2e9], vec![3.0, 0.0], vec![4.0, 1.0]).unwrap();
        assert_eq!(sweep.frequency(), &[1.0, 2.0]);
        assert_eq!(sweep.amplitude(), vec![5.0, 1.0]);
        assert!((sweep.phase_deg()[1] - 90.0).abs() < 1e-12);
    }

    #[test]
    fn window_bounds() {
        assert!(FitWindow::new(3, 3, 10).is_err());
        assert!(FitWindow::new(0, 11, 10).is_err());
        let window = FitWindow::new(2, 10, 10).unwrap();
        assert_eq!(window.len(), 8);
        assert_eq!(window.range(), 2..10);
    }
}
