//! Tunable settings of each processing stage.
//!
//! Every struct has a `Default` holding the reduction pipeline's values and derives serde with
//! `#[serde(default)]`, so a partial JSON document only overrides what it names.
use serde::{Deserialize, Serialize};

/// Settings for locating resonance dips in a sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakSearchConfig {
    /// Savitzky-Golay window length (made odd); 15 if unset
    pub smooth: Option<usize>,

    /// Second-derivative detection threshold; estimated from the data if unset
    pub threshold: Option<f64>,

    /// Candidates with a smaller Lorentzian Q are rejected
    pub min_q: f64,

    /// Candidates with a larger `(background - depth) / background` are rejected
    pub max_ratio: f64,
}

impl Default for PeakSearchConfig {
    fn default() -> Self {
        PeakSearchConfig {
            smooth: None,
            threshold: None,
            min_q: 100.0,
            max_ratio: 1.0,
        }
    }
}

/// Settings for the resonance model fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Half-width of the fit window in units of the peak's half-widths; the whole sweep if <= 0
    pub nfwhm: f64,

    /// Relative reduction of the cost below which the solver stops
    pub ftol: f64,

    /// Relative step size below which the solver stops
    pub xtol: f64,

    /// Scaled-gradient size below which the solver stops
    pub gtol: f64,

    pub max_iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            nfwhm: 5.0,
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            gtol: 0.0,
            max_iterations: 1800,
        }
    }
}

/// Statistic used to identify glitches
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GlitchMode {
    /// Threshold on the discrete second derivative
    SecondDerivative,

    /// Threshold on the residual from a boxcar mean of `smrange` samples
    RollingMean { smrange: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlitchConfig {
    pub mode: GlitchMode,

    /// Samples within this many sigma define the baseline noise
    pub baseline_thresh: f64,

    /// Samples beyond this many sigma are glitches
    pub glitch_thresh: f64,

    /// Flags separated by at most this many samples are merged
    pub clusterize_thresh: usize,

    /// Each flag is extended forward by this many samples
    pub offset: usize,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        GlitchConfig {
            mode: GlitchMode::SecondDerivative,
            baseline_thresh: 6.0,
            glitch_thresh: 5.0,
            clusterize_thresh: 2,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    None,
    Hann,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsdConfig {
    /// Number of chunks averaged
    pub ndivide: usize,
    pub window: Window,

    /// Chunks of twice the length, overlapping by half
    pub overlap_half: bool,
}

impl Default for PsdConfig {
    fn default() -> Self {
        PsdConfig {
            ndivide: 1,
            window: Window::Hann,
            overlap_half: false,
        }
    }
}

/// Settings for one resonator's full pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub peaks: PeakSearchConfig,
    pub fit: FitConfig,
    pub glitch: GlitchConfig,

    /// PSD of the calibrated phase; skipped if unset
    pub psd: Option<PsdConfig>,

    /// Block size for rebinning the calibrated timestream; 1 keeps every sample
    pub downsample: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            peaks: PeakSearchConfig::default(),
            fit: FitConfig::default(),
            glitch: GlitchConfig::default(),
            psd: None,
            downsample: 1,
        }
    }
}
