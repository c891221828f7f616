use crate::calibration::blind_tone::{calibrate_with_blind_tones, Tone};
use crate::calibration::rewind::{
    fix_phase_jump, rewind_sweep, rewind_tone, rewound_amplitude, rewound_phase,
};
use crate::calibration::CalibrationError;
use crate::config::GlitchConfig;
use crate::deglitch::detect::{find_glitch, GlitchDetection};
use crate::deglitch::interpolate::interpolate_bad;
use crate::diagnostics::Diagnostics;
use crate::fitting::common::fitstruct::{ResonanceParameters, SweepRecord};
use crate::fitting::resonance::fitter::fitted_curve;
use crate::utils::constants::HZ_TO_GHZ;
use crate::utils::interp::{interp_extrapolate, rebin, sorted_table};
use num_complex::Complex64;
use serde::Serialize;

/// Raw time-ordered samples of one tone
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub timestamps: Vec<f64>,
    pub iq: Vec<Complex64>,

    /// Tone frequency (GHz)
    pub frequency: f64,
}

impl Readout {
    pub fn new(
        timestamps: Vec<f64>,
        iq: Vec<Complex64>,
        frequency: f64,
    ) -> Result<Readout, CalibrationError> {
        if timestamps.len() != iq.len() {
            Err(CalibrationError::InvalidReadout(format!(
                "{} timestamps for {} samples",
                timestamps.len(),
                iq.len()
            )))?
        }
        Ok(Readout {
            timestamps,
            iq,
            frequency,
        })
    }

    /// Builds a readout from raw I/Q counts, dividing by the gain normalization and converting
    /// the tone frequency from Hz
    pub fn from_raw(
        timestamps: Vec<f64>,
        i: &[f64],
        q: &[f64],
        gain: f64,
        frequency_hz: f64,
    ) -> Result<Readout, CalibrationError> {
        if i.len() != q.len() {
            Err(CalibrationError::InvalidReadout(format!(
                "{} I samples but {} Q samples",
                i.len(),
                q.len()
            )))?
        }
        if gain == 0.0 || !gain.is_finite() {
            Err(CalibrationError::InvalidReadout(format!(
                "Gain normalization must be finite and non-zero, got {gain}"
            )))?
        }
        let iq = i
            .iter()
            .zip(q.iter())
            .map(|(&i, &q)| Complex64::new(i / gain, q / gain))
            .collect();
        Readout::new(timestamps, iq, frequency_hz * HZ_TO_GHZ)
    }

    pub fn len(&self) -> usize {
        self.iq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iq.is_empty()
    }

    pub fn tone(&self) -> Tone<'_> {
        Tone::new(self.frequency, &self.iq)
    }
}

/// Amplitude and phase on the reference plane, aligned with the readout samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timestream {
    pub timestamps: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub phase: Vec<f64>,
}

impl Timestream {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Interpolates the flagged samples of amplitude and phase in place
    pub fn deglitch(&mut self, mask: &[bool], diag: &mut Diagnostics) {
        interpolate_bad(&mut self.amplitude, mask, diag);
        interpolate_bad(&mut self.phase, mask, diag);
    }
}

/// A deglitched timestream with its linearized phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibratedTimestream {
    pub timestream: Timestream,

    /// `4 Qr (f - fr) / fr`, with `f` read off the fitted sweep's phase-frequency relation
    pub linear_phase: Vec<f64>,

    /// Glitches found on the phase before interpolation
    pub glitches: GlitchDetection,

    /// Phase of the measured sweep at the tone frequency
    pub carrier_phase: f64,
    pub carrier_linear_phase: f64,

    /// Whether the blind-tone drift correction was applied
    pub drift_corrected: bool,
}

impl CalibratedTimestream {
    /// Averages blocks of `factor` samples of every series
    pub fn downsample(&self, factor: usize) -> CalibratedTimestream {
        CalibratedTimestream {
            timestream: Timestream {
                timestamps: rebin(&self.timestream.timestamps, factor),
                amplitude: rebin(&self.timestream.amplitude, factor),
                phase: rebin(&self.timestream.phase, factor),
            },
            linear_phase: rebin(&self.linear_phase, factor),
            ..self.clone()
        }
    }
}

/// Converts a tone readout into a deglitched amplitude/phase timestream using the resonance fit
/// of its sweep.
///
/// When both blind tones are given, common-mode drift is removed first; if that is not possible
/// the uncalibrated samples are used and a warning is recorded.
pub fn calibrate_timestream(
    readout: &Readout,
    blinds: Option<(&Readout, &Readout)>,
    sweep: &SweepRecord,
    params: &ResonanceParameters,
    glitch: &GlitchConfig,
    diag: &mut Diagnostics,
) -> CalibratedTimestream {
    let model = params.model();
    let freq = sweep.frequency();

    let sweep_phase = rewound_phase(&rewind_sweep(&model, freq, &sweep.iq()));
    let fitted_phase = rewound_phase(&rewind_sweep(&model, freq, &fitted_curve(&model, freq)));
    let (phase_table, freq_table) = sorted_table(&fitted_phase, freq);
    let linearize = |phase: f64| {
        let f = interp_extrapolate(phase, &phase_table, &freq_table);
        4.0 * model.qr * (f - model.fr) / model.fr
    };

    let carrier_phase = interp_extrapolate(readout.frequency, freq, &sweep_phase);
    let carrier_linear_phase = linearize(carrier_phase);

    let (iq, drift_corrected) = match blinds {
        Some((left, right)) => {
            match calibrate_with_blind_tones(&readout.tone(), &left.tone(), &right.tone()) {
                Ok(calibrated) => (calibrated, true),
                Err(e) => {
                    diag.warn(format!("Blind tone calibration skipped: {e}"));
                    (readout.iq.clone(), false)
                }
            }
        }
        None => {
            diag.debug("No blind tones given; drift is not corrected");
            (readout.iq.clone(), false)
        }
    };

    let rewound = rewind_tone(&model, readout.frequency, &iq);
    let amplitude = rewound_amplitude(&rewound);
    let mut phase = rewound_phase(&rewound);
    fix_phase_jump(&mut phase);

    let glitches = find_glitch(&[phase.as_slice()], glitch, diag);
    if glitches.count() > 0 {
        diag.debug(format!("Interpolating {} glitch samples", glitches.count()));
    }
    let mut timestream = Timestream {
        timestamps: readout.timestamps.clone(),
        amplitude,
        phase,
    };
    timestream.deglitch(&glitches.mask, diag);
    let linear_phase = timestream.phase.iter().map(|&p| linearize(p)).collect();

    CalibratedTimestream {
        timestream,
        linear_phase,
        glitches,
        carrier_phase,
        carrier_linear_phase,
        drift_corrected,
    }
}
