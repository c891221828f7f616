//! Per-resonator processing: sweep fit, timestream calibration and spectral estimate
use crate::calibration::timestream::{calibrate_timestream, CalibratedTimestream, Readout};
use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::fitting::common::error::FittingError;
use crate::fitting::common::fitstruct::{ResonatorState, SweepRecord};
use crate::fitting::peaks::locator::locate_peaks;
use crate::fitting::resonance::fitter::fit_one_peak;
use crate::fitting::resonance::validity::validate;
use crate::spectral::{power_spectrum_density, Psd};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

type Result<T> = std::result::Result<T, FittingError>;

/// Everything measured for one resonator
#[derive(Debug, Clone)]
pub struct ResonatorInput {
    pub kid_id: usize,
    pub sweep: SweepRecord,

    /// Time-ordered readout of the resonator's tone
    pub readout: Option<Readout>,

    /// Nearest reference tones below and above the resonator's tone
    pub blind_tones: Option<(Readout, Readout)>,
}

#[derive(Debug, Clone)]
pub struct ResonatorOutput {
    pub kid_id: usize,
    pub state: ResonatorState,

    /// Present when the resonator is enabled and has a readout
    pub timestream: Option<CalibratedTimestream>,
    pub psd: Option<Psd>,
    pub diagnostics: Diagnostics,
}

/// Locates the resonance in a sweep, fits it and checks the result.
///
/// Every failure is local to this resonator: it is recorded as a warning and returned as
/// `ResonatorState::Disabled`.
pub fn calc_resonance_params(
    sweep: &SweepRecord,
    carrier: f64,
    config: &PipelineConfig,
    diag: &mut Diagnostics,
) -> ResonatorState {
    match fit_and_validate(sweep, carrier, config, diag) {
        Ok(state) => state,
        Err(e) => {
            diag.warn(e.to_string());
            ResonatorState::Disabled(e)
        }
    }
}

fn fit_and_validate(
    sweep: &SweepRecord,
    carrier: f64,
    config: &PipelineConfig,
    diag: &mut Diagnostics,
) -> Result<ResonatorState> {
    let peaks = locate_peaks(
        sweep.frequency(),
        &sweep.amplitude(),
        carrier,
        &config.peaks,
        diag,
    );
    let (params, window) = fit_one_peak(sweep, &peaks, &config.fit, diag)?;
    validate(&params)?;
    diag.info(format!(
        "Resonance at {:.9} GHz with Qr = {:.0} and Qc = {:.0}",
        params.fr.value, params.qr.value, params.qc.value
    ));
    Ok(ResonatorState::Enabled { params, window })
}

/// Runs the full pass for one resonator
pub fn process_resonator(input: &ResonatorInput, config: &PipelineConfig) -> ResonatorOutput {
    let mut diag = Diagnostics::for_kid(input.kid_id);
    let carrier = input
        .readout
        .as_ref()
        .map_or(f64::NAN, |readout| readout.frequency);
    let state = calc_resonance_params(&input.sweep, carrier, config, &mut diag);

    let timestream = match (state.params(), input.readout.as_ref()) {
        (Some(params), Some(readout)) => {
            let blinds = input.blind_tones.as_ref().map(|(left, right)| (left, right));
            let calibrated = calibrate_timestream(
                readout,
                blinds,
                &input.sweep,
                params,
                &config.glitch,
                &mut diag,
            );
            if config.downsample > 1 {
                Some(calibrated.downsample(config.downsample))
            } else {
                Some(calibrated)
            }
        }
        _ => None,
    };

    let psd = match (&timestream, &config.psd) {
        (Some(calibrated), Some(psd_config)) => {
            let timestamps = &calibrated.timestream.timestamps;
            match sample_interval(timestamps) {
                Some(dt) => power_spectrum_density(
                    &calibrated.timestream.phase,
                    dt,
                    psd_config,
                    &mut diag,
                ),
                None => {
                    diag.warn("Timestamps do not give a positive sample interval; PSD skipped");
                    None
                }
            }
        }
        _ => None,
    };

    ResonatorOutput {
        kid_id: input.kid_id,
        state,
        timestream,
        psd,
        diagnostics: diag,
    }
}

/// Mean spacing of the timestamps
fn sample_interval(timestamps: &[f64]) -> Option<f64> {
    let (first, last) = (timestamps.first()?, timestamps.last()?);
    if timestamps.len() < 2 {
        return None;
    }
    let dt = (last - first) / (timestamps.len() - 1) as f64;
    (dt > 0.0 && dt.is_finite()).then_some(dt)
}

/// Processes a collection of resonators one after the other
pub fn process_resonators(
    inputs: &[ResonatorInput],
    config: &PipelineConfig,
) -> Vec<ResonatorOutput> {
    inputs
        .iter()
        .map(|input| process_resonator(input, config))
        .collect()
}

/// Processes a collection of resonators in parallel, one resonator per task. The outputs are in
/// the order of the inputs.
pub fn par_process_resonators(
    inputs: &[ResonatorInput],
    config: &PipelineConfig,
) -> Vec<ResonatorOutput> {
    inputs
        .par_iter()
        .map(|input| process_resonator(input, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_sweep_is_disabled() {
        let freq: Vec<f64> = (0..400).map(|i| 1.0 + i as f64 * 1e-6).collect();
        let sweep = SweepRecord::new(freq, vec![0.6; 400], vec![0.8; 400]).unwrap();
        let mut diag = Diagnostics::for_kid(1);
        let state = calc_resonance_params(&sweep, 1.0002, &PipelineConfig::default(), &mut diag);
        assert_eq!(state, ResonatorState::Disabled(FittingError::NoPeakFound));
        assert!(state.params().is_none());
        assert!(diag.mentions("Found no peaks"));
    }

    #[test]
    fn sample_interval_from_timestamps() {
        assert_eq!(sample_interval(&[0.0, 0.5, 1.0]), Some(0.5));
        assert_eq!(sample_interval(&[1.0]), None);
        assert_eq!(sample_interval(&[1.0, 1.0]), None);
    }
}
