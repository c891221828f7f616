use crate::calibration::blind_tone::{calibrate_with_blind_tones, Tone};
use crate::config::{GlitchConfig, PipelineConfig, PsdConfig};
use crate::deglitch::detect::find_glitch;
use crate::diagnostics::Diagnostics;
use crate::error::KidfitError;
use crate::fitting::common::error::FittingError;
use crate::fitting::common::fitstruct::{ResonatorState, SweepRecord};
use crate::pipeline::{calc_resonance_params, par_process_resonators, ResonatorInput};
use crate::spectral::power_spectrum_density;
use crate::utils::constants::HZ_TO_GHZ;
use indexmap::IndexMap;
use itertools::{Either, Itertools};
use num_complex::Complex64;
use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use serde::de::DeserializeOwned;

impl From<KidfitError> for PyErr {
    fn from(value: KidfitError) -> Self {
        PyValueError::new_err(value.to_string())
    }
}

/// Parses an optional JSON settings document, falling back to the defaults
fn parse_config<T: DeserializeOwned + Default>(json: Option<&str>) -> Result<T, KidfitError> {
    match json {
        None => Ok(T::default()),
        Some(s) => serde_json::from_str(s)
            .map_err(|e| KidfitError::InvalidInput(format!("Invalid configuration: {e}"))),
    }
}

/// Fitted value and standard error of every parameter, keyed by name
type NamedParams = IndexMap<String, (f64, Option<f64>)>;

fn named_params(state: ResonatorState) -> Result<NamedParams, FittingError> {
    match state {
        ResonatorState::Enabled { params, .. } => Ok(params
            .named()
            .iter()
            .map(|(name, v)| (name.to_string(), (v.value, v.stderr)))
            .collect()),
        ResonatorState::Disabled(e) => Err(e),
    }
}

fn sweep_from_arrays(
    freq_hz: &PyReadonlyArray1<f64>,
    i: &PyReadonlyArray1<f64>,
    q: &PyReadonlyArray1<f64>,
) -> PyResult<SweepRecord> {
    Ok(SweepRecord::from_hz(
        freq_hz.as_slice()?,
        i.as_slice()?.to_vec(),
        q.as_slice()?.to_vec(),
    )
    .map_err(KidfitError::from)?)
}

/// Fits the resonance of one sweep and returns `{name: (value, stderr)}`. Raises if the
/// resonator cannot be characterized.
#[pyfunction]
#[pyo3(name = "fit_sweep")]
#[pyo3(signature = (freq_hz, i, q, carrier_hz = f64::NAN, config = None))]
fn fit_sweep_py<'py>(
    freq_hz: PyReadonlyArray1<'py, f64>,
    i: PyReadonlyArray1<'py, f64>,
    q: PyReadonlyArray1<'py, f64>,
    carrier_hz: f64,
    config: Option<String>,
) -> PyResult<NamedParams> {
    let config: PipelineConfig = parse_config(config.as_deref())?;
    let sweep = sweep_from_arrays(&freq_hz, &i, &q)?;
    let mut diag = Diagnostics::new();
    let state = calc_resonance_params(&sweep, carrier_hz * HZ_TO_GHZ, &config, &mut diag);
    Ok(named_params(state).map_err(KidfitError::from)?)
}

/// Fits many sweeps in parallel. Each sweep is a tuple `(freq_hz, i, q)`; each result is
/// `(params, None)` or `(None, reason)` for a disabled resonator.
#[pyfunction]
#[pyo3(name = "fit_sweeps")]
#[pyo3(signature = (sweeps, config = None))]
fn fit_sweeps_py(
    sweeps: Vec<(Vec<f64>, Vec<f64>, Vec<f64>)>,
    config: Option<String>,
) -> PyResult<Vec<(Option<NamedParams>, Option<String>)>> {
    let config: PipelineConfig = parse_config(config.as_deref())?;
    let (errors, inputs): (Vec<_>, Vec<_>) =
        sweeps
            .into_iter()
            .enumerate()
            .partition_map(|(kid_id, (freq_hz, i, q))| {
                match SweepRecord::from_hz(&freq_hz, i, q) {
                    Err(e) => Either::Left((kid_id, e)),
                    Ok(sweep) => Either::Right(ResonatorInput {
                        kid_id,
                        sweep,
                        readout: None,
                        blind_tones: None,
                    }),
                }
            });
    if !errors.is_empty() {
        Err(KidfitError::InvalidInput(format!(
            "Corrupted sweeps: {errors:?}"
        )))?
    }
    Ok(par_process_resonators(&inputs, &config)
        .into_iter()
        .map(|out| match named_params(out.state) {
            Ok(params) => (Some(params), None),
            Err(e) => (None, Some(e.to_string())),
        })
        .collect())
}

/// Removes common-mode drift from `signal` using the two bracketing reference tones
#[pyfunction]
#[pyo3(name = "calibrate_with_blind_tones")]
fn calibrate_with_blind_tones_py<'py>(
    py: Python<'py>,
    signal_freq: f64,
    signal: PyReadonlyArray1<'py, Complex64>,
    left_freq: f64,
    left: PyReadonlyArray1<'py, Complex64>,
    right_freq: f64,
    right: PyReadonlyArray1<'py, Complex64>,
) -> PyResult<Bound<'py, PyArray1<Complex64>>> {
    let calibrated = calibrate_with_blind_tones(
        &Tone::new(signal_freq, signal.as_slice()?),
        &Tone::new(left_freq, left.as_slice()?),
        &Tone::new(right_freq, right.as_slice()?),
    )
    .map_err(KidfitError::from)?;
    Ok(PyArray1::from_vec_bound(py, calibrated))
}

/// Boolean glitch mask of a series
#[pyfunction]
#[pyo3(name = "find_glitch")]
#[pyo3(signature = (data, config = None))]
fn find_glitch_py<'py>(
    py: Python<'py>,
    data: PyReadonlyArray1<'py, f64>,
    config: Option<String>,
) -> PyResult<Bound<'py, PyArray1<bool>>> {
    let config: GlitchConfig = parse_config(config.as_deref())?;
    let mut diag = Diagnostics::new();
    let detection = find_glitch(&[data.as_slice()?], &config, &mut diag);
    Ok(PyArray1::from_vec_bound(py, detection.mask))
}

/// One-sided power spectral density; returns `(frequency, power)`
#[pyfunction]
#[pyo3(name = "power_spectrum_density")]
#[pyo3(signature = (data, dt, config = None))]
fn power_spectrum_density_py<'py>(
    py: Python<'py>,
    data: PyReadonlyArray1<'py, f64>,
    dt: f64,
    config: Option<String>,
) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray1<f64>>)> {
    let config: PsdConfig = parse_config(config.as_deref())?;
    let mut diag = Diagnostics::new();
    let data = data.as_slice()?;
    let psd = power_spectrum_density(data, dt, &config, &mut diag).ok_or_else(|| {
        KidfitError::InvalidInput(format!("{} samples are too few for a PSD", data.len()))
    })?;
    Ok((
        PyArray1::from_vec_bound(py, psd.frequency),
        PyArray1::from_vec_bound(py, psd.power),
    ))
}

/// Functions for characterizing kinetic inductance detectors.
#[pymodule]
fn kidfit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(fit_sweep_py, m)?)?;
    m.add_function(wrap_pyfunction!(fit_sweeps_py, m)?)?;
    m.add_function(wrap_pyfunction!(calibrate_with_blind_tones_py, m)?)?;
    m.add_function(wrap_pyfunction!(find_glitch_py, m)?)?;
    m.add_function(wrap_pyfunction!(power_spectrum_density_py, m)?)?;

    Ok(())
}
