use crate::config::FitConfig;
use crate::diagnostics::Diagnostics;
use crate::fitting::common::error::FittingError;
use crate::fitting::common::fitstruct::{
    FitValue, FitWindow, PeakCandidate, ResonanceParameters, SweepRecord,
};
use crate::fitting::peaks::locator::select_peak;
use crate::fitting::resonance::fitrange::adjust_fit_range;
use crate::fitting::resonance::levmar::{levenberg_marquardt, LeastSquaresProblem, Termination};
use crate::fitting::resonance::model::{split_complex, ModelParams};
use crate::utils::constants::{COMPLEX_FACTOR, NUM_MODEL_PARAMS};
use crate::utils::stats::mean;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Initial model parameters from the peak nearest to the sweep center.
///
/// The cable delay comes from the mean phase step across the sweep (wraps of 180 degrees or
/// more are skipped) and the rotation from the phase of the center sample once the delay is
/// removed. Both quality factors start at the Lorentzian Q.
pub fn guess(sweep: &SweepRecord, peaks: &[PeakCandidate]) -> Result<ModelParams, FittingError> {
    let peak = select_peak(sweep.frequency(), peaks).ok_or(FittingError::NoPeakFound)?;
    let dx = sweep.spacing();

    let deg = sweep.phase_deg();
    let steps: Vec<f64> = deg
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| d.abs() < 180.0)
        .collect();
    let tau = if steps.is_empty() {
        0.0
    } else {
        -mean(&steps).to_radians() / dx / (2.0 * PI)
    };

    let y0 = Complex64::new(sweep.i()[peak.center_index], sweep.q()[peak.center_index]);
    let arga = (y0 * Complex64::from_polar(1.0, 2.0 * PI * tau * peak.center_freq)).arg();

    Ok(ModelParams {
        arga,
        absa: peak.off_resonance,
        tau,
        fr: peak.center_freq,
        qr: peak.q_estimate,
        qc: peak.q_estimate,
        phi0: 0.0,
        c: 0.0,
    })
}

/// Fits the resonance model to the sweep around the single peak in `peaks`.
///
/// With `nfwhm <= 0` the whole sweep is fitted and several peaks are allowed (the seed comes
/// from the one nearest the sweep center). Returns the fitted parameters with standard errors
/// and the window that was fitted. The parameters are not checked for physical validity.
pub fn fit_one_peak(
    sweep: &SweepRecord,
    peaks: &[PeakCandidate],
    config: &FitConfig,
    diag: &mut Diagnostics,
) -> Result<(ResonanceParameters, FitWindow), FittingError> {
    if peaks.is_empty() {
        Err(FittingError::NoPeakFound)?
    }
    let initial = guess(sweep, peaks)?;

    let window = if config.nfwhm > 0.0 {
        if peaks.len() != 1 {
            Err(FittingError::FitException(format!(
                "number of peak not 1: {}",
                peaks.len()
            )))?
        }
        adjust_fit_range(
            config.nfwhm,
            sweep.len(),
            NUM_MODEL_PARAMS,
            &peaks[0],
            COMPLEX_FACTOR,
        )?
    } else {
        FitWindow::new(0, sweep.len(), sweep.len())?
    };

    let iq = sweep.iq();
    let problem = ResonanceProblem::new(
        sweep.frequency()[window.range()].to_vec(),
        iq[window.range()].to_vec(),
    );
    let report = levenberg_marquardt(&problem, DVector::from_vec(initial.to_vec()), config)?;
    if report.termination == Termination::MaxIterations {
        diag.debug(format!(
            "Resonance fit stopped after {} iterations without converging",
            report.iterations
        ));
    }

    let fitted = ModelParams::from_slice(report.params.as_slice());
    let npoints = window.len() * COMPLEX_FACTOR;
    let reduced_chi_squared = if npoints > NUM_MODEL_PARAMS {
        report.chi_squared / (npoints - NUM_MODEL_PARAMS) as f64
    } else {
        f64::NAN
    };

    let stderr = |k: usize| -> Option<f64> {
        report
            .covariance
            .as_ref()
            .map(|cov| (cov[(k, k)] * reduced_chi_squared).sqrt())
    };
    let qi_stderr = report
        .covariance
        .as_ref()
        .map(|cov| qi_variance(&fitted, cov) * reduced_chi_squared)
        .map(f64::sqrt);

    let params = ResonanceParameters {
        arga: FitValue::new(fitted.arga, stderr(0)),
        absa: FitValue::new(fitted.absa, stderr(1)),
        tau: FitValue::new(fitted.tau, stderr(2)),
        fr: FitValue::new(fitted.fr, stderr(3)),
        qr: FitValue::new(fitted.qr, stderr(4)),
        qc: FitValue::new(fitted.qc, stderr(5)),
        phi0: FitValue::new(fitted.phi0, stderr(6)),
        c: FitValue::new(fitted.c, stderr(7)),
        qi: FitValue::new(fitted.qi(), qi_stderr),
        chi_squared: report.chi_squared,
        reduced_chi_squared,
        iterations: report.iterations,
    };
    Ok((params, window))
}

/// Model transmission of `params` at each frequency
pub fn fitted_curve(params: &ModelParams, freq: &[f64]) -> Vec<Complex64> {
    freq.iter().map(|&x| params.eval(x)).collect()
}

/// Variance of `Qi` propagated from the (Qr, Qc, phi0) block of `cov`
fn qi_variance(p: &ModelParams, cov: &DMatrix<f64>) -> f64 {
    let qi = p.qi();
    let qi2 = qi * qi;
    let grad = [
        qi2 / (p.qr * p.qr),
        -qi2 * p.phi0.cos() / (p.qc * p.qc),
        -qi2 * p.phi0.sin() / p.qc,
    ];
    let idx = [4, 5, 6];
    let mut variance = 0.0;
    for (a, ga) in idx.iter().zip(grad.iter()) {
        for (b, gb) in idx.iter().zip(grad.iter()) {
            variance += ga * cov[(*a, *b)] * gb;
        }
    }
    variance
}

/// Least-squares problem of the resonance model over one fit window; residuals are
/// `model - data` with all real parts followed by all imaginary parts
pub(crate) struct ResonanceProblem {
    x: Vec<f64>,
    y: Vec<Complex64>,
}

impl ResonanceProblem {
    pub fn new(x: Vec<f64>, y: Vec<Complex64>) -> ResonanceProblem {
        ResonanceProblem { x, y }
    }
}

impl LeastSquaresProblem for ResonanceProblem {
    fn number_of_params(&self) -> usize {
        NUM_MODEL_PARAMS
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        let model = ModelParams::from_slice(params.as_slice());
        let diff: Vec<Complex64> = self
            .x
            .iter()
            .zip(self.y.iter())
            .map(|(&x, y)| model.eval(x) - y)
            .collect();
        DVector::from_vec(split_complex(&diff))
    }

    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64> {
        let model = ModelParams::from_slice(params.as_slice());
        let n = self.x.len();
        let mut jacobian = DMatrix::zeros(COMPLEX_FACTOR * n, NUM_MODEL_PARAMS);
        for (row, &x) in self.x.iter().enumerate() {
            for (col, d) in model.gradient(x).iter().enumerate() {
                jacobian[(row, col)] = d.re;
                jacobian[(n + row, col)] = d.im;
            }
        }
        jacobian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth() -> ModelParams {
        ModelParams {
            arga: 0.4,
            absa: 0.9,
            tau: 30.0,
            fr: 1.0,
            qr: 20000.0,
            qc: 40000.0,
            phi0: 0.1,
            c: 0.0,
        }
    }

    fn sweep(p: &ModelParams) -> SweepRecord {
        let freq: Vec<f64> = (0..1001).map(|i| 0.9995 + i as f64 * 1e-6).collect();
        let iq = fitted_curve(p, &freq);
        SweepRecord::from_iq(freq, &iq).unwrap()
    }

    fn peak(p: &ModelParams) -> PeakCandidate {
        PeakCandidate {
            center_index: 500,
            center_freq: p.fr + 2e-7,
            q_estimate: 18000.0,
            depth: 0.45,
            background: 0.9,
            half_width_left: 25,
            half_width_right: 25,
            off_resonance: 0.88,
            on_resonance: 0.45,
        }
    }

    #[test]
    fn guess_recovers_delay_and_rotation() {
        let p = truth();
        let guessed = guess(&sweep(&p), &[peak(&p)]).unwrap();
        // the resonance's own phase swing biases the mean step, so the seed is only rough
        assert!((guessed.tau - p.tau).abs() < 10.0);
        assert_eq!(guessed.fr, p.fr + 2e-7);
        assert_eq!(guessed.qr, guessed.qc);
        assert_eq!(guessed.phi0, 0.0);
    }

    #[test]
    fn fits_noiseless_sweep() {
        let p = truth();
        let mut diag = Diagnostics::new();
        let (fit, window) =
            fit_one_peak(&sweep(&p), &[peak(&p)], &FitConfig::default(), &mut diag).unwrap();
        assert_eq!((window.begin, window.end), (375, 625));
        assert!((fit.fr.value - p.fr).abs() < 1e-8);
        assert!((fit.qr.value - p.qr).abs() / p.qr < 1e-4);
        assert!((fit.qc.value - p.qc).abs() / p.qc < 1e-4);
        assert!((fit.qi.value - p.qi()).abs() / p.qi() < 1e-3);
        assert!((fit.tau.value - p.tau).abs() < 1e-2);
        assert!(fit.qi.stderr.is_some());
    }

    #[test]
    fn several_peaks_need_whole_sweep() {
        let p = truth();
        let mut diag = Diagnostics::new();
        let peaks = [peak(&p), peak(&p)];
        let result = fit_one_peak(&sweep(&p), &peaks, &FitConfig::default(), &mut diag);
        assert!(matches!(result, Err(FittingError::FitException(_))));
        assert!(matches!(
            fit_one_peak(&sweep(&p), &[], &FitConfig::default(), &mut diag),
            Err(FittingError::NoPeakFound)
        ));
    }

    #[test]
    fn jacobian_layout() {
        let p = truth();
        let x = vec![0.9999, 1.0];
        let problem = ResonanceProblem::new(x.clone(), fitted_curve(&p, &x));
        let params = DVector::from_vec(p.to_vec());
        let jacobian = problem.jacobian(&params);
        assert_eq!(jacobian.shape(), (4, NUM_MODEL_PARAMS));
        let grad = p.gradient(1.0);
        assert_eq!(jacobian[(1, 3)], grad[3].re);
        assert_eq!(jacobian[(3, 3)], grad[3].im);
        assert!(problem.residuals(&params).norm() < 1e-12);
    }
}
