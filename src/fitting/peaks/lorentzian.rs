use crate::diagnostics::Diagnostics;
use crate::utils::stats::median;
use rmpfit::{MPConfig, MPFitter, MPPar, MPResult};

/// Result of the symmetric Lorentzian pre-fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LorentzianFit {
    pub center: f64,
    pub q: f64,
    pub depth: f64,
    pub background: f64,
}

impl LorentzianFit {
    /// `(background - depth) / background`; a real dip has a ratio inside `(0, 1)`
    pub fn depth_ratio(&self) -> f64 {
        (self.background - self.depth) / self.background
    }

    fn from_params(params: &[f64]) -> LorentzianFit {
        LorentzianFit {
            center: params[3],
            q: (params[2] * params[3] / 2.0).abs(),
            depth: -params[1],
            background: params[0],
        }
    }
}

/// Fits `background + amplitude / (((f - center) * width)^2 + 1)` to one dip.
///
/// `width` is `2 / FWHM`, so `Q = |width * center / 2|`. The solver is seeded from the median
/// amplitude, a dip of `0.8` times the median and the given `q0` at `f0`. Solver failures never
/// propagate: they are recorded at debug level and the seed is returned.
pub fn fit_lorentzian(
    freq: &[f64],
    ampl: &[f64],
    f0: f64,
    q0: f64,
    diag: &mut Diagnostics,
) -> LorentzianFit {
    let level = median(ampl);
    let mut params = vec![level, -0.8 * level, 2.0 * q0 / f0, f0];
    let seed = LorentzianFit::from_params(&params);

    let mut problem = LorentzianProblem::new(freq.to_vec(), ampl.to_vec());
    match problem.mpfit(&mut params) {
        Ok(_) if params.iter().all(|p| p.is_finite()) => LorentzianFit::from_params(&params),
        Ok(_) => {
            diag.debug("Lorentzian fit produced non-finite parameters; using the initial guess");
            seed
        }
        Err(e) => {
            diag.debug(format!("Lorentzian fit failed ({e}); using the initial guess"));
            seed
        }
    }
}

/// Levenberg-Marquardt problem for the rmpfit crate
pub(crate) struct LorentzianProblem {
    /// Sweep frequencies of the window
    x: Vec<f64>,

    /// Amplitude of the window
    y: Vec<f64>,
}

impl LorentzianProblem {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> LorentzianProblem {
        LorentzianProblem { x, y }
    }
}

impl MPFitter for LorentzianProblem {
    fn eval(&mut self, params: &[f64], deviates: &mut [f64]) -> MPResult<()> {
        for ((dev, x), y) in deviates.iter_mut().zip(self.x.iter()).zip(self.y.iter()) {
            let u = (x - params[3]) * params[2];
            *dev = y - (params[0] + params[1] / (u * u + 1.0));
        }
        Ok(())
    }

    fn number_of_points(&self) -> usize {
        self.x.len()
    }

    fn config(&self) -> MPConfig {
        MPConfig {
            ftol: 1e-10,
            gtol: 1e-10,
            no_finite_check: false,
            max_fev: 2000,
            ..Default::default()
        }
    }

    fn parameters(&self) -> Option<&[MPPar]> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorentzian(f: f64, center: f64, q: f64, depth: f64, bg: f64) -> f64 {
        let u = (f - center) * 2.0 * q / center;
        bg - depth / (u * u + 1.0)
    }

    #[test]
    fn recovers_dip() {
        let freq: Vec<f64> = (0..201).map(|i| 0.999 + i as f64 * 1e-5).collect();
        let ampl: Vec<f64> = freq
            .iter()
            .map(|&f| lorentzian(f, 1.0, 5000.0, 0.6, 1.0))
            .collect();
        let mut diag = Diagnostics::new();
        let fit = fit_lorentzian(&freq, &ampl, 1.00002, 4000.0, &mut diag);
        assert!((fit.center - 1.0).abs() < 1e-7);
        assert!((fit.q - 5000.0).abs() / 5000.0 < 1e-3);
        assert!((fit.depth - 0.6).abs() < 1e-4);
        assert!((fit.background - 1.0).abs() < 1e-4);
        assert!((fit.depth_ratio() - 0.4).abs() < 1e-3);
    }

    #[test]
    fn too_few_points_keep_the_seed() {
        let freq = [0.99999, 1.0, 1.00001];
        let ampl = [1.0, 0.5, 1.0];
        let mut diag = Diagnostics::new();
        let fit = fit_lorentzian(&freq, &ampl, 1.0, 4000.0, &mut diag);
        assert_eq!(fit.center, 1.0);
        assert!((fit.q - 4000.0).abs() < 1e-9);
        assert!(diag.mentions("Lorentzian fit failed (not enough degrees of freedom)"));
    }
}
