use crate::config::FitConfig;
use crate::fitting::common::error::FittingError;
use nalgebra::{DMatrix, DVector};

const INITIAL_LAMBDA: f64 = 1e-3;
const LAMBDA_FACTOR: f64 = 10.0;
const MAX_LAMBDA: f64 = 1e16;

/// Singular values of the scaled `JᵀJ` below this are dropped from the pseudo-inverse
const SINGULAR_CUTOFF: f64 = 1e-12;

/// A nonlinear least-squares problem with an analytic Jacobian
pub trait LeastSquaresProblem {
    /// Number of free parameters
    fn number_of_params(&self) -> usize;

    /// Residual vector at `params`
    fn residuals(&self, params: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of the residuals, one row per residual and one column per parameter
    fn jacobian(&self, params: &DVector<f64>) -> DMatrix<f64>;
}

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The relative reduction of the cost fell below `ftol`
    Ftol,
    /// The relative step size fell below `xtol`
    Xtol,
    /// The scaled gradient fell below `gtol`
    Gtol,
    /// No step reduced the cost, even with the largest damping
    NoImprovement,
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct LevMarReport {
    pub params: DVector<f64>,

    /// Sum of squared residuals at `params`
    pub chi_squared: f64,

    /// `(JᵀJ)⁻¹` at `params`; `None` if it is singular
    pub covariance: Option<DMatrix<f64>>,

    pub iterations: usize,
    pub termination: Termination,
}

/// Minimizes the sum of squared residuals of `problem` starting at `init`.
///
/// Damped Gauss-Newton steps are solved in scaled coordinates, with the damping decreased after
/// a successful step and increased after a rejected one. The scale of each parameter is the
/// largest Jacobian column norm seen so far, so a parameter whose column fades cannot take
/// ever larger steps.
///
/// A fit that ends with non-finite parameters is an error.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    init: DVector<f64>,
    config: &FitConfig,
) -> Result<LevMarReport, FittingError> {
    let n = problem.number_of_params();
    if init.len() != n {
        Err(FittingError::FitException(format!(
            "Expected {n} initial parameters, got {}",
            init.len()
        )))?
    }

    let mut params = init;
    let mut residuals = problem.residuals(&params);
    if residuals.len() < n {
        Err(FittingError::FitException(format!(
            "{} residuals cannot constrain {n} parameters",
            residuals.len()
        )))?
    }
    if residuals.iter().any(|r| !r.is_finite()) {
        Err(FittingError::FitException(
            "Residuals are not finite at the initial guess".to_string(),
        ))?
    }
    let mut cost = residuals.norm_squared();
    let mut lambda = INITIAL_LAMBDA;
    let mut termination = Termination::MaxIterations;
    let mut iterations = 0;
    let mut scale: Vec<f64> = vec![];

    while iterations < config.max_iterations {
        iterations += 1;
        let jacobian = problem.jacobian(&params);
        if jacobian.iter().any(|v| !v.is_finite()) {
            Err(FittingError::FitException(format!(
                "Jacobian is not finite after {iterations} iterations"
            )))?
        }
        let jtj = jacobian.tr_mul(&jacobian);
        let gradient = jacobian.tr_mul(&residuals);
        let norms = column_scale(&jtj);
        scale = if scale.is_empty() {
            norms.clone()
        } else {
            (0..n).map(|k| scale[k].max(jtj[(k, k)].sqrt())).collect()
        };

        let gnorm = (0..n)
            .map(|k| gradient[k].abs() / (norms[k] * cost.sqrt()))
            .fold(0.0, f64::max);
        if cost == 0.0 || gnorm <= config.gtol {
            termination = Termination::Gtol;
            break;
        }

        let scaled_jtj = DMatrix::from_fn(n, n, |r, c| jtj[(r, c)] / (scale[r] * scale[c]));
        let scaled_gradient = DVector::from_fn(n, |k, _| -gradient[k] / scale[k]);

        let mut accepted = false;
        while lambda <= MAX_LAMBDA {
            let damped = &scaled_jtj + DMatrix::identity(n, n) * lambda;
            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&scaled_gradient),
                None => {
                    lambda *= LAMBDA_FACTOR;
                    continue;
                }
            };
            let delta = DVector::from_fn(n, |k, _| step[k] / scale[k]);
            let trial = &params + &delta;
            let trial_residuals = problem.residuals(&trial);
            let trial_cost = trial_residuals.norm_squared();

            if trial_cost.is_finite() && trial_cost < cost {
                let reduction = (cost - trial_cost) / cost;
                let scaled_params = DVector::from_fn(n, |k, _| params[k] * scale[k]);
                let small_step = step.norm() <= config.xtol * (scaled_params.norm() + config.xtol);

                params = trial;
                residuals = trial_residuals;
                cost = trial_cost;
                lambda /= LAMBDA_FACTOR;
                accepted = true;

                if reduction <= config.ftol {
                    termination = Termination::Ftol;
                } else if small_step {
                    termination = Termination::Xtol;
                }
                break;
            }
            lambda *= LAMBDA_FACTOR;
        }

        if !accepted {
            termination = Termination::NoImprovement;
            break;
        }
        if termination != Termination::MaxIterations {
            break;
        }
    }

    if params.iter().any(|p| !p.is_finite()) {
        Err(FittingError::FitException(format!(
            "Parameters diverged after {iterations} iterations"
        )))?
    }
    let covariance = covariance(&problem.jacobian(&params));
    Ok(LevMarReport {
        params,
        chi_squared: cost,
        covariance,
        iterations,
        termination,
    })
}

/// Square roots of the diagonal of `JᵀJ`; zero columns get a scale of one
fn column_scale(jtj: &DMatrix<f64>) -> Vec<f64> {
    (0..jtj.nrows())
        .map(|k| {
            let d = jtj[(k, k)].sqrt();
            if d > 0.0 && d.is_finite() {
                d
            } else {
                1.0
            }
        })
        .collect()
}

/// `(JᵀJ)⁻¹`, inverted in scaled coordinates. A singular matrix falls back to the
/// pseudo-inverse; a parameter the residuals do not depend on at all has no covariance.
fn covariance(jacobian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if jacobian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let jtj = jacobian.tr_mul(jacobian);
    let n = jtj.nrows();
    if (0..n).any(|k| jtj[(k, k)] == 0.0) {
        return None;
    }
    let scale = column_scale(&jtj);
    let scaled = DMatrix::from_fn(n, n, |r, c| jtj[(r, c)] / (scale[r] * scale[c]));
    let inverse = match scaled.clone().try_inverse() {
        Some(inverse) => inverse,
        None => scaled.pseudo_inverse(SINGULAR_CUTOFF).ok()?,
    };
    Some(DMatrix::from_fn(n, n, |r, c| {
        inverse[(r, c)] / (scale[r] * scale[c])
    }))
}
