use nalgebra::{DMatrix, DVector};

/// Savitzky-Golay smoothing/differentiation filter.
///
/// Interior samples use the least-squares convolution weights of a centred window. The first
/// and last `window / 2` samples are taken from a polynomial fitted to the first and last full
/// window, so the output has the same length as the input.
#[derive(Debug, Clone, Copy)]
pub struct SavitzkyGolay {
    window: usize,
    order: usize,
    deriv: usize,
    delta: f64,
}

impl SavitzkyGolay {
    pub fn new(window: usize, order: usize, deriv: usize, delta: f64) -> SavitzkyGolay {
        SavitzkyGolay {
            window,
            order,
            deriv,
            delta,
        }
    }

    /// Filters `y`. Returns `None` when the window is even, not longer than the polynomial
    /// order, longer than the data, or the normal equations are singular.
    pub fn apply(&self, y: &[f64]) -> Option<Vec<f64>> {
        let n = y.len();
        if self.window % 2 == 0 || self.window <= self.order || n < self.window {
            return None;
        }
        if self.deriv > self.order {
            return Some(vec![0.0; n]);
        }
        let half = self.window / 2;
        let delta_pow = self.delta.powi(self.deriv as i32);

        let offsets: Vec<f64> = (0..self.window).map(|k| k as f64 - half as f64).collect();
        let projection = least_squares_projection(&offsets, self.order)?;
        let scale = factorial(self.deriv) / delta_pow;
        let weights: Vec<f64> = projection.row(self.deriv).iter().map(|w| w * scale).collect();

        let mut out = vec![0.0; n];
        for i in half..n - half {
            out[i] = weights
                .iter()
                .zip(&y[i - half..=i + half])
                .map(|(w, v)| w * v)
                .sum();
        }

        // Edges: evaluate the polynomial of the outermost full windows
        let positions: Vec<f64> = (0..self.window).map(|k| k as f64).collect();
        let edge_projection = least_squares_projection(&positions, self.order)?;
        let left = &edge_projection * DVector::from_column_slice(&y[..self.window]);
        let right = &edge_projection * DVector::from_column_slice(&y[n - self.window..]);
        for i in 0..half {
            out[i] = polynomial_derivative(&left, self.deriv, i as f64) / delta_pow;
            out[n - half + i] =
                polynomial_derivative(&right, self.deriv, (self.window - half + i) as f64)
                    / delta_pow;
        }
        Some(out)
    }
}

/// Makes a window length odd: `ceil(n / 2) * 2 + 1`
pub fn oddify(n: usize) -> usize {
    n.div_ceil(2) * 2 + 1
}

/// `(AᵀA)⁻¹Aᵀ` for the Vandermonde matrix `A[k][j] = x_k^j`
fn least_squares_projection(xs: &[f64], order: usize) -> Option<DMatrix<f64>> {
    let vandermonde = DMatrix::from_fn(xs.len(), order + 1, |r, c| xs[r].powi(c as i32));
    let normal = vandermonde.transpose() * &vandermonde;
    let inverse = normal.try_inverse()?;
    Some(inverse * vandermonde.transpose())
}

fn polynomial_derivative(coeffs: &DVector<f64>, deriv: usize, x: f64) -> f64 {
    let mut total = 0.0;
    for j in deriv..coeffs.len() {
        let falling = (j - deriv + 1..=j).fold(1.0, |acc, k| acc * k as f64);
        total += coeffs[j] * falling * x.powi((j - deriv) as i32);
    }
    total
}

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}
