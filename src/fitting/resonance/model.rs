//! Complex transmission of a resonator with cable delay and a linear background.
//!
//! `S21(x) = absa * E * (1 + c (x - fr) - R)` with `E = exp(-i (2 pi x tau - arga))`,
//! `D = 1 + 2i Qr (x - fr) / fr` and `R = (Qr / Qc) e^{i phi0} / D`.
use crate::utils::constants::NUM_MODEL_PARAMS;
use num_complex::Complex64;
use serde::Serialize;
use std::f64::consts::PI;

const I: Complex64 = Complex64::new(0.0, 1.0);

/// The eight free parameters of the resonance model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelParams {
    /// Rotation phase
    pub arga: f64,
    /// Overall scale
    pub absa: f64,
    /// Cable delay
    pub tau: f64,
    /// Resonance frequency (GHz)
    pub fr: f64,
    /// Total quality factor
    pub qr: f64,
    /// Coupling quality factor
    pub qc: f64,
    pub phi0: f64,
    /// Slope of the linear background
    pub c: f64,
}

impl ModelParams {
    /// Parameter vector in solver order: arga, absa, tau, fr, Qr, Qc, phi0, c
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.arga, self.absa, self.tau, self.fr, self.qr, self.qc, self.phi0, self.c,
        ]
    }

    pub fn from_slice(p: &[f64]) -> ModelParams {
        ModelParams {
            arga: p[0],
            absa: p[1],
            tau: p[2],
            fr: p[3],
            qr: p[4],
            qc: p[5],
            phi0: p[6],
            c: p[7],
        }
    }

    /// Internal quality factor `1 / (1/Qr - cos(phi0)/Qc)`
    pub fn qi(&self) -> f64 {
        1.0 / (1.0 / self.qr - self.phi0.cos() / self.qc)
    }

    /// Cable delay and rotation `exp(-i (2 pi x tau - arga))`
    fn delay(&self, x: f64) -> Complex64 {
        (-I * (2.0 * PI * x * self.tau - self.arga)).exp()
    }

    fn denominator(&self, x: f64) -> Complex64 {
        Complex64::new(1.0, 2.0 * self.qr * (x - self.fr) / self.fr)
    }

    fn resonant_term(&self, x: f64) -> Complex64 {
        Complex64::from_polar(self.qr / self.qc, self.phi0) / self.denominator(x)
    }

    /// Model transmission at frequency `x`
    pub fn eval(&self, x: f64) -> Complex64 {
        self.absa * self.delay(x) * (1.0 + self.c * (x - self.fr) - self.resonant_term(x))
    }

    /// Transmission with the resonant term removed
    pub fn background(&self, x: f64) -> Complex64 {
        self.absa * self.delay(x) * (1.0 + self.c * (x - self.fr))
    }

    /// Closed-form partial derivatives of `eval` in solver order
    pub fn gradient(&self, x: f64) -> [Complex64; NUM_MODEL_PARAMS] {
        let e = self.delay(x);
        let d = self.denominator(x);
        let r = self.resonant_term(x);
        let s21 = self.absa * e * (1.0 + self.c * (x - self.fr) - r);
        let ae = self.absa * e;
        [
            I * s21,
            e * (1.0 + self.c * (x - self.fr) - r),
            -2.0 * PI * I * x * s21,
            ae * (-self.c - 2.0 * I * self.qr * x * r / (self.fr * self.fr * d)),
            -ae * r / (self.qr * d),
            ae * r / self.qc,
            -I * ae * r,
            ae * (x - self.fr),
        ]
    }

    /// Maps a sample `y` measured at `x` onto the normalized reference plane, where the
    /// resonance sits at `-0.5` and the far-off-resonance transmission at `+0.5`
    pub fn rewind(&self, x: f64, y: Complex64) -> Complex64 {
        ((y / self.absa / self.delay(x) - self.c * (x - self.fr)) - 1.0) * (self.qc / self.qr)
            / Complex64::from_polar(1.0, self.phi0)
            + 0.5
    }
}

/// Splits complex values into `[real..., imag...]`
pub fn split_complex(values: &[Complex64]) -> Vec<f64> {
    values
        .iter()
        .map(|z| z.re)
        .chain(values.iter().map(|z| z.im))
        .collect()
}
