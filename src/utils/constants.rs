pub(crate) const HZ_TO_GHZ: f64 = 1e-9;

/// Number of free parameters of the resonance model
pub const NUM_MODEL_PARAMS: usize = 8;

/// Real and imaginary parts are fitted as separate residuals
pub const COMPLEX_FACTOR: usize = 2;

/// Residual degrees of freedom a fit window must leave after the model parameters
pub const MIN_RESIDUAL_DOF: usize = 11;

/// Converts the inflection-point half-width of a Lorentzian into its FWHM
pub(crate) const INFLECTION_TO_FWHM: f64 = 6.0 / 1.732_050_807_568_877_2;
