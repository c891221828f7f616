pub mod locator;
pub mod lorentzian;
