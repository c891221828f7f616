pub mod detect;
pub mod interpolate;
