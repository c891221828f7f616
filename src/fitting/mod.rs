pub mod common;
pub mod peaks;
pub mod resonance;
