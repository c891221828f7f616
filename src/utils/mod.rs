pub mod constants;
pub mod interp;
pub mod savgol;
pub mod stats;
