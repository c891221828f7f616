pub mod fitrange;
pub mod fitter;
pub mod levmar;
pub mod model;
pub mod validity;
