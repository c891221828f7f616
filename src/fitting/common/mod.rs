pub mod error;
pub mod fitstruct;
