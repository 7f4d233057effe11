pub mod assessment;
pub mod config;
pub mod error;
pub mod leads;
pub mod logging;
