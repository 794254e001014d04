pub mod config;
pub mod cutoff;
pub mod logging;
pub mod store;
pub mod workers;
