//! Configuration for the shipment archival job.
//!
//! Loads layered configuration from the `configuration` directory and `APP_`-prefixed
//! environment variables, and exposes the typed settings shared by the job's crates.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from_dir};
