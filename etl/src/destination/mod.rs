//! Warehouse abstractions.
//!
//! The [`Warehouse`] trait is implemented by the BigQuery writer in `etl-destinations` and by
//! [`memory::MemoryWarehouse`] for tests and local runs.

mod base;
pub mod memory;

pub use base::Warehouse;
