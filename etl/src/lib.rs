//! Archival of shipments from Postgres into an analytical warehouse.
//!
//! A run selects aged shipments from the source table, writes each of them to the warehouse as
//! its own job, deletes exactly the shipments whose write was confirmed and finally runs
//! housekeeping on the source table. See [`pipeline::Pipeline`] for the entry point.

pub mod conversions;
pub mod destination;
pub mod error;
mod macros;
pub mod maintenance;
pub mod pipeline;
pub mod reconcile;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
