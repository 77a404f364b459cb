//! Warehouse implementations for the shipment archival pipeline.
//!
//! Provides the BigQuery implementation of the [`etl::destination::Warehouse`] trait.

#[cfg(feature = "bigquery")]
pub mod bigquery;
pub mod encryption;
