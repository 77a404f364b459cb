mod client;
mod core;
mod encoding;

pub use client::{BigQueryClient, BigQueryDatasetId, BigQueryProjectId, BigQueryTableId, JobOptions};
pub use core::BigQueryWarehouse;
pub use encoding::{GEO_POINT_COLUMN, insert_request, insert_statement};
