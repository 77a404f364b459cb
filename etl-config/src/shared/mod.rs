//! Shared configuration types for the shipment archival job.

mod base;
mod connection;
mod maintenance;
mod selection;
mod sentry;
mod shipments;
mod warehouse;

pub use base::ValidationError;
pub use connection::{
    ETL_SHIPMENTS_OPTIONS, IntoConnectOptions, PgConnectionConfig, PgConnectionOptions,
    TcpKeepaliveConfig, TlsConfig,
};
pub use maintenance::MaintenanceConfig;
pub use selection::SelectionConfig;
pub use sentry::SentryConfig;
pub use shipments::ShipmentsConfig;
pub use warehouse::{BigQueryCredentials, WarehouseConfig};
