use serde::Deserialize;

use crate::Config;
use crate::shared::{
    MaintenanceConfig, PgConnectionConfig, SelectionConfig, SentryConfig, ValidationError,
    WarehouseConfig,
};

/// Complete configuration of the shipment archival job.
///
/// This intentionally does not implement `Serialize` since it carries database passwords and
/// warehouse credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentsConfig {
    /// Source Postgres database holding the operational shipments table.
    pub source: PgConnectionConfig,
    pub selection: SelectionConfig,
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Optional Sentry reporting. When absent, errors are only logged.
    #[serde(default)]
    pub sentry: Option<SentryConfig>,
    /// Selects and decodes rows without writing to the warehouse or deleting anything.
    #[serde(default)]
    pub dry_run: bool,
}

impl ShipmentsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.selection.validate()?;
        self.warehouse.validate()?;

        Ok(())
    }
}

impl Config for ShipmentsConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["selection.statuses"];
}
