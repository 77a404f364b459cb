use etl_config::load_config;
use etl_config::shared::ShipmentsConfig;

use crate::error::{ShipmentsError, ShipmentsResult};

/// Loads and validates the archival job configuration.
///
/// Uses the standard configuration loading mechanism from [`etl_config`] and
/// validates the resulting [`ShipmentsConfig`] before returning it.
pub fn load_shipments_config() -> ShipmentsResult<ShipmentsConfig> {
    let config = load_config::<ShipmentsConfig>().map_err(ShipmentsError::config)?;
    config.validate().map_err(ShipmentsError::config)?;

    Ok(config)
}
