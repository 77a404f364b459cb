use serde::{Deserialize, Serialize};

const fn default_enabled() -> bool {
    true
}

/// Controls the housekeeping statements run on the source table after reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
