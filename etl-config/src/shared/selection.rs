use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

const fn default_batch_size() -> u32 {
    SelectionConfig::DEFAULT_BATCH_SIZE
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_table() -> String {
    "shipments".to_string()
}

fn default_uid_column() -> String {
    "uid".to_string()
}

fn default_status_column() -> String {
    "status".to_string()
}

fn default_age_column() -> String {
    "updated_at".to_string()
}

/// Selects which source rows are archived by a single run.
///
/// A row is selected when its status column matches one of [`SelectionConfig::statuses`] and
/// its age column is older than [`SelectionConfig::min_age_hours`]. At most
/// [`SelectionConfig::batch_size`] rows are selected per run, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
    /// Column holding the unique shipment identifier used for deletion.
    #[serde(default = "default_uid_column")]
    pub uid_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    /// Statuses eligible for archival, for example `delivered` or `cancelled`.
    pub statuses: Vec<String>,
    /// Timestamp column compared against [`SelectionConfig::min_age_hours`].
    #[serde(default = "default_age_column")]
    pub age_column: String,
    pub min_age_hours: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl SelectionConfig {
    pub const DEFAULT_BATCH_SIZE: u32 = 1_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        let identifiers = [
            (&self.schema, "selection.schema"),
            (&self.table, "selection.table"),
            (&self.uid_column, "selection.uid_column"),
            (&self.status_column, "selection.status_column"),
            (&self.age_column, "selection.age_column"),
        ];
        for (identifier, name) in identifiers {
            if identifier.is_empty() {
                return Err(ValidationError::EmptyIdentifier(name));
            }
        }

        if self.statuses.is_empty() {
            return Err(ValidationError::NoStatuses);
        }

        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults_for_omitted_fields() {
        let config: SelectionConfig =
            serde_json::from_str(r#"{"statuses": ["delivered"], "min_age_hours": 72}"#).unwrap();

        assert_eq!(config.schema, "public");
        assert_eq!(config.table, "shipments");
        assert_eq!(config.uid_column, "uid");
        assert_eq!(config.status_column, "status");
        assert_eq!(config.age_column, "updated_at");
        assert_eq!(config.batch_size, SelectionConfig::DEFAULT_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_statuses_and_zero_batch() {
        let mut config: SelectionConfig =
            serde_json::from_str(r#"{"statuses": [], "min_age_hours": 1}"#).unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::NoStatuses)));

        config.statuses = vec!["delivered".to_string()];
        config.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::BatchSizeZero)
        ));
    }

    #[test]
    fn rejects_empty_identifiers() {
        let mut config: SelectionConfig =
            serde_json::from_str(r#"{"statuses": ["delivered"], "min_age_hours": 1}"#).unwrap();
        config.age_column = String::new();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyIdentifier("selection.age_column"))
        ));
    }
}
