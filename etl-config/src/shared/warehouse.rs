use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

const fn default_job_timeout_ms() -> u64 {
    WarehouseConfig::DEFAULT_JOB_TIMEOUT_MS
}

const fn default_poll_interval_ms() -> u64 {
    WarehouseConfig::DEFAULT_POLL_INTERVAL_MS
}

/// How the BigQuery client authenticates.
///
/// This intentionally does not implement `Serialize` to avoid accidentally
/// leaking the service account key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BigQueryCredentials {
    /// Service account key JSON supplied inline.
    ServiceAccountKey(SecretString),
    /// Path to a service account key file.
    ServiceAccountKeyPath(String),
    /// Application default credentials of the environment.
    ApplicationDefault,
}

/// Configuration of the analytical warehouse receiving archived shipments.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseConfig {
    BigQuery {
        project_id: String,
        dataset_id: String,
        table_id: String,
        credentials: BigQueryCredentials,
        /// Location of the dataset, required by BigQuery for jobs outside `US`/`EU`.
        #[serde(default)]
        location: Option<String>,
        /// Maximum time to wait for an insert job to complete.
        #[serde(default = "default_job_timeout_ms")]
        job_timeout_ms: u64,
        /// Delay between job completion checks.
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
}

impl WarehouseConfig {
    pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 120_000;

    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            WarehouseConfig::BigQuery {
                project_id,
                dataset_id,
                table_id,
                job_timeout_ms,
                poll_interval_ms,
                ..
            } => {
                let identifiers = [
                    (project_id, "warehouse.big_query.project_id"),
                    (dataset_id, "warehouse.big_query.dataset_id"),
                    (table_id, "warehouse.big_query.table_id"),
                ];
                for (identifier, name) in identifiers {
                    if identifier.is_empty() {
                        return Err(ValidationError::EmptyIdentifier(name));
                    }
                }

                if *job_timeout_ms == 0 {
                    return Err(ValidationError::DurationZero(
                        "warehouse.big_query.job_timeout_ms",
                    ));
                }

                if *poll_interval_ms == 0 {
                    return Err(ValidationError::DurationZero(
                        "warehouse.big_query.poll_interval_ms",
                    ));
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_big_query_with_defaults() {
        let config: WarehouseConfig = serde_json::from_str(
            r#"{
                "big_query": {
                    "project_id": "masterplanner",
                    "dataset_id": "logs",
                    "table_id": "shipments",
                    "credentials": "application_default"
                }
            }"#,
        )
        .unwrap();

        let WarehouseConfig::BigQuery {
            job_timeout_ms,
            poll_interval_ms,
            location,
            credentials,
            ..
        } = &config;
        assert_eq!(*job_timeout_ms, WarehouseConfig::DEFAULT_JOB_TIMEOUT_MS);
        assert_eq!(*poll_interval_ms, WarehouseConfig::DEFAULT_POLL_INTERVAL_MS);
        assert!(location.is_none());
        assert!(matches!(credentials, BigQueryCredentials::ApplicationDefault));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let config: WarehouseConfig = serde_json::from_str(
            r#"{
                "big_query": {
                    "project_id": "masterplanner",
                    "dataset_id": "logs",
                    "table_id": "shipments",
                    "credentials": {"service_account_key_path": "/var/secrets/key.json"},
                    "poll_interval_ms": 0
                }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::DurationZero(
                "warehouse.big_query.poll_interval_ms"
            ))
        ));
    }
}
