use std::time::Duration;

use etl::pipeline::{Pipeline, PipelineConfig, RunReport};
use etl::source::postgres::PgSource;
use etl_config::shared::{
    BigQueryCredentials, PgConnectionConfig, SelectionConfig, ShipmentsConfig, WarehouseConfig,
};
use etl_destinations::bigquery::{BigQueryWarehouse, JobOptions};
use etl_destinations::encryption::install_crypto_provider;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::error::ShipmentsResult;

/// Runs one archival batch with the provided configuration.
///
/// Connects to the source and the warehouse, then drives a single [`Pipeline`] run to the end.
/// Failed records do not make the run fail, they are reported in the returned [`RunReport`].
pub async fn start_shipments_with_config(config: ShipmentsConfig) -> ShipmentsResult<RunReport> {
    info!("starting shipment archival");

    log_config(&config);

    install_crypto_provider();

    let source = PgSource::connect(&config.source, config.selection.clone()).await?;
    let warehouse = build_warehouse(&config.warehouse).await?;

    let pipeline_config = PipelineConfig {
        maintenance_enabled: config.maintenance.enabled,
        dry_run: config.dry_run,
    };
    let mut pipeline = Pipeline::new(pipeline_config, source, warehouse);
    let report = pipeline.run().await?;

    info!(status = ?report.status(), "shipment archival completed");

    Ok(report)
}

async fn build_warehouse(config: &WarehouseConfig) -> ShipmentsResult<BigQueryWarehouse> {
    let WarehouseConfig::BigQuery {
        project_id,
        dataset_id,
        table_id,
        credentials,
        location,
        job_timeout_ms,
        poll_interval_ms,
    } = config;

    let job_options = JobOptions {
        location: location.clone(),
        timeout: Duration::from_millis(*job_timeout_ms),
        poll_interval: Duration::from_millis(*poll_interval_ms),
    };

    let warehouse = match credentials {
        BigQueryCredentials::ServiceAccountKey(key) => {
            BigQueryWarehouse::new_with_key(
                project_id.clone(),
                dataset_id,
                table_id,
                key.expose_secret(),
                job_options,
            )
            .await?
        }
        BigQueryCredentials::ServiceAccountKeyPath(path) => {
            BigQueryWarehouse::new_with_key_path(
                project_id.clone(),
                dataset_id,
                table_id,
                path,
                job_options,
            )
            .await?
        }
        BigQueryCredentials::ApplicationDefault => {
            BigQueryWarehouse::new_with_adc(project_id.clone(), dataset_id, table_id, job_options)
                .await?
        }
    };

    Ok(warehouse)
}

fn log_config(config: &ShipmentsConfig) {
    log_source_config(&config.source);
    log_selection_config(&config.selection);
    log_warehouse_config(&config.warehouse);
    debug!(
        maintenance_enabled = config.maintenance.enabled,
        dry_run = config.dry_run,
        sentry_enabled = config.sentry.is_some(),
        "using run config"
    );
}

fn log_source_config(config: &PgConnectionConfig) {
    debug!(
        host = %config.host,
        port = config.port,
        dbname = %config.name,
        username = %config.username,
        tls_enabled = config.tls.enabled,
        keepalive = config.keepalive.is_some(),
        "using source connection config"
    );
}

fn log_selection_config(config: &SelectionConfig) {
    debug!(
        schema = %config.schema,
        table = %config.table,
        uid_column = %config.uid_column,
        statuses = ?config.statuses,
        min_age_hours = config.min_age_hours,
        batch_size = config.batch_size,
        "using selection config"
    );
}

fn log_warehouse_config(config: &WarehouseConfig) {
    match config {
        WarehouseConfig::BigQuery {
            project_id,
            dataset_id,
            table_id,
            credentials,
            location,
            job_timeout_ms,
            poll_interval_ms,
        } => {
            let credentials = match credentials {
                BigQueryCredentials::ServiceAccountKey(_) => "service_account_key",
                BigQueryCredentials::ServiceAccountKeyPath(_) => "service_account_key_path",
                BigQueryCredentials::ApplicationDefault => "application_default",
            };
            debug!(
                project_id,
                dataset_id,
                table_id,
                credentials,
                location = ?location,
                job_timeout_ms,
                poll_interval_ms,
                "using bigquery warehouse config"
            );
        }
    }
}
