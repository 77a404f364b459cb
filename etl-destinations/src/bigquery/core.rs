use etl::destination::Warehouse;
use etl::error::EtlResult;
use etl::types::ShipmentPayload;
use tracing::{debug, info};

use crate::bigquery::client::{
    BigQueryClient, BigQueryDatasetId, BigQueryProjectId, BigQueryTableId, JobOptions,
};
use crate::bigquery::encoding::insert_request;

/// A BigQuery warehouse that implements the ETL [`Warehouse`] trait.
///
/// Every shipment is inserted by its own query job into a single, already existing table.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: BigQueryClient,
    full_table_name: String,
    job_options: JobOptions,
}

impl BigQueryWarehouse {
    /// Creates a warehouse writing to `dataset_id.table_id` through `client`.
    ///
    /// Fails if the table name cannot be safely quoted.
    pub fn new(
        client: BigQueryClient,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        job_options: JobOptions,
    ) -> EtlResult<Self> {
        let full_table_name = client.full_table_name(dataset_id, table_id)?;

        Ok(Self {
            client,
            full_table_name,
            job_options,
        })
    }

    /// Creates a new [`BigQueryWarehouse`] using a service account key file path.
    pub async fn new_with_key_path(
        project_id: BigQueryProjectId,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        sa_key_file: &str,
        job_options: JobOptions,
    ) -> EtlResult<Self> {
        let client = BigQueryClient::new_with_key_path(project_id, sa_key_file).await?;

        Self::new(client, dataset_id, table_id, job_options)
    }

    /// Creates a new [`BigQueryWarehouse`] using a service account key JSON string.
    ///
    /// Useful when credentials are stored in environment variables.
    pub async fn new_with_key(
        project_id: BigQueryProjectId,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        sa_key: &str,
        job_options: JobOptions,
    ) -> EtlResult<Self> {
        let client = BigQueryClient::new_with_key(project_id, sa_key).await?;

        Self::new(client, dataset_id, table_id, job_options)
    }

    /// Creates a new [`BigQueryWarehouse`] using Application Default Credentials.
    pub async fn new_with_adc(
        project_id: BigQueryProjectId,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
        job_options: JobOptions,
    ) -> EtlResult<Self> {
        let client = BigQueryClient::new_with_adc(project_id).await?;

        Self::new(client, dataset_id, table_id, job_options)
    }

    pub fn full_table_name(&self) -> &str {
        &self.full_table_name
    }
}

impl Warehouse for BigQueryWarehouse {
    fn name() -> &'static str {
        "bigquery"
    }

    async fn insert_shipment(&self, shipment: &ShipmentPayload) -> EtlResult<()> {
        let request = insert_request(&self.full_table_name, shipment);

        debug!(
            uid = %shipment.uid,
            table = %self.full_table_name,
            "submitting bigquery insert job"
        );

        self.client
            .run_query_job(request, &self.job_options)
            .await?;

        info!(
            uid = %shipment.uid,
            table = %self.full_table_name,
            "bigquery insert job completed"
        );

        Ok(())
    }
}
