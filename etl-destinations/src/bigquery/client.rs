use etl::error::{ErrorKind, EtlError, EtlResult};
use etl::{bail, etl_error};
use gcp_bigquery_client::client_builder::ClientBuilder;
use gcp_bigquery_client::model::error_proto::ErrorProto;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::job_status::JobStatus;
use gcp_bigquery_client::yup_oauth2::parse_service_account_key;
use gcp_bigquery_client::{Client, error::BQError, model::query_request::QueryRequest};
use std::fmt;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// State of a job that finished, successfully or not.
const JOB_STATE_DONE: &str = "DONE";

/// BigQuery project identifier.
pub type BigQueryProjectId = String;
/// BigQuery dataset identifier.
pub type BigQueryDatasetId = String;
/// BigQuery table identifier.
pub type BigQueryTableId = String;

/// Converts BigQuery errors to ETL errors with appropriate classification.
pub(crate) fn bq_error_to_etl_error(err: BQError) -> EtlError {
    let (kind, description) = match &err {
        // Authentication related errors
        BQError::InvalidServiceAccountKey(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account key",
        ),
        BQError::InvalidServiceAccountAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery service account authenticator",
        ),
        BQError::InvalidApplicationDefaultCredentialsAuthenticator(_) => (
            ErrorKind::AuthenticationError,
            "Invalid BigQuery application default credentials",
        ),
        BQError::AuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication error",
        ),
        BQError::YupAuthError(_) => (
            ErrorKind::AuthenticationError,
            "BigQuery OAuth authentication error",
        ),
        BQError::NoToken => (
            ErrorKind::AuthenticationError,
            "BigQuery authentication token missing",
        ),

        // Network and transport errors
        BQError::RequestError(_) => (ErrorKind::WarehouseIoError, "BigQuery request failed"),

        // Query errors, classified by the HTTP status of the response
        BQError::ResponseError { error } => match error.error.code {
            401 => (
                ErrorKind::AuthenticationError,
                "BigQuery rejected the credentials",
            ),
            403 => (ErrorKind::PermissionDenied, "BigQuery permission denied"),
            404 => (
                ErrorKind::WarehouseQueryFailed,
                "BigQuery dataset or table not found",
            ),
            _ => (ErrorKind::WarehouseQueryFailed, "BigQuery response error"),
        },
        BQError::SerializationError(_) => (
            ErrorKind::SerializationError,
            "BigQuery JSON serialization error",
        ),

        _ => (ErrorKind::WarehouseError, "BigQuery client error"),
    };

    etl_error!(kind, description, err.to_string())
}

/// Formats the error reported for a job, as much as BigQuery tells about it.
fn describe_error_proto(error: &ErrorProto) -> String {
    let reason = error.reason.as_deref().unwrap_or("unknown");
    let message = error.message.as_deref().unwrap_or("no message");

    match &error.location {
        Some(location) => format!("{reason} at {location}: {message}"),
        None => format!("{reason}: {message}"),
    }
}

/// How long and how often to wait for a query job to complete.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Processing location of the dataset, when it is not the multi-region default.
    pub location: Option<String>,
    /// Time after submission at which a still running job is cancelled.
    pub timeout: Duration,
    /// Delay between two completion checks.
    pub poll_interval: Duration,
}

/// Client running parameterized query jobs against one BigQuery project.
#[derive(Clone)]
pub struct BigQueryClient {
    project_id: BigQueryProjectId,
    client: Client,
}

impl BigQueryClient {
    /// Creates a new [`BigQueryClient`] from a service account key file.
    pub async fn new_with_key_path(
        project_id: BigQueryProjectId,
        sa_key_file: &str,
    ) -> EtlResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_service_account_key_file(sa_key_file)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(BigQueryClient { project_id, client })
    }

    /// Creates a new [`BigQueryClient`] from a service account key JSON string.
    pub async fn new_with_key(
        project_id: BigQueryProjectId,
        sa_key: &str,
    ) -> EtlResult<BigQueryClient> {
        let sa_key = parse_service_account_key(sa_key)
            .map_err(BQError::from)
            .map_err(bq_error_to_etl_error)?;
        let client = ClientBuilder::new()
            .build_from_service_account_key(sa_key, false)
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(BigQueryClient { project_id, client })
    }

    /// Creates a new [`BigQueryClient`] using Application Default Credentials.
    ///
    /// Returns an error if credentials are missing or invalid.
    pub async fn new_with_adc(project_id: BigQueryProjectId) -> EtlResult<BigQueryClient> {
        let client = ClientBuilder::new()
            .build_from_application_default_credentials()
            .await
            .map_err(bq_error_to_etl_error)?;

        Ok(BigQueryClient { project_id, client })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the fully qualified BigQuery table name.
    ///
    /// Formats the table name as `project_id.dataset_id.table_id` with proper quoting.
    pub fn full_table_name(
        &self,
        dataset_id: &BigQueryDatasetId,
        table_id: &BigQueryTableId,
    ) -> EtlResult<String> {
        full_table_name(&self.project_id, dataset_id, table_id)
    }

    /// Submits `request` as a query job and waits until BigQuery reports it done.
    ///
    /// Returns once the job finished without error. A job still running after
    /// [`JobOptions::timeout`] is cancelled and then waited for, so the returned result always
    /// matches the terminal state of the job: a job that commits despite the cancellation request
    /// is reported as a success.
    pub async fn run_query_job(
        &self,
        mut request: QueryRequest,
        options: &JobOptions,
    ) -> EtlResult<()> {
        let deadline = Instant::now() + options.timeout;

        request.location = options.location.clone();
        request.timeout_ms = Some(duration_to_ms(options.poll_interval));

        let response = self
            .client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(bq_error_to_etl_error)?;

        let job_reference = response.job_reference;
        let location = job_reference
            .as_ref()
            .and_then(|reference| reference.location.clone())
            .or_else(|| options.location.clone());
        let Some(job_id) = job_reference.and_then(|reference| reference.job_id) else {
            return unreferenced_response_outcome(
                response.job_complete,
                response.errors.as_deref(),
            );
        };

        let mut complete = response.job_complete == Some(true);
        while !complete {
            if Instant::now() >= deadline {
                return self
                    .cancel_and_settle(&job_id, location.as_deref(), options)
                    .await;
            }

            sleep(options.poll_interval).await;

            let parameters = GetQueryResultsParameters {
                location: location.clone(),
                max_results: Some(0),
                timeout_ms: Some(duration_to_ms(options.poll_interval)),
                ..Default::default()
            };
            let results = self
                .client
                .job()
                .get_query_results(&self.project_id, &job_id, parameters)
                .await
                .map_err(bq_error_to_etl_error)?;

            complete = results.job_complete == Some(true);
            debug!(%job_id, complete, "polled bigquery job");
        }

        match self
            .wait_until_done(&job_id, location.as_deref(), options.poll_interval)
            .await?
        {
            JobCompletion::Succeeded => Ok(()),
            JobCompletion::Failed(detail) => bail!(
                ErrorKind::WarehouseJobFailed,
                "BigQuery job failed",
                format!("job `{job_id}`: {detail}")
            ),
            JobCompletion::Running => bail!(
                ErrorKind::InvalidState,
                "BigQuery job is still running after completion was reported"
            ),
        }
    }

    /// Cancels a job that exceeded its deadline and waits for its terminal state.
    async fn cancel_and_settle(
        &self,
        job_id: &str,
        location: Option<&str>,
        options: &JobOptions,
    ) -> EtlResult<()> {
        warn!(%job_id, timeout = ?options.timeout, "bigquery job did not complete in time, cancelling it");

        // The job may still finish on its own, so its final state is awaited either way.
        if let Err(err) = self
            .client
            .job()
            .cancel_job(&self.project_id, job_id, location)
            .await
        {
            warn!(%job_id, error = %err, "failed to request bigquery job cancellation");
        }

        match self
            .wait_until_done(job_id, location, options.poll_interval)
            .await?
        {
            JobCompletion::Succeeded => {
                warn!(%job_id, "bigquery job completed despite the cancellation request");
                Ok(())
            }
            JobCompletion::Failed(detail) => bail!(
                ErrorKind::WarehouseJobTimeout,
                "BigQuery job did not complete in time and was cancelled",
                format!("job `{job_id}` after {:?}: {detail}", options.timeout)
            ),
            JobCompletion::Running => bail!(
                ErrorKind::InvalidState,
                "BigQuery job is still running after cancellation"
            ),
        }
    }

    /// Polls `jobs.get` until the job reaches the `DONE` state.
    async fn wait_until_done(
        &self,
        job_id: &str,
        location: Option<&str>,
        poll_interval: Duration,
    ) -> EtlResult<JobCompletion> {
        loop {
            let job = self
                .client
                .job()
                .get_job(&self.project_id, job_id, location)
                .await
                .map_err(bq_error_to_etl_error)?;

            let completion = job_completion(job.status.as_ref());
            if completion != JobCompletion::Running {
                return Ok(completion);
            }

            debug!(%job_id, "bigquery job not done yet");
            sleep(poll_interval).await;
        }
    }
}

/// Terminal state of a query job as reported by `jobs.get`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum JobCompletion {
    Running,
    Succeeded,
    Failed(String),
}

/// Maps a job status to its completion state.
///
/// Only `errorResult` marks a finished job as failed. The `errors` list may hold warnings of a
/// job that committed.
fn job_completion(status: Option<&JobStatus>) -> JobCompletion {
    let Some(status) = status else {
        return JobCompletion::Running;
    };

    if status.state.as_deref() != Some(JOB_STATE_DONE) {
        return JobCompletion::Running;
    }

    match &status.error_result {
        Some(error) => JobCompletion::Failed(describe_error_proto(error)),
        None => JobCompletion::Succeeded,
    }
}

/// Outcome of a query response that carries no job reference to poll.
///
/// A complete response is trusted as is. Errors are only meaningful for an incomplete one.
fn unreferenced_response_outcome(
    job_complete: Option<bool>,
    errors: Option<&[ErrorProto]>,
) -> EtlResult<()> {
    if job_complete == Some(true) {
        return Ok(());
    }

    if let Some(error) = errors.and_then(|errors| errors.first()) {
        bail!(
            ErrorKind::WarehouseJobFailed,
            "BigQuery job failed",
            describe_error_proto(error)
        );
    }

    bail!(
        ErrorKind::WarehouseWriteFailed,
        "BigQuery returned an incomplete job without reference"
    );
}

fn duration_to_ms(duration: Duration) -> i32 {
    i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
}

/// Sanitizes a BigQuery identifier for safe backtick quoting.
///
/// Rejects empty identifiers and identifiers containing control characters. Backticks and
/// backslashes are escaped so the value can be wrapped in backticks without breaking out of
/// the identifier.
pub(crate) fn sanitize_identifier(identifier: &str, context: &str) -> EtlResult<String> {
    if identifier.is_empty() {
        bail!(
            ErrorKind::WarehouseTableNameInvalid,
            "Invalid BigQuery identifier",
            format!("{context} cannot be empty")
        );
    }

    if identifier.chars().any(char::is_control) {
        bail!(
            ErrorKind::WarehouseTableNameInvalid,
            "Invalid BigQuery identifier",
            format!("{context} contains control characters")
        );
    }

    let mut escaped = String::with_capacity(identifier.len());
    for ch in identifier.chars() {
        match ch {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }

    Ok(escaped)
}

/// Builds the backtick quoted `project.dataset.table` name.
pub(crate) fn full_table_name(
    project_id: &str,
    dataset_id: &str,
    table_id: &str,
) -> EtlResult<String> {
    let project_id = sanitize_identifier(project_id, "BigQuery project id")?;
    let dataset_id = sanitize_identifier(dataset_id, "BigQuery dataset id")?;
    let table_id = sanitize_identifier(table_id, "BigQuery table id")?;

    Ok(format!("`{project_id}.{dataset_id}.{table_id}`"))
}

impl fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project_id", &self.project_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_table_name_quotes_every_part() {
        let name = full_table_name("my-project", "logs", "shipments").unwrap();

        assert_eq!(name, "`my-project.logs.shipments`");
    }

    #[test]
    fn test_sanitize_identifier_escapes_backticks() {
        let name = full_table_name("p", "d", "pwn`; drop table x").unwrap();

        assert_eq!(name, "`p.d.pwn\\`; drop table x`");
    }

    #[test]
    fn test_sanitize_identifier_rejects_control_chars() {
        let result = sanitize_identifier("bad\nname", "BigQuery table id");

        assert!(matches!(
            result,
            Err(err) if err.kind() == ErrorKind::WarehouseTableNameInvalid
        ));
    }

    #[test]
    fn test_sanitize_identifier_rejects_empty() {
        let err = full_table_name("p", "", "t").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WarehouseTableNameInvalid);
        assert_eq!(err.detail(), Some("BigQuery dataset id cannot be empty"));
    }

    #[test]
    fn test_describe_error_proto() {
        let error = ErrorProto {
            reason: Some("invalidQuery".to_string()),
            message: Some("Syntax error".to_string()),
            ..Default::default()
        };

        assert_eq!(describe_error_proto(&error), "invalidQuery: Syntax error");
    }

    #[test]
    fn test_duration_to_ms_saturates() {
        assert_eq!(duration_to_ms(Duration::from_millis(500)), 500);
        assert_eq!(duration_to_ms(Duration::from_secs(u64::MAX)), i32::MAX);
    }

    fn status(state: &str, error_result: Option<ErrorProto>) -> JobStatus {
        JobStatus {
            state: Some(state.to_string()),
            error_result,
            ..Default::default()
        }
    }

    fn stopped() -> ErrorProto {
        ErrorProto {
            reason: Some("stopped".to_string()),
            message: Some("Job execution was cancelled: User requested cancellation".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_job_completion_waits_for_done() {
        assert_eq!(job_completion(None), JobCompletion::Running);
        assert_eq!(
            job_completion(Some(&status("RUNNING", None))),
            JobCompletion::Running
        );
        assert_eq!(
            job_completion(Some(&status("PENDING", None))),
            JobCompletion::Running
        );
    }

    #[test]
    fn test_job_completion_ignores_warnings_of_a_committed_job() {
        let status = JobStatus {
            state: Some("DONE".to_string()),
            errors: Some(vec![ErrorProto {
                reason: Some("invalidQuery".to_string()),
                message: Some("Deprecated function".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        };

        assert_eq!(job_completion(Some(&status)), JobCompletion::Succeeded);
    }

    #[test]
    fn test_job_completion_of_a_cancelled_job_is_failed() {
        assert_eq!(
            job_completion(Some(&status("DONE", Some(stopped())))),
            JobCompletion::Failed(
                "stopped: Job execution was cancelled: User requested cancellation".to_string()
            )
        );
    }

    #[test]
    fn test_complete_response_with_warnings_succeeds() {
        let warnings = vec![ErrorProto {
            reason: Some("invalidQuery".to_string()),
            message: Some("Deprecated function".to_string()),
            ..Default::default()
        }];

        assert!(unreferenced_response_outcome(Some(true), Some(warnings.as_slice())).is_ok());
    }

    #[test]
    fn test_incomplete_response_reports_its_errors() {
        let errors = vec![stopped()];

        let err = unreferenced_response_outcome(Some(false), Some(errors.as_slice())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WarehouseJobFailed);

        let err = unreferenced_response_outcome(None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WarehouseWriteFailed);
    }
}
