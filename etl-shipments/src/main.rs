//! Shipment archival job binary.
//!
//! Runs a single archival batch: eligible shipments are copied from Postgres into BigQuery and
//! deleted from the source once the warehouse confirmed them. The process exit code tells the
//! scheduler how the run ended.

use std::process::ExitCode;

use etl::pipeline::RunStatus;
use etl_config::shared::ShipmentsConfig;
use etl_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_shipments_config;
use crate::core::start_shipments_with_config;
use crate::error::{ShipmentsError, ShipmentsResult};

mod config;
mod core;
mod error;
mod sentry;

/// The name of the environment variable which contains version information for this job.
const APP_VERSION_ENV_NAME: &str = "APP_VERSION";

/// Exit code of a run that aborted before finishing.
const EXIT_FATAL: u8 = 1;

/// Exit code of a run where some committed shipments could not be deleted.
const EXIT_PARTIAL_SUCCESS: u8 = 2;

/// Exit code of a run that finished but left failed shipments in the source.
const EXIT_COMPLETE_WITH_FAILURES: u8 = 3;

fn main() -> ExitCode {
    match run() {
        Ok(status) => exit_code(status),
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Loads configuration, initializes tracing and Sentry, then runs the archival batch on a
/// current-thread runtime.
fn run() -> ShipmentsResult<RunStatus> {
    let config = load_shipments_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ShipmentsError::config)?;

    // Sentry must be ready before the runtime starts so that panics are captured.
    let _sentry_guard = sentry::init(&config)?;

    let status = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))?;

    Ok(status)
}

async fn async_main(config: ShipmentsConfig) -> ShipmentsResult<RunStatus> {
    match start_shipments_with_config(config).await {
        Ok(report) => Ok(report.status()),
        Err(err) => {
            sentry::capture_error(&err);
            error!("{err}");

            Err(err)
        }
    }
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Complete => ExitCode::SUCCESS,
        RunStatus::PartialSuccess => ExitCode::from(EXIT_PARTIAL_SUCCESS),
        RunStatus::CompleteWithFailures => ExitCode::from(EXIT_COMPLETE_WITH_FAILURES),
    }
}
