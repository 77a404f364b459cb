use std::io;
use std::sync::Once;

use etl_config::Environment;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Name of the environment variable enabling log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to load the runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to forward log records to tracing: {0}")]
    LogTracer(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Keeps the background log writer alive.
///
/// Buffered lines are flushed when this value is dropped, so it must be held until the process
/// is about to exit.
#[must_use = "dropping the flusher stops log output"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global tracing subscriber for `app_name`.
///
/// Output goes to stdout through a non-blocking writer: human readable in `dev` and one JSON
/// object per line in `prod`. Records emitted through the `log` crate by dependencies are
/// forwarded to the same subscriber.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;

    LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(io::stdout());
    let registry = tracing_subscriber::registry().with(env_filter());

    if environment.is_prod() {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init()?;
    }

    info!(app = app_name, %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber writing to the test output, once per process.
///
/// Does nothing unless `ENABLE_TRACING` is set, which keeps test output quiet by default.
pub fn init_test_tracing() {
    if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
