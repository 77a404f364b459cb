use etl::error::EtlError;
use etl_config::Environment;
use etl_config::shared::ShipmentsConfig;
use secrecy::ExposeSecret;
use sentry::protocol::{Event, Exception, Stacktrace};
use sentry::types::Uuid;
use std::backtrace::BacktraceStatus;
use std::sync::Arc;
use tracing::info;

use crate::APP_VERSION_ENV_NAME;
use crate::error::{ShipmentsError, ShipmentsResult};

/// Initializes Sentry error tracking for the archival job.
///
/// Installs the panic integration and tags all events with `service=shipments` and, when set,
/// the app version. Returns [`None`] if no Sentry config is present.
pub fn init(config: &ShipmentsConfig) -> ShipmentsResult<Option<sentry::ClientInitGuard>> {
    let Some(sentry_config) = &config.sentry else {
        info!("sentry not configured for shipments, skipping initialization");
        return Ok(None);
    };

    info!("initializing sentry with supplied dsn");

    let environment = Environment::load().map_err(ShipmentsError::config)?;
    let dsn = sentry_config
        .dsn
        .expose_secret()
        .parse()
        .map_err(ShipmentsError::config)?;

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        environment: Some(environment.to_string().into()),
        integrations: vec![Arc::new(
            sentry::integrations::panic::PanicIntegration::new(),
        )],
        attach_stacktrace: true,
        ..Default::default()
    });

    let version = std::env::var(APP_VERSION_ENV_NAME);

    sentry::configure_scope(|scope| {
        scope.set_tag("service", "shipments");
        if let Ok(version) = version {
            scope.set_tag("version", version);
        }
    });

    Ok(Some(guard))
}

/// Captures a [`ShipmentsError`] to Sentry and returns the event ID.
pub fn capture_error(err: &ShipmentsError) -> Uuid {
    let event = event_from_shipments_error(err);
    sentry::capture_event(event)
}

/// Converts a [`ShipmentsError`] into a Sentry [`Event`].
///
/// Pipeline errors use their [`etl::error::ErrorKind`] as the exception type. Other errors walk
/// the source chain with the root cause first.
fn event_from_shipments_error(err: &ShipmentsError) -> Event<'static> {
    let mut exceptions = Vec::new();

    match err {
        ShipmentsError::Etl(etl_err) => exceptions.push(etl_exception(etl_err)),
        _ => {
            let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
            while let Some(e) = current {
                exceptions.push(Exception {
                    ty: type_name_from_debug(e),
                    value: Some(e.to_string()),
                    ..Default::default()
                });
                current = e.source();
            }
            exceptions.reverse();
        }
    }

    if let Some(stacktrace) = find_first_captured_backtrace(err)
        && let Some(exception) = exceptions.first_mut()
    {
        exception.stacktrace = Some(stacktrace);
    }

    Event {
        exception: exceptions.into(),
        level: sentry::Level::Error,
        ..Default::default()
    }
}

fn etl_exception(error: &EtlError) -> Exception {
    Exception {
        ty: format!("{:?}", error.kind()),
        value: Some(error.to_string()),
        ..Default::default()
    }
}

fn find_first_captured_backtrace(error: &ShipmentsError) -> Option<Stacktrace> {
    let backtrace = error.backtrace()?;
    if backtrace.status() != BacktraceStatus::Captured {
        return None;
    }

    sentry::integrations::backtrace::parse_stacktrace(&backtrace.to_string())
}

/// Extracts the type name from an error's Debug representation, falling back to `"Error"`.
fn type_name_from_debug(err: &dyn std::error::Error) -> String {
    let debug = format!("{err:?}");
    debug
        .split(['{', '(', ' '])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl::error::ErrorKind;
    use etl::etl_error;

    #[test]
    fn etl_errors_use_the_kind_as_exception_type() {
        let err = ShipmentsError::from(etl_error!(
            ErrorKind::WarehouseJobTimeout,
            "Insert job did not complete in time"
        ));

        let event = event_from_shipments_error(&err);

        assert_eq!(event.exception.values.len(), 1);
        assert_eq!(event.exception.values[0].ty, "WarehouseJobTimeout");
    }

    #[test]
    fn other_errors_put_the_root_cause_first() {
        let err = ShipmentsError::config(std::io::Error::other("missing file"));

        let event = event_from_shipments_error(&err);

        assert_eq!(event.exception.values.len(), 2);
        assert_eq!(event.exception.values[0].ty, "Custom");
        assert_eq!(event.exception.values[1].ty, "Config");
    }
}
