use etl::error::EtlError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

/// Result type for the shipment archival job.
pub type ShipmentsResult<T> = Result<T, ShipmentsError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal error of the shipment archival job.
///
/// Wraps [`EtlError`] for pipeline errors and provides variants for the process setup.
#[derive(Debug)]
pub enum ShipmentsError {
    /// Pipeline error.
    Etl(EtlError),
    /// Configuration, tracing or error reporting setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error, for example while building the runtime.
    Io(std::io::Error, CapturedBacktrace),
}

impl ShipmentsError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            ShipmentsError::Etl(_) => "archival error",
            ShipmentsError::Config(_, _) => "configuration error",
            ShipmentsError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ShipmentsError::Etl(err) => Some(err.backtrace()),
            ShipmentsError::Config(_, cb) => Some(&cb.0),
            ShipmentsError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ShipmentsError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("shipment archival failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for ShipmentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipmentsError::Etl(err) => write!(f, "{err}"),
            ShipmentsError::Config(source, _) => write!(f, "configuration error: {source}"),
            ShipmentsError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for ShipmentsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ShipmentsError::Etl(err) => err.source(),
            ShipmentsError::Config(source, _) => Some(source.as_ref()),
            ShipmentsError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for ShipmentsError {
    fn from(err: std::io::Error) -> Self {
        ShipmentsError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<EtlError> for ShipmentsError {
    fn from(err: EtlError) -> Self {
        ShipmentsError::Etl(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl::error::ErrorKind;
    use etl::etl_error;

    #[test]
    fn report_lists_the_cause_chain() {
        let source = std::io::Error::other("connection reset");
        let err = ShipmentsError::from(etl_error!(
            ErrorKind::ReconciliationFailed,
            "Delete transaction was rolled back",
            source: source
        ));

        let report = err.render_report();

        assert!(report.starts_with("shipment archival failed\n"));
        assert!(report.contains("category: archival error\n"));
        assert!(report.contains("cause 1: connection reset\n"));
    }

    #[test]
    fn config_errors_are_categorized() {
        let err = ShipmentsError::config(std::io::Error::other("missing file"));

        assert_eq!(err.category(), "configuration error");
        assert_eq!(err.to_string(), "configuration error: missing file");
    }
}
