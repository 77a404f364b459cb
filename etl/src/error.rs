//! Error types and result definitions for the archival pipeline.
//!
//! [`EtlError`] carries a classification ([`ErrorKind`]), a static description, optional dynamic
//! detail, the originating error and the callsite where it was created.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Result type used across the crate.
pub type EtlResult<T> = Result<T, EtlError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the archival pipeline.
#[derive(Debug, Clone)]
pub struct EtlError {
    payload: Box<ErrorPayload>,
}

/// Categories of failures, grouped by the stage in which they occur.
///
/// Whether an error is fatal depends on where it surfaces: a [`ErrorKind::RecordShapeInvalid`] or
/// [`ErrorKind::WarehouseJobFailed`] only fails the record at hand, while a
/// [`ErrorKind::RowDecodeFailed`] abandons the whole batch.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    SourceConnectionFailed,

    // Source Errors
    SourceQueryFailed,
    SourceLockTimeout,
    SourceOperationCanceled,
    SourceSchemaError,
    SourceIoError,

    // Warehouse Errors
    WarehouseQueryFailed,
    WarehouseWriteFailed,
    WarehouseJobFailed,
    WarehouseJobTimeout,
    WarehouseTableNameInvalid,
    WarehouseIoError,

    // Data & Transformation Errors
    RowDecodeFailed,
    RecordShapeInvalid,
    ConversionError,
    InvalidData,
    ValidationError,

    // Reconciliation Errors
    ReconciliationFailed,

    // Configuration, IO & Serialization Errors
    ConfigError,
    IoError,
    SerializationError,
    DeserializationError,

    // Security & Authentication Errors
    EncryptionError,
    AuthenticationError,
    PermissionDenied,

    // State Errors
    InvalidState,

    // General Errors
    SourceError,
    WarehouseError,
}

impl EtlError {
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description.
    pub fn description(&self) -> &str {
        self.payload.description.as_ref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the backtrace captured when the error was created.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches the originating error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    /// Wraps a foreign error, keeping its message as detail.
    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        EtlError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for EtlError {
    fn eq(&self, other: &EtlError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl Hash for EtlError {
    /// Hashes only the kind and static description so that repeated occurrences of the same
    /// failure group together regardless of detail or callsite.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.kind.hash(state);
        self.payload.description.hash(state);
    }
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            write_indented(f, "Detail:", detail)?;
        }

        let backtrace = payload.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write_indented(f, "Backtrace:", &backtrace)?;
        }

        Ok(())
    }
}

/// Writes a labelled block with every line indented under the label.
fn write_indented(f: &mut fmt::Formatter<'_>, label: &str, body: &str) -> fmt::Result {
    if body.trim().is_empty() {
        return write!(f, "\n  {label} <empty>");
    }

    write!(f, "\n  {label}")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::from_source(kind, description, err)
    }
}

impl From<std::string::FromUtf8Error> for EtlError {
    #[track_caller]
    fn from(err: std::string::FromUtf8Error) -> EtlError {
        EtlError::from_source(
            ErrorKind::ConversionError,
            "UTF-8 string conversion failed",
            err,
        )
    }
}

/// Classifies Postgres errors by SQLSTATE.
///
/// Specific codes are matched first, then the two character class. An error without a
/// SQLSTATE never reached the server and is treated as a connection failure.
impl From<tokio_postgres::Error> for EtlError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> EtlError {
        use tokio_postgres::error::SqlState;

        let (kind, description) = match err.code() {
            None => (
                ErrorKind::SourceConnectionFailed,
                "PostgreSQL connection failed",
            ),
            Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => (
                ErrorKind::PermissionDenied,
                "PostgreSQL permission denied",
            ),
            Some(code) if *code == SqlState::LOCK_NOT_AVAILABLE => (
                ErrorKind::SourceLockTimeout,
                "PostgreSQL lock not available",
            ),
            Some(code) if *code == SqlState::QUERY_CANCELED => (
                ErrorKind::SourceOperationCanceled,
                "PostgreSQL query canceled",
            ),
            Some(code)
                if *code == SqlState::UNDEFINED_TABLE
                    || *code == SqlState::UNDEFINED_COLUMN
                    || *code == SqlState::UNDEFINED_SCHEMA =>
            {
                (
                    ErrorKind::SourceSchemaError,
                    "PostgreSQL schema object not found",
                )
            }
            Some(code) if *code == SqlState::IDLE_IN_TRANSACTION_SESSION_TIMEOUT => (
                ErrorKind::InvalidState,
                "PostgreSQL idle transaction timed out",
            ),
            Some(code) => match &code.code()[..2] {
                "08" | "53" => (
                    ErrorKind::SourceConnectionFailed,
                    "PostgreSQL connection failed",
                ),
                "28" => (
                    ErrorKind::AuthenticationError,
                    "PostgreSQL authentication failed",
                ),
                "22" => (
                    ErrorKind::ConversionError,
                    "PostgreSQL data conversion failed",
                ),
                "23" => (
                    ErrorKind::ValidationError,
                    "PostgreSQL constraint violation",
                ),
                "25" | "40" => (ErrorKind::InvalidState, "PostgreSQL transaction failed"),
                "42" | "54" => (
                    ErrorKind::SourceQueryFailed,
                    "PostgreSQL syntax or access error",
                ),
                "57" => (
                    ErrorKind::SourceOperationCanceled,
                    "PostgreSQL operator intervention",
                ),
                "58" | "XX" => (ErrorKind::SourceIoError, "PostgreSQL system error"),
                _ => (ErrorKind::SourceError, "PostgreSQL error"),
            },
        };

        EtlError::from_source(kind, description, err)
    }
}

impl From<rustls::Error> for EtlError {
    #[track_caller]
    fn from(err: rustls::Error) -> EtlError {
        EtlError::from_source(ErrorKind::EncryptionError, "TLS configuration failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl_error;

    #[test]
    fn single_error_exposes_kind_and_detail() {
        let err = etl_error!(
            ErrorKind::RecordShapeInvalid,
            "Record is missing a required field",
            "field `uid` is missing"
        );

        assert_eq!(err.kind(), ErrorKind::RecordShapeInvalid);
        assert_eq!(err.detail(), Some("field `uid` is missing"));
        assert_eq!(err.description(), "Record is missing a required field");
        assert!(err.to_string().contains("[RecordShapeInvalid]"));
    }

    #[test]
    fn location_points_at_the_callsite() {
        let err = etl_error!(ErrorKind::InvalidState, "Unexpected state");

        assert_eq!(err.location().file(), file!());
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("disk gone");
        let err = EtlError::from(io);

        assert_eq!(err.kind(), ErrorKind::IoError);
        let source = error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("disk gone"));
    }

    #[test]
    fn with_source_replaces_the_source() {
        let err = etl_error!(ErrorKind::ReconciliationFailed, "Delete transaction was rolled back")
            .with_source(std::io::Error::other("connection reset"));

        let source = error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection reset"));
    }

    #[test]
    fn json_syntax_errors_are_deserialization_errors() {
        let err: EtlError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
