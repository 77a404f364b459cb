use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A table or column identifier is empty.
    #[error("`{0}` cannot be empty")]
    EmptyIdentifier(&'static str),
    #[error("`selection.statuses` must contain at least one status")]
    NoStatuses,
    #[error("`selection.batch_size` cannot be zero")]
    BatchSizeZero,
    /// A duration setting is zero where a positive value is required.
    #[error("`{0}` cannot be zero")]
    DurationZero(&'static str),
}
