use secrecy::SecretString;
use serde::Deserialize;

/// Sentry error reporting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SentryConfig {
    /// Sentry DSN events are sent to.
    pub dsn: SecretString,
}
