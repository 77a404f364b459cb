use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_postgres::{Config as TokioPgConnectOptions, config::SslMode as TokioPgSslMode};

use crate::shared::ValidationError;

const COMMON_DATESTYLE: &str = "ISO";
const COMMON_INTERVALSTYLE: &str = "postgres";
const COMMON_EXTRA_FLOAT_DIGITS: i32 = 3;
const COMMON_CLIENT_ENCODING: &str = "UTF8";
const COMMON_TIMEZONE: &str = "UTC";

const APP_NAME_SHIPMENTS: &str = "etl_shipments";

/// Session options for the archival job's source connection.
///
/// Statements are allowed to run for up to ten minutes since maintenance statements
/// (`vacuum`, `reindex`) on large tables are slow. Idle transactions are cut after one minute
/// so that an abandoned delete transaction never holds row locks for long.
pub static ETL_SHIPMENTS_OPTIONS: LazyLock<PgConnectionOptions> =
    LazyLock::new(|| PgConnectionOptions {
        datestyle: COMMON_DATESTYLE.to_string(),
        intervalstyle: COMMON_INTERVALSTYLE.to_string(),
        extra_float_digits: COMMON_EXTRA_FLOAT_DIGITS,
        client_encoding: COMMON_CLIENT_ENCODING.to_string(),
        timezone: COMMON_TIMEZONE.to_string(),
        statement_timeout: 600_000,
        lock_timeout: 30_000,
        idle_in_transaction_session_timeout: 60_000,
        application_name: APP_NAME_SHIPMENTS.to_string(),
    });

/// Postgres session settings applied through the startup `options` parameter.
#[derive(Debug, Clone)]
pub struct PgConnectionOptions {
    pub datestyle: String,
    pub intervalstyle: String,
    pub extra_float_digits: i32,
    pub client_encoding: String,
    pub timezone: String,
    pub statement_timeout: u32,
    pub lock_timeout: u32,
    pub idle_in_transaction_session_timeout: u32,
    pub application_name: String,
}

impl PgConnectionOptions {
    /// Returns the options as a space-separated list of `-c key=value` pairs.
    pub fn to_options_string(&self) -> String {
        format!(
            "-c datestyle={} -c intervalstyle={} -c extra_float_digits={} -c client_encoding={} -c timezone={} -c statement_timeout={} -c lock_timeout={} -c idle_in_transaction_session_timeout={} -c application_name={}",
            self.datestyle,
            self.intervalstyle,
            self.extra_float_digits,
            self.client_encoding,
            self.timezone,
            self.statement_timeout,
            self.lock_timeout,
            self.idle_in_transaction_session_timeout,
            self.application_name
        )
    }
}

/// Configuration for connecting to the source Postgres database.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking the password into serialized forms.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the database holding the shipments table.
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
    pub tls: TlsConfig,
    /// TCP keepalive configuration. When `None`, TCP keepalives are disabled.
    #[serde(default)]
    pub keepalive: Option<TcpKeepaliveConfig>,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::EmptyIdentifier("source.host"));
        }

        if self.name.is_empty() {
            return Err(ValidationError::EmptyIdentifier("source.name"));
        }

        self.tls.validate()
    }
}

/// TLS settings for the source connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: "".to_string(),
            enabled: false,
        }
    }

    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled without certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpKeepaliveConfig {
    pub idle_secs: u64,
    pub interval_secs: u64,
    pub retries: u32,
}

impl Default for TcpKeepaliveConfig {
    fn default() -> Self {
        Self {
            idle_secs: 30,
            interval_secs: 30,
            retries: 3,
        }
    }
}

/// Converts the connection configuration into client specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Creates connect options without selecting a database.
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> Output;

    /// Creates connect options for the configured database.
    fn with_db(&self, options: Option<&PgConnectionOptions>) -> Output;
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn without_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            TokioPgSslMode::Require
        } else {
            TokioPgSslMode::Prefer
        };
        let mut config = TokioPgConnectOptions::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .ssl_mode(ssl_mode);

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        if let Some(keepalive) = &self.keepalive {
            config
                .keepalives(true)
                .keepalives_idle(Duration::from_secs(keepalive.idle_secs))
                .keepalives_interval(Duration::from_secs(keepalive.interval_secs))
                .keepalives_retries(keepalive.retries);
        }

        if let Some(opts) = options {
            config.options(&opts.to_options_string());
        }

        config
    }

    fn with_db(&self, options: Option<&PgConnectionOptions>) -> TokioPgConnectOptions {
        let mut config: TokioPgConnectOptions = self.without_db(options);
        config.dbname(&self.name);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_config(tls: TlsConfig) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "operations".to_string(),
            username: "postgres".to_string(),
            password: Some(SecretString::new("secret".to_string())),
            tls,
            keepalive: None,
        }
    }

    #[test]
    fn test_shipments_options_string_format() {
        assert_eq!(
            ETL_SHIPMENTS_OPTIONS.to_options_string(),
            "-c datestyle=ISO -c intervalstyle=postgres -c extra_float_digits=3 -c client_encoding=UTF8 -c timezone=UTC -c statement_timeout=600000 -c lock_timeout=30000 -c idle_in_transaction_session_timeout=60000 -c application_name=etl_shipments"
        );
    }

    #[test]
    fn test_tls_enabled_requires_root_certs() {
        let config = connection_config(TlsConfig {
            trusted_root_certs: String::new(),
            enabled: true,
        });

        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        ));
        assert!(connection_config(TlsConfig::disabled()).validate().is_ok());
    }

    #[test]
    fn test_with_db_sets_database_and_user() {
        let config = connection_config(TlsConfig::disabled());
        let options: TokioPgConnectOptions = config.with_db(Some(&ETL_SHIPMENTS_OPTIONS));

        assert_eq!(options.get_dbname(), Some("operations"));
        assert_eq!(options.get_user(), Some("postgres"));
        assert_eq!(options.get_ports(), &[5432]);
        assert_eq!(options.get_password(), Some("secret".as_bytes()));
    }
}
