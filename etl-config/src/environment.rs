use std::fmt;
use std::io::Error;

/// Name of the environment variable selecting the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const DEV_ENV_NAME: &str = "dev";

const PROD_ENV_NAME: &str = "prod";

/// Runtime environment of the job.
///
/// Selects the environment configuration file and the log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`, falling back to [`Environment::Dev`].
    pub fn load() -> Result<Environment, Error> {
        std::env::var(APP_ENVIRONMENT_ENV_NAME)
            .unwrap_or_else(|_| DEV_ENV_NAME.into())
            .try_into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }

    /// Returns `true` when running in production.
    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Environment {
    type Error = Error;

    /// Parses an environment name case-insensitively.
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use either `{DEV_ENV_NAME}` or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}
