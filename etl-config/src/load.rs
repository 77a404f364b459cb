use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Environment variable overriding the configuration directory.
const CONFIGURATION_DIR_ENV_NAME: &str = "APP_CONFIGURATION_DIR";

/// Supported extensions for base and environment configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between environment variable prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Separator for list elements in environment variables.
const LIST_SEPARATOR: &str = ",";

/// Trait implemented by configuration structures that require list parsing help.
pub trait Config {
    /// Keys whose values should be parsed as lists when loading the configuration.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Identifies which configuration file is currently being loaded.
#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),

    /// Failed to determine the runtime environment (`APP_ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to initialize configuration builder: {0}")]
    Builder(#[source] config::ConfigError),
}

/// Loads hierarchical configuration from base, environment, and environment-variable sources.
///
/// Files are read from `configuration/base.(yaml|yml|json)` and
/// `configuration/{environment}.(yaml|yml|json)`, where the directory can be moved with
/// `APP_CONFIGURATION_DIR`. `APP_`-prefixed environment variables are applied last; nested keys
/// use double underscores (`APP_SOURCE__HOST`) and list values are comma-separated.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let configuration_directory = match std::env::var_os(CONFIGURATION_DIR_ENV_NAME) {
        Some(directory) => PathBuf::from(directory),
        None => std::env::current_dir()
            .map_err(LoadConfigError::CurrentDir)?
            .join(CONFIGURATION_DIR),
    };

    let environment = Environment::load()?;

    load_config_from_dir(&configuration_directory, environment)
}

/// Loads configuration from an explicit directory for the given environment.
pub fn load_config_from_dir<T>(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(configuration_directory, ConfigFileKind::Base)?;
    let environment_file = find_configuration_file(
        configuration_directory,
        ConfigFileKind::Environment(environment),
    )?;

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let builder = config::Config::builder().add_source(config::File::from(base_file.clone()));
    validate_configuration_source(&builder, ConfigFileKind::Base, &base_file)?;

    let builder = builder.add_source(config::File::from(environment_file.clone()));
    validate_configuration_source(
        &builder,
        ConfigFileKind::Environment(environment),
        &environment_file,
    )?;

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Finds the configuration file that matches the requested kind and supported extensions.
fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<PathBuf, LoadConfigError> {
    let stem = kind.stem();
    let mut attempted_paths = Vec::with_capacity(CONFIG_FILE_EXTENSIONS.len());

    for extension in CONFIG_FILE_EXTENSIONS {
        let path = directory.join(format!("{stem}.{extension}"));
        if path.is_file() {
            return Ok(path);
        }

        attempted_paths.push(path);
    }

    let attempted = attempted_paths
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        name: String,
        batch_size: u32,
    }

    impl Config for TestConfig {
        const LIST_PARSE_KEYS: &'static [&'static str] = &[];
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(
            directory.path().join("base.yaml"),
            "name: shipments\nbatch_size: 10\n",
        )
        .unwrap();
        fs::write(directory.path().join("prod.yml"), "batch_size: 500\n").unwrap();

        let config: TestConfig =
            load_config_from_dir(directory.path(), Environment::Prod).unwrap();

        assert_eq!(config.name, "shipments");
        assert_eq!(config.batch_size, 500);
    }

    #[test]
    fn missing_environment_file_lists_attempted_paths() {
        let directory = tempfile::tempdir().unwrap();
        fs::write(
            directory.path().join("base.json"),
            r#"{"name": "shipments", "batch_size": 10}"#,
        )
        .unwrap();

        let err = load_config_from_dir::<TestConfig>(directory.path(), Environment::Dev)
            .unwrap_err();

        match err {
            LoadConfigError::ConfigurationFileMissing { attempted, .. } => {
                assert!(attempted.contains("dev.yaml"));
                assert!(attempted.contains("dev.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_directory_is_reported() {
        let directory = tempfile::tempdir().unwrap();
        let missing = directory.path().join("nope");

        let err = load_config_from_dir::<TestConfig>(&missing, Environment::Dev).unwrap_err();

        assert!(matches!(
            err,
            LoadConfigError::MissingConfigurationDirectory(_)
        ));
    }
}
