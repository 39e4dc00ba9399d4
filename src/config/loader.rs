//! Configuration Loader
//!
//! Merges serde defaults, an optional TOML file and `TASKLINE_*` environment variables.
//! The file path comes from the caller, then `TASKLINE_CONFIG_PATH`, then
//! `config/taskline.toml` (optional when not named explicitly).

use super::error::{ConfigResult, ConfigurationError};
use super::TasklineConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_PATH_VAR: &str = "TASKLINE_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/taskline.toml";
const ENV_PREFIX: &str = "TASKLINE";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration using `TASKLINE_CONFIG_PATH` or the default location
    pub fn load() -> ConfigResult<TasklineConfig> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load_from_path(Path::new(&path)),
            Err(_) => Self::load_layers(Path::new(DEFAULT_CONFIG_PATH), false, None),
        }
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from_path(path: &Path) -> ConfigResult<TasklineConfig> {
        if !path.exists() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::load_layers(path, true, None)
    }

    /// Load with a fixed environment map instead of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> ConfigResult<TasklineConfig> {
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (default_path.as_path(), false),
        };
        Self::load_layers(path, required, Some(env))
    }

    fn load_layers(
        path: &Path,
        required: bool,
        env: Option<HashMap<String, String>>,
    ) -> ConfigResult<TasklineConfig> {
        debug!(
            path = %path.display(),
            required = required,
            "Loading taskline configuration"
        );

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let config: TasklineConfig = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            backend = ?config.messaging.backend,
            ticket_queue = %config.messaging.ticket_queue,
            max_workers = config.dispatcher.max_workers,
            "⚙️ Configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, MessagingBackend};
    use std::io::Write;
    use tempfile::Builder;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/taskline.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let file = write_toml(
            r#"
            [messaging]
            backend = "pgmq"
            ticket_queue = "finalise_step"
            results_queue = "task_action_results"

            [dispatcher]
            max_workers = 2

            [logging]
            format = "json"
            "#,
        );

        let config = ConfigLoader::load_with_env(Some(file.path()), HashMap::new()).unwrap();
        assert_eq!(config.messaging.backend, MessagingBackend::Pgmq);
        assert_eq!(config.messaging.ticket_queue, "finalise_step");
        assert_eq!(
            config.messaging.results_queue.as_deref(),
            Some("task_action_results")
        );
        assert_eq!(config.dispatcher.max_workers, 2);
        assert_eq!(config.logging.format, LogFormat::Json);
        // untouched sections keep their defaults
        assert_eq!(config.dispatcher.store_timeout_ms, 5_000);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_toml(
            r#"
            [dispatcher]
            max_workers = 2
            "#,
        );
        let env = HashMap::from([
            ("TASKLINE_DISPATCHER__MAX_WORKERS".to_string(), "6".to_string()),
            ("TASKLINE_MESSAGING__TICKET_QUEUE".to_string(), "actions".to_string()),
        ]);

        let config = ConfigLoader::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.dispatcher.max_workers, 6);
        assert_eq!(config.messaging.ticket_queue, "actions");
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let file = write_toml(
            r#"
            [dispatcher]
            max_workers = 0
            "#,
        );
        let err = ConfigLoader::load_with_env(Some(file.path()), HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }
}
