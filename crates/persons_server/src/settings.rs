use config::{Config, ConfigError, Environment, File, FileFormat};
use persons_core::PoolOptions;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/persons.toml";

/// Database path that selects an in-memory store.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Deserialize)]
pub struct Web {
    pub host: String,
    pub port: u16,
    pub path_prefix: String,
    pub request_timeout_ms: u64,
    pub shutdown_grace_secs: u64,
}

impl Web {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
    pub max_connections: usize,
    pub busy_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl Database {
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_DATABASE
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_size: self.max_connections,
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: String,
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub web: Web,
    pub database: Database,
    pub logging: Logging,
}

impl Settings {
    /// Loads defaults, then the TOML file, then `PERSONS_*` environment
    /// variables (`PERSONS_WEB__PORT=9000`).
    ///
    /// An explicitly given file must exist; without one,
    /// [`DEFAULT_CONFIG_PATH`] is read only if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::with_name(DEFAULT_CONFIG_PATH)
                .format(FileFormat::Toml)
                .required(false),
        };

        Self::defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix("PERSONS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("web.host", "0.0.0.0")?
            .set_default("web.port", "8080")?
            .set_default("web.path_prefix", "/api/v1")?
            .set_default("web.request_timeout_ms", "30000")?
            .set_default("web.shutdown_grace_secs", "60")?
            .set_default("database.path", "persons.db")?
            .set_default("database.max_connections", "4")?
            .set_default("database.busy_timeout_ms", "5000")?
            .set_default("database.acquire_timeout_ms", "30000")?
            .set_default("logging.level", persons_core::default_log_level())
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use std::io::Write;

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[web]
port = 9090
path_prefix = "/v2"

[database]
path = ":memory:"
max_connections = 1

[logging]
level = "warn"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.web.port, 9090);
        assert_eq!(settings.web.path_prefix, "/v2");
        assert_eq!(settings.web.host, "0.0.0.0");
        assert_eq!(settings.web.request_timeout_ms, 30_000);
        assert!(settings.database.is_in_memory());
        assert_eq!(settings.database.pool_options().max_size, 1);
        assert_eq!(settings.logging.level, "warn");
        assert_eq!(settings.logging.dir, None);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        assert!(Settings::load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn web_helpers_format_address_and_durations() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[web]\nhost = \"127.0.0.1\"\nshutdown_grace_secs = 5").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.web.address(), "127.0.0.1:8080");
        assert_eq!(settings.web.shutdown_grace().as_secs(), 5);
        assert_eq!(settings.database.pool_options().busy_timeout.as_millis(), 5_000);
    }
}
