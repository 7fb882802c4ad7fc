//! Devkit configuration, read once from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::credentials::ensure_secure;
use crate::core::path::resolve_within;
use crate::error::{DevkitError, Result};

pub const DEFAULT_STATE_DIR: &str = "/var/lib/devkit";
pub const DEFAULT_MODULE_TEMPLATE: &str = "/app/modules.json";
pub const DEFAULT_OPENAPI_PATH: &str = "/app/docs/api/openapi.mini.json";
pub const DEFAULT_MINIO_HEALTH: &str = "http://localhost:9000/minio/health/ready";
pub const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "postgres".to_string(),
            port: 5432,
            name: "hla_compass".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
        }
    }
}

/// Everything the devkit reads from the environment.
///
/// Missing variables fall back to the defaults below; values are checked by
/// [`DevkitConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevkitConfig {
    pub state_dir: PathBuf,
    /// Module document, relative to `state_dir`.
    pub module_state: PathBuf,
    /// Run document, relative to `state_dir`.
    pub run_state: PathBuf,
    /// Seed for the first bootstrap. A missing file seeds an empty registry.
    pub module_template: Option<PathBuf>,
    pub openapi_path: PathBuf,
    pub strict_state: bool,
    pub lock_timeout: Duration,
    pub database: DatabaseConfig,
    pub s3_secret_key: String,
    pub minio_health_url: String,
    /// Empty means open mode.
    pub api_key: String,
    pub cors_origins: Vec<String>,
    /// Requests per minute per address on mutating routes. Zero disables.
    pub rate_limit_rpm: u32,
    pub shutdown_grace: Duration,
}

impl Default for DevkitConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            module_state: PathBuf::from("modules.json"),
            run_state: PathBuf::from("runs.json"),
            module_template: Some(PathBuf::from(DEFAULT_MODULE_TEMPLATE)),
            openapi_path: PathBuf::from(DEFAULT_OPENAPI_PATH),
            strict_state: false,
            lock_timeout: Duration::from_secs(10),
            database: DatabaseConfig::default(),
            s3_secret_key: String::new(),
            minio_health_url: DEFAULT_MINIO_HEALTH.to_string(),
            api_key: String::new(),
            cors_origins: split_origins(DEFAULT_CORS_ORIGINS),
            rate_limit_rpm: 10,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Absolute locations of the state documents, checked against the state dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub module_state_path: PathBuf,
    pub run_state_path: PathBuf,
}

impl DevkitConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let database = DatabaseConfig {
            host: var("DEVKIT_DB_HOST").unwrap_or(defaults.database.host),
            port: parse_or(&var, "DEVKIT_DB_PORT", defaults.database.port)?,
            name: var("DEVKIT_DB_NAME")
                .or_else(|| var("DEVKIT_DB"))
                .unwrap_or(defaults.database.name),
            user: var("DEVKIT_DB_USER").unwrap_or(defaults.database.user),
            password: var("DEVKIT_DB_PASSWORD").unwrap_or(defaults.database.password),
        };

        let config = Self {
            state_dir: var("HLA_DEVKIT_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            module_state: var("HLA_DEVKIT_MODULE_STATE")
                .map(PathBuf::from)
                .unwrap_or(defaults.module_state),
            run_state: var("HLA_DEVKIT_RUN_STATE")
                .map(PathBuf::from)
                .unwrap_or(defaults.run_state),
            module_template: var("HLA_DEVKIT_MODULE_TEMPLATE")
                .map(PathBuf::from)
                .or(defaults.module_template),
            openapi_path: var("HLA_DEVKIT_OPENAPI_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.openapi_path),
            strict_state: parse_bool(&var, "HLA_DEVKIT_STRICT_STATE", defaults.strict_state)?,
            lock_timeout: Duration::from_secs(parse_or(
                &var,
                "HLA_DEVKIT_LOCK_TIMEOUT_SECS",
                defaults.lock_timeout.as_secs(),
            )?),
            database,
            s3_secret_key: lookup("DEVKIT_S3_SECRET_KEY").unwrap_or_default(),
            minio_health_url: var("DEVKIT_MINIO_HEALTH").unwrap_or(defaults.minio_health_url),
            api_key: lookup("DEVKIT_API_KEY").unwrap_or_default(),
            cors_origins: var("CORS_ORIGINS")
                .map(|raw| split_origins(&raw))
                .unwrap_or(defaults.cors_origins),
            rate_limit_rpm: parse_or(&var, "DEVKIT_RATE_LIMIT_RPM", defaults.rate_limit_rpm)?,
            shutdown_grace: Duration::from_secs(parse_or(
                &var,
                "DEVKIT_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(DevkitError::Config(
                "HLA_DEVKIT_STATE_DIR must not be empty".to_string(),
            ));
        }
        if self.lock_timeout.is_zero() {
            return Err(DevkitError::Config(
                "HLA_DEVKIT_LOCK_TIMEOUT_SECS must be > 0".to_string(),
            ));
        }
        if self.minio_health_url.trim().is_empty() {
            return Err(DevkitError::Config(
                "DEVKIT_MINIO_HEALTH must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject well-known development secrets.
    pub fn check_credentials(&self) -> Result<()> {
        ensure_secure(&[
            ("DEVKIT_DB_PASSWORD", self.database.password.as_str()),
            ("DEVKIT_S3_SECRET_KEY", self.s3_secret_key.as_str()),
        ])
    }

    /// Resolve both state documents inside the state dir. Touches nothing on disk.
    pub fn state_paths(&self) -> Result<StatePaths> {
        Ok(StatePaths {
            state_dir: resolve_within(&self.state_dir, ".")?,
            module_state_path: resolve_within(&self.state_dir, &self.module_state)?,
            run_state_path: resolve_within(&self.state_dir, &self.run_state)?,
        })
    }

    pub fn api_key(&self) -> Option<&str> {
        (!self.api_key.is_empty()).then_some(self.api_key.as_str())
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| DevkitError::Config(format!("{key}={raw:?}: {err}"))),
    }
}

fn parse_bool<V>(var: &V, key: &str, default: bool) -> Result<bool>
where
    V: Fn(&str) -> Option<String>,
{
    match var(key).map(|raw| raw.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(DevkitError::Config(format!("{key}={raw:?}: expected a boolean"))),
        },
    }
}
