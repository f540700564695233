// ABOUTME: JSON configuration for source/target connections and batch size
// ABOUTME: Loaded once at startup, validated, then passed explicitly to every component

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SyncError;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "dbReplicate.json";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Database drivers the replicator knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Mysql,
    Postgres,
}

impl FromStr for Driver {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Driver::Mysql),
            "pgsql" | "postgres" | "postgresql" => Ok(Driver::Postgres),
            _ => Err(SyncError::UnsupportedDriver(s.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Mysql => write!(f, "mysql"),
            Driver::Postgres => write!(f, "pgsql"),
        }
    }
}

/// Connection parameters for one database.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub charset: String,
    pub user_name: String,
    #[serde(default)]
    pub password: String,
}

impl DbConfig {
    /// Resolve the driver identifier.
    pub fn driver(&self) -> Result<Driver, SyncError> {
        self.driver.parse()
    }

    /// `host:port/db` for log lines. Never includes credentials.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db_name)
    }

    fn validate(&self, role: &str) -> Result<()> {
        let driver = self
            .driver()
            .with_context(|| format!("Invalid driver in {} database config", role))?;
        if self.host.trim().is_empty() {
            bail!("{} database config: host cannot be empty", role);
        }
        if self.port == 0 {
            bail!("{} database config: port cannot be 0", role);
        }
        if self.db_name.trim().is_empty() {
            bail!("{} database config: dbName cannot be empty", role);
        }
        if self.user_name.trim().is_empty() {
            bail!("{} database config: userName cannot be empty", role);
        }
        // tokio-postgres pins client_encoding to UTF8 at startup
        if driver == Driver::Postgres && !is_utf8_charset(&self.charset) {
            bail!(
                "{} database config: charset '{}' is not supported for pgsql (use utf8)",
                role,
                self.charset
            );
        }
        Ok(())
    }
}

/// Empty (server default) or one of the UTF-8 spellings MySQL and PostgreSQL use.
fn is_utf8_charset(charset: &str) -> bool {
    matches!(
        charset.trim().to_ascii_lowercase().as_str(),
        "" | "utf8" | "utf-8" | "utf8mb3" | "utf8mb4"
    )
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .field("charset", &self.charset)
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .finish()
    }
}

/// Complete replication configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(rename = "masterDbConfig")]
    pub source: DbConfig,
    #[serde(rename = "slaveDbConfig")]
    pub target: DbConfig,
    pub max_rows_to_sync_from_one_table: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub connect_retries: u32,
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl SyncConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig =
            serde_json::from_str(json).context("Failed to parse configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check every value the run depends on.
    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.target.validate("target")?;
        if self.max_rows_to_sync_from_one_table == 0 {
            bail!("maxRowsToSyncFromOneTable must be at least 1");
        }
        if self.connect_timeout_secs == 0 {
            bail!("connectTimeoutSecs must be at least 1");
        }
        Ok(())
    }
}

/// Load the configuration file at `path`.
pub fn load(path: &Path) -> Result<SyncConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    let config = SyncConfig::from_json(&json)
        .with_context(|| format!("Invalid configuration file {}", path.display()))?;

    tracing::debug!("Loaded configuration from {}: {:?}", path.display(), config);

    Ok(config)
}
